//! Archive assembly: bundle the crops into a single zip for download.
//!
//! Entries reuse each crop's already-encoded JPEG bytes; nothing is
//! re-encoded here, so the archived file and the individual crop can never
//! differ.

use crate::error::ExtractError;
use crate::output::Crop;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Runs of characters outside the filename allow-list: ASCII alphanumerics
/// plus the Latin Extended range covering Vietnamese diacritics.
static RE_UNSAFE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[^a-z0-9À-ỹ]+").unwrap());

/// Filename stem used when a label sanitizes to nothing.
const FALLBACK_STEM: &str = "crop";

/// Derive the archive entry name for a crop.
///
/// The label is sanitized (disallowed runs collapse to one underscore, then
/// lowercased) and suffixed with the crop's 1-based position, so two crops
/// whose labels collide after sanitization still get distinct names.
pub fn entry_filename(label: &str, index: usize) -> String {
    let clean = sanitize_label(label);
    let stem = if clean.is_empty() {
        FALLBACK_STEM
    } else {
        &clean
    };
    format!("{}_{}.jpg", stem, index + 1)
}

fn sanitize_label(label: &str) -> String {
    RE_UNSAFE.replace_all(label, "_").to_lowercase()
}

/// Build an in-memory zip holding one entry per crop, in input order.
pub fn build_archive(crops: &[Crop]) -> Result<Vec<u8>, ExtractError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (index, crop) in crops.iter().enumerate() {
        writer
            .start_file(entry_filename(&crop.label, index), options)
            .map_err(|e| ExtractError::Internal(format!("zip entry failed: {e}")))?;
        writer
            .write_all(&crop.bytes)
            .map_err(|e| ExtractError::Internal(format!("zip write failed: {e}")))?;
    }

    let cursor = writer
        .finish()
        .map_err(|e| ExtractError::Internal(format!("zip finalize failed: {e}")))?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::ZipArchive;

    fn crop(label: &str, bytes: Vec<u8>) -> Crop {
        Crop {
            id: "t".into(),
            label: label.into(),
            page: 1,
            width: 10,
            height: 10,
            bytes,
        }
    }

    #[test]
    fn entry_names_sanitize_and_index() {
        assert_eq!(entry_filename("Question 1", 0), "question_1_1.jpg");
        assert_eq!(entry_filename("Q: 1?", 1), "q_1__2.jpg");
        assert_eq!(entry_filename("Câu 3 (Đề thi)", 2), "câu_3_đề_thi__3.jpg");
        assert_eq!(entry_filename("", 0), "crop_1.jpg");
    }

    #[test]
    fn colliding_labels_get_distinct_names() {
        let a = entry_filename("Question 1", 0);
        let b = entry_filename("question   1", 1);
        assert_ne!(a, b);
        assert_eq!(b, "question_1_2.jpg");
    }

    #[test]
    fn empty_archive_is_a_valid_zip() {
        let bytes = build_archive(&[]).unwrap();
        let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 0);
    }

    #[test]
    fn entries_preserve_order_and_bytes() {
        let crops = vec![
            crop("Question 2", vec![0xFF, 0xD8, 0xFF, 0x01]),
            crop("Question 1", vec![0xFF, 0xD8, 0xFF, 0x02]),
        ];
        let bytes = build_archive(&crops).unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);

        let mut first = archive.by_index(0).unwrap();
        assert_eq!(first.name(), "question_2_1.jpg");
        let mut payload = Vec::new();
        first.read_to_end(&mut payload).unwrap();
        assert_eq!(payload, vec![0xFF, 0xD8, 0xFF, 0x01]);
        drop(first);

        let second = archive.by_index(1).unwrap();
        assert_eq!(second.name(), "question_1_2.jpg");
    }
}
