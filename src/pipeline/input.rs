//! Input resolution: normalise a user-supplied path or URL to a local file.
//!
//! ## Why download to a temp file?
//!
//! pdfium requires a file-system path — it cannot stream from a byte buffer.
//! Downloading to a `TempDir` gives us a path pdfium can open while ensuring
//! cleanup happens automatically when `ResolvedInput` is dropped, even if
//! the process panics. The container format is sniffed from magic bytes
//! before returning, so callers get a meaningful error rather than a pdfium
//! crash or a misleading decode failure.

use crate::error::ExtractError;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// Container format of an input document, sniffed from its first bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// Multi-page PDF container, rendered through pdfium.
    Pdf,
    /// Single still image (PNG or JPEG), decoded as one page.
    Image,
}

/// The resolved input — either a local path or a downloaded temp file.
#[derive(Debug)]
pub enum ResolvedInput {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input was a URL; document downloaded to a temp directory.
    /// The `TempDir` is kept alive to prevent cleanup until processing completes.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    /// Get the path to the document regardless of how it was resolved.
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Classify a document by its first four bytes.
pub fn sniff_kind(magic: &[u8; 4]) -> Option<DocumentKind> {
    if magic == b"%PDF" {
        Some(DocumentKind::Pdf)
    } else if magic == b"\x89PNG" || magic[..3] == [0xFF, 0xD8, 0xFF] {
        Some(DocumentKind::Image)
    } else {
        None
    }
}

/// Resolve the input string to a local document path and its format.
///
/// If the input is a URL, download it to a temporary directory.
/// If the input is a local file, validate it exists and is readable.
pub async fn resolve_input(
    input: &str,
    timeout_secs: u64,
) -> Result<(ResolvedInput, DocumentKind), ExtractError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

/// Resolve a local file path, validating existence and magic bytes.
fn resolve_local(path_str: &str) -> Result<(ResolvedInput, DocumentKind), ExtractError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(ExtractError::FileNotFound { path });
    }

    let kind = match std::fs::File::open(&path) {
        Ok(mut f) => {
            use std::io::Read;
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_err() {
                return Err(ExtractError::UnsupportedFormat { path, magic });
            }
            match sniff_kind(&magic) {
                Some(kind) => kind,
                None => return Err(ExtractError::UnsupportedFormat { path, magic }),
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ExtractError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(ExtractError::FileNotFound { path });
        }
    };

    debug!("Resolved local {:?} input: {}", kind, path.display());
    Ok((ResolvedInput::Local(path), kind))
}

/// Download a URL to a temporary directory and return the path and format.
async fn download_url(
    url: &str,
    timeout_secs: u64,
) -> Result<(ResolvedInput, DocumentKind), ExtractError> {
    info!("Downloading document from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ExtractError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ExtractError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ExtractError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(ExtractError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    // Extract filename from URL or Content-Disposition
    let filename = extract_filename(url, &response);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ExtractError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let temp_dir = TempDir::new().map_err(|e| ExtractError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&filename);

    // Reject junk before writing anything.
    let mut magic = [0u8; 4];
    if bytes.len() >= 4 {
        magic.copy_from_slice(&bytes[..4]);
    }
    let kind = sniff_kind(&magic).ok_or_else(|| ExtractError::UnsupportedFormat {
        path: file_path.clone(),
        magic,
    })?;

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| ExtractError::Internal(format!("Failed to write temp file: {}", e)))?;

    info!("Downloaded to: {}", file_path.display());

    Ok((
        ResolvedInput::Downloaded {
            path: file_path,
            _temp_dir: temp_dir,
        },
        kind,
    ))
}

/// Extract a reasonable filename from the URL or response headers.
fn extract_filename(url: &str, _response: &reqwest::Response) -> String {
    // Try URL path
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.bin".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/exam.pdf"));
        assert!(is_url("http://example.com/exam.pdf"));
        assert!(!is_url("/tmp/exam.pdf"));
        assert!(!is_url("exam.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn sniff_recognises_supported_formats() {
        assert_eq!(sniff_kind(b"%PDF"), Some(DocumentKind::Pdf));
        assert_eq!(sniff_kind(b"\x89PNG"), Some(DocumentKind::Image));
        assert_eq!(
            sniff_kind(&[0xFF, 0xD8, 0xFF, 0xE0]),
            Some(DocumentKind::Image)
        );
        assert_eq!(sniff_kind(b"GIF8"), None);
        assert_eq!(sniff_kind(b"hell"), None);
    }

    #[test]
    fn local_missing_file_is_not_found() {
        let err = resolve_local("/definitely/not/here.pdf").unwrap_err();
        assert!(matches!(err, ExtractError::FileNotFound { .. }));
    }

    #[test]
    fn local_junk_file_is_unsupported() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"hello world").unwrap();
        let err = resolve_local(f.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFormat { .. }));
    }

    #[test]
    fn local_png_magic_resolves_as_image() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"\x89PNG\r\n\x1a\n0000").unwrap();
        let (resolved, kind) = resolve_local(f.path().to_str().unwrap()).unwrap();
        assert_eq!(kind, DocumentKind::Image);
        assert_eq!(resolved.path(), f.path());
    }

    // NOTE: extract_filename requires a reqwest::Response which cannot
    // be easily constructed in a unit test. It is covered by integration tests.
}
