//! Error types for the docsnip library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ExtractError`] — **Fatal**: the run cannot proceed at all (bad input
//!   document, missing API key, malformed model output). Returned as
//!   `Err(ExtractError)` from the top-level `extract*` functions and from
//!   [`crate::run::Run`] operations.
//!
//! * [`RegionError`] — **Non-fatal**: a single detected region could not be
//!   cropped (degenerate box after padding and clamping). The orchestrator
//!   logs it, counts it, and moves on; one bad detection never discards the
//!   rest of the page's or document's valid crops.
//!
//! Nothing in this library retries automatically. A failed run carries
//! exactly one error, the first one encountered.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the docsnip library.
///
/// Region-level failures use [`RegionError`] and are swallowed by the
/// orchestrator rather than propagated here.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is neither a PDF nor a supported image.
    #[error("Unsupported document format: '{path}'\nExpected PDF, PNG or JPEG. First bytes: {magic:?}")]
    UnsupportedFormat { path: PathBuf, magic: [u8; 4] },

    // ── Document errors ───────────────────────────────────────────────────
    /// The document container is corrupt and cannot be decoded.
    #[error("Document '{path}' cannot be decoded: {detail}")]
    CorruptDocument { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// Selected page numbers exceed the actual page count.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    // ── Configuration errors ──────────────────────────────────────────────
    /// No API key available for the vision model.
    #[error(
        "No API key configured for the vision model.\n\
Set GEMINI_API_KEY in the environment or pass one with --api-key."
    )]
    MissingApiKey,

    /// The detection instruction was empty or whitespace-only.
    #[error("Detection instruction is empty.\nDescribe which regions to find, e.g. \"every question\".")]
    EmptyInstruction,

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Vision model errors ───────────────────────────────────────────────
    /// The vision API call failed or returned no usable payload.
    #[error("Vision API error: {message}")]
    VisionApiError { message: String },

    /// The vision API call timed out. Not retried; re-run if desired.
    #[error("Vision API call timed out after {secs}s")]
    ApiTimeout { secs: u64 },

    /// The model's payload was not the promised JSON array of labeled boxes.
    #[error("Model output does not match the detection schema: {detail}")]
    SchemaViolation { detail: String },

    // ── Run outcome ───────────────────────────────────────────────────────
    /// `process()` was called on a run with no loaded pages.
    #[error("No document loaded.\nCall Run::load() (or pass an input path) before processing.")]
    NoDocumentLoaded,

    /// The run finished cleanly but produced zero crops.
    #[error(
        "No regions were found across {pages} page(s).\n\
Try a more specific instruction, e.g. \"every numbered question including its options\"."
    )]
    NoRegionsFound { pages: usize },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
PDFium is normally downloaded automatically on first run.\n\
If the auto-download failed, you can:\n\
  • Check your internet connection and try again.\n\
  • Set DOCSNIP_PDFIUM_PATH=/path/to/libpdfium to use an existing copy.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single detected region.
///
/// The orchestrator skips the offending region, logs a warning, and counts
/// it in [`crate::output::ExtractionStats::skipped_regions`].
#[derive(Debug, Clone, Error)]
pub enum RegionError {
    /// The box collapsed to nothing after padding, clamping and pixel
    /// rounding; no crop surface was allocated.
    #[error("Region '{label}' is degenerate after padding and clamping: {detail}")]
    DegenerateBox { label: String, detail: String },

    /// The crop surface could not be encoded as JPEG.
    #[error("Region '{label}' could not be encoded: {detail}")]
    EncodeFailed { label: String, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_api_key_names_env_var() {
        let msg = ExtractError::MissingApiKey.to_string();
        assert!(msg.contains("GEMINI_API_KEY"), "got: {msg}");
    }

    #[test]
    fn no_regions_display() {
        let e = ExtractError::NoRegionsFound { pages: 3 };
        let msg = e.to_string();
        assert!(msg.contains("3 page(s)"), "got: {msg}");
        assert!(msg.contains("instruction"));
    }

    #[test]
    fn api_timeout_display() {
        let e = ExtractError::ApiTimeout { secs: 120 };
        assert!(e.to_string().contains("120s"));
    }

    #[test]
    fn schema_violation_display() {
        let e = ExtractError::SchemaViolation {
            detail: "missing field `ymax`".into(),
        };
        assert!(e.to_string().contains("ymax"));
    }

    #[test]
    fn degenerate_region_display() {
        let e = RegionError::DegenerateBox {
            label: "Question 9".into(),
            detail: "pixel span rounds to 0x0".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("Question 9"));
        assert!(msg.contains("0x0"));
    }

    #[test]
    fn unsupported_format_shows_magic() {
        let e = ExtractError::UnsupportedFormat {
            path: PathBuf::from("notes.txt"),
            magic: [0x68, 0x65, 0x6c, 0x6c],
        };
        assert!(e.to_string().contains("notes.txt"));
    }
}
