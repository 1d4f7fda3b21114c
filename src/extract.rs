//! One-shot extraction entry points.
//!
//! These functions wrap a [`Run`] for the common case: load a document,
//! process a single instruction, return the crops. Use [`Run`] directly
//! when you need intermediate states, progress introspection, or to
//! re-process the same document with several instructions.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::output::{DocumentInfo, ExtractionOutput};
use crate::pipeline::{input, rasterize};
use crate::run::Run;
use std::io::Write;

/// Detect and crop regions matching `instruction` in a document.
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `input` — Local file path or HTTP/HTTPS URL to a PDF, PNG or JPEG
/// * `instruction` — What to find, e.g. `"every question"`
/// * `config` — Extraction configuration
///
/// # Errors
/// Any [`ExtractError`]; note that a clean run with zero crops is
/// [`ExtractError::NoRegionsFound`], not an empty `Ok`.
///
/// # Example
/// ```rust,no_run
/// use docsnip::{extract, ExtractionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ExtractionConfig::default();
/// let output = extract("exam.pdf", "every question", &config).await?;
/// for crop in &output.crops {
///     println!("{} ({}x{} px)", crop.label, crop.width, crop.height);
/// }
/// # Ok(())
/// # }
/// ```
pub async fn extract(
    input: impl AsRef<str>,
    instruction: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    let mut run = Run::new(config.clone());
    run.load(input.as_ref()).await?;
    run.process(instruction.as_ref()).await?;
    Ok(run.into_output())
}

/// Extract from document bytes already in memory.
///
/// Internally the library writes `bytes` to a managed [`tempfile`] and
/// cleans it up automatically on return or panic. The format is sniffed
/// from the bytes themselves, so no filename or extension is needed.
///
/// This is the recommended API when the document comes from a database,
/// network stream, or upload buffer rather than a file on disk.
pub async fn extract_from_bytes(
    bytes: &[u8],
    instruction: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    let mut tmp = tempfile::NamedTempFile::new()
        .map_err(|e| ExtractError::Internal(format!("tempfile: {e}")))?;
    tmp.write_all(bytes)
        .map_err(|e| ExtractError::Internal(format!("tempfile write: {e}")))?;
    let path = tmp.path().to_string_lossy().to_string();
    // `tmp` is dropped (and the file deleted) when `extract` returns
    extract(&path, instruction, config).await
}

/// Synchronous wrapper around [`extract`].
///
/// Creates a temporary tokio runtime internally; do not call from inside
/// an async context.
pub fn extract_sync(
    input: impl AsRef<str>,
    instruction: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ExtractError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract(input, instruction, config))
}

/// Describe a document without processing it.
///
/// Resolves the input, sniffs its format and counts pages. Does not need
/// an API key and sends nothing to the vision model.
pub async fn inspect(
    input: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<DocumentInfo, ExtractError> {
    let (resolved, kind) =
        input::resolve_input(input.as_ref(), config.download_timeout_secs).await?;
    let page_count =
        rasterize::page_count(resolved.path(), kind, config.password.as_deref()).await?;
    Ok(DocumentInfo {
        format: kind,
        page_count,
    })
}
