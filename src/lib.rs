//! # docsnip
//!
//! Detect and crop labeled regions from images and PDFs using vision
//! language models.
//!
//! ## Why this crate?
//!
//! Template-based croppers need pixel coordinates up front and break the
//! moment a layout shifts. Instead this crate rasterises each page and asks
//! a vision model to *find* the regions — "every question", "all tables",
//! "each diagram" — then cuts them out with consistent padding and hands
//! back ready-to-save JPEGs plus a zip of the lot.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF / PNG / JPEG
//!  │
//!  ├─ 1. Input     resolve local file or download from URL, sniff format
//!  ├─ 2. Rasterize render PDF pages via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 3. Encode    JPEG → base64 for the multimodal request body
//!  ├─ 4. Detect    one sequential vision call per page, schema-validated
//!  ├─ 5. Crop      pad each box, clamp, cut, white-fill, encode JPEG
//!  └─ 6. Archive   zip with sanitized, indexed entry names
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docsnip::{extract, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // API key read from GEMINI_API_KEY
//!     let config = ExtractionConfig::default();
//!     let output = extract("exam.pdf", "every question", &config).await?;
//!     for crop in &output.crops {
//!         std::fs::write(format!("{}.jpg", crop.id), &crop.bytes)?;
//!     }
//!     eprintln!(
//!         "{} crop(s) from {} page(s)",
//!         output.stats.produced_crops, output.stats.pages_processed
//!     );
//!     Ok(())
//! }
//! ```
//!
//! For intermediate states, progress events, or re-processing one document
//! with several instructions, drive a [`Run`] directly.
//!
//! ## Feature Flags
//!
//! | Feature   | Default | Description |
//! |-----------|---------|-------------|
//! | `cli`     | on      | Enables the `docsnip` binary (clap + anyhow + indicatif + tracing-subscriber) |
//! | `bundled` | on      | Embed a pdfium build into the binary at compile time; without it pdfium is downloaded on first run |
//!
//! Disable both when using only the library:
//! ```toml
//! docsnip = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod geometry;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod run;
pub mod vision;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, PageSelection};
pub use error::{ExtractError, RegionError};
pub use extract::{extract, extract_from_bytes, extract_sync, inspect};
pub use geometry::{DetectedRegion, NormalizedBox, PixelRect};
pub use output::{Crop, DocumentInfo, ExtractionOutput, ExtractionStats};
pub use pipeline::archive::{build_archive, entry_filename};
pub use pipeline::input::DocumentKind;
pub use pipeline::rasterize::Page;
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use run::{Run, RunState};
pub use vision::gemini::GeminiVision;
pub use vision::{DetectionRequest, VisionModel};
