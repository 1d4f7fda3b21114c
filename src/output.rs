//! Output types: crops, run statistics, document info.

use serde::Serialize;
use std::fmt;

/// One extracted region, ready for display or download.
///
/// The JPEG bytes serve both the preview and the archive entry; they are
/// encoded exactly once, so the two can never diverge.
#[derive(Clone, Serialize)]
pub struct Crop {
    /// Freshly generated unique identifier (UUID v4).
    pub id: String,
    /// Display label. For multi-page documents the orchestrator prefixes the
    /// region label with `Page {n} - `.
    pub label: String,
    /// 1-based page number the region was detected on.
    pub page: usize,
    /// Pixel width of the encoded crop.
    pub width: u32,
    /// Pixel height of the encoded crop.
    pub height: u32,
    /// Encoded JPEG bytes. Excluded from JSON manifests.
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl fmt::Debug for Crop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Crop")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("page", &self.page)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &format_args!("{} bytes", self.bytes.len()))
            .finish()
    }
}

/// Statistics for one completed run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractionStats {
    /// Pages in the source document.
    pub total_pages: usize,
    /// Pages actually processed (after page selection).
    pub pages_processed: usize,
    /// Regions the model reported across all processed pages.
    pub detected_regions: usize,
    /// Crops successfully produced.
    pub produced_crops: usize,
    /// Regions skipped because their box was degenerate.
    pub skipped_regions: usize,
    /// Wall-clock time spent rendering/decoding the document.
    pub render_duration_ms: u64,
    /// Wall-clock time spent in detection calls.
    pub detection_duration_ms: u64,
    /// Wall-clock time for the whole run.
    pub total_duration_ms: u64,
}

/// Result of a successful extraction run.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionOutput {
    /// All crops in page order, then detection order within each page.
    pub crops: Vec<Crop>,
    /// Run statistics.
    pub stats: ExtractionStats,
}

/// Lightweight description of an input document, from [`crate::inspect`].
#[derive(Debug, Clone, Serialize)]
pub struct DocumentInfo {
    /// Container format of the input.
    pub format: crate::pipeline::input::DocumentKind,
    /// Number of pages (always 1 for still images).
    pub page_count: usize,
}
