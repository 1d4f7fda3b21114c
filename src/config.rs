//! Configuration types for region extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. Keeping every knob in one struct makes
//! it trivial to share configs across threads, log them, and diff two runs to
//! understand why their outputs differ.
//!
//! # Design choice: builder over constructor
//! A dozen-field constructor is unreadable and breaks on every new field.
//! The builder pattern lets callers set only what they care about and rely on
//! well-documented defaults for the rest.

use crate::error::ExtractError;
use crate::progress::ProgressCallback;
use crate::vision::VisionModel;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Configuration for one detect-and-crop extraction.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use docsnip::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .model("gemini-3-flash-preview")
///     .api_timeout_secs(180)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Upscaling factor applied when rasterising each PDF page. Default: 2.0.
    ///
    /// 2.0 doubles the page's natural point size, keeping small print sharp
    /// enough for the vision model to read without ballooning the upload.
    /// Still-image inputs are never rescaled; this only affects PDF pages.
    pub render_scale: f32,

    /// Maximum rendered page dimension (width or height) in pixels. Default: 4000.
    ///
    /// A safety cap independent of the scale factor. A 2.0× render of an A0
    /// poster would produce a 6700 × 9500 px image and exhaust memory. When
    /// the cap binds, pdfium scales the page down proportionally.
    pub max_rendered_pixels: u32,

    /// Vision model identifier. Default: `"gemini-3-flash-preview"`.
    pub model: String,

    /// API key for the vision model.
    ///
    /// If None, the `GEMINI_API_KEY` environment variable is consulted when
    /// the run starts. An explicitly configured empty string is rejected
    /// rather than silently falling back to the environment.
    pub api_key: Option<String>,

    /// Override the vision API base URL (testing, proxies). If None, the
    /// public Gemini endpoint is used.
    pub api_base: Option<String>,

    /// Pre-constructed vision backend. Takes precedence over `api_key` and
    /// `model`; no credential check is performed when this is set.
    pub vision: Option<Arc<dyn VisionModel>>,

    /// Custom system instruction for the detector. If None, uses the
    /// built-in default.
    pub system_prompt: Option<String>,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Page selection. Default: all pages.
    pub pages: PageSelection,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Per-detection-call timeout in seconds. Default: 120.
    ///
    /// Dense exam pages can take the model well over a minute to box. The
    /// timeout aborts the run; nothing is retried automatically.
    pub api_timeout_secs: u64,

    /// Observer for run lifecycle, per-page checkpoints and percent progress.
    pub progress: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            render_scale: 2.0,
            max_rendered_pixels: 4000,
            model: crate::vision::gemini::DEFAULT_MODEL.to_string(),
            api_key: None,
            api_base: None,
            vision: None,
            system_prompt: None,
            password: None,
            pages: PageSelection::default(),
            download_timeout_secs: 120,
            api_timeout_secs: 120,
            progress: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("render_scale", &self.render_scale)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base", &self.api_base)
            .field("vision", &self.vision.as_ref().map(|_| "<dyn VisionModel>"))
            .field("system_prompt", &self.system_prompt.as_ref().map(|_| "<custom>"))
            .field("pages", &self.pages)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn render_scale(mut self, scale: f32) -> Self {
        self.config.render_scale = scale;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.config.api_base = Some(base.into());
        self
    }

    pub fn vision(mut self, backend: Arc<dyn VisionModel>) -> Self {
        self.config.vision = Some(backend);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;
        if !(0.5..=4.0).contains(&c.render_scale) {
            return Err(ExtractError::InvalidConfig(format!(
                "render_scale must be 0.5–4.0, got {}",
                c.render_scale
            )));
        }
        if c.model.trim().is_empty() {
            return Err(ExtractError::InvalidConfig(
                "model identifier must not be empty".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(ExtractError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Page selection ───────────────────────────────────────────────────────

/// Specifies which pages of the document to process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum PageSelection {
    /// Process all pages (default).
    #[default]
    All,
    /// Process a single page (1-indexed).
    Single(usize),
    /// Process a contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Process specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_documented_values() {
        let c = ExtractionConfig::default();
        assert_eq!(c.render_scale, 2.0);
        assert_eq!(c.max_rendered_pixels, 4000);
        assert_eq!(c.model, "gemini-3-flash-preview");
        assert!(c.api_key.is_none());
        assert_eq!(c.api_timeout_secs, 120);
    }

    #[test]
    fn builder_rejects_wild_scale() {
        let err = ExtractionConfig::builder().render_scale(9.0).build();
        assert!(matches!(err, Err(ExtractError::InvalidConfig(_))));
    }

    #[test]
    fn builder_rejects_empty_model() {
        let err = ExtractionConfig::builder().model("  ").build();
        assert!(matches!(err, Err(ExtractError::InvalidConfig(_))));
    }

    #[test]
    fn page_selection_all() {
        assert_eq!(PageSelection::All.to_indices(3), vec![0, 1, 2]);
    }

    #[test]
    fn page_selection_single_out_of_range() {
        assert!(PageSelection::Single(7).to_indices(3).is_empty());
    }

    #[test]
    fn page_selection_range_clamps_to_total() {
        assert_eq!(PageSelection::Range(2, 99).to_indices(4), vec![1, 2, 3]);
    }

    #[test]
    fn page_selection_set_dedupes_and_sorts() {
        let sel = PageSelection::Set(vec![3, 1, 3, 2]);
        assert_eq!(sel.to_indices(5), vec![0, 1, 2]);
    }

    #[test]
    fn debug_redacts_api_key() {
        let c = ExtractionConfig::builder().api_key("secret").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("secret"));
        assert!(dbg.contains("redacted"));
    }
}
