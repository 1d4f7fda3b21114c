//! A single extraction run as an explicit value.
//!
//! [`Run`] separates the two phases of an extraction: [`Run::load`] resolves
//! and rasterizes the document, [`Run::process`] detects and crops regions
//! for one instruction. Keeping the loaded pages on the value means a caller
//! can process the same document several times with different instructions
//! without re-rendering, and every state transition is observable through
//! the configured progress callback.
//!
//! The one-shot [`crate::extract`] functions wrap a `Run` internally; use
//! `Run` directly when you need the intermediate states or re-processing.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::output::{Crop, ExtractionOutput, ExtractionStats};
use crate::pipeline::rasterize::Page;
use crate::pipeline::{crop, detect, encode, input, rasterize};
use crate::progress::{
    ProgressTracker, STEP_DETECT_DONE, STEP_DETECT_SENT, STEP_PAGE_DONE,
};
use crate::vision::gemini::GeminiVision;
use crate::vision::VisionModel;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Lifecycle state of a [`Run`].
///
/// ```text
/// Idle ──load()──▶ Loading ──▶ Idle ──process()──▶ Processing ──▶ Success
///                     │                                │
///                     ▼                                ▼
///                   Error                            Error
/// ```
///
/// Guard failures (empty instruction, nothing loaded) reject the call
/// without leaving `Idle`; only work that actually started can end in
/// `Error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    /// Nothing in flight. Either no document is loaded yet, or a document
    /// is loaded and waiting for an instruction.
    Idle,
    /// Resolving and rasterizing the input document.
    Loading,
    /// Detection and cropping in flight.
    Processing,
    /// The last `process()` produced at least one crop.
    Success,
    /// The last operation failed; `message` is the rendered error.
    Error { message: String },
}

/// One extraction run: a loaded document plus the crops produced from it.
pub struct Run {
    config: ExtractionConfig,
    state: RunState,
    source_name: Option<String>,
    /// Total pages in the loaded document, before page selection.
    document_pages: usize,
    pages: Vec<Page>,
    crops: Vec<Crop>,
    stats: ExtractionStats,
}

impl Run {
    /// Create an empty run with the given configuration.
    pub fn new(config: ExtractionConfig) -> Self {
        Self {
            config,
            state: RunState::Idle,
            source_name: None,
            document_pages: 0,
            pages: Vec::new(),
            crops: Vec::new(),
            stats: ExtractionStats::default(),
        }
    }

    /// Create a run from pages the caller already holds in memory.
    ///
    /// Skips `load()` entirely; page indices are taken as document order.
    /// Useful for custom renderers and for exercising the detection path
    /// without a document on disk.
    pub fn with_pages(config: ExtractionConfig, pages: Vec<Page>) -> Self {
        let mut run = Self::new(config);
        run.document_pages = pages.len();
        run.stats.total_pages = pages.len();
        run.pages = pages;
        run
    }

    /// Current lifecycle state.
    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Crops from the most recent successful `process()`.
    pub fn crops(&self) -> &[Crop] {
        &self.crops
    }

    /// Statistics accumulated so far. Fully populated after a successful
    /// `process()`.
    pub fn stats(&self) -> &ExtractionStats {
        &self.stats
    }

    /// The input string this run loaded, if any.
    pub fn source_name(&self) -> Option<&str> {
        self.source_name.as_deref()
    }

    /// Number of pages loaded and awaiting processing.
    pub fn loaded_pages(&self) -> usize {
        self.pages.len()
    }

    /// Resolve `input` (path or URL), rasterize the selected pages and keep
    /// them on the run. Returns the number of pages loaded.
    ///
    /// Transitions `Idle → Loading → Idle`, or to `Error` on failure.
    pub async fn load(&mut self, input: &str) -> Result<usize, ExtractError> {
        self.set_state(RunState::Loading);
        match self.load_inner(input).await {
            Ok(count) => {
                self.set_state(RunState::Idle);
                Ok(count)
            }
            Err(e) => {
                self.set_state(RunState::Error {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Detect regions matching `instruction` on every loaded page and crop
    /// them. Returns the number of crops produced.
    ///
    /// Pages are processed strictly in order, one detection call at a time;
    /// nothing is retried. The crops replace any previous result on this
    /// run, so the same document can be re-processed with a different
    /// instruction.
    pub async fn process(&mut self, instruction: &str) -> Result<usize, ExtractError> {
        // Guard failures reject the call without a state transition.
        if self.pages.is_empty() {
            return Err(ExtractError::NoDocumentLoaded);
        }
        let instruction = instruction.trim();
        if instruction.is_empty() {
            return Err(ExtractError::EmptyInstruction);
        }

        self.set_state(RunState::Processing);
        match self.process_inner(instruction).await {
            Ok(count) => {
                self.set_state(RunState::Success);
                Ok(count)
            }
            Err(e) => {
                self.set_state(RunState::Error {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Discard the loaded document, crops and statistics, returning the run
    /// to its initial `Idle` state. The configuration is kept.
    pub fn reset(&mut self) {
        self.source_name = None;
        self.document_pages = 0;
        self.pages.clear();
        self.crops.clear();
        self.stats = ExtractionStats::default();
        self.set_state(RunState::Idle);
    }

    /// Consume the run, yielding the crops and statistics.
    ///
    /// Meaningful after a successful `process()`.
    pub fn into_output(self) -> ExtractionOutput {
        ExtractionOutput {
            crops: self.crops,
            stats: self.stats,
        }
    }

    async fn load_inner(&mut self, input: &str) -> Result<usize, ExtractError> {
        let render_start = Instant::now();

        let (resolved, kind) =
            input::resolve_input(input, self.config.download_timeout_secs).await?;
        let path = resolved.path().to_path_buf();

        let total = rasterize::page_count(&path, kind, self.config.password.as_deref()).await?;
        debug!("Document has {} page(s)", total);

        let page_indices = self.config.pages.to_indices(total);
        if page_indices.is_empty() {
            return Err(ExtractError::PageOutOfRange {
                page: 0,
                total,
            });
        }

        let pages = rasterize::rasterize_document(&path, kind, &self.config, &page_indices).await?;

        self.source_name = Some(input.to_string());
        self.document_pages = total;
        self.stats = ExtractionStats {
            total_pages: total,
            render_duration_ms: render_start.elapsed().as_millis() as u64,
            ..ExtractionStats::default()
        };
        self.pages = pages;

        info!(
            "Loaded {} of {} page(s) from {} in {}ms",
            self.pages.len(),
            total,
            input,
            self.stats.render_duration_ms
        );
        Ok(self.pages.len())
    }

    async fn process_inner(&mut self, instruction: &str) -> Result<usize, ExtractError> {
        let start = Instant::now();
        let model = resolve_vision(&self.config)?;
        let total = self.pages.len();

        if let Some(cb) = &self.config.progress {
            cb.on_run_start(total);
        }
        let mut tracker = ProgressTracker::new(total);

        let mut crops: Vec<Crop> = Vec::new();
        let mut detected_regions = 0usize;
        let mut skipped_regions = 0usize;
        let mut detection_duration_ms = 0u64;

        for seq in 0..total {
            let page = &self.pages[seq];
            let page_num = page.number();

            if let Some(cb) = &self.config.progress {
                cb.on_page_start(page_num, total);
            }

            let payload = encode::encode_page(&page.image)?;

            if let Some(cb) = &self.config.progress {
                cb.on_progress(tracker.checkpoint(seq, STEP_DETECT_SENT));
            }

            let detect_start = Instant::now();
            let regions =
                detect::detect_regions(&model, page_num, payload, instruction, &self.config)
                    .await?;
            detection_duration_ms += detect_start.elapsed().as_millis() as u64;
            detected_regions += regions.len();

            if let Some(cb) = &self.config.progress {
                cb.on_progress(tracker.checkpoint(seq, STEP_DETECT_DONE));
                cb.on_page_detected(page_num, total, regions.len());
            }

            let mut page_crops = 0usize;
            for region in &regions {
                let label = if self.document_pages > 1 {
                    format!("Page {} - {}", page_num, region.label)
                } else {
                    region.label.clone()
                };
                match crop::crop_region(&page.image, &label, &region.box_2d, page_num) {
                    Ok(c) => {
                        crops.push(c);
                        page_crops += 1;
                    }
                    Err(e) => {
                        warn!("Skipping region '{}' on page {}: {}", region.label, page_num, e);
                        skipped_regions += 1;
                        if let Some(cb) = &self.config.progress {
                            cb.on_region_skipped(page_num, &region.label);
                        }
                    }
                }
            }

            if let Some(cb) = &self.config.progress {
                cb.on_progress(tracker.checkpoint(seq, STEP_PAGE_DONE));
                cb.on_page_complete(page_num, total, page_crops);
            }
        }

        if crops.is_empty() {
            return Err(ExtractError::NoRegionsFound { pages: total });
        }

        self.stats.pages_processed = total;
        self.stats.detected_regions = detected_regions;
        self.stats.produced_crops = crops.len();
        self.stats.skipped_regions = skipped_regions;
        self.stats.detection_duration_ms = detection_duration_ms;
        self.stats.total_duration_ms =
            self.stats.render_duration_ms + start.elapsed().as_millis() as u64;
        self.crops = crops;

        if let Some(cb) = &self.config.progress {
            cb.on_run_complete(total, self.crops.len());
        }

        info!(
            "Processed {} page(s): {} crop(s), {} skipped, {}ms total",
            total,
            self.crops.len(),
            skipped_regions,
            self.stats.total_duration_ms
        );
        Ok(self.crops.len())
    }

    fn set_state(&mut self, state: RunState) {
        if let Some(cb) = &self.config.progress {
            cb.on_state_change(&state);
        }
        self.state = state;
    }
}

/// Pick the vision backend, from most-specific to least-specific.
///
/// 1. A pre-built backend on the config is used as-is, no credential check.
/// 2. An explicitly configured key is used even when the environment also
///    has one; an explicitly configured *empty* key is an error rather than
///    a silent fallback.
/// 3. Otherwise `GEMINI_API_KEY` from the environment.
fn resolve_vision(config: &ExtractionConfig) -> Result<Arc<dyn VisionModel>, ExtractError> {
    if let Some(backend) = &config.vision {
        return Ok(Arc::clone(backend));
    }

    let key = match &config.api_key {
        Some(k) => k.clone(),
        None => std::env::var("GEMINI_API_KEY").unwrap_or_default(),
    };
    let mut backend = GeminiVision::new(key, &config.model, config.api_timeout_secs)?;
    if let Some(base) = &config.api_base {
        backend = backend.with_base_url(base.clone());
    }
    Ok(Arc::new(backend))
}
