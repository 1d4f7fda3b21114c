//! Progress-callback trait for run lifecycle and per-page events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! real-time events as the pipeline processes each page.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers can
//! forward events to a Tokio broadcast channel, a WebSocket, a database record,
//! or a terminal progress bar — without the library knowing anything about how
//! the host application communicates. The trait is `Send + Sync` so callbacks
//! can be shared across threads freely.
//!
//! # Example
//!
//! ```rust
//! use docsnip::{ExtractionProgressCallback, ExtractionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl ExtractionProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, page_num: usize, total_pages: usize, crops: usize) {
//!         let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{done} done — page {page_num}/{total_pages} gave {crops} crop(s)");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::run::RunState;
use std::sync::Arc;

/// Called by the pipeline as a run loads and processes pages.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Events for one run arrive strictly in order; the
/// pipeline is sequential.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called on every run state transition, including the terminal one.
    fn on_state_change(&self, state: &RunState) {
        let _ = state;
    }

    /// Called once before the first detection request of a run.
    ///
    /// # Arguments
    /// * `total_pages` — number of pages that will be processed
    fn on_run_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called just before the detection request is sent for a page.
    ///
    /// # Arguments
    /// * `page_num`    — 1-indexed page number
    /// * `total_pages` — pages being processed in this run
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when the detection response for a page has been parsed.
    ///
    /// # Arguments
    /// * `regions` — number of regions the model reported for this page
    fn on_page_detected(&self, page_num: usize, total_pages: usize, regions: usize) {
        let _ = (page_num, total_pages, regions);
    }

    /// Called when a detected region is skipped because its box collapsed
    /// after padding and clamping.
    fn on_region_skipped(&self, page_num: usize, label: &str) {
        let _ = (page_num, label);
    }

    /// Called when all of a page's regions have been cropped.
    ///
    /// # Arguments
    /// * `crops` — number of crops produced for this page
    fn on_page_complete(&self, page_num: usize, total_pages: usize, crops: usize) {
        let _ = (page_num, total_pages, crops);
    }

    /// Called with the coarse overall progress, 0–100.
    ///
    /// Values never decrease within a run. Each page contributes an equal
    /// share, subdivided at the detection-request, detection-response and
    /// page-complete checkpoints.
    fn on_progress(&self, percent: u8) {
        let _ = percent;
    }

    /// Called once after the last page, before the run reaches its terminal
    /// state.
    ///
    /// # Arguments
    /// * `total_crops` — crops produced across all pages
    fn on_run_complete(&self, total_pages: usize, total_crops: usize) {
        let _ = (total_pages, total_crops);
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

// ── Percent bookkeeping ──────────────────────────────────────────────────

/// Per-page checkpoint: detection request sent.
pub(crate) const STEP_DETECT_SENT: f64 = 0.2;
/// Per-page checkpoint: detection response parsed.
pub(crate) const STEP_DETECT_DONE: f64 = 0.6;
/// Per-page checkpoint: all crops for the page produced.
pub(crate) const STEP_PAGE_DONE: f64 = 1.0;

/// Converts per-page checkpoints into a monotone 0–100 percentage.
///
/// Each page owns an equal share of the bar; a checkpoint is a fraction of
/// that share. The high-water mark is kept so late low checkpoints (page
/// shares round unevenly) can never move the bar backwards.
pub(crate) struct ProgressTracker {
    total_pages: usize,
    last_percent: u8,
}

impl ProgressTracker {
    pub(crate) fn new(total_pages: usize) -> Self {
        Self {
            total_pages: total_pages.max(1),
            last_percent: 0,
        }
    }

    /// Record the checkpoint `fraction` (0.0–1.0) of page `seq` (0-based in
    /// processing order) and return the percentage to report.
    pub(crate) fn checkpoint(&mut self, seq: usize, fraction: f64) -> u8 {
        let share = 100.0 / self.total_pages as f64;
        let raw = (seq as f64 * share + share * fraction).round();
        let percent = (raw as u8).min(100).max(self.last_percent);
        self.last_percent = percent;
        percent
    }
}
