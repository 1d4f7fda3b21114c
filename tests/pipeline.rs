//! Integration tests for the full detect-and-crop pipeline.
//!
//! Most tests drive `Run` with a scripted in-memory vision backend, so they
//! are deterministic and run offline on every `cargo test`. The live-API
//! tests at the bottom make real Gemini calls and are gated behind two
//! environment variables so they never run in CI by accident.
//!
//! Run the offline suite:
//!   cargo test --test pipeline
//!
//! Run the live tests as well:
//!   DOCSNIP_E2E_INPUT=/path/to/exam.pdf GEMINI_API_KEY=... \
//!     cargo test --test pipeline live_ -- --nocapture

use async_trait::async_trait;
use docsnip::{
    build_archive, entry_filename, DetectionRequest, ExtractError, ExtractionConfig,
    ExtractionProgressCallback, Page, Run, RunState, VisionModel,
};
use image::{Rgb, RgbImage};
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// A vision backend that replays canned responses, one per `generate` call.
///
/// Captures every request it receives so tests can assert on the prompt and
/// payload plumbing without any network involvement.
struct ScriptedVision {
    responses: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<DetectionRequest>>,
    calls: AtomicUsize,
}

impl ScriptedVision {
    fn new(responses: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.iter().map(|s| s.to_string()).collect()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn requests(&self) -> Vec<DetectionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl VisionModel for ScriptedVision {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: DetectionRequest) -> Result<String, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ExtractError::Internal("scripted backend ran out of responses".into()))
    }
}

/// Records every progress event for later assertions.
#[derive(Default)]
struct RecordingCallback {
    states: Mutex<Vec<String>>,
    percents: Mutex<Vec<u8>>,
    skipped: Mutex<Vec<String>>,
    run_started_with: AtomicUsize,
    run_completed_with: AtomicUsize,
}

impl ExtractionProgressCallback for RecordingCallback {
    fn on_state_change(&self, state: &RunState) {
        self.states.lock().unwrap().push(format!("{state:?}"));
    }

    fn on_run_start(&self, total_pages: usize) {
        self.run_started_with.store(total_pages, Ordering::SeqCst);
    }

    fn on_region_skipped(&self, _page_num: usize, label: &str) {
        self.skipped.lock().unwrap().push(label.to_string());
    }

    fn on_progress(&self, percent: u8) {
        self.percents.lock().unwrap().push(percent);
    }

    fn on_run_complete(&self, _total_pages: usize, total_crops: usize) {
        self.run_completed_with.store(total_crops, Ordering::SeqCst);
    }
}

fn white_page(index: usize, width: u32, height: u32) -> Page {
    Page {
        index,
        image: RgbImage::from_pixel(width, height, Rgb([255, 255, 255])),
    }
}

fn config_with(backend: Arc<ScriptedVision>) -> ExtractionConfig {
    ExtractionConfig::builder()
        .vision(backend)
        .build()
        .expect("valid config")
}

const TWO_QUESTIONS: &str = r#"[
    {"label": "Question 1", "box_2d": {"ymin": 100, "xmin": 50, "ymax": 250, "xmax": 950}},
    {"label": "Question 2", "box_2d": {"ymin": 260, "xmin": 50, "ymax": 400, "xmax": 950}}
]"#;

// ── Single-page runs (scripted backend) ──────────────────────────────────────

#[tokio::test]
async fn single_page_run_crops_every_detection() {
    let backend = ScriptedVision::new(&[TWO_QUESTIONS]);
    let cb = Arc::new(RecordingCallback::default());

    let config = ExtractionConfig::builder()
        .vision(Arc::clone(&backend) as Arc<dyn VisionModel>)
        .progress_callback(Arc::clone(&cb) as Arc<dyn ExtractionProgressCallback>)
        .build()
        .expect("valid config");

    let mut run = Run::with_pages(config, vec![white_page(0, 1000, 1000)]);
    let produced = run.process("every question").await.expect("process");

    assert_eq!(produced, 2);
    assert_eq!(*run.state(), RunState::Success);
    assert_eq!(backend.calls(), 1, "one page means one detection call");

    // Page order, then model output order within the page.
    let crops = run.crops();
    assert_eq!(crops.len(), 2);
    assert_eq!(crops[0].label, "Question 1");
    assert_eq!(crops[1].label, "Question 2");

    // {100, 50, 250, 950} + 15 padding on a 1000×1000 page → 930×180 px.
    assert_eq!((crops[0].width, crops[0].height), (930, 180));
    assert_eq!((crops[1].width, crops[1].height), (930, 170));

    for crop in crops {
        assert_eq!(crop.page, 1);
        assert_eq!(&crop.bytes[..2], &[0xFF, 0xD8], "crops must be JPEG");
        assert_eq!(crop.id.len(), 36, "id must be a UUID");
    }

    // Stats reflect what actually happened.
    let stats = run.stats();
    assert_eq!(stats.pages_processed, 1);
    assert_eq!(stats.detected_regions, 2);
    assert_eq!(stats.produced_crops, 2);
    assert_eq!(stats.skipped_regions, 0);

    // Lifecycle events: one transition in, one terminal.
    assert_eq!(
        *cb.states.lock().unwrap(),
        vec!["Processing".to_string(), "Success".to_string()]
    );
    assert_eq!(cb.run_started_with.load(Ordering::SeqCst), 1);
    assert_eq!(cb.run_completed_with.load(Ordering::SeqCst), 2);

    // Percent sequence for one page: request sent, response parsed, page done.
    assert_eq!(*cb.percents.lock().unwrap(), vec![20, 60, 100]);
}

#[tokio::test]
async fn single_page_labels_are_not_prefixed() {
    let backend = ScriptedVision::new(&[TWO_QUESTIONS]);
    let mut run = Run::with_pages(config_with(Arc::clone(&backend)), vec![white_page(0, 500, 500)]);

    run.process("every question").await.expect("process");

    // One-page documents keep the raw model labels.
    assert!(run.crops().iter().all(|c| !c.label.starts_with("Page ")));
}

#[tokio::test]
async fn detection_request_carries_instruction_and_page_payload() {
    let backend = ScriptedVision::new(&["[]"]);
    let mut run = Run::with_pages(config_with(Arc::clone(&backend)), vec![white_page(0, 200, 200)]);

    // "[]" means no regions anywhere, which is an error; the request still
    // went out and is what this test inspects.
    let err = run.process("every diagram with a caption").await.unwrap_err();
    assert!(matches!(err, ExtractError::NoRegionsFound { pages: 1 }));

    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].prompt.contains("every diagram with a caption"));
    assert!(!requests[0].image_base64.is_empty());
    assert_eq!(requests[0].mime_type, "image/jpeg");

    // No override configured, so the built-in contract is in force.
    assert_eq!(
        requests[0].system_instruction,
        docsnip::prompts::DETECTION_SYSTEM_PROMPT
    );
}

#[tokio::test]
async fn custom_system_prompt_reaches_the_backend() {
    let backend = ScriptedVision::new(&["[]"]);

    let config = ExtractionConfig::builder()
        .vision(Arc::clone(&backend) as Arc<dyn VisionModel>)
        .system_prompt("Find only tables.")
        .build()
        .expect("valid config");

    let mut run = Run::with_pages(config, vec![white_page(0, 100, 100)]);
    let _ = run.process("tables").await;

    assert_eq!(backend.requests()[0].system_instruction, "Find only tables.");
}

// ── Failure paths ────────────────────────────────────────────────────────────

#[tokio::test]
async fn no_detections_anywhere_is_an_error() {
    let backend = ScriptedVision::new(&["[]"]);
    let cb = Arc::new(RecordingCallback::default());

    let config = ExtractionConfig::builder()
        .vision(Arc::clone(&backend) as Arc<dyn VisionModel>)
        .progress_callback(Arc::clone(&cb) as Arc<dyn ExtractionProgressCallback>)
        .build()
        .expect("valid config");

    let mut run = Run::with_pages(config, vec![white_page(0, 1000, 1000)]);
    let err = run.process("unicorns").await.unwrap_err();

    assert!(matches!(err, ExtractError::NoRegionsFound { pages: 1 }));
    assert!(run.crops().is_empty());
    assert!(matches!(run.state(), RunState::Error { .. }));

    let states = cb.states.lock().unwrap().clone();
    assert_eq!(states[0], "Processing");
    assert!(states.last().unwrap().starts_with("Error"));
}

#[tokio::test]
async fn malformed_model_output_aborts_the_run() {
    let backend = ScriptedVision::new(&["The image shows three questions."]);
    let mut run = Run::with_pages(
        config_with(Arc::clone(&backend)),
        vec![white_page(0, 1000, 1000)],
    );

    let err = run.process("every question").await.unwrap_err();

    assert!(matches!(err, ExtractError::SchemaViolation { .. }));
    assert!(run.crops().is_empty());
    assert!(matches!(run.state(), RunState::Error { .. }));
    assert_eq!(backend.calls(), 1, "schema violations must not be retried");
}

#[tokio::test]
async fn degenerate_region_is_skipped_not_fatal() {
    // "Ghost" is inverted beyond what padding can repair; "Question 1" is fine.
    let payload = r#"[
        {"label": "Question 1", "box_2d": {"ymin": 100, "xmin": 50, "ymax": 250, "xmax": 950}},
        {"label": "Ghost", "box_2d": {"ymin": 500, "xmin": 400, "ymax": 400, "xmax": 350}}
    ]"#;
    let backend = ScriptedVision::new(&[payload]);
    let cb = Arc::new(RecordingCallback::default());

    let config = ExtractionConfig::builder()
        .vision(Arc::clone(&backend) as Arc<dyn VisionModel>)
        .progress_callback(Arc::clone(&cb) as Arc<dyn ExtractionProgressCallback>)
        .build()
        .expect("valid config");

    let mut run = Run::with_pages(config, vec![white_page(0, 1000, 1000)]);
    let produced = run.process("every question").await.expect("process");

    assert_eq!(produced, 1);
    assert_eq!(*run.state(), RunState::Success);
    assert_eq!(run.crops()[0].label, "Question 1");

    let stats = run.stats();
    assert_eq!(stats.detected_regions, 2);
    assert_eq!(stats.produced_crops, 1);
    assert_eq!(stats.skipped_regions, 1);

    assert_eq!(*cb.skipped.lock().unwrap(), vec!["Ghost".to_string()]);
}

// ── Multi-page runs ──────────────────────────────────────────────────────────

#[tokio::test]
async fn multi_page_run_prefixes_labels_and_tolerates_empty_pages() {
    // Page 1 answers inside a Markdown fence (models do this); page 2 is empty.
    let fenced = "```json\n[{\"label\": \"Title\", \"box_2d\": {\"ymin\": 50, \"xmin\": 100, \"ymax\": 150, \"xmax\": 900}}]\n```";
    let backend = ScriptedVision::new(&[fenced, "[]"]);
    let cb = Arc::new(RecordingCallback::default());

    let config = ExtractionConfig::builder()
        .vision(Arc::clone(&backend) as Arc<dyn VisionModel>)
        .progress_callback(Arc::clone(&cb) as Arc<dyn ExtractionProgressCallback>)
        .build()
        .expect("valid config");

    let mut run = Run::with_pages(
        config,
        vec![white_page(0, 1000, 1000), white_page(1, 1000, 1000)],
    );
    let produced = run.process("the title").await.expect("process");

    assert_eq!(produced, 1);
    assert_eq!(backend.calls(), 2, "every page gets exactly one call");
    assert_eq!(*run.state(), RunState::Success);

    // Multi-page documents qualify labels with their page number.
    assert_eq!(run.crops()[0].label, "Page 1 - Title");
    assert_eq!(run.crops()[0].page, 1);

    let stats = run.stats();
    assert_eq!(stats.pages_processed, 2);
    assert_eq!(stats.detected_regions, 1);

    // Two pages split the bar evenly; the empty page still advances it.
    assert_eq!(*cb.percents.lock().unwrap(), vec![10, 30, 50, 60, 80, 100]);
}

#[tokio::test]
async fn reprocessing_replaces_earlier_crops() {
    let backend = ScriptedVision::new(&[
        TWO_QUESTIONS,
        r#"[{"label": "Header", "box_2d": {"ymin": 20, "xmin": 20, "ymax": 120, "xmax": 980}}]"#,
    ]);
    let mut run = Run::with_pages(
        config_with(Arc::clone(&backend)),
        vec![white_page(0, 1000, 1000)],
    );

    run.process("every question").await.expect("first pass");
    assert_eq!(run.crops().len(), 2);

    // Same loaded document, new instruction: old crops must not accumulate.
    run.process("the header").await.expect("second pass");
    assert_eq!(run.crops().len(), 1);
    assert_eq!(run.crops()[0].label, "Header");
    assert_eq!(backend.calls(), 2);
}

// ── Archive assembly from a real run ─────────────────────────────────────────

#[tokio::test]
async fn archive_from_run_preserves_order_names_and_bytes() {
    let backend = ScriptedVision::new(&[TWO_QUESTIONS]);
    let mut run = Run::with_pages(
        config_with(Arc::clone(&backend)),
        vec![white_page(0, 1000, 1000)],
    );
    run.process("every question").await.expect("process");

    let archive = build_archive(run.crops()).expect("archive");
    let mut zip = zip::ZipArchive::new(Cursor::new(archive)).expect("valid zip");

    assert_eq!(zip.len(), 2);
    assert_eq!(zip.by_index(0).expect("entry 0").name(), "question_1_1.jpg");
    assert_eq!(zip.by_index(1).expect("entry 1").name(), "question_2_2.jpg");

    // Entry names are reproducible from the crops alone.
    for (i, crop) in run.crops().iter().enumerate() {
        assert_eq!(
            zip.by_index(i).expect("entry").name(),
            entry_filename(&crop.label, i)
        );
    }

    // Archive bytes are the crop bytes, untouched.
    use std::io::Read as _;
    let mut first = Vec::new();
    zip.by_index(0)
        .expect("entry 0")
        .read_to_end(&mut first)
        .expect("read entry");
    assert_eq!(first, run.crops()[0].bytes);
}

// ── One-shot API over a real file ────────────────────────────────────────────

#[tokio::test]
async fn extract_runs_end_to_end_over_a_png_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("figure.png");
    RgbImage::from_pixel(64, 64, Rgb([230, 230, 230]))
        .save(&path)
        .expect("write test png");

    let backend = ScriptedVision::new(&[
        r#"[{"label": "Figure", "box_2d": {"ymin": 100, "xmin": 100, "ymax": 900, "xmax": 900}}]"#,
    ]);
    let config = config_with(Arc::clone(&backend));

    let output = docsnip::extract(path.to_str().unwrap(), "the figure", &config)
        .await
        .expect("extract");

    assert_eq!(output.crops.len(), 1);
    assert_eq!(output.stats.total_pages, 1);

    // 800 normalized units + 2×15 padding on a 64 px page → 53 px.
    assert_eq!((output.crops[0].width, output.crops[0].height), (53, 53));
    assert_eq!(&output.crops[0].bytes[..2], &[0xFF, 0xD8]);
}

#[tokio::test]
async fn load_then_inspect_state_without_processing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("page.png");
    RgbImage::from_pixel(32, 32, Rgb([255, 255, 255]))
        .save(&path)
        .expect("write test png");

    let mut run = Run::new(ExtractionConfig::default());
    let loaded = run.load(path.to_str().unwrap()).await.expect("load");

    assert_eq!(loaded, 1);
    assert_eq!(run.loaded_pages(), 1);
    assert_eq!(*run.state(), RunState::Idle, "loaded but not yet processing");
    assert_eq!(run.source_name(), path.to_str());
    assert!(run.crops().is_empty());
}

#[tokio::test]
async fn manifest_serialises_without_crop_bytes() {
    let backend = ScriptedVision::new(&[TWO_QUESTIONS]);
    let config = config_with(Arc::clone(&backend));

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("doc.png");
    RgbImage::from_pixel(100, 100, Rgb([255, 255, 255]))
        .save(&path)
        .expect("write test png");

    let output = docsnip::extract(path.to_str().unwrap(), "every question", &config)
        .await
        .expect("extract");

    let json = serde_json::to_value(&output).expect("manifest must serialise");
    let crops = json["crops"].as_array().expect("crops array");
    assert_eq!(crops.len(), 2);
    assert!(crops[0].get("bytes").is_none(), "bytes stay out of manifests");
    assert_eq!(crops[0]["label"], "Question 1");
    assert!(json["stats"]["total_duration_ms"].is_u64());
}

// ── Live Gemini tests (opt-in) ───────────────────────────────────────────────

/// Skip unless DOCSNIP_E2E_INPUT points at an existing document *and*
/// GEMINI_API_KEY is set.
macro_rules! live_skip_unless_ready {
    () => {{
        let Ok(input) = std::env::var("DOCSNIP_E2E_INPUT") else {
            println!("SKIP — set DOCSNIP_E2E_INPUT=/path/to/doc.pdf to run live tests");
            return;
        };
        if std::env::var("GEMINI_API_KEY").is_err() {
            println!("SKIP — GEMINI_API_KEY not set");
            return;
        }
        if !std::path::Path::new(&input).exists() {
            println!("SKIP — test file not found: {input}");
            return;
        }
        input
    }};
}

/// Live smoke test: detect and crop questions from a real document.
#[tokio::test]
async fn live_extract_produces_crops() {
    let input = live_skip_unless_ready!();

    let config = ExtractionConfig::builder()
        .api_timeout_secs(180)
        .build()
        .expect("valid config");

    let output = docsnip::extract(&input, "every question", &config)
        .await
        .expect("live extraction should succeed");

    assert!(!output.crops.is_empty(), "expected at least one crop");
    for crop in &output.crops {
        assert_eq!(&crop.bytes[..2], &[0xFF, 0xD8]);
        assert!(crop.width > 0 && crop.height > 0);
        println!(
            "[live] {} — page {}, {}×{}, {} bytes",
            crop.label,
            crop.page,
            crop.width,
            crop.height,
            crop.bytes.len()
        );
    }
    println!(
        "[live] {} crop(s) from {} page(s) in {}ms",
        output.stats.produced_crops, output.stats.pages_processed, output.stats.total_duration_ms
    );
}

/// Live inspect: no API key needed, but reuses the same gating for the file.
#[tokio::test]
async fn live_inspect_reports_page_count() {
    let input = live_skip_unless_ready!();

    let info = docsnip::inspect(&input, &ExtractionConfig::default())
        .await
        .expect("inspect should succeed");

    assert!(info.page_count >= 1);
    println!("[live] {:?}: {} page(s)", info.format, info.page_count);
}
