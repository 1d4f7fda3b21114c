//! CLI binary for docsnip.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig` and writes the resulting crops to disk.

use anyhow::{bail, Context, Result};
use clap::Parser;
use docsnip::{
    build_archive, entry_filename, extract, inspect, Crop, ExtractionConfig,
    ExtractionProgressCallback, PageSelection, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: renders a live percent bar and per-page log
/// lines using [indicatif]. The pipeline is strictly sequential, so events
/// always arrive in page order.
struct CliProgressCallback {
    /// The single progress bar anchored at the bottom of the terminal.
    bar: ProgressBar,
    /// Per-page wall-clock start times for elapsed reporting.
    start_times: Mutex<HashMap<usize, Instant>>,
    /// Count of regions skipped for degenerate boxes.
    skipped: AtomicUsize,
}

impl CliProgressCallback {
    /// Create a callback that starts as a plain spinner; the percent bar is
    /// activated by `on_run_start` once the document is loaded.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(100);

        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening document…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            skipped: AtomicUsize::new(0),
        })
    }

    /// Switch to the full percent-bar style once processing starts.
    fn activate_bar(&self) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}%  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(100);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Extracting");
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_pages: usize) {
        self.activate_bar();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Detecting regions on {total_pages} page(s)…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        self.start_times
            .lock()
            .unwrap()
            .insert(page_num, Instant::now());
        self.bar
            .set_message(format!("page {page_num}/{total_pages}"));
    }

    fn on_page_detected(&self, page_num: usize, total_pages: usize, regions: usize) {
        self.bar.set_message(format!(
            "page {page_num}/{total_pages}: cropping {regions} region(s)"
        ));
    }

    fn on_region_skipped(&self, page_num: usize, label: &str) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} Page {}: skipped degenerate region '{}'",
            cyan("⚠"),
            page_num,
            label
        ));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, crops: usize) {
        let elapsed_ms = self
            .start_times
            .lock()
            .unwrap()
            .remove(&page_num)
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<10}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{crops:>2} crop(s)")),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
    }

    fn on_progress(&self, percent: u8) {
        self.bar.set_position(u64::from(percent));
    }

    fn on_run_complete(&self, total_pages: usize, total_crops: usize) {
        self.bar.finish_and_clear();
        let skipped = self.skipped.load(Ordering::SeqCst);

        if skipped == 0 {
            eprintln!(
                "{} {} crop(s) from {} page(s)",
                green("✔"),
                bold(&total_crops.to_string()),
                total_pages
            );
        } else {
            eprintln!(
                "{} {} crop(s) from {} page(s)  ({} region(s) skipped)",
                cyan("⚠"),
                bold(&total_crops.to_string()),
                total_pages,
                red(&skipped.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Crop every question out of an exam paper (writes a zip in the cwd)
  docsnip exam.pdf "every question"

  # Individual JPEGs into a directory
  docsnip exam.pdf "every question" -o crops/

  # Specific pages of a long PDF
  docsnip --pages 2-5 exam.pdf "all tables"

  # A single photographed worksheet
  docsnip worksheet.jpg "each exercise, including its instructions"

  # From a URL, into a named archive
  docsnip https://example.com/exam.pdf "every question" --zip exam_crops.zip

  # Document info only (no API key needed)
  docsnip --inspect-only exam.pdf

  # JSON manifest (crop metadata + stats, no image bytes) on stdout
  docsnip --json exam.pdf "every question" > manifest.json

MODELS:
  Any Gemini model with vision input and structured JSON output works.
  Default: gemini-3-flash-preview. Override with --model or DOCSNIP_MODEL.

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY            Gemini API key (or pass --api-key)
  DOCSNIP_MODEL             Override the model ID
  DOCSNIP_PDFIUM_PATH       Path to an existing libpdfium — skips auto-download
  DOCSNIP_PDFIUM_CACHE_DIR  Override the default pdfium cache directory

SETUP:
  1. Set API key:  export GEMINI_API_KEY=...
  2. Extract:      docsnip exam.pdf "every question"

  PDFium (~30 MB) is downloaded automatically on first run and cached in
  ~/.cache/docsnip/pdfium-7690/. No manual library setup is required.
  To use an existing pdfium copy: DOCSNIP_PDFIUM_PATH=/path/to/libpdfium docsnip ...
"#;

/// Detect and crop labeled regions from images and PDFs using vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "docsnip",
    version,
    about = "Detect and crop labeled regions from images and PDFs using vision LLMs",
    long_about = "Detect and crop regions from documents (local files or URLs) by describing them \
in plain language. Each page is rasterised and sent to a Gemini vision model, which returns \
labeled bounding boxes; docsnip pads, cuts and saves each one as a JPEG, plus a zip of the lot.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local file path (PDF, PNG or JPEG) or HTTP/HTTPS URL.
    input: String,

    /// What to find, e.g. "every question". Required unless --inspect-only.
    instruction: Option<String>,

    /// Write each crop as an individual JPEG into this directory.
    #[arg(short, long, env = "DOCSNIP_OUT_DIR")]
    out_dir: Option<PathBuf>,

    /// Write all crops as a zip archive to this path.
    ///
    /// Default when neither --out-dir nor --json is given:
    /// {input stem}_extracted_{timestamp}.zip in the current directory.
    #[arg(long, env = "DOCSNIP_ZIP")]
    zip: Option<PathBuf>,

    /// Gemini model ID.
    #[arg(long, env = "DOCSNIP_MODEL",
          default_value = docsnip::vision::gemini::DEFAULT_MODEL)]
    model: String,

    /// Gemini API key.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Override the vision API base URL (testing, proxies).
    #[arg(long, env = "DOCSNIP_API_BASE")]
    api_base: Option<String>,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "DOCSNIP_PAGES", default_value = "all")]
    pages: String,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "DOCSNIP_PASSWORD")]
    password: Option<String>,

    /// Rasterisation scale factor for PDF pages (0.5–4.0).
    #[arg(long, env = "DOCSNIP_SCALE", default_value_t = 2.0)]
    scale: f32,

    /// Path to a text file containing a custom detection system prompt.
    #[arg(long, env = "DOCSNIP_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Output the run manifest as JSON (crop metadata + stats, no bytes).
    #[arg(long, env = "DOCSNIP_JSON")]
    json: bool,

    /// Disable the progress bar.
    #[arg(long, env = "DOCSNIP_NO_PROGRESS")]
    no_progress: bool,

    /// Print document info only, no extraction. No API key needed.
    #[arg(long)]
    inspect_only: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCSNIP_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCSNIP_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "DOCSNIP_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per-page detection call timeout in seconds.
    #[arg(long, env = "DOCSNIP_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Ensure the PDFium engine is available ────────────────────────────
    // With `--features bundled` (the default build) the library bytes were
    // embedded at compile time and extraction is instant. Otherwise, on the
    // very first run docsnip downloads the library (~30 MB) to
    //   ~/.cache/docsnip/pdfium-{VERSION}/
    // Subsequent startups skip this block entirely (path check only).
    if !docsnip_pdfium::is_pdfium_cached() {
        if !cli.quiet && !cli.json {
            let dl_bar = ProgressBar::new(0);
            dl_bar.set_style(
                ProgressStyle::with_template(
                    "{spinner:.cyan} {prefix:.bold}  \
                     [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▉▊▋▌▍▎▏  ")
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
            );
            dl_bar.set_prefix("PDF engine");
            dl_bar.set_message("Connecting…");
            dl_bar.enable_steady_tick(Duration::from_millis(80));

            let bar = dl_bar.clone();
            // block_in_place keeps the reference lifetime valid (no 'static
            // requirement) while still offloading the blocking download from
            // the async executor's hot path.
            tokio::task::block_in_place(|| {
                docsnip_pdfium::ensure_pdfium_library(Some(&|downloaded, total| {
                    if let Some(t) = total {
                        if bar.length().unwrap_or(0) != t {
                            bar.set_length(t);
                        }
                    }
                    bar.set_position(downloaded);
                }))
            })
            .context("Failed to set up the PDFium engine")?;

            dl_bar.finish_with_message("ready ✓");
        } else {
            tokio::task::block_in_place(|| docsnip_pdfium::ensure_pdfium_library(None))
                .context("Failed to set up the PDFium engine")?;
        }
    }

    // ── Build config ─────────────────────────────────────────────────────
    let mut config = build_config(&cli).await?;

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let info = inspect(&cli.input, &config)
            .await
            .context("Failed to inspect document")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&info).context("Failed to serialise info")?
            );
        } else {
            println!("File:    {}", cli.input);
            println!("Format:  {:?}", info.format);
            println!("Pages:   {}", info.page_count);
        }
        return Ok(());
    }

    let instruction = match &cli.instruction {
        Some(s) => s.as_str(),
        None => bail!(
            "An instruction is required.\nExample: docsnip {} \"every question\"",
            cli.input
        ),
    };

    if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        config.progress = Some(cb as ProgressCallback);
    }

    // ── Run extraction ───────────────────────────────────────────────────
    let output = extract(&cli.input, instruction, &config)
        .await
        .context("Extraction failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    }

    // ── Write crops to disk ──────────────────────────────────────────────
    if let Some(ref dir) = cli.out_dir {
        write_crop_files(dir, &output.crops, cli.quiet)?;
        if !cli.quiet {
            eprintln!(
                "{}  {} file(s)  →  {}",
                green("✔"),
                output.crops.len(),
                bold(&dir.display().to_string()),
            );
        }
    }

    let zip_path = match (&cli.zip, &cli.out_dir, cli.json) {
        (Some(path), _, _) => Some(path.clone()),
        (None, None, false) => Some(default_zip_path(&cli.input)),
        _ => None,
    };
    if let Some(path) = zip_path {
        let archive = build_archive(&output.crops)?;
        std::fs::write(&path, &archive)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        if !cli.quiet {
            eprintln!(
                "{}  {}  →  {}",
                green("✔"),
                dim(&human_size(archive.len() as u64)),
                bold(&path.display().to_string()),
            );
        }
    }

    // Plain summary when the progress callback didn't print one.
    if !cli.quiet && !show_progress && !cli.json {
        eprintln!(
            "Extracted {} crop(s) from {} page(s) in {}ms ({} skipped)",
            output.stats.produced_crops,
            output.stats.pages_processed,
            output.stats.total_duration_ms,
            output.stats.skipped_regions,
        );
    }

    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli) -> Result<ExtractionConfig> {
    let system_prompt = match &cli.system_prompt {
        Some(path) => Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {:?}", path))?,
        ),
        None => None,
    };

    let pages = parse_pages(&cli.pages)?;

    let mut builder = ExtractionConfig::builder()
        .render_scale(cli.scale)
        .model(&cli.model)
        .pages(pages)
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key);
    }
    if let Some(ref base) = cli.api_base {
        builder = builder.api_base(base);
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd);
    }
    if let Some(prompt) = system_prompt {
        builder = builder.system_prompt(prompt);
    }

    builder.build().context("Invalid configuration")
}

/// Write each crop as an individual JPEG, named like the zip entries.
fn write_crop_files(dir: &Path, crops: &[Crop], quiet: bool) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    for (index, crop) in crops.iter().enumerate() {
        let path = dir.join(entry_filename(&crop.label, index));
        std::fs::write(&path, &crop.bytes)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        if !quiet {
            eprintln!("  {} {}", dim("→"), path.display());
        }
    }
    Ok(())
}

/// `{input stem}_extracted_{epoch ms}.zip`, in the current directory.
fn default_zip_path(input: &str) -> PathBuf {
    let stem = Path::new(input)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "extracted".to_string());
    let epoch_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    PathBuf::from(format!("{stem}_extracted_{epoch_ms}.zip"))
}

fn human_size(bytes: u64) -> String {
    if bytes >= 1_048_576 {
        format!("{:.1} MiB", bytes as f64 / 1_048_576.0)
    } else {
        format!("{:.1} KiB", bytes as f64 / 1024.0)
    }
}

/// Parse `--pages` string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    // Range: "3-15"
    if let Some((start, end)) = s.split_once('-') {
        let start: usize = start.trim().parse().context("Invalid start page in range")?;
        let end: usize = end.trim().parse().context("Invalid end page in range")?;

        if start < 1 {
            bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
        }
        if start > end {
            bail!("Invalid page range '{}-{}': start must be <= end", start, end);
        }

        return Ok(PageSelection::Range(start, end));
    }

    // Set: "1,3,5,7"
    if s.contains(',') {
        let pages: Vec<usize> = s
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<usize>()
                    .context(format!("Invalid page number: '{}'", p.trim()))
            })
            .collect::<Result<Vec<_>>>()?;

        for &p in &pages {
            if p < 1 {
                bail!("Pages are 1-indexed, minimum is 1 (got {})", p);
            }
        }

        return Ok(PageSelection::Set(pages));
    }

    // Single page: "5"
    let page: usize = s.parse().context("Invalid page number")?;
    if page < 1 {
        bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
    }

    Ok(PageSelection::Single(page))
}
