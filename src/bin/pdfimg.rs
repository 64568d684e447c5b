//! CLI binary for edgequake-pdfimg.
//!
//! A thin shim over the library crate: maps flags onto `ExtractionConfig`
//! and `ExportSettings`, drives the background extractor with a progress
//! bar, and plays the selection surface on the terminal.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::Parser;
use edgequake_pdfimg::{
    default_log_path, export_thumbnails, inspect, CollisionPolicy, ExportReport, ExportSettings,
    ExtractionConfig, ExtractionEvent, ExtractionSession, Extractor, HarvestProgressCallback,
    PageSelection, SelectionExpr, SelectionSurface, ThumbnailFormat,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::OpenOptions;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress display using indicatif ─────────────────────────────────────

/// Terminal progress: a spinner while the PDF opens, then a bar over pages
/// during the harvest and over files during the export.
struct CliProgress {
    bar: ProgressBar,
    failed: AtomicUsize,
}

impl CliProgress {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0); // length set once the page count is known

        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Loading");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            failed: AtomicUsize::new(0),
        })
    }

    /// Switch to the full progress-bar style once we know `total`.
    fn activate_bar(&self, total: usize, prefix: &'static str, unit: &str) {
        let style = ProgressStyle::with_template(&format!(
            "{{spinner:.cyan}} {{prefix:.bold}}  [{{bar:42.green/238}}] {{pos:>3}}/{{len}} {unit}  ⏱ {{elapsed_precise}}"
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.reset();
        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix(prefix);
    }

    fn page_done(&self, page_number: u32, total: usize, images_found: usize) {
        if images_found > 0 {
            self.bar.println(format!(
                "  {} Page {:>3}/{:<3}  {}",
                green("✓"),
                page_number,
                total,
                dim(&format!("{images_found} image(s)")),
            ));
        }
        self.bar.inc(1);
    }

    fn pause(&self) {
        self.bar.finish_and_clear();
    }
}

impl HarvestProgressCallback for CliProgress {
    fn on_export_start(&self, selected: usize) {
        self.activate_bar(selected, "Saving", "files");
        self.bar.enable_steady_tick(Duration::from_millis(80));
    }

    fn on_file_written(&self, path: &Path, bytes: usize) {
        self.bar.println(format!(
            "  {} {}  {}",
            green("✓"),
            path.display(),
            dim(&human_bytes(bytes)),
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, path: &Path, error: &str) {
        self.failed.fetch_add(1, Ordering::SeqCst);
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {}  {}",
            red("✗"),
            path.display(),
            red(&msg)
        ));
        self.bar.inc(1);
    }

    fn on_export_complete(&self, _succeeded: usize, _attempted: usize) {
        self.bar.finish_and_clear();
    }
}

fn human_bytes(n: usize) -> String {
    match n {
        n if n >= 1 << 20 => format!("{:.1} MB", n as f64 / (1 << 20) as f64),
        n if n >= 1 << 10 => format!("{:.1} KB", n as f64 / (1 << 10) as f64),
        n => format!("{n} B"),
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # List the images of a PDF
  pdfimg --list report.pdf

  # Save image 2 of page 1 and everything on page 3 into ./out
  pdfimg report.pdf --select "1:2, 3" -o out

  # Save every image, named after the PDF, with native extensions
  pdfimg report.pdf --select all --pattern "{stem}_p{page:03}_{idx}.{ext}"

  # Pick images interactively
  pdfimg -i report.pdf -o out

  # Write 200x200 JPEG previews for an external viewer
  pdfimg report.pdf --thumbnails previews --thumb-size 200x200 --thumb-format jpeg

  # Machine-readable listing with base64 thumbnails
  pdfimg --json report.pdf > images.json

SELECTION EXPRESSIONS:
  all         every image
  none        clear the selection
  3           every image on page 3
  2-4         every image on pages 2 to 4
  3:2         image 2 of page 3
  3:1-4       images 1 to 4 of page 3
  Terms are comma-separated.

PATTERN PLACEHOLDERS:
  {page}  {idx}  page number / image index, e.g. {page:03} for zero padding
  {ext}          native extension of the embedded image (jpg, png, jp2, …)
  {stem}         file name of the PDF without extension

ENVIRONMENT VARIABLES:
  RUST_LOG            Override log filtering (e.g. RUST_LOG=edgequake_pdfimg=debug)
  PDFIMG_OUTPUT_DIR   Default for -o
  PDFIMG_PATTERN      Default for --pattern
  PDFIMG_LOG_FILE     Default for --log-file
"#;

/// Extract embedded images from PDF files.
#[derive(Parser, Debug)]
#[command(
    name = "pdfimg",
    version,
    about = "Extract, preview and save the images embedded in a PDF",
    long_about = "Harvest every embedded image of a PDF, preview them as thumbnails, choose \
which to keep, and save those byte-for-byte under a naming pattern. JPEG images are saved \
exactly as stored in the PDF; raw sample data is saved as lossless PNG.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF file to read.
    input: PathBuf,

    /// Directory to save the selected images into (created if missing).
    #[arg(short, long = "output-dir", env = "PDFIMG_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Images to save, e.g. "1:2, 3" (see SELECTION EXPRESSIONS).
    #[arg(short, long, env = "PDFIMG_SELECT")]
    select: Option<String>,

    /// File-name pattern for saved images.
    #[arg(long, env = "PDFIMG_PATTERN", default_value = "img_p{page}_i{idx}.png")]
    pattern: String,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "PDFIMG_PAGES", default_value = "all")]
    pages: String,

    /// What to do when two images map to the same file name.
    #[arg(long, env = "PDFIMG_COLLISION", value_enum, default_value = "suffix")]
    collision: CollisionArg,

    /// JPEG quality for thumbnails written with --thumb-format jpeg (10–100).
    #[arg(long, env = "PDFIMG_QUALITY", default_value_t = 90,
          value_parser = clap::value_parser!(u8).range(10..=100))]
    quality: u8,

    /// Thumbnail bounding box, WIDTHxHEIGHT.
    #[arg(long, env = "PDFIMG_THUMB_SIZE", default_value = "150x150", value_parser = parse_size)]
    thumb_size: (u32, u32),

    /// Write every thumbnail into this directory.
    #[arg(long, env = "PDFIMG_THUMBNAILS")]
    thumbnails: Option<PathBuf>,

    /// Encoding for --thumbnails.
    #[arg(long, env = "PDFIMG_THUMB_FORMAT", value_enum, default_value = "png")]
    thumb_format: ThumbFormatArg,

    /// Print one line per image and exit.
    #[arg(short, long)]
    list: bool,

    /// Print the image list as JSON, with base64 PNG thumbnails, and exit.
    #[arg(long)]
    json: bool,

    /// Print page and image counts only, without decoding images.
    #[arg(long)]
    inspect_only: bool,

    /// Choose images at a prompt before saving.
    #[arg(short, long)]
    interactive: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDFIMG_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFIMG_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDFIMG_QUIET")]
    quiet: bool,

    /// Append-only activity log. Default: per-user data directory.
    #[arg(long, env = "PDFIMG_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Do not write the activity log.
    #[arg(long, env = "PDFIMG_NO_LOG_FILE")]
    no_log_file: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum CollisionArg {
    Suffix,
    Overwrite,
    Error,
}

impl From<CollisionArg> for CollisionPolicy {
    fn from(v: CollisionArg) -> Self {
        match v {
            CollisionArg::Suffix => CollisionPolicy::Suffix,
            CollisionArg::Overwrite => CollisionPolicy::Overwrite,
            CollisionArg::Error => CollisionPolicy::Error,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ThumbFormatArg {
    Png,
    Jpeg,
}

impl From<ThumbFormatArg> for ThumbnailFormat {
    fn from(v: ThumbFormatArg) -> Self {
        match v {
            ThumbFormatArg::Png => ThumbnailFormat::Png,
            ThumbFormatArg::Jpeg => ThumbnailFormat::Jpeg,
        }
    }
}

/// Parse `WIDTHxHEIGHT`.
fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .to_ascii_lowercase()
        .split_once('x')
        .map(|(w, h)| (w.trim().to_string(), h.trim().to_string()))
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
    let w: u32 = w.parse().map_err(|_| format!("invalid width '{w}'"))?;
    let h: u32 = h.parse().map_err(|_| format!("invalid height '{h}'"))?;
    if w == 0 || h == 0 {
        return Err("thumbnail size must be non-zero".to_string());
    }
    Ok((w, h))
}

// ── Logging ──────────────────────────────────────────────────────────────────

/// Install the stderr layer and, unless disabled, the append-only file layer.
///
/// A log file that cannot be opened is reported and skipped.
fn init_logging(cli: &Cli, show_progress: bool) {
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    let stderr_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)));

    let mut log_warning = None;
    let file_layer = if cli.no_log_file {
        None
    } else {
        let path = cli.log_file.clone().unwrap_or_else(default_log_path);
        match open_log_file(&path) {
            Ok(file) => Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(LevelFilter::INFO),
            ),
            Err(e) => {
                log_warning = Some(format!("Cannot open log file {}: {}", path.display(), e));
                None
            }
        }
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    if let Some(msg) = log_warning {
        warn!("{}", msg);
        if !cli.quiet {
            eprintln!("{} {}", cyan("⚠"), msg);
        }
    }
}

fn open_log_file(path: &Path) -> io::Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let listing = cli.list || cli.json || cli.inspect_only;
    let show_progress = !cli.quiet && !cli.no_progress && !listing;
    init_logging(&cli, show_progress);

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let summary = inspect(&cli.input).await.context("Failed to inspect PDF")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?
            );
        } else {
            println!("File:         {}", cli.input.display());
            println!("Pages:        {}", summary.page_count);
            println!("PDF Version:  {}", summary.pdf_version);
            println!("Images:       {}", summary.total_images());
            for (i, n) in summary.images_per_page.iter().enumerate() {
                if *n > 0 {
                    println!("  page {:>4}:  {}", i + 1, n);
                }
            }
        }
        return Ok(());
    }

    // ── Build settings ───────────────────────────────────────────────────
    let pages: PageSelection = cli
        .pages
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid --pages: {e}"))?;
    let config = ExtractionConfig::builder()
        .pages(pages)
        .thumbnail_size(cli.thumb_size.0, cli.thumb_size.1)
        .build()
        .context("Invalid configuration")?;
    let settings = ExportSettings::builder()
        .filename_pattern(cli.pattern.clone())
        .output_directory(cli.output_dir.clone())
        .quality(cli.quality)
        .collision(cli.collision.into())
        .thumbnail_format(cli.thumb_format.into())
        .build()
        .context("Invalid export settings")?;
    let selection: Option<SelectionExpr> = cli
        .select
        .as_deref()
        .map(str::parse)
        .transpose()
        .map_err(|e| anyhow::anyhow!("Invalid --select: {e}"))?;

    // ── Harvest ──────────────────────────────────────────────────────────
    let progress = show_progress.then(CliProgress::new_dynamic);
    let start = Instant::now();
    let session = run_extraction(&cli.input, &config, progress.as_deref())
        .await
        .with_context(|| format!("Failed to load {}", cli.input.display()))?;

    if !cli.quiet && !cli.json {
        eprintln!(
            "{} {} images on {} pages  {}",
            green("✔"),
            bold(&session.len().to_string()),
            session.page_count(),
            dim(&format!("{}ms", start.elapsed().as_millis())),
        );
    }

    let mut surface = SelectionSurface::build(session, &config)
        .await
        .context("Failed to render thumbnails")?;

    // ── Listing modes ────────────────────────────────────────────────────
    if cli.json {
        println!("{}", tiles_json(&surface)?);
        return Ok(());
    }
    if cli.list {
        print_tiles(&surface);
        return Ok(());
    }

    if let Some(ref dir) = cli.thumbnails {
        let report = export_thumbnails(&surface, dir, &settings)
            .context("Failed to write thumbnails")?;
        if !cli.quiet {
            eprintln!(
                "{} {}/{} thumbnails  →  {}",
                status_mark(&report),
                report.succeeded,
                report.attempted,
                bold(&dir.display().to_string())
            );
        }
    }

    if let Some(ref expr) = selection {
        let n = surface.apply(expr);
        info!("Selection '{}' matched {} images", expr, n);
    }

    if cli.interactive {
        let outcome = tokio::task::block_in_place(|| {
            let stdin = io::stdin();
            interactive(&mut surface, &mut stdin.lock(), &mut io::stdout())
        })
        .context("Interactive prompt failed")?;
        if outcome == Outcome::Quit {
            info!("Quit without saving");
            return Ok(());
        }
    } else if selection.is_none() {
        if cli.thumbnails.is_none() {
            print_tiles(&surface);
            eprintln!(
                "{}",
                dim("Nothing saved. Choose images with --select EXPR or --interactive.")
            );
        }
        return Ok(());
    }

    // ── Export ───────────────────────────────────────────────────────────
    let callback = progress.as_deref().map(|p| p as &dyn HarvestProgressCallback);
    let report = surface
        .export(&settings, callback)
        .context("Failed to save images")?;

    if !cli.quiet {
        if report.attempted == 0 {
            eprintln!("{} No images selected; nothing saved", cyan("⚠"));
        } else {
            eprintln!(
                "{}  {}/{} images saved  →  {}",
                status_mark(&report),
                report.succeeded,
                report.attempted,
                bold(&settings.output_directory.display().to_string()),
            );
        }
        if progress.is_none() {
            for failure in &report.failures {
                eprintln!("  {} {}", red("✗"), failure);
            }
        }
    }

    if !report.failures.is_empty() {
        anyhow::bail!(
            "{} of {} images could not be saved",
            report.failures.len(),
            report.attempted
        );
    }
    Ok(())
}

/// Run the harvest on the background extractor, driving the progress bar
/// from its events.
async fn run_extraction(
    input: &Path,
    config: &ExtractionConfig,
    progress: Option<&CliProgress>,
) -> Result<ExtractionSession> {
    let extractor = Extractor::new();
    let mut handle = extractor.start(input, config)?;

    while let Some(event) = handle.next_event().await {
        match event {
            ExtractionEvent::Started { total_pages } => {
                if let Some(p) = progress {
                    p.activate_bar(total_pages, "Scanning", "pages");
                    p.bar.enable_steady_tick(Duration::from_millis(80));
                }
            }
            ExtractionEvent::PageDone {
                page_number,
                total_pages,
                images_found,
            } => {
                if let Some(p) = progress {
                    p.page_done(page_number, total_pages, images_found);
                }
            }
            ExtractionEvent::Finished(result) => {
                if let Some(p) = progress {
                    p.pause();
                }
                return Ok(result?);
            }
        }
    }
    anyhow::bail!("Extraction ended without a result")
}

fn status_mark(report: &ExportReport) -> String {
    if report.is_complete() {
        green("✔")
    } else if report.succeeded == 0 {
        red("✘")
    } else {
        cyan("⚠")
    }
}

// ── Selection surface on the terminal ────────────────────────────────────────

fn tile_line(surface: &SelectionSurface, i: usize) -> String {
    let tile = &surface.tiles()[i];
    let image = &surface.session().images()[i];
    let mark = if image.is_selected() { "[x]" } else { "[ ]" };
    let preview = match tile.thumbnail.error() {
        Some(_) => dim("  (no preview)"),
        None => String::new(),
    };
    format!(
        "{mark} {:<8} {:<20} {:<5} {:>5}x{:<5} {:>9}{preview}",
        tile.key.to_string(),
        tile.label,
        image.kind.extension(),
        image.width,
        image.height,
        human_bytes(image.raw_bytes.len()),
    )
}

fn print_tiles(surface: &SelectionSurface) {
    if surface.is_empty() {
        println!("No embedded images found.");
        return;
    }
    for i in 0..surface.len() {
        println!("{}", tile_line(surface, i));
    }
}

fn tiles_json(surface: &SelectionSurface) -> Result<String> {
    let entries: Vec<serde_json::Value> = surface
        .tiles()
        .iter()
        .zip(surface.session().images())
        .map(|(tile, image)| {
            serde_json::json!({
                "page": tile.key.page,
                "index": tile.key.index,
                "label": tile.label,
                "kind": image.kind,
                "extension": image.kind.extension(),
                "width": image.width,
                "height": image.height,
                "bytes": image.raw_bytes.len(),
                "object_id": [image.object_id.0, image.object_id.1],
                "selected": image.is_selected(),
                "thumbnail_png": STANDARD.encode(tile.thumbnail.png()),
                "preview_error": tile.thumbnail.error().map(|e| e.to_string()),
            })
        })
        .collect();
    serde_json::to_string_pretty(&entries).context("Failed to serialise image list")
}

#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Save,
    Quit,
}

const PROMPT_HELP: &str = "\
  EXPR      toggle the matching images (e.g. 1:2, 3, 2-4)
  + EXPR    select the matching images
  - EXPR    deselect the matching images
  a         select all
  n         select none
  l         list images
  s         save the selection and exit
  q         quit without saving";

/// Read toggle commands until the user saves or quits.
fn interactive(
    surface: &mut SelectionSurface,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> io::Result<Outcome> {
    for i in 0..surface.len() {
        writeln!(out, "{}", tile_line(surface, i))?;
    }
    writeln!(out, "{PROMPT_HELP}")?;

    loop {
        write!(out, "{} selected> ", surface.selected_count())?;
        out.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            // EOF behaves like quit.
            return Ok(Outcome::Quit);
        }
        let line = line.trim();

        match line {
            "" => continue,
            "s" | "save" | "w" => return Ok(Outcome::Save),
            "q" | "quit" => return Ok(Outcome::Quit),
            "a" | "all" => surface.select_all(),
            "n" | "none" => surface.select_none(),
            "l" | "list" => {
                for i in 0..surface.len() {
                    writeln!(out, "{}", tile_line(surface, i))?;
                }
            }
            "h" | "?" | "help" => writeln!(out, "{PROMPT_HELP}")?,
            _ => {
                let (mode, expr) = match line.as_bytes()[0] {
                    b'+' => (Some(true), &line[1..]),
                    b'-' => (Some(false), &line[1..]),
                    _ => (None, line),
                };
                match expr.parse::<SelectionExpr>() {
                    Ok(expr) => {
                        let n = match mode {
                            Some(v) => surface.set_matching(&expr, v),
                            None => surface.toggle_matching(&expr),
                        };
                        if n == 0 {
                            writeln!(out, "{}", dim("no image matches"))?;
                        }
                    }
                    Err(e) => writeln!(out, "{} {}", red("✗"), e)?,
                }
            }
        }
    }
}
