//! # edgequake-pdfimg
//!
//! Harvest the embedded images of a PDF, preview them as thumbnails, pick
//! the ones worth keeping, and write those to disk byte-for-byte.
//!
//! ## Why this crate?
//!
//! Screenshots and "save page as image" re-render what a page looks like.
//! This crate instead pulls out the image objects the PDF actually embeds:
//! a JPEG comes back as the exact JPEG that was put in, and raw sample data
//! comes back as a lossless PNG. Nothing is rasterised.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      validate path and %PDF signature
//!  ├─ 2. Harvest    walk pages → /XObject images (lopdf, spawn_blocking)
//!  ├─ 3. Decode     JPEG passthrough, raw samples → PNG
//!  ├─ 4. Thumbnail  bounded PNG previews, placeholder on failure
//!  ├─ 5. Select     toggle tiles or apply "1:2, 3-5" expressions
//!  └─ 6. Export     selected raw bytes → img_p{page}_i{idx}.png
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdfimg::{extract, ExportSettings, ExtractionConfig, ImageKey, SelectionSurface};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExtractionConfig::default();
//!     let session = extract("document.pdf", &config).await?;
//!
//!     let mut surface = SelectionSurface::build(session, &config).await?;
//!     surface.toggle(ImageKey::new(1, 2));
//!
//!     let settings = ExportSettings::builder().output_directory("out").build()?;
//!     let report = surface.export(&settings, None)?;
//!     eprintln!("saved {}/{}", report.succeeded, report.attempted);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfimg` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! edgequake-pdfimg = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod selection;
pub mod session;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    default_log_path, CollisionPolicy, ExportSettings, ExportSettingsBuilder, ExtractionConfig,
    ExtractionConfigBuilder, PageSelection, ThumbnailFormat,
};
pub use error::{ItemError, PdfImgError};
pub use extract::{extract, extract_from_bytes, extract_sync, inspect};
pub use output::{DocumentSummary, ExportReport};
pub use pipeline::export::{export_selected, export_thumbnails};
pub use pipeline::thumbnail::{render_thumbnail, Thumbnail};
pub use progress::{HarvestProgressCallback, NoopProgressCallback, ProgressCallback};
pub use selection::{SelectionExpr, SelectionSurface, Tile};
pub use session::{ExtractedImage, ExtractionSession, ImageKey, ImageKind};
pub use stream::{EventStream, ExtractionEvent, ExtractionHandle, Extractor};
