//! Eager (whole-document) harvest entry points.
//!
//! ## Why eager vs. background?
//!
//! This module provides the simpler API: wait for every page, then return
//! the complete [`ExtractionSession`]. Use [`crate::stream::Extractor`]
//! instead when a front end needs per-page progress events while the
//! document loads, and must refuse a second load in the meantime.

use crate::config::ExtractionConfig;
use crate::error::PdfImgError;
use crate::output::DocumentSummary;
use crate::pipeline::{harvest, input};
use crate::session::ExtractionSession;
use std::io::Write;
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Harvest every embedded image of a PDF file.
///
/// This is the primary entry point for the library.
///
/// # Returns
/// `Ok(ExtractionSession)` on success; an empty session when the document
/// has no images. Images whose streams cannot be interpreted are still
/// present (kind [`crate::ImageKind::Raw`]).
///
/// # Errors
/// Returns `Err(PdfImgError)` only when the document cannot be opened:
/// file not found, permission denied, not a PDF, or corrupt.
pub async fn extract(
    pdf_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionSession, PdfImgError> {
    let start = Instant::now();
    let pdf_path = pdf_path.as_ref();
    info!("Loading {}", pdf_path.display());

    let path = input::resolve_local(pdf_path)?;
    let session = harvest::harvest(&path, config).await?;

    info!(
        "Loaded {}: {} images in {}ms",
        path.display(),
        session.len(),
        start.elapsed().as_millis()
    );
    Ok(session)
}

/// Synchronous wrapper around [`extract`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    pdf_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionSession, PdfImgError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| PdfImgError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract(pdf_path, config))
}

/// Harvest images from PDF bytes in memory.
///
/// The bytes are written to a managed [`tempfile`] which is removed on
/// return. The session's source path is that temporary file; its stem is
/// what `{stem}` expands to.
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdfimg::{extract_from_bytes, ExtractionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes: Vec<u8> = std::fs::read("document.pdf")?;
/// let session = extract_from_bytes(&bytes, &ExtractionConfig::default()).await?;
/// println!("{} images", session.len());
/// # Ok(())
/// # }
/// ```
pub async fn extract_from_bytes(
    bytes: &[u8],
    config: &ExtractionConfig,
) -> Result<ExtractionSession, PdfImgError> {
    input::check_magic(bytes, Path::new("<memory>"))?;
    let mut tmp = tempfile::Builder::new()
        .prefix("pdfimg-")
        .suffix(".pdf")
        .tempfile()
        .map_err(|e| PdfImgError::Internal(format!("tempfile: {e}")))?;
    tmp.write_all(bytes)
        .map_err(|e| PdfImgError::Internal(format!("tempfile write: {e}")))?;
    // `tmp` is dropped (and the file deleted) when `extract` returns
    extract(tmp.path(), config).await
}

/// Count pages and image references without decoding any image data.
pub async fn inspect(pdf_path: impl AsRef<Path>) -> Result<DocumentSummary, PdfImgError> {
    let path = input::resolve_local(pdf_path)?;
    tokio::task::spawn_blocking(move || {
        let doc = harvest::load_document(&path)?;
        Ok(harvest::summarise_document(&doc))
    })
    .await
    .map_err(|e| PdfImgError::Internal(format!("Inspect task panicked: {}", e)))?
}
