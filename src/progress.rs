//! Progress-callback trait for harvest and export events.
//!
//! Inject an [`Arc<dyn HarvestProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as pages are scanned, or pass one to
//! [`crate::export_selected`] to follow file writes.
//!
//! The callback is the integration point for whatever presentation layer
//! hosts the library: a terminal progress bar, a GUI progress widget, a log.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdfimg::{ExtractionConfig, HarvestProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct PageCounter {
//!     pages: AtomicUsize,
//! }
//!
//! impl HarvestProgressCallback for PageCounter {
//!     fn on_page_complete(&self, page_num: usize, total_pages: usize, images_found: usize) {
//!         self.pages.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("page {page_num}/{total_pages}: {images_found} images");
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(PageCounter { pages: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by the harvester and the exporter as they make progress.
///
/// Implementations must be `Send + Sync`: harvesting runs on a blocking
/// worker thread. All methods have default no-op implementations so
/// callers only override what they care about.
pub trait HarvestProgressCallback: Send + Sync {
    /// Called once after the document is opened.
    ///
    /// # Arguments
    /// * `total_pages` — number of pages that will be scanned
    fn on_extraction_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called after each page has been scanned.
    ///
    /// # Arguments
    /// * `page_num`     — 1-indexed page number
    /// * `total_pages`  — pages being scanned
    /// * `images_found` — images harvested from this page
    fn on_page_complete(&self, page_num: usize, total_pages: usize, images_found: usize) {
        let _ = (page_num, total_pages, images_found);
    }

    /// Called once after all pages have been scanned.
    fn on_extraction_complete(&self, total_pages: usize, total_images: usize) {
        let _ = (total_pages, total_images);
    }

    /// Called before the first file of an export is written.
    ///
    /// # Arguments
    /// * `selected` — number of images that will be written
    fn on_export_start(&self, selected: usize) {
        let _ = selected;
    }

    /// Called after a file has been written.
    fn on_file_written(&self, path: &Path, bytes: usize) {
        let _ = (path, bytes);
    }

    /// Called when a file could not be written.
    fn on_file_error(&self, path: &Path, error: &str) {
        let _ = (path, error);
    }

    /// Called once after every selected image has been attempted.
    fn on_export_complete(&self, succeeded: usize, attempted: usize) {
        let _ = (succeeded, attempted);
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl HarvestProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn HarvestProgressCallback>;
