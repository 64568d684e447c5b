//! Background harvesting with per-page progress events.
//!
//! ## Why a handle and an event channel?
//!
//! Large documents take seconds to load. A front end wants to keep redrawing
//! and show "page 12 of 80" while that happens, then swap in the new session
//! in one step when the harvest finishes. [`Extractor::start`] runs the
//! harvest on the blocking pool and returns an [`ExtractionHandle`] that
//! yields [`ExtractionEvent`]s; the session only ever arrives inside the
//! final [`ExtractionEvent::Finished`], so there is no half-built session to
//! observe.
//!
//! ## One at a time
//!
//! An [`Extractor`] runs at most one harvest. Calling `start` again while a
//! harvest is in flight returns [`PdfImgError::ExtractionInProgress`]. The
//! busy flag is cleared when the worker ends, including when it panics.
//! There is no cancellation: drop the handle to stop listening; the worker
//! still runs to completion.

use crate::config::ExtractionConfig;
use crate::error::PdfImgError;
use crate::pipeline::{harvest, input};
use crate::progress::{HarvestProgressCallback, ProgressCallback};
use crate::session::ExtractionSession;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;
use tracing::{debug, info, warn};

/// Progress and completion events of one background harvest.
#[derive(Debug)]
pub enum ExtractionEvent {
    /// The document opened; `total_pages` pages will be scanned.
    Started { total_pages: usize },
    /// One page has been scanned.
    PageDone {
        page_number: u32,
        total_pages: usize,
        images_found: usize,
    },
    /// The harvest ended. Always the last event.
    Finished(Result<ExtractionSession, PdfImgError>),
}

/// A boxed stream of extraction events.
pub type EventStream = Pin<Box<dyn Stream<Item = ExtractionEvent> + Send>>;

/// Runs harvests in the background, one at a time.
///
/// Clones share the same busy flag.
#[derive(Debug, Clone, Default)]
pub struct Extractor {
    busy: Arc<AtomicBool>,
}

/// Clears the busy flag on drop, so a panicking worker still releases it.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Forwards harvest progress into the event channel, then to the caller's callback.
struct ChannelCallback {
    tx: UnboundedSender<ExtractionEvent>,
    inner: Option<ProgressCallback>,
}

impl HarvestProgressCallback for ChannelCallback {
    fn on_extraction_start(&self, total_pages: usize) {
        let _ = self.tx.send(ExtractionEvent::Started { total_pages });
        if let Some(ref cb) = self.inner {
            cb.on_extraction_start(total_pages);
        }
    }

    fn on_page_complete(&self, page_num: usize, total_pages: usize, images_found: usize) {
        let _ = self.tx.send(ExtractionEvent::PageDone {
            page_number: page_num as u32,
            total_pages,
            images_found,
        });
        if let Some(ref cb) = self.inner {
            cb.on_page_complete(page_num, total_pages, images_found);
        }
    }

    fn on_extraction_complete(&self, total_pages: usize, total_images: usize) {
        if let Some(ref cb) = self.inner {
            cb.on_extraction_complete(total_pages, total_images);
        }
    }
}

impl Extractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` while a harvest started by this extractor is running.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Start harvesting `pdf_path` in the background.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// - [`PdfImgError::ExtractionInProgress`] if a harvest is already running
    /// - [`PdfImgError::Internal`] if no Tokio runtime is available
    ///
    /// Document-open errors are not returned here; they arrive as
    /// `Finished(Err(..))`.
    pub fn start(
        &self,
        pdf_path: impl AsRef<Path>,
        config: &ExtractionConfig,
    ) -> Result<ExtractionHandle, PdfImgError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| PdfImgError::Internal(format!("No Tokio runtime: {}", e)))?;

        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Extraction requested while another is in progress");
            return Err(PdfImgError::ExtractionInProgress);
        }
        let guard = BusyGuard(Arc::clone(&self.busy));

        let (tx, rx) = mpsc::unbounded_channel();
        let path: PathBuf = pdf_path.as_ref().to_path_buf();
        let mut worker_config = config.clone();
        worker_config.progress_callback = Some(Arc::new(ChannelCallback {
            tx: tx.clone(),
            inner: config.progress_callback.clone(),
        }));

        info!("Background extraction started: {}", path.display());
        runtime.spawn(async move {
            let result = tokio::task::spawn_blocking(move || {
                let _guard = guard;
                let path = input::resolve_local(&path)?;
                harvest::harvest_blocking(&path, &worker_config)
            })
            .await
            .map_err(|e| PdfImgError::Internal(format!("Harvest task panicked: {}", e)))
            .and_then(|r| r);

            match &result {
                Ok(session) => debug!("Background extraction finished: {} images", session.len()),
                Err(e) => warn!("Background extraction failed: {}", e),
            }
            let _ = tx.send(ExtractionEvent::Finished(result));
        });

        Ok(ExtractionHandle { rx })
    }
}

/// Receiving end of one background harvest.
#[derive(Debug)]
pub struct ExtractionHandle {
    rx: UnboundedReceiver<ExtractionEvent>,
}

impl ExtractionHandle {
    /// Next event, or `None` once `Finished` has been received.
    pub async fn next_event(&mut self) -> Option<ExtractionEvent> {
        self.rx.recv().await
    }

    /// Ignore progress and wait for the session.
    pub async fn wait(mut self) -> Result<ExtractionSession, PdfImgError> {
        while let Some(event) = self.rx.recv().await {
            if let ExtractionEvent::Finished(result) = event {
                return result;
            }
        }
        Err(PdfImgError::Internal(
            "Extraction worker ended without a result".to_string(),
        ))
    }

    /// Consume the handle as a `Stream` of events.
    pub fn into_stream(self) -> EventStream {
        Box::pin(UnboundedReceiverStream::new(self.rx))
    }
}
