//! Error types for the edgequake-pdfimg library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PdfImgError`] — **Fatal** to the current user action: the document
//!   cannot be opened, the configuration is invalid, the output directory
//!   cannot be created. Returned as `Err(PdfImgError)` from `extract*`,
//!   `inspect` and `export_selected`.
//!
//! * [`ItemError`] — **Non-fatal**: one image could not be decoded for
//!   preview, or one file could not be written. Stored in
//!   [`crate::output::ExportReport`] or in a [`crate::Thumbnail`]
//!   placeholder so the rest of the session carries on.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdfimg library.
#[derive(Debug, Error)]
pub enum PdfImgError {
    // ── Document open errors ──────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    // ── Session errors ────────────────────────────────────────────────────
    /// A harvest is already running on this extractor.
    #[error("An extraction is already in progress; wait for it to finish before loading another PDF")]
    ExtractionInProgress,

    // ── Export errors ─────────────────────────────────────────────────────
    /// The output directory could not be created.
    #[error("Failed to create output directory '{path}': {source}")]
    OutputDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PdfImgError {
    /// `true` for every variant that means "this file cannot be loaded".
    ///
    /// The caller can recover by picking another file.
    pub fn is_document_open(&self) -> bool {
        matches!(
            self,
            PdfImgError::FileNotFound { .. }
                | PdfImgError::PermissionDenied { .. }
                | PdfImgError::NotAPdf { .. }
                | PdfImgError::CorruptPdf { .. }
        )
    }
}

/// A non-fatal error for a single image.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ItemError {
    /// The image bytes could not be decoded for preview.
    #[error("Page {page}, image {index}: cannot decode image: {detail}")]
    Decode {
        page: u32,
        index: u32,
        detail: String,
    },

    /// The image could not be written to disk.
    #[error("Page {page}, image {index}: failed to write '{}': {detail}", path.display())]
    Write {
        page: u32,
        index: u32,
        path: PathBuf,
        detail: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_open_category() {
        let e = PdfImgError::FileNotFound {
            path: PathBuf::from("/nope.pdf"),
        };
        assert!(e.is_document_open());

        let e = PdfImgError::NotAPdf {
            path: PathBuf::from("a.txt"),
            magic: *b"hell",
        };
        assert!(e.is_document_open());

        assert!(!PdfImgError::ExtractionInProgress.is_document_open());
        assert!(!PdfImgError::InvalidConfig("x".into()).is_document_open());
    }

    #[test]
    fn corrupt_display_mentions_path() {
        let e = PdfImgError::CorruptPdf {
            path: PathBuf::from("broken.pdf"),
            detail: "xref missing".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("broken.pdf"), "got: {msg}");
        assert!(msg.contains("xref missing"), "got: {msg}");
    }

    #[test]
    fn write_error_display() {
        let e = ItemError::Write {
            page: 3,
            index: 1,
            path: PathBuf::from("out/img_p3_i1.png"),
            detail: "permission denied".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("Page 3, image 1"), "got: {msg}");
        assert!(msg.contains("img_p3_i1.png"), "got: {msg}");
    }

    #[test]
    fn decode_error_display() {
        let e = ItemError::Decode {
            page: 2,
            index: 4,
            detail: "unsupported format".into(),
        };
        assert!(e.to_string().contains("cannot decode"));
    }
}
