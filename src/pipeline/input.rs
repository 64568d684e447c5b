//! Input resolution: validate a user-supplied path before handing it to lopdf.
//!
//! ## Why check magic bytes first?
//!
//! lopdf's parse errors are generic ("invalid file header", "xref not
//! found"). Checking existence, read permission and the `%PDF` signature up
//! front lets callers show an actionable message for the common mistakes
//! (wrong path, wrong file) and reserve `CorruptPdf` for files that really
//! are damaged PDFs.
//!
//! Like common readers, the signature is accepted anywhere in the first
//! [`HEADER_SEARCH_WINDOW`] bytes; some producers prepend junk (mail
//! headers, BOMs) before it.

use crate::error::PdfImgError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// How far into a file the `%PDF` signature may start.
pub const HEADER_SEARCH_WINDOW: usize = 1024;

/// Offset of the `%PDF` signature within the header search window.
pub fn header_offset(bytes: &[u8]) -> Option<usize> {
    let window = &bytes[..bytes.len().min(HEADER_SEARCH_WINDOW + 4)];
    window.windows(4).position(|w| w == b"%PDF")
}

fn leading_magic(bytes: &[u8]) -> [u8; 4] {
    let mut magic = [0u8; 4];
    let n = bytes.len().min(4);
    magic[..n].copy_from_slice(&bytes[..n]);
    magic
}

/// Validate a local file path, checking existence, permission and PDF magic bytes.
pub fn resolve_local(path: impl AsRef<Path>) -> Result<PathBuf, PdfImgError> {
    let path = path.as_ref().to_path_buf();

    if !path.exists() {
        return Err(PdfImgError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(f) => {
            let mut head = Vec::with_capacity(HEADER_SEARCH_WINDOW + 4);
            f.take((HEADER_SEARCH_WINDOW + 4) as u64)
                .read_to_end(&mut head)
                .map_err(|e| PdfImgError::CorruptPdf {
                    path: path.clone(),
                    detail: e.to_string(),
                })?;
            match header_offset(&head) {
                Some(0) => {}
                Some(offset) => debug!("PDF header at offset {} in {}", offset, path.display()),
                None => {
                    let magic = leading_magic(&head);
                    return Err(PdfImgError::NotAPdf { path, magic });
                }
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(PdfImgError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(PdfImgError::FileNotFound { path });
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(path)
}

/// Check that an in-memory buffer carries the PDF signature near its start.
///
/// `label` names the buffer in the error message.
pub fn check_magic(bytes: &[u8], label: &Path) -> Result<(), PdfImgError> {
    if header_offset(bytes).is_some() {
        return Ok(());
    }
    Err(PdfImgError::NotAPdf {
        path: label.to_path_buf(),
        magic: leading_magic(bytes),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_is_not_found() {
        let err = resolve_local("/definitely/not/here.pdf").unwrap_err();
        assert!(matches!(err, PdfImgError::FileNotFound { .. }));
    }

    #[test]
    fn text_file_is_not_a_pdf() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"hello world").unwrap();
        let err = resolve_local(f.path()).unwrap_err();
        match err {
            PdfImgError::NotAPdf { magic, .. } => assert_eq!(&magic, b"hell"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn empty_file_is_not_a_pdf() {
        let f = tempfile::NamedTempFile::new().unwrap();
        let err = resolve_local(f.path()).unwrap_err();
        assert!(matches!(err, PdfImgError::NotAPdf { .. }));
    }

    #[test]
    fn pdf_header_accepted() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"%PDF-1.7\n").unwrap();
        assert_eq!(resolve_local(f.path()).unwrap(), f.path());
    }

    #[test]
    fn check_magic_on_buffers() {
        assert!(check_magic(b"%PDF-1.4", Path::new("mem")).is_ok());
        assert!(check_magic(b"GIF", Path::new("mem")).is_err());
    }

    #[test]
    fn header_after_leading_junk_is_accepted() {
        let mut bytes = vec![b' '; 1000];
        bytes.extend_from_slice(b"%PDF-1.4\n");
        assert_eq!(header_offset(&bytes), Some(1000));
        assert!(check_magic(&bytes, Path::new("mem")).is_ok());

        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&bytes).unwrap();
        assert!(resolve_local(f.path()).is_ok());
    }

    #[test]
    fn header_beyond_window_is_rejected() {
        let mut bytes = vec![b'x'; HEADER_SEARCH_WINDOW + 1];
        bytes.extend_from_slice(b"%PDF-1.4\n");
        assert_eq!(header_offset(&bytes), None);
        match check_magic(&bytes, Path::new("mem")).unwrap_err() {
            PdfImgError::NotAPdf { magic, .. } => assert_eq!(&magic, b"xxxx"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
