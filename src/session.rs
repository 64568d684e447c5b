//! The in-memory result of harvesting one PDF.
//!
//! An [`ExtractionSession`] is produced whole by the harvester and replaced
//! whole on the next load; nothing updates it piecemeal. The only mutable
//! state inside it is each image's `selected` flag, and that is reachable
//! only through [`crate::SelectionSurface`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Address of one image: 1-based page number and 1-based index on that page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ImageKey {
    pub page: u32,
    pub index: u32,
}

impl ImageKey {
    pub fn new(page: u32, index: u32) -> Self {
        Self { page, index }
    }
}

impl From<(u32, u32)> for ImageKey {
    fn from((page, index): (u32, u32)) -> Self {
        Self { page, index }
    }
}

impl fmt::Display for ImageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.page, self.index)
    }
}

/// Encoding of the bytes held in [`ExtractedImage::raw_bytes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    /// Baseline/progressive JPEG, stored in the PDF as-is (`DCTDecode`).
    Jpeg,
    /// JPEG 2000 codestream (`JPXDecode`).
    Jpeg2000,
    /// Raw samples re-wrapped into a PNG file.
    Png,
    /// JBIG2 bi-level stream (`JBIG2Decode`). Not previewable.
    Jbig2,
    /// CCITT Group 3/4 fax stream (`CCITTFaxDecode`). Not previewable.
    CcittFax,
    /// Stream bytes that could not be re-wrapped into any image file.
    Raw,
}

impl ImageKind {
    /// Native file extension, without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            ImageKind::Jpeg => "jpg",
            ImageKind::Jpeg2000 => "jp2",
            ImageKind::Png => "png",
            ImageKind::Jbig2 => "jb2",
            ImageKind::CcittFax => "ccitt",
            ImageKind::Raw => "bin",
        }
    }
}

/// One embedded image pulled out of the PDF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedImage {
    /// 1-based page the image is drawn on.
    pub page_number: u32,
    /// 1-based position among the images of that page.
    pub image_index: u32,
    /// Encoded image file bytes; written to disk unchanged on export.
    pub raw_bytes: Vec<u8>,
    /// Indirect object id `(number, generation)` of the image XObject.
    pub object_id: (u32, u16),
    pub kind: ImageKind,
    /// Declared `/Width` of the XObject.
    pub width: u32,
    /// Declared `/Height` of the XObject.
    pub height: u32,
    pub(crate) selected: bool,
}

impl ExtractedImage {
    pub fn key(&self) -> ImageKey {
        ImageKey::new(self.page_number, self.image_index)
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    /// Human-readable tile label, e.g. `Page 3, Image 1`.
    pub fn label(&self) -> String {
        format!("Page {}, Image {}", self.page_number, self.image_index)
    }
}

/// All images harvested from one PDF, in extraction order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionSession {
    source: PathBuf,
    page_count: usize,
    images: Vec<ExtractedImage>,
}

impl ExtractionSession {
    pub(crate) fn new(source: PathBuf, page_count: usize, images: Vec<ExtractedImage>) -> Self {
        Self {
            source,
            page_count,
            images,
        }
    }

    /// Path of the PDF this session was harvested from.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// File stem of the source PDF, used by the `{stem}` pattern placeholder.
    pub fn source_stem(&self) -> String {
        self.source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string())
    }

    /// Total pages in the document, harvested or not.
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn images(&self) -> &[ExtractedImage] {
        &self.images
    }

    pub(crate) fn images_mut(&mut self) -> &mut [ExtractedImage] {
        &mut self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Keys of every image, in extraction order.
    pub fn keys(&self) -> Vec<ImageKey> {
        self.images.iter().map(ExtractedImage::key).collect()
    }

    pub fn get(&self, key: ImageKey) -> Option<&ExtractedImage> {
        self.position(key).map(|i| &self.images[i])
    }

    pub(crate) fn position(&self, key: ImageKey) -> Option<usize> {
        self.images.iter().position(|img| img.key() == key)
    }

    /// Images whose `selected` flag is set, in extraction order.
    pub fn selected(&self) -> impl Iterator<Item = &ExtractedImage> {
        self.images.iter().filter(|img| img.selected)
    }

    /// Number of images on the given 1-based page.
    pub fn images_on_page(&self, page: u32) -> usize {
        self.images.iter().filter(|img| img.page_number == page).count()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn image(page: u32, index: u32, bytes: &[u8]) -> ExtractedImage {
        ExtractedImage {
            page_number: page,
            image_index: index,
            raw_bytes: bytes.to_vec(),
            object_id: (page * 10 + index, 0),
            kind: ImageKind::Png,
            width: 1,
            height: 1,
            selected: false,
        }
    }

    pub(crate) fn three_page_session() -> ExtractionSession {
        ExtractionSession::new(
            PathBuf::from("/docs/report.pdf"),
            3,
            vec![image(1, 1, b"a"), image(1, 2, b"b"), image(3, 1, b"c")],
        )
    }

    #[test]
    fn keys_follow_extraction_order() {
        let s = three_page_session();
        let keys: Vec<(u32, u32)> = s.keys().iter().map(|k| (k.page, k.index)).collect();
        assert_eq!(keys, vec![(1, 1), (1, 2), (3, 1)]);
    }

    #[test]
    fn nothing_selected_initially() {
        let s = three_page_session();
        assert_eq!(s.selected().count(), 0);
        assert!(s.images().iter().all(|i| !i.is_selected()));
    }

    #[test]
    fn lookup_by_key() {
        let s = three_page_session();
        assert_eq!(s.get(ImageKey::new(1, 2)).map(|i| i.raw_bytes.as_slice()), Some(&b"b"[..]));
        assert!(s.get(ImageKey::new(2, 1)).is_none());
        assert_eq!(s.images_on_page(1), 2);
        assert_eq!(s.images_on_page(2), 0);
    }

    #[test]
    fn stem_and_label() {
        let s = three_page_session();
        assert_eq!(s.source_stem(), "report");
        assert_eq!(s.images()[2].label(), "Page 3, Image 1");
        assert_eq!(ImageKey::new(3, 1).to_string(), "3:1");
    }

    #[test]
    fn kind_extensions() {
        assert_eq!(ImageKind::Jpeg.extension(), "jpg");
        assert_eq!(ImageKind::Png.extension(), "png");
        assert_eq!(ImageKind::Jpeg2000.extension(), "jp2");
    }
}
