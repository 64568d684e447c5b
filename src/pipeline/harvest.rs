//! Image harvesting: walk the page tree and pull out every image XObject.
//!
//! ## Why spawn_blocking?
//!
//! Parsing the xref table, inflating object streams and re-encoding raw
//! samples as PNG are all CPU-bound and synchronous in lopdf.
//! `tokio::task::spawn_blocking` moves the work onto the blocking pool so
//! the async runtime (and whatever UI drives it) stays responsive while a
//! large document loads.
//!
//! ## What counts as an image
//!
//! Images are found through each page's `/Resources /XObject` dictionary,
//! in declaration order, the same references a viewer resolves for `Do`.
//! Form XObjects are descended into (depth-limited) so images wrapped in
//! forms are not missed. Inline images (`BI … EI` in the content stream)
//! are not XObjects and are not harvested. The same xref appears at most
//! once per page, even when reachable through several names or forms.

use crate::config::ExtractionConfig;
use crate::error::PdfImgError;
use crate::output::DocumentSummary;
use crate::pipeline::decode::{decode_xobject, resolve};
use crate::pipeline::input;
use crate::session::{ExtractedImage, ExtractionSession};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Maximum nesting of form XObjects followed when looking for images.
const MAX_FORM_DEPTH: usize = 8;

/// Harvest all images from a validated PDF path.
///
/// Runs inside `spawn_blocking`; progress is reported through
/// `config.progress_callback` from the worker thread.
pub async fn harvest(
    pdf_path: &Path,
    config: &ExtractionConfig,
) -> Result<ExtractionSession, PdfImgError> {
    let path = pdf_path.to_path_buf();
    let config = config.clone();

    tokio::task::spawn_blocking(move || harvest_blocking(&path, &config))
        .await
        .map_err(|e| PdfImgError::Internal(format!("Harvest task panicked: {}", e)))?
}

/// Blocking implementation of [`harvest`].
pub fn harvest_blocking(
    pdf_path: &Path,
    config: &ExtractionConfig,
) -> Result<ExtractionSession, PdfImgError> {
    let doc = load_document(pdf_path)?;
    Ok(harvest_document(&doc, pdf_path.to_path_buf(), config))
}

/// Open a PDF with lopdf, mapping parse failures to [`PdfImgError::CorruptPdf`].
///
/// A document with an empty page tree opens fine and harvests nothing.
/// Bytes before the `%PDF` signature are skipped; xref offsets then count
/// from the signature, as readers that tolerate leading junk assume.
pub fn load_document(pdf_path: &Path) -> Result<Document, PdfImgError> {
    let corrupt = |detail: String| PdfImgError::CorruptPdf {
        path: pdf_path.to_path_buf(),
        detail,
    };
    let bytes = std::fs::read(pdf_path).map_err(|e| corrupt(e.to_string()))?;
    let start = input::header_offset(&bytes).unwrap_or(0);
    if start > 0 {
        debug!("Skipping {} bytes before the PDF header", start);
    }
    Document::load_mem(&bytes[start..]).map_err(|e| corrupt(e.to_string()))
}

/// Walk the selected pages of an already-parsed document.
pub fn harvest_document(
    doc: &Document,
    source: PathBuf,
    config: &ExtractionConfig,
) -> ExtractionSession {
    let pages = doc.get_pages();
    let page_count = pages.len();
    let page_ids: Vec<(u32, ObjectId)> = pages.into_iter().collect();
    let indices = config.pages.to_indices(page_count);
    let total = indices.len();

    info!(
        "PDF loaded: {} pages, harvesting {} ({})",
        page_count,
        total,
        source.display()
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_start(total);
    }

    let mut images = Vec::new();
    for idx in indices {
        let (page_number, page_id) = page_ids[idx];
        let refs = page_image_refs(doc, page_id, config.descend_forms);

        for (i, (object_id, stream)) in refs.iter().enumerate() {
            let decoded = decode_xobject(doc, stream);
            debug!(
                "Page {} image {}: {:?} {}x{}, {} bytes",
                page_number,
                i + 1,
                decoded.kind,
                decoded.width,
                decoded.height,
                decoded.bytes.len()
            );
            images.push(ExtractedImage {
                page_number,
                image_index: (i + 1) as u32,
                raw_bytes: decoded.bytes,
                object_id: object_id.unwrap_or((0, 0)),
                kind: decoded.kind,
                width: decoded.width,
                height: decoded.height,
                selected: false,
            });
        }

        if let Some(ref cb) = config.progress_callback {
            cb.on_page_complete(page_number as usize, total, refs.len());
        }
    }

    info!("Harvested {} images from {} pages", images.len(), total);
    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_complete(total, images.len());
    }

    ExtractionSession::new(source, page_count, images)
}

/// Count image references per page without decoding any image data.
pub fn summarise_document(doc: &Document) -> DocumentSummary {
    let images_per_page = doc
        .get_pages()
        .values()
        .map(|&page_id| page_image_refs(doc, page_id, true).len())
        .collect::<Vec<_>>();

    DocumentSummary {
        page_count: images_per_page.len(),
        pdf_version: doc.version.clone(),
        images_per_page,
    }
}

/// Image XObject streams reachable from one page, in declaration order.
///
/// Direct (non-referenced) streams carry `None` as their object id.
fn page_image_refs(
    doc: &Document,
    page_id: ObjectId,
    descend_forms: bool,
) -> Vec<(Option<ObjectId>, &Stream)> {
    let mut out = Vec::new();
    let Some(resources) = page_resources(doc, page_id) else {
        return out;
    };
    let mut seen_images = HashSet::new();
    let mut seen_forms = HashSet::new();
    collect_images(
        doc,
        resources,
        descend_forms,
        0,
        &mut seen_images,
        &mut seen_forms,
        &mut out,
    );
    out
}

fn collect_images<'a>(
    doc: &'a Document,
    resources: &'a Dictionary,
    descend_forms: bool,
    depth: usize,
    seen_images: &mut HashSet<ObjectId>,
    seen_forms: &mut HashSet<ObjectId>,
    out: &mut Vec<(Option<ObjectId>, &'a Stream)>,
) {
    let xobjects = match resources.get(b"XObject").map(|o| resolve(doc, o)) {
        Ok(Object::Dictionary(d)) => d,
        _ => return,
    };

    for (name, entry) in xobjects.iter() {
        let id = match entry {
            Object::Reference(id) => Some(*id),
            _ => None,
        };
        let Object::Stream(stream) = resolve(doc, entry) else {
            debug!(
                "XObject /{} is not a stream, skipping",
                String::from_utf8_lossy(name)
            );
            continue;
        };

        match stream.dict.get(b"Subtype").map(|o| resolve(doc, o)) {
            Ok(Object::Name(n)) if n == b"Image" => {
                if let Some(id) = id {
                    if !seen_images.insert(id) {
                        continue;
                    }
                }
                out.push((id, stream));
            }
            Ok(Object::Name(n)) if n == b"Form" && descend_forms => {
                if depth >= MAX_FORM_DEPTH {
                    debug!("Form nesting deeper than {}, not descending", MAX_FORM_DEPTH);
                    continue;
                }
                if let Some(id) = id {
                    if !seen_forms.insert(id) {
                        continue;
                    }
                }
                if let Ok(Object::Dictionary(form_resources)) =
                    stream.dict.get(b"Resources").map(|o| resolve(doc, o))
                {
                    collect_images(
                        doc,
                        form_resources,
                        descend_forms,
                        depth + 1,
                        seen_images,
                        seen_forms,
                        out,
                    );
                }
            }
            _ => {}
        }
    }
}

/// The page's `/Resources`, inherited through `/Parent` when absent.
fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut current = page_id;
    // Bounded walk so a cyclic /Parent chain cannot spin forever.
    for _ in 0..64 {
        let dict = doc.get_object(current).ok()?.as_dict().ok()?;
        if let Ok(res) = dict.get(b"Resources") {
            return match resolve(doc, res) {
                Object::Dictionary(d) => Some(d),
                _ => None,
            };
        }
        current = dict.get(b"Parent").ok()?.as_reference().ok()?;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PageSelection;
    use crate::session::ImageKind;
    use lopdf::{dictionary, Stream};

    fn rgb_image(doc: &mut Document, shade: u8) -> ObjectId {
        doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 1i64,
                "Height" => 1i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8i64,
            },
            vec![shade, shade, shade],
        ))
    }

    /// Build a document whose pages hold the given XObject dictionaries.
    fn doc_with_pages(doc: &mut Document, page_xobjects: Vec<Dictionary>) {
        let pages_id = doc.new_object_id();
        let mut kids = Vec::new();
        for xobjects in page_xobjects {
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Resources" => dictionary! { "XObject" => xobjects },
            });
            kids.push(Object::Reference(page_id));
        }
        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
    }

    #[test]
    fn images_keyed_in_page_and_declaration_order() {
        let mut doc = Document::with_version("1.5");
        let a = rgb_image(&mut doc, 10);
        let b = rgb_image(&mut doc, 20);
        let c = rgb_image(&mut doc, 30);
        doc_with_pages(
            &mut doc,
            vec![
                dictionary! { "Im1" => a, "Im2" => b },
                dictionary! {},
                dictionary! { "X" => c },
            ],
        );

        let session = harvest_document(&doc, "t.pdf".into(), &ExtractionConfig::default());
        let keys: Vec<(u32, u32)> = session.keys().iter().map(|k| (k.page, k.index)).collect();
        assert_eq!(keys, vec![(1, 1), (1, 2), (3, 1)]);
        assert_eq!(session.page_count(), 3);
        assert_eq!(session.images()[1].object_id, b);
        assert!(session.images().iter().all(|i| i.kind == ImageKind::Png));
    }

    #[test]
    fn leading_junk_before_header_is_skipped() {
        let mut doc = Document::with_version("1.5");
        let a = rgb_image(&mut doc, 10);
        doc_with_pages(&mut doc, vec![dictionary! { "Im1" => a }]);
        let mut body = Vec::new();
        doc.save_to(&mut body).unwrap();

        let mut bytes = b"From: scanner@example.org\r\n\r\n".to_vec();
        bytes.extend_from_slice(&body);
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("junk.pdf");
        std::fs::write(&path, &bytes).unwrap();

        let session = harvest_blocking(&path, &ExtractionConfig::default()).unwrap();
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn empty_page_tree_gives_empty_session() {
        let mut doc = Document::with_version("1.5");
        doc_with_pages(&mut doc, vec![]);
        let session = harvest_document(&doc, "t.pdf".into(), &ExtractionConfig::default());
        assert!(session.is_empty());
        assert_eq!(session.page_count(), 0);
        assert_eq!(summarise_document(&doc).total_images(), 0);

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("blank.pdf");
        doc.save(&path).unwrap();
        let session = harvest_blocking(&path, &ExtractionConfig::default()).unwrap();
        assert!(session.is_empty());
    }

    #[test]
    fn duplicate_xref_on_one_page_is_skipped() {
        let mut doc = Document::with_version("1.5");
        let a = rgb_image(&mut doc, 10);
        doc_with_pages(
            &mut doc,
            vec![dictionary! { "Im1" => a, "Im2" => a }, dictionary! { "Im1" => a }],
        );
        let session = harvest_document(&doc, "t.pdf".into(), &ExtractionConfig::default());
        assert_eq!(session.images_on_page(1), 1);
        // Shared across pages is still one record per page.
        assert_eq!(session.images_on_page(2), 1);
    }

    #[test]
    fn form_xobjects_are_descended() {
        let mut doc = Document::with_version("1.5");
        let inner = rgb_image(&mut doc, 99);
        let own = rgb_image(&mut doc, 1);
        let form = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "BBox" => vec![0.into(), 0.into(), 10.into(), 10.into()],
                "Resources" => dictionary! {
                    "XObject" => dictionary! { "Inner" => inner },
                },
            },
            b"/Inner Do".to_vec(),
        ));
        doc_with_pages(&mut doc, vec![dictionary! { "Fm0" => form, "Im0" => own }]);

        let session = harvest_document(&doc, "t.pdf".into(), &ExtractionConfig::default());
        let ids: Vec<ObjectId> = session.images().iter().map(|i| i.object_id).collect();
        assert_eq!(ids, vec![inner, own]);

        let flat = ExtractionConfig::builder().descend_forms(false).build().unwrap();
        let session = harvest_document(&doc, "t.pdf".into(), &flat);
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn page_selection_keeps_document_page_numbers() {
        let mut doc = Document::with_version("1.5");
        let a = rgb_image(&mut doc, 10);
        let b = rgb_image(&mut doc, 20);
        doc_with_pages(&mut doc, vec![dictionary! { "A" => a }, dictionary! { "B" => b }]);

        let config = ExtractionConfig::builder()
            .pages(PageSelection::Single(2))
            .build()
            .unwrap();
        let session = harvest_document(&doc, "t.pdf".into(), &config);
        assert_eq!(session.len(), 1);
        assert_eq!(session.images()[0].page_number, 2);
        assert_eq!(session.page_count(), 2);
    }

    #[test]
    fn inherited_resources_are_used() {
        let mut doc = Document::with_version("1.5");
        let a = rgb_image(&mut doc, 10);
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1i64,
                "Resources" => dictionary! { "XObject" => dictionary! { "Im0" => a } },
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);

        let session = harvest_document(&doc, "t.pdf".into(), &ExtractionConfig::default());
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn summary_counts_without_decoding() {
        let mut doc = Document::with_version("1.4");
        let a = rgb_image(&mut doc, 10);
        let b = rgb_image(&mut doc, 20);
        doc_with_pages(
            &mut doc,
            vec![dictionary! { "A" => a, "B" => b }, dictionary! {}],
        );
        let summary = summarise_document(&doc);
        assert_eq!(summary.page_count, 2);
        assert_eq!(summary.images_per_page, vec![2, 0]);
        assert_eq!(summary.pdf_version, "1.4");
    }

    #[test]
    fn garbage_file_is_corrupt() {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"%PDF-1.4\nthis is not a pdf body").unwrap();
        let err = load_document(f.path()).unwrap_err();
        assert!(matches!(err, PdfImgError::CorruptPdf { .. }));
    }
}
