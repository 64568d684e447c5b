//! Integration tests: harvest, preview, select and export against PDFs
//! built in memory.

mod common;

use common::{imageless_pdf, three_page_pdf};
use edgequake_pdfimg::{
    extract, extract_from_bytes, extract_sync, inspect, CollisionPolicy, ExportSettings,
    ExtractionConfig, ExtractionEvent, Extractor, HarvestProgressCallback, ImageKey, ImageKind,
    PdfImgError, SelectionSurface,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn keys(surface: &SelectionSurface) -> Vec<(u32, u32)> {
    surface.tiles().iter().map(|t| (t.key.page, t.key.index)).collect()
}

fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// ── Harvest ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn three_page_document_yields_images_in_reading_order() {
    let tmp = tempfile::tempdir().unwrap();
    let pdf = three_page_pdf(tmp.path());

    let session = extract(&pdf.path, &ExtractionConfig::default()).await.unwrap();
    let keys: Vec<(u32, u32)> = session.keys().iter().map(|k| (k.page, k.index)).collect();
    assert_eq!(keys, vec![(1, 1), (1, 2), (3, 1)]);
    assert_eq!(session.page_count(), 3);
    assert_eq!(session.source_stem(), "report");

    let flate = session.get(ImageKey::new(1, 1)).unwrap();
    assert_eq!(flate.kind, ImageKind::Png);
    assert_eq!((flate.width, flate.height), (40, 20));
    let decoded = image::load_from_memory(&flate.raw_bytes).unwrap().to_rgb8();
    assert_eq!(decoded.get_pixel(0, 0).0, [200, 30, 30]);

    let jpeg = session.get(ImageKey::new(1, 2)).unwrap();
    assert_eq!(jpeg.kind, ImageKind::Jpeg);
    assert_eq!(jpeg.raw_bytes, pdf.p1_i2);
    assert_eq!(session.get(ImageKey::new(3, 1)).unwrap().raw_bytes, pdf.p3_i1);
    assert!(session.images().iter().all(|i| !i.is_selected()));
}

#[tokio::test]
async fn document_without_images_gives_empty_session() {
    let tmp = tempfile::tempdir().unwrap();
    let path = imageless_pdf(tmp.path(), 4);

    let session = extract(&path, &ExtractionConfig::default()).await.unwrap();
    assert!(session.is_empty());
    assert_eq!(session.page_count(), 4);

    let surface = SelectionSurface::build(session, &ExtractionConfig::default())
        .await
        .unwrap();
    assert!(surface.is_empty());
}

#[tokio::test]
async fn document_with_no_pages_opens_empty() {
    let tmp = tempfile::tempdir().unwrap();
    let path = imageless_pdf(tmp.path(), 0);

    let session = extract(&path, &ExtractionConfig::default()).await.unwrap();
    assert!(session.is_empty());
    assert_eq!(session.page_count(), 0);
    assert_eq!(inspect(&path).await.unwrap().page_count, 0);
}

#[tokio::test]
async fn junk_before_the_header_is_tolerated() {
    let tmp = tempfile::tempdir().unwrap();
    let pdf = three_page_pdf(tmp.path());
    let mut bytes = b"\xEF\xBB\xBFsaved by mailer\n".to_vec();
    bytes.extend(std::fs::read(&pdf.path).unwrap());
    let prefixed = tmp.path().join("prefixed.pdf");
    std::fs::write(&prefixed, &bytes).unwrap();

    let session = extract(&prefixed, &ExtractionConfig::default()).await.unwrap();
    assert_eq!(session.len(), 3);
    assert_eq!(session.get(ImageKey::new(1, 2)).unwrap().raw_bytes, pdf.p1_i2);

    let session = extract_from_bytes(&bytes, &ExtractionConfig::default())
        .await
        .unwrap();
    assert_eq!(session.len(), 3);
}

#[tokio::test]
async fn page_selection_limits_harvest() {
    let tmp = tempfile::tempdir().unwrap();
    let pdf = three_page_pdf(tmp.path());
    let config = ExtractionConfig::builder()
        .pages("3".parse().unwrap())
        .build()
        .unwrap();

    let session = extract(&pdf.path, &config).await.unwrap();
    let keys: Vec<(u32, u32)> = session.keys().iter().map(|k| (k.page, k.index)).collect();
    assert_eq!(keys, vec![(3, 1)]);
}

#[tokio::test]
async fn open_errors_are_classified() {
    let tmp = tempfile::tempdir().unwrap();
    let missing = tmp.path().join("missing.pdf");
    let err = extract(&missing, &ExtractionConfig::default()).await.unwrap_err();
    assert!(matches!(err, PdfImgError::FileNotFound { .. }));

    let text = tmp.path().join("notes.pdf");
    std::fs::write(&text, b"hello, not a pdf").unwrap();
    let err = extract(&text, &ExtractionConfig::default()).await.unwrap_err();
    assert!(matches!(err, PdfImgError::NotAPdf { .. }));

    let broken = tmp.path().join("broken.pdf");
    std::fs::write(&broken, b"%PDF-1.4\nthis is not an object graph").unwrap();
    let err = extract(&broken, &ExtractionConfig::default()).await.unwrap_err();
    assert!(err.is_document_open());
}

#[tokio::test]
async fn harvest_from_memory() {
    let tmp = tempfile::tempdir().unwrap();
    let pdf = three_page_pdf(tmp.path());
    let bytes = std::fs::read(&pdf.path).unwrap();

    let session = extract_from_bytes(&bytes, &ExtractionConfig::default())
        .await
        .unwrap();
    assert_eq!(session.len(), 3);
    assert!(session.source_stem().starts_with("pdfimg-"));

    let err = extract_from_bytes(b"GIF89a", &ExtractionConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PdfImgError::NotAPdf { .. }));
}

#[test]
fn sync_wrapper_matches_async_harvest() {
    let tmp = tempfile::tempdir().unwrap();
    let pdf = three_page_pdf(tmp.path());
    let session = extract_sync(&pdf.path, &ExtractionConfig::default()).unwrap();
    assert_eq!(session.len(), 3);
}

#[test]
fn inspect_counts_without_decoding() {
    let tmp = tempfile::tempdir().unwrap();
    let pdf = three_page_pdf(tmp.path());
    let summary = tokio_test::block_on(inspect(&pdf.path)).unwrap();
    assert_eq!(summary.page_count, 3);
    assert_eq!(summary.images_per_page, vec![2, 0, 1]);
    assert_eq!(summary.total_images(), 3);
    assert_eq!(summary.pdf_version, "1.5");
}

// ── Preview ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn thumbnails_fit_the_bounding_box() {
    let tmp = tempfile::tempdir().unwrap();
    let pdf = three_page_pdf(tmp.path());
    let config = ExtractionConfig::builder()
        .thumbnail_size(64, 48)
        .build()
        .unwrap();

    let session = extract(&pdf.path, &config).await.unwrap();
    let surface = SelectionSurface::build(session, &config).await.unwrap();
    assert_eq!(keys(&surface), vec![(1, 1), (1, 2), (3, 1)]);

    for tile in surface.tiles() {
        assert!(!tile.thumbnail.is_placeholder(), "{} has no preview", tile.label);
        let thumb = image::load_from_memory(tile.thumbnail.png()).unwrap();
        assert!(thumb.width() <= 64 && thumb.height() <= 48);
    }
    // 320x240 scales to exactly 64x48.
    let t = image::load_from_memory(surface.tiles()[1].thumbnail.png()).unwrap();
    assert_eq!((t.width(), t.height()), (64, 48));
    // 40x20 is already small enough and is not upscaled.
    let t = image::load_from_memory(surface.tiles()[0].thumbnail.png()).unwrap();
    assert_eq!((t.width(), t.height()), (40, 20));
    assert_eq!(surface.tiles()[1].label, "Page 1, Image 2");
}

// ── Export ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn exporting_one_selected_image_writes_exactly_that_file() {
    let tmp = tempfile::tempdir().unwrap();
    let pdf = three_page_pdf(tmp.path());
    let out = tmp.path().join("out");

    let session = extract(&pdf.path, &ExtractionConfig::default()).await.unwrap();
    let mut surface = SelectionSurface::new(session, 150, 150);
    assert_eq!(surface.toggle(ImageKey::new(1, 2)), Some(true));

    let settings = ExportSettings::builder().output_directory(&out).build().unwrap();
    let report = surface.export(&settings, None).unwrap();

    assert_eq!(report.counts(), (1, 1));
    assert_eq!(dir_entries(&out), vec!["img_p1_i2.png".to_string()]);
    assert_eq!(std::fs::read(out.join("img_p1_i2.png")).unwrap(), pdf.p1_i2);
}

#[tokio::test]
async fn exporting_nothing_reports_zero_and_touches_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let pdf = three_page_pdf(tmp.path());
    let out = tmp.path().join("never-created");

    let session = extract(&pdf.path, &ExtractionConfig::default()).await.unwrap();
    let surface = SelectionSurface::new(session, 150, 150);
    let settings = ExportSettings::builder().output_directory(&out).build().unwrap();

    let report = surface.export(&settings, None).unwrap();
    assert_eq!(report.counts(), (0, 0));
    assert!(!out.exists());
}

#[tokio::test]
async fn selection_expression_and_pattern_drive_file_names() {
    let tmp = tempfile::tempdir().unwrap();
    let pdf = three_page_pdf(tmp.path());
    let out = tmp.path().join("named");

    let session = extract(&pdf.path, &ExtractionConfig::default()).await.unwrap();
    let mut surface = SelectionSurface::new(session, 150, 150);
    assert_eq!(surface.apply(&"1:2, 3".parse().unwrap()), 2);

    let settings = ExportSettings::builder()
        .output_directory(&out)
        .filename_pattern("{stem}_{page:02}_{idx}.{ext}")
        .build()
        .unwrap();
    let report = surface.export(&settings, None).unwrap();
    assert!(report.is_complete());
    assert_eq!(
        dir_entries(&out),
        vec!["report_01_2.jpg".to_string(), "report_03_1.jpg".to_string()]
    );
    assert_eq!(std::fs::read(out.join("report_03_1.jpg")).unwrap(), pdf.p3_i1);
}

#[tokio::test]
async fn colliding_names_get_suffixes() {
    let tmp = tempfile::tempdir().unwrap();
    let pdf = three_page_pdf(tmp.path());
    let out = tmp.path().join("same");

    let session = extract(&pdf.path, &ExtractionConfig::default()).await.unwrap();
    let mut surface = SelectionSurface::new(session, 150, 150);
    surface.select_all();

    let settings = ExportSettings::builder()
        .output_directory(&out)
        .filename_pattern("image.png")
        .collision(CollisionPolicy::Suffix)
        .build()
        .unwrap();
    let report = surface.export(&settings, None).unwrap();
    assert_eq!(report.counts(), (3, 3));
    assert_eq!(
        dir_entries(&out),
        vec!["image.png", "image_2.png", "image_3.png"]
    );
}

#[derive(Default)]
struct Recorder {
    written: Mutex<Vec<String>>,
    completed: AtomicUsize,
}

impl HarvestProgressCallback for Recorder {
    fn on_file_written(&self, path: &Path, _bytes: usize) {
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        self.written.lock().unwrap().push(name);
    }

    fn on_export_complete(&self, succeeded: usize, _attempted: usize) {
        self.completed.store(succeeded, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn export_reports_each_file_to_the_callback() {
    let tmp = tempfile::tempdir().unwrap();
    let pdf = three_page_pdf(tmp.path());

    let session = extract(&pdf.path, &ExtractionConfig::default()).await.unwrap();
    let mut surface = SelectionSurface::new(session, 150, 150);
    surface.set(ImageKey::new(1, 1), true);
    surface.set(ImageKey::new(3, 1), true);

    let recorder = Recorder::default();
    let settings = ExportSettings::builder()
        .output_directory(tmp.path().join("cb"))
        .build()
        .unwrap();
    surface.export(&settings, Some(&recorder)).unwrap();

    assert_eq!(
        *recorder.written.lock().unwrap(),
        vec!["img_p1_i1.png", "img_p3_i1.png"]
    );
    assert_eq!(recorder.completed.load(Ordering::SeqCst), 2);
}

// ── Background extraction ────────────────────────────────────────────────────

#[tokio::test]
async fn background_extraction_streams_page_events() {
    let tmp = tempfile::tempdir().unwrap();
    let pdf = three_page_pdf(tmp.path());

    let extractor = Extractor::new();
    let mut handle = extractor.start(&pdf.path, &ExtractionConfig::default()).unwrap();

    let mut pages = Vec::new();
    let mut started = None;
    let session = loop {
        match handle.next_event().await.expect("channel closed early") {
            ExtractionEvent::Started { total_pages } => started = Some(total_pages),
            ExtractionEvent::PageDone {
                page_number,
                images_found,
                ..
            } => pages.push((page_number, images_found)),
            ExtractionEvent::Finished(result) => break result.unwrap(),
        }
    };

    assert_eq!(started, Some(3));
    assert_eq!(pages, vec![(1, 2), (2, 0), (3, 1)]);
    assert_eq!(session.len(), 3);
    assert!(!extractor.is_busy());
}

#[tokio::test]
async fn second_extraction_is_refused_while_one_is_in_flight() {
    let tmp = tempfile::tempdir().unwrap();
    let pdf = three_page_pdf(tmp.path());
    let extractor = Extractor::new();

    let first = extractor.start(&pdf.path, &ExtractionConfig::default()).unwrap();
    assert!(extractor.is_busy());

    let err = extractor
        .clone()
        .start(&pdf.path, &ExtractionConfig::default())
        .unwrap_err();
    assert!(matches!(err, PdfImgError::ExtractionInProgress));

    let session = first.wait().await.unwrap();
    assert_eq!(session.len(), 3);
    assert!(!extractor.is_busy());

    // Free again once the first one has finished.
    let again = extractor.start(&pdf.path, &ExtractionConfig::default()).unwrap();
    assert_eq!(again.wait().await.unwrap().len(), 3);
}

#[tokio::test]
async fn caller_callback_sees_harvest_progress() {
    #[derive(Default)]
    struct Pages(AtomicUsize);
    impl HarvestProgressCallback for Pages {
        fn on_page_complete(&self, _page: usize, _total: usize, _found: usize) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let tmp = tempfile::tempdir().unwrap();
    let pdf = three_page_pdf(tmp.path());
    let pages = Arc::new(Pages::default());
    let config = ExtractionConfig::builder()
        .progress_callback(pages.clone())
        .build()
        .unwrap();

    Extractor::new().start(&pdf.path, &config).unwrap().wait().await.unwrap();
    assert_eq!(pages.0.load(Ordering::SeqCst), 3);
}
