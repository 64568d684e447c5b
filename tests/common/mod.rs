//! Shared PDF builders for the integration tests.
//!
//! Documents are assembled with lopdf in memory and saved into a temp dir,
//! so the tests need no sample files on disk.

#![allow(dead_code)]

use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::{DynamicImage, ImageFormat, RgbImage};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

/// Encode a `width`×`height` gradient as a baseline JPEG.
pub fn jpeg_bytes(width: u32, height: u32, seed: u8) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            seed,
        ])
    });
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
        .unwrap();
    buf
}

/// Add a DCTDecode image XObject; returns its id and the embedded bytes.
pub fn jpeg_xobject(doc: &mut Document, width: u32, height: u32, seed: u8) -> (ObjectId, Vec<u8>) {
    let bytes = jpeg_bytes(width, height, seed);
    let mut stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8i64,
            "Filter" => "DCTDecode",
        },
        bytes.clone(),
    );
    // Already compressed; keep lopdf from re-encoding on save.
    stream.allows_compression = false;
    (doc.add_object(stream), bytes)
}

/// Add a FlateDecode DeviceRGB XObject filled with one colour.
pub fn flate_rgb_xobject(doc: &mut Document, width: u32, height: u32, rgb: [u8; 3]) -> ObjectId {
    let raw: Vec<u8> = (0..width * height).flat_map(|_| rgb).collect();
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&raw).unwrap();
    let compressed = encoder.finish().unwrap();

    let mut stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8i64,
            "Filter" => "FlateDecode",
        },
        compressed,
    );
    stream.allows_compression = false;
    doc.add_object(stream)
}

/// Wire up a page tree where page *n* carries `page_xobjects[n - 1]`.
pub fn finish_document(doc: &mut Document, page_xobjects: Vec<Dictionary>) {
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

/// A saved three-page document: page 1 holds a Flate RGB image then a
/// JPEG, page 2 nothing, page 3 one JPEG.
pub struct ThreePagePdf {
    pub path: PathBuf,
    /// Embedded JPEG bytes of image (1, 2).
    pub p1_i2: Vec<u8>,
    /// Embedded JPEG bytes of image (3, 1).
    pub p3_i1: Vec<u8>,
}

pub fn three_page_pdf(dir: &Path) -> ThreePagePdf {
    let mut doc = Document::with_version("1.5");
    let flate = flate_rgb_xobject(&mut doc, 40, 20, [200, 30, 30]);
    let (jpeg_a, p1_i2) = jpeg_xobject(&mut doc, 320, 240, 7);
    let (jpeg_b, p3_i1) = jpeg_xobject(&mut doc, 64, 128, 99);
    finish_document(
        &mut doc,
        vec![
            dictionary! { "Im0" => flate, "Im1" => jpeg_a },
            dictionary! {},
            dictionary! { "Photo" => jpeg_b },
        ],
    );
    let path = dir.join("report.pdf");
    doc.save(&path).unwrap();
    ThreePagePdf { path, p1_i2, p3_i1 }
}

/// A saved document with `pages` pages and no images at all.
pub fn imageless_pdf(dir: &Path, pages: usize) -> PathBuf {
    let mut doc = Document::with_version("1.4");
    finish_document(&mut doc, vec![Dictionary::new(); pages]);
    let path = dir.join("text-only.pdf");
    doc.save(&path).unwrap();
    path
}
