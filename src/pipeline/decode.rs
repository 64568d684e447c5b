//! Image XObject decoding: turn a PDF image stream into an image file.
//!
//! ## Why not just dump the stream?
//!
//! Only two PDF filters store a complete, self-describing image file:
//! `DCTDecode` (a JPEG) and `JPXDecode` (a JPEG 2000 codestream). Everything
//! else (`FlateDecode`, `LZWDecode`, `ASCII85Decode`, `RunLengthDecode`,
//! uncompressed) is bare samples
//! whose meaning lives in the XObject dictionary (`/Width`, `/Height`,
//! `/ColorSpace`, `/BitsPerComponent`, `/Decode`). Those samples are unpacked
//! here and re-wrapped as PNG so the exported file opens in any viewer.
//!
//! Streams that cannot be interpreted are kept as [`ImageKind::Raw`] rather
//! than dropped: the session must hold one record per image reference.
//!
//! Every size taken from the stream dictionary is checked before it is used
//! to allocate, and filter output is capped by what the image dimensions
//! allow, so a malformed stream degrades to `Raw` instead of exhausting
//! memory.

use crate::session::ImageKind;
use flate2::read::ZlibDecoder;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::{Dictionary, Document, Object, Stream};
use std::io::{Cursor, Read, Write};
use weezl::{decode::Decoder as LzwDecoder, BitOrder};
use tracing::{debug, warn};

/// Upper bound on decoded pixels (about 16k × 16k) to keep memory bounded.
const MAX_PIXELS: u64 = 1 << 28;

/// Upper bound on any single filter's output.
const MAX_DECODED_BYTES: u64 = 1 << 30;

/// A decoded image XObject, ready to store in the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub kind: ImageKind,
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Follow an indirect reference, returning the object itself otherwise.
pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

fn dict_int(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<i64> {
    match resolve(doc, dict.get(key).ok()?) {
        Object::Integer(i) => Some(*i),
        Object::Real(r) => Some(*r as i64),
        _ => None,
    }
}

fn name_of(doc: &Document, obj: &Object) -> Option<String> {
    match resolve(doc, obj) {
        Object::Name(n) => Some(String::from_utf8_lossy(n).into_owned()),
        _ => None,
    }
}

/// Filter names applied to the stream, in application order.
fn filter_chain(doc: &Document, dict: &Dictionary) -> Vec<String> {
    match dict.get(b"Filter").map(|f| resolve(doc, f)) {
        Ok(Object::Name(n)) => vec![String::from_utf8_lossy(n).into_owned()],
        Ok(Object::Array(arr)) => arr.iter().filter_map(|f| name_of(doc, f)).collect(),
        _ => Vec::new(),
    }
}

/// `/DecodeParms` entry for the filter at position `i` of the chain.
fn decode_parms<'a>(doc: &'a Document, dict: &'a Dictionary, i: usize) -> Option<&'a Dictionary> {
    match resolve(doc, dict.get(b"DecodeParms").ok()?) {
        Object::Dictionary(d) if i == 0 => Some(d),
        Object::Array(arr) => match resolve(doc, arr.get(i)?) {
            Object::Dictionary(d) => Some(d),
            _ => None,
        },
        _ => None,
    }
}

/// Decode an image XObject stream into an image file.
///
/// Never fails: streams that cannot be interpreted come back as
/// [`ImageKind::Raw`] carrying the stream bytes verbatim.
pub fn decode_xobject(doc: &Document, stream: &Stream) -> DecodedImage {
    let width = dict_int(doc, &stream.dict, b"Width").unwrap_or(0).max(0) as u32;
    let height = dict_int(doc, &stream.dict, b"Height").unwrap_or(0).max(0) as u32;

    match try_decode(doc, stream, width, height) {
        Ok(decoded) => decoded,
        Err(reason) => {
            warn!("Keeping image stream undecoded: {}", reason);
            DecodedImage {
                kind: ImageKind::Raw,
                bytes: stream.content.clone(),
                width,
                height,
            }
        }
    }
}

fn try_decode(
    doc: &Document,
    stream: &Stream,
    width: u32,
    height: u32,
) -> Result<DecodedImage, String> {
    let filters = filter_chain(doc, &stream.dict);
    let passthrough = match filters.last().map(String::as_str) {
        Some("DCTDecode") | Some("DCT") => Some(ImageKind::Jpeg),
        Some("JPXDecode") => Some(ImageKind::Jpeg2000),
        Some("JBIG2Decode") => Some(ImageKind::Jbig2),
        Some("CCITTFaxDecode") | Some("CCF") => Some(ImageKind::CcittFax),
        _ => None,
    };

    if let Some(kind) = passthrough {
        // Outer filters (e.g. Flate around a JPEG) are undone; the innermost
        // codec's bytes are the image file.
        let outer = &filters[..filters.len() - 1];
        let bytes = apply_filters(doc, &stream.dict, outer, &stream.content, MAX_DECODED_BYTES as usize)?;
        debug!("Passthrough {:?} image, {} bytes", kind, bytes.len());
        return Ok(DecodedImage {
            kind,
            bytes,
            width,
            height,
        });
    }

    if width == 0 || height == 0 {
        return Err(format!("invalid image dimensions {width}x{height}"));
    }
    if (width as u64) * (height as u64) > MAX_PIXELS {
        return Err(format!("image too large: {width}x{height}"));
    }

    // Eight bytes per pixel (4 components at 16 bits) plus one predictor
    // byte per row covers every legal layout.
    let limit = (width as u64 * height as u64 * 8 + height as u64).min(MAX_DECODED_BYTES);
    let samples = apply_filters(doc, &stream.dict, &filters, &stream.content, limit as usize)?;
    let image = samples_to_image(doc, &stream.dict, width, height, &samples)?;

    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| format!("PNG encoding failed: {e}"))?;

    Ok(DecodedImage {
        kind: ImageKind::Png,
        bytes: buf,
        width,
        height,
    })
}

// ── Filters ──────────────────────────────────────────────────────────────

/// Write sink that refuses to grow past `limit` bytes.
struct Bounded {
    out: Vec<u8>,
    limit: usize,
}

impl Bounded {
    fn new(limit: usize) -> Self {
        Self {
            out: Vec::new(),
            limit,
        }
    }

    fn extend(&mut self, bytes: &[u8]) -> Result<(), String> {
        if self.out.len() + bytes.len() > self.limit {
            return Err(format!("decoded stream exceeds {} bytes", self.limit));
        }
        self.out.extend_from_slice(bytes);
        Ok(())
    }
}

impl Write for Bounded {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.extend(buf)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::OutOfMemory, e))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Undo `filters` in order. No intermediate result may exceed `limit` bytes.
fn apply_filters(
    doc: &Document,
    dict: &Dictionary,
    filters: &[String],
    content: &[u8],
    limit: usize,
) -> Result<Vec<u8>, String> {
    let mut data = content.to_vec();
    for (i, filter) in filters.iter().enumerate() {
        let parms = decode_parms(doc, dict, i);
        data = match filter.as_str() {
            "FlateDecode" | "Fl" => apply_predictor(doc, parms, inflate(&data, limit)?)?,
            "LZWDecode" | "LZW" => apply_predictor(doc, parms, lzw_decode(doc, parms, &data, limit)?)?,
            "ASCII85Decode" | "A85" => ascii85_decode(&data, limit)?,
            "ASCIIHexDecode" | "AHx" => ascii_hex_decode(&data)?,
            "RunLengthDecode" | "RL" => run_length_decode(&data, limit)?,
            other => return Err(format!("unsupported filter /{other}")),
        };
    }
    Ok(data)
}

fn inflate(data: &[u8], limit: usize) -> Result<Vec<u8>, String> {
    let mut decoder = ZlibDecoder::new(data).take(limit as u64 + 1);
    let mut out = Vec::new();
    let result = decoder.read_to_end(&mut out);
    if out.len() > limit {
        return Err(format!("FlateDecode output exceeds {limit} bytes"));
    }
    match result {
        Ok(_) => Ok(out),
        // Truncated streams are common; keep what inflated cleanly.
        Err(e) if !out.is_empty() => {
            debug!("Flate stream ended early ({}), using {} bytes", e, out.len());
            Ok(out)
        }
        Err(e) => Err(format!("FlateDecode failed: {e}")),
    }
}

fn lzw_decode(
    doc: &Document,
    parms: Option<&Dictionary>,
    data: &[u8],
    limit: usize,
) -> Result<Vec<u8>, String> {
    let early_change = parms
        .and_then(|p| dict_int(doc, p, b"EarlyChange"))
        .is_none_or(|v| v != 0);
    let mut decoder = if early_change {
        LzwDecoder::with_tiff_size_switch(BitOrder::Msb, 8)
    } else {
        LzwDecoder::new(BitOrder::Msb, 8)
    };

    let mut sink = Bounded::new(limit);
    let result = decoder.into_stream(&mut sink).decode_all(data);
    match result.status {
        Ok(()) => Ok(sink.out),
        Err(e) if e.kind() == std::io::ErrorKind::OutOfMemory => Err(e.to_string()),
        Err(e) if !sink.out.is_empty() => {
            debug!("LZW stream ended early ({}), using {} bytes", e, sink.out.len());
            Ok(sink.out)
        }
        Err(e) => Err(format!("LZWDecode failed: {e}")),
    }
}

fn apply_predictor(
    doc: &Document,
    parms: Option<&Dictionary>,
    data: Vec<u8>,
) -> Result<Vec<u8>, String> {
    let Some(parms) = parms else {
        return Ok(data);
    };
    let predictor = dict_int(doc, parms, b"Predictor").unwrap_or(1);
    if predictor < 2 {
        return Ok(data);
    }
    let param = |key: &[u8], default: i64| -> usize {
        dict_int(doc, parms, key).unwrap_or(default).clamp(1, i64::from(u32::MAX)) as usize
    };
    let colors = param(b"Colors", 1);
    let bpc = param(b"BitsPerComponent", 8);
    let columns = param(b"Columns", 1);

    let bits_per_pixel = colors
        .checked_mul(bpc)
        .ok_or("predictor pixel size overflows")?;
    let row_len = bits_per_pixel
        .checked_mul(columns)
        .ok_or("predictor row size overflows")?
        .div_ceil(8);
    if row_len > data.len() {
        return Err(format!(
            "predictor row of {row_len} bytes exceeds the {} decoded bytes",
            data.len()
        ));
    }
    let bpp = bits_per_pixel.div_ceil(8).max(1);

    if predictor == 2 {
        if bpc != 8 {
            return Err(format!("TIFF predictor with {bpc} bits per component"));
        }
        let mut out = data;
        for row in out.chunks_mut(row_len) {
            for i in bpp..row.len() {
                row[i] = row[i].wrapping_add(row[i - bpp]);
            }
        }
        return Ok(out);
    }

    // PNG predictors: every row carries its own filter-type byte.
    let mut out = Vec::with_capacity(data.len());
    let mut prev = vec![0u8; row_len];
    for chunk in data.chunks(row_len + 1) {
        if chunk.len() < 2 {
            break;
        }
        let filter_type = chunk[0];
        let mut row = chunk[1..].to_vec();
        row.resize(row_len, 0);
        for i in 0..row_len {
            let left = if i >= bpp { row[i - bpp] } else { 0 };
            let up = prev[i];
            let up_left = if i >= bpp { prev[i - bpp] } else { 0 };
            row[i] = match filter_type {
                0 => row[i],
                1 => row[i].wrapping_add(left),
                2 => row[i].wrapping_add(up),
                3 => row[i].wrapping_add(((left as u16 + up as u16) / 2) as u8),
                4 => row[i].wrapping_add(paeth(left, up, up_left)),
                other => return Err(format!("unknown PNG row filter {other}")),
            };
        }
        out.extend_from_slice(&row);
        prev = row;
    }
    Ok(out)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

fn ascii85_decode(data: &[u8], limit: usize) -> Result<Vec<u8>, String> {
    let body = data.strip_prefix(b"<~").unwrap_or(data);
    let mut out = Bounded::new(limit);
    let mut group = [0u8; 5];
    let mut n = 0;

    for &c in body {
        match c {
            b'~' => break,
            c if c.is_ascii_whitespace() => continue,
            b'z' if n == 0 => out.extend(&[0; 4])?,
            b'!'..=b'u' => {
                group[n] = c - b'!';
                n += 1;
                if n == 5 {
                    out.extend(&ascii85_group(&group)?)?;
                    n = 0;
                }
            }
            other => return Err(format!("invalid ASCII85 character {:?}", other as char)),
        }
    }
    match n {
        0 => {}
        1 => return Err("ASCII85 stream ends with a single character".to_string()),
        _ => {
            // A final partial group is padded with 'u' and yields n - 1 bytes.
            group[n..].fill(b'u' - b'!');
            out.extend(&ascii85_group(&group)?[..n - 1])?;
        }
    }
    Ok(out.out)
}

fn ascii85_group(digits: &[u8; 5]) -> Result<[u8; 4], String> {
    let value = digits
        .iter()
        .try_fold(0u32, |acc, &d| acc.checked_mul(85)?.checked_add(d as u32))
        .ok_or("ASCII85 group out of range")?;
    Ok(value.to_be_bytes())
}

fn ascii_hex_decode(data: &[u8]) -> Result<Vec<u8>, String> {
    let mut out = Vec::with_capacity(data.len() / 2);
    let mut high: Option<u8> = None;
    for &c in data {
        if c == b'>' {
            break;
        }
        if c.is_ascii_whitespace() {
            continue;
        }
        let nibble = (c as char)
            .to_digit(16)
            .ok_or_else(|| format!("invalid hex digit {:?}", c as char))? as u8;
        match high.take() {
            Some(h) => out.push((h << 4) | nibble),
            None => high = Some(nibble),
        }
    }
    if let Some(h) = high {
        out.push(h << 4);
    }
    Ok(out)
}

fn run_length_decode(data: &[u8], limit: usize) -> Result<Vec<u8>, String> {
    let mut out = Bounded::new(limit);
    let mut i = 0;
    while i < data.len() {
        let len = data[i];
        i += 1;
        match len {
            128 => break,
            0..=127 => {
                let n = len as usize + 1;
                let end = (i + n).min(data.len());
                out.extend(&data[i..end])?;
                i = end;
            }
            _ => {
                if let Some(&b) = data.get(i) {
                    out.extend(&[b; 128][..257 - len as usize])?;
                }
                i += 1;
            }
        }
    }
    Ok(out.out)
}

// ── Colour spaces ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum ColorSpace {
    Gray,
    Rgb,
    Cmyk,
    /// Single tint component; 1.0 means full ink.
    Separation,
    Indexed {
        base: Box<ColorSpace>,
        hival: usize,
        lookup: Vec<u8>,
    },
}

impl ColorSpace {
    fn components(&self) -> usize {
        match self {
            ColorSpace::Gray | ColorSpace::Separation | ColorSpace::Indexed { .. } => 1,
            ColorSpace::Rgb => 3,
            ColorSpace::Cmyk => 4,
        }
    }
}

fn parse_color_space(doc: &Document, obj: &Object) -> Result<ColorSpace, String> {
    match resolve(doc, obj) {
        Object::Name(n) => match n.as_slice() {
            b"DeviceGray" | b"G" | b"CalGray" => Ok(ColorSpace::Gray),
            b"DeviceRGB" | b"RGB" | b"CalRGB" => Ok(ColorSpace::Rgb),
            b"DeviceCMYK" | b"CMYK" => Ok(ColorSpace::Cmyk),
            other => Err(format!(
                "unsupported colour space /{}",
                String::from_utf8_lossy(other)
            )),
        },
        Object::Array(arr) => {
            let family = arr
                .first()
                .and_then(|f| name_of(doc, f))
                .ok_or("colour space array without a family name")?;
            match family.as_str() {
                "ICCBased" => {
                    let n = arr
                        .get(1)
                        .and_then(|s| match resolve(doc, s) {
                            Object::Stream(s) => dict_int(doc, &s.dict, b"N"),
                            _ => None,
                        })
                        .unwrap_or(3);
                    match n {
                        1 => Ok(ColorSpace::Gray),
                        3 => Ok(ColorSpace::Rgb),
                        4 => Ok(ColorSpace::Cmyk),
                        other => Err(format!("ICCBased profile with {other} components")),
                    }
                }
                "CalGray" => Ok(ColorSpace::Gray),
                "CalRGB" | "Lab" => Ok(ColorSpace::Rgb),
                "Separation" => Ok(ColorSpace::Separation),
                "Indexed" | "I" => {
                    let base = arr.get(1).ok_or("Indexed without base")?;
                    let base = parse_color_space(doc, base)?;
                    if matches!(base, ColorSpace::Indexed { .. }) {
                        return Err("nested Indexed colour space".to_string());
                    }
                    let hival = match arr.get(2).map(|o| resolve(doc, o)) {
                        Some(Object::Integer(h)) => (*h).clamp(0, 255) as usize,
                        _ => return Err("Indexed without hival".to_string()),
                    };
                    let lookup = match arr.get(3).map(|o| resolve(doc, o)) {
                        Some(Object::String(bytes, _)) => bytes.clone(),
                        Some(Object::Stream(s)) => {
                            let filters = filter_chain(doc, &s.dict);
                            apply_filters(doc, &s.dict, &filters, &s.content, 256 * 4)?
                        }
                        _ => return Err("Indexed without lookup table".to_string()),
                    };
                    Ok(ColorSpace::Indexed {
                        base: Box::new(base),
                        hival,
                        lookup,
                    })
                }
                other => Err(format!("unsupported colour space family /{other}")),
            }
        }
        _ => Err("malformed /ColorSpace".to_string()),
    }
}

/// Unpack the samples of one image into an 8-bit `DynamicImage`.
fn samples_to_image(
    doc: &Document,
    dict: &Dictionary,
    width: u32,
    height: u32,
    data: &[u8],
) -> Result<DynamicImage, String> {
    let is_mask = matches!(
        dict.get(b"ImageMask").map(|o| resolve(doc, o)),
        Ok(Object::Boolean(true))
    );
    let cs = if is_mask {
        ColorSpace::Gray
    } else {
        match dict.get(b"ColorSpace") {
            Ok(obj) => parse_color_space(doc, obj)?,
            Err(_) => return Err("missing /ColorSpace".to_string()),
        }
    };
    let bpc = if is_mask {
        1
    } else {
        dict_int(doc, dict, b"BitsPerComponent").unwrap_or(8)
    };
    if !matches!(bpc, 1 | 2 | 4 | 8 | 16) {
        return Err(format!("unsupported BitsPerComponent {bpc}"));
    }
    let bpc = bpc as usize;
    let ncomp = cs.components();
    let (w, h) = (width as usize, height as usize);

    let row_bytes = (w * ncomp * bpc).div_ceil(8);
    if data.len() < row_bytes * h {
        return Err(format!(
            "sample data too short: got {} bytes, expected {}",
            data.len(),
            row_bytes * h
        ));
    }

    let max_val = ((1u32 << bpc) - 1) as f32;
    let decode = decode_array(doc, dict, ncomp);

    // One 8-bit value per component (or palette index for Indexed).
    let mut values = Vec::with_capacity(w * h * ncomp);
    for row in data.chunks(row_bytes).take(h) {
        for s in 0..w * ncomp {
            let raw = read_sample(row, s, bpc);
            let v = if let ColorSpace::Indexed { .. } = cs {
                raw.min(255) as u8
            } else {
                let (dmin, dmax) = decode
                    .as_ref()
                    .map(|d| d[s % ncomp])
                    .unwrap_or((0.0, 1.0));
                let unit = dmin + (raw as f32 / max_val) * (dmax - dmin);
                (unit.clamp(0.0, 1.0) * 255.0).round() as u8
            };
            values.push(v);
        }
    }

    let image = match &cs {
        ColorSpace::Gray => gray_image(width, height, values)?,
        ColorSpace::Separation => {
            gray_image(width, height, values.into_iter().map(|v| 255 - v).collect())?
        }
        ColorSpace::Rgb => rgb_image(width, height, values)?,
        ColorSpace::Cmyk => rgb_image(width, height, cmyk_to_rgb(&values))?,
        ColorSpace::Indexed {
            base,
            hival,
            lookup,
        } => {
            let bn = base.components();
            let mut expanded = Vec::with_capacity(values.len() * bn);
            for idx in values {
                let idx = (idx as usize).min(*hival);
                let start = idx * bn;
                match lookup.get(start..start + bn) {
                    Some(entry) => expanded.extend_from_slice(entry),
                    None => expanded.extend(std::iter::repeat_n(0u8, bn)),
                }
            }
            match base.as_ref() {
                ColorSpace::Gray => gray_image(width, height, expanded)?,
                ColorSpace::Separation => gray_image(
                    width,
                    height,
                    expanded.into_iter().map(|v| 255 - v).collect(),
                )?,
                ColorSpace::Rgb => rgb_image(width, height, expanded)?,
                ColorSpace::Cmyk => rgb_image(width, height, cmyk_to_rgb(&expanded))?,
                ColorSpace::Indexed { .. } => return Err("nested Indexed colour space".into()),
            }
        }
    };
    Ok(image)
}

/// Read sample `n` of a row packed at `bpc` bits, MSB first.
fn read_sample(row: &[u8], n: usize, bpc: usize) -> u32 {
    match bpc {
        8 => row[n] as u32,
        16 => u16::from_be_bytes([row[2 * n], row[2 * n + 1]]) as u32,
        _ => {
            let bit = n * bpc;
            let byte = row[bit / 8];
            let shift = 8 - bpc - (bit % 8);
            ((byte >> shift) as u32) & ((1 << bpc) - 1)
        }
    }
}

fn decode_array(doc: &Document, dict: &Dictionary, ncomp: usize) -> Option<Vec<(f32, f32)>> {
    let arr = match resolve(doc, dict.get(b"Decode").ok()?) {
        Object::Array(a) => a,
        _ => return None,
    };
    let nums: Vec<f32> = arr
        .iter()
        .filter_map(|o| match resolve(doc, o) {
            Object::Integer(i) => Some(*i as f32),
            Object::Real(r) => Some(*r as f32),
            _ => None,
        })
        .collect();
    if nums.len() < ncomp * 2 {
        return None;
    }
    Some(nums.chunks(2).take(ncomp).map(|p| (p[0], p[1])).collect())
}

fn cmyk_to_rgb(values: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() / 4 * 3);
    for px in values.chunks_exact(4) {
        let k = 255 - px[3] as u16;
        for &c in &px[..3] {
            out.push(((255 - c as u16) * k / 255) as u8);
        }
    }
    out
}

fn gray_image(width: u32, height: u32, values: Vec<u8>) -> Result<DynamicImage, String> {
    GrayImage::from_raw(width, height, values)
        .map(DynamicImage::ImageLuma8)
        .ok_or_else(|| "grayscale buffer size mismatch".to_string())
}

fn rgb_image(width: u32, height: u32, values: Vec<u8>) -> Result<DynamicImage, String> {
    RgbImage::from_raw(width, height, values)
        .map(DynamicImage::ImageRgb8)
        .ok_or_else(|| "RGB buffer size mismatch".to_string())
}
