//! Thumbnail rendering: decode, downscale into a bounding box, re-encode.
//!
//! ## Why never upscale?
//!
//! A thumbnail is a preview. Blowing a 16 × 16 icon up to 150 × 150 costs
//! memory and shows nothing new; the tile simply renders it small.
//!
//! ## Why PNG?
//!
//! Preview tiles are small and lossless keeps line art and text in
//! scanned images legible. JPEG is offered for thumbnails written to disk,
//! at the export quality setting.

use crate::config::ThumbnailFormat;
use crate::error::ItemError;
use crate::session::ExtractedImage;
use image::codecs::jpeg::JpegEncoder;
use image::{imageops::FilterType, DynamicImage, ImageError, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use tracing::{debug, warn};

/// Largest size that fits `(width, height)` inside `(max_w, max_h)`,
/// preserving aspect ratio and never growing the image.
pub fn fit_within(width: u32, height: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    if width <= max_w && height <= max_h {
        return (width, height);
    }
    let ratio = f64::min(max_w as f64 / width as f64, max_h as f64 / height as f64);
    let nw = ((width as f64 * ratio).floor() as u32).clamp(1, max_w.max(1));
    let nh = ((height as f64 * ratio).floor() as u32).clamp(1, max_h.max(1));
    (nw, nh)
}

/// Decode `bytes` and return a PNG no larger than `max_w` × `max_h`.
pub fn render_thumbnail(bytes: &[u8], max_w: u32, max_h: u32) -> Result<Vec<u8>, ImageError> {
    let small = downscale(bytes, max_w, max_h)?;
    debug!("Thumbnail {}x{}", small.width(), small.height());
    encode(&small, ThumbnailFormat::Png, 90)
}

/// Re-encode an already rendered thumbnail in `format`.
///
/// `quality` (1–100) only applies to JPEG output.
pub fn transcode_thumbnail(
    png: &[u8],
    format: ThumbnailFormat,
    quality: u8,
) -> Result<Vec<u8>, ImageError> {
    match format {
        ThumbnailFormat::Png => Ok(png.to_vec()),
        ThumbnailFormat::Jpeg => encode(&image::load_from_memory(png)?, format, quality),
    }
}

fn downscale(bytes: &[u8], max_w: u32, max_h: u32) -> Result<DynamicImage, ImageError> {
    let img = image::load_from_memory(bytes)?;
    let (nw, nh) = fit_within(img.width(), img.height(), max_w, max_h);
    if (nw, nh) == (img.width(), img.height()) {
        Ok(img)
    } else {
        Ok(img.resize_exact(nw, nh, FilterType::Triangle))
    }
}

fn encode(img: &DynamicImage, format: ThumbnailFormat, quality: u8) -> Result<Vec<u8>, ImageError> {
    let mut buf = Vec::new();
    match format {
        ThumbnailFormat::Png => {
            img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
        }
        ThumbnailFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            let encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
            rgb.write_with_encoder(encoder)?;
        }
    }
    Ok(buf)
}

/// Grey tile with a darker frame and diagonal, shown for undecodable images.
pub fn placeholder_png(max_w: u32, max_h: u32) -> Vec<u8> {
    let (w, h) = (max_w.clamp(1, 256), max_h.clamp(1, 256));
    let img = RgbImage::from_fn(w, h, |x, y| {
        let on_frame = x == 0 || y == 0 || x + 1 == w || y + 1 == h;
        let on_diagonal = (x as u64 * h as u64).abs_diff(y as u64 * w as u64) < w.max(h) as u64;
        if on_frame || on_diagonal {
            Rgb([128, 128, 128])
        } else {
            Rgb([224, 224, 224])
        }
    });
    let mut buf = Vec::new();
    if let Err(e) = DynamicImage::ImageRgb8(img).write_to(&mut Cursor::new(&mut buf), ImageFormat::Png) {
        warn!("Placeholder encoding failed: {}", e);
    }
    buf
}

/// Preview of one session image: the rendered thumbnail, or a placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Thumbnail {
    Rendered {
        png: Vec<u8>,
        width: u32,
        height: u32,
    },
    Placeholder {
        png: Vec<u8>,
        error: ItemError,
    },
}

impl Thumbnail {
    /// Render the thumbnail for `image`, substituting a placeholder on failure.
    pub fn render(image: &ExtractedImage, max_w: u32, max_h: u32) -> Self {
        let rendered = downscale(&image.raw_bytes, max_w, max_h).and_then(|small| {
            let png = encode(&small, ThumbnailFormat::Png, 90)?;
            Ok((png, small.width(), small.height()))
        });
        match rendered {
            Ok((png, width, height)) => Thumbnail::Rendered { png, width, height },
            Err(e) => {
                let error = ItemError::Decode {
                    page: image.page_number,
                    index: image.image_index,
                    detail: e.to_string(),
                };
                warn!("{}", error);
                Thumbnail::Placeholder {
                    png: placeholder_png(max_w, max_h),
                    error,
                }
            }
        }
    }

    /// PNG bytes to display, placeholder or not.
    pub fn png(&self) -> &[u8] {
        match self {
            Thumbnail::Rendered { png, .. } | Thumbnail::Placeholder { png, .. } => png,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Thumbnail::Placeholder { .. })
    }

    pub fn error(&self) -> Option<&ItemError> {
        match self {
            Thumbnail::Placeholder { error, .. } => Some(error),
            Thumbnail::Rendered { .. } => None,
        }
    }
}
