//! Exporting: write the selected images to disk under a naming pattern.
//!
//! ## Why raw bytes?
//!
//! Export writes each record's `raw_bytes` unchanged. Re-encoding would lose
//! quality for JPEGs and change the file a user expects to get back out of
//! the PDF. Thumbnails are never exported in place of the original.
//!
//! ## Why temp file + rename?
//!
//! A crash or full disk mid-write must not leave a truncated image under the
//! final name. Each file is written to a temporary sibling in the output
//! directory and renamed into place, which is atomic on the same filesystem.

use crate::config::{CollisionPolicy, ExportSettings};
use crate::error::{ItemError, PdfImgError};
use crate::output::ExportReport;
use crate::pipeline::thumbnail::transcode_thumbnail;
use crate::progress::HarvestProgressCallback;
use crate::selection::SelectionSurface;
use crate::session::{ExtractedImage, ExtractionSession};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

static RE_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([^{}]*)\}").unwrap());

static RE_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(page|idx|ext|stem)(?::0?([1-9]))?$").unwrap());

/// Check a file-name pattern: non-empty, no path separators, only known
/// placeholders, balanced braces.
pub fn validate_pattern(pattern: &str) -> Result<(), String> {
    if pattern.trim().is_empty() {
        return Err("Filename pattern must not be empty".to_string());
    }
    if pattern.contains('/') || pattern.contains('\\') {
        return Err(format!(
            "Filename pattern must not contain path separators: '{pattern}'"
        ));
    }
    if pattern == "." || pattern == ".." {
        return Err(format!("Filename pattern '{pattern}' is not a file name"));
    }
    for caps in RE_PLACEHOLDER.captures_iter(pattern) {
        let field = &caps[1];
        match RE_FIELD.captures(field) {
            Some(f) if f.get(2).is_some() && matches!(&f[1], "ext" | "stem") => {
                return Err(format!("Placeholder {{{field}}} does not take a width"));
            }
            Some(_) => {}
            None => {
                return Err(format!(
                    "Unknown placeholder {{{field}}} (expected page, idx, ext or stem)"
                ));
            }
        }
    }
    let rest = RE_PLACEHOLDER.replace_all(pattern, "");
    if rest.contains('{') || rest.contains('}') {
        return Err(format!("Unbalanced brace in filename pattern '{pattern}'"));
    }
    Ok(())
}

/// Expand a validated pattern for one image.
pub fn render_filename(pattern: &str, image: &ExtractedImage, stem: &str) -> String {
    RE_PLACEHOLDER
        .replace_all(pattern, |caps: &Captures| {
            let Some(f) = RE_FIELD.captures(&caps[1]) else {
                return caps[0].to_string();
            };
            let width: usize = f.get(2).map_or(0, |w| w.as_str().parse().unwrap_or(0));
            match &f[1] {
                "page" => format!("{:0width$}", image.page_number),
                "idx" => format!("{:0width$}", image.image_index),
                "ext" => image.kind.extension().to_string(),
                _ => stem.to_string(),
            }
        })
        .into_owned()
}

/// Split `name.ext` into `("name", ".ext")`; dotfiles keep their leading dot.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(i) if i > 0 => name.split_at(i),
        _ => (name, ""),
    }
}

/// Resolve in-batch name collisions according to `policy`.
///
/// Returns `None` when the policy forbids writing this file.
fn claim_name(name: String, used: &mut HashSet<String>, policy: CollisionPolicy) -> Option<String> {
    if used.insert(name.clone()) {
        return Some(name);
    }
    match policy {
        CollisionPolicy::Overwrite => Some(name),
        CollisionPolicy::Error => None,
        CollisionPolicy::Suffix => {
            let (base, ext) = split_extension(&name);
            (2..)
                .map(|n| format!("{base}_{n}{ext}"))
                .find(|candidate| !used.contains(candidate))
                .inspect(|candidate| {
                    used.insert(candidate.clone());
                })
        }
    }
}

/// Write `bytes` to `path` via a temporary sibling and rename.
///
/// The sibling is created like any other file, so the result carries the
/// process umask's default permissions.
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    let tmp_path = path.with_file_name(format!(".{name}.{}.tmp", std::process::id()));

    let result = (|| {
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        std::fs::rename(&tmp_path, path)
    })();
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp_path);
    }
    result
}

/// Write every selected image of `session` into `settings.output_directory`.
///
/// With nothing selected this returns `(0, 0)` without touching the disk.
/// Otherwise the directory is created (with parents; failure is fatal) and
/// files are written one after another. A failed write is recorded in the
/// report and the remaining images are still attempted.
pub fn export_selected(
    session: &ExtractionSession,
    settings: &ExportSettings,
    progress: Option<&dyn HarvestProgressCallback>,
) -> Result<ExportReport, PdfImgError> {
    validate_pattern(&settings.filename_pattern).map_err(PdfImgError::InvalidConfig)?;

    let selected: Vec<&ExtractedImage> = session.selected().collect();
    if selected.is_empty() {
        info!("Export requested with no images selected");
        return Ok(ExportReport::default());
    }

    let dir = &settings.output_directory;
    std::fs::create_dir_all(dir).map_err(|e| PdfImgError::OutputDirFailed {
        path: dir.clone(),
        source: e,
    })?;

    let stem = session.source_stem();
    let mut report = ExportReport {
        attempted: selected.len(),
        ..ExportReport::default()
    };
    let mut used = HashSet::new();

    info!("Exporting {} images to {}", selected.len(), dir.display());
    if let Some(cb) = progress {
        cb.on_export_start(selected.len());
    }

    for image in selected {
        let name = render_filename(&settings.filename_pattern, image, &stem);
        let Some(name) = claim_name(name.clone(), &mut used, settings.collision) else {
            let detail = "file name collides with an earlier image of this export";
            fail(&mut report, progress, image, dir.join(&name), detail.to_string());
            continue;
        };
        let path = dir.join(&name);

        match write_atomic(&path, &image.raw_bytes) {
            Ok(()) => {
                info!("Saved {} ({} bytes)", path.display(), image.raw_bytes.len());
                if let Some(cb) = progress {
                    cb.on_file_written(&path, image.raw_bytes.len());
                }
                report.succeeded += 1;
                report.written.push(path);
            }
            Err(e) => fail(&mut report, progress, image, path, e.to_string()),
        }
    }

    info!(
        "Exported {}/{} images to {}",
        report.succeeded,
        report.attempted,
        dir.display()
    );
    if let Some(cb) = progress {
        cb.on_export_complete(report.succeeded, report.attempted);
    }
    Ok(report)
}

fn fail(
    report: &mut ExportReport,
    progress: Option<&dyn HarvestProgressCallback>,
    image: &ExtractedImage,
    path: PathBuf,
    detail: String,
) {
    let error = ItemError::Write {
        page: image.page_number,
        index: image.image_index,
        path,
        detail,
    };
    warn!("{}", error);
    if let (Some(cb), ItemError::Write { path, detail, .. }) = (progress, &error) {
        cb.on_file_error(path, detail);
    }
    report.failures.push(error);
}

/// Write every tile's thumbnail into `dir` for external preview.
///
/// Files are named after the export pattern with a `_thumb` suffix and the
/// thumbnail format's extension, e.g. `img_p1_i2_thumb.png`. Placeholder
/// tiles are written as PNG.
pub fn export_thumbnails(
    surface: &SelectionSurface,
    dir: &Path,
    settings: &ExportSettings,
) -> Result<ExportReport, PdfImgError> {
    validate_pattern(&settings.filename_pattern).map_err(PdfImgError::InvalidConfig)?;
    std::fs::create_dir_all(dir).map_err(|e| PdfImgError::OutputDirFailed {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let session = surface.session();
    let stem = session.source_stem();
    let mut report = ExportReport {
        attempted: surface.len(),
        ..ExportReport::default()
    };
    let mut used = HashSet::new();

    for (tile, image) in surface.tiles().iter().zip(session.images()) {
        let name = render_filename(&settings.filename_pattern, image, &stem);
        let (base, _) = split_extension(&name);

        let encoded = if tile.thumbnail.is_placeholder() {
            Ok((tile.thumbnail.png().to_vec(), "png"))
        } else {
            transcode_thumbnail(tile.thumbnail.png(), settings.thumbnail_format, settings.quality)
                .map(|bytes| (bytes, settings.thumbnail_format.extension()))
        };

        let (bytes, ext) = match encoded {
            Ok(v) => v,
            Err(e) => {
                let ext = settings.thumbnail_format.extension();
                let path = dir.join(format!("{base}_thumb.{ext}"));
                fail(&mut report, None, image, path, e.to_string());
                continue;
            }
        };

        let Some(name) = claim_name(format!("{base}_thumb.{ext}"), &mut used, CollisionPolicy::Suffix)
        else {
            continue;
        };
        let path = dir.join(name);
        match write_atomic(&path, &bytes) {
            Ok(()) => {
                debug!("Saved thumbnail {}", path.display());
                report.succeeded += 1;
                report.written.push(path);
            }
            Err(e) => fail(&mut report, None, image, path, e.to_string()),
        }
    }

    info!(
        "Wrote {}/{} thumbnails to {}",
        report.succeeded,
        report.attempted,
        dir.display()
    );
    Ok(report)
}
