//! Configuration types for harvesting and exporting images.
//!
//! Two structs split the knobs along the two user actions:
//!
//! * [`ExtractionConfig`] — what to harvest and how big the preview tiles
//!   are. Built via [`ExtractionConfigBuilder`].
//! * [`ExportSettings`] — where and under which names the selected images
//!   are written. Built via [`ExportSettingsBuilder`].
//!
//! Settings are plain values passed to [`crate::export_selected`]; nothing
//! in the library reads process-wide state.

use crate::error::PdfImgError;
use crate::pipeline::export::validate_pattern;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default file-name pattern for exported images.
pub const DEFAULT_FILENAME_PATTERN: &str = "img_p{page}_i{idx}.png";

/// Default thumbnail bounding box edge, in pixels.
pub const DEFAULT_THUMBNAIL_EDGE: u32 = 150;

/// Configuration for harvesting images from one PDF.
///
/// # Example
/// ```rust
/// use edgequake_pdfimg::{ExtractionConfig, PageSelection};
///
/// let config = ExtractionConfig::builder()
///     .pages(PageSelection::Range(1, 3))
///     .thumbnail_size(200, 120)
///     .build()
///     .unwrap();
/// assert_eq!(config.thumbnail_width, 200);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Page selection. Default: All pages.
    pub pages: PageSelection,

    /// Maximum thumbnail width in pixels. Default: 150.
    pub thumbnail_width: u32,

    /// Maximum thumbnail height in pixels. Default: 150.
    pub thumbnail_height: u32,

    /// Also harvest images drawn through form XObjects. Default: true.
    ///
    /// Images nested in forms are listed under the page that references
    /// the form, at the position where the form is declared.
    pub descend_forms: bool,

    /// Number of thumbnails rendered concurrently. Default: 4.
    pub thumbnail_concurrency: usize,

    /// Receives per-page and per-file events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            pages: PageSelection::default(),
            thumbnail_width: DEFAULT_THUMBNAIL_EDGE,
            thumbnail_height: DEFAULT_THUMBNAIL_EDGE,
            descend_forms: true,
            thumbnail_concurrency: 4,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("pages", &self.pages)
            .field("thumbnail_width", &self.thumbnail_width)
            .field("thumbnail_height", &self.thumbnail_height)
            .field("descend_forms", &self.descend_forms)
            .field("thumbnail_concurrency", &self.thumbnail_concurrency)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn HarvestProgressCallback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn thumbnail_size(mut self, width: u32, height: u32) -> Self {
        self.config.thumbnail_width = width.clamp(16, 4096);
        self.config.thumbnail_height = height.clamp(16, 4096);
        self
    }

    pub fn descend_forms(mut self, v: bool) -> Self {
        self.config.descend_forms = v;
        self
    }

    pub fn thumbnail_concurrency(mut self, n: usize) -> Self {
        self.config.thumbnail_concurrency = n.max(1);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, PdfImgError> {
        let c = &self.config;
        if c.thumbnail_width == 0 || c.thumbnail_height == 0 {
            return Err(PdfImgError::InvalidConfig(format!(
                "Thumbnail size must be non-zero, got {}x{}",
                c.thumbnail_width, c.thumbnail_height
            )));
        }
        if let PageSelection::Range(start, end) = c.pages {
            if start == 0 || start > end {
                return Err(PdfImgError::InvalidConfig(format!(
                    "Invalid page range {start}-{end}"
                )));
            }
        }
        Ok(self.config)
    }
}

/// Settings for writing the selected images to disk.
///
/// # Example
/// ```rust
/// use edgequake_pdfimg::{CollisionPolicy, ExportSettings};
///
/// let settings = ExportSettings::builder()
///     .output_directory("out")
///     .filename_pattern("{stem}_{page:03}_{idx}.{ext}")
///     .collision(CollisionPolicy::Overwrite)
///     .build()
///     .unwrap();
/// assert_eq!(settings.quality, 90);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSettings {
    /// File-name pattern. Default: `img_p{page}_i{idx}.png`.
    ///
    /// Placeholders: `{page}`, `{idx}`, `{ext}` (native extension of the
    /// embedded image), `{stem}` (PDF file stem). Numeric placeholders take
    /// an optional zero-padded width: `{page:03}`.
    pub filename_pattern: String,

    /// Destination directory; created (with parents) on export. Default: `.`.
    pub output_directory: PathBuf,

    /// JPEG quality for thumbnails written as JPEG. Range: 10–100. Default: 90.
    pub quality: u8,

    /// What to do when two selected images render to the same file name.
    pub collision: CollisionPolicy,

    /// Encoding used by [`crate::export_thumbnails`]. Default: PNG.
    pub thumbnail_format: ThumbnailFormat,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            filename_pattern: DEFAULT_FILENAME_PATTERN.to_string(),
            output_directory: PathBuf::from("."),
            quality: 90,
            collision: CollisionPolicy::default(),
            thumbnail_format: ThumbnailFormat::default(),
        }
    }
}

impl ExportSettings {
    /// Create a new builder for `ExportSettings`.
    pub fn builder() -> ExportSettingsBuilder {
        ExportSettingsBuilder {
            settings: Self::default(),
        }
    }
}

/// Builder for [`ExportSettings`].
#[derive(Debug)]
pub struct ExportSettingsBuilder {
    settings: ExportSettings,
}

impl ExportSettingsBuilder {
    pub fn filename_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.settings.filename_pattern = pattern.into();
        self
    }

    pub fn output_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.settings.output_directory = dir.into();
        self
    }

    pub fn quality(mut self, q: u8) -> Self {
        self.settings.quality = q.clamp(10, 100);
        self
    }

    pub fn collision(mut self, policy: CollisionPolicy) -> Self {
        self.settings.collision = policy;
        self
    }

    pub fn thumbnail_format(mut self, format: ThumbnailFormat) -> Self {
        self.settings.thumbnail_format = format;
        self
    }

    /// Build the settings, validating the pattern and quality.
    pub fn build(self) -> Result<ExportSettings, PdfImgError> {
        let s = &self.settings;
        if !(10..=100).contains(&s.quality) {
            return Err(PdfImgError::InvalidConfig(format!(
                "Quality must be 10–100, got {}",
                s.quality
            )));
        }
        validate_pattern(&s.filename_pattern).map_err(PdfImgError::InvalidConfig)?;
        Ok(self.settings)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Behaviour when two images of one export map to the same file name.
///
/// Only names produced within a single export count as collisions; files
/// left in the directory by an earlier run are overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CollisionPolicy {
    /// Append `_2`, `_3`, … before the extension. (default)
    #[default]
    Suffix,
    /// Last write wins.
    Overwrite,
    /// Skip the later image and report a write error for it.
    Error,
}

/// Encoding for thumbnails written to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ThumbnailFormat {
    /// Lossless PNG. (default)
    #[default]
    Png,
    /// JPEG at [`ExportSettings::quality`].
    Jpeg,
}

impl ThumbnailFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ThumbnailFormat::Png => "png",
            ThumbnailFormat::Jpeg => "jpg",
        }
    }
}

/// Specifies which pages of the PDF to harvest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Harvest all pages (default).
    #[default]
    All,
    /// Harvest a single page (1-indexed).
    Single(usize),
    /// Harvest a contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Harvest specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
    /// Harvest a union of inclusive page ranges (1-indexed). Ranges are
    /// only resolved against the page count, never expanded up front.
    Ranges(Vec<(usize, usize)>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
            PageSelection::Ranges(ranges) => ranges
                .iter()
                .flat_map(|&(start, end)| (start.max(1) - 1)..end.min(total_pages))
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

impl std::str::FromStr for PageSelection {
    type Err = String;

    /// Parse `all`, `3`, `2-5` or `1,3-4,7` (1-indexed).
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let input = input.trim();
        if input.is_empty() || input.eq_ignore_ascii_case("all") {
            return Ok(PageSelection::All);
        }
        let parse = |s: &str| -> Result<usize, String> {
            let n: usize = s
                .trim()
                .parse()
                .map_err(|_| format!("invalid page number: '{}'", s.trim()))?;
            if n == 0 {
                return Err("page 0 is invalid (pages start at 1)".to_string());
            }
            Ok(n)
        };

        if !input.contains(',') {
            if let Some((a, b)) = input.split_once('-') {
                let (a, b) = (parse(a)?, parse(b)?);
                if a > b {
                    return Err(format!("reversed page range {a}-{b}"));
                }
                return Ok(PageSelection::Range(a, b));
            }
            return Ok(PageSelection::Single(parse(input)?));
        }

        let mut ranges = Vec::new();
        for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match part.split_once('-') {
                Some((a, b)) => {
                    let (a, b) = (parse(a)?, parse(b)?);
                    if a > b {
                        return Err(format!("reversed page range {a}-{b}"));
                    }
                    ranges.push((a, b));
                }
                None => {
                    let p = parse(part)?;
                    ranges.push((p, p));
                }
            }
        }
        Ok(PageSelection::Ranges(ranges))
    }
}

/// Fixed per-user path of the append-only activity log.
///
/// Default locations:
/// - **Linux**: `~/.local/share/pdfimg/pdfimg.log`
/// - **macOS**: `~/Library/Application Support/pdfimg/pdfimg.log`
/// - **Windows**: `%LOCALAPPDATA%\pdfimg\pdfimg.log`
pub fn default_log_path() -> PathBuf {
    let base = dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(std::env::temp_dir);

    base.join("pdfimg").join("pdfimg.log")
}
