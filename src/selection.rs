//! Selection surface: one tile per harvested image, each with a toggle.
//!
//! ## Why a model, not widgets?
//!
//! The surface holds exactly the state a checkbox grid would: which images
//! are ticked. Any front end (a terminal prompt, a GUI grid, a web page)
//! renders [`Tile`]s and forwards clicks to [`SelectionSurface::toggle`].
//! The exporter reads the toggles back from the session at save time, so
//! nothing has to be kept in sync by hand.
//!
//! ## Selection expressions
//!
//! [`SelectionExpr`] is a compact textual form for bulk selection, used by
//! the CLI's `--select` flag and interactive prompt:
//!
//! | Term     | Meaning                                   |
//! |----------|-------------------------------------------|
//! | `all`    | every image                               |
//! | `none`   | clear the selection                       |
//! | `3`      | every image on page 3                     |
//! | `2-4`    | every image on pages 2 to 4               |
//! | `3:2`    | image 2 of page 3                         |
//! | `3:1-4`  | images 1 to 4 of page 3                   |
//!
//! Terms are comma-separated; whitespace is ignored.

use crate::config::{ExportSettings, ExtractionConfig};
use crate::error::PdfImgError;
use crate::output::ExportReport;
use crate::pipeline::export::export_selected;
use crate::pipeline::thumbnail::Thumbnail;
use crate::progress::HarvestProgressCallback;
use crate::session::{ExtractionSession, ImageKey, ImageKind};
use futures::stream::{self, StreamExt};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// One entry of the selection surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    pub key: ImageKey,
    /// `Page P, Image I`.
    pub label: String,
    pub kind: ImageKind,
    pub thumbnail: Thumbnail,
}

/// The session plus a tile per image; the toggles live in the session.
#[derive(Debug, Clone)]
pub struct SelectionSurface {
    session: ExtractionSession,
    tiles: Vec<Tile>,
}

impl SelectionSurface {
    /// Build the surface, rendering thumbnails one after another.
    pub fn new(session: ExtractionSession, max_w: u32, max_h: u32) -> Self {
        let tiles = session
            .images()
            .iter()
            .map(|img| Tile {
                key: img.key(),
                label: img.label(),
                kind: img.kind,
                thumbnail: Thumbnail::render(img, max_w, max_h),
            })
            .collect();
        Self { session, tiles }
    }

    /// Build the surface, rendering up to `config.thumbnail_concurrency`
    /// thumbnails at once on the blocking pool.
    ///
    /// Tiles keep extraction order regardless of completion order.
    pub async fn build(
        session: ExtractionSession,
        config: &ExtractionConfig,
    ) -> Result<Self, PdfImgError> {
        let (max_w, max_h) = (config.thumbnail_width, config.thumbnail_height);
        let rendered: Vec<Result<Tile, PdfImgError>> =
            stream::iter(session.images().iter().cloned().map(|img| async move {
                tokio::task::spawn_blocking(move || Tile {
                    key: img.key(),
                    label: img.label(),
                    kind: img.kind,
                    thumbnail: Thumbnail::render(&img, max_w, max_h),
                })
                .await
                .map_err(|e| PdfImgError::Internal(format!("Thumbnail task panicked: {}", e)))
            }))
            .buffered(config.thumbnail_concurrency.max(1))
            .collect()
            .await;

        let tiles = rendered.into_iter().collect::<Result<Vec<_>, _>>()?;
        debug!("Rendered {} thumbnails", tiles.len());
        Ok(Self { session, tiles })
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn session(&self) -> &ExtractionSession {
        &self.session
    }

    pub fn into_session(self) -> ExtractionSession {
        self.session
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Flip one toggle; returns the new state, or `None` for an unknown key.
    pub fn toggle(&mut self, key: ImageKey) -> Option<bool> {
        let i = self.session.position(key)?;
        let img = &mut self.session.images_mut()[i];
        img.selected = !img.selected;
        Some(img.selected)
    }

    /// Set one toggle; returns `false` for an unknown key.
    pub fn set(&mut self, key: ImageKey, selected: bool) -> bool {
        match self.session.position(key) {
            Some(i) => {
                self.session.images_mut()[i].selected = selected;
                true
            }
            None => false,
        }
    }

    pub fn select_all(&mut self) {
        self.session
            .images_mut()
            .iter_mut()
            .for_each(|img| img.selected = true);
    }

    pub fn select_none(&mut self) {
        self.session
            .images_mut()
            .iter_mut()
            .for_each(|img| img.selected = false);
    }

    /// Apply an expression term by term: `none` clears, every other term
    /// selects what it matches. Returns how many images ended up selected.
    pub fn apply(&mut self, expr: &SelectionExpr) -> usize {
        for term in &expr.terms {
            match term {
                SelectionTerm::None => self.select_none(),
                term => self
                    .session
                    .images_mut()
                    .iter_mut()
                    .filter(|img| term.matches(img.key()))
                    .for_each(|img| img.selected = true),
            }
        }
        self.selected_count()
    }

    /// Set every image matched by `expr` to `selected`. Returns the match count.
    pub fn set_matching(&mut self, expr: &SelectionExpr, selected: bool) -> usize {
        let mut n = 0;
        for img in self.session.images_mut() {
            if expr.matches(img.key()) {
                img.selected = selected;
                n += 1;
            }
        }
        n
    }

    /// Flip every image matched by `expr`. Returns the match count.
    pub fn toggle_matching(&mut self, expr: &SelectionExpr) -> usize {
        let mut n = 0;
        for img in self.session.images_mut() {
            if expr.matches(img.key()) {
                img.selected = !img.selected;
                n += 1;
            }
        }
        n
    }

    pub fn is_selected(&self, key: ImageKey) -> bool {
        self.session.get(key).is_some_and(|img| img.selected)
    }

    pub fn selected_count(&self) -> usize {
        self.session.selected().count()
    }

    /// Export the current selection. See [`export_selected`].
    pub fn export(
        &self,
        settings: &ExportSettings,
        progress: Option<&dyn HarvestProgressCallback>,
    ) -> Result<ExportReport, PdfImgError> {
        export_selected(&self.session, settings, progress)
    }
}

// ── Selection expressions ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SelectionTerm {
    All,
    None,
    Pages(u32, u32),
    Images { page: u32, from: u32, to: u32 },
}

impl SelectionTerm {
    fn matches(&self, key: ImageKey) -> bool {
        match *self {
            SelectionTerm::All => true,
            SelectionTerm::None => false,
            SelectionTerm::Pages(a, b) => (a..=b).contains(&key.page),
            SelectionTerm::Images { page, from, to } => {
                key.page == page && (from..=to).contains(&key.index)
            }
        }
    }
}

/// A parsed selection expression such as `1:2, 3, 5-7`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionExpr {
    terms: Vec<SelectionTerm>,
}

impl SelectionExpr {
    pub fn all() -> Self {
        Self {
            terms: vec![SelectionTerm::All],
        }
    }

    /// `true` when any term other than `none` matches `key`.
    pub fn matches(&self, key: ImageKey) -> bool {
        self.terms.iter().any(|t| t.matches(key))
    }
}

fn parse_number(s: &str, what: &str) -> Result<u32, String> {
    let n: u32 = s
        .trim()
        .parse()
        .map_err(|_| format!("invalid {what}: '{}'", s.trim()))?;
    if n == 0 {
        return Err(format!("{what} 0 is invalid ({what}s start at 1)"));
    }
    Ok(n)
}

fn parse_span(s: &str, what: &str) -> Result<(u32, u32), String> {
    let (a, b) = match s.split_once('-') {
        Some((a, b)) => (parse_number(a, what)?, parse_number(b, what)?),
        None => {
            let n = parse_number(s, what)?;
            (n, n)
        }
    };
    if a > b {
        return Err(format!("reversed {what} range {a}-{b}"));
    }
    Ok((a, b))
}

impl FromStr for SelectionExpr {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut terms = Vec::new();
        for part in input.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let term = match part.to_ascii_lowercase().as_str() {
                "all" | "*" => SelectionTerm::All,
                "none" => SelectionTerm::None,
                _ => match part.split_once(':') {
                    Some((page, images)) => {
                        let page = parse_number(page, "page")?;
                        let (from, to) = parse_span(images, "image")?;
                        SelectionTerm::Images { page, from, to }
                    }
                    None => {
                        let (a, b) = parse_span(part, "page")?;
                        SelectionTerm::Pages(a, b)
                    }
                },
            };
            terms.push(term);
        }
        if terms.is_empty() {
            return Err("empty selection".to_string());
        }
        Ok(Self { terms })
    }
}

impl fmt::Display for SelectionExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .terms
            .iter()
            .map(|t| match *t {
                SelectionTerm::All => "all".to_string(),
                SelectionTerm::None => "none".to_string(),
                SelectionTerm::Pages(a, b) if a == b => a.to_string(),
                SelectionTerm::Pages(a, b) => format!("{a}-{b}"),
                SelectionTerm::Images { page, from, to } if from == to => format!("{page}:{from}"),
                SelectionTerm::Images { page, from, to } => format!("{page}:{from}-{to}"),
            })
            .collect();
        f.write_str(&parts.join(","))
    }
}
