//! Pipeline stages for harvesting images out of a PDF.
//!
//! Each submodule implements exactly one step. Keeping stages separate makes
//! each independently testable and keeps lopdf confined to the first two.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ harvest ──▶ decode ──▶ thumbnail ──▶ (selection) ──▶ export
//! (path)    (lopdf)     (filters)  (image)                        (files)
//! ```
//!
//! 1. [`input`]     — validate the user-supplied path and `%PDF` signature
//! 2. [`harvest`]   — walk pages and XObject resources; runs in
//!    `spawn_blocking` because lopdf parsing is CPU-bound
//! 3. [`decode`]    — turn each image stream into a self-describing file
//!    (JPEG passthrough, raw samples re-wrapped as PNG)
//! 4. [`thumbnail`] — bounded preview PNGs, placeholder on failure
//! 5. [`export`]    — pattern-named, atomic writes of the selected images

pub mod decode;
pub mod export;
pub mod harvest;
pub mod input;
pub mod thumbnail;
