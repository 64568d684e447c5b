//! Result types returned by export and inspection.

use crate::error::ItemError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome of one [`crate::export_selected`] call.
///
/// `succeeded <= attempted` always holds; `attempted` equals the number of
/// selected images.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportReport {
    /// Files written successfully.
    pub succeeded: usize,
    /// Images the exporter tried to write.
    pub attempted: usize,
    /// Paths written, in write order.
    pub written: Vec<PathBuf>,
    /// One entry per failed write.
    pub failures: Vec<ItemError>,
}

impl ExportReport {
    /// `(succeeded, attempted)`, the pair reported back to the user.
    pub fn counts(&self) -> (usize, usize) {
        (self.succeeded, self.attempted)
    }

    /// `true` when every attempted write succeeded.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.succeeded == self.attempted
    }
}

/// Document-level facts gathered without decoding any image data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub page_count: usize,
    /// PDF header version, e.g. `1.7`.
    pub pdf_version: String,
    /// Image XObject references per page, index 0 = page 1.
    pub images_per_page: Vec<usize>,
}

impl DocumentSummary {
    pub fn total_images(&self) -> usize {
        self.images_per_page.iter().sum()
    }
}
