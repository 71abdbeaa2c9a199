//! Text diffing used to turn a before/after document pair into editor
//! ranges and edits.
//!
//! Two strategies live here. [`diff`] is a character diff with semantic
//! cleanup whose output drives the highlight animation, while [`code_diff`]
//! is a line diff producing the batch of [`Edit`]s applied to the document.

mod cleanup;
mod line;
mod position;
mod region;

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use line::{Edit, apply_edits, code_diff};
pub use position::{cursor_to_row_and_column, row_and_column_to_cursor};
pub use region::diff;

/// Upper bound on the time spent in the Myers search before falling back to
/// a coarser script.
const DIFF_DEADLINE: Duration = Duration::from_secs(1);

/// A position in a multi-line document. Ordering is row-major.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct DiffPoint {
    pub row: usize,
    pub column: usize,
}

impl DiffPoint {
    pub const fn new(row: usize, column: usize) -> Self {
        Self { row, column }
    }

    pub const fn next_row(self) -> Self {
        Self {
            row: self.row + 1,
            column: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffRangeType {
    Add,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffHighlightType {
    Line,
    Word,
}

/// One contiguous change region.
///
/// `Delete` ranges are expressed in the coordinates of the text before the
/// change, `Add` ranges in the coordinates of the text after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffRange {
    #[serde(alias = "diffRangeType")]
    pub range_type: DiffRangeType,
    #[serde(alias = "diffHighlightType")]
    pub highlight_type: DiffHighlightType,
    pub start: DiffPoint,
    pub stop: DiffPoint,
}

impl DiffRange {
    pub fn is_add(&self) -> bool {
        self.range_type == DiffRangeType::Add
    }

    pub fn is_delete(&self) -> bool {
        self.range_type == DiffRangeType::Delete
    }
}
