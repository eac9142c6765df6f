//! What the grid hands to the visual layer.

use crate::column::Pinned;
use crate::coordinator::GridStatus;
use crate::query::SortDirection;
use crate::value::RowKey;

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnView {
    pub field: String,
    pub header: String,
    pub width: u32,
    pub pinned: Option<Pinned>,
    pub classes: Vec<String>,
    /// Direction and position of this column in the sort model.
    pub sort: Option<(SortDirection, usize)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CellView {
    pub text: String,
    pub classes: Vec<String>,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowView {
    pub index: usize,
    pub key: Option<RowKey>,
    pub classes: Vec<String>,
    pub selected: bool,
    pub group: Option<String>,
    /// `None` while the row is not materialized yet.
    pub cells: Option<Vec<CellView>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageInfo {
    pub page: usize,
    pub page_size: usize,
    pub page_count: usize,
}

/// A render ready projection of the grid: the visible columns in display
/// order and the rows intersecting the viewport.
#[derive(Debug, Clone, PartialEq)]
pub struct GridView {
    pub columns: Vec<ColumnView>,
    pub rows: Vec<RowView>,
    pub total: Option<usize>,
    pub status: GridStatus,
    pub header_height: u32,
    pub row_height: u32,
    pub page: Option<PageInfo>,
}

impl GridView {
    pub fn is_loading(&self) -> bool {
        self.rows.iter().any(|r| r.cells.is_none())
    }
}
