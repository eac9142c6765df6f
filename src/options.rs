use std::fmt;
use std::sync::Arc;

use derive_setters::Setters;

use crate::column::Column;
use crate::hooks::{CellClass, ControlCharSanitizer, Sanitizer};
use crate::query::CaseSensitivity;

/// Configuration consumed when a grid is created.
///
/// ```
/// use tvgrid::{Column, GridOptions, Record};
///
/// let options: GridOptions<Record> = GridOptions::new(vec![Column::new("name", "Name")])
///     .row_height(1)
///     .row_buffer(5)
///     .pagination(true)
///     .pagination_page_size(50);
/// assert_eq!(options.header_height, 40);
/// ```
#[derive(Setters)]
pub struct GridOptions<R> {
    #[setters(skip)]
    pub columns: Vec<Column<R>>,
    pub row_height: u32,
    pub header_height: u32,
    pub enable_sorting: bool,
    pub enable_filter: bool,
    pub enable_column_resize: bool,
    pub enable_column_move: bool,
    pub enable_row_selection: bool,
    pub enable_cell_selection: bool,
    pub enable_virtualization: bool,
    pub pagination: bool,
    pub pagination_page_size: usize,
    pub row_buffer: usize,
    pub max_blocks_in_cache: usize,
    pub cache_block_size: usize,
    pub sanitize_data: bool,
    /// Handed to the source with the full query model.
    pub filter_case: CaseSensitivity,
    #[setters(strip_option, into)]
    pub theme: Option<String>,
    #[setters(skip)]
    pub row_class: Option<CellClass<R>>,
    #[setters(skip)]
    pub sanitizer: Arc<dyn Sanitizer>,
}

impl<R> GridOptions<R> {
    pub fn new(columns: Vec<Column<R>>) -> Self {
        Self {
            columns,
            row_height: 30,
            header_height: 40,
            enable_sorting: true,
            enable_filter: true,
            enable_column_resize: true,
            enable_column_move: true,
            enable_row_selection: true,
            enable_cell_selection: false,
            enable_virtualization: true,
            pagination: false,
            pagination_page_size: 100,
            row_buffer: 10,
            max_blocks_in_cache: 10,
            cache_block_size: 100,
            sanitize_data: true,
            filter_case: CaseSensitivity::Insensitive,
            theme: None,
            row_class: None,
            sanitizer: Arc::new(ControlCharSanitizer),
        }
    }

    pub fn row_class(mut self, class: CellClass<R>) -> Self {
        self.row_class = Some(class);
        self
    }

    pub fn sanitizer<S>(mut self, sanitizer: S) -> Self
    where
        S: Sanitizer + 'static,
    {
        self.sanitizer = Arc::new(sanitizer);
        self
    }
}

impl<R> fmt::Debug for GridOptions<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GridOptions")
            .field("columns", &self.columns)
            .field("row_height", &self.row_height)
            .field("header_height", &self.header_height)
            .field("enable_sorting", &self.enable_sorting)
            .field("enable_filter", &self.enable_filter)
            .field("enable_virtualization", &self.enable_virtualization)
            .field("pagination", &self.pagination)
            .field("pagination_page_size", &self.pagination_page_size)
            .field("row_buffer", &self.row_buffer)
            .field("max_blocks_in_cache", &self.max_blocks_in_cache)
            .field("cache_block_size", &self.cache_block_size)
            .finish_non_exhaustive()
    }
}
