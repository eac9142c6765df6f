//! A virtualized data grid core.
//!
//! The grid keeps a registry of columns, the query state (sort, filter and
//! page) and a window of materialized rows around the viewport. Rows come
//! from a [`DataSource`] that answers asynchronously through an [`Emitter`];
//! the grid applies the answers in [`Grid::poll`] and drops answers of
//! superseded requests. A [`GridView`] is what a visual layer draws.
//!
//! ```
//! use std::time::Duration;
//! use tvgrid::{Column, Grid, GridOptions, GridStatus, MemorySource, Record};
//!
//! let rows: Vec<Record> = (0..1000)
//!     .map(|i| Record::with_key(i.to_string()).set("n", i))
//!     .collect();
//! let options = GridOptions::new(vec![Column::new("n", "N")])
//!     .row_height(1)
//!     .row_buffer(5);
//! let mut grid = Grid::new(options, MemorySource::new(rows)).unwrap();
//! grid.set_viewport_height(10);
//! assert_eq!(grid.wait_settled(Duration::from_secs(1)), GridStatus::Idle);
//! assert_eq!(grid.total(), Some(1000));
//!
//! let view = grid.view();
//! assert_eq!(view.rows.len(), 10);
//! assert_eq!(view.rows[3].cells.as_ref().unwrap()[0].text, "3");
//! ```

pub mod column;
pub mod coordinator;
pub mod error;
pub mod hooks;
pub mod loader;
pub mod options;
pub mod query;
pub mod snapshot;
pub mod source;
pub mod value;
pub mod view;
pub mod window;

pub use column::{
    Change, Column, ColumnEvent, ColumnPatch, ColumnRegistry, DEFAULT_COLUMN_WIDTH, Pinned,
};
pub use coordinator::{Grid, GridEvent, GridStatus, RowId};
pub use error::{GridError, LoadError, SourceError};
pub use hooks::{
    CellClass, CellRenderer, CellValidator, ClassProvider, ControlCharSanitizer, HeaderRenderer,
    Sanitizer, ValueFormatter, ValueParser,
};
pub use loader::{Dataset, FileInfo, FileType, detect_file_type, get_file_info, load_records};
pub use options::GridOptions;
pub use query::{CaseSensitivity, FilterItem, FilterType, QueryState, SortDirection, SortItem};
pub use snapshot::{ColumnState, GridState, GroupingState, PaginationState};
pub use source::memory::MemorySource;
pub use source::{DataSource, Emitter, Generation, SourceEvent, Ticket};
pub use value::{Record, RowData, RowKey, Value};
pub use view::{CellView, ColumnView, GridView, PageInfo, RowView};
pub use window::{MaterializedRow, RowWindow, Space, WindowConfig};
