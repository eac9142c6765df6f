use std::io;
use std::path::PathBuf;

use ratatui::crossterm::event::KeyEvent;
use tvgrid::{GridError, LoadError};

#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("could not load file: {0}")]
    Load(#[from] LoadError),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error("invalid state file: {0}")]
    State(#[from] serde_json::Error),
}

/// Settings of one viewer session, built from the command line.
#[derive(Debug, Clone)]
pub struct ViewerConfig {
    pub path: PathBuf,
    pub state: Option<PathBuf>,
    pub pagination: bool,
    pub page_size: usize,
    pub row_buffer: usize,
    pub block_size: usize,
    pub max_blocks: usize,
    pub latency_ms: u64,
    pub event_poll_time: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CMDMode {
    FilterContains,
    FilterGreater,
    FilterLess,
    Edit,
}

impl CMDMode {
    pub fn prompt(&self) -> &'static str {
        match self {
            CMDMode::FilterContains => "filter contains: ",
            CMDMode::FilterGreater => "filter greater than: ",
            CMDMode::FilterLess => "filter less than: ",
            CMDMode::Edit => "edit: ",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Quit,
    MoveUp,
    MoveDown,
    MovePageUp,
    MovePageDown,
    MoveBeginning,
    MoveEnd,
    MoveLeft,
    MoveRight,
    ToggleSort,
    AddSort,
    Filter,
    FilterGreater,
    FilterLess,
    ClearFilters,
    Widen,
    Narrow,
    TogglePin,
    HideColumn,
    ShowColumns,
    NextPage,
    PrevPage,
    ToggleSelection,
    GroupByColumn,
    Enter,
    Edit,
    CopyCell,
    WriteState,
    Refresh,
    Help,
    Exit,
    Resize(u16, u16),
    RawKey(KeyEvent),
}

pub const HELP_TEXT: &str = "\
 Navigation
   j/k, up/down     move one row
   PgUp/PgDn        move one screen
   g/G, Home/End    first/last row
   h/l, left/right  move between columns

 Query
   s   cycle sort of the current column
   S   cycle sort, keeping the other sort keys
   f   filter current column (contains)
   >   filter current column (greater than)
   <   filter current column (less than)
   c   clear all filters
   n/N next/previous page (with --pagination)
   r   refresh

 Columns
   +/- widen/narrow current column
   p   cycle pinning (left, right, none)
   x   hide current column
   X   show all columns
   o   group rows by current column
   Enter  expand/collapse the group of the current row

 Rows and cells
   space  toggle row selection
   e   edit current cell
   y   copy current cell
   w   write grid state next to the file

   ?   this help, Esc closes it
   q   quit";
