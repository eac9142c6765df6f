use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use arboard::Clipboard;
use ratatui::crossterm::event::KeyEvent;
use tracing::{debug, error, info, trace, warn};
use tvgrid::{
    Change, Column, Dataset, FilterItem, FilterType, Grid, GridError, GridEvent, GridOptions,
    GridState, GridView, MemorySource, Pinned, Record, RowData, SortDirection, Value,
};

use crate::domain::{CMDMode, HELP_TEXT, Message, ViewerConfig, ViewerError};
use crate::inputter::{InputResult, Inputter};
use crate::ui::{self, CMDLINE_HEIGHT, STATUSLINE_HEIGHT, TABLE_HEADER_HEIGHT};

pub const MIN_COLUMN_WIDTH: u32 = 3;
pub const MAX_COLUMN_WIDTH: u32 = 120;
const INITIAL_MAX_COLUMN_WIDTH: usize = 40;
const COLUMN_WIDTH_MARGIN: usize = 2;
const WIDTH_SAMPLE_ROWS: usize = 1000;
const WIDTH_STEP: u32 = 2;

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Status {
    Ready,
    Quitting,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Modus {
    Table,
    Popup,
    CmdInput,
}

/// Everything the ui needs to draw one frame.
pub struct UIData {
    pub name: String,
    pub view: GridView,
    /// Indices into `view.columns` that fit on screen, in display order.
    pub columns: Vec<usize>,
    pub cursor_row: usize,
    pub cursor_column: usize,
    /// Per visible row: whether the row's group is expanded.
    pub group_expanded: Vec<bool>,
    pub filter_count: usize,
    pub cmd_mode: Option<CMDMode>,
    pub cmdinput: InputResult,
    pub status_message: String,
    pub popup_message: Option<String>,
}

pub struct Model {
    grid: Grid<Record, MemorySource<Record>>,
    name: String,
    state_path: PathBuf,
    pub status: Status,
    modus: Modus,
    previous_modus: Modus,
    cursor_row: usize, // Absolute row index
    cursor_column: usize, // Index into the visible columns
    column_offset: usize,
    width: u16,
    height: u16,
    clipboard: Option<Clipboard>,
    input: Inputter,
    cmd_mode: Option<CMDMode>,
    last_input: InputResult,
    status_message: String,
    popup_message: Option<String>,
}

impl Model {
    pub fn init(config: &ViewerConfig, dataset: Dataset) -> Result<Self, ViewerError> {
        let columns: Vec<Column<Record>> = dataset
            .columns
            .iter()
            .map(|name| {
                Column::new(name.as_str(), name.as_str())
                    .width(Self::initial_width(name, &dataset.records))
                    .min_width(MIN_COLUMN_WIDTH)
                    .max_width(MAX_COLUMN_WIDTH)
                    .editable(true)
            })
            .collect();
        let options = GridOptions::new(columns)
            .row_height(1)
            .header_height(1)
            .row_buffer(config.row_buffer)
            .cache_block_size(config.block_size)
            .max_blocks_in_cache(config.max_blocks)
            .pagination(config.pagination)
            .pagination_page_size(config.page_size);

        let mut source = MemorySource::new(dataset.records);
        if config.latency_ms > 0 {
            source = source.with_latency(Duration::from_millis(config.latency_ms));
        }
        let grid = Grid::new(options, source)?;

        let clipboard = match Clipboard::new() {
            Ok(clipboard) => Some(clipboard),
            Err(e) => {
                warn!("Clipboard not available: {e:?}");
                None
            }
        };
        let mut model = Self {
            grid,
            name: dataset.name,
            state_path: config
                .state
                .clone()
                .unwrap_or_else(|| Self::default_state_path(&config.path)),
            status: Status::Ready,
            modus: Modus::Table,
            previous_modus: Modus::Table,
            cursor_row: 0,
            cursor_column: 0,
            column_offset: 0,
            width: 0,
            height: 0,
            clipboard,
            input: Inputter::default(),
            cmd_mode: None,
            last_input: InputResult::default(),
            status_message: "Press ? for help".to_string(),
            popup_message: None,
        };
        if let Some(state) = &config.state
            && state.exists()
        {
            model.load_state(state)?;
        }
        Ok(model)
    }

    fn default_state_path(path: &Path) -> PathBuf {
        let mut state = path.as_os_str().to_owned();
        state.push(".state.json");
        PathBuf::from(state)
    }

    /// Width fitting the header and the values of the first rows.
    fn initial_width(name: &str, records: &[Record]) -> u32 {
        let widest = records
            .iter()
            .take(WIDTH_SAMPLE_ROWS)
            .filter_map(|r| r.get(name))
            .map(|v| v.to_string().chars().count())
            .max()
            .unwrap_or(0)
            .max(name.chars().count());
        (widest + COLUMN_WIDTH_MARGIN).clamp(MIN_COLUMN_WIDTH as usize, INITIAL_MAX_COLUMN_WIDTH) as u32
    }

    fn load_state(&mut self, path: &Path) -> Result<(), ViewerError> {
        let json = fs::read_to_string(path)?;
        let state = GridState::from_json(&json)?;
        self.grid.import_state(&state)?;
        info!("Restored state from {:?}", path);
        self.set_status_message(format!("Restored state from {}", path.display()));
        Ok(())
    }

    pub fn raw_keyevents(&self) -> bool {
        self.modus == Modus::CmdInput
    }

    pub fn quit(&mut self) {
        self.status = Status::Quitting;
    }

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
    }

    /// Rows of the table area, without its header.
    fn table_rows(&self) -> u16 {
        self.height
            .saturating_sub(CMDLINE_HEIGHT + STATUSLINE_HEIGHT + TABLE_HEADER_HEIGHT)
    }

    fn table_width(&self) -> u16 {
        self.width
            .saturating_sub(ui::index_width(self.grid.total()))
    }

    /// Applies whatever the data source answered since the last frame.
    pub fn tick(&mut self) {
        self.grid.poll();
        for event in self.grid.drain_events() {
            match event {
                GridEvent::FetchFailed { error } => {
                    error!("Fetch failed: {error}");
                    self.set_status_message(format!("{error}, press r to retry"));
                }
                GridEvent::CellEdited {
                    index,
                    field,
                    old,
                    new,
                } => {
                    self.set_status_message(format!("Row {} {field}: {old} -> {new}", index + 1))
                }
                other => trace!("Grid event {other:?}"),
            }
        }
        self.clamp_cursor();
    }

    fn clamp_cursor(&mut self) {
        let space = self.grid.window().space();
        self.cursor_row = if space.is_empty() {
            space.origin
        } else {
            self.cursor_row.clamp(space.origin, space.end() - 1)
        };
        let columns = self.grid.columns().visible_columns_in_order().len();
        self.cursor_column = self.cursor_column.min(columns.saturating_sub(1));
    }

    pub fn update(&mut self, message: Option<Message>) -> Result<(), ViewerError> {
        let Some(msg) = message else {
            return Ok(());
        };
        match self.modus {
            Modus::Table => match msg {
                Message::Quit => self.quit(),
                Message::MoveDown => self.move_rows(1),
                Message::MoveUp => self.move_rows(-1),
                Message::MovePageDown => self.move_rows(self.table_rows() as i64),
                Message::MovePageUp => self.move_rows(-(self.table_rows() as i64)),
                Message::MoveBeginning => self.move_rows(i64::MIN / 2),
                Message::MoveEnd => self.move_rows(i64::MAX / 2),
                Message::MoveLeft => self.move_column(-1),
                Message::MoveRight => self.move_column(1),
                Message::ToggleSort => self.toggle_sort(false),
                Message::AddSort => self.toggle_sort(true),
                Message::Filter => self.enter_cmd_mode(CMDMode::FilterContains),
                Message::FilterGreater => self.enter_cmd_mode(CMDMode::FilterGreater),
                Message::FilterLess => self.enter_cmd_mode(CMDMode::FilterLess),
                Message::Edit => self.enter_cmd_mode(CMDMode::Edit),
                Message::ClearFilters => {
                    let result = self.grid.clear_filters();
                    self.report(result, "Filters cleared");
                }
                Message::Widen => self.resize_column(true),
                Message::Narrow => self.resize_column(false),
                Message::TogglePin => self.toggle_pin(),
                Message::HideColumn => self.hide_column(),
                Message::ShowColumns => self.show_columns(),
                Message::NextPage => self.change_page(true),
                Message::PrevPage => self.change_page(false),
                Message::ToggleSelection => {
                    let result = self.grid.toggle_row_selection(self.cursor_row);
                    self.report(result, "Selection changed");
                }
                Message::GroupByColumn => self.group_by_column(),
                Message::Enter => self.toggle_group(),
                Message::CopyCell => self.copy_cell(),
                Message::WriteState => self.write_state(),
                Message::Refresh => {
                    self.grid.refresh();
                    self.set_status_message("Refreshing ...");
                }
                Message::Help => self.show_help(),
                Message::Resize(width, height) => self.ui_resize(width, height),
                Message::Exit | Message::RawKey(_) => (),
            },
            Modus::Popup => match msg {
                Message::Quit => self.quit(),
                Message::Resize(width, height) => self.ui_resize(width, height),
                Message::Exit | Message::Help | Message::Enter => self.close_popup(),
                _ => (),
            },
            Modus::CmdInput => match msg {
                Message::RawKey(key) => self.raw_input(key),
                Message::Resize(width, height) => self.ui_resize(width, height),
                _ => (),
            },
        }
        Ok(())
    }

    // -------------------- Control handling functions ---------------------- //

    fn ui_resize(&mut self, width: u16, height: u16) {
        trace!(
            "UI was resized! w:{}->{}, h:{}->{}",
            self.width, width, self.height, height
        );
        self.width = width;
        self.height = height;
        self.grid.set_viewport_height(self.table_rows() as u32);
        self.grid.ensure_row_visible(self.cursor_row);
        self.scroll_columns_to_cursor();
    }

    fn move_rows(&mut self, delta: i64) {
        let space = self.grid.window().space();
        if space.is_empty() {
            return;
        }
        let target = (self.cursor_row as i64).saturating_add(delta);
        self.cursor_row = target.clamp(space.origin as i64, space.end() as i64 - 1) as usize;
        self.grid.ensure_row_visible(self.cursor_row);
    }

    fn move_column(&mut self, delta: i64) {
        let columns = self.grid.columns().visible_columns_in_order().len();
        if columns == 0 {
            return;
        }
        let target = (self.cursor_column as i64 + delta).clamp(0, columns as i64 - 1);
        self.cursor_column = target as usize;
        self.scroll_columns_to_cursor();
    }

    /// Shifts the horizontal offset until the cursor column is on screen.
    fn scroll_columns_to_cursor(&mut self) {
        let view = self.grid.view();
        let Some(current) = view.columns.get(self.cursor_column) else {
            return;
        };
        if current.pinned == Some(Pinned::Left) {
            return;
        }
        if self.cursor_column < self.column_offset {
            self.column_offset = self.cursor_column;
        }
        let width = self.table_width();
        while self.column_offset < self.cursor_column
            && !ui::fit_columns(&view.columns, self.column_offset, width).contains(&self.cursor_column)
        {
            self.column_offset += 1;
        }
    }

    fn current_field(&self) -> Option<String> {
        self.grid
            .columns()
            .visible_columns_in_order()
            .get(self.cursor_column)
            .map(|c| c.field().to_string())
    }

    fn report(&mut self, result: Result<Change, GridError>, done: &str) {
        match result {
            Ok(Change::Applied) => self.set_status_message(done),
            Ok(Change::Unchanged) => self.set_status_message(format!("{done} (unchanged)")),
            Ok(Change::Rejected) => self.set_status_message("Not allowed here"),
            Err(e) => {
                debug!("Grid rejected action: {e}");
                self.set_status_message(e.to_string());
            }
        }
    }

    fn toggle_sort(&mut self, additive: bool) {
        let Some(field) = self.current_field() else {
            return;
        };
        let result = self.grid.toggle_sort(&field, additive);
        let sort = self
            .grid
            .query()
            .sort
            .iter()
            .map(|s| match s.direction {
                SortDirection::Asc => format!("{} asc", s.field),
                SortDirection::Desc => format!("{} desc", s.field),
            })
            .collect::<Vec<String>>()
            .join(", ");
        let done = if sort.is_empty() {
            "Unsorted".to_string()
        } else {
            format!("Sorted by {sort}")
        };
        self.report(result, &done);
    }

    fn resize_column(&mut self, wider: bool) {
        let Some(field) = self.current_field() else {
            return;
        };
        let Some(width) = self.grid.columns().column(&field).map(|c| c.current_width()) else {
            return;
        };
        let width = if wider {
            width + WIDTH_STEP
        } else {
            width.saturating_sub(WIDTH_STEP)
        };
        let result = self.grid.set_column_width(&field, width);
        self.report(result, &format!("Resized {field}"));
        self.scroll_columns_to_cursor();
    }

    fn toggle_pin(&mut self) {
        let Some(field) = self.current_field() else {
            return;
        };
        let next = match self.grid.columns().column(&field).and_then(|c| c.pinned_side()) {
            None => Some(Pinned::Left),
            Some(Pinned::Left) => Some(Pinned::Right),
            Some(Pinned::Right) => None,
        };
        let result = self.grid.set_column_pinned(&field, next);
        self.report(result, &format!("Pinned {field}: {next:?}"));
        // Keep the cursor on the column that moved.
        if let Some(pos) = self
            .grid
            .columns()
            .visible_columns_in_order()
            .iter()
            .position(|c| c.field() == field)
        {
            self.cursor_column = pos;
        }
        self.column_offset = 0;
        self.scroll_columns_to_cursor();
    }

    fn hide_column(&mut self) {
        let Some(field) = self.current_field() else {
            return;
        };
        if self.grid.columns().visible_columns_in_order().len() == 1 {
            self.set_status_message("Cannot hide the last column");
            return;
        }
        let result = self.grid.set_column_visible(&field, false);
        self.report(result, &format!("Hid {field}, X shows all columns"));
        self.clamp_cursor();
        self.scroll_columns_to_cursor();
    }

    fn show_columns(&mut self) {
        let hidden: Vec<String> = self
            .grid
            .columns()
            .columns()
            .iter()
            .filter(|c| !c.is_visible())
            .map(|c| c.field().to_string())
            .collect();
        for field in &hidden {
            let result = self.grid.set_column_visible(field, true);
            self.report(result, "Showing all columns");
        }
    }

    fn change_page(&mut self, forward: bool) {
        let result = if forward {
            self.grid.next_page()
        } else {
            self.grid.previous_page()
        };
        let query = self.grid.query();
        let page = query.page;
        self.cursor_row = page * query.page_size;
        self.report(result, &format!("Page {}", page + 1));
    }

    fn group_by_column(&mut self) {
        let Some(field) = self.current_field() else {
            return;
        };
        let (fields, done) = if self.grid.group_fields() == [field.clone()] {
            (Vec::new(), "Grouping removed".to_string())
        } else {
            (vec![field.clone()], format!("Grouped by {field}"))
        };
        let result = self.grid.set_group_fields(fields);
        self.report(result, &done);
    }

    fn toggle_group(&mut self) {
        let Some(key) = self
            .grid
            .row(self.cursor_row)
            .and_then(|row| self.grid.group_key(row))
        else {
            return;
        };
        let expanded = self.grid.toggle_group(&key);
        let state = if expanded { "expanded" } else { "collapsed" };
        self.set_status_message(format!("Group {key} {state}"));
    }

    fn copy_cell(&mut self) {
        let Some(field) = self.current_field() else {
            return;
        };
        let text = match (
            self.grid.columns().column(&field),
            self.grid.row(self.cursor_row),
        ) {
            (Some(column), Some(row)) => self.grid.render_cell(column, row),
            _ => return,
        };
        trace!("Cell content: {}", text);
        match self.clipboard.as_mut().map(|c| c.set_text(text)) {
            Some(Ok(_)) => self.set_status_message("Copied cell"),
            Some(Err(e)) => {
                warn!("Error copying to clipboard: {:?}", e);
                self.set_status_message("Copy failed");
            }
            None => self.set_status_message("No clipboard available"),
        }
    }

    fn write_state(&mut self) {
        let written = self
            .grid
            .export_state()
            .to_json()
            .map_err(ViewerError::from)
            .and_then(|json| fs::write(&self.state_path, json).map_err(ViewerError::from));
        match written {
            Ok(()) => {
                info!("Wrote state to {:?}", self.state_path);
                self.set_status_message(format!("Wrote {}", self.state_path.display()));
            }
            Err(e) => {
                error!("Writing state failed: {e}");
                self.set_status_message(format!("Writing state failed: {e}"));
            }
        }
    }

    fn show_help(&mut self) {
        self.previous_modus = self.modus;
        self.modus = Modus::Popup;
        self.popup_message = Some(HELP_TEXT.to_string());
    }

    fn close_popup(&mut self) {
        trace!("Close popup ...");
        self.modus = self.previous_modus;
        self.previous_modus = Modus::Popup;
        self.popup_message = None;
    }

    // -------------------- Command line ------------------------------------ //

    fn enter_cmd_mode(&mut self, mode: CMDMode) {
        trace!("Entering command mode {:?}", mode);
        self.input.clear();
        if mode == CMDMode::Edit {
            let Some(value) = self
                .current_field()
                .and_then(|field| self.grid.row(self.cursor_row).and_then(|r| r.value(&field)))
            else {
                self.set_status_message("Row is still loading");
                return;
            };
            if !value.is_null() {
                self.input.set(&value.to_string());
            }
        }
        self.previous_modus = self.modus;
        self.modus = Modus::CmdInput;
        self.cmd_mode = Some(mode);
        self.last_input = self.input.get();
    }

    fn raw_input(&mut self, key: KeyEvent) {
        self.last_input = self.input.read(key);
        if self.last_input.finished {
            self.handle_cmd_input();
        }
    }

    fn handle_cmd_input(&mut self) {
        trace!("Handle cmd input {}", self.last_input.input);
        self.modus = self.previous_modus;
        self.previous_modus = Modus::CmdInput;
        let mode = self.cmd_mode.take();
        if self.last_input.canceled {
            self.set_status_message("Canceled");
            return;
        }
        let input = self.last_input.input.clone();
        let Some(field) = self.current_field() else {
            return;
        };
        match mode {
            Some(CMDMode::FilterContains) => {
                self.apply_filter(&field, FilterType::Contains, Value::String(input))
            }
            Some(CMDMode::FilterGreater) => {
                self.apply_filter(&field, FilterType::GreaterThan, Value::infer(&input))
            }
            Some(CMDMode::FilterLess) => {
                self.apply_filter(&field, FilterType::LessThan, Value::infer(&input))
            }
            Some(CMDMode::Edit) => {
                if let Err(e) = self.grid.edit_cell(self.cursor_row, &field, &input) {
                    self.set_status_message(e.to_string());
                }
            }
            None => info!("Cmd mode is none!"),
        }
    }

    /// Replaces the filter of the same kind on `field`; empty input removes it.
    fn apply_filter(&mut self, field: &str, kind: FilterType, value: Value) {
        let mut filters = self.grid.query().filter.clone();
        filters.retain(|f| !(f.field == field && f.kind == kind));
        let remove = matches!(&value, Value::String(s) if s.is_empty());
        if !remove {
            filters.push(FilterItem::new(field, kind, value));
        }
        let count = filters.len();
        let result = self.grid.set_filter_model(filters);
        self.report(result, &format!("{count} filter(s) active, c clears"));
        self.cursor_row = self.grid.window().space().origin;
        self.grid.scroll_to(0);
    }

    // -------------------- Rendering --------------------------------------- //

    pub fn get_uidata(&self) -> UIData {
        let view = self.grid.view();
        let columns = ui::fit_columns(&view.columns, self.column_offset, self.table_width());
        let group_expanded = view
            .rows
            .iter()
            .map(|r| r.group.as_deref().is_some_and(|g| self.grid.is_group_expanded(g)))
            .collect();
        UIData {
            name: self.name.clone(),
            columns,
            cursor_row: self.cursor_row,
            cursor_column: self.cursor_column,
            group_expanded,
            filter_count: self.grid.query().filter.len(),
            cmd_mode: self.cmd_mode,
            cmdinput: self.last_input.clone(),
            status_message: self.status_message.clone(),
            popup_message: self.popup_message.clone(),
            view,
        }
    }
}
