//! The rendering coordinator: owns the query state and the row window, drives
//! the data source, and reconciles its answers.
//!
//! State machine:
//!
//! ```text
//!            invalidate                 answer (current generation)
//!   Idle ───────────────▶ FetchPending ─────────────────────────▶ Reconciling ──▶ Idle
//!    ▲                     │   ▲    │ newer request: superseded                     │
//!    │                     │   └────┘                                               │
//!    │                     │ failure                                                │
//!    │                     ▼                                                        │
//!    │                   Error ── scroll / refresh / query change ──▶ FetchPending  │
//!    └──────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything runs on the caller's thread. Answers queue up on a channel and
//! are only applied from [`Grid::poll`] or [`Grid::wait`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::{debug, info, trace, warn};

use crate::column::{Change, Column, ColumnEvent, ColumnPatch, ColumnRegistry, Pinned};
use crate::error::{GridError, SourceError};
use crate::hooks::{CellClass, Sanitizer};
use crate::options::GridOptions;
use crate::query::{FilterItem, QueryState, SortDirection, SortItem, dedup_sort};
use crate::source::{DataSource, Emitter, Generation, SourceEvent, Ticket};
use crate::value::{RowData, RowKey, Value};
use crate::view::{CellView, ColumnView, GridView, PageInfo, RowView};
use crate::window::{MaterializedRow, RowWindow, Space, WindowConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridStatus {
    Idle,
    FetchPending,
    Reconciling,
    Error,
}

/// Notifications for the host, drained with [`Grid::drain_events`].
#[derive(Debug, Clone, PartialEq)]
pub enum GridEvent {
    /// The grid entered `Idle` or its layout changed; `view()` is current.
    RenderReady,
    FetchFailed { error: SourceError },
    ColumnResized { field: String, width: u32 },
    RowClicked { index: usize, key: Option<RowKey> },
    CellClicked { index: usize, field: String },
    CellEdited {
        index: usize,
        field: String,
        old: Value,
        new: Value,
    },
    SelectionChanged,
}

/// Identity used for selection: the row key when the source provides one,
/// otherwise the absolute index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RowId {
    Key(RowKey),
    Index(usize),
}

impl RowId {
    fn of<R>(row: &MaterializedRow<R>) -> Self {
        match &row.key {
            Some(key) => RowId::Key(key.clone()),
            None => RowId::Index(row.index),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueryChange {
    All,
    Sort,
    Filter,
    Page,
    Refresh,
}

struct Pending<R> {
    generation: Generation,
    /// Rows can only be planned once the total is known.
    awaiting_total: bool,
    /// The query changed: the whole cache is replaced on reconcile.
    replace: bool,
    total: Option<usize>,
    space: Option<Space>,
    awaiting: BTreeSet<usize>,
    staged: BTreeMap<usize, Vec<R>>,
}

impl<R> Pending<R> {
    fn for_total(generation: Generation) -> Self {
        Self {
            generation,
            awaiting_total: true,
            replace: true,
            total: None,
            space: None,
            awaiting: BTreeSet::new(),
            staged: BTreeMap::new(),
        }
    }
}

enum Phase<R> {
    Idle,
    Pending(Pending<R>),
    Reconciling,
    Failed { error: SourceError, replace: bool },
}

/// What a viewport change asks of the state machine.
enum Next {
    Nothing,
    Render,
    Fetch,
    Retry,
}

/// A virtualized grid over a [`DataSource`].
pub struct Grid<R, S> {
    pub(crate) source: S,
    pub(crate) columns: ColumnRegistry<R>,
    pub(crate) query: QueryState,
    pub(crate) window: RowWindow<R>,
    pub(crate) options: GridOptions<R>,
    pub(crate) group_fields: Vec<String>,
    pub(crate) expanded: BTreeMap<String, bool>,
    tx: Sender<SourceEvent<R>>,
    rx: Receiver<SourceEvent<R>>,
    generation: Generation,
    phase: Phase<R>,
    total: Option<usize>,
    events: Vec<GridEvent>,
    selected_rows: BTreeSet<RowId>,
    selected_cell: Option<(RowId, String)>,
}

impl<R, S> Grid<R, S>
where
    R: RowData + 'static,
    S: DataSource<R>,
{
    /// Creates the grid and asks the source for its first total.
    pub fn new(mut options: GridOptions<R>, source: S) -> Result<Self, GridError> {
        let columns = ColumnRegistry::from_columns(
            std::mem::take(&mut options.columns),
            options.enable_column_resize,
            options.enable_column_move,
        )?;
        if options.pagination && options.pagination_page_size == 0 {
            return Err(GridError::InvalidPageSize);
        }
        if options.cache_block_size == 0 {
            return Err(GridError::InvalidState(
                "cache block size must be greater than zero".to_string(),
            ));
        }
        let block_size = if options.pagination {
            options.pagination_page_size
        } else {
            options.cache_block_size
        };
        let window = RowWindow::new(WindowConfig {
            row_height: options.row_height,
            row_buffer: options.row_buffer,
            block_size,
            max_blocks: options
                .enable_virtualization
                .then_some(options.max_blocks_in_cache.max(1)),
            virtualize: options.enable_virtualization,
        });
        let (tx, rx) = unbounded();
        let mut grid = Self {
            source,
            columns,
            query: QueryState::new(options.pagination_page_size.max(1)),
            window,
            options,
            group_fields: Vec::new(),
            expanded: BTreeMap::new(),
            tx,
            rx,
            generation: 0,
            phase: Phase::Idle,
            total: None,
            events: Vec::new(),
            selected_rows: BTreeSet::new(),
            selected_cell: None,
        };
        info!("Created grid with {} columns", grid.columns.len());
        grid.begin_query_fetch(QueryChange::All);
        Ok(grid)
    }

    // -------------------------- Accessors --------------------------------- //

    pub fn status(&self) -> GridStatus {
        match self.phase {
            Phase::Idle => GridStatus::Idle,
            Phase::Pending(_) => GridStatus::FetchPending,
            Phase::Reconciling => GridStatus::Reconciling,
            Phase::Failed { .. } => GridStatus::Error,
        }
    }

    pub fn last_error(&self) -> Option<&SourceError> {
        match &self.phase {
            Phase::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Rows matching the current query, once the source has told us.
    pub fn total(&self) -> Option<usize> {
        self.total
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn query(&self) -> &QueryState {
        &self.query
    }

    pub fn options(&self) -> &GridOptions<R> {
        &self.options
    }

    pub fn columns(&self) -> &ColumnRegistry<R> {
        &self.columns
    }

    pub fn window(&self) -> &RowWindow<R> {
        &self.window
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// The materialized row at absolute `index`.
    pub fn row(&self, index: usize) -> Option<&R> {
        self.window.row(index).map(|r| &r.data)
    }

    pub fn drain_events(&mut self) -> Vec<GridEvent> {
        std::mem::take(&mut self.events)
    }

    // -------------------------- Event pump -------------------------------- //

    /// Applies every answer that has arrived. Returns how many were handled.
    pub fn poll(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.rx.try_recv() {
            self.handle_source_event(event);
            handled += 1;
        }
        handled
    }

    /// Blocks up to `timeout` for the first answer, then drains the rest.
    pub fn wait(&mut self, timeout: Duration) -> usize {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => {
                self.handle_source_event(event);
                1 + self.poll()
            }
            Err(_) => self.poll(),
        }
    }

    /// Keeps waiting until no fetch is pending or `timeout` elapsed.
    pub fn wait_settled(&mut self, timeout: Duration) -> GridStatus {
        let deadline = Instant::now() + timeout;
        self.poll();
        while self.status() == GridStatus::FetchPending {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            self.wait(deadline - now);
        }
        self.status()
    }

    fn handle_source_event(&mut self, event: SourceEvent<R>) {
        let ticket = event.ticket();
        if ticket.generation != self.generation {
            debug!(
                "Dropping stale answer {:?}, current generation {}",
                ticket, self.generation
            );
            return;
        }
        match event {
            SourceEvent::Total { total, .. } => self.on_total(total),
            SourceEvent::Rows { rows, .. } => self.on_rows(ticket, rows),
            SourceEvent::Failed { error, .. } => self.on_failure(error),
        }
    }

    fn on_total(&mut self, total: usize) {
        trace!("Total {total} for generation {}", self.generation);
        let space = self.space_for(total);
        match &mut self.phase {
            Phase::Pending(pending) if pending.awaiting_total => {
                let blocks = self.window.blocks_for(space);
                pending.awaiting_total = false;
                pending.total = Some(total);
                pending.space = Some(space);
                pending.awaiting = blocks.iter().copied().collect();
                let generation = pending.generation;
                if blocks.is_empty() {
                    self.reconcile();
                } else {
                    self.request_blocks(generation, &blocks);
                }
            }
            Phase::Pending(pending) => {
                // A later emission while rows are still in flight.
                pending.total = Some(total);
                pending.space = Some(space);
                let replace = pending.replace;
                let extra: Vec<usize> = self
                    .window
                    .blocks_for(space)
                    .into_iter()
                    .filter(|b| !pending.awaiting.contains(b) && !pending.staged.contains_key(b))
                    .filter(|b| replace || !self.window.is_cached(*b))
                    .collect();
                pending.awaiting.extend(extra.iter().copied());
                let generation = pending.generation;
                if !extra.is_empty() {
                    self.request_blocks(generation, &extra);
                }
            }
            Phase::Idle => {
                if self.total != Some(total) {
                    debug!("Total changed to {total}");
                    self.total = Some(total);
                    self.window.set_space(space);
                    self.on_viewport_changed();
                }
            }
            Phase::Reconciling | Phase::Failed { .. } => {}
        }
    }

    fn on_rows(&mut self, ticket: Ticket, rows: Vec<R>) {
        let Some(block) = ticket.block else {
            warn!("Rows answer without a block, {:?}", ticket);
            return;
        };
        match &mut self.phase {
            Phase::Pending(pending) if !pending.awaiting_total => {
                trace!("Staged block {block}: {} rows", rows.len());
                pending.awaiting.remove(&block);
                pending.staged.insert(block, rows);
                if pending.awaiting.is_empty() {
                    self.reconcile();
                }
            }
            Phase::Idle => {
                // The source emitted again for the fetch we already applied.
                self.phase = Phase::Reconciling;
                self.window.insert_block(block, rows);
                self.window.evict();
                self.enter_idle();
            }
            _ => trace!("Ignoring rows for block {block}"),
        }
    }

    fn on_failure(&mut self, error: SourceError) {
        if let Phase::Pending(pending) = &self.phase {
            warn!("Fetch {} failed: {}", pending.generation, error);
            let replace = pending.replace;
            self.phase = Phase::Failed {
                error: error.clone(),
                replace,
            };
            self.events.push(GridEvent::FetchFailed { error });
        } else {
            debug!("Ignoring failure outside of a fetch: {error}");
        }
    }

    /// Applies a completed fetch in one step.
    fn reconcile(&mut self) {
        let Phase::Pending(pending) = std::mem::replace(&mut self.phase, Phase::Reconciling) else {
            return;
        };
        debug!(
            "Reconciling generation {} ({} blocks)",
            pending.generation,
            pending.staged.len()
        );
        if pending.replace {
            self.window.clear();
            self.selected_rows.retain(|id| matches!(id, RowId::Key(_)));
        }
        if let Some(total) = pending.total {
            self.total = Some(total);
        }
        if let Some(space) = pending.space {
            self.window.set_space(space);
        }
        for (block, rows) in pending.staged {
            self.window.insert_block(block, rows);
        }
        self.window.touch_visible();
        self.window.evict();
        self.enter_idle();
        if !self.window.covers_buffered() {
            self.begin_row_fetch();
        }
    }

    fn enter_idle(&mut self) {
        self.phase = Phase::Idle;
        self.events.push(GridEvent::RenderReady);
    }

    // -------------------------- Fetching ---------------------------------- //

    fn next_generation(&mut self) -> Generation {
        if matches!(self.phase, Phase::Pending(_)) {
            debug!("Superseding generation {}", self.generation);
        }
        self.generation += 1;
        self.generation
    }

    fn emitter(&self, generation: Generation, block: Option<usize>) -> Emitter<R> {
        Emitter::new(Ticket { generation, block }, self.tx.clone())
    }

    fn space_for(&self, total: usize) -> Space {
        if self.options.pagination {
            Space::page(total, self.query.page, self.query.page_size)
        } else {
            Space::new(0, total)
        }
    }

    fn begin_query_fetch(&mut self, change: QueryChange) {
        match change {
            QueryChange::All => {
                self.source.set_sort_model(&self.query.sort);
                self.source.set_filter_model(&self.query.filter);
                self.source.set_case_sensitivity(self.options.filter_case);
                if self.options.pagination {
                    self.source.set_page(self.query.page, self.query.page_size);
                }
            }
            QueryChange::Sort => self.source.set_sort_model(&self.query.sort),
            QueryChange::Filter => self.source.set_filter_model(&self.query.filter),
            QueryChange::Page => self.source.set_page(self.query.page, self.query.page_size),
            QueryChange::Refresh => {}
        }
        self.source.refresh();
        let generation = self.next_generation();
        debug!("Query fetch {generation} ({change:?})");
        self.phase = Phase::Pending(Pending::for_total(generation));
        self.source.get_total(self.emitter(generation, None));
    }

    /// Requests the blocks the buffered range is missing.
    fn begin_row_fetch(&mut self) {
        let (replace, total, space) = match &self.phase {
            Phase::Pending(pending) if pending.awaiting_total => return,
            Phase::Pending(pending) => (pending.replace, pending.total, pending.space),
            _ => (false, None, None),
        };
        let space = space.unwrap_or_else(|| self.window.space());
        let blocks: Vec<usize> = self
            .window
            .blocks_for(space)
            .into_iter()
            .filter(|b| replace || !self.window.is_cached(*b))
            .collect();
        if blocks.is_empty() && !replace {
            return;
        }
        let generation = self.next_generation();
        debug!("Row fetch {generation}: blocks {:?}", blocks);
        self.phase = Phase::Pending(Pending {
            generation,
            awaiting_total: false,
            replace,
            total,
            space: Some(space),
            awaiting: blocks.iter().copied().collect(),
            staged: BTreeMap::new(),
        });
        if blocks.is_empty() {
            self.reconcile();
        } else {
            self.request_blocks(generation, &blocks);
        }
    }

    fn request_blocks(&mut self, generation: Generation, blocks: &[usize]) {
        let block_size = self.window.config().block_size;
        for &block in blocks {
            self.source.set_page(block, block_size);
            self.source.get_data(self.emitter(generation, Some(block)));
        }
    }

    fn retry(&mut self, replace: bool) {
        info!("Retrying after failed fetch");
        if replace || self.total.is_none() {
            self.begin_query_fetch(QueryChange::Refresh);
        } else {
            self.phase = Phase::Idle;
            self.begin_row_fetch();
            if matches!(self.phase, Phase::Idle) {
                self.events.push(GridEvent::RenderReady);
            }
        }
    }

    /// Re-runs the current query against the source.
    pub fn refresh(&mut self) {
        self.begin_query_fetch(QueryChange::Refresh);
    }

    // -------------------------- Viewport ---------------------------------- //

    fn on_viewport_changed(&mut self) {
        self.window.touch_visible();
        let next = match &self.phase {
            Phase::Failed { .. } => Next::Retry,
            Phase::Pending(pending) if pending.awaiting_total => Next::Nothing,
            Phase::Pending(pending) => {
                let space = pending.space.unwrap_or_else(|| self.window.space());
                let covered = self.window.blocks_for(space).iter().all(|b| {
                    pending.awaiting.contains(b)
                        || pending.staged.contains_key(b)
                        || (!pending.replace && self.window.is_cached(*b))
                });
                if covered { Next::Nothing } else { Next::Fetch }
            }
            Phase::Idle if self.window.covers_buffered() => Next::Render,
            Phase::Idle => Next::Fetch,
            Phase::Reconciling => Next::Nothing,
        };
        match next {
            Next::Nothing => {}
            Next::Render => self.events.push(GridEvent::RenderReady),
            Next::Fetch => self.begin_row_fetch(),
            Next::Retry => {
                let replace = matches!(self.phase, Phase::Failed { replace: true, .. });
                self.retry(replace);
            }
        }
    }

    pub fn set_viewport_height(&mut self, px: u32) {
        self.window.set_viewport_height(px);
        self.on_viewport_changed();
    }

    pub fn scroll_top(&self) -> u32 {
        self.window.scroll_top()
    }

    pub fn scroll_to(&mut self, px: u32) {
        self.window.set_scroll_top(px);
        self.on_viewport_changed();
    }

    pub fn scroll_by(&mut self, delta: i64) {
        let target = (self.window.scroll_top() as i64 + delta).clamp(0, u32::MAX as i64);
        self.scroll_to(target as u32);
    }

    pub fn scroll_to_row(&mut self, index: usize) {
        self.window.scroll_to_row(index);
        self.on_viewport_changed();
    }

    pub fn ensure_row_visible(&mut self, index: usize) {
        self.window.ensure_visible(index);
        self.on_viewport_changed();
    }

    pub fn visible_range(&self) -> std::ops::Range<usize> {
        self.window.visible_range()
    }

    pub fn buffered_range(&self) -> std::ops::Range<usize> {
        self.window.buffered_range()
    }

    // -------------------------- Query state ------------------------------- //

    /// Replaces the sort model. Repeated fields keep their first occurrence.
    pub fn set_sort_model(&mut self, items: Vec<SortItem>) -> Result<Change, GridError> {
        if !self.options.enable_sorting {
            debug!("Sorting disabled, sort model rejected");
            return Ok(Change::Rejected);
        }
        for item in &items {
            let column = self
                .columns
                .column(&item.field)
                .ok_or_else(|| GridError::unknown_column(&item.field))?;
            if !column.is_sortable() {
                debug!("Column {} is not sortable", item.field);
                return Ok(Change::Rejected);
            }
        }
        let items = dedup_sort(&items);
        if items == self.query.sort {
            return Ok(Change::Unchanged);
        }
        self.query.sort = items;
        self.begin_query_fetch(QueryChange::Sort);
        Ok(Change::Applied)
    }

    /// Cycles `field` through ascending, descending and unsorted, the way a
    /// header click does. `additive` keeps the other sort keys.
    pub fn toggle_sort(&mut self, field: &str, additive: bool) -> Result<Change, GridError> {
        let current = self.query.sort.iter().find(|s| s.field == field).map(|s| s.direction);
        let next = match current {
            None => Some(SortDirection::Asc),
            Some(SortDirection::Asc) => Some(SortDirection::Desc),
            Some(SortDirection::Desc) => None,
        };
        let mut items: Vec<SortItem> = if additive {
            self.query.sort.clone()
        } else {
            self.query
                .sort
                .iter()
                .filter(|s| s.field == field)
                .cloned()
                .collect()
        };
        match (next, items.iter().position(|s| s.field == field)) {
            (Some(direction), Some(pos)) => items[pos].direction = direction,
            (Some(direction), None) => items.push(SortItem {
                field: field.to_string(),
                direction,
            }),
            (None, Some(pos)) => {
                items.remove(pos);
            }
            (None, None) => {}
        }
        self.set_sort_model(items)
    }

    pub fn set_filter_model(&mut self, items: Vec<FilterItem>) -> Result<Change, GridError> {
        if !self.options.enable_filter {
            debug!("Filtering disabled, filter model rejected");
            return Ok(Change::Rejected);
        }
        for item in &items {
            let column = self
                .columns
                .column(&item.field)
                .ok_or_else(|| GridError::unknown_column(&item.field))?;
            if !column.is_filterable() {
                debug!("Column {} is not filterable", item.field);
                return Ok(Change::Rejected);
            }
        }
        if items == self.query.filter {
            return Ok(Change::Unchanged);
        }
        self.query.filter = items;
        self.begin_query_fetch(QueryChange::Filter);
        Ok(Change::Applied)
    }

    pub fn clear_filters(&mut self) -> Result<Change, GridError> {
        self.set_filter_model(Vec::new())
    }

    pub fn set_page(&mut self, page: usize) -> Result<Change, GridError> {
        if !self.options.pagination {
            return Ok(Change::Rejected);
        }
        if page == self.query.page {
            return Ok(Change::Unchanged);
        }
        self.query.page = page;
        self.window.set_scroll_top(0);
        self.begin_query_fetch(QueryChange::Page);
        Ok(Change::Applied)
    }

    pub fn next_page(&mut self) -> Result<Change, GridError> {
        match self.page_count() {
            Some(count) if self.query.page + 1 < count => self.set_page(self.query.page + 1),
            Some(_) => Ok(Change::Unchanged),
            None => Ok(Change::Rejected),
        }
    }

    pub fn previous_page(&mut self) -> Result<Change, GridError> {
        if !self.options.pagination {
            return Ok(Change::Rejected);
        }
        match self.query.page.checked_sub(1) {
            Some(page) => self.set_page(page),
            None => Ok(Change::Unchanged),
        }
    }

    /// Changes the page size and goes back to the first page.
    pub fn set_page_size(&mut self, page_size: usize) -> Result<Change, GridError> {
        if page_size == 0 {
            return Err(GridError::InvalidPageSize);
        }
        if !self.options.pagination {
            return Ok(Change::Rejected);
        }
        if page_size == self.query.page_size {
            return Ok(Change::Unchanged);
        }
        self.query.page_size = page_size;
        self.query.page = 0;
        self.window.set_block_size(page_size);
        self.window.set_scroll_top(0);
        self.begin_query_fetch(QueryChange::Page);
        Ok(Change::Applied)
    }

    /// Number of pages, when paginating and the total is known.
    pub fn page_count(&self) -> Option<usize> {
        if !self.options.pagination {
            return None;
        }
        self.total.map(|t| t.div_ceil(self.query.page_size))
    }

    /// Applies a complete query in one fetch. Used when restoring state.
    pub(crate) fn replace_query(&mut self, query: QueryState) {
        if query == self.query {
            return;
        }
        if query.page_size != self.query.page_size {
            self.window.set_block_size(query.page_size);
        }
        if query.page != self.query.page {
            self.window.set_scroll_top(0);
        }
        self.query = query;
        self.begin_query_fetch(QueryChange::All);
    }

    // -------------------------- Columns ----------------------------------- //

    pub fn add_column(&mut self, column: Column<R>) -> Result<(), GridError> {
        self.columns.add_column(column)?;
        self.flush_column_events();
        Ok(())
    }

    pub fn update_column(&mut self, field: &str, patch: ColumnPatch) -> Result<(), GridError> {
        self.columns.update_column(field, patch)?;
        self.flush_column_events();
        Ok(())
    }

    pub fn set_column_order(&mut self, field: &str, index: usize) -> Result<Change, GridError> {
        let change = self.columns.set_order(field, index)?;
        self.flush_column_events();
        Ok(change)
    }

    pub fn set_column_pinned(&mut self, field: &str, side: Option<Pinned>) -> Result<Change, GridError> {
        let change = self.columns.set_pinned(field, side)?;
        self.flush_column_events();
        Ok(change)
    }

    pub fn set_column_width(&mut self, field: &str, px: u32) -> Result<Change, GridError> {
        let change = self.columns.set_width(field, px)?;
        self.flush_column_events();
        Ok(change)
    }

    pub fn set_column_visible(&mut self, field: &str, visible: bool) -> Result<Change, GridError> {
        let change = self.columns.set_visible(field, visible)?;
        self.flush_column_events();
        Ok(change)
    }

    /// Column changes only need a new layout, never a new fetch.
    pub(crate) fn flush_column_events(&mut self) {
        let changes = self.columns.drain_events();
        if changes.is_empty() {
            return;
        }
        for change in &changes {
            trace!("Column change {:?}", change);
            if let ColumnEvent::Resized { field, width } = change {
                self.events.push(GridEvent::ColumnResized {
                    field: field.clone(),
                    width: *width,
                });
            }
        }
        if matches!(self.phase, Phase::Idle) {
            self.events.push(GridEvent::RenderReady);
        }
    }

    // -------------------------- Editing ----------------------------------- //

    /// Parses, validates and writes `input` into a materialized cell.
    ///
    /// On any failure the cell keeps its previous value.
    pub fn edit_cell(&mut self, index: usize, field: &str, input: &str) -> Result<Value, GridError> {
        let column = self
            .columns
            .column(field)
            .ok_or_else(|| GridError::unknown_column(field))?;
        if !column.is_editable() {
            return Err(GridError::NotEditable {
                field: field.to_string(),
            });
        }
        let parser = column.parser().cloned();
        let validator = column.validator().cloned();

        let row = self.window.row(index).ok_or(GridError::RowNotLoaded { index })?;
        let old = row.data.value(field).unwrap_or_default();
        let parsed = match &parser {
            Some(parser) => parser.parse(input),
            None => old.parse_like(input),
        };
        let new = parsed.ok_or_else(|| GridError::ParseFailed {
            field: field.to_string(),
            input: input.to_string(),
        })?;
        if let Some(validator) = &validator
            && !validator.validate(&new, &row.data)
        {
            debug!("Edit of {field} at row {index} rejected by validator");
            return Err(GridError::ValidationFailed {
                field: field.to_string(),
            });
        }

        let mut edited = row.data.clone();
        if !edited.set_value(field, new.clone()) {
            return Err(GridError::NotEditable {
                field: field.to_string(),
            });
        }
        let key = row.key.clone();
        if let Some(slot) = self.window.row_mut(index) {
            slot.data = edited;
        }
        self.source.update_row(index, key.as_deref(), field, &new);
        self.events.push(GridEvent::CellEdited {
            index,
            field: field.to_string(),
            old,
            new: new.clone(),
        });
        self.events.push(GridEvent::RenderReady);
        Ok(new)
    }

    // -------------------------- Selection --------------------------------- //

    fn row_id(&self, index: usize) -> Result<RowId, GridError> {
        self.window
            .row(index)
            .map(RowId::of)
            .ok_or(GridError::RowNotLoaded { index })
    }

    pub fn select_row(&mut self, index: usize, additive: bool) -> Result<Change, GridError> {
        if !self.options.enable_row_selection {
            return Ok(Change::Rejected);
        }
        let id = self.row_id(index)?;
        if !additive {
            self.selected_rows.clear();
        }
        if !self.selected_rows.insert(id) && additive {
            return Ok(Change::Unchanged);
        }
        self.events.push(GridEvent::SelectionChanged);
        Ok(Change::Applied)
    }

    pub fn toggle_row_selection(&mut self, index: usize) -> Result<Change, GridError> {
        if !self.options.enable_row_selection {
            return Ok(Change::Rejected);
        }
        let id = self.row_id(index)?;
        if !self.selected_rows.remove(&id) {
            self.selected_rows.insert(id);
        }
        self.events.push(GridEvent::SelectionChanged);
        Ok(Change::Applied)
    }

    pub fn clear_selection(&mut self) {
        if !self.selected_rows.is_empty() || self.selected_cell.is_some() {
            self.selected_rows.clear();
            self.selected_cell = None;
            self.events.push(GridEvent::SelectionChanged);
        }
    }

    pub fn selected_rows(&self) -> impl Iterator<Item = &RowId> {
        self.selected_rows.iter()
    }

    pub fn is_row_selected(&self, index: usize) -> bool {
        self.window
            .row(index)
            .is_some_and(|row| self.selected_rows.contains(&RowId::of(row)))
    }

    pub fn select_cell(&mut self, index: usize, field: &str) -> Result<Change, GridError> {
        if !self.options.enable_cell_selection {
            return Ok(Change::Rejected);
        }
        if self.columns.column(field).is_none() {
            return Err(GridError::unknown_column(field));
        }
        let id = self.row_id(index)?;
        self.selected_cell = Some((id, field.to_string()));
        self.events.push(GridEvent::SelectionChanged);
        Ok(Change::Applied)
    }

    pub fn selected_cell(&self) -> Option<(&RowId, &str)> {
        self.selected_cell.as_ref().map(|(id, field)| (id, field.as_str()))
    }

    /// Reports a row click to the host and selects the row if enabled.
    pub fn click_row(&mut self, index: usize) -> Result<(), GridError> {
        let key = self.window.row(index).and_then(|r| r.key.clone());
        self.events.push(GridEvent::RowClicked { index, key });
        if self.options.enable_row_selection {
            let _ = self.select_row(index, false)?;
        }
        Ok(())
    }

    /// Reports a cell click to the host and selects the cell if enabled.
    pub fn click_cell(&mut self, index: usize, field: &str) -> Result<(), GridError> {
        if self.columns.column(field).is_none() {
            return Err(GridError::unknown_column(field));
        }
        self.events.push(GridEvent::CellClicked {
            index,
            field: field.to_string(),
        });
        if self.options.enable_cell_selection {
            let _ = self.select_cell(index, field)?;
        }
        Ok(())
    }

    // -------------------------- Grouping ---------------------------------- //

    pub fn group_fields(&self) -> &[String] {
        &self.group_fields
    }

    /// Sets the fields rows are grouped by. Expansion state is reset.
    pub fn set_group_fields(&mut self, fields: Vec<String>) -> Result<Change, GridError> {
        if let Some(unknown) = fields.iter().find(|f| self.columns.column(f).is_none()) {
            return Err(GridError::unknown_column(unknown.as_str()));
        }
        if fields == self.group_fields {
            return Ok(Change::Unchanged);
        }
        self.group_fields = fields;
        self.expanded.clear();
        if matches!(self.phase, Phase::Idle) {
            self.events.push(GridEvent::RenderReady);
        }
        Ok(Change::Applied)
    }

    /// Key of the group `row` belongs to under the current group fields.
    pub fn group_key(&self, row: &R) -> Option<String> {
        if self.group_fields.is_empty() {
            return None;
        }
        let parts: Vec<String> = self
            .group_fields
            .iter()
            .map(|f| row.value(f).unwrap_or_default().to_string())
            .collect();
        Some(parts.join(" / "))
    }

    pub fn set_group_expanded(&mut self, key: impl Into<String>, expanded: bool) {
        self.expanded.insert(key.into(), expanded);
    }

    /// Flips a group and returns its new state.
    pub fn toggle_group(&mut self, key: &str) -> bool {
        let expanded = !self.is_group_expanded(key);
        self.expanded.insert(key.to_string(), expanded);
        expanded
    }

    pub fn is_group_expanded(&self, key: &str) -> bool {
        self.expanded.get(key).copied().unwrap_or(false)
    }

    /// Expanded groups that exist among the loaded rows. Keys restored from
    /// older state that match nothing are kept but not reported.
    pub fn expanded_groups(&self) -> Vec<String> {
        let loaded: BTreeSet<String> = self
            .window
            .rows()
            .filter_map(|r| self.group_key(&r.data))
            .collect();
        self.expanded
            .iter()
            .filter(|(key, expanded)| **expanded && loaded.contains(*key))
            .map(|(key, _)| key.clone())
            .collect()
    }

    // -------------------------- Rendering --------------------------------- //

    /// Text of a cell: formatter, then renderer, then sanitizer.
    pub fn render_cell(&self, column: &Column<R>, row: &R) -> String {
        let raw = row.value(column.field()).unwrap_or_default();
        let value = match column.formatter() {
            Some(formatter) => formatter.format(&raw, row),
            None => raw,
        };
        let text = match column.renderer() {
            Some(renderer) => renderer.render(&value, row, column),
            None => value.to_string(),
        };
        if self.options.sanitize_data || column.sanitizes() {
            self.options.sanitizer.sanitize(&text)
        } else {
            text
        }
    }

    fn row_classes(&self, row: &R) -> Vec<String> {
        self.options
            .row_class
            .as_ref()
            .map(|class| class.resolve(row))
            .unwrap_or_default()
    }

    /// Projection of the visible part of the grid for the visual layer.
    pub fn view(&self) -> GridView {
        let columns = self.columns.visible_columns_in_order();
        let column_views = columns
            .iter()
            .map(|c| ColumnView {
                field: c.field().to_string(),
                header: c.header_text(),
                width: c.current_width(),
                pinned: c.pinned_side(),
                classes: c.header_classes().to_vec(),
                sort: self
                    .query
                    .sort
                    .iter()
                    .position(|s| s.field == c.field())
                    .map(|pos| (self.query.sort[pos].direction, pos)),
            })
            .collect();

        let rows = self
            .window
            .visible_range()
            .map(|index| match self.window.row(index) {
                Some(row) => {
                    let id = RowId::of(row);
                    let cells = columns
                        .iter()
                        .map(|c| CellView {
                            text: self.render_cell(c, &row.data),
                            classes: c
                                .cell_class_def()
                                .map(|class: &CellClass<R>| class.resolve(&row.data))
                                .unwrap_or_default(),
                            selected: self
                                .selected_cell
                                .as_ref()
                                .is_some_and(|(sel, field)| *sel == id && field == c.field()),
                        })
                        .collect();
                    RowView {
                        index,
                        key: row.key.clone(),
                        classes: self.row_classes(&row.data),
                        selected: self.selected_rows.contains(&id),
                        group: self.group_key(&row.data),
                        cells: Some(cells),
                    }
                }
                None => RowView {
                    index,
                    key: None,
                    classes: Vec::new(),
                    selected: false,
                    group: None,
                    cells: None,
                },
            })
            .collect();

        GridView {
            columns: column_views,
            rows,
            total: self.total,
            status: self.status(),
            header_height: self.options.header_height,
            row_height: self.options.row_height,
            page: self.page_count().map(|page_count| PageInfo {
                page: self.query.page,
                page_size: self.query.page_size,
                page_count,
            }),
        }
    }
}

impl<R, S> Grid<R, S> {
    /// Sanitizer shared with hosts that render outside of `view()`.
    pub fn sanitizer(&self) -> Arc<dyn Sanitizer> {
        Arc::clone(&self.options.sanitizer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{CaseSensitivity, FilterType};
    use crate::source::memory::MemorySource;
    use crate::value::Record;

    fn people(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| {
                Record::with_key(format!("p{i}"))
                    .set("name", format!("person {i:04}"))
                    .set("age", (i % 90) as i64)
            })
            .collect()
    }

    fn columns() -> Vec<Column<Record>> {
        vec![
            Column::new("name", "Name").editable(true),
            Column::new("age", "Age")
                .width(60)
                .min_width(30)
                .max_width(120)
                .editable(true)
                .cell_validator(|value: &Value, _row: &Record| {
                    value.as_f64().is_some_and(|age| (0.0..150.0).contains(&age))
                }),
        ]
    }

    fn grid(n: usize) -> Grid<Record, MemorySource<Record>> {
        let options = GridOptions::new(columns()).cache_block_size(10).max_blocks_in_cache(4);
        let mut grid = Grid::new(options, MemorySource::new(people(n))).unwrap();
        grid.set_viewport_height(300);
        grid.poll();
        grid
    }

    /// Records every call and keeps the emitters so tests decide when and
    /// in which order answers arrive.
    #[derive(Default)]
    struct ManualSource {
        page: (usize, usize),
        sort: Vec<SortItem>,
        calls: Vec<String>,
        totals: Vec<(Vec<SortItem>, Emitter<Record>)>,
        pages: Vec<(usize, Vec<SortItem>, Emitter<Record>)>,
    }

    impl DataSource<Record> for ManualSource {
        fn set_page(&mut self, page: usize, page_size: usize) {
            self.page = (page, page_size);
            self.calls.push(format!("set_page({page},{page_size})"));
        }

        fn set_sort_model(&mut self, sort: &[SortItem]) {
            self.sort = sort.to_vec();
            self.calls.push("set_sort_model".to_string());
        }

        fn set_filter_model(&mut self, _filter: &[FilterItem]) {
            self.calls.push("set_filter_model".to_string());
        }

        fn refresh(&mut self) {
            self.calls.push("refresh".to_string());
        }

        fn get_total(&mut self, emitter: Emitter<Record>) {
            self.calls.push("get_total".to_string());
            self.totals.push((self.sort.clone(), emitter));
        }

        fn get_data(&mut self, emitter: Emitter<Record>) {
            self.calls.push("get_data".to_string());
            self.pages.push((self.page.0, self.sort.clone(), emitter));
        }
    }

    fn tagged_rows(block: usize, size: usize, tag: &str) -> Vec<Record> {
        (block * size..(block + 1) * size)
            .map(|i| Record::new().set("name", format!("{tag}{i}")).set("age", 1))
            .collect()
    }

    #[test]
    fn test_initial_load_fills_buffered_range() {
        let grid = grid(1000);
        assert_eq!(grid.status(), GridStatus::Idle);
        assert_eq!(grid.total(), Some(1000));
        assert_eq!(grid.visible_range(), 0..10);
        assert_eq!(grid.buffered_range(), 0..20);
        assert!(grid.window().contains_range(0..20));
    }

    #[test]
    fn test_window_covers_buffered_range_for_every_scroll_offset() {
        let mut grid = grid(1000);
        for offset in (0..30_000).step_by(1_370) {
            grid.scroll_to(offset);
            grid.poll();
            assert_eq!(grid.status(), GridStatus::Idle);
            let buffered = grid.buffered_range();
            assert!(
                grid.window().contains_range(buffered.clone()),
                "offset {offset}: {buffered:?} not materialized"
            );
            assert!(grid.window().cached_blocks().len() <= 4);
        }
    }

    #[test]
    fn test_scroll_inside_buffer_does_not_fetch() {
        let mut grid = grid(1000);
        // Rows 55..65 visible, 45..75 buffered: blocks 4 to 7.
        grid.scroll_to(1650);
        grid.poll();
        assert_eq!(grid.window().cached_blocks(), vec![4, 5, 6, 7]);
        let generation = grid.generation();
        let requests = grid.source().request_count();
        grid.drain_events();
        grid.scroll_by(30);
        assert_eq!(grid.generation(), generation);
        assert_eq!(grid.source().request_count(), requests);
        assert_eq!(grid.drain_events(), vec![GridEvent::RenderReady]);
    }

    #[test]
    fn test_newer_query_supersedes_older_answer() {
        let options = GridOptions::new(columns()).cache_block_size(10);
        let mut grid = Grid::new(options, ManualSource::default()).unwrap();
        grid.set_viewport_height(300);
        // The initial total is never answered.
        let _ = grid.set_sort_model(vec![SortItem::asc("age")]).unwrap();
        let _ = grid.set_sort_model(vec![SortItem::desc("age")]).unwrap();

        let source = grid.source_mut();
        let (_, initial) = source.totals.remove(0);
        let (a_sort, a_total) = source.totals.remove(0);
        let (b_sort, b_total) = source.totals.remove(0);
        assert_eq!(a_sort, vec![SortItem::asc("age")]);
        assert_eq!(b_sort, vec![SortItem::desc("age")]);

        b_total.total(1000);
        grid.poll();
        assert_eq!(grid.status(), GridStatus::FetchPending);
        let pages: Vec<_> = grid.source_mut().pages.drain(..).collect();
        assert_eq!(pages.iter().map(|p| p.0).collect::<Vec<_>>(), vec![0, 1]);
        for (block, _, emitter) in &pages {
            emitter.rows(tagged_rows(*block, 10, "B"));
        }
        // Late answers for the superseded requests.
        a_total.total(5);
        initial.total(7);
        a_total.rows(tagged_rows(0, 10, "A"));
        grid.poll();

        assert_eq!(grid.status(), GridStatus::Idle);
        assert_eq!(grid.total(), Some(1000));
        let names: Vec<String> = (0..20)
            .map(|i| grid.row(i).unwrap().get("name").unwrap().to_string())
            .collect();
        assert!(names.iter().all(|n| n.starts_with('B')), "{names:?}");
    }

    #[test]
    fn test_rows_are_reconciled_only_when_every_block_arrived() {
        let options = GridOptions::new(columns()).cache_block_size(10);
        let mut grid = Grid::new(options, ManualSource::default()).unwrap();
        grid.set_viewport_height(300);
        let (_, total) = grid.source_mut().totals.remove(0);
        total.total(100);
        grid.poll();
        let pages: Vec<_> = grid.source_mut().pages.drain(..).collect();
        assert_eq!(pages.len(), 2);

        pages[0].2.rows(tagged_rows(0, 10, "x"));
        grid.poll();
        assert_eq!(grid.status(), GridStatus::FetchPending);
        assert!(grid.row(0).is_none());

        pages[1].2.rows(tagged_rows(1, 10, "x"));
        grid.poll();
        assert_eq!(grid.status(), GridStatus::Idle);
        assert!(grid.window().contains_range(0..20));

        // A second emission for the applied fetch replaces the block.
        pages[0].2.rows(tagged_rows(0, 10, "y"));
        grid.poll();
        assert_eq!(grid.row(3).unwrap().get("name"), Some(&Value::from("y3")));
    }

    #[test]
    fn test_total_emitted_again_shrinks_then_grows_the_window() {
        let options = GridOptions::new(columns()).cache_block_size(10);
        let mut grid = Grid::new(options, ManualSource::default()).unwrap();
        grid.set_viewport_height(300);
        let (_, total) = grid.source_mut().totals.remove(0);
        total.total(25);
        grid.poll();
        for (block, _, emitter) in grid.source_mut().pages.drain(..).collect::<Vec<_>>() {
            emitter.rows(tagged_rows(block, 10, "a"));
        }
        grid.poll();
        assert_eq!(grid.status(), GridStatus::Idle);
        let generation = grid.generation();

        // The result shrinks to 15 rows: block 1 keeps rows 10..15.
        total.total(15);
        grid.poll();
        assert_eq!(grid.status(), GridStatus::Idle);
        assert_eq!(grid.total(), Some(15));
        assert_eq!(grid.buffered_range(), 0..15);
        assert!(grid.row(14).is_some());
        assert!(grid.row(15).is_none());
        assert_eq!(grid.generation(), generation);
        assert!(grid.source().pages.is_empty());

        // Growing again needs rows 15..20, which block 1 no longer holds.
        total.total(25);
        grid.poll();
        assert_eq!(grid.total(), Some(25));
        assert_eq!(grid.status(), GridStatus::FetchPending);
        let pages: Vec<_> = grid.source_mut().pages.drain(..).collect();
        assert_eq!(pages.iter().map(|p| p.0).collect::<Vec<_>>(), vec![1]);
        pages[0].2.rows(tagged_rows(1, 10, "b"));
        grid.poll();

        assert_eq!(grid.status(), GridStatus::Idle);
        assert_eq!(grid.buffered_range(), 0..20);
        assert!(grid.window().contains_range(0..20));
        assert_eq!(grid.row(17).unwrap().get("name"), Some(&Value::from("b17")));
    }

    #[test]
    fn test_zero_total_issues_no_row_fetch() {
        let options = GridOptions::new(columns());
        let mut grid = Grid::new(options, ManualSource::default()).unwrap();
        grid.set_viewport_height(300);
        let (_, total) = grid.source_mut().totals.remove(0);
        total.total(0);
        grid.poll();
        assert_eq!(grid.status(), GridStatus::Idle);
        assert_eq!(grid.visible_range(), 0..0);
        assert!(grid.source().pages.is_empty());
        assert!(!grid.source().calls.iter().any(|c| c.starts_with("set_page")));
        assert!(grid.view().rows.is_empty());
    }

    #[test]
    fn test_failure_enters_error_until_next_action() {
        let mut grid = grid(1000);
        grid.source_mut().fail_next(SourceError::new("backend down"));
        grid.scroll_to(30 * 500);
        grid.poll();
        assert_eq!(grid.status(), GridStatus::Error);
        assert_eq!(grid.last_error().unwrap().message, "backend down");
        assert!(grid.drain_events().contains(&GridEvent::FetchFailed {
            error: SourceError::new("backend down")
        }));
        // Nothing retries on its own.
        grid.poll();
        assert_eq!(grid.status(), GridStatus::Error);
        // Old rows are untouched.
        assert!(grid.row(0).is_some());

        grid.scroll_by(30);
        grid.poll();
        assert_eq!(grid.status(), GridStatus::Idle);
        assert!(grid.window().contains_range(grid.buffered_range()));
    }

    #[test]
    fn test_failed_query_fetch_recovers_on_refresh() {
        let mut grid = grid(50);
        grid.source_mut().fail_next(SourceError::new("timeout"));
        let _ = grid.set_sort_model(vec![SortItem::desc("age")]).unwrap();
        grid.poll();
        assert_eq!(grid.status(), GridStatus::Error);
        grid.refresh();
        grid.poll();
        assert_eq!(grid.status(), GridStatus::Idle);
        assert_eq!(grid.row(0).unwrap().get("age"), Some(&Value::Int(49)));
    }

    #[test]
    fn test_sorting_disabled_never_reaches_the_source() {
        let options = GridOptions::new(columns()).enable_sorting(false);
        let mut grid = Grid::new(options, ManualSource::default()).unwrap();
        let calls = grid.source().calls.len();
        assert_eq!(
            grid.set_sort_model(vec![SortItem::asc("age")]).unwrap(),
            Change::Rejected
        );
        assert_eq!(grid.source().calls.len(), calls);
        assert!(grid.query().sort.is_empty());
    }

    #[test]
    fn test_sort_model_validation() {
        let mut grid = grid(10);
        assert_eq!(
            grid.set_sort_model(vec![SortItem::asc("nope")]).unwrap_err(),
            GridError::unknown_column("nope")
        );
        let _ = grid.update_column("age", ColumnPatch::default().sortable(false));
        assert_eq!(
            grid.set_sort_model(vec![SortItem::asc("age")]).unwrap(),
            Change::Rejected
        );
        assert_eq!(
            grid.set_sort_model(vec![SortItem::desc("name"), SortItem::asc("name")])
                .unwrap(),
            Change::Applied
        );
        assert_eq!(grid.query().sort, vec![SortItem::desc("name")]);
    }

    #[test]
    fn test_toggle_sort_cycles() {
        let mut grid = grid(10);
        let _ = grid.toggle_sort("age", false).unwrap();
        assert_eq!(grid.query().sort, vec![SortItem::asc("age")]);
        let _ = grid.toggle_sort("name", true).unwrap();
        assert_eq!(grid.query().sort, vec![SortItem::asc("age"), SortItem::asc("name")]);
        let _ = grid.toggle_sort("age", true).unwrap();
        assert_eq!(grid.query().sort, vec![SortItem::desc("age"), SortItem::asc("name")]);
        let _ = grid.toggle_sort("age", false).unwrap();
        assert!(grid.query().sort.is_empty());
    }

    #[test]
    fn test_filter_excludes_mismatched_rows() {
        let mut rows = people(5);
        rows[2].insert("age", "N/A");
        let options = GridOptions::new(columns());
        let mut grid = Grid::new(options, MemorySource::new(rows)).unwrap();
        grid.set_viewport_height(300);
        let _ = grid
            .set_filter_model(vec![FilterItem::new("age", FilterType::GreaterThan, 0)])
            .unwrap();
        grid.poll();
        assert_eq!(grid.status(), GridStatus::Idle);
        assert_eq!(grid.total(), Some(3));
    }

    #[test]
    fn test_query_change_keeps_key_selection() {
        let mut grid = grid(30);
        let _ = grid.select_row(5, false).unwrap();
        assert!(grid.is_row_selected(5));
        let _ = grid.set_sort_model(vec![SortItem::desc("name")]).unwrap();
        grid.poll();
        // p5 moved to index 24 after sorting names descending.
        assert!(!grid.is_row_selected(5));
        assert!(grid.is_row_selected(24));
    }

    #[test]
    fn test_edit_cell_validates_and_reverts() {
        let mut grid = grid(30);
        assert_eq!(grid.edit_cell(3, "age", "42").unwrap(), Value::Int(42));
        assert_eq!(grid.row(3).unwrap().get("age"), Some(&Value::Int(42)));

        assert!(matches!(
            grid.edit_cell(3, "age", "400"),
            Err(GridError::ValidationFailed { .. })
        ));
        assert!(matches!(
            grid.edit_cell(3, "age", "old"),
            Err(GridError::ParseFailed { .. })
        ));
        assert_eq!(grid.row(3).unwrap().get("age"), Some(&Value::Int(42)));
        assert!(matches!(
            grid.edit_cell(900, "age", "1"),
            Err(GridError::RowNotLoaded { index: 900 })
        ));

        let events = grid.drain_events();
        assert!(events.contains(&GridEvent::CellEdited {
            index: 3,
            field: "age".to_string(),
            old: Value::Int(3),
            new: Value::Int(42),
        }));
    }

    #[test]
    fn test_edit_survives_eviction_and_refetch() {
        let options = GridOptions::new(columns()).cache_block_size(10).max_blocks_in_cache(3);
        let mut grid = Grid::new(options, MemorySource::new(people(1000))).unwrap();
        grid.set_viewport_height(300);
        grid.poll();
        grid.edit_cell(3, "age", "77").unwrap();
        grid.edit_cell(4, "name", "renamed").unwrap();

        grid.scroll_to_row(500);
        grid.poll();
        assert!(!grid.window().is_cached(0));
        assert!(grid.row(3).is_none());

        grid.scroll_to_row(0);
        grid.poll();
        assert_eq!(grid.status(), GridStatus::Idle);
        assert_eq!(grid.row(3).unwrap().get("age"), Some(&Value::Int(77)));
        assert_eq!(grid.row(4).unwrap().get("name"), Some(&Value::from("renamed")));

        // A new query rebuilds the view from the edited rows.
        let _ = grid
            .set_filter_model(vec![FilterItem::new("age", FilterType::Equals, 77)])
            .unwrap();
        grid.poll();
        let keys: Vec<_> = (0..grid.total().unwrap())
            .filter_map(|i| grid.row(i).and_then(|r| r.row_key()))
            .collect();
        assert!(keys.contains(&"p3".to_string()));
    }

    #[test]
    fn test_filter_case_option_reaches_the_source() {
        let rows = || {
            ["alice", "Alice", "ALICE", "bob"]
                .iter()
                .map(|name| Record::new().set("name", *name))
                .collect::<Vec<_>>()
        };
        let filter = vec![FilterItem::new("name", FilterType::Equals, "Alice")];

        let mut grid = Grid::new(GridOptions::new(columns()), MemorySource::new(rows())).unwrap();
        let _ = grid.set_filter_model(filter.clone()).unwrap();
        grid.poll();
        assert_eq!(grid.total(), Some(3));

        let options = GridOptions::new(columns()).filter_case(CaseSensitivity::Sensitive);
        let mut grid = Grid::new(options, MemorySource::new(rows())).unwrap();
        let _ = grid.set_filter_model(filter).unwrap();
        grid.poll();
        assert_eq!(grid.total(), Some(1));
    }

    #[test]
    fn test_column_changes_relayout_without_fetch() {
        let mut grid = grid(30);
        let generation = grid.generation();
        grid.drain_events();
        assert_eq!(grid.set_column_width("age", 5).unwrap(), Change::Applied);
        assert_eq!(grid.generation(), generation);
        assert_eq!(
            grid.drain_events(),
            vec![
                GridEvent::ColumnResized {
                    field: "age".to_string(),
                    width: 30
                },
                GridEvent::RenderReady
            ]
        );
    }

    #[test]
    fn test_view_renders_hooks_in_display_order() {
        let cols = vec![
            Column::new("name", "Name")
                .cell_renderer(|value: &Value, _row: &Record, _col: &Column<Record>| {
                    format!("<{value}>\n")
                }),
            Column::new("age", "Age")
                .pinned(Pinned::Left)
                .value_formatter(|value: &Value, _row: &Record| {
                    Value::String(format!("{value} yrs"))
                })
                .header_renderer(|col: &Column<Record>| col.header().to_uppercase())
                .cell_class(CellClass::fixed(["num"])),
        ];
        let options = GridOptions::new(cols)
            .row_class(CellClass::dynamic(|row: &Record| {
                if row.get("age") == Some(&Value::Int(0)) {
                    vec!["first".to_string()]
                } else {
                    Vec::new()
                }
            }));
        let mut grid = Grid::new(options, MemorySource::new(people(3))).unwrap();
        grid.set_viewport_height(90);
        grid.poll();
        let _ = grid.toggle_sort("age", false).unwrap();
        grid.poll();

        let view = grid.view();
        let headers: Vec<_> = view.columns.iter().map(|c| c.header.as_str()).collect();
        assert_eq!(headers, ["AGE", "Name"]);
        assert_eq!(view.columns[0].sort, Some((SortDirection::Asc, 0)));
        let first = view.rows[0].cells.as_ref().unwrap();
        assert_eq!(first[0].text, "0 yrs");
        assert_eq!(first[0].classes, vec!["num".to_string()]);
        assert_eq!(first[1].text, "<person 0000> ↵ ");
        assert_eq!(view.rows[0].classes, vec!["first".to_string()]);
        assert!(view.rows[1].classes.is_empty());
    }

    #[test]
    fn test_pagination_fetches_one_page() {
        let options = GridOptions::new(columns())
            .pagination(true)
            .pagination_page_size(25);
        let mut grid = Grid::new(options, MemorySource::new(people(60))).unwrap();
        grid.set_viewport_height(30 * 100);
        grid.poll();
        assert_eq!(grid.page_count(), Some(3));
        assert_eq!(grid.visible_range(), 0..25);

        assert_eq!(grid.next_page().unwrap(), Change::Applied);
        assert_eq!(grid.next_page().unwrap(), Change::Applied);
        grid.poll();
        assert_eq!(grid.visible_range(), 50..60);
        assert_eq!(grid.row(50).unwrap().get("name"), Some(&Value::from("person 0050")));
        assert_eq!(grid.next_page().unwrap(), Change::Unchanged);
        assert_eq!(grid.view().page.unwrap().page, 2);

        assert_eq!(grid.set_page_size(0).unwrap_err(), GridError::InvalidPageSize);
        assert_eq!(grid.set_page_size(40).unwrap(), Change::Applied);
        grid.poll();
        assert_eq!(grid.page_count(), Some(2));
        assert_eq!(grid.visible_range(), 0..40);
    }

    #[test]
    fn test_page_calls_rejected_without_pagination() {
        let mut grid = grid(10);
        assert_eq!(grid.set_page(1).unwrap(), Change::Rejected);
        assert_eq!(grid.next_page().unwrap(), Change::Rejected);
        assert_eq!(grid.page_count(), None);
    }

    #[test]
    fn test_grouping_reports_only_loaded_groups() {
        let mut grid = grid(30);
        let _ = grid.set_group_fields(vec!["age".to_string()]).unwrap();
        grid.set_group_expanded("3", true);
        grid.set_group_expanded("stale", true);
        assert!(grid.toggle_group("4"));
        assert!(grid.is_group_expanded("stale"));
        assert_eq!(grid.expanded_groups(), vec!["3".to_string(), "4".to_string()]);
        assert!(grid.set_group_fields(vec!["nope".to_string()]).is_err());
    }

    #[test]
    fn test_click_events_and_selection_flags() {
        let options = GridOptions::new(columns()).enable_cell_selection(true);
        let mut grid = Grid::new(options, MemorySource::new(people(10))).unwrap();
        grid.set_viewport_height(300);
        grid.poll();
        grid.drain_events();

        grid.click_row(2).unwrap();
        grid.click_cell(2, "age").unwrap();
        let events = grid.drain_events();
        assert_eq!(
            events[0],
            GridEvent::RowClicked {
                index: 2,
                key: Some("p2".to_string())
            }
        );
        assert!(events.contains(&GridEvent::CellClicked {
            index: 2,
            field: "age".to_string()
        }));
        assert_eq!(
            grid.selected_cell(),
            Some((&RowId::Key("p2".to_string()), "age"))
        );
        let view = grid.view();
        assert!(view.rows[2].selected);
        assert!(view.rows[2].cells.as_ref().unwrap()[1].selected);
    }
}
