use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::{debug, info, trace, warn};

use super::{DataSource, Emitter};
use crate::error::SourceError;
use crate::query::{CaseSensitivity, FilterItem, SortItem, compare_rows, matches_all};
use crate::value::{RowData, Value};

/// A data source over rows held in memory.
///
/// Filtering runs in parallel over all rows; sorting is stable, so rows that
/// compare equal keep their original order. The filtered and sorted view is
/// rebuilt lazily, on the first request after the model changed.
pub struct MemorySource<R> {
    rows: Arc<Vec<R>>,
    view: Arc<Vec<usize>>, // Mapping of view position to index in `rows`
    dirty: bool,
    sort: Vec<SortItem>,
    filter: Vec<FilterItem>,
    case: CaseSensitivity,
    page: usize,
    page_size: usize,
    latency: Option<Duration>,
    fail_next: Option<SourceError>,
    requests: usize,
}

impl<R> MemorySource<R>
where
    R: RowData + Send + Sync + 'static,
{
    pub fn new(rows: Vec<R>) -> Self {
        let len = rows.len();
        Self {
            rows: Arc::new(rows),
            view: Arc::new((0..len).collect()),
            dirty: false,
            sort: Vec::new(),
            filter: Vec::new(),
            case: CaseSensitivity::default(),
            page: 0,
            page_size: len.max(1),
            latency: None,
            fail_next: None,
            requests: 0,
        }
    }

    /// Answers from a background thread after `latency` instead of inline.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Makes the next request fail with `error`.
    pub fn fail_next(&mut self, error: SourceError) {
        self.fail_next = Some(error);
    }

    /// Replaces all rows. The grid sees the change on its next refresh.
    pub fn replace_rows(&mut self, rows: Vec<R>) {
        self.rows = Arc::new(rows);
        self.dirty = true;
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of `get_total` and `get_data` calls served so far.
    pub fn request_count(&self) -> usize {
        self.requests
    }

    /// Rows of the current view, in view order.
    pub fn view_rows(&mut self) -> Vec<R> {
        self.rebuild_view();
        self.view.iter().map(|&i| self.rows[i].clone()).collect()
    }

    fn rebuild_view(&mut self) {
        if !self.dirty {
            return;
        }
        let start_time = Instant::now();
        let rows = &self.rows;
        let filter = &self.filter;
        let case = self.case;

        let mut view: Vec<usize> = if filter.is_empty() {
            (0..rows.len()).collect()
        } else {
            (0..rows.len())
                .into_par_iter()
                .filter(|&i| matches_all(&rows[i], filter, case))
                .collect()
        };
        if !self.sort.is_empty() {
            let sort = &self.sort;
            view.par_sort_by(|&a, &b| compare_rows(&rows[a], &rows[b], sort));
        }

        info!(
            "Rebuilt view of {} rows ({} matching) in {}ms",
            rows.len(),
            view.len(),
            start_time.elapsed().as_millis()
        );
        self.view = Arc::new(view);
        self.dirty = false;
    }

    fn answer<F>(&mut self, emitter: Emitter<R>, respond: F)
    where
        F: FnOnce(&Emitter<R>) + Send + 'static,
    {
        self.requests += 1;
        if let Some(error) = self.fail_next.take() {
            debug!("Failing request {:?}", emitter.ticket());
            emitter.fail(error);
            return;
        }
        match self.latency {
            None => respond(&emitter),
            Some(latency) => {
                thread::spawn(move || {
                    thread::sleep(latency);
                    respond(&emitter);
                });
            }
        }
    }
}

impl<R> DataSource<R> for MemorySource<R>
where
    R: RowData + Send + Sync + 'static,
{
    fn set_page(&mut self, page: usize, page_size: usize) {
        self.page = page;
        self.page_size = page_size.max(1);
    }

    fn set_sort_model(&mut self, sort: &[SortItem]) {
        self.sort = sort.to_vec();
        self.dirty = true;
    }

    fn set_filter_model(&mut self, filter: &[FilterItem]) {
        self.filter = filter.to_vec();
        self.dirty = true;
    }

    fn set_case_sensitivity(&mut self, case: CaseSensitivity) {
        if self.case != case {
            self.case = case;
            self.dirty = true;
        }
    }

    fn refresh(&mut self) {
        self.dirty = true;
    }

    // The view keeps its order; an edited sort or filter field takes effect
    // on the next rebuild.
    fn update_row(&mut self, index: usize, key: Option<&str>, field: &str, value: &Value) {
        let position = match key {
            Some(key) => self
                .rows
                .iter()
                .position(|r| r.row_key().as_deref() == Some(key)),
            None => self.view.get(index).copied(),
        };
        let Some(position) = position else {
            warn!("No row {index} to store the edit of {field}");
            return;
        };
        if let Some(row) = Arc::make_mut(&mut self.rows).get_mut(position) {
            trace!("Storing edit of {field} in row {position}");
            row.set_value(field, value.clone());
        }
    }

    fn get_total(&mut self, emitter: Emitter<R>) {
        self.rebuild_view();
        let total = self.view.len();
        self.answer(emitter, move |e| e.total(total));
    }

    fn get_data(&mut self, emitter: Emitter<R>) {
        self.rebuild_view();
        let start = self.page.saturating_mul(self.page_size).min(self.view.len());
        let end = (start + self.page_size).min(self.view.len());
        trace!("Serving rows {start}..{end} for {:?}", emitter.ticket());
        let rows: Vec<R> = self.view[start..end]
            .iter()
            .map(|&i| self.rows[i].clone())
            .collect();
        self.answer(emitter, move |e| e.rows(rows));
    }
}
