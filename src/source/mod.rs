//! The contract between the grid and whatever owns the data.
//!
//! The grid drives a [`DataSource`]: it pushes the query model with the
//! `set_*` calls, then asks for the total and for pages of rows. Answers go
//! back through an [`Emitter`], which may be called right away, later, from
//! another thread, or several times. Every emitter is stamped with the
//! [`Ticket`] of the request it answers, so the grid can recognise and drop
//! answers to requests it has since superseded.

pub mod memory;

use crossbeam_channel::Sender;
use tracing::trace;

use crate::error::SourceError;
use crate::query::{CaseSensitivity, FilterItem, SortItem};
use crate::value::Value;

/// Monotonic request counter. A newer generation supersedes every older one.
pub type Generation = u64;

/// Identifies the request an answer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket {
    pub generation: Generation,
    /// Block being fetched; `None` for total requests.
    pub block: Option<usize>,
}

/// An answer from a data source.
#[derive(Debug)]
pub enum SourceEvent<R> {
    Total { ticket: Ticket, total: usize },
    Rows { ticket: Ticket, rows: Vec<R> },
    Failed { ticket: Ticket, error: SourceError },
}

impl<R> SourceEvent<R> {
    pub fn ticket(&self) -> Ticket {
        match self {
            SourceEvent::Total { ticket, .. }
            | SourceEvent::Rows { ticket, .. }
            | SourceEvent::Failed { ticket, .. } => *ticket,
        }
    }
}

/// Sends answers for one request back to the grid.
pub struct Emitter<R> {
    ticket: Ticket,
    tx: Sender<SourceEvent<R>>,
}

impl<R> Emitter<R> {
    pub fn new(ticket: Ticket, tx: Sender<SourceEvent<R>>) -> Self {
        Self { ticket, tx }
    }

    pub fn ticket(&self) -> Ticket {
        self.ticket
    }

    pub fn total(&self, total: usize) {
        self.send(SourceEvent::Total {
            ticket: self.ticket,
            total,
        });
    }

    pub fn rows(&self, rows: Vec<R>) {
        self.send(SourceEvent::Rows {
            ticket: self.ticket,
            rows,
        });
    }

    pub fn fail(&self, error: SourceError) {
        self.send(SourceEvent::Failed {
            ticket: self.ticket,
            error,
        });
    }

    fn send(&self, event: SourceEvent<R>) {
        // The grid is gone; nobody is waiting for this answer.
        if self.tx.send(event).is_err() {
            trace!("Dropping answer for {:?}, grid closed", self.ticket);
        }
    }
}

impl<R> Clone for Emitter<R> {
    fn clone(&self) -> Self {
        Self {
            ticket: self.ticket,
            tx: self.tx.clone(),
        }
    }
}

/// A pull based data source driven by the grid.
///
/// `set_page` always precedes the `get_data` call it applies to. Sources are
/// free to answer a superseded request; the grid discards it.
pub trait DataSource<R> {
    /// Zero based page and its size.
    fn set_page(&mut self, page: usize, page_size: usize);

    fn set_sort_model(&mut self, sort: &[SortItem]);

    fn set_filter_model(&mut self, filter: &[FilterItem]);

    /// How text filters compare. Sent with the full query model.
    fn set_case_sensitivity(&mut self, _case: CaseSensitivity) {}

    /// Invalidates anything the source cached for the current model.
    fn refresh(&mut self) {}

    /// Stores an accepted cell edit. `index` is the absolute row index in the
    /// current result; `key` is the row key when the rows have one.
    ///
    /// Sources that keep no rows of their own can ignore this.
    fn update_row(&mut self, _index: usize, _key: Option<&str>, _field: &str, _value: &Value) {}

    /// Answers with the number of rows matching the current filter model.
    fn get_total(&mut self, emitter: Emitter<R>);

    /// Answers with the rows of the current page.
    fn get_data(&mut self, emitter: Emitter<R>);
}

impl<R, S: DataSource<R> + ?Sized> DataSource<R> for Box<S> {
    fn set_page(&mut self, page: usize, page_size: usize) {
        (**self).set_page(page, page_size)
    }

    fn set_sort_model(&mut self, sort: &[SortItem]) {
        (**self).set_sort_model(sort)
    }

    fn set_filter_model(&mut self, filter: &[FilterItem]) {
        (**self).set_filter_model(filter)
    }

    fn set_case_sensitivity(&mut self, case: CaseSensitivity) {
        (**self).set_case_sensitivity(case)
    }

    fn refresh(&mut self) {
        (**self).refresh()
    }

    fn update_row(&mut self, index: usize, key: Option<&str>, field: &str, value: &Value) {
        (**self).update_row(index, key, field, value)
    }

    fn get_total(&mut self, emitter: Emitter<R>) {
        (**self).get_total(emitter)
    }

    fn get_data(&mut self, emitter: Emitter<R>) {
        (**self).get_data(emitter)
    }
}
