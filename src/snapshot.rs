//! Saving and restoring the user facing grid state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::coordinator::Grid;
use crate::error::GridError;
use crate::query::{FilterItem, QueryState, SortItem, dedup_sort};
use crate::source::DataSource;
use crate::value::RowData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnState {
    pub width: u32,
    pub visible: bool,
    pub order: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationState {
    pub page: usize,
    pub page_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupingState {
    pub fields: Vec<String>,
    #[serde(default)]
    pub expanded: BTreeMap<String, bool>,
}

/// Serializable snapshot of column layout, query and grouping.
///
/// Every section is optional on import; missing sections leave the grid as
/// it is.
///
/// ```
/// use tvgrid::GridState;
///
/// let state = GridState::from_json(r#"{"pagination": {"page": 2, "pageSize": 50}}"#).unwrap();
/// assert_eq!(state.pagination.unwrap().page_size, 50);
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridState {
    #[serde(default)]
    pub columns: BTreeMap<String, ColumnState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Vec<SortItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Vec<FilterItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grouping: Option<GroupingState>,
}

impl GridState {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl<R, S> Grid<R, S>
where
    R: RowData + 'static,
    S: DataSource<R>,
{
    pub fn export_state(&self) -> GridState {
        let columns = self
            .columns
            .columns()
            .iter()
            .enumerate()
            .map(|(order, c)| {
                (
                    c.field().to_string(),
                    ColumnState {
                        width: c.current_width(),
                        visible: c.is_visible(),
                        order,
                    },
                )
            })
            .collect();
        let query = self.query();
        GridState {
            columns,
            sort: Some(query.sort.clone()),
            filter: Some(query.filter.clone()),
            pagination: self.options.pagination.then_some(PaginationState {
                page: query.page,
                page_size: query.page_size,
            }),
            grouping: (!self.group_fields.is_empty()).then(|| GroupingState {
                fields: self.group_fields.clone(),
                expanded: self.expanded.clone(),
            }),
        }
    }

    /// Applies a snapshot and issues a single fetch for the restored query.
    ///
    /// Entries naming columns the grid does not know are skipped. Nothing is
    /// applied when the snapshot is invalid.
    pub fn import_state(&mut self, state: &GridState) -> Result<(), GridError> {
        if let Some(pagination) = &state.pagination
            && pagination.page_size == 0
        {
            return Err(GridError::InvalidPageSize);
        }

        let known = |field: &str| self.columns.column(field).is_some();
        for field in state.columns.keys().filter(|f| !known(f)) {
            warn!("Ignoring saved state of unknown column {field}");
        }
        let mut query = self.query().clone();
        let sortable = |field: &str| self.columns.column(field).is_some_and(|c| c.is_sortable());
        let filterable =
            |field: &str| self.columns.column(field).is_some_and(|c| c.is_filterable());
        if let Some(sort) = &state.sort {
            if self.options.enable_sorting {
                let (sort, skipped): (Vec<SortItem>, Vec<SortItem>) =
                    sort.iter().cloned().partition(|s| sortable(&s.field));
                for item in &skipped {
                    warn!("Ignoring saved sort on {}, not sortable", item.field);
                }
                query.sort = dedup_sort(&sort);
            } else {
                debug!("Sorting disabled, saved sort model ignored");
            }
        }
        if let Some(filter) = &state.filter {
            if self.options.enable_filter {
                let (filter, skipped): (Vec<FilterItem>, Vec<FilterItem>) =
                    filter.iter().cloned().partition(|f| filterable(&f.field));
                for item in &skipped {
                    warn!("Ignoring saved filter on {}, not filterable", item.field);
                }
                query.filter = filter;
            } else {
                debug!("Filtering disabled, saved filter model ignored");
            }
        }
        if let Some(pagination) = &state.pagination
            && self.options.pagination
        {
            query = QueryState {
                page: pagination.page,
                page_size: pagination.page_size,
                ..query
            };
        }
        let grouping = state.grouping.as_ref().map(|g| GroupingState {
            fields: g.fields.iter().filter(|f| known(f)).cloned().collect(),
            expanded: g.expanded.clone(),
        });

        for (field, column) in &state.columns {
            self.columns
                .restore(field, Some(column.width), Some(column.visible));
        }
        if !state.columns.is_empty() {
            self.columns
                .restore_order(|field| state.columns.get(field).map(|c| c.order));
        }
        if let Some(grouping) = grouping {
            self.group_fields = grouping.fields;
            self.expanded = grouping.expanded;
        }
        info!("Restored grid state ({} columns)", state.columns.len());
        self.flush_column_events();
        self.replace_query(query);
        Ok(())
    }
}
