//! Sort, filter and pagination state, and how it applies to rows.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::value::{RowData, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortItem {
    pub field: String,
    pub direction: SortDirection,
}

impl SortItem {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterType {
    Equals,
    Contains,
    StartsWith,
    EndsWith,
    LessThan,
    GreaterThan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterItem {
    pub field: String,
    #[serde(rename = "type")]
    pub kind: FilterType,
    pub value: Value,
}

impl FilterItem {
    pub fn new(field: impl Into<String>, kind: FilterType, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            kind,
            value: value.into(),
        }
    }
}

/// How the string comparisons of a filter treat letter case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaseSensitivity {
    Sensitive,
    #[default]
    Insensitive,
}

impl CaseSensitivity {
    fn fold(self, s: &str) -> String {
        match self {
            CaseSensitivity::Sensitive => s.to_string(),
            CaseSensitivity::Insensitive => s.to_lowercase(),
        }
    }
}

/// What is currently asked of the data source.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryState {
    pub sort: Vec<SortItem>,
    pub filter: Vec<FilterItem>,
    pub page: usize,
    pub page_size: usize,
}

impl QueryState {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            ..Default::default()
        }
    }
}

/// Drops repeated fields from a sort model, keeping the first occurrence.
pub fn dedup_sort(items: &[SortItem]) -> Vec<SortItem> {
    let mut seen: Vec<&str> = Vec::with_capacity(items.len());
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        if !seen.contains(&item.field.as_str()) {
            seen.push(&item.field);
            out.push(item.clone());
        }
    }
    out
}

/// Compares two rows under a sort model. The first item is the primary key.
pub fn compare_rows<R: RowData>(a: &R, b: &R, sort: &[SortItem]) -> Ordering {
    for item in sort {
        let va = a.value(&item.field).unwrap_or_default();
        let vb = b.value(&item.field).unwrap_or_default();
        let ord = match (va.is_null(), vb.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => match item.direction {
                SortDirection::Asc => va.sort_cmp(&vb),
                SortDirection::Desc => vb.sort_cmp(&va),
            },
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// True if the row passes every filter item.
///
/// A value that cannot be compared with the filter value (a missing field,
/// a null, or a string against a number for `LessThan`/`GreaterThan`) fails
/// its item; it never aborts the pass.
pub fn matches_all<R: RowData>(row: &R, filter: &[FilterItem], case: CaseSensitivity) -> bool {
    filter.iter().all(|item| match row.value(&item.field) {
        Some(value) => matches(&value, item, case),
        None => false,
    })
}

pub fn matches(value: &Value, item: &FilterItem, case: CaseSensitivity) -> bool {
    if value.is_null() || item.value.is_null() {
        return false;
    }
    let text = || case.fold(&value.to_string());
    let needle = || case.fold(&item.value.to_string());
    match item.kind {
        FilterType::Equals => match (value.as_f64(), item.value.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => text() == needle(),
        },
        FilterType::Contains => text().contains(&needle()),
        FilterType::StartsWith => text().starts_with(&needle()),
        FilterType::EndsWith => text().ends_with(&needle()),
        FilterType::LessThan => compare(value, &item.value, case) == Some(Ordering::Less),
        FilterType::GreaterThan => compare(value, &item.value, case) == Some(Ordering::Greater),
    }
}

fn compare(value: &Value, target: &Value, case: CaseSensitivity) -> Option<Ordering> {
    match (value, target) {
        (Value::String(a), Value::String(b)) => Some(case.fold(a).cmp(&case.fold(b))),
        _ => match (value.as_f64(), target.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => {
                trace!(
                    "Cannot compare {} with {}",
                    value.type_name(),
                    target.type_name()
                );
                None
            }
        },
    }
}
