use std::io;

use polars::error::PolarsError;

/// Errors raised synchronously by grid operations.
///
/// None of these leave the grid in a partially updated state: the
/// operation that failed is simply not applied.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GridError {
    #[error("column '{field}' is already registered")]
    DuplicateColumn { field: String },

    #[error("column '{field}' has invalid width bounds (min {min:?}, width {width}, max {max:?})")]
    InvalidWidthBounds {
        field: String,
        min: Option<u32>,
        width: u32,
        max: Option<u32>,
    },

    #[error("unknown column '{field}'")]
    UnknownColumn { field: String },

    #[error("page size must be greater than zero")]
    InvalidPageSize,

    #[error("row {index} is not materialized")]
    RowNotLoaded { index: usize },

    #[error("column '{field}' is not editable")]
    NotEditable { field: String },

    #[error("could not parse '{input}' for column '{field}'")]
    ParseFailed { field: String, input: String },

    #[error("value rejected by the validator of column '{field}'")]
    ValidationFailed { field: String },

    #[error("invalid grid state: {0}")]
    InvalidState(String),
}

impl GridError {
    pub fn unknown_column(field: impl Into<String>) -> Self {
        Self::UnknownColumn {
            field: field.into(),
        }
    }
}

/// Failure reported by a data source for one request.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("data source failed: {message}")]
pub struct SourceError {
    pub message: String,
}

impl SourceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors while loading a data file.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("file not found")]
    FileNotFound,

    #[error("permission denied")]
    PermissionDenied,

    #[error("not a file")]
    NotAFile,

    #[error("unknown file type")]
    UnknownFileType,

    #[error("file has no columns")]
    Empty,

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Polars(#[from] PolarsError),
}
