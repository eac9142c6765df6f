//! Host supplied capabilities invoked while rendering and editing cells.
//!
//! Every hook is a small trait with a blanket implementation for plain
//! closures, so hosts can pass `|value, row, column| ...` directly. Hooks are
//! stored as `Arc<dyn ...>` inside the column definitions that use them.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::column::Column;
use crate::value::Value;

/// Turns a cell value into the text shown in the cell.
pub trait CellRenderer<R>: Send + Sync {
    fn render(&self, value: &Value, row: &R, column: &Column<R>) -> String;
}

impl<R, F> CellRenderer<R> for F
where
    F: Fn(&Value, &R, &Column<R>) -> String + Send + Sync,
{
    fn render(&self, value: &Value, row: &R, column: &Column<R>) -> String {
        self(value, row, column)
    }
}

/// Produces the header text of a column.
pub trait HeaderRenderer<R>: Send + Sync {
    fn render(&self, column: &Column<R>) -> String;
}

impl<R, F> HeaderRenderer<R> for F
where
    F: Fn(&Column<R>) -> String + Send + Sync,
{
    fn render(&self, column: &Column<R>) -> String {
        self(column)
    }
}

/// Formats a value for display. Runs before the renderer.
pub trait ValueFormatter<R>: Send + Sync {
    fn format(&self, value: &Value, row: &R) -> Value;
}

impl<R, F> ValueFormatter<R> for F
where
    F: Fn(&Value, &R) -> Value + Send + Sync,
{
    fn format(&self, value: &Value, row: &R) -> Value {
        self(value, row)
    }
}

/// Parses user input while editing. `None` rejects the input.
pub trait ValueParser: Send + Sync {
    fn parse(&self, input: &str) -> Option<Value>;
}

impl<F> ValueParser for F
where
    F: Fn(&str) -> Option<Value> + Send + Sync,
{
    fn parse(&self, input: &str) -> Option<Value> {
        self(input)
    }
}

/// Accepts or rejects an edited value.
pub trait CellValidator<R>: Send + Sync {
    fn validate(&self, value: &Value, row: &R) -> bool;
}

impl<R, F> CellValidator<R> for F
where
    F: Fn(&Value, &R) -> bool + Send + Sync,
{
    fn validate(&self, value: &Value, row: &R) -> bool {
        self(value, row)
    }
}

/// Computes style classes from a row.
pub trait ClassProvider<R>: Send + Sync {
    fn classes(&self, row: &R) -> Vec<String>;
}

impl<R, F> ClassProvider<R> for F
where
    F: Fn(&R) -> Vec<String> + Send + Sync,
{
    fn classes(&self, row: &R) -> Vec<String> {
        self(row)
    }
}

/// Cleans rendered text before it reaches the visual layer.
pub trait Sanitizer: Send + Sync {
    fn sanitize(&self, text: &str) -> String;
}

impl<F> Sanitizer for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn sanitize(&self, text: &str) -> String {
        self(text)
    }
}

/// Default sanitizer: folds line breaks into a visible marker and drops the
/// remaining control characters, so a cell always renders on one line.
#[derive(Debug, Default, Clone, Copy)]
pub struct ControlCharSanitizer;

impl Sanitizer for ControlCharSanitizer {
    fn sanitize(&self, text: &str) -> String {
        text.replace("\r\n", " ↵ ")
            .replace('\n', " ↵ ")
            .chars()
            .filter(|c| !c.is_control())
            .collect()
    }
}

/// Classes attached to a cell or a row.
pub enum CellClass<R> {
    Static(BTreeSet<String>),
    Dynamic(Arc<dyn ClassProvider<R>>),
}

impl<R> CellClass<R> {
    pub fn fixed<I, S>(classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CellClass::Static(classes.into_iter().map(Into::into).collect())
    }

    pub fn dynamic<F>(provider: F) -> Self
    where
        F: Fn(&R) -> Vec<String> + Send + Sync + 'static,
    {
        CellClass::Dynamic(Arc::new(provider))
    }

    pub fn resolve(&self, row: &R) -> Vec<String> {
        match self {
            CellClass::Static(classes) => classes.iter().cloned().collect(),
            CellClass::Dynamic(provider) => provider.classes(row),
        }
    }
}

impl<R> Clone for CellClass<R> {
    fn clone(&self) -> Self {
        match self {
            CellClass::Static(classes) => CellClass::Static(classes.clone()),
            CellClass::Dynamic(provider) => CellClass::Dynamic(Arc::clone(provider)),
        }
    }
}

impl<R> fmt::Debug for CellClass<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellClass::Static(classes) => f.debug_tuple("Static").field(classes).finish(),
            CellClass::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Record;

    #[test]
    fn test_control_char_sanitizer() {
        let s = ControlCharSanitizer;
        assert_eq!(s.sanitize("a\nb"), "a ↵ b");
        assert_eq!(s.sanitize("a\r\nb"), "a ↵ b");
        assert_eq!(s.sanitize("bell\u{7}"), "bell");
    }

    #[test]
    fn test_cell_class_resolution() {
        let row = Record::new().set("age", 70);
        let fixed: CellClass<Record> = CellClass::fixed(["num", "right"]);
        assert_eq!(fixed.resolve(&row), vec!["num".to_string(), "right".to_string()]);

        let dynamic: CellClass<Record> = CellClass::dynamic(|row: &Record| {
            match row.get("age").and_then(Value::as_f64) {
                Some(age) if age > 65.0 => vec!["senior".to_string()],
                _ => Vec::new(),
            }
        });
        assert_eq!(dynamic.resolve(&row), vec!["senior".to_string()]);
    }
}
