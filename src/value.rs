//! Cell values and row records.
//!
//! The grid never owns the shape of a row. It only asks a row for the values
//! of the fields its columns are bound to, through the [`RowData`] trait.
//! [`Record`] is the map based implementation used by the bundled data
//! source, the file loader and the viewer.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A dynamic cell value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
        }
    }

    /// Parses `input` into a value of the same kind as `self`.
    ///
    /// Used as the default value parser for edits. Empty input becomes
    /// `Null`; a `Null` template keeps the input as a string.
    pub fn parse_like(&self, input: &str) -> Option<Value> {
        let input = input.trim();
        if input.is_empty() {
            return Some(Value::Null);
        }
        match self {
            Value::Bool(_) => input.parse().ok().map(Value::Bool),
            Value::Int(_) => input.parse().ok().map(Value::Int),
            Value::Float(_) => input.parse().ok().map(Value::Float),
            Value::Null | Value::String(_) => Some(Value::String(input.to_string())),
        }
    }

    /// Reads free text as the narrowest value it spells: integer, float,
    /// boolean, else string.
    pub fn infer(input: &str) -> Value {
        let input = input.trim();
        if let Ok(i) = input.parse() {
            Value::Int(i)
        } else if let Ok(f) = input.parse() {
            Value::Float(f)
        } else if let Ok(b) = input.parse() {
            Value::Bool(b)
        } else {
            Value::String(input.to_string())
        }
    }

    /// Ordering used for sorting.
    ///
    /// Numbers (ints and floats mixed) come first, then booleans, then
    /// strings. Nulls always sort last, whatever the direction; the caller
    /// only reverses the non null part.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        if let (Some(a), Some(b)) = (self.as_f64(), other.as_f64()) {
            return a.partial_cmp(&b).unwrap_or(Ordering::Equal);
        }
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Int(_) | Value::Float(_) => 0,
            Value::Bool(_) => 1,
            Value::String(_) => 2,
            Value::Null => 3,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "∅"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Stable identity of a row, as handed out by a data source.
pub type RowKey = String;

/// A row as seen by the grid.
pub trait RowData: Clone {
    /// Returns the value bound to `field`, `None` if the row has no such field.
    fn value(&self, field: &str) -> Option<Value>;

    /// Writes an edited value back into the row. Returns `false` if the
    /// row does not accept the field.
    fn set_value(&mut self, field: &str, value: Value) -> bool;

    /// Stable key, if the source provides one.
    fn row_key(&self) -> Option<RowKey> {
        None
    }
}

/// A dynamic row record holding its values by field name.
///
/// ```
/// use tvgrid::{Record, RowData, Value};
///
/// let record = Record::new().set("name", "Ada").set("age", 36);
/// assert_eq!(record.value("age"), Some(Value::Int(36)));
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    key: Option<RowKey>,
    fields: HashMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(key: impl Into<RowKey>) -> Self {
        Self {
            key: Some(key.into()),
            fields: HashMap::new(),
        }
    }

    /// Builder style setter.
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn fields(&self) -> &HashMap<String, Value> {
        &self.fields
    }
}

impl RowData for Record {
    fn value(&self, field: &str) -> Option<Value> {
        self.fields.get(field).cloned()
    }

    fn set_value(&mut self, field: &str, value: Value) -> bool {
        match self.fields.get_mut(field) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    fn row_key(&self) -> Option<RowKey> {
        self.key.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_cmp_mixes_ints_and_floats() {
        assert_eq!(Value::Int(2).sort_cmp(&Value::Float(1.5)), Ordering::Greater);
        assert_eq!(Value::Float(2.0).sort_cmp(&Value::Int(2)), Ordering::Equal);
    }

    #[test]
    fn test_sort_cmp_numbers_before_strings_and_nulls_last() {
        assert_eq!(Value::Int(99).sort_cmp(&"a".into()), Ordering::Less);
        assert_eq!(Value::from("z").sort_cmp(&Value::Null), Ordering::Less);
        assert_eq!(Value::Null.sort_cmp(&Value::Int(0)), Ordering::Greater);
    }

    #[test]
    fn test_parse_like_keeps_the_type() {
        assert_eq!(Value::Int(1).parse_like(" 42 "), Some(Value::Int(42)));
        assert_eq!(Value::Int(1).parse_like("4.2"), None);
        assert_eq!(Value::Float(1.0).parse_like("4.5"), Some(Value::Float(4.5)));
        assert_eq!(Value::from("a").parse_like("b"), Some(Value::from("b")));
        assert_eq!(Value::Bool(true).parse_like(""), Some(Value::Null));
    }

    #[test]
    fn test_infer_picks_the_narrowest_type() {
        assert_eq!(Value::infer("30"), Value::Int(30));
        assert_eq!(Value::infer(" -1.5"), Value::Float(-1.5));
        assert_eq!(Value::infer("true"), Value::Bool(true));
        assert_eq!(Value::infer("N/A"), Value::from("N/A"));
    }

    #[test]
    fn test_untagged_json() {
        let values: Vec<Value> = serde_json::from_str(r#"[null, true, 30, 1.5, "N/A"]"#).unwrap();
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Bool(true),
                Value::Int(30),
                Value::Float(1.5),
                Value::from("N/A")
            ]
        );
    }

    #[test]
    fn test_record_set_value_only_known_fields() {
        let mut record = Record::with_key("r1").set("age", 3);
        assert!(record.set_value("age", Value::Int(4)));
        assert!(!record.set_value("missing", Value::Int(4)));
        assert_eq!(record.get("age"), Some(&Value::Int(4)));
        assert_eq!(record.row_key().as_deref(), Some("r1"));
    }
}
