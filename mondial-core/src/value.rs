//! Store-level values and rows.
//!
//! [`SqlValue`] is used both for bind values in a query plan and for cells in
//! a result row. [`Row`] keeps its columns in select order and offers typed
//! accessors that report missing columns and type mismatches instead of
//! panicking.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{MappingError, MondialResult};

/// A single SQL value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Short type name used in error messages and logs.
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Int(_) => "int",
            SqlValue::Float(_) => "float",
            SqlValue::Text(_) => "text",
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Int(v) => write!(f, "{}", v),
            SqlValue::Float(v) => write!(f, "{}", v),
            SqlValue::Text(v) => write!(f, "'{}'", v.replace('\'', "''")),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Int(value as i64)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Float(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// A result row: column name to value, in select order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    columns: Vec<(String, SqlValue)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column append.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.push(column, value);
        self
    }

    /// Append a column. A repeated name replaces the earlier value.
    pub fn push(&mut self, column: impl Into<String>, value: impl Into<SqlValue>) {
        let column = column.into();
        let value = value.into();
        match self.columns.iter_mut().find(|(name, _)| *name == column) {
            Some(slot) => slot.1 = value,
            None => self.columns.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    fn require(&self, column: &str) -> MondialResult<&SqlValue> {
        self.get(column).ok_or_else(|| {
            MappingError::MissingColumn {
                column: column.to_string(),
            }
            .into()
        })
    }

    fn mismatch(column: &str, expected: &str) -> crate::MondialError {
        MappingError::TypeMismatch {
            column: column.to_string(),
            expected: expected.to_string(),
        }
        .into()
    }

    /// Text column that must be present and non-null.
    pub fn text(&self, column: &str) -> MondialResult<String> {
        self.opt_text(column)?
            .ok_or_else(|| Self::mismatch(column, "non-null text"))
    }

    /// Nullable text column. The column itself must exist.
    pub fn opt_text(&self, column: &str) -> MondialResult<Option<String>> {
        match self.require(column)? {
            SqlValue::Null => Ok(None),
            SqlValue::Text(v) => Ok(Some(v.clone())),
            _ => Err(Self::mismatch(column, "text")),
        }
    }

    /// Nullable integer column. Finite floats are truncated toward zero, so a
    /// fractional `NUMERIC` cell does not fail the row.
    pub fn opt_int(&self, column: &str) -> MondialResult<Option<i64>> {
        match self.require(column)? {
            SqlValue::Null => Ok(None),
            SqlValue::Int(v) => Ok(Some(*v)),
            SqlValue::Float(v) if v.is_finite() => Ok(Some(v.trunc() as i64)),
            _ => Err(Self::mismatch(column, "int")),
        }
    }

    /// Nullable float column. Integers widen.
    pub fn opt_float(&self, column: &str) -> MondialResult<Option<f64>> {
        match self.require(column)? {
            SqlValue::Null => Ok(None),
            SqlValue::Float(v) => Ok(Some(*v)),
            SqlValue::Int(v) => Ok(Some(*v as f64)),
            _ => Err(Self::mismatch(column, "float")),
        }
    }
}

impl FromIterator<(String, SqlValue)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, SqlValue)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (column, value) in iter {
            row.push(column, value);
        }
        row
    }
}
