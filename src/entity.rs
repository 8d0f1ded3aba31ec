//! Entity metadata and partial records.

use std::marker::PhantomData;

use indexmap::IndexMap;

use crate::error::AccessError;
use crate::value::{Row, Value};

/// Static metadata and row decoding for one table-mapped record type.
///
/// Implementations are declared once at startup and never change. `ID` names
/// the generated primary-key column; it must also appear in `COLUMNS`.
pub trait Entity: Sized + Send + Sync {
    const TABLE: &'static str;
    const ID: &'static str;
    const COLUMNS: &'static [&'static str];

    fn from_row(row: &Row) -> Result<Self, AccessError>;
}

/// An ordered subset of an entity's columns with values, used for inserts
/// and updates where not all fields are known.
///
/// Insertion order is preserved and determines parameter order in built
/// statements. Identifier-capturing insert operations write generated values
/// back into the partial; that mutation is part of their contract.
#[derive(Debug, Clone)]
pub struct Partial<T: Entity> {
    values: IndexMap<String, Value>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Partial<T> {
    pub fn new() -> Self {
        Self {
            values: IndexMap::new(),
            _entity: PhantomData,
        }
    }

    /// Sets a column value, replacing any previous value for that column.
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(column.into(), value.into());
        self
    }

    /// Writes a column value in place. Used by the copy-back paths.
    pub fn put(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Column names in insertion order.
    pub fn columns(&self) -> Vec<&str> {
        self.values.keys().map(|k| k.as_str()).collect()
    }

    /// Values in insertion order.
    pub fn values(&self) -> Vec<Value> {
        self.values.values().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Rejects columns that are not part of the entity's declared set.
    pub(crate) fn check_columns(&self) -> Result<(), AccessError> {
        for column in self.values.keys() {
            if !T::COLUMNS.contains(&column.as_str()) {
                return Err(AccessError::invalid(format!(
                    "unknown column `{column}` for table `{}`",
                    T::TABLE
                )));
            }
        }
        Ok(())
    }
}

impl<T: Entity> Default for Partial<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Typed accessors over a decoded [`Row`], for `Entity::from_row`
/// implementations.
pub trait RowGet {
    fn value(&self, column: &str) -> Result<&Value, AccessError>;

    fn int(&self, column: &str) -> Result<i64, AccessError> {
        match self.value(column)? {
            Value::Int(v) => Ok(*v),
            other => Err(AccessError::decode(column, format!("expected int, got {other:?}"))),
        }
    }

    fn opt_int(&self, column: &str) -> Result<Option<i64>, AccessError> {
        match self.value(column)? {
            Value::Null => Ok(None),
            Value::Int(v) => Ok(Some(*v)),
            other => Err(AccessError::decode(column, format!("expected int, got {other:?}"))),
        }
    }

    fn text(&self, column: &str) -> Result<String, AccessError> {
        match self.value(column)? {
            Value::Text(v) => Ok(v.clone()),
            other => Err(AccessError::decode(column, format!("expected text, got {other:?}"))),
        }
    }

    fn opt_text(&self, column: &str) -> Result<Option<String>, AccessError> {
        match self.value(column)? {
            Value::Null => Ok(None),
            Value::Text(v) => Ok(Some(v.clone())),
            other => Err(AccessError::decode(column, format!("expected text, got {other:?}"))),
        }
    }

    fn bool(&self, column: &str) -> Result<bool, AccessError> {
        match self.value(column)? {
            Value::Bool(v) => Ok(*v),
            other => Err(AccessError::decode(column, format!("expected bool, got {other:?}"))),
        }
    }

    fn timestamp(&self, column: &str) -> Result<chrono::DateTime<chrono::Utc>, AccessError> {
        match self.value(column)? {
            Value::Timestamp(v) => Ok(*v),
            other => Err(AccessError::decode(
                column,
                format!("expected timestamp, got {other:?}"),
            )),
        }
    }
}

impl RowGet for Row {
    fn value(&self, column: &str) -> Result<&Value, AccessError> {
        self.get(column)
            .ok_or_else(|| AccessError::decode(column, "column missing from row"))
    }
}
