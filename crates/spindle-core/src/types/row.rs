//! Result rows.

use serde::{Deserialize, Serialize};

use super::Value;
use crate::error::CoreError;

/// One row of a query result: column values in select-list order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    /// Creates a row from its column values.
    #[must_use]
    pub const fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Returns the column values.
    #[inline]
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Returns the number of columns.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the row has no columns.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the value at `index`, if present.
    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Returns the value at `index` as an integer.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ColumnOutOfRange`] if the column does not exist and
    /// [`CoreError::TypeMismatch`] if it is not an `INT64`.
    pub fn get_int(&self, index: usize) -> Result<i64, CoreError> {
        let value = self.column(index)?;
        value.as_int().ok_or(CoreError::TypeMismatch {
            column: index,
            expected: "INT64",
            actual: value.type_name(),
        })
    }

    /// Returns the value at `index` as a string slice.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ColumnOutOfRange`] if the column does not exist and
    /// [`CoreError::TypeMismatch`] if it is not a `STRING`.
    pub fn get_str(&self, index: usize) -> Result<&str, CoreError> {
        let value = self.column(index)?;
        value.as_str().ok_or(CoreError::TypeMismatch {
            column: index,
            expected: "STRING",
            actual: value.type_name(),
        })
    }

    fn column(&self, index: usize) -> Result<&Value, CoreError> {
        self.values.get(index).ok_or(CoreError::ColumnOutOfRange { index, len: self.values.len() })
    }

    /// Consumes the row, returning its values.
    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}

impl FromIterator<Value> for Row {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_accessors() {
        let row = Row::new(vec![Value::Int(1), Value::from("two")]);
        assert_eq!(row.get_int(0).ok(), Some(1));
        assert_eq!(row.get_str(1).ok(), Some("two"));
        assert!(matches!(row.get_int(1), Err(CoreError::TypeMismatch { .. })));
        assert!(matches!(row.get_int(5), Err(CoreError::ColumnOutOfRange { index: 5, .. })));
    }

    #[test]
    fn collect_into_row() {
        let row: Row = (1..=3).map(Value::Int).collect();
        assert_eq!(row.len(), 3);
        assert!(!row.is_empty());
    }
}
