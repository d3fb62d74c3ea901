//! Buffered write mutations.
//!
//! Mutations are not executed when they are created. A transaction keeps them in memory
//! and sends all of them together with the commit request, so they are never part of a
//! replay: every commit attempt simply sends the same list again.

use serde::{Deserialize, Serialize};

use super::Value;

/// The kind of write a [`Mutation`] performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationKind {
    /// Insert a new row; fails if the row already exists.
    Insert,
    /// Update an existing row; fails if the row does not exist.
    Update,
    /// Insert a row or update it if it already exists.
    InsertOrUpdate,
    /// Insert a row or replace all of its columns if it already exists.
    Replace,
    /// Delete the rows identified by the given key values.
    Delete,
}

/// A single buffered write against one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    /// What the mutation does.
    pub kind: MutationKind,
    /// The target table.
    pub table: String,
    /// Column names. For deletes these are the key columns.
    pub columns: Vec<String>,
    /// One entry per affected row, each with one value per column.
    pub rows: Vec<Vec<Value>>,
}

impl Mutation {
    /// Creates an empty mutation of the given kind.
    #[must_use]
    pub fn new(kind: MutationKind, table: impl Into<String>) -> Self {
        Self { kind, table: table.into(), columns: Vec::new(), rows: Vec::new() }
    }

    /// Creates an insert mutation.
    #[must_use]
    pub fn insert(table: impl Into<String>) -> Self {
        Self::new(MutationKind::Insert, table)
    }

    /// Creates an update mutation.
    #[must_use]
    pub fn update(table: impl Into<String>) -> Self {
        Self::new(MutationKind::Update, table)
    }

    /// Creates an insert-or-update mutation.
    #[must_use]
    pub fn insert_or_update(table: impl Into<String>) -> Self {
        Self::new(MutationKind::InsertOrUpdate, table)
    }

    /// Creates a replace mutation.
    #[must_use]
    pub fn replace(table: impl Into<String>) -> Self {
        Self::new(MutationKind::Replace, table)
    }

    /// Creates a delete mutation.
    #[must_use]
    pub fn delete(table: impl Into<String>) -> Self {
        Self::new(MutationKind::Delete, table)
    }

    /// Sets the column names.
    #[must_use]
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Adds one row of values.
    #[must_use]
    pub fn with_row(mut self, values: Vec<Value>) -> Self {
        self.rows.push(values);
        self
    }

    /// Returns `true` if every row has exactly one value per column.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        !self.table.is_empty() && self.rows.iter().all(|r| r.len() == self.columns.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_columns_and_rows() {
        let m = Mutation::insert("singers")
            .with_columns(["id", "name"])
            .with_row(vec![Value::Int(1), Value::from("Alice")]);
        assert_eq!(m.kind, MutationKind::Insert);
        assert_eq!(m.columns, vec!["id".to_owned(), "name".to_owned()]);
        assert!(m.is_well_formed());
    }

    #[test]
    fn row_width_must_match_columns() {
        let m = Mutation::delete("singers").with_columns(["id"]).with_row(vec![]);
        assert!(!m.is_well_formed());
    }
}
