//! Error types for the core crate.

use thiserror::Error;

/// Errors raised while encoding values or reading typed columns.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A string, byte array, array or row is too long for its 32-bit length prefix.
    #[error("{what} of length {len} cannot be encoded")]
    TooLong {
        /// What was being encoded.
        what: &'static str,
        /// Its length.
        len: usize,
    },

    /// A column holds a different type than the one requested.
    #[error("column {column} is {actual}, not {expected}")]
    TypeMismatch {
        /// Column index.
        column: usize,
        /// The requested type.
        expected: &'static str,
        /// The stored type.
        actual: &'static str,
    },

    /// A column index past the end of the row.
    #[error("column index {index} out of range for row with {len} columns")]
    ColumnOutOfRange {
        /// The requested index.
        index: usize,
        /// Number of columns in the row.
        len: usize,
    },
}
