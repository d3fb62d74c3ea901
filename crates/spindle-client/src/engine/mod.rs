//! Client traits and error types.
//!
//! This module defines the traits a database wire client implements:
//!
//! - [`DatabaseClient`] - Main entry point for beginning transaction attempts
//! - [`TransactionAttempt`] - A single attempt of a read-write transaction
//! - [`RowStream`] - Forward-only iteration over query results
//!
//! # Error Handling
//!
//! All operations return [`ClientResult<T>`] which is an alias for
//! `Result<T, ClientError>`. See [`ClientError`] for the possible error variants.

mod error;
mod traits;

pub use error::{Aborted, ClientError, ClientResult, DatabaseError, ErrorCode};
pub use traits::{BatchOutcome, DatabaseClient, RowStream, TransactionAttempt};
