//! `Spindle` Core
//!
//! This crate provides the fundamental types shared by the Spindle client crates.
//!
//! # Overview
//!
//! - **Values**: [`Value`] enum covering the scalar and array column types a query can return
//! - **Rows**: [`Row`] is an ordered list of column values produced by a query
//! - **Statements**: [`Statement`] is SQL text plus named parameters, compared structurally
//! - **Mutations**: [`Mutation`] is a buffered write that is sent with the commit request
//! - **Timestamps**: [`CommitTimestamp`] is the server-assigned commit time
//!
//! # Example
//!
//! ```
//! use spindle_core::{Row, Statement, Value};
//!
//! let stmt = Statement::new("UPDATE accounts SET balance = balance - @amount WHERE id = @id")
//!     .bind("amount", 100i64)
//!     .bind("id", 7i64);
//! assert_eq!(stmt.param("id"), Some(&Value::Int(7)));
//!
//! let row = Row::new(vec![Value::from(7i64), Value::from("alice")]);
//! assert_eq!(row.get(1).and_then(Value::as_str), Some("alice"));
//! ```
//!
//! # Modules
//!
//! - [`types`] - Core data types ([`Value`], [`Row`], [`Statement`], [`Mutation`])
//! - [`encoding`] - Deterministic binary encoding used for result checksums
//! - [`error`] - Error types ([`CoreError`])

// Deny unwrap in library code to ensure proper error handling
#![deny(clippy::unwrap_used)]

pub mod encoding;
pub mod error;
pub mod types;

pub use error::CoreError;
pub use types::{CommitTimestamp, Mutation, MutationKind, Row, Statement, Value};
