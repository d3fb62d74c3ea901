//! `Spindle` Client
//!
//! This crate defines the boundary between Spindle's retry machinery and the database
//! wire client that actually runs statements, plus an in-memory implementation of that
//! boundary for tests and simulations.
//!
//! # Overview
//!
//! A database that uses optimistic concurrency control may abort any transaction attempt
//! at any statement or at commit. The wire client reports this with
//! [`ClientError::Aborted`], optionally carrying a server-suggested retry delay. Every
//! other failure is a [`ClientError::Database`] carrying a comparable [`DatabaseError`].
//!
//! # Core Traits
//!
//! - [`DatabaseClient`] - Begins transaction attempts
//! - [`TransactionAttempt`] - One attempt: execute, batch, stream, commit, rollback
//! - [`RowStream`] - Forward-only stream of result rows
//!
//! # Example
//!
//! ```ignore
//! use spindle_client::backends::MemoryDatabase;
//! use spindle_client::{DatabaseClient, TransactionAttempt};
//! use spindle_core::Statement;
//!
//! let db = MemoryDatabase::new();
//! db.put_update_count("UPDATE singers SET active = true", 3);
//!
//! let attempt = db.begin_transaction().await?;
//! let count = attempt.execute(&Statement::new("UPDATE singers SET active = true")).await?;
//! assert_eq!(count, 3);
//! attempt.commit(&[]).await?;
//! ```
//!
//! # Modules
//!
//! - [`engine`] - Client traits and error types
//! - [`backends`] - Concrete client implementations

// Deny unwrap in library code to ensure proper error handling
#![deny(clippy::unwrap_used)]

pub mod backends;
pub mod engine;

pub use engine::{
    Aborted, BatchOutcome, ClientError, ClientResult, DatabaseClient, DatabaseError, ErrorCode,
    RowStream, TransactionAttempt,
};
