//! # Spindle
//!
//! Transparent abort-and-retry for read-write transactions on databases that use
//! optimistic concurrency control.
//!
//! Such a database may abort a transaction at any statement, or at commit, because a
//! concurrent transaction touched the same data. Spindle hides most of these aborts: it
//! records every statement of a transaction together with what the application saw, and
//! after an abort it replays them on a fresh attempt. When the replay returns exactly the
//! same results, the transaction continues as if nothing happened. When it does not, the
//! application gets [`Error::ConcurrentModification`] instead of silently acting on
//! stale data.
//!
//! Query results are compared through a running SHA-256 checksum over the rows the
//! application has actually read, so rows it never looked at may change freely.
//!
//! # Quick Start
//!
//! ```ignore
//! use spindle::{Connection, Mutation, Value};
//! use spindle_client::backends::MemoryDatabase;
//!
//! let conn = Connection::new(MemoryDatabase::new());
//! let tx = conn.begin_transaction().await?;
//!
//! let mut rows = tx.execute_query("SELECT id, balance FROM accounts WHERE id = 1").await?;
//! while rows.advance().await? {
//!     let balance = rows.value(1)?.as_int().unwrap_or(0);
//!     tx.execute(
//!         spindle::Statement::new("UPDATE accounts SET balance = @b WHERE id = 1")
//!             .bind("b", balance - 10),
//!     )
//!     .await?;
//! }
//! tx.buffer_mutation(
//!     Mutation::insert("audit").with_columns(["account"]).with_row(vec![Value::Int(1)]),
//! )
//! .await?;
//! tx.commit().await?;
//! ```
//!
//! # Modules
//!
//! - [`retry`] - Retry policy and result checksums
//! - [`transaction`] - Retriable transactions, cursors and commands
//! - [`metrics`] - Retry counters
//! - [`config`] - Connection and transaction settings
//! - [`error`] - Error types

// Deny unwrap in library code to ensure proper error handling
#![deny(clippy::unwrap_used)]

pub mod config;
pub mod connection;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod transaction;

pub use config::{Config, TransactionOptions};
pub use connection::{Connection, ConnectionBuilder};
pub use error::{Error, Result};
pub use metrics::{RetryMetrics, RetryMetricsSnapshot};
pub use retry::{ChecksumState, Jitter, RetryPolicy, DEFAULT_MAX_INTERNAL_RETRY_COUNT};
pub use transaction::{ChecksummingResultStream, Command, RetriableTransaction, TransactionState};

pub use spindle_core::{CommitTimestamp, Mutation, MutationKind, Row, Statement, Value};
