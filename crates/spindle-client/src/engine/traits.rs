//! Core client traits.
//!
//! All traits are async through [`async_trait`] and use associated types for the
//! attempt and stream handles, so the retry layer stays generic over the backend.

use std::sync::Arc;

use async_trait::async_trait;
use spindle_core::{CommitTimestamp, Mutation, Row, Statement};

use super::{ClientResult, DatabaseError};

/// Outcome of a batch of DML statements.
///
/// Statements run in order. If statement `k` fails, `row_counts` holds the counts of
/// statements `0..k` and `error` holds the failure of statement `k`; later statements
/// are never attempted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchOutcome {
    /// Row counts of the statements that succeeded, in order.
    pub row_counts: Vec<i64>,
    /// The failure that stopped the batch, if any.
    pub error: Option<DatabaseError>,
}

impl BatchOutcome {
    /// A batch where every statement succeeded.
    #[must_use]
    pub const fn complete(row_counts: Vec<i64>) -> Self {
        Self { row_counts, error: None }
    }

    /// A batch that stopped at the statement after the last row count.
    #[must_use]
    pub const fn partial(row_counts: Vec<i64>, error: DatabaseError) -> Self {
        Self { row_counts, error: Some(error) }
    }

    /// Returns `true` if every statement succeeded.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// A database client that can begin read-write transaction attempts.
///
/// Implementations must be thread-safe (`Send + Sync`).
///
/// # Example
///
/// ```ignore
/// use spindle_client::{DatabaseClient, TransactionAttempt};
///
/// async fn example<C: DatabaseClient>(client: &C) -> ClientResult<()> {
///     let attempt = client.begin_transaction().await?;
///     attempt.execute(&Statement::new("DELETE FROM t WHERE true")).await?;
///     attempt.commit(&[]).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// The attempt handle type for this client.
    type Attempt: TransactionAttempt;

    /// Begin a new read-write transaction attempt.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Database`](super::ClientError::Database) if the server
    /// refuses to start a transaction.
    async fn begin_transaction(&self) -> ClientResult<Self::Attempt>;
}

/// One attempt of a read-write transaction.
///
/// Any call may fail with [`ClientError::Aborted`](super::ClientError::Aborted). Once an
/// attempt has been aborted, it stays aborted.
#[async_trait]
pub trait TransactionAttempt: Send + Sync + 'static {
    /// The stream type returned by [`execute_streaming`](Self::execute_streaming).
    type Stream: RowStream;

    /// Server-side identifier of this attempt, for logging.
    fn id(&self) -> u64;

    /// Execute a DML statement, returning the number of affected rows.
    async fn execute(&self, statement: &Statement) -> ClientResult<i64>;

    /// Execute a batch of DML statements in order.
    ///
    /// A statement failure is reported in the returned [`BatchOutcome`], not as an `Err`.
    /// `Err` is reserved for aborts and for failures of the request as a whole.
    async fn execute_batch(&self, statements: &[Statement]) -> ClientResult<BatchOutcome>;

    /// Execute a query and stream its rows.
    async fn execute_streaming(&self, statement: &Statement) -> ClientResult<Self::Stream>;

    /// Commit the attempt together with the given buffered mutations.
    async fn commit(&self, mutations: &[Mutation]) -> ClientResult<CommitTimestamp>;

    /// Roll back the attempt.
    async fn rollback(&self) -> ClientResult<()>;
}

/// A forward-only stream of result rows.
#[async_trait]
pub trait RowStream: Send + 'static {
    /// Move to the next row.
    ///
    /// Returns `Ok(None)` at the end of the stream. Calling again after the end keeps
    /// returning `Ok(None)`.
    async fn next(&mut self) -> ClientResult<Option<Row>>;
}

// ============================================================================
// Blanket Implementations
// ============================================================================

/// Implement `DatabaseClient` for `Arc<C>` to allow shared ownership of clients.
#[async_trait]
impl<C: DatabaseClient> DatabaseClient for Arc<C> {
    type Attempt = C::Attempt;

    async fn begin_transaction(&self) -> ClientResult<Self::Attempt> {
        (**self).begin_transaction().await
    }
}
