//! Operations recorded by a transaction and their replay on a new attempt.
//!
//! Every statement a transaction sends is recorded together with the outcome the
//! application saw. After an abort, the records are replayed in order on a fresh attempt;
//! the transaction may only continue if every replayed outcome equals the recorded one.

use std::sync::Arc;

use spindle_client::{
    Aborted, BatchOutcome, ClientError, DatabaseError, RowStream, TransactionAttempt,
};
use spindle_core::{CoreError, Statement};
use tokio::sync::Mutex;
use tracing::debug;

use super::checksum::ChecksumState;

/// How a replay ended, when it did not match.
#[derive(Debug)]
pub(crate) enum ReplayError {
    /// The new attempt was aborted as well.
    Aborted(Aborted),
    /// The new attempt observed a different outcome.
    Diverged(String),
    /// A row could not be checksummed.
    Encoding(CoreError),
}

impl From<CoreError> for ReplayError {
    fn from(e: CoreError) -> Self {
        Self::Encoding(e)
    }
}

/// One operation of a transaction together with its observed outcome.
#[derive(Debug)]
pub(crate) enum RecordedOperation<S> {
    /// A DML statement that returned a row count.
    SuccessfulUpdate { statement: Statement, row_count: i64 },
    /// A DML statement that failed with a database error.
    FailedUpdate { statement: Statement, error: DatabaseError },
    /// A batch where every statement succeeded.
    SuccessfulBatch { statements: Vec<Statement>, row_counts: Vec<i64> },
    /// A batch that stopped at a failing statement.
    FailedBatch { statements: Vec<Statement>, row_counts: Vec<i64>, error: DatabaseError },
    /// A query whose results were (partially) consumed through a cursor.
    StreamedQuery(Arc<QueryRecord<S>>),
}

impl<S: RowStream> RecordedOperation<S> {
    /// Records a batch outcome as a successful or failed batch.
    pub(crate) fn batch(statements: Vec<Statement>, outcome: BatchOutcome) -> Self {
        match outcome.error {
            None => Self::SuccessfulBatch { statements, row_counts: outcome.row_counts },
            Some(error) => Self::FailedBatch { statements, row_counts: outcome.row_counts, error },
        }
    }

    /// Short description for logs.
    pub(crate) const fn kind(&self) -> &'static str {
        match self {
            Self::SuccessfulUpdate { .. } => "successful update",
            Self::FailedUpdate { .. } => "failed update",
            Self::SuccessfulBatch { .. } => "successful batch",
            Self::FailedBatch { .. } => "failed batch",
            Self::StreamedQuery(_) => "streamed query",
        }
    }

    /// Re-run this operation on `attempt` and compare the outcome with the recorded one.
    ///
    /// `generation` identifies `attempt`; a matching query record adopts it together
    /// with the fresh stream.
    pub(crate) async fn replay<A>(&self, attempt: &A, generation: u64) -> Result<(), ReplayError>
    where
        A: TransactionAttempt<Stream = S>,
    {
        match self {
            Self::SuccessfulUpdate { statement, row_count } => {
                match attempt.execute(statement).await {
                    Ok(count) if count == *row_count => Ok(()),
                    Ok(count) => Err(ReplayError::Diverged(format!(
                        "update count of `{statement}` changed from {row_count} to {count}"
                    ))),
                    Err(ClientError::Aborted(a)) => Err(ReplayError::Aborted(a)),
                    Err(ClientError::Database(e)) => Err(ReplayError::Diverged(format!(
                        "`{statement}` succeeded before and now fails with {e}"
                    ))),
                }
            }
            Self::FailedUpdate { statement, error } => match attempt.execute(statement).await {
                Ok(count) => Err(ReplayError::Diverged(format!(
                    "`{statement}` failed before with {error} and now updates {count} rows"
                ))),
                Err(ClientError::Aborted(a)) => Err(ReplayError::Aborted(a)),
                Err(ClientError::Database(e)) if e == *error => Ok(()),
                Err(ClientError::Database(e)) => Err(ReplayError::Diverged(format!(
                    "`{statement}` failed before with {error} and now fails with {e}"
                ))),
            },
            Self::SuccessfulBatch { statements, row_counts } => {
                compare_batch(attempt, statements, row_counts, None).await
            }
            Self::FailedBatch { statements, row_counts, error } => {
                compare_batch(attempt, statements, row_counts, Some(error)).await
            }
            Self::StreamedQuery(record) => record.replay(attempt, generation).await,
        }
    }
}

async fn compare_batch<A: TransactionAttempt>(
    attempt: &A,
    statements: &[Statement],
    row_counts: &[i64],
    error: Option<&DatabaseError>,
) -> Result<(), ReplayError> {
    let outcome = match attempt.execute_batch(statements).await {
        Ok(outcome) => outcome,
        Err(ClientError::Aborted(a)) => return Err(ReplayError::Aborted(a)),
        Err(ClientError::Database(e)) => BatchOutcome::partial(Vec::new(), e),
    };
    if outcome.row_counts != row_counts {
        return Err(ReplayError::Diverged(format!(
            "batch row counts changed from {row_counts:?} to {:?}",
            outcome.row_counts
        )));
    }
    if outcome.error.as_ref() != error {
        return Err(ReplayError::Diverged(format!(
            "batch outcome changed from {} to {}",
            describe(error),
            describe(outcome.error.as_ref())
        )));
    }
    Ok(())
}

fn describe(error: Option<&DatabaseError>) -> String {
    error.map_or_else(|| "success".to_owned(), |e| format!("failure {e}"))
}

/// A streamed query shared between the transaction's record list and its cursor.
#[derive(Debug)]
pub(crate) struct QueryRecord<S> {
    pub(crate) statement: Statement,
    pub(crate) state: Mutex<QueryState<S>>,
}

/// What the cursor has consumed so far, plus the stream it reads from.
#[derive(Debug)]
pub(crate) struct QueryState<S> {
    /// The live stream, `None` once the query has failed.
    pub(crate) stream: Option<S>,
    /// Generation of the attempt that owns `stream`.
    pub(crate) generation: u64,
    /// Checksum over every advance result returned to the application.
    pub(crate) checksum: ChecksumState,
    /// Number of advances performed, including one that failed.
    pub(crate) consumed: usize,
    /// The failure the application saw, if the query failed.
    pub(crate) error: Option<DatabaseError>,
}

impl<S: RowStream> QueryRecord<S> {
    /// A query whose stream opened successfully.
    pub(crate) fn open(statement: Statement, stream: S, generation: u64) -> Self {
        Self::with_state(statement, Some(stream), None, generation)
    }

    /// A query that failed before returning a stream.
    pub(crate) fn failed(statement: Statement, error: DatabaseError, generation: u64) -> Self {
        Self::with_state(statement, None, Some(error), generation)
    }

    fn with_state(
        statement: Statement,
        stream: Option<S>,
        error: Option<DatabaseError>,
        generation: u64,
    ) -> Self {
        Self {
            statement,
            state: Mutex::new(QueryState {
                stream,
                generation,
                checksum: ChecksumState::new(),
                consumed: 0,
                error,
            }),
        }
    }

    /// Re-execute the query, advance exactly as far as the cursor did, and compare.
    ///
    /// On a match the cursor is moved onto the fresh stream, positioned where the old one
    /// was. Rows beyond that point are never read here.
    async fn replay<A>(&self, attempt: &A, generation: u64) -> Result<(), ReplayError>
    where
        A: TransactionAttempt<Stream = S>,
    {
        let mut state = self.state.lock().await;
        let mut checksum = ChecksumState::new();
        let mut error = None;
        let mut stream = match attempt.execute_streaming(&self.statement).await {
            Ok(stream) => Some(stream),
            Err(ClientError::Aborted(a)) => return Err(ReplayError::Aborted(a)),
            Err(ClientError::Database(e)) => {
                error = Some(e);
                None
            }
        };

        if let Some(fresh) = stream.as_mut() {
            for _ in 0..state.consumed {
                match fresh.next().await {
                    Ok(row) => checksum.update(row.as_ref())?,
                    Err(ClientError::Aborted(a)) => return Err(ReplayError::Aborted(a)),
                    Err(ClientError::Database(e)) => {
                        error = Some(e);
                        break;
                    }
                }
            }
        }

        if checksum != state.checksum {
            return Err(ReplayError::Diverged(format!(
                "results of `{}` changed within the first {} rows read",
                self.statement, state.consumed
            )));
        }
        if error != state.error {
            return Err(ReplayError::Diverged(format!(
                "query `{}` ended with {} before and {} now",
                self.statement,
                describe(state.error.as_ref()),
                describe(error.as_ref())
            )));
        }

        debug!(sql = %self.statement.sql(), consumed = state.consumed, "query replay matched");
        state.stream = if error.is_some() { None } else { stream };
        state.generation = generation;
        Ok(())
    }
}
