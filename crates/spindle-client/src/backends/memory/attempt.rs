//! Attempt and stream handles for the in-memory database.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use spindle_core::{CommitTimestamp, Mutation, Row, Statement};

use super::script::{Request, StatementResult};
use super::{AttemptState, Inner};
use crate::engine::{
    Aborted, BatchOutcome, ClientResult, DatabaseError, RowStream, TransactionAttempt,
};

fn unregistered(statement: &Statement) -> DatabaseError {
    DatabaseError::invalid_argument(format!("no result registered for statement: {}", statement.sql()))
}

/// One attempt against a [`MemoryDatabase`](super::MemoryDatabase).
#[derive(Debug)]
pub struct MemoryAttempt {
    id: u64,
    inner: Arc<Mutex<Inner>>,
}

impl MemoryAttempt {
    pub(crate) const fn new(id: u64, inner: Arc<Mutex<Inner>>) -> Self {
        Self { id, inner }
    }

    /// Checks the attempt is usable and consumes a queued statement abort, if any.
    fn begin_statement(&self, inner: &mut Inner) -> ClientResult<()> {
        inner.check_active(self.id)?;
        if let Some(aborted) = inner.statement_aborts.pop_front() {
            return Err(inner.abort(self.id, aborted).into());
        }
        Ok(())
    }
}

#[async_trait]
impl TransactionAttempt for MemoryAttempt {
    type Stream = MemoryRowStream;

    fn id(&self) -> u64 {
        self.id
    }

    async fn execute(&self, statement: &Statement) -> ClientResult<i64> {
        let mut inner = self.inner.lock();
        inner.requests.push(Request::Execute { attempt_id: self.id, statement: statement.clone() });
        self.begin_statement(&mut inner)?;
        match inner.results.get(statement.sql()) {
            Some(StatementResult::UpdateCount(count)) => Ok(*count),
            Some(StatementResult::Error(error)) => Err(error.clone().into()),
            Some(StatementResult::Rows(_) | StatementResult::RowsThenError { .. }) => {
                Err(DatabaseError::invalid_argument(format!(
                    "statement returns rows, not an update count: {}",
                    statement.sql()
                ))
                .into())
            }
            None => Err(unregistered(statement).into()),
        }
    }

    async fn execute_batch(&self, statements: &[Statement]) -> ClientResult<BatchOutcome> {
        let mut inner = self.inner.lock();
        inner.requests.push(Request::ExecuteBatch {
            attempt_id: self.id,
            statements: statements.to_vec(),
        });
        self.begin_statement(&mut inner)?;
        let mut row_counts = Vec::with_capacity(statements.len());
        for statement in statements {
            match inner.results.get(statement.sql()) {
                Some(StatementResult::UpdateCount(count)) => row_counts.push(*count),
                Some(StatementResult::Error(error)) => {
                    return Ok(BatchOutcome::partial(row_counts, error.clone()));
                }
                Some(_) => {
                    let error = DatabaseError::invalid_argument(format!(
                        "batch contains a query: {}",
                        statement.sql()
                    ));
                    return Ok(BatchOutcome::partial(row_counts, error));
                }
                None => return Ok(BatchOutcome::partial(row_counts, unregistered(statement))),
            }
        }
        Ok(BatchOutcome::complete(row_counts))
    }

    async fn execute_streaming(&self, statement: &Statement) -> ClientResult<MemoryRowStream> {
        let mut inner = self.inner.lock();
        inner.requests.push(Request::ExecuteStreaming {
            attempt_id: self.id,
            statement: statement.clone(),
        });
        self.begin_statement(&mut inner)?;
        let (rows, error) = match inner.results.get(statement.sql()) {
            Some(StatementResult::Rows(rows)) => (rows.clone(), None),
            Some(StatementResult::RowsThenError { rows, error }) => {
                (rows.clone(), Some(error.clone()))
            }
            Some(StatementResult::Error(error)) => (Vec::new(), Some(error.clone())),
            Some(StatementResult::UpdateCount(_)) => (
                Vec::new(),
                Some(DatabaseError::invalid_argument(format!(
                    "statement is not a query: {}",
                    statement.sql()
                ))),
            ),
            None => (Vec::new(), Some(unregistered(statement))),
        };
        let abort_after = inner.stream_aborts.remove(statement.sql());
        Ok(MemoryRowStream {
            attempt_id: self.id,
            inner: Arc::clone(&self.inner),
            rows: rows.into(),
            returned: 0,
            error,
            abort_after,
        })
    }

    async fn commit(&self, mutations: &[Mutation]) -> ClientResult<CommitTimestamp> {
        let mut inner = self.inner.lock();
        inner.requests.push(Request::Commit { attempt_id: self.id, mutations: mutations.len() });
        inner.check_active(self.id)?;
        if let Some(aborted) = inner.commit_aborts.pop_front() {
            return Err(inner.abort(self.id, aborted).into());
        }
        Ok(inner.commit(self.id, mutations))
    }

    async fn rollback(&self) -> ClientResult<()> {
        let mut inner = self.inner.lock();
        inner.requests.push(Request::Rollback { attempt_id: self.id });
        if matches!(inner.attempts.get(&self.id), Some(AttemptState::Active)) {
            inner.attempts.insert(self.id, AttemptState::RolledBack);
        }
        Ok(())
    }
}

/// A result stream over rows captured when the query was executed.
#[derive(Debug)]
pub struct MemoryRowStream {
    attempt_id: u64,
    inner: Arc<Mutex<Inner>>,
    rows: VecDeque<Row>,
    returned: usize,
    error: Option<DatabaseError>,
    abort_after: Option<(usize, Aborted)>,
}

#[async_trait]
impl RowStream for MemoryRowStream {
    async fn next(&mut self) -> ClientResult<Option<Row>> {
        let mut inner = self.inner.lock();
        if let Some(AttemptState::Aborted(aborted)) = inner.attempts.get(&self.attempt_id) {
            return Err(aborted.clone().into());
        }
        if self.abort_after.as_ref().is_some_and(|(after, _)| *after == self.returned) {
            if let Some((_, aborted)) = self.abort_after.take() {
                return Err(inner.abort(self.attempt_id, aborted).into());
            }
        }
        drop(inner);

        if let Some(row) = self.rows.pop_front() {
            self.returned += 1;
            return Ok(Some(row));
        }
        match &self.error {
            Some(error) => Err(error.clone().into()),
            None => Ok(None),
        }
    }
}
