//! Scripted in-memory database.
//!
//! [`MemoryDatabase`] does not parse SQL. Each statement's outcome is registered up front,
//! keyed by SQL text, and can be changed at any time to simulate concurrent writers.
//! Aborts are injected explicitly: on the next statement, on the next commit, or in the
//! middle of a result stream. Every request is logged for later assertions.
//!
//! Query results are captured when the query is executed, so changing a registered result
//! only affects executions that start afterwards. That is exactly what a concurrent
//! writer looks like to a retried transaction.
//!
//! # Example
//!
//! ```ignore
//! use spindle_client::backends::MemoryDatabase;
//!
//! let db = MemoryDatabase::new();
//! db.put_update_count("UPDATE t SET x = 1 WHERE id = 1", 1);
//! db.put_query_rows("SELECT x FROM t", vec![Row::new(vec![Value::Int(1)])]);
//!
//! // The next commit fails with an abort; the retried commit succeeds.
//! db.abort_next_commit();
//! ```

mod attempt;
mod script;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use spindle_core::{CommitTimestamp, Mutation, Row};
use tracing::trace;

use crate::engine::{Aborted, ClientResult, DatabaseClient, DatabaseError};

pub use attempt::{MemoryAttempt, MemoryRowStream};
pub use script::{CommittedTransaction, Request, StatementResult};

/// First commit timestamp handed out, in microseconds since the epoch.
const INITIAL_COMMIT_MICROS: i64 = 1_700_000_000_000_000;

/// Lifecycle of one attempt as seen by the server.
#[derive(Debug, Clone)]
pub(crate) enum AttemptState {
    Active,
    Aborted(Aborted),
    Committed,
    RolledBack,
}

/// Server state shared by the database handle, its attempts and their streams.
#[derive(Debug)]
pub(crate) struct Inner {
    pub(crate) results: HashMap<String, StatementResult>,
    pub(crate) attempts: HashMap<u64, AttemptState>,
    pub(crate) statement_aborts: VecDeque<Aborted>,
    pub(crate) commit_aborts: VecDeque<Aborted>,
    pub(crate) stream_aborts: HashMap<String, (usize, Aborted)>,
    pub(crate) begin_error: Option<DatabaseError>,
    pub(crate) requests: Vec<Request>,
    pub(crate) committed: Vec<CommittedTransaction>,
    next_attempt_id: u64,
    clock: i64,
}

impl Inner {
    fn new() -> Self {
        Self {
            results: HashMap::new(),
            attempts: HashMap::new(),
            statement_aborts: VecDeque::new(),
            commit_aborts: VecDeque::new(),
            stream_aborts: HashMap::new(),
            begin_error: None,
            requests: Vec::new(),
            committed: Vec::new(),
            next_attempt_id: 1,
            clock: INITIAL_COMMIT_MICROS,
        }
    }

    /// Fails with the attempt's abort, or with `FAILED_PRECONDITION` once it has finished.
    pub(crate) fn check_active(&self, attempt_id: u64) -> ClientResult<()> {
        match self.attempts.get(&attempt_id) {
            Some(AttemptState::Active) => Ok(()),
            Some(AttemptState::Aborted(aborted)) => Err(aborted.clone().into()),
            Some(AttemptState::Committed | AttemptState::RolledBack) => Err(
                DatabaseError::failed_precondition(format!(
                    "transaction {attempt_id} has already finished"
                ))
                .into(),
            ),
            None => {
                Err(DatabaseError::not_found(format!("transaction {attempt_id} not found")).into())
            }
        }
    }

    /// Marks the attempt as aborted so that every later request on it fails the same way.
    pub(crate) fn abort(&mut self, attempt_id: u64, aborted: Aborted) -> Aborted {
        trace!(attempt_id, reason = %aborted.message, "injecting abort");
        self.attempts.insert(attempt_id, AttemptState::Aborted(aborted.clone()));
        aborted
    }

    pub(crate) fn commit(&mut self, attempt_id: u64, mutations: &[Mutation]) -> CommitTimestamp {
        self.clock += 1;
        let timestamp = CommitTimestamp::from_micros(self.clock);
        self.attempts.insert(attempt_id, AttemptState::Committed);
        self.committed.push(CommittedTransaction {
            attempt_id,
            timestamp,
            mutations: mutations.to_vec(),
        });
        timestamp
    }
}

/// A scripted in-memory database.
///
/// Cloning is cheap; all clones share the same server state.
#[derive(Debug, Clone)]
pub struct MemoryDatabase {
    inner: Arc<Mutex<Inner>>,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDatabase {
    /// Create an empty database with no registered statements.
    #[must_use]
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(Inner::new())) }
    }

    /// Register (or replace) the outcome of a statement, keyed by its SQL text.
    pub fn put_statement_result(&self, sql: impl Into<String>, result: StatementResult) {
        self.inner.lock().results.insert(sql.into(), result);
    }

    /// Register a DML statement that affects `count` rows.
    pub fn put_update_count(&self, sql: impl Into<String>, count: i64) {
        self.put_statement_result(sql, StatementResult::UpdateCount(count));
    }

    /// Register a query that returns `rows`.
    pub fn put_query_rows(&self, sql: impl Into<String>, rows: Vec<Row>) {
        self.put_statement_result(sql, StatementResult::Rows(rows));
    }

    /// Register a statement that fails with `error`.
    pub fn put_error(&self, sql: impl Into<String>, error: DatabaseError) {
        self.put_statement_result(sql, StatementResult::Error(error));
    }

    /// Abort the attempt that sends the next statement (DML, batch or query).
    pub fn abort_next_statement(&self) {
        self.abort_next_statement_with(Aborted::new("injected statement abort"));
    }

    /// Abort the attempt that sends the next statement, with a specific abort.
    pub fn abort_next_statement_with(&self, aborted: Aborted) {
        self.inner.lock().statement_aborts.push_back(aborted);
    }

    /// Abort the next commit request.
    pub fn abort_next_commit(&self) {
        self.abort_next_commit_with(Aborted::new("injected commit abort"));
    }

    /// Abort the next commit request, with a specific abort.
    pub fn abort_next_commit_with(&self, aborted: Aborted) {
        self.inner.lock().commit_aborts.push_back(aborted);
    }

    /// Abort the next `n` commit requests.
    pub fn abort_commits(&self, n: usize) {
        let mut inner = self.inner.lock();
        for i in 0..n {
            inner.commit_aborts.push_back(Aborted::new(format!("injected commit abort {}", i + 1)));
        }
    }

    /// Abort the next execution of the query `sql` after it has returned `rows` rows.
    ///
    /// The abort is raised by the stream's next `next()` call and kills the attempt that
    /// owns the stream.
    pub fn abort_stream_after(&self, sql: impl Into<String>, rows: usize) {
        self.inner
            .lock()
            .stream_aborts
            .insert(sql.into(), (rows, Aborted::new("injected stream abort")));
    }

    /// Make every following `begin_transaction` fail with `error`, or succeed again with `None`.
    pub fn set_begin_error(&self, error: Option<DatabaseError>) {
        self.inner.lock().begin_error = error;
    }

    /// Every request received so far, in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<Request> {
        self.inner.lock().requests.clone()
    }

    /// Number of transaction attempts begun so far.
    #[must_use]
    pub fn begin_count(&self) -> usize {
        self.inner.lock().requests.iter().filter(|r| matches!(r, Request::Begin { .. })).count()
    }

    /// Transactions that committed successfully, in commit order.
    #[must_use]
    pub fn committed(&self) -> Vec<CommittedTransaction> {
        self.inner.lock().committed.clone()
    }

    /// Forget the request log.
    pub fn clear_requests(&self) {
        self.inner.lock().requests.clear();
    }
}

#[async_trait]
impl DatabaseClient for MemoryDatabase {
    type Attempt = MemoryAttempt;

    async fn begin_transaction(&self) -> ClientResult<MemoryAttempt> {
        let mut inner = self.inner.lock();
        if let Some(error) = inner.begin_error.clone() {
            return Err(error.into());
        }
        let id = inner.next_attempt_id;
        inner.next_attempt_id += 1;
        inner.attempts.insert(id, AttemptState::Active);
        inner.requests.push(Request::Begin { attempt_id: id });
        Ok(MemoryAttempt::new(id, Arc::clone(&self.inner)))
    }
}

#[cfg(test)]
mod tests;
