//! Read-write transaction that survives aborts by replaying its history.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use spindle_client::{Aborted, BatchOutcome, ClientError, DatabaseClient, TransactionAttempt};
use spindle_core::{CommitTimestamp, Mutation, Statement};
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::command::Command;
use super::stream::ChecksummingResultStream;
use crate::config::ResolvedOptions;
use crate::error::{Error, Result};
use crate::metrics::RetryMetrics;
use crate::retry::recorded::{QueryRecord, RecordedOperation, ReplayError};
use crate::retry::RetryPolicy;

pub(crate) type AttemptOf<C> = <C as DatabaseClient>::Attempt;
pub(crate) type StreamOf<C> = <AttemptOf<C> as TransactionAttempt>::Stream;

/// Lifecycle state of a [`RetriableTransaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionState {
    /// Statements can be executed.
    #[default]
    Active,
    /// The transaction committed.
    Committed,
    /// The transaction was rolled back.
    RolledBack,
    /// A permanent failure made the transaction unusable. It can only be rolled back.
    Failed,
}

/// State that can be read without waiting for an in-flight operation.
#[derive(Debug, Default)]
struct Observed {
    status: TransactionState,
    retry_count: u32,
    commit_timestamp: Option<CommitTimestamp>,
    failure: Option<String>,
}

/// Mutable transaction state, owned by whichever operation is in flight.
struct State<C: DatabaseClient> {
    /// The live attempt. `None` once the transaction has finished or failed.
    attempt: Option<AttemptOf<C>>,
    /// Bumped every time a new attempt is begun.
    generation: u64,
    operations: Vec<RecordedOperation<StreamOf<C>>>,
    mutations: Vec<Mutation>,
    retry_count: u32,
    /// When the first abort happened; the retry deadline counts from here.
    first_abort: Option<Instant>,
    enable_internal_retries: bool,
    policy: RetryPolicy,
}

impl<C: DatabaseClient> State<C> {
    fn attempt(&self) -> Result<&AttemptOf<C>> {
        self.attempt.as_ref().ok_or_else(|| Error::invalid_state("transaction has no live attempt"))
    }
}

/// The part of a transaction shared between its handles and its cursors.
pub(crate) struct Shared<C: DatabaseClient> {
    client: Arc<C>,
    id: u64,
    metrics: Arc<RetryMetrics>,
    cancellation: CancellationToken,
    state: Mutex<State<C>>,
    observed: parking_lot::Mutex<Observed>,
}

impl<C: DatabaseClient> Shared<C> {
    pub(crate) const fn id(&self) -> u64 {
        self.id
    }

    /// Fails unless the transaction is still active.
    pub(crate) fn check_usable(&self) -> Result<()> {
        let observed = self.observed.lock();
        match observed.status {
            TransactionState::Active => Ok(()),
            TransactionState::Committed | TransactionState::RolledBack => {
                Err(Error::AlreadyCompleted)
            }
            TransactionState::Failed => {
                Err(Error::TransactionFailed(observed.failure.clone().unwrap_or_default()))
            }
        }
    }

    async fn lock_active(&self) -> Result<MutexGuard<'_, State<C>>> {
        let state = self.state.lock().await;
        self.check_usable()?;
        Ok(state)
    }

    /// Runs `fut` unless the transaction's cancellation token fires first.
    pub(crate) async fn cancellable<F: Future>(&self, fut: F) -> Result<F::Output> {
        tokio::select! {
            biased;
            () = self.cancellation.cancelled() => Err(Error::Cancelled),
            output = fut => Ok(output),
        }
    }

    /// Marks the transaction as permanently failed and returns `error`.
    fn fail(&self, state: &mut State<C>, error: Error) -> Error {
        state.attempt = None;
        state.operations.clear();
        state.mutations.clear();
        let mut observed = self.observed.lock();
        observed.status = TransactionState::Failed;
        observed.failure = Some(error.to_string());
        error
    }

    /// Handles an abort raised by a cursor.
    ///
    /// `generation` is the attempt the cursor's stream belonged to. If that attempt has
    /// already been replaced, the retry has happened and the cursor just reads again.
    pub(crate) async fn retry_from_stream(&self, aborted: Aborted, generation: u64) -> Result<()> {
        let mut state = self.lock_active().await?;
        if state.generation != generation {
            debug!(tx = self.id, generation, "ignoring abort from a replaced attempt");
            return Ok(());
        }
        self.retry(&mut state, aborted).await
    }

    /// Begins new attempts and replays the recorded operations until one replay matches
    /// or retrying has to stop.
    async fn retry(&self, state: &mut State<C>, aborted: Aborted) -> Result<()> {
        let mut aborted = aborted;
        loop {
            self.metrics.record_abort();
            if !state.enable_internal_retries {
                debug!(tx = self.id, reason = %aborted.message, "aborted with internal retries disabled");
                return Err(self.fail(state, Error::Aborted(aborted)));
            }
            if state.policy.should_give_up(state.retry_count) {
                warn!(tx = self.id, retries = state.retry_count, "retry budget exhausted");
                self.metrics.record_budget_exhausted();
                let retries = state.retry_count;
                return Err(
                    self.fail(state, Error::RetryBudgetExhausted { retries, last_abort: aborted })
                );
            }

            let delay = aborted
                .retry_delay
                .unwrap_or_else(|| state.policy.next_delay(state.retry_count + 1));
            let now = Instant::now();
            let first_abort = *state.first_abort.get_or_insert(now);
            let deadline = state.policy.deadline(first_abort);
            if RetryPolicy::exceeds_deadline(now, delay, deadline) {
                warn!(tx = self.id, retries = state.retry_count, ?delay, "retry deadline exceeded");
                self.metrics.record_deadline_exceeded();
                return Err(
                    self.fail(state, Error::RetryDeadlineExceeded { delay, last_abort: aborted })
                );
            }

            debug!(
                tx = self.id,
                retry = state.retry_count + 1,
                ?delay,
                reason = %aborted.message,
                "transaction aborted, retrying"
            );
            if let Err(e) = self.cancellable(tokio::time::sleep(delay)).await {
                return Err(self.fail(state, e));
            }

            state.attempt = None;
            state.retry_count += 1;
            state.generation += 1;
            self.observed.lock().retry_count = state.retry_count;
            self.metrics.record_retry();

            let attempt = match self.cancellable(self.client.begin_transaction()).await {
                Ok(Ok(attempt)) => attempt,
                Ok(Err(ClientError::Aborted(a))) => {
                    aborted = a;
                    continue;
                }
                Ok(Err(ClientError::Database(e))) => {
                    return Err(self.fail(state, Error::Database(e)));
                }
                Err(e) => return Err(self.fail(state, e)),
            };

            let generation = state.generation;
            let replay = replay_all(self.id, &state.operations, &attempt, generation);
            match self.cancellable(replay).await {
                Ok(Ok(())) => {
                    info!(
                        tx = self.id,
                        attempt = attempt.id(),
                        retries = state.retry_count,
                        replayed = state.operations.len(),
                        "transaction retried"
                    );
                    self.metrics.record_successful_replay();
                    state.attempt = Some(attempt);
                    return Ok(());
                }
                Ok(Err(ReplayError::Aborted(a))) => aborted = a,
                Ok(Err(ReplayError::Diverged(reason))) => {
                    warn!(tx = self.id, retries = state.retry_count, %reason, "concurrent modification");
                    self.metrics.record_concurrent_modification();
                    rollback_quietly(self.id, &attempt).await;
                    return Err(self.fail(state, Error::ConcurrentModification { reason }));
                }
                Ok(Err(ReplayError::Encoding(e))) => {
                    rollback_quietly(self.id, &attempt).await;
                    return Err(self.fail(state, Error::Core(e)));
                }
                Err(e) => return Err(self.fail(state, e)),
            }
        }
    }
}

async fn replay_all<A: TransactionAttempt>(
    tx: u64,
    operations: &[RecordedOperation<A::Stream>],
    attempt: &A,
    generation: u64,
) -> std::result::Result<(), ReplayError> {
    for (index, operation) in operations.iter().enumerate() {
        debug!(tx, attempt = attempt.id(), index, kind = operation.kind(), "replaying");
        operation.replay(attempt, generation).await?;
    }
    Ok(())
}

async fn rollback_quietly<A: TransactionAttempt>(tx: u64, attempt: &A) {
    if let Err(e) = attempt.rollback().await {
        debug!(tx, attempt = attempt.id(), error = %e, "rollback of discarded attempt failed");
    }
}

impl<C: DatabaseClient> Drop for Shared<C> {
    fn drop(&mut self) {
        let Some(attempt) = self.state.get_mut().attempt.take() else {
            return;
        };
        debug!(tx = self.id, "transaction dropped while active, rolling back");
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let tx = self.id;
            handle.spawn(async move { rollback_quietly(tx, &attempt).await });
        }
    }
}

/// A read-write transaction that is retried transparently when the database aborts it.
///
/// Every statement and its outcome are recorded. When an attempt is aborted, the
/// transaction waits according to its [`RetryPolicy`], begins a new attempt and replays
/// the records in order. If every replayed statement returns what the application saw
/// before, including the checksum of the rows read through each cursor, the transaction
/// continues on the new attempt as if nothing happened. Otherwise it fails with
/// [`Error::ConcurrentModification`].
///
/// Handles are cheap to clone; all clones refer to the same transaction. The transaction
/// is meant to be driven by one logical flow at a time.
pub struct RetriableTransaction<C: DatabaseClient> {
    shared: Arc<Shared<C>>,
}

impl<C: DatabaseClient> Clone for RetriableTransaction<C> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl<C: DatabaseClient> fmt::Debug for RetriableTransaction<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let observed = self.shared.observed.lock();
        f.debug_struct("RetriableTransaction")
            .field("id", &self.shared.id)
            .field("state", &observed.status)
            .field("retry_count", &observed.retry_count)
            .finish_non_exhaustive()
    }
}

impl<C: DatabaseClient> RetriableTransaction<C> {
    /// Begin the first attempt of a new transaction.
    pub(crate) async fn begin(
        client: Arc<C>,
        id: u64,
        options: ResolvedOptions,
        metrics: Arc<RetryMetrics>,
    ) -> Result<Self> {
        let begin = tokio::select! {
            biased;
            () = options.cancellation.cancelled() => return Err(Error::Cancelled),
            begin = client.begin_transaction() => begin,
        };
        let attempt = begin?;
        debug!(tx = id, attempt = attempt.id(), "transaction started");

        let state = State {
            attempt: Some(attempt),
            generation: 0,
            operations: Vec::new(),
            mutations: Vec::new(),
            retry_count: 0,
            first_abort: None,
            enable_internal_retries: options.enable_internal_retries,
            policy: options.policy,
        };
        let shared = Shared {
            client,
            id,
            metrics,
            cancellation: options.cancellation,
            state: Mutex::new(state),
            observed: parking_lot::Mutex::new(Observed::default()),
        };
        Ok(Self { shared: Arc::new(shared) })
    }

    /// Connection-local identifier of this transaction, used in logs.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.shared.observed.lock().status
    }

    /// Number of internal retries performed so far.
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.shared.observed.lock().retry_count
    }

    /// The commit timestamp, once the transaction has committed.
    #[must_use]
    pub fn commit_timestamp(&self) -> Option<CommitTimestamp> {
        self.shared.observed.lock().commit_timestamp
    }

    /// The token that cancels this transaction's round-trips and retry waits.
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.shared.cancellation
    }

    /// Whether aborts are retried internally.
    pub async fn internal_retries_enabled(&self) -> bool {
        self.shared.state.lock().await.enable_internal_retries
    }

    /// Enable or disable internal retries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] once a statement has been executed in this
    /// transaction.
    pub async fn set_enable_internal_retries(&self, enabled: bool) -> Result<()> {
        let mut state = self.shared.lock_active().await?;
        if !state.operations.is_empty() || state.retry_count > 0 {
            return Err(Error::invalid_state(
                "internal retries can only be changed before the first statement",
            ));
        }
        state.enable_internal_retries = enabled;
        Ok(())
    }

    /// Change the maximum number of internal retries for the rest of the transaction.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is no longer active.
    pub async fn set_max_internal_retry_count(&self, count: u32) -> Result<()> {
        self.shared.lock_active().await?.policy.max_retries = count;
        Ok(())
    }

    /// Start building a statement bound to this transaction.
    pub fn command(&self, sql: impl Into<String>) -> Command<'_, C> {
        Command::new(self, Statement::new(sql))
    }

    /// Execute a DML statement and return the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Database`] if the statement fails. Aborts are retried internally
    /// and surface only as one of the retry failures.
    pub async fn execute(&self, statement: impl Into<Statement>) -> Result<i64> {
        let statement = statement.into();
        let shared = &*self.shared;
        let mut state = shared.lock_active().await?;
        loop {
            let outcome = shared.cancellable(state.attempt()?.execute(&statement)).await?;
            match outcome {
                Ok(row_count) => {
                    debug!(tx = shared.id, sql = %statement.sql(), row_count, "statement executed");
                    state.operations.push(RecordedOperation::SuccessfulUpdate { statement, row_count });
                    return Ok(row_count);
                }
                Err(ClientError::Database(error)) => {
                    debug!(tx = shared.id, sql = %statement.sql(), %error, "statement failed");
                    state
                        .operations
                        .push(RecordedOperation::FailedUpdate { statement, error: error.clone() });
                    return Err(Error::Database(error));
                }
                Err(ClientError::Aborted(aborted)) => shared.retry(&mut state, aborted).await?,
            }
        }
    }

    /// Execute DML statements as one batch and return their row counts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Batch`] with the row counts of the statements that succeeded if
    /// one of them fails, and [`Error::InvalidParameter`] for an empty batch.
    pub async fn execute_batch<I, S>(&self, statements: I) -> Result<Vec<i64>>
    where
        I: IntoIterator<Item = S>,
        S: Into<Statement>,
    {
        let statements: Vec<Statement> = statements.into_iter().map(Into::into).collect();
        if statements.is_empty() {
            return Err(Error::invalid_parameter("batch must contain at least one statement"));
        }
        let shared = &*self.shared;
        let mut state = shared.lock_active().await?;
        loop {
            let outcome = shared.cancellable(state.attempt()?.execute_batch(&statements)).await?;
            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(ClientError::Database(error)) => BatchOutcome::partial(Vec::new(), error),
                Err(ClientError::Aborted(aborted)) => {
                    shared.retry(&mut state, aborted).await?;
                    continue;
                }
            };
            debug!(
                tx = shared.id,
                statements = statements.len(),
                succeeded = outcome.row_counts.len(),
                "batch executed"
            );
            let result = match &outcome.error {
                None => Ok(outcome.row_counts.clone()),
                Some(error) => {
                    Err(Error::Batch { row_counts: outcome.row_counts.clone(), source: error.clone() })
                }
            };
            state.operations.push(RecordedOperation::batch(statements, outcome));
            return result;
        }
    }

    /// Execute a query and return a cursor over its rows.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Database`] if the query is rejected before any row is returned.
    pub async fn execute_query(
        &self,
        statement: impl Into<Statement>,
    ) -> Result<ChecksummingResultStream<C>> {
        let statement = statement.into();
        let shared = &*self.shared;
        let mut state = shared.lock_active().await?;
        loop {
            let outcome = shared.cancellable(state.attempt()?.execute_streaming(&statement)).await?;
            let generation = state.generation;
            match outcome {
                Ok(stream) => {
                    debug!(tx = shared.id, sql = %statement.sql(), "query started");
                    let record = Arc::new(QueryRecord::open(statement, stream, generation));
                    state.operations.push(RecordedOperation::StreamedQuery(Arc::clone(&record)));
                    return Ok(ChecksummingResultStream::new(Arc::clone(&self.shared), record));
                }
                Err(ClientError::Database(error)) => {
                    debug!(tx = shared.id, sql = %statement.sql(), %error, "query failed");
                    let record = QueryRecord::failed(statement, error.clone(), generation);
                    state.operations.push(RecordedOperation::StreamedQuery(Arc::new(record)));
                    return Err(Error::Database(error));
                }
                Err(ClientError::Aborted(aborted)) => shared.retry(&mut state, aborted).await?,
            }
        }
    }

    /// Buffer a mutation to be sent with the commit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if the mutation's rows do not match its columns.
    pub async fn buffer_mutation(&self, mutation: Mutation) -> Result<()> {
        self.buffer_mutations([mutation]).await
    }

    /// Buffer several mutations to be sent with the commit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if any mutation is malformed; none are buffered
    /// in that case.
    pub async fn buffer_mutations(&self, mutations: impl IntoIterator<Item = Mutation>) -> Result<()> {
        let mutations: Vec<Mutation> = mutations.into_iter().collect();
        if let Some(bad) = mutations.iter().find(|m| !m.is_well_formed()) {
            return Err(Error::invalid_parameter(format!(
                "mutation on table `{}` has rows that do not match its columns",
                bad.table
            )));
        }
        self.shared.lock_active().await?.mutations.extend(mutations);
        Ok(())
    }

    /// Commit the transaction, sending the buffered mutations.
    ///
    /// An abort of the commit itself is retried like any other abort: the history is
    /// replayed on a new attempt and the commit is sent again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Database`] if the commit is rejected, or one of the retry
    /// failures.
    pub async fn commit(&self) -> Result<CommitTimestamp> {
        let shared = &*self.shared;
        let mut state = shared.lock_active().await?;
        loop {
            let outcome =
                shared.cancellable(state.attempt()?.commit(&state.mutations)).await?;
            match outcome {
                Ok(timestamp) => {
                    state.attempt = None;
                    state.operations.clear();
                    state.mutations.clear();
                    let retries = {
                        let mut observed = shared.observed.lock();
                        observed.status = TransactionState::Committed;
                        observed.commit_timestamp = Some(timestamp);
                        observed.retry_count
                    };
                    shared.metrics.record_commit();
                    debug!(tx = shared.id, %timestamp, retries, "transaction committed");
                    return Ok(timestamp);
                }
                Err(ClientError::Aborted(aborted)) => shared.retry(&mut state, aborted).await?,
                Err(ClientError::Database(error)) => {
                    return Err(shared.fail(&mut state, Error::Database(error)));
                }
            }
        }
    }

    /// Roll back the transaction.
    ///
    /// A failed transaction can still be rolled back, which releases it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyCompleted`] if the transaction has already committed or
    /// rolled back.
    pub async fn rollback(&self) -> Result<()> {
        let shared = &*self.shared;
        let mut state = shared.state.lock().await;
        {
            let mut observed = shared.observed.lock();
            if matches!(observed.status, TransactionState::Committed | TransactionState::RolledBack) {
                return Err(Error::AlreadyCompleted);
            }
            observed.status = TransactionState::RolledBack;
        }
        state.operations.clear();
        state.mutations.clear();
        shared.metrics.record_rollback();
        debug!(tx = shared.id, "transaction rolled back");

        let Some(attempt) = state.attempt.take() else {
            return Ok(());
        };
        match shared.cancellable(attempt.rollback()).await? {
            Ok(()) | Err(ClientError::Aborted(_)) => Ok(()),
            Err(ClientError::Database(error)) => Err(Error::Database(error)),
        }
    }
}
