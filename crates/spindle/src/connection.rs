//! Connection facade: begins retriable transactions and runs auto-commit statements.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use spindle_client::DatabaseClient;
use spindle_core::Statement;
use tokio::time::Instant;
use tracing::debug;

use crate::config::{Config, TransactionOptions};
use crate::error::{Error, Result};
use crate::metrics::{RetryMetrics, RetryMetricsSnapshot};
use crate::retry::RetryPolicy;
use crate::transaction::RetriableTransaction;

/// Entry point for running transactions against a database client.
///
/// # Example
///
/// ```ignore
/// use spindle::Connection;
/// use spindle_client::backends::MemoryDatabase;
///
/// let conn = Connection::new(MemoryDatabase::new());
///
/// let tx = conn.begin_transaction().await?;
/// tx.execute("UPDATE accounts SET balance = balance - 10 WHERE id = 1").await?;
/// tx.execute("UPDATE accounts SET balance = balance + 10 WHERE id = 2").await?;
/// let timestamp = tx.commit().await?;
/// println!("committed at {timestamp} after {} retries", tx.retry_count());
/// ```
pub struct Connection<C: DatabaseClient> {
    client: Arc<C>,
    config: Config,
    metrics: Arc<RetryMetrics>,
    next_transaction_id: AtomicU64,
}

impl<C: DatabaseClient> Connection<C> {
    /// Create a connection with the default configuration.
    pub fn new(client: C) -> Self {
        Self::from_parts(Arc::new(client), Config::default(), Arc::new(RetryMetrics::new()))
    }

    /// Create a builder for a connection over `client`.
    pub fn builder(client: C) -> ConnectionBuilder<C> {
        ConnectionBuilder::new(client)
    }

    fn from_parts(client: Arc<C>, config: Config, metrics: Arc<RetryMetrics>) -> Self {
        Self { client, config, metrics, next_transaction_id: AtomicU64::new(1) }
    }

    /// The connection's configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// The underlying database client.
    #[must_use]
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Snapshot of the retry metrics of all transactions begun on this connection.
    #[must_use]
    pub fn metrics(&self) -> RetryMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Begin a read-write transaction with the connection's settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Database`](crate::Error::Database) if the database refuses to
    /// start a transaction.
    pub async fn begin_transaction(&self) -> Result<RetriableTransaction<C>> {
        self.begin_transaction_with(TransactionOptions::default()).await
    }

    /// Begin a read-write transaction with per-transaction overrides.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if the effective retry policy is
    /// invalid, or [`Error::Database`](crate::Error::Database) if the database refuses
    /// to start a transaction.
    pub async fn begin_transaction_with(
        &self,
        options: TransactionOptions,
    ) -> Result<RetriableTransaction<C>> {
        let options = options.resolve(&self.config);
        options.policy.validate()?;
        let id = self.next_transaction_id.fetch_add(1, Ordering::Relaxed);
        RetriableTransaction::begin(Arc::clone(&self.client), id, options, Arc::clone(&self.metrics))
            .await
    }

    /// Execute a single DML statement in its own transaction and commit it.
    ///
    /// # Errors
    ///
    /// Same as [`RetriableTransaction::execute`] and [`RetriableTransaction::commit`].
    pub async fn execute(&self, statement: impl Into<Statement>) -> Result<i64> {
        let statement = statement.into();
        self.run_in_transaction(|tx| {
            let statement = statement.clone();
            async move { tx.execute(statement).await }
        })
        .await
    }

    /// Run `body` in a transaction and commit it.
    ///
    /// Aborts inside the transaction are retried internally. If the transaction still
    /// fails in a way that starting over may fix ([`Error::is_retryable`]), it is rolled
    /// back and `body` runs again in a fresh transaction, up to the retry policy's budget
    /// and total timeout. Any other error rolls the transaction back and is returned.
    ///
    /// # Errors
    ///
    /// Returns the error from `body` or from the commit.
    ///
    /// [`Error::is_retryable`]: crate::Error::is_retryable
    pub async fn run_in_transaction<F, Fut, T>(&self, body: F) -> Result<T>
    where
        F: FnMut(RetriableTransaction<C>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run_in_transaction_with(TransactionOptions::default(), body).await
    }

    /// Like [`run_in_transaction`](Self::run_in_transaction), with per-transaction
    /// overrides applied to every restart.
    ///
    /// The options' cancellation token also interrupts the wait between restarts.
    ///
    /// # Errors
    ///
    /// Returns the error from `body` or from the commit, or [`Error::Cancelled`] if the
    /// token fires while waiting to restart.
    ///
    /// [`Error::Cancelled`]: crate::Error::Cancelled
    pub async fn run_in_transaction_with<F, Fut, T>(
        &self,
        options: TransactionOptions,
        mut body: F,
    ) -> Result<T>
    where
        F: FnMut(RetriableTransaction<C>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let resolved = options.clone().resolve(&self.config);
        let policy = resolved.policy;
        let cancellation = resolved.cancellation;
        let mut restarts = 0u32;
        let mut restart_deadline = None;
        loop {
            let tx = self.begin_transaction_with(options.clone()).await?;
            let result = match body(tx.clone()).await {
                Ok(value) => tx.commit().await.map(|_| value),
                Err(e) => Err(e),
            };
            let error = match result {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            // The transaction may already be finished; only the original error matters.
            if let Err(e) = tx.rollback().await {
                debug!(tx = tx.id(), error = %e, "rollback after failed body did not complete");
            }
            if !error.is_retryable() || policy.should_give_up(restarts) {
                return Err(error);
            }
            restarts += 1;
            let delay = policy.next_delay(restarts);
            let now = Instant::now();
            let deadline = *restart_deadline.get_or_insert_with(|| policy.deadline(now));
            if RetryPolicy::exceeds_deadline(now, delay, deadline) {
                debug!(tx = tx.id(), restarts, ?delay, %error, "restart would pass the deadline");
                return Err(error);
            }
            debug!(tx = tx.id(), restarts, ?delay, %error, "restarting transaction");
            tokio::select! {
                biased;
                () = cancellation.cancelled() => return Err(Error::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}

impl<C: DatabaseClient> fmt::Debug for Connection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("config", &self.config)
            .field("metrics", &self.metrics.snapshot())
            .finish_non_exhaustive()
    }
}

/// Builder for a [`Connection`].
///
/// ```ignore
/// let conn = Connection::builder(client)
///     .max_internal_retry_count(10)
///     .retry_policy(RetryPolicy::default().with_total_timeout(Duration::from_secs(30)))
///     .build()?;
/// ```
pub struct ConnectionBuilder<C: DatabaseClient> {
    client: C,
    config: Config,
    metrics: Option<Arc<RetryMetrics>>,
}

impl<C: DatabaseClient> ConnectionBuilder<C> {
    /// Create a builder with the default configuration.
    pub fn new(client: C) -> Self {
        Self { client, config: Config::default(), metrics: None }
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Enable or disable internal retries for every transaction.
    #[must_use]
    pub fn enable_internal_retries(mut self, enabled: bool) -> Self {
        self.config.enable_internal_retries = enabled;
        self
    }

    /// Set the maximum number of internal retries per transaction.
    #[must_use]
    pub fn max_internal_retry_count(mut self, count: u32) -> Self {
        self.config.retry_policy.max_retries = count;
        self
    }

    /// Set the retry policy. Overrides an earlier retry count.
    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry_policy = policy;
        self
    }

    /// Share a metrics instance, for example between several connections.
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<RetryMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if the retry policy is invalid.
    pub fn build(self) -> Result<Connection<C>> {
        self.config.retry_policy.validate()?;
        let metrics = self.metrics.unwrap_or_default();
        Ok(Connection::from_parts(Arc::new(self.client), self.config, metrics))
    }
}
