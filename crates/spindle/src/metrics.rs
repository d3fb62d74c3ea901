//! Metrics for internal transaction retries.
//!
//! Counters are atomics so that a [`Connection`](crate::Connection) and every transaction
//! it creates can share one [`RetryMetrics`]. Each event is also emitted through the
//! [`metrics`] crate, so an installed recorder (for example a Prometheus exporter) sees
//! the same numbers.
//!
//! # Example
//!
//! ```ignore
//! let conn = Connection::new(client);
//! // ... run transactions ...
//! let snapshot = conn.metrics();
//! println!("aborts: {}, retries: {}", snapshot.aborts, snapshot.retries);
//! println!("replay success rate: {:?}", snapshot.replay_success_rate());
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

// Re-export the metrics crate for integration
pub use ::metrics;

/// Counters for aborts, retry cycles and their outcomes.
#[derive(Debug, Default)]
pub struct RetryMetrics {
    /// Abort signals observed, including ones raised during replay.
    aborts: AtomicU64,
    /// Retry cycles started (new attempts begun after an abort).
    retries: AtomicU64,
    /// Retry cycles whose replay matched.
    successful_replays: AtomicU64,
    /// Replays that diverged from the original attempt.
    concurrent_modifications: AtomicU64,
    /// Transactions that ran out of retries.
    budget_exhausted: AtomicU64,
    /// Transactions that ran out of retry time.
    deadline_exceeded: AtomicU64,
    /// Successful commits.
    commits: AtomicU64,
    /// Rollbacks.
    rollbacks: AtomicU64,
}

impl RetryMetrics {
    /// Create a new metrics instance with all counters at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an abort signal.
    pub fn record_abort(&self) {
        self.aborts.fetch_add(1, Ordering::Relaxed);
        ::metrics::counter!("spindle_aborts_total").increment(1);
    }

    /// Record the start of a retry cycle.
    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
        ::metrics::counter!("spindle_retries_total").increment(1);
    }

    /// Record a replay that matched the original attempt.
    pub fn record_successful_replay(&self) {
        self.successful_replays.fetch_add(1, Ordering::Relaxed);
        ::metrics::counter!("spindle_successful_replays_total").increment(1);
    }

    /// Record a replay that diverged.
    pub fn record_concurrent_modification(&self) {
        self.concurrent_modifications.fetch_add(1, Ordering::Relaxed);
        ::metrics::counter!("spindle_concurrent_modifications_total").increment(1);
    }

    /// Record a transaction that exhausted its retry budget.
    pub fn record_budget_exhausted(&self) {
        self.budget_exhausted.fetch_add(1, Ordering::Relaxed);
        ::metrics::counter!("spindle_retry_budget_exhausted_total").increment(1);
    }

    /// Record a transaction that exceeded its retry deadline.
    pub fn record_deadline_exceeded(&self) {
        self.deadline_exceeded.fetch_add(1, Ordering::Relaxed);
        ::metrics::counter!("spindle_retry_deadline_exceeded_total").increment(1);
    }

    /// Record a successful commit.
    pub fn record_commit(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
        ::metrics::counter!("spindle_transactions_committed_total").increment(1);
    }

    /// Record a rollback.
    pub fn record_rollback(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
        ::metrics::counter!("spindle_transactions_rolled_back_total").increment(1);
    }

    /// Get a point-in-time snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> RetryMetricsSnapshot {
        RetryMetricsSnapshot {
            aborts: self.aborts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            successful_replays: self.successful_replays.load(Ordering::Relaxed),
            concurrent_modifications: self.concurrent_modifications.load(Ordering::Relaxed),
            budget_exhausted: self.budget_exhausted.load(Ordering::Relaxed),
            deadline_exceeded: self.deadline_exceeded.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        for counter in [
            &self.aborts,
            &self.retries,
            &self.successful_replays,
            &self.concurrent_modifications,
            &self.budget_exhausted,
            &self.deadline_exceeded,
            &self.commits,
            &self.rollbacks,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Point-in-time copy of [`RetryMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct RetryMetricsSnapshot {
    /// Abort signals observed.
    pub aborts: u64,
    /// Retry cycles started.
    pub retries: u64,
    /// Retry cycles whose replay matched.
    pub successful_replays: u64,
    /// Replays that diverged.
    pub concurrent_modifications: u64,
    /// Transactions that ran out of retries.
    pub budget_exhausted: u64,
    /// Transactions that ran out of retry time.
    pub deadline_exceeded: u64,
    /// Successful commits.
    pub commits: u64,
    /// Rollbacks.
    pub rollbacks: u64,
}

impl RetryMetricsSnapshot {
    /// Fraction of retry cycles whose replay matched, or `None` if there were no retries.
    #[must_use]
    pub fn replay_success_rate(&self) -> Option<f64> {
        if self.retries == 0 {
            None
        } else {
            Some(self.successful_replays as f64 / self.retries as f64)
        }
    }
}
