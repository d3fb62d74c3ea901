//! Connection and transaction configuration.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::retry::RetryPolicy;

/// Defaults applied to every transaction a [`Connection`](crate::Connection) begins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Whether aborted transactions are retried internally.
    pub enable_internal_retries: bool,
    /// Backoff, deadline and retry budget.
    pub retry_policy: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self { enable_internal_retries: true, retry_policy: RetryPolicy::default() }
    }
}

impl Config {
    /// Create a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable internal retries.
    #[must_use]
    pub const fn enable_internal_retries(mut self, enabled: bool) -> Self {
        self.enable_internal_retries = enabled;
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Set the maximum number of internal retries per transaction.
    #[must_use]
    pub const fn max_internal_retry_count(mut self, count: u32) -> Self {
        self.retry_policy.max_retries = count;
        self
    }
}

/// Per-transaction overrides of the connection's [`Config`].
///
/// ```ignore
/// let token = CancellationToken::new();
/// let tx = conn
///     .begin_transaction_with(
///         TransactionOptions::new().max_internal_retry_count(5).cancellation(token.clone()),
///     )
///     .await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct TransactionOptions {
    pub(crate) enable_internal_retries: Option<bool>,
    pub(crate) max_internal_retry_count: Option<u32>,
    pub(crate) retry_policy: Option<RetryPolicy>,
    pub(crate) cancellation: Option<CancellationToken>,
}

impl TransactionOptions {
    /// Options that inherit everything from the connection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable internal retries for this transaction.
    #[must_use]
    pub const fn enable_internal_retries(mut self, enabled: bool) -> Self {
        self.enable_internal_retries = Some(enabled);
        self
    }

    /// Set the maximum number of internal retries for this transaction.
    #[must_use]
    pub const fn max_internal_retry_count(mut self, count: u32) -> Self {
        self.max_internal_retry_count = Some(count);
        self
    }

    /// Replace the retry policy for this transaction.
    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Cancel every round-trip and retry wait of this transaction when `token` fires.
    #[must_use]
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Resolve the effective settings against the connection defaults.
    pub(crate) fn resolve(self, config: &Config) -> ResolvedOptions {
        let mut policy = self.retry_policy.unwrap_or_else(|| config.retry_policy.clone());
        if let Some(count) = self.max_internal_retry_count {
            policy.max_retries = count;
        }
        ResolvedOptions {
            enable_internal_retries: self
                .enable_internal_retries
                .unwrap_or(config.enable_internal_retries),
            policy,
            cancellation: self.cancellation.unwrap_or_default(),
        }
    }
}

/// Effective settings of one transaction.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedOptions {
    pub(crate) enable_internal_retries: bool,
    pub(crate) policy: RetryPolicy,
    pub(crate) cancellation: CancellationToken,
}
