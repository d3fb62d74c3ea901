//! Error types for Spindle.
//!
//! This module provides the [`enum@Error`] type returned by every operation on a
//! [`Connection`](crate::Connection) or a
//! [`RetriableTransaction`](crate::RetriableTransaction).

use std::time::Duration;

use spindle_client::{Aborted, ClientError, DatabaseError};
use spindle_core::CoreError;
use thiserror::Error;

/// Errors that can occur when running a retriable transaction.
#[derive(Debug, Error)]
pub enum Error {
    /// The database aborted the transaction and internal retries are disabled.
    ///
    /// The transaction cannot continue. The caller may start it again from the beginning.
    #[error("transaction aborted: {}", .0.message)]
    Aborted(#[source] Aborted),

    /// The transaction was aborted and the retried attempt observed different results
    /// than the original attempt.
    #[error("transaction aborted due to concurrent modification: {reason}")]
    ConcurrentModification {
        /// What differed between the two attempts.
        reason: String,
    },

    /// The transaction was aborted more often than the retry budget allows.
    #[error("transaction aborted after {retries} internal retries; retry budget exhausted")]
    RetryBudgetExhausted {
        /// Number of retries performed before giving up.
        retries: u32,
        /// The abort that could not be retried.
        #[source]
        last_abort: Aborted,
    },

    /// Waiting for the next retry would run past the transaction's retry deadline.
    #[error("transaction aborted and the next retry (in {delay:?}) would exceed the retry deadline")]
    RetryDeadlineExceeded {
        /// The delay that would have been waited.
        delay: Duration,
        /// The abort that could not be retried.
        #[source]
        last_abort: Aborted,
    },

    /// The database reported an ordinary error.
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// A statement in a batch failed.
    #[error("batch failed after {} statements: {source}", .row_counts.len())]
    Batch {
        /// Row counts of the statements that succeeded before the failure.
        row_counts: Vec<i64>,
        /// The failure of the next statement.
        source: DatabaseError,
    },

    /// The operation was cancelled through the transaction's cancellation token.
    #[error("operation cancelled")]
    Cancelled,

    /// A previous permanent failure left the transaction unusable.
    #[error("transaction is no longer usable: {0}")]
    TransactionFailed(String),

    /// The transaction has already been committed or rolled back.
    #[error("transaction already completed")]
    AlreadyCompleted,

    /// The operation is not allowed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// An invalid argument was provided.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A configuration error occurred.
    #[error("configuration error: {0}")]
    Config(String),

    /// A row could not be encoded for checksumming, or a value had the wrong type.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl Error {
    /// Returns `true` if running the whole transaction again may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Aborted(_) | Self::ConcurrentModification { .. })
    }

    /// Returns `true` if replay detected a concurrent modification.
    #[must_use]
    pub const fn is_concurrent_modification(&self) -> bool {
        matches!(self, Self::ConcurrentModification { .. })
    }

    /// Returns `true` if internal retrying gave up (budget or deadline).
    #[must_use]
    pub const fn is_retry_limit(&self) -> bool {
        matches!(self, Self::RetryBudgetExhausted { .. } | Self::RetryDeadlineExceeded { .. })
    }

    /// Returns `true` if the error leaves the transaction unusable.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::Aborted(_)
                | Self::ConcurrentModification { .. }
                | Self::RetryBudgetExhausted { .. }
                | Self::RetryDeadlineExceeded { .. }
                | Self::TransactionFailed(_)
        )
    }

    /// The underlying database error, for [`Error::Database`] and [`Error::Batch`].
    #[must_use]
    pub const fn database_error(&self) -> Option<&DatabaseError> {
        match self {
            Self::Database(e) | Self::Batch { source: e, .. } => Some(e),
            _ => None,
        }
    }

    /// Create a concurrent modification error.
    #[must_use]
    pub fn concurrent_modification(reason: impl Into<String>) -> Self {
        Self::ConcurrentModification { reason: reason.into() }
    }

    /// Create an invalid state error.
    #[must_use]
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create an invalid parameter error.
    #[must_use]
    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Create a config error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<ClientError> for Error {
    fn from(error: ClientError) -> Self {
        match error {
            ClientError::Aborted(aborted) => Self::Aborted(aborted),
            ClientError::Database(e) => Self::Database(e),
        }
    }
}

/// Result type alias for Spindle operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates() {
        let aborted = Error::Aborted(Aborted::new("conflict"));
        assert!(aborted.is_retryable());
        assert!(aborted.is_permanent());
        assert!(!aborted.is_retry_limit());

        let cm = Error::concurrent_modification("row count changed");
        assert!(cm.is_retryable());
        assert!(cm.is_concurrent_modification());

        let budget = Error::RetryBudgetExhausted { retries: 3, last_abort: Aborted::new("x") };
        assert!(budget.is_retry_limit());
        assert!(!budget.is_retryable());
        assert!(!budget.is_concurrent_modification());

        let db = Error::Database(DatabaseError::not_found("table t"));
        assert!(!db.is_permanent());
        assert_eq!(db.database_error(), Some(&DatabaseError::not_found("table t")));
    }

    #[test]
    fn client_error_conversion() {
        let err: Error = ClientError::Aborted(Aborted::new("conflict")).into();
        assert!(matches!(err, Error::Aborted(_)));

        let err: Error = ClientError::Database(DatabaseError::already_exists("k")).into();
        assert!(matches!(err, Error::Database(_)));
    }

    #[test]
    fn messages() {
        let err = Error::Batch {
            row_counts: vec![1, 2],
            source: DatabaseError::invalid_argument("bad column"),
        };
        assert_eq!(err.to_string(), "batch failed after 2 statements: INVALID_ARGUMENT: bad column");
        assert_eq!(
            Error::Aborted(Aborted::new("wounded")).to_string(),
            "transaction aborted: wounded"
        );
    }
}
