//! Client error types.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status codes a database can return for a failed request.
///
/// `Aborted` is deliberately absent: an abort is not an ordinary failure and is reported
/// as [`ClientError::Aborted`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// The request was cancelled by the caller.
    Cancelled,
    /// Unknown error.
    Unknown,
    /// The statement or its parameters are invalid.
    InvalidArgument,
    /// The request deadline expired before completion.
    DeadlineExceeded,
    /// A referenced table, column or row does not exist.
    NotFound,
    /// A row being inserted already exists.
    AlreadyExists,
    /// The caller lacks permission.
    PermissionDenied,
    /// A quota or resource limit was hit.
    ResourceExhausted,
    /// The system is not in a state that allows the operation.
    FailedPrecondition,
    /// A value was outside the valid range.
    OutOfRange,
    /// The operation is not implemented.
    Unimplemented,
    /// Internal server error.
    Internal,
    /// The service is temporarily unavailable.
    Unavailable,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Cancelled => "CANCELLED",
            Self::Unknown => "UNKNOWN",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::NotFound => "NOT_FOUND",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Self::FailedPrecondition => "FAILED_PRECONDITION",
            Self::OutOfRange => "OUT_OF_RANGE",
            Self::Unimplemented => "UNIMPLEMENTED",
            Self::Internal => "INTERNAL",
            Self::Unavailable => "UNAVAILABLE",
        };
        f.write_str(name)
    }
}

/// A non-abort failure reported by the database.
///
/// Equality compares the code, the message and the whole chain of nested causes. Replay
/// uses it to decide whether a statement that failed before failed the same way again.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct DatabaseError {
    /// The status code.
    pub code: ErrorCode,
    /// The server's error message.
    pub message: String,
    /// The underlying cause, if the server reported one.
    #[source]
    #[serde(default)]
    pub cause: Option<Box<DatabaseError>>,
}

impl DatabaseError {
    /// Creates an error without a cause.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), cause: None }
    }

    /// Attaches a nested cause.
    #[must_use]
    pub fn with_cause(mut self, cause: DatabaseError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Shorthand for an [`ErrorCode::AlreadyExists`] error.
    #[must_use]
    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AlreadyExists, message)
    }

    /// Shorthand for an [`ErrorCode::NotFound`] error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Shorthand for an [`ErrorCode::InvalidArgument`] error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    /// Shorthand for an [`ErrorCode::FailedPrecondition`] error.
    #[must_use]
    pub fn failed_precondition(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::FailedPrecondition, message)
    }
}

/// The database aborted the transaction attempt.
///
/// The attempt is dead: every later request on it fails the same way. The whole
/// transaction has to be started again from scratch.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("transaction aborted: {message}")]
pub struct Aborted {
    /// The server's explanation, typically naming the conflicting transaction.
    pub message: String,
    /// How long the server suggests waiting before the next attempt.
    #[serde(default)]
    pub retry_delay: Option<Duration>,
}

impl Aborted {
    /// Creates an abort without a suggested delay.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), retry_delay: None }
    }

    /// Sets the server-suggested retry delay.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }
}

/// Errors returned by a [`TransactionAttempt`](super::TransactionAttempt).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The attempt was aborted and must be retried from the start.
    #[error(transparent)]
    Aborted(#[from] Aborted),

    /// Any other failure.
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl ClientError {
    /// Returns `true` if this is an abort.
    #[must_use]
    pub const fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted(_))
    }

    /// Returns the database error, if this is not an abort.
    #[must_use]
    pub const fn as_database_error(&self) -> Option<&DatabaseError> {
        match self {
            Self::Database(e) => Some(e),
            Self::Aborted(_) => None,
        }
    }
}

/// Result type alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
