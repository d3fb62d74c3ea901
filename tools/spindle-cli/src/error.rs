//! Error types for the CLI.

use std::path::PathBuf;

use thiserror::Error;

/// CLI-specific result type.
pub type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
pub enum CliError {
    /// Scenario file not found.
    #[error("scenario not found: {0}")]
    ScenarioNotFound(PathBuf),

    /// The scenario is well-formed JSON but cannot be run.
    #[error("invalid scenario: {0}")]
    InvalidScenario(String),

    /// Spindle error outside of a scenario step.
    #[error("transaction error: {0}")]
    Transaction(#[from] spindle::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Logging filter error.
    #[error("invalid log filter: {0}")]
    LogFilter(#[from] tracing_subscriber::filter::ParseError),

    /// Any other error, with context.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
