//! Scenario files.
//!
//! A scenario is a JSON document with an optional retry policy and a list of steps. Steps
//! either script the in-memory database (register results, inject aborts) or drive the
//! transaction under test. Steps run in order, so changing a registered result between
//! two transaction steps simulates a concurrent writer.
//!
//! ```json
//! {
//!   "name": "unseen row changes",
//!   "steps": [
//!     { "op": "set_rows", "sql": "SELECT id FROM t", "rows": [[1], [2]] },
//!     { "op": "abort_stream_after", "sql": "SELECT id FROM t", "rows": 1 },
//!     { "op": "query", "cursor": "c", "sql": "SELECT id FROM t" },
//!     { "op": "advance", "cursor": "c" },
//!     { "op": "set_rows", "sql": "SELECT id FROM t", "rows": [[1], [3]] },
//!     { "op": "advance", "cursor": "c", "count": 2 },
//!     { "op": "commit" }
//!   ]
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use spindle::{Jitter, RetryPolicy};
use spindle_client::ErrorCode;
use spindle_core::{Row, Value};

use crate::error::{CliError, Result};

/// A parsed scenario file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Human-readable name.
    #[serde(default)]
    pub name: Option<String>,
    /// Overrides of the default retry policy.
    #[serde(default)]
    pub retry_policy: PolicySpec,
    /// Whether aborts are retried internally.
    #[serde(default = "default_true")]
    pub enable_internal_retries: bool,
    /// Steps, in execution order.
    pub steps: Vec<Step>,
}

const fn default_true() -> bool {
    true
}

const fn default_one() -> usize {
    1
}

/// Retry policy overrides with millisecond durations.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicySpec {
    /// Delay before the first retry.
    pub initial_delay_ms: Option<u64>,
    /// Upper bound for any delay.
    pub max_delay_ms: Option<u64>,
    /// Backoff growth factor.
    pub multiplier: Option<f64>,
    /// Jitter mode.
    pub jitter: Option<Jitter>,
    /// Retry time budget from the first abort.
    pub total_timeout_ms: Option<u64>,
    /// Maximum number of retries.
    pub max_retries: Option<u32>,
}

impl PolicySpec {
    /// Apply the overrides to the default policy.
    pub fn to_policy(&self) -> RetryPolicy {
        let mut policy = RetryPolicy::default();
        if let Some(ms) = self.initial_delay_ms {
            policy.initial_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = self.max_delay_ms {
            policy.max_delay = Duration::from_millis(ms);
        }
        if let Some(multiplier) = self.multiplier {
            policy.multiplier = multiplier;
        }
        if let Some(jitter) = self.jitter {
            policy.jitter = jitter;
        }
        if let Some(ms) = self.total_timeout_ms {
            policy.total_timeout = Duration::from_millis(ms);
        }
        if let Some(max) = self.max_retries {
            policy.max_retries = max;
        }
        policy
    }
}

/// One scenario step.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", deny_unknown_fields)]
pub enum Step {
    /// Register an update count for a DML statement.
    SetUpdateCount {
        /// Statement text.
        sql: String,
        /// Rows affected.
        count: i64,
    },
    /// Register the rows a query returns.
    SetRows {
        /// Query text.
        sql: String,
        /// Rows, each an array of column values.
        rows: Vec<Vec<serde_json::Value>>,
    },
    /// Register a failure for a statement.
    SetError {
        /// Statement text.
        sql: String,
        /// Status code.
        code: ErrorCode,
        /// Error message.
        message: String,
    },
    /// Abort the attempt that sends the next statement.
    AbortNextStatement {
        /// Server-suggested retry delay.
        #[serde(default)]
        retry_delay_ms: Option<u64>,
    },
    /// Abort the next commit.
    AbortNextCommit {
        /// Server-suggested retry delay.
        #[serde(default)]
        retry_delay_ms: Option<u64>,
    },
    /// Abort the next execution of a query after it has returned some rows.
    AbortStreamAfter {
        /// Query text.
        sql: String,
        /// Rows returned before the abort.
        rows: usize,
    },
    /// Execute a DML statement.
    Execute {
        /// Statement text.
        sql: String,
    },
    /// Execute a batch of DML statements.
    Batch {
        /// Statement texts.
        sql: Vec<String>,
    },
    /// Open a named cursor over a query.
    Query {
        /// Cursor name used by later `advance` steps.
        cursor: String,
        /// Query text.
        sql: String,
    },
    /// Advance a cursor.
    Advance {
        /// Cursor name.
        cursor: String,
        /// Number of advances.
        #[serde(default = "default_one")]
        count: usize,
    },
    /// Buffer an insert mutation.
    Insert {
        /// Table name.
        table: String,
        /// Column names.
        columns: Vec<String>,
        /// One row of values.
        values: Vec<serde_json::Value>,
    },
    /// Commit the transaction.
    Commit,
    /// Roll back the transaction.
    Rollback,
}

impl Step {
    /// The step's `op` name.
    pub const fn op(&self) -> &'static str {
        match self {
            Self::SetUpdateCount { .. } => "set_update_count",
            Self::SetRows { .. } => "set_rows",
            Self::SetError { .. } => "set_error",
            Self::AbortNextStatement { .. } => "abort_next_statement",
            Self::AbortNextCommit { .. } => "abort_next_commit",
            Self::AbortStreamAfter { .. } => "abort_stream_after",
            Self::Execute { .. } => "execute",
            Self::Batch { .. } => "batch",
            Self::Query { .. } => "query",
            Self::Advance { .. } => "advance",
            Self::Insert { .. } => "insert",
            Self::Commit => "commit",
            Self::Rollback => "rollback",
        }
    }
}

/// Convert JSON column values to a row.
pub fn json_row(values: &[serde_json::Value]) -> Result<Row> {
    values.iter().map(json_value).collect::<Result<Vec<_>>>().map(Row::new)
}

/// Convert a JSON value to a column value.
pub fn json_value(value: &serde_json::Value) -> Result<Value> {
    Ok(match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Value::String(s.clone()),
        serde_json::Value::Array(items) => {
            Value::Array(items.iter().map(json_value).collect::<Result<_>>()?)
        }
        serde_json::Value::Object(_) => {
            return Err(CliError::InvalidScenario("objects are not valid column values".into()));
        }
    })
}

/// Load and parse a scenario file.
pub fn load(path: &Path) -> Result<Scenario> {
    if !path.exists() {
        return Err(CliError::ScenarioNotFound(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read scenario {}", path.display()))?;
    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_steps() {
        let scenario: Scenario = serde_json::from_str(
            r#"{
                "retry_policy": { "initial_delay_ms": 5, "jitter": "None" },
                "steps": [
                    { "op": "set_update_count", "sql": "UPDATE t SET x = 1", "count": 2 },
                    { "op": "set_error", "sql": "INSERT", "code": "AlreadyExists", "message": "dup" },
                    { "op": "advance", "cursor": "c" },
                    { "op": "commit" }
                ]
            }"#,
        )
        .expect("valid scenario");

        assert!(scenario.enable_internal_retries);
        assert_eq!(scenario.steps.len(), 4);
        assert!(matches!(scenario.steps[2], Step::Advance { count: 1, .. }));
        assert_eq!(scenario.steps[3].op(), "commit");

        let policy = scenario.retry_policy.to_policy();
        assert_eq!(policy.initial_delay, Duration::from_millis(5));
        assert_eq!(policy.jitter, Jitter::None);
        assert_eq!(policy.max_retries, RetryPolicy::default().max_retries);
    }

    #[test]
    fn rejects_unknown_ops() {
        let result: std::result::Result<Scenario, _> =
            serde_json::from_str(r#"{ "steps": [ { "op": "explode" } ] }"#);
        assert!(result.is_err());
    }

    #[test]
    fn converts_json_values() {
        let row = json_row(&serde_json::from_str::<Vec<serde_json::Value>>(
            r#"[1, 2.5, "a", true, null, [1, 2]]"#,
        )
        .expect("json"))
        .expect("row");
        assert_eq!(
            row.values(),
            &[
                Value::Int(1),
                Value::Float(2.5),
                Value::from("a"),
                Value::Bool(true),
                Value::Null,
                Value::Array(vec![Value::Int(1), Value::Int(2)]),
            ]
        );
        assert!(json_value(&serde_json::json!({ "a": 1 })).is_err());
    }
}
