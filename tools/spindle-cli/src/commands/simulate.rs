//! Run a scenario against the in-memory database.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use spindle::{
    ChecksummingResultStream, Connection, Mutation, RetriableTransaction, RetryMetricsSnapshot,
    TransactionOptions, TransactionState,
};
use spindle_client::backends::MemoryDatabase;
use spindle_client::{Aborted, DatabaseError};
use tracing::info;

use crate::error::{CliError, Result};
use crate::output;
use crate::scenario::{self, json_row, json_value, Scenario, Step};
use crate::OutputFormat;

/// Result of one step.
#[derive(Debug, Serialize)]
pub struct StepReport {
    /// Position in the scenario.
    pub index: usize,
    /// The step's `op` name.
    pub op: &'static str,
    /// What happened, for transaction steps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Whether the step failed.
    pub failed: bool,
    /// Retry count of the transaction after the step.
    pub retry_count: u32,
}

/// Result of a whole scenario.
#[derive(Debug, Serialize)]
pub struct Report {
    /// Scenario name.
    pub scenario: String,
    /// Final transaction state.
    pub outcome: String,
    /// Internal retries performed.
    pub retry_count: u32,
    /// Commit timestamp in microseconds, if the transaction committed.
    pub commit_timestamp: Option<i64>,
    /// Per-step results.
    pub steps: Vec<StepReport>,
    /// Requests the database received.
    pub requests: usize,
    /// Retry metrics.
    pub metrics: RetryMetricsSnapshot,
}

/// Load the scenario at `path`, run it and print the report.
pub async fn run(
    path: &Path,
    max_retries: Option<u32>,
    disable_retries: bool,
    format: OutputFormat,
) -> Result<()> {
    let scenario = scenario::load(path)?;
    let name = scenario
        .name
        .clone()
        .unwrap_or_else(|| path.file_stem().map_or_else(String::new, |s| s.to_string_lossy().into_owned()));
    let report = simulate(name, scenario, max_retries, disable_retries).await?;
    println!("{}", output::format_report(&report, format)?);
    Ok(())
}

/// Run a parsed scenario.
pub async fn simulate(
    name: String,
    scenario: Scenario,
    max_retries: Option<u32>,
    disable_retries: bool,
) -> Result<Report> {
    let db = MemoryDatabase::new();
    let conn = Connection::new(db.clone());

    let mut options = TransactionOptions::new()
        .retry_policy(scenario.retry_policy.to_policy())
        .enable_internal_retries(scenario.enable_internal_retries && !disable_retries);
    if let Some(max) = max_retries {
        options = options.max_internal_retry_count(max);
    }

    // Setup steps before the first transaction step run before the transaction begins.
    let first_tx_step = scenario.steps.iter().position(is_transaction_step);
    let split = first_tx_step.unwrap_or(scenario.steps.len());
    let mut reports = Vec::with_capacity(scenario.steps.len());
    for (index, step) in scenario.steps[..split].iter().enumerate() {
        script(&db, step)?;
        reports.push(StepReport { index, op: step.op(), result: None, failed: false, retry_count: 0 });
    }

    let tx = conn.begin_transaction_with(options).await?;
    info!(scenario = %name, tx = tx.id(), "scenario started");
    let mut cursors = HashMap::new();
    for (index, step) in scenario.steps.iter().enumerate().skip(split) {
        let (result, failed) = if is_transaction_step(step) {
            match drive(&tx, &mut cursors, step).await {
                Ok(result) => (Some(result), false),
                Err(error) => (Some(error.to_string()), true),
            }
        } else {
            script(&db, step)?;
            (None, false)
        };
        reports.push(StepReport { index, op: step.op(), result, failed, retry_count: tx.retry_count() });
    }

    let outcome = match tx.state() {
        TransactionState::Active => "active",
        TransactionState::Committed => "committed",
        TransactionState::RolledBack => "rolled_back",
        TransactionState::Failed => "failed",
    };
    Ok(Report {
        scenario: name,
        outcome: outcome.to_owned(),
        retry_count: tx.retry_count(),
        commit_timestamp: tx.commit_timestamp().map(|ts| ts.as_micros()),
        steps: reports,
        requests: db.requests().len(),
        metrics: conn.metrics(),
    })
}

const fn is_transaction_step(step: &Step) -> bool {
    matches!(
        step,
        Step::Execute { .. }
            | Step::Batch { .. }
            | Step::Query { .. }
            | Step::Advance { .. }
            | Step::Insert { .. }
            | Step::Commit
            | Step::Rollback
    )
}

fn aborted(retry_delay_ms: Option<u64>) -> Aborted {
    let aborted = Aborted::new("aborted by scenario");
    match retry_delay_ms {
        Some(ms) => aborted.with_retry_delay(Duration::from_millis(ms)),
        None => aborted,
    }
}

/// Apply a database scripting step.
fn script(db: &MemoryDatabase, step: &Step) -> Result<()> {
    match step {
        Step::SetUpdateCount { sql, count } => db.put_update_count(sql.as_str(), *count),
        Step::SetRows { sql, rows } => {
            let rows = rows.iter().map(|r| json_row(r)).collect::<Result<Vec<_>>>()?;
            db.put_query_rows(sql.as_str(), rows);
        }
        Step::SetError { sql, code, message } => {
            db.put_error(sql.as_str(), DatabaseError::new(*code, message.as_str()));
        }
        Step::AbortNextStatement { retry_delay_ms } => {
            db.abort_next_statement_with(aborted(*retry_delay_ms));
        }
        Step::AbortNextCommit { retry_delay_ms } => db.abort_next_commit_with(aborted(*retry_delay_ms)),
        Step::AbortStreamAfter { sql, rows } => db.abort_stream_after(sql.as_str(), *rows),
        other => {
            return Err(CliError::InvalidScenario(format!("`{}` is not a database step", other.op())));
        }
    }
    Ok(())
}

/// Apply a transaction step and describe its result.
async fn drive(
    tx: &RetriableTransaction<MemoryDatabase>,
    cursors: &mut HashMap<String, ChecksummingResultStream<MemoryDatabase>>,
    step: &Step,
) -> std::result::Result<String, spindle::Error> {
    match step {
        Step::Execute { sql } => Ok(format!("{} rows updated", tx.execute(sql.as_str()).await?)),
        Step::Batch { sql } => {
            Ok(format!("row counts {:?}", tx.execute_batch(sql.iter().map(String::as_str)).await?))
        }
        Step::Query { cursor, sql } => {
            let stream = tx.execute_query(sql.as_str()).await?;
            cursors.insert(cursor.clone(), stream);
            Ok(format!("cursor `{cursor}` opened"))
        }
        Step::Advance { cursor, count } => {
            let stream = cursors.get_mut(cursor).ok_or_else(|| {
                spindle::Error::invalid_parameter(format!("no cursor named `{cursor}`"))
            })?;
            let mut seen = Vec::with_capacity(*count);
            for _ in 0..*count {
                if stream.advance().await? {
                    seen.push(stream.row().map_or_else(String::new, output::format_row));
                } else {
                    seen.push("<end>".to_owned());
                }
            }
            Ok(seen.join(", "))
        }
        Step::Insert { table, columns, values } => {
            let row = values
                .iter()
                .map(json_value)
                .collect::<Result<Vec<_>>>()
                .map_err(|e| spindle::Error::invalid_parameter(e.to_string()))?;
            tx.buffer_mutation(Mutation::insert(table.as_str()).with_columns(columns.iter()).with_row(row))
                .await?;
            Ok(format!("insert into `{table}` buffered"))
        }
        Step::Commit => Ok(format!("committed at {}", tx.commit().await?)),
        Step::Rollback => {
            tx.rollback().await?;
            Ok("rolled back".to_owned())
        }
        other => Err(spindle::Error::invalid_parameter(format!(
            "`{}` is not a transaction step",
            other.op()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Scenario {
        serde_json::from_str(json).expect("valid scenario")
    }

    #[tokio::test(start_paused = true)]
    async fn bundled_retry_scenario_commits() {
        let scenario = parse(include_str!("../../scenarios/commit_abort.json"));
        let report = simulate("commit_abort".into(), scenario, None, false).await.expect("report");
        assert_eq!(report.outcome, "committed");
        assert_eq!(report.retry_count, 1);
        assert!(report.commit_timestamp.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn bundled_modification_scenario_fails() {
        let scenario = parse(include_str!("../../scenarios/seen_row_changed.json"));
        let report = simulate("seen".into(), scenario, None, false).await.expect("report");
        assert_eq!(report.outcome, "failed");
        assert!(report.steps.iter().any(|s| s.failed));
        assert_eq!(report.metrics.concurrent_modifications, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unseen_rows_may_change() {
        let scenario = parse(include_str!("../../scenarios/unseen_row_changed.json"));
        let report = simulate("unseen".into(), scenario, None, false).await.expect("report");
        assert_eq!(report.outcome, "committed");
        assert_eq!(report.retry_count, 1);
        let last_advance = report.steps.iter().rev().find(|s| s.op == "advance").expect("advance");
        assert_eq!(last_advance.result.as_deref(), Some("(3, 'cy'), <end>"));
    }

    #[tokio::test(start_paused = true)]
    async fn batch_count_change_is_detected() {
        let scenario = parse(include_str!("../../scenarios/batch_changed.json"));
        let report = simulate("batch".into(), scenario, None, false).await.expect("report");
        assert_eq!(report.outcome, "failed");
        assert!(report.steps.last().expect("commit step").failed);
    }

    #[test]
    fn bundled_scenarios_parse() {
        for json in [
            include_str!("../../scenarios/commit_abort.json"),
            include_str!("../../scenarios/row_count_changed.json"),
            include_str!("../../scenarios/unseen_row_changed.json"),
            include_str!("../../scenarios/seen_row_changed.json"),
            include_str!("../../scenarios/batch_changed.json"),
            include_str!("../../scenarios/stream_abort.json"),
        ] {
            let scenario = parse(json);
            assert!(!scenario.steps.is_empty());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn disabling_retries_surfaces_abort() {
        let scenario = parse(include_str!("../../scenarios/commit_abort.json"));
        let report = simulate("no retries".into(), scenario, None, true).await.expect("report");
        assert_eq!(report.outcome, "failed");
        assert_eq!(report.retry_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_cursor_is_a_failed_step() {
        let scenario = parse(r#"{ "steps": [ { "op": "advance", "cursor": "missing" } ] }"#);
        let report = simulate("bad".into(), scenario, None, false).await.expect("report");
        assert!(report.steps[0].failed);
        assert_eq!(report.outcome, "active");
    }
}
