//! Output formatting utilities.

use std::fmt::Write as _;

use spindle::{RetryPolicy, Row, Value};

use crate::commands::simulate::Report;
use crate::error::Result;
use crate::OutputFormat;

/// Format a scenario report according to the specified format.
pub fn format_report(report: &Report, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(report_as_text(report)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
    }
}

/// Format a retry policy according to the specified format.
pub fn format_policy(policy: &RetryPolicy, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(policy)?),
        OutputFormat::Text => Ok(format!(
            "initial delay: {:?}\nmax delay:     {:?}\nmultiplier:    {}\njitter:        {:?}\ntotal timeout: {:?}\nmax retries:   {}",
            policy.initial_delay,
            policy.max_delay,
            policy.multiplier,
            policy.jitter,
            policy.total_timeout,
            policy.max_retries,
        )),
    }
}

fn report_as_text(report: &Report) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "scenario: {}", report.scenario);
    for step in &report.steps {
        let marker = if step.failed { "!" } else { " " };
        match &step.result {
            Some(result) => {
                let _ = writeln!(out, "{marker} [{:>2}] {:<20} {result}", step.index, step.op);
            }
            None => {
                let _ = writeln!(out, "{marker} [{:>2}] {}", step.index, step.op);
            }
        }
    }
    let _ = writeln!(out, "outcome: {}", report.outcome);
    let _ = writeln!(out, "retries: {}", report.retry_count);
    if let Some(ts) = report.commit_timestamp {
        let _ = writeln!(out, "commit timestamp: {ts}");
    }
    let _ = writeln!(out, "requests: {}", report.requests);
    let m = &report.metrics;
    let _ = write!(
        out,
        "aborts: {}, successful replays: {}, concurrent modifications: {}",
        m.aborts, m.successful_replays, m.concurrent_modifications
    );
    out
}

/// Format a row as a parenthesized value list.
pub fn format_row(row: &Row) -> String {
    let values: Vec<String> = row.values().iter().map(Value::to_string).collect();
    format!("({})", values.join(", "))
}
