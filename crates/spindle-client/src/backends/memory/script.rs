//! Scripted outcomes and the request log.

use serde::{Deserialize, Serialize};
use spindle_core::{CommitTimestamp, Mutation, Row, Statement};

use crate::engine::DatabaseError;

/// The registered outcome of a statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StatementResult {
    /// A DML statement affecting this many rows.
    UpdateCount(i64),
    /// A query returning these rows.
    Rows(Vec<Row>),
    /// A query that returns these rows and then fails.
    RowsThenError {
        /// Rows returned before the failure.
        rows: Vec<Row>,
        /// The failure raised after the last row.
        error: DatabaseError,
    },
    /// A statement that fails. For queries the failure surfaces on the first row.
    Error(DatabaseError),
}

/// A request received by the in-memory database.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// A new attempt was begun.
    Begin {
        /// The new attempt.
        attempt_id: u64,
    },
    /// A DML statement.
    Execute {
        /// The attempt the statement ran on.
        attempt_id: u64,
        /// The statement.
        statement: Statement,
    },
    /// A DML batch.
    ExecuteBatch {
        /// The attempt the batch ran on.
        attempt_id: u64,
        /// The statements.
        statements: Vec<Statement>,
    },
    /// A streaming query.
    ExecuteStreaming {
        /// The attempt the query ran on.
        attempt_id: u64,
        /// The query.
        statement: Statement,
    },
    /// A commit request.
    Commit {
        /// The attempt being committed.
        attempt_id: u64,
        /// Number of mutations sent with the commit.
        mutations: usize,
    },
    /// A rollback request.
    Rollback {
        /// The attempt being rolled back.
        attempt_id: u64,
    },
}

impl Request {
    /// The attempt this request was sent on.
    #[must_use]
    pub const fn attempt_id(&self) -> u64 {
        match self {
            Self::Begin { attempt_id }
            | Self::Execute { attempt_id, .. }
            | Self::ExecuteBatch { attempt_id, .. }
            | Self::ExecuteStreaming { attempt_id, .. }
            | Self::Commit { attempt_id, .. }
            | Self::Rollback { attempt_id } => *attempt_id,
        }
    }
}

/// A transaction that committed successfully.
#[derive(Debug, Clone, PartialEq)]
pub struct CommittedTransaction {
    /// The attempt that committed.
    pub attempt_id: u64,
    /// The assigned commit timestamp.
    pub timestamp: CommitTimestamp,
    /// The mutations applied by the commit.
    pub mutations: Vec<Mutation>,
}
