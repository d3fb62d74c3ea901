//! Cursor over query results that stays valid across retries.

use std::fmt;
use std::sync::Arc;

use spindle_client::{ClientError, DatabaseClient, RowStream};
use spindle_core::{Row, Statement, Value};
use tracing::debug;

use super::retriable::{Shared, StreamOf};
use crate::error::{Error, Result};
use crate::retry::recorded::QueryRecord;

/// A forward-only cursor over the rows of a query run inside a
/// [`RetriableTransaction`](crate::RetriableTransaction).
///
/// Every call to [`advance`](Self::advance) is folded into a running checksum, whether
/// it returns a row or the end of the results. If the database aborts the transaction
/// while rows are being read, `advance` retries the transaction itself. The query is
/// replayed up to exactly the position this cursor had reached and, if the checksum
/// matches, reading continues on the new attempt without the caller noticing.
pub struct ChecksummingResultStream<C: DatabaseClient> {
    shared: Arc<Shared<C>>,
    record: Arc<QueryRecord<StreamOf<C>>>,
    current: Option<Row>,
    consumed: usize,
}

impl<C: DatabaseClient> ChecksummingResultStream<C> {
    pub(crate) fn new(shared: Arc<Shared<C>>, record: Arc<QueryRecord<StreamOf<C>>>) -> Self {
        Self { shared, record, current: None, consumed: 0 }
    }

    /// The query this cursor reads.
    #[must_use]
    pub fn statement(&self) -> &Statement {
        &self.record.statement
    }

    /// Move to the next row. Returns `false` at the end of the results.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Database`] if the query fails; later calls return the same error.
    /// Returns a retry failure such as [`Error::ConcurrentModification`] if an abort
    /// could not be retried.
    pub async fn advance(&mut self) -> Result<bool> {
        loop {
            self.shared.check_usable()?;
            let mut query = self.record.state.lock().await;
            let generation = query.generation;
            let next = match query.stream.as_mut() {
                Some(stream) => self.shared.cancellable(stream.next()).await?,
                None => {
                    self.current = None;
                    return Err(query.error.clone().map_or_else(
                        || Error::invalid_state("result stream is closed"),
                        Error::Database,
                    ));
                }
            };

            match next {
                Ok(row) => {
                    query.checksum.update(row.as_ref())?;
                    query.consumed += 1;
                    self.consumed = query.consumed;
                    let has_row = row.is_some();
                    self.current = row;
                    return Ok(has_row);
                }
                Err(ClientError::Database(error)) => {
                    debug!(tx = self.shared.id(), sql = %self.record.statement.sql(), %error, "query failed mid-stream");
                    query.consumed += 1;
                    query.error = Some(error.clone());
                    query.stream = None;
                    self.consumed = query.consumed;
                    self.current = None;
                    return Err(Error::Database(error));
                }
                Err(ClientError::Aborted(aborted)) => {
                    drop(query);
                    self.current = None;
                    self.shared.retry_from_stream(aborted, generation).await?;
                }
            }
        }
    }

    /// Advance and return the new current row, or `None` at the end.
    ///
    /// # Errors
    ///
    /// Same as [`advance`](Self::advance).
    pub async fn next_row(&mut self) -> Result<Option<&Row>> {
        if self.advance().await? {
            Ok(self.current.as_ref())
        } else {
            Ok(None)
        }
    }

    /// The current row, if the last [`advance`](Self::advance) returned `true`.
    #[must_use]
    pub fn row(&self) -> Option<&Row> {
        self.current.as_ref()
    }

    /// A column of the current row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if there is no current row and
    /// [`Error::InvalidParameter`] if `index` is out of range.
    pub fn value(&self, index: usize) -> Result<&Value> {
        let row = self.current.as_ref().ok_or_else(|| Error::invalid_state("no current row"))?;
        row.get(index).ok_or_else(|| {
            Error::invalid_parameter(format!(
                "column index {index} out of range for row with {} columns",
                row.len()
            ))
        })
    }

    /// Number of advances performed on this cursor, including one that failed.
    #[must_use]
    pub const fn consumed_count(&self) -> usize {
        self.consumed
    }

    /// Read all remaining rows.
    ///
    /// # Errors
    ///
    /// Same as [`advance`](Self::advance).
    pub async fn collect_rows(&mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while self.advance().await? {
            if let Some(row) = &self.current {
                rows.push(row.clone());
            }
        }
        Ok(rows)
    }
}

impl<C: DatabaseClient> fmt::Debug for ChecksummingResultStream<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChecksummingResultStream")
            .field("sql", &self.record.statement.sql())
            .field("consumed", &self.consumed)
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}
