//! Fluent statement builder bound to a transaction.

use spindle_client::DatabaseClient;
use spindle_core::{Statement, Value};

use super::retriable::RetriableTransaction;
use super::stream::ChecksummingResultStream;
use crate::error::Result;

/// A statement under construction, bound to the transaction that will run it.
///
/// ```ignore
/// let updated = tx
///     .command("UPDATE accounts SET balance = balance - @amount WHERE id = @id")
///     .bind("amount", 100i64)
///     .bind("id", 7i64)
///     .execute_update()
///     .await?;
/// ```
#[derive(Debug)]
pub struct Command<'a, C: DatabaseClient> {
    transaction: &'a RetriableTransaction<C>,
    statement: Statement,
}

impl<'a, C: DatabaseClient> Command<'a, C> {
    pub(crate) const fn new(transaction: &'a RetriableTransaction<C>, statement: Statement) -> Self {
        Self { transaction, statement }
    }

    /// Bind a named parameter.
    #[must_use]
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.statement = self.statement.bind(name, value);
        self
    }

    /// The statement built so far.
    #[must_use]
    pub const fn statement(&self) -> &Statement {
        &self.statement
    }

    /// Run the statement as DML and return the affected row count.
    ///
    /// # Errors
    ///
    /// See [`RetriableTransaction::execute`].
    pub async fn execute_update(self) -> Result<i64> {
        self.transaction.execute(self.statement).await
    }

    /// Run the statement as a query and return a cursor.
    ///
    /// # Errors
    ///
    /// See [`RetriableTransaction::execute_query`].
    pub async fn execute_query(self) -> Result<ChecksummingResultStream<C>> {
        self.transaction.execute_query(self.statement).await
    }

    /// Run the statement as a query and return the first column of the first row.
    ///
    /// Only the first row is read, so later rows are not covered by the retry checksum.
    ///
    /// # Errors
    ///
    /// See [`RetriableTransaction::execute_query`].
    pub async fn execute_scalar(self) -> Result<Option<Value>> {
        let mut stream = self.transaction.execute_query(self.statement).await?;
        if stream.advance().await? {
            Ok(stream.row().and_then(|row| row.get(0)).cloned())
        } else {
            Ok(None)
        }
    }
}
