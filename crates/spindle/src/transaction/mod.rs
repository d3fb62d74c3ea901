//! Retriable transactions and their result cursors.
//!
//! - [`RetriableTransaction`] - Records every operation and replays it after an abort
//! - [`ChecksummingResultStream`] - Cursor whose consumed rows are checksummed for replay
//! - [`Command`] - Fluent statement builder bound to a transaction

mod command;
mod retriable;
mod stream;

pub use command::Command;
pub use retriable::{RetriableTransaction, TransactionState};
pub use stream::ChecksummingResultStream;
