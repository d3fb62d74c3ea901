//! Client backend implementations.
//!
//! - [`memory`] - A scripted in-memory database for tests and simulations

pub mod memory;

pub use memory::{
    CommittedTransaction, MemoryAttempt, MemoryDatabase, MemoryRowStream, Request, StatementResult,
};
