//! Core data types for `Spindle`.
//!
//! This module defines the values a query returns, the statements and mutations an
//! application sends, and the timestamp a successful commit produces.

mod mutation;
mod row;
mod statement;
mod timestamp;
mod value;

pub use mutation::{Mutation, MutationKind};
pub use row::Row;
pub use statement::Statement;
pub use timestamp::CommitTimestamp;
pub use value::Value;
