//! Command implementations.

pub mod policy;
pub mod simulate;
