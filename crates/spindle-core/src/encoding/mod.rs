//! Deterministic binary encoding of result data.
//!
//! Result checksums hash the bytes produced here, so the encoding must be a pure function
//! of the value: the same value always yields the same bytes and two different values never
//! yield the same bytes. Every value starts with a one-byte type tag, which keeps an `INT64`
//! of 1 distinct from a `TIMESTAMP` of 1.
//!
//! # Encoding Traits
//!
//! - [`Encoder`] - Serialize types to bytes
//!
//! # Example
//!
//! ```
//! use spindle_core::encoding::Encoder;
//! use spindle_core::{Row, Value};
//!
//! let row = Row::new(vec![Value::Int(1), Value::from("a")]);
//! let bytes = row.encode().unwrap();
//! assert_eq!(bytes[..4], 2u32.to_be_bytes());
//! ```

mod row;
mod traits;
pub mod value;

#[cfg(test)]
mod proptest_tests;

pub use traits::{Encoder, FORMAT_VERSION};
