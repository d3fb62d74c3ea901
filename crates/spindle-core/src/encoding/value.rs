//! Encoding for [`Value`] types.
//!
//! # Format
//!
//! Each value is encoded with a 1-byte type tag followed by the payload:
//!
//! - `Null`: `0x00`
//! - `Bool`: `0x01` + `0x00` (false) or `0x01` (true)
//! - `Int`: `0x02` + 8 bytes (big-endian i64)
//! - `Float`: `0x03` + 8 bytes (big-endian IEEE 754 bits)
//! - `String`: `0x04` + 4 bytes length + UTF-8 bytes
//! - `Bytes`: `0x05` + 4 bytes length + raw bytes
//! - `Timestamp`: `0x06` + 8 bytes (big-endian i64 microseconds)
//! - `Date`: `0x07` + 4 bytes (big-endian i32 days)
//! - `Array`: `0x08` + 4 bytes length (count) + encoded values

use crate::error::CoreError;
use crate::types::Value;

use super::traits::Encoder;

/// Type tags for value variants.
mod tags {
    pub const NULL: u8 = 0x00;
    pub const BOOL: u8 = 0x01;
    pub const INT: u8 = 0x02;
    pub const FLOAT: u8 = 0x03;
    pub const STRING: u8 = 0x04;
    pub const BYTES: u8 = 0x05;
    pub const TIMESTAMP: u8 = 0x06;
    pub const DATE: u8 = 0x07;
    pub const ARRAY: u8 = 0x08;
}

/// Append a big-endian `u32` length prefix.
pub(crate) fn encode_len(
    len: usize,
    what: &'static str,
    buf: &mut Vec<u8>,
) -> Result<(), CoreError> {
    let prefix = u32::try_from(len).map_err(|_| CoreError::TooLong { what, len })?;
    buf.extend_from_slice(&prefix.to_be_bytes());
    Ok(())
}

impl Encoder for Value {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), CoreError> {
        match self {
            Self::Null => buf.push(tags::NULL),
            Self::Bool(b) => {
                buf.push(tags::BOOL);
                buf.push(u8::from(*b));
            }
            Self::Int(i) => {
                buf.push(tags::INT);
                buf.extend_from_slice(&i.to_be_bytes());
            }
            Self::Float(f) => {
                buf.push(tags::FLOAT);
                buf.extend_from_slice(&f.to_bits().to_be_bytes());
            }
            Self::String(s) => {
                buf.push(tags::STRING);
                encode_len(s.len(), "string", buf)?;
                buf.extend_from_slice(s.as_bytes());
            }
            Self::Bytes(b) => {
                buf.push(tags::BYTES);
                encode_len(b.len(), "bytes", buf)?;
                buf.extend_from_slice(b);
            }
            Self::Timestamp(us) => {
                buf.push(tags::TIMESTAMP);
                buf.extend_from_slice(&us.to_be_bytes());
            }
            Self::Date(days) => {
                buf.push(tags::DATE);
                buf.extend_from_slice(&days.to_be_bytes());
            }
            Self::Array(arr) => {
                buf.push(tags::ARRAY);
                encode_len(arr.len(), "array", buf)?;
                for val in arr {
                    val.encode_to(buf)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn encode_null_and_bool() {
        assert_eq!(Value::Null.encode().unwrap(), vec![tags::NULL]);
        assert_eq!(Value::Bool(true).encode().unwrap(), vec![tags::BOOL, 1]);
        assert_eq!(Value::Bool(false).encode().unwrap(), vec![tags::BOOL, 0]);
    }

    #[test]
    fn encode_int_is_big_endian() {
        let bytes = Value::Int(1).encode().unwrap();
        assert_eq!(bytes, vec![tags::INT, 0, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn encode_string_has_length_prefix() {
        let bytes = Value::from("ab").encode().unwrap();
        assert_eq!(bytes, vec![tags::STRING, 0, 0, 0, 2, b'a', b'b']);
    }

    #[test]
    fn tags_separate_same_payload() {
        let int = Value::Int(7).encode().unwrap();
        let ts = Value::Timestamp(7).encode().unwrap();
        assert_ne!(int, ts);
        assert_eq!(int[1..], ts[1..]);
    }

    #[test]
    fn nested_arrays_are_unambiguous() {
        // [[1], 2] vs [[1, 2]]
        let a = Value::Array(vec![Value::Array(vec![Value::Int(1)]), Value::Int(2)]);
        let b = Value::Array(vec![Value::Array(vec![Value::Int(1), Value::Int(2)])]);
        assert_ne!(a.encode().unwrap(), b.encode().unwrap());
    }

    #[test]
    fn float_zero_signs_differ() {
        let pos = Value::Float(0.0).encode().unwrap();
        let neg = Value::Float(-0.0).encode().unwrap();
        assert_ne!(pos, neg);
    }
}
