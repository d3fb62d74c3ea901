//! Property-based tests for encoding determinism and injectivity.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use proptest::prelude::*;

use crate::encoding::Encoder;
use crate::types::{Row, Value};

/// Strategy for generating arbitrary `Value` instances.
fn arb_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        any::<f64>().prop_filter("not NaN", |f| !f.is_nan()).prop_map(Value::Float),
        ".*".prop_map(Value::String),
        prop::collection::vec(any::<u8>(), 0..64).prop_map(Value::Bytes),
        any::<i64>().prop_map(Value::Timestamp),
        any::<i32>().prop_map(Value::Date),
    ];

    leaf.prop_recursive(
        3,  // depth
        64, // size
        10, // items per collection
        |inner| prop::collection::vec(inner, 0..10).prop_map(Value::Array),
    )
}

fn arb_row() -> impl Strategy<Value = Row> {
    prop::collection::vec(arb_value(), 0..8).prop_map(Row::new)
}

proptest! {
    #[test]
    fn encoding_is_deterministic(row in arb_row()) {
        let a = row.encode().expect("encoding should succeed");
        let b = row.clone().encode().expect("encoding should succeed");
        prop_assert_eq!(a, b);
    }

    #[test]
    fn distinct_rows_encode_differently(a in arb_row(), b in arb_row()) {
        // -0.0 == 0.0 under PartialEq but the encodings differ, which only makes the
        // checksum stricter, so only the forward direction is asserted.
        if a.encode().unwrap() == b.encode().unwrap() {
            prop_assert_eq!(a, b);
        }
    }

    #[test]
    fn encoded_row_starts_with_column_count(row in arb_row()) {
        let bytes = row.encode().unwrap();
        let count = u32::from_be_bytes(bytes[..4].try_into().unwrap());
        prop_assert_eq!(count as usize, row.len());
    }
}
