//! Running checksum over the rows a cursor has returned.

use std::fmt;

use sha2::{Digest, Sha256};
use spindle_core::encoding::{Encoder, FORMAT_VERSION};
use spindle_core::{CoreError, Row};

/// Marker hashed for an advance that returned a row.
const ROW_MARKER: u8 = 1;
/// Marker hashed for an advance that reported the end of the results.
const END_MARKER: u8 = 0;

/// Length of a checksum digest in bytes.
pub const DIGEST_LEN: usize = 32;

/// A SHA-256 checksum over the sequence of advance results of one cursor.
///
/// Each step contributes a marker byte and, for a row, the row's deterministic encoding.
/// Two states compare equal only if they saw the same number of steps with the same
/// rows in the same order.
#[derive(Clone)]
pub struct ChecksumState {
    hasher: Sha256,
    steps: usize,
}

impl ChecksumState {
    /// Create the checksum of an empty sequence.
    #[must_use]
    pub fn new() -> Self {
        let mut hasher = Sha256::new();
        hasher.update([FORMAT_VERSION]);
        Self { hasher, steps: 0 }
    }

    /// Fold in one advance result: `Some(row)` or `None` for the end of the results.
    ///
    /// # Errors
    ///
    /// Returns an error if the row cannot be encoded.
    pub fn update(&mut self, row: Option<&Row>) -> Result<(), CoreError> {
        match row {
            Some(row) => {
                let mut buf = Vec::with_capacity(64);
                buf.push(ROW_MARKER);
                row.encode_to(&mut buf)?;
                self.hasher.update(&buf);
            }
            None => self.hasher.update([END_MARKER]),
        }
        self.steps += 1;
        Ok(())
    }

    /// Number of steps folded in so far.
    #[must_use]
    pub const fn steps(&self) -> usize {
        self.steps
    }

    /// The digest of everything folded in so far. The state itself is not consumed.
    #[must_use]
    pub fn digest(&self) -> [u8; DIGEST_LEN] {
        self.hasher.clone().finalize().into()
    }
}

impl Default for ChecksumState {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for ChecksumState {
    fn eq(&self, other: &Self) -> bool {
        self.steps == other.steps && self.digest() == other.digest()
    }
}

impl Eq for ChecksumState {}

impl fmt::Debug for ChecksumState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex: String = self.digest().iter().map(|b| format!("{b:02x}")).collect();
        f.debug_struct("ChecksumState").field("steps", &self.steps).field("digest", &hex).finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use proptest::prelude::*;
    use spindle_core::Value;

    use super::*;

    fn row(n: i64) -> Row {
        Row::new(vec![Value::Int(n), Value::from(format!("name-{n}"))])
    }

    fn checksum(rows: &[Option<Row>]) -> ChecksumState {
        let mut state = ChecksumState::new();
        for r in rows {
            state.update(r.as_ref()).unwrap();
        }
        state
    }

    #[test]
    fn empty_states_are_equal() {
        assert_eq!(ChecksumState::new(), ChecksumState::default());
        assert_eq!(ChecksumState::new().steps(), 0);
    }

    #[test]
    fn same_rows_same_checksum() {
        let a = checksum(&[Some(row(1)), Some(row(2)), None]);
        let b = checksum(&[Some(row(1)), Some(row(2)), None]);
        assert_eq!(a, b);
        assert_eq!(a.steps(), 3);
    }

    #[test]
    fn order_matters() {
        let a = checksum(&[Some(row(1)), Some(row(2))]);
        let b = checksum(&[Some(row(2)), Some(row(1))]);
        assert_ne!(a, b);
    }

    #[test]
    fn end_marker_counts() {
        let a = checksum(&[Some(row(1))]);
        let b = checksum(&[Some(row(1)), None]);
        let c = checksum(&[Some(row(1)), None, None]);
        assert_ne!(a, b);
        assert_ne!(b, c);
    }

    #[test]
    fn digest_does_not_consume() {
        let mut state = checksum(&[Some(row(1))]);
        let first = state.digest();
        assert_eq!(first, state.digest());
        state.update(Some(&row(2))).unwrap();
        assert_ne!(first, state.digest());
    }

    #[test]
    fn row_boundaries_are_unambiguous() {
        let split = checksum(&[
            Some(Row::new(vec![Value::Int(1)])),
            Some(Row::new(vec![Value::Int(2)])),
        ]);
        let joined = checksum(&[Some(Row::new(vec![Value::Int(1), Value::Int(2)]))]);
        assert_ne!(split, joined);
    }

    proptest! {
        #[test]
        fn equal_iff_same_sequence(
            a in proptest::collection::vec(proptest::option::of(-5i64..5), 0..8),
            b in proptest::collection::vec(proptest::option::of(-5i64..5), 0..8),
        ) {
            let to_rows = |v: &[Option<i64>]| v.iter().map(|x| x.map(row)).collect::<Vec<_>>();
            let (ca, cb) = (checksum(&to_rows(&a)), checksum(&to_rows(&b)));
            prop_assert_eq!(ca == cb, a == b);
        }

        #[test]
        fn prefix_never_matches_longer_sequence(
            rows in proptest::collection::vec(any::<i64>(), 1..8),
        ) {
            let all: Vec<_> = rows.iter().map(|&n| Some(row(n))).collect();
            let prefix = checksum(&all[..all.len() - 1]);
            prop_assert_ne!(prefix, checksum(&all));
        }
    }
}
