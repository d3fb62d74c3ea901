//! The [`Encoder`] trait and the format version.

use crate::CoreError;

/// Version byte that starts every checksummed stream.
///
/// Bump it whenever the byte layout of any [`Encoder`] implementation changes.
pub const FORMAT_VERSION: u8 = 1;

/// Deterministic byte encoding.
///
/// Equal values must produce equal bytes and different values different bytes, on every
/// attempt and in every process, since the output feeds result checksums.
pub trait Encoder {
    /// Append the encoding of `self` to `buf`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TooLong`] if a length does not fit its 32-bit prefix.
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), CoreError>;

    /// The encoding of `self` as a new buffer.
    ///
    /// # Errors
    ///
    /// Same as [`encode_to`](Self::encode_to).
    fn encode(&self) -> Result<Vec<u8>, CoreError> {
        let mut buf = Vec::with_capacity(16);
        self.encode_to(&mut buf)?;
        Ok(buf)
    }
}
