//! Encoding for [`Row`]: a 4-byte column count followed by each encoded value.

use crate::error::CoreError;
use crate::types::Row;

use super::traits::Encoder;
use super::value::encode_len;

impl Encoder for Row {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), CoreError> {
        encode_len(self.len(), "row", buf)?;
        for value in self.values() {
            value.encode_to(buf)?;
        }
        Ok(())
    }
}
