//! Counter value encoding
//!
//! The counter travels as a fixed-width 8-byte little-endian signed integer.
//! Peripheral and central share this module so both sides agree on layout.

use thiserror::Error;

/// Encoded width of the counter in bytes
pub const COUNTER_WIDTH: usize = 8;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Invalid counter payload length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Encode a counter value for a characteristic buffer
pub fn encode_counter(value: i64) -> [u8; COUNTER_WIDTH] {
    value.to_le_bytes()
}

/// Decode a characteristic payload back into a counter value
pub fn decode_counter(bytes: &[u8]) -> Result<i64, CodecError> {
    let raw: [u8; COUNTER_WIDTH] = bytes.try_into().map_err(|_| CodecError::InvalidLength {
        expected: COUNTER_WIDTH,
        actual: bytes.len(),
    })?;
    Ok(i64::from_le_bytes(raw))
}
