//! Hex text conversion for the caller-facing wire representation.

use crate::error::{PelicanoError, Result};

/// Encode bytes as uppercase hex, two digits per byte.
pub fn encode(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}

/// Decode hex text (either case) into bytes. Empty input decodes to nothing.
pub fn decode(text: &str) -> Result<Vec<u8>> {
    if text.is_empty() {
        return Ok(Vec::new());
    }
    hex::decode(text).map_err(|e| PelicanoError::MalformedHex(e.to_string()))
}

/// Render `value` as one byte of hex text.
pub fn to_hex8(value: u64) -> Result<String> {
    to_hex_width(value, 1)
}

/// Render `value` as two bytes of hex text.
pub fn to_hex16(value: u64) -> Result<String> {
    to_hex_width(value, 2)
}

/// Render `value` as four bytes of hex text.
pub fn to_hex32(value: u64) -> Result<String> {
    to_hex_width(value, 4)
}

fn to_hex_width(value: u64, width: usize) -> Result<String> {
    let bits = width * 8;
    if bits < 64 && value >> bits != 0 {
        return Err(PelicanoError::ValueOutOfRange { value, width });
    }
    Ok(format!("{:0digits$X}", value, digits = width * 2))
}

/// Format bytes for debug logs, space separated.
pub(crate) fn debug_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
