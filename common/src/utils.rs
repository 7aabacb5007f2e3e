//! Common Utilities
//! 
//! Provides utility functions used across the workspace

use bytes::Bytes;

/// Convert a byte slice to hex string for debugging
pub fn bytes_to_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Hex dump of at most `max_len` leading bytes, for trace logging of PDUs
pub fn hex_preview(data: &Bytes, max_len: usize) -> String {
    if data.len() <= max_len {
        bytes_to_hex(data)
    } else {
        format!("{} ...", bytes_to_hex(&data[..max_len]))
    }
}
