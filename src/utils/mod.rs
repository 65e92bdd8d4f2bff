//! Utility functions and helpers.

#[cfg(feature = "webhook")]
pub mod http;
pub mod log;
pub mod time;

use sha2::{Digest, Sha256};

/// Hex SHA-256 digest over a list of lines joined by `\n`.
pub fn content_digest(lines: &[String]) -> String {
    let mut hasher = Sha256::new();
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            hasher.update(b"\n");
        }
        hasher.update(line.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Treat blank strings as missing.
pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
