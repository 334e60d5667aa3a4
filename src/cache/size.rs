//! Byte-size estimation for cached values.

use serde::Serialize;

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Approximate in-memory footprint of a serializable value: the length of its
/// compact JSON encoding. Values that fail to serialize weigh nothing.
pub fn json_weight<V: Serialize>(value: &V) -> usize {
    serde_json::to_vec(value).map(|bytes| bytes.len()).unwrap_or(0)
}

/// Converts a megabyte budget to bytes. Negative and non-finite inputs map to 0.
pub fn megabytes_to_bytes(mb: f64) -> usize {
    if !mb.is_finite() || mb <= 0.0 {
        return 0;
    }
    (mb * 1024.0 * 1024.0) as usize
}

/// Formats a byte count as a human-readable magnitude (`"1.5 KB"`).
pub fn humanize_bytes(bytes: usize) -> String {
    let mut size = bytes as f64;
    for unit in UNITS {
        if size < 1024.0 {
            return format!("{size:.1} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1} PB")
}
