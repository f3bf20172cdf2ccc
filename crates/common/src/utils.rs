//! Utility functions for Model Orchestrator
//!
//! This module provides utility functions used throughout the Model Orchestrator system.

use bytesize::ByteSize;

/// Bytes in one gibibyte
pub const BYTES_PER_GIB: u64 = 1024 * 1024 * 1024;

/// Formats a byte size into a human-readable string
///
/// # Examples
///
/// ```
/// use common::utils::format_bytes;
///
/// assert_eq!(format_bytes(1024), "1.0 KiB");
/// assert_eq!(format_bytes(1048576), "1.0 MiB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    ByteSize::b(bytes).to_string_as(true)
}

/// Converts a size in gibibytes (as stored in preferences) to bytes
///
/// Negative and non-finite values map to zero.
pub fn gib_to_bytes(gib: f64) -> u64 {
    if !gib.is_finite() || gib <= 0.0 {
        return 0;
    }
    (gib * BYTES_PER_GIB as f64) as u64
}
