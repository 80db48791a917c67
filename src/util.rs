//! Wall-Clock Time Helpers
//!
//! The engine timestamps entries with wall-clock time (unix nanoseconds)
//! rather than a monotonic clock, because expiration times travel over the
//! wire and must be meaningful to clients.

use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current wall-clock time as unix nanoseconds.
#[inline]
pub fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

/// Returns the current wall-clock time as unix milliseconds.
#[inline]
pub fn now_millis() -> i64 {
    now_nanos() / 1_000_000
}

/// Returns the current wall-clock time as unix seconds.
#[inline]
pub fn now_unix_secs() -> i64 {
    now_nanos() / 1_000_000_000
}

/// Compares two byte slices in constant time.
///
/// The comparison touches every byte regardless of where the first
/// mismatch occurs, so the running time leaks nothing about the secret.
/// Slices of different lengths compare unequal (length is not secret).
#[inline]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
