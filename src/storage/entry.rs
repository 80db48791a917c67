//! Storage Entry
//!
//! The unit stored by a shard. Every field except the access counters is
//! immutable once the entry is published; readers on other threads may
//! hold references to it long after a newer value for the same key has
//! been published, so mutation happens only through the two atomics.

use crate::util::now_nanos;
use bytes::Bytes;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::time::Duration;

/// Maximum key length in bytes.
pub const MAX_KEY_SIZE: usize = 255;

/// Maximum value size in bytes (16 MiB).
pub const MAX_VALUE_SIZE: usize = 16 * 1024 * 1024;

/// A stored key-value pair with expiration metadata.
///
/// Entries are shared between the index and concurrent readers via `Arc`,
/// so the only fields mutated after publication are `access_count` and
/// `last_access`, both atomic.
#[derive(Debug)]
pub struct StorageEntry {
    /// The key this entry is stored under
    pub key: String,
    /// The value, an opaque byte sequence
    pub value: Bytes,
    /// Time-to-live in nanoseconds (0 = never expires)
    pub ttl_nanos: i64,
    /// Creation time, unix nanoseconds
    pub created_at: i64,
    /// Expiration time, unix nanoseconds (0 iff `ttl_nanos` is 0)
    pub expires_at: i64,
    /// Whether the entry is deleted on first successful read
    pub single_read: bool,
    /// Value size used for memory accounting
    pub original_size: i64,
    /// Number of reads that observed this entry
    pub access_count: AtomicU32,
    /// Unix nanoseconds of the most recent read
    pub last_access: AtomicI64,
}

impl StorageEntry {
    /// Creates an entry timestamped now.
    ///
    /// A zero `ttl` means the entry never expires and `expires_at` stays 0.
    pub fn new(key: String, value: Bytes, ttl: Duration, single_read: bool) -> Self {
        let now = now_nanos();
        let ttl_nanos = ttl.as_nanos() as i64;
        let expires_at = if ttl_nanos > 0 { now + ttl_nanos } else { 0 };
        let original_size = value.len() as i64;

        Self {
            key,
            value,
            ttl_nanos,
            created_at: now,
            expires_at,
            single_read,
            original_size,
            access_count: AtomicU32::new(0),
            last_access: AtomicI64::new(now),
        }
    }

    /// Checks whether the entry has expired at `now` (unix nanoseconds).
    #[inline]
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at > 0 && now >= self.expires_at
    }

    /// Bytes this entry accounts for in shard usage: key plus value.
    #[inline]
    pub fn charged_size(&self) -> i64 {
        self.key.len() as i64 + self.original_size
    }

    /// Records a successful read.
    #[inline]
    pub fn touch(&self, now: i64) {
        self.access_count.fetch_add(1, Ordering::Relaxed);
        self.last_access.store(now, Ordering::Relaxed);
    }

    /// Attempts to consume a single-read entry.
    ///
    /// Exactly one caller wins the 0 -> 1 transition; everyone else
    /// observes the entry as already consumed.
    #[inline]
    pub fn try_consume(&self) -> bool {
        self.access_count
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
