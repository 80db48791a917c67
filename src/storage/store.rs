//! Sharded Store
//!
//! Fans a bucket's keyspace out over N independent shards by key hash.
//! Each shard serializes its own writers and runs its own expiration
//! scheduler, so shard count is the bucket's write-parallelism knob.
//! Aggregate views (`count`, `usage`, `keys`) sum or concatenate the
//! per-shard answers.

use crate::error::StoreError;
use crate::gc::GcConfig;
use crate::storage::entry::{StorageEntry, MAX_KEY_SIZE, MAX_VALUE_SIZE};
use crate::storage::shard::{Shard, SEGMENTS_PER_SHARD};
use bytes::Bytes;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

/// A fixed set of shards serving one bucket.
#[derive(Debug)]
pub struct ShardedStore {
    shards: Vec<Arc<Shard>>,
}

impl ShardedStore {
    /// Creates a store with `shard_count` shards (at least one).
    pub fn new(shard_count: usize) -> Self {
        Self::with_gc_config(shard_count, GcConfig::default())
    }

    pub fn with_gc_config(shard_count: usize, gc_config: GcConfig) -> Self {
        Self::with_layout(shard_count, SEGMENTS_PER_SHARD, gc_config)
    }

    /// Full layout control. Both counts are fixed for the store's life;
    /// changing either means deleting and recreating the bucket.
    pub fn with_layout(
        shard_count: usize,
        segments_per_shard: usize,
        gc_config: GcConfig,
    ) -> Self {
        let shard_count = shard_count.max(1);
        Self {
            shards: (0..shard_count)
                .map(|_| Arc::new(Shard::with_segments(gc_config.clone(), segments_per_shard)))
                .collect(),
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    #[inline]
    fn shard_of(&self, key: &str) -> &Arc<Shard> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() % self.shards.len() as u64) as usize]
    }

    /// Validates and stores a key-value pair, returning the entry as
    /// published.
    pub fn set(
        &self,
        key: String,
        value: Bytes,
        ttl: Duration,
        single_read: bool,
    ) -> Result<Arc<StorageEntry>, StoreError> {
        if key.is_empty() {
            return Err(StoreError::InvalidKey("key is required".into()));
        }
        if key.len() > MAX_KEY_SIZE {
            return Err(StoreError::InvalidKey(format!(
                "key exceeds {MAX_KEY_SIZE} bytes"
            )));
        }
        if value.is_empty() {
            return Err(StoreError::InvalidValue("value is required".into()));
        }
        if value.len() > MAX_VALUE_SIZE {
            return Err(StoreError::InvalidValue(format!(
                "value exceeds {MAX_VALUE_SIZE} bytes"
            )));
        }

        let entry = Arc::new(StorageEntry::new(key, value, ttl, single_read));
        self.shard_of(&entry.key).set(Arc::clone(&entry));
        Ok(entry)
    }

    /// Looks up a live entry.
    pub fn get(&self, key: &str) -> Option<Arc<StorageEntry>> {
        self.shard_of(key).get(key)
    }

    /// Deletes a key. Returns whether it was present.
    pub fn delete(&self, key: &str) -> bool {
        self.shard_of(key).delete_batch(&[key.to_string()]) > 0
    }

    pub fn exists(&self, key: &str) -> bool {
        self.shard_of(key).exists(key)
    }

    /// All keys across all shards. Ordering follows shard layout, not
    /// insertion.
    pub fn keys(&self) -> Vec<String> {
        let mut out = Vec::new();
        for shard in &self.shards {
            out.extend(shard.keys());
        }
        out
    }

    pub fn count(&self) -> i64 {
        self.shards.iter().map(|s| s.count()).sum()
    }

    pub fn usage(&self) -> i64 {
        self.shards.iter().map(|s| s.usage()).sum()
    }

    /// Starts every shard's expiration driver.
    pub fn start_gc(&self) {
        for shard in &self.shards {
            Shard::start_gc(shard);
        }
    }

    /// Stops every shard's expiration driver, draining pending deletes.
    pub fn stop_gc(&self) {
        for shard in &self.shards {
            shard.stop_gc();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ShardedStore {
        ShardedStore::new(4)
    }

    #[test]
    fn test_shard_count_clamped() {
        assert_eq!(ShardedStore::new(0).shard_count(), 1);
        assert_eq!(ShardedStore::new(8).shard_count(), 8);
    }

    #[test]
    fn test_set_get_delete_round_trip() {
        let s = store();
        s.set("foo".into(), Bytes::from("hello"), Duration::ZERO, false)
            .unwrap();

        assert_eq!(s.get("foo").unwrap().value, Bytes::from("hello"));
        assert!(s.delete("foo"));
        assert!(s.get("foo").is_none());
        assert!(!s.delete("foo"));
    }

    #[test]
    fn test_set_rejects_bad_input() {
        let s = store();

        let err = s
            .set(String::new(), Bytes::from("v"), Duration::ZERO, false)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey(_)));

        let long_key = "k".repeat(MAX_KEY_SIZE + 1);
        let err = s
            .set(long_key, Bytes::from("v"), Duration::ZERO, false)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey(_)));

        let err = s
            .set("k".into(), Bytes::new(), Duration::ZERO, false)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidValue(_)));
    }

    #[test]
    fn test_aggregates_span_shards() {
        let s = store();
        for i in 0..100 {
            s.set(
                format!("key-{i}"),
                Bytes::from("xx"),
                Duration::ZERO,
                false,
            )
            .unwrap();
        }

        assert_eq!(s.count(), 100);
        assert_eq!(s.keys().len(), 100);
        // Every key charges key length + 2 value bytes
        let expected: i64 = (0..100).map(|i| format!("key-{i}").len() as i64 + 2).sum();
        assert_eq!(s.usage(), expected);
    }

    #[test]
    fn test_same_key_routes_to_same_shard() {
        let s = store();
        s.set("stable".into(), Bytes::from("1"), Duration::ZERO, false)
            .unwrap();
        s.set("stable".into(), Bytes::from("2"), Duration::ZERO, false)
            .unwrap();
        assert_eq!(s.count(), 1);
        assert_eq!(s.get("stable").unwrap().value, Bytes::from("2"));
    }

    #[tokio::test]
    async fn test_ttl_expiry_end_to_end() {
        let s = store();
        s.start_gc();

        s.set(
            "tmp".into(),
            Bytes::from("x"),
            Duration::from_millis(80),
            false,
        )
        .unwrap();

        assert!(s.get("tmp").is_some());
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(s.get("tmp").is_none());
        assert_eq!(s.count(), 0);
        s.stop_gc();
    }

    #[tokio::test]
    async fn test_single_read_via_store() {
        let s = Arc::new(store());
        s.set("otp".into(), Bytes::from("one"), Duration::ZERO, true)
            .unwrap();

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let s = Arc::clone(&s);
            tasks.push(tokio::spawn(async move { s.get("otp").is_some() }));
        }

        let mut winners = 0;
        for t in tasks {
            if t.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
