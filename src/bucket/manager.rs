//! Bucket Manager
//!
//! Buckets are the tenancy unit: each one owns a sharded store, an
//! expiration scheduler, and a 16-byte auth token minted at creation.
//! The name-to-bucket index is itself copy-on-write: lookups load an
//! immutable snapshot with no lock, while creations and deletions
//! serialize on one mutex and swap in a rebuilt index. A reader sees
//! either the pre-change or post-change bucket set, never a partial one.
//!
//! The `default` bucket always exists and cannot be deleted.

use crate::error::StoreError;
use crate::storage::ShardedStore;
use crate::util::{constant_time_eq, now_unix_secs};
use arc_swap::ArcSwap;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use parking_lot::Mutex;
use rand::RngCore;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// The bucket every deployment starts with.
pub const DEFAULT_BUCKET: &str = "default";

/// Length of a bucket's shared-secret auth token.
pub const AUTH_TOKEN_SIZE: usize = 16;

/// A named, isolated namespace with its own shards and token.
pub struct Bucket {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Creation time, unix seconds
    pub created_at: i64,
    pub shard_count: usize,
    auth_token: [u8; AUTH_TOKEN_SIZE],
    store: Arc<ShardedStore>,
}

impl std::fmt::Debug for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Keeps the auth token out of logs and debug output
        f.debug_struct("Bucket")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("shard_count", &self.shard_count)
            .finish()
    }
}

/// A bucket's public face: everything but the token and the store.
#[derive(Debug, Clone, Serialize)]
pub struct BucketMetadata {
    pub id: String,
    pub name: String,
    pub description: String,
    pub created_at: i64,
    pub shard_count: usize,
    pub key_count: i64,
    pub memory_usage: i64,
}

impl Bucket {
    fn metadata(&self) -> BucketMetadata {
        BucketMetadata {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            created_at: self.created_at,
            shard_count: self.shard_count,
            key_count: self.store.count(),
            memory_usage: self.store.usage(),
        }
    }
}

/// Immutable snapshot of the bucket set, replaced wholesale on change.
#[derive(Debug, Default)]
struct BucketIndex {
    buckets: HashMap<String, Arc<Bucket>>,
}

/// Owner of all buckets in the process.
#[derive(Debug)]
pub struct BucketManager {
    index: ArcSwap<BucketIndex>,
    write_lock: Mutex<()>,
    default_shard_count: usize,
}

impl BucketManager {
    /// Creates a manager with the `default` bucket already present and
    /// its scheduler running. Must be called inside a tokio runtime.
    pub fn new(default_shard_count: usize) -> Self {
        let manager = Self {
            index: ArcSwap::from_pointee(BucketIndex::default()),
            write_lock: Mutex::new(()),
            default_shard_count: default_shard_count.max(1),
        };

        match manager.create_bucket(DEFAULT_BUCKET, "Default bucket", 0) {
            Ok(_) => info!(
                shard_count = manager.default_shard_count,
                "created default bucket"
            ),
            Err(e) => debug!(error = %e, "default bucket already present"),
        }

        manager
    }

    fn snapshot(&self) -> Arc<BucketIndex> {
        self.index.load_full()
    }

    /// Creates a bucket and returns its metadata together with the hex
    /// form of its auth token. The token exists nowhere else: it is not
    /// persisted and must not be logged.
    pub fn create_bucket(
        &self,
        name: &str,
        description: &str,
        shard_count: usize,
    ) -> Result<(BucketMetadata, String), StoreError> {
        if name.is_empty() {
            return Err(StoreError::InvalidBucketName);
        }
        let shard_count = if shard_count == 0 {
            self.default_shard_count
        } else {
            shard_count
        };

        let mut token = [0u8; AUTH_TOKEN_SIZE];
        rand::rng().fill_bytes(&mut token);

        let _guard = self.write_lock.lock();

        let old = self.snapshot();
        if old.buckets.contains_key(name) {
            return Err(StoreError::BucketAlreadyExists);
        }

        let store = Arc::new(ShardedStore::new(shard_count));
        store.start_gc();

        let bucket = Arc::new(Bucket {
            id: Uuid::now_v7().to_string(),
            name: name.to_string(),
            description: description.to_string(),
            created_at: now_unix_secs(),
            shard_count,
            auth_token: token,
            store,
        });

        let mut buckets = old.buckets.clone();
        buckets.insert(name.to_string(), Arc::clone(&bucket));
        self.index.store(Arc::new(BucketIndex { buckets }));

        info!(name, id = %bucket.id, shard_count, "created bucket");
        Ok((bucket.metadata(), hex::encode(token)))
    }

    /// Returns a bucket's metadata with live key-count and usage.
    pub fn get_bucket(&self, name: &str) -> Option<BucketMetadata> {
        let idx = self.index.load();
        idx.buckets.get(name).map(|b| b.metadata())
    }

    /// Checks the token against the bucket's in constant time and, on a
    /// match, hands back the bucket's store. Absent bucket and wrong
    /// token are indistinguishable to the caller.
    pub fn authenticate_and_get_store(
        &self,
        name: &str,
        token: &[u8],
    ) -> Option<Arc<ShardedStore>> {
        if token.len() != AUTH_TOKEN_SIZE {
            return None;
        }

        let idx = self.index.load();
        let bucket = idx.buckets.get(name)?;

        if !constant_time_eq(&bucket.auth_token, token) {
            return None;
        }
        Some(Arc::clone(&bucket.store))
    }

    /// Fetches a bucket's store without a token check, for callers that
    /// already authenticated through a signed token.
    pub fn get_store(&self, name: &str) -> Option<Arc<ShardedStore>> {
        let idx = self.index.load();
        idx.buckets.get(name).map(|b| Arc::clone(&b.store))
    }

    /// Deletes a bucket after a constant-time token match, stopping its
    /// scheduler once the new index is visible.
    pub fn delete_bucket(&self, name: &str, token: &[u8]) -> Result<(), StoreError> {
        if name == DEFAULT_BUCKET {
            return Err(StoreError::CannotDeleteDefault);
        }
        if token.len() != AUTH_TOKEN_SIZE {
            return Err(StoreError::Unauthorized);
        }

        let _guard = self.write_lock.lock();

        let old = self.snapshot();
        let bucket = old.buckets.get(name).ok_or(StoreError::BucketNotFound)?;

        if !constant_time_eq(&bucket.auth_token, token) {
            return Err(StoreError::Unauthorized);
        }

        let mut buckets = old.buckets.clone();
        let removed = buckets.remove(name).ok_or(StoreError::BucketNotFound)?;
        self.index.store(Arc::new(BucketIndex { buckets }));

        removed.store.stop_gc();
        info!(name, id = %removed.id, "deleted bucket");
        Ok(())
    }

    pub fn list_buckets(&self) -> Vec<BucketMetadata> {
        let idx = self.index.load();
        idx.buckets.values().map(|b| b.metadata()).collect()
    }

    pub fn bucket_exists(&self, name: &str) -> bool {
        self.index.load().buckets.contains_key(name)
    }

    /// Stops every bucket's scheduler.
    pub fn shutdown(&self) {
        info!("bucket manager shutting down");
        let _guard = self.write_lock.lock();
        let idx = self.snapshot();
        for bucket in idx.buckets.values() {
            debug!(name = %bucket.name, "stopping bucket scheduler");
            bucket.store.stop_gc();
        }
    }
}

/// Decodes a wire-form token: hex first, then base64url without padding.
pub fn decode_token(s: &str) -> Option<[u8; AUTH_TOKEN_SIZE]> {
    let bytes = hex::decode(s)
        .ok()
        .or_else(|| URL_SAFE_NO_PAD.decode(s).ok())?;
    bytes.try_into().ok()
}
