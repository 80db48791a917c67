//! Storage Engine Module
//!
//! The core of VaultKV: a sharded, TTL-aware byte store built around
//! copy-on-write publication instead of read locks.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     ShardedStore                            │
//! │   hash64(key) % N                                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐            │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ ...N    │            │
//! │  │ 64 seg- │ │ 64 seg- │ │ 64 seg- │ │ shards  │            │
//! │  │ ments   │ │ ments   │ │ ments   │ │         │            │
//! │  └────┬────┘ └────┬────┘ └────┬────┘ └────┬────┘            │
//! │       │           │           │           │                 │
//! │  ┌────┴────┐ ┌────┴────┐ ┌────┴────┐ ┌────┴────┐            │
//! │  │ TTL gc  │ │ TTL gc  │ │ TTL gc  │ │ TTL gc  │            │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each shard publishes its index through an atomically swapped pointer:
//! reads load the pointer and binary-search without locking, writes
//! serialize on a per-shard mutex and rewrite only the touched segment.
//! Expiration is handled per shard by a two-tier scheduler (see the
//! [`crate::gc`] module).
//!
//! ## Example
//!
//! ```
//! use vaultkv::storage::ShardedStore;
//! use bytes::Bytes;
//! use std::time::Duration;
//!
//! let store = ShardedStore::new(4);
//! store.set("name".into(), Bytes::from("vault"), Duration::ZERO, false).unwrap();
//! let entry = store.get("name").unwrap();
//! assert_eq!(entry.value, Bytes::from("vault"));
//! ```

pub mod entry;
pub mod shard;
pub mod store;

// Re-export commonly used types
pub use entry::{StorageEntry, MAX_KEY_SIZE, MAX_VALUE_SIZE};
pub use shard::{Shard, SEGMENTS_PER_SHARD};
pub use store::ShardedStore;
