//! # VaultKV - A Multi-Tenant In-Memory Key-Value Store
//!
//! VaultKV is an in-memory key-value store organized around **buckets**:
//! named, isolated namespaces, each with its own shards, expiration
//! state, and auth token. Clients talk to it over a binary TCP protocol
//! that pipelines concurrent requests on one connection, or over an
//! HTTP/JSON API.
//!
//! ## Features
//!
//! - **Multi-Tenant**: independently sharded buckets gated by
//!   bucket-scoped tokens (shared-secret or HMAC-signed)
//! - **Lock-Free Reads**: copy-on-write segmented indexes published
//!   through atomic pointer swaps; readers never block or take locks
//! - **Two-Tier TTL**: a near-deadline min-heap plus a hashed timing
//!   wheel, draining through a batching delete coalescer
//! - **Pipelined TCP**: length-prefixed frames tagged with request ids,
//!   handled concurrently per connection
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           VaultKV                               │
//! │                                                                 │
//! │  ┌───────────┐   ┌───────────┐    ┌──────────────────────────┐  │
//! │  │ TCP Server│──>│ Connection│───>│     CommandHandler       │  │
//! │  │ (frames)  │   │  Handler  │    │  (auth + dispatch)       │  │
//! │  └───────────┘   └───────────┘    └────────────┬─────────────┘  │
//! │  ┌───────────┐                                 │                │
//! │  │ HTTP API  │─────────────────────────────────┤                │
//! │  │ (axum)    │                                 ▼                │
//! │  └───────────┘                    ┌──────────────────────────┐  │
//! │                                   │      BucketManager       │  │
//! │                                   │  (copy-on-write index)   │  │
//! │                                   └────────────┬─────────────┘  │
//! │                                                │ per bucket     │
//! │                                                ▼                │
//! │  ┌──────────────────────────────────────────────────────────┐   │
//! │  │                     ShardedStore                         │   │
//! │  │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐         │   │
//! │  │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ ...N    │         │   │
//! │  │  │ CoW idx │ │ CoW idx │ │ CoW idx │ │ shards  │         │   │
//! │  │  │ TTL gc  │ │ TTL gc  │ │ TTL gc  │ │         │         │   │
//! │  │  └─────────┘ └─────────┘ └─────────┘ └─────────┘         │   │
//! │  └──────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use vaultkv::bucket::BucketManager;
//! use vaultkv::commands::CommandHandler;
//! use vaultkv::connection::{ConnectionStats, TcpServer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let buckets = Arc::new(BucketManager::new(64));
//!     let handler = CommandHandler::new(Arc::clone(&buckets), None);
//!     let stats = Arc::new(ConnectionStats::new());
//!
//!     let server = TcpServer::start("127.0.0.1:9090", handler, stats).await?;
//!     // ... serve until shutdown ...
//!     server.stop(std::time::Duration::from_secs(10)).await;
//!     buckets.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`storage`]: the sharded copy-on-write engine
//! - [`gc`]: two-tier TTL expiration and the delete coalescer
//! - [`bucket`]: bucket lifecycle and token authentication
//! - [`auth`]: HMAC-signed bucket tokens
//! - [`protocol`]: binary frame format and payload codecs
//! - [`commands`]: frame dispatch against the engine
//! - [`connection`]: TCP server and per-connection handling
//! - [`client`]: reference pipelined TCP client
//! - [`http`]: HTTP/JSON API
//! - [`config`]: environment-driven configuration
//!
//! ## Design Highlights
//!
//! ### Reads Without Locks
//!
//! Every shard index and the bucket index itself are immutable
//! snapshots behind atomically swapped pointers. A reader loads the
//! pointer once and works on a consistent view; writers build the next
//! snapshot on the side and publish it in one store.
//!
//! ### Expiration That Amortizes
//!
//! Deadlines within two seconds sit in a min-heap for precision;
//! everything else sits in a hashed wheel for O(1) inserts. Expired
//! keys buffer in a deduplicating coalescer and leave in batched
//! deletes, so mass expirations cost one segment rewrite, not one per
//! key.

pub mod auth;
pub mod bucket;
pub mod client;
pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod gc;
pub mod http;
pub mod protocol;
pub mod storage;
pub mod util;

// Re-export commonly used types for convenience
pub use auth::TokenAuthenticator;
pub use bucket::{BucketManager, BucketMetadata};
pub use client::{Client, ClientError, ClientOptions};
pub use commands::CommandHandler;
pub use config::Config;
pub use connection::{ConnectionStats, TcpServer};
pub use error::StoreError;
pub use protocol::Frame;
pub use storage::{ShardedStore, StorageEntry};

/// The default TCP port VaultKV listens on
pub const DEFAULT_TCP_PORT: u16 = config::DEFAULT_TCP_PORT;

/// The default HTTP port VaultKV listens on
pub const DEFAULT_HTTP_PORT: u16 = config::DEFAULT_SERVER_PORT;

/// Version of VaultKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
