//! Bucket Module
//!
//! Multi-tenancy for the storage engine: named buckets, each owning an
//! independent sharded store gated by a bucket-scoped auth token.

pub mod manager;

// Re-export commonly used types
pub use manager::{
    decode_token, Bucket, BucketManager, BucketMetadata, AUTH_TOKEN_SIZE, DEFAULT_BUCKET,
};
