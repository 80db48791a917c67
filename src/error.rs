//! Error Taxonomy
//!
//! Typed outcomes returned by the engine and mapped by the transports to
//! HTTP statuses or TCP status bytes. The engine never panics on user
//! input; everything a caller can trigger surfaces as one of these.

use thiserror::Error;

/// Errors surfaced by the storage engine and bucket manager.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Bucket name is empty or otherwise unusable
    #[error("invalid bucket name")]
    InvalidBucketName,

    /// A bucket with this name already exists
    #[error("bucket already exists")]
    BucketAlreadyExists,

    /// No bucket with this name
    #[error("bucket not found")]
    BucketNotFound,

    /// The `default` bucket cannot be deleted
    #[error("cannot delete default bucket")]
    CannotDeleteDefault,

    /// Missing, malformed, or wrong auth token
    #[error("unauthorized")]
    Unauthorized,

    /// Key is empty or exceeds the maximum key length
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Value is empty or exceeds the maximum value size
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// TTL is negative
    #[error("invalid ttl")]
    InvalidTtl,

    /// Key absent, expired, or already consumed by a single-read get
    #[error("key not found")]
    KeyNotFound,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(StoreError::BucketNotFound.to_string(), "bucket not found");
        assert_eq!(
            StoreError::InvalidKey("too long".into()).to_string(),
            "invalid key: too long"
        );
    }
}
