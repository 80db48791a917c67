//! Command Handler
//!
//! The bridge between decoded frames and the storage engine. Every
//! request is authorized against its bucket before it touches a store,
//! and every engine outcome maps to exactly one status byte. Auth
//! failures are deliberately uniform: a missing bucket, a malformed
//! token, and a wrong token all answer `UNAUTHORIZED` with the same
//! message.
//!
//! Two token forms are accepted, matching the two schemes a deployment
//! can run with: the bucket's 16-byte shared token (hex or base64url),
//! and, when the process has a token secret configured, an HMAC-signed
//! bucket token.

use crate::auth::TokenAuthenticator;
use crate::bucket::{decode_token, BucketManager};
use crate::error::StoreError;
use crate::protocol::{
    command, decode_key_payload, decode_set_payload, encode_value_response, status, Frame,
    ValueResponse,
};
use crate::storage::ShardedStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Executes decoded frames against the bucket manager.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    buckets: Arc<BucketManager>,
    tokens: Option<Arc<TokenAuthenticator>>,
}

impl CommandHandler {
    pub fn new(buckets: Arc<BucketManager>, tokens: Option<Arc<TokenAuthenticator>>) -> Self {
        Self { buckets, tokens }
    }

    pub fn buckets(&self) -> &Arc<BucketManager> {
        &self.buckets
    }

    /// Handles one request frame and produces its response frame.
    pub fn handle_frame(&self, frame: &Frame) -> Frame {
        match frame.command {
            command::SET => self.handle_set(frame),
            command::GET => self.handle_get(frame),
            command::DELETE => self.handle_delete(frame),
            other => {
                debug!(command = other, "unknown command byte");
                Frame::error(frame.request_id, status::BAD_REQUEST, "Unknown command")
            }
        }
    }

    /// Resolves a wire token to the bucket's store, trying the shared
    /// 16-byte token first and a signed token second.
    fn authorize(&self, token: &str, bucket: &str) -> Option<Arc<ShardedStore>> {
        if let Some(raw) = decode_token(token) {
            if let Some(store) = self.buckets.authenticate_and_get_store(bucket, &raw) {
                return Some(store);
            }
        }
        if let Some(auth) = &self.tokens {
            if auth.validate(token, bucket) {
                return self.buckets.get_store(bucket);
            }
        }
        None
    }

    fn handle_set(&self, frame: &Frame) -> Frame {
        let req = match decode_set_payload(&frame.payload) {
            Ok(req) => req,
            Err(e) => {
                debug!(error = %e, "failed to decode SET payload");
                return Frame::error(frame.request_id, status::BAD_REQUEST, "Invalid payload");
            }
        };

        if req.ttl < 0 {
            return Frame::error(frame.request_id, status::INVALID_TTL, "Invalid TTL");
        }

        let Some(store) = self.authorize(&req.token, &req.bucket) else {
            debug!(bucket = %req.bucket, "invalid token for SET");
            return Frame::error(frame.request_id, status::UNAUTHORIZED, "Invalid token");
        };

        let ttl = Duration::from_secs(req.ttl as u64);
        match store.set(req.key, req.value, ttl, req.single_read) {
            Ok(_) => Frame::response(frame.request_id, status::CREATED, &[]),
            Err(e) => self.error_frame(frame.request_id, &e),
        }
    }

    fn handle_get(&self, frame: &Frame) -> Frame {
        let req = match decode_key_payload(&frame.payload) {
            Ok(req) => req,
            Err(e) => {
                debug!(error = %e, "failed to decode GET payload");
                return Frame::error(frame.request_id, status::BAD_REQUEST, "Invalid payload");
            }
        };

        let Some(store) = self.authorize(&req.token, &req.bucket) else {
            debug!(bucket = %req.bucket, "invalid token for GET");
            return Frame::error(frame.request_id, status::UNAUTHORIZED, "Invalid token");
        };

        match store.get(&req.key) {
            Some(entry) => {
                let body = encode_value_response(&ValueResponse {
                    key: entry.key.clone(),
                    ttl: entry.ttl_nanos / 1_000_000_000,
                    created_at: entry.created_at / 1_000_000_000,
                    expires_at: entry.expires_at / 1_000_000_000,
                    single_read: entry.single_read,
                    value: entry.value.clone(),
                });
                Frame::response(frame.request_id, status::OK, &body)
            }
            None => self.error_frame(frame.request_id, &StoreError::KeyNotFound),
        }
    }

    fn handle_delete(&self, frame: &Frame) -> Frame {
        let req = match decode_key_payload(&frame.payload) {
            Ok(req) => req,
            Err(e) => {
                debug!(error = %e, "failed to decode DELETE payload");
                return Frame::error(frame.request_id, status::BAD_REQUEST, "Invalid payload");
            }
        };

        let Some(store) = self.authorize(&req.token, &req.bucket) else {
            debug!(bucket = %req.bucket, "invalid token for DELETE");
            return Frame::error(frame.request_id, status::UNAUTHORIZED, "Invalid token");
        };

        if store.delete(&req.key) {
            Frame::response(frame.request_id, status::NO_CONTENT, &[])
        } else {
            self.error_frame(frame.request_id, &StoreError::KeyNotFound)
        }
    }

    fn error_frame(&self, request_id: u64, err: &StoreError) -> Frame {
        let (status, message) = match err {
            StoreError::InvalidTtl => (status::INVALID_TTL, "Invalid TTL"),
            StoreError::KeyNotFound => (status::NOT_FOUND, "Key not found"),
            StoreError::BucketNotFound => (status::NOT_FOUND, "Bucket not found"),
            StoreError::Unauthorized => (status::UNAUTHORIZED, "Unauthorized"),
            StoreError::BucketAlreadyExists => (status::CONFLICT, "Bucket already exists"),
            StoreError::InvalidKey(_)
            | StoreError::InvalidValue(_)
            | StoreError::InvalidBucketName => (status::BAD_REQUEST, "Invalid request"),
            StoreError::CannotDeleteDefault => {
                (status::BAD_REQUEST, "Cannot delete default bucket")
            }
        };

        Frame::error(request_id, status, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode_value_response, encode_key_payload, encode_set_payload};
    use crate::protocol::{KeyRequest, SetRequest};
    use bytes::Bytes;

    async fn handler_with_bucket() -> (CommandHandler, String) {
        let buckets = Arc::new(BucketManager::new(2));
        let (_, token) = buckets.create_bucket("demo", "", 2).unwrap();
        (CommandHandler::new(buckets, None), token)
    }

    fn set_frame(request_id: u64, token: &str, key: &str, value: &str, ttl: i64) -> Frame {
        let payload = encode_set_payload(&SetRequest {
            token: token.into(),
            bucket: "demo".into(),
            key: key.into(),
            ttl,
            single_read: false,
            value: Bytes::copy_from_slice(value.as_bytes()),
        });
        Frame::new(command::SET, request_id, payload)
    }

    fn key_frame(cmd: u8, request_id: u64, token: &str, key: &str) -> Frame {
        let payload = encode_key_payload(&KeyRequest {
            token: token.into(),
            bucket: "demo".into(),
            key: key.into(),
        });
        Frame::new(cmd, request_id, payload)
    }

    #[tokio::test]
    async fn test_set_get_delete_flow() {
        let (h, token) = handler_with_bucket().await;

        let resp = h.handle_frame(&set_frame(1, &token, "foo", "hello", 0));
        assert_eq!(resp.command, command::RESPONSE);
        assert_eq!(resp.split_status().unwrap().0, status::CREATED);

        let resp = h.handle_frame(&key_frame(command::GET, 2, &token, "foo"));
        let (st, body) = resp.split_status().unwrap();
        assert_eq!(st, status::OK);
        let value = decode_value_response(body).unwrap();
        assert_eq!(value.key, "foo");
        assert_eq!(value.value, Bytes::from("hello"));
        assert_eq!(value.expires_at, 0);

        let resp = h.handle_frame(&key_frame(command::DELETE, 3, &token, "foo"));
        assert_eq!(resp.split_status().unwrap().0, status::NO_CONTENT);

        let resp = h.handle_frame(&key_frame(command::GET, 4, &token, "foo"));
        assert_eq!(resp.command, command::ERROR);
        assert_eq!(resp.split_status().unwrap().0, status::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_responses_echo_request_id() {
        let (h, token) = handler_with_bucket().await;
        let resp = h.handle_frame(&set_frame(0xDEAD_BEEF, &token, "k", "v", 0));
        assert_eq!(resp.request_id, 0xDEAD_BEEF);
    }

    #[tokio::test]
    async fn test_wrong_token_unauthorized() {
        let (h, _) = handler_with_bucket().await;
        let bogus = hex::encode([0u8; 16]);

        let resp = h.handle_frame(&set_frame(1, &bogus, "k", "v", 0));
        assert_eq!(resp.split_status().unwrap().0, status::UNAUTHORIZED);

        let resp = h.handle_frame(&key_frame(command::GET, 2, "garbage", "k"));
        assert_eq!(resp.split_status().unwrap().0, status::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_negative_ttl_rejected() {
        let (h, token) = handler_with_bucket().await;
        let resp = h.handle_frame(&set_frame(1, &token, "k", "v", -5));
        assert_eq!(resp.split_status().unwrap().0, status::INVALID_TTL);
    }

    #[tokio::test]
    async fn test_unknown_command_and_bad_payload() {
        let (h, token) = handler_with_bucket().await;

        let resp = h.handle_frame(&Frame::new(0x7F, 1, Bytes::new()));
        assert_eq!(resp.split_status().unwrap().0, status::BAD_REQUEST);

        let resp = h.handle_frame(&Frame::new(command::SET, 2, Bytes::from_static(b"\x00")));
        assert_eq!(resp.split_status().unwrap().0, status::BAD_REQUEST);

        let _ = token;
    }

    #[tokio::test]
    async fn test_signed_token_fallback() {
        let buckets = Arc::new(BucketManager::new(2));
        buckets.create_bucket("demo", "", 2).unwrap();
        let auth = Arc::new(TokenAuthenticator::new(*b"0123456789abcdef0123456789abcdef"));
        let h = CommandHandler::new(buckets, Some(Arc::clone(&auth)));

        let signed = auth.generate("demo", 60);
        let resp = h.handle_frame(&set_frame(1, &signed, "k", "v", 0));
        assert_eq!(resp.split_status().unwrap().0, status::CREATED);

        // A signed token for another bucket does not cross over
        let foreign = auth.generate("other", 60);
        let resp = h.handle_frame(&set_frame(2, &foreign, "k", "v", 0));
        assert_eq!(resp.split_status().unwrap().0, status::UNAUTHORIZED);
    }
}
