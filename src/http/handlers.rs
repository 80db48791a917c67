//! HTTP/JSON Handlers
//!
//! The request/response surface over the same bucket manager the TCP
//! transport uses. Bucket-scoped endpoints authenticate through the
//! `X-Bucket-Token` header, accepting the bucket's shared token (hex or
//! base64url) or a signed token when a secret is configured.

use crate::auth::TokenAuthenticator;
use crate::bucket::{decode_token, BucketManager, BucketMetadata};
use crate::error::StoreError;
use crate::storage::ShardedStore;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Header carrying the bucket token.
pub const BUCKET_TOKEN_HEADER: &str = "x-bucket-token";

/// Shared state for every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub buckets: Arc<BucketManager>,
    pub tokens: Option<Arc<TokenAuthenticator>>,
}

/// `StoreError` carried through axum's response machinery.
#[derive(Debug)]
pub struct ApiError(StoreError);

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            StoreError::InvalidBucketName
            | StoreError::InvalidKey(_)
            | StoreError::InvalidValue(_)
            | StoreError::InvalidTtl
            | StoreError::CannotDeleteDefault => StatusCode::BAD_REQUEST,
            StoreError::Unauthorized => StatusCode::UNAUTHORIZED,
            StoreError::BucketNotFound | StoreError::KeyNotFound => StatusCode::NOT_FOUND,
            StoreError::BucketAlreadyExists => StatusCode::CONFLICT,
        };
        let body = Json(ErrorResponse {
            error: self.0.to_string(),
        });
        (status, body).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateBucketRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub shard_count: usize,
}

#[derive(Debug, Serialize)]
pub struct CreateBucketResponse {
    #[serde(flatten)]
    pub bucket: BucketMetadata,
    /// Shown exactly once; the server keeps no retrievable copy
    pub auth_token: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteBucketRequest {
    pub auth_token: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateKvRequest {
    pub key: String,
    /// Value bytes as a JSON string
    pub value: String,
    /// TTL in whole seconds; 0 or absent = never expires
    #[serde(default)]
    pub ttl: i64,
    #[serde(default)]
    pub single_read: bool,
}

#[derive(Debug, Serialize)]
pub struct KvResponse {
    pub key: String,
    pub value: String,
    pub ttl: i64,
    pub created_at: i64,
    pub expires_at: i64,
    pub single_read: bool,
}

/// Resolves the `X-Bucket-Token` header to the bucket's store.
fn authorize(
    state: &AppState,
    headers: &HeaderMap,
    bucket: &str,
) -> Result<Arc<ShardedStore>, ApiError> {
    let token = headers
        .get(BUCKET_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(StoreError::Unauthorized)?;

    if let Some(raw) = decode_token(token) {
        if let Some(store) = state.buckets.authenticate_and_get_store(bucket, &raw) {
            return Ok(store);
        }
    }
    if let Some(auth) = &state.tokens {
        if auth.validate(token, bucket) {
            if let Some(store) = state.buckets.get_store(bucket) {
                return Ok(store);
            }
        }
    }

    debug!(bucket, "rejected bucket token");
    Err(StoreError::Unauthorized.into())
}

/// POST /api/buckets
pub async fn create_bucket(
    State(state): State<AppState>,
    Json(req): Json<CreateBucketRequest>,
) -> Result<(StatusCode, Json<CreateBucketResponse>), ApiError> {
    let (bucket, auth_token) =
        state
            .buckets
            .create_bucket(req.name.trim(), &req.description, req.shard_count)?;

    Ok((
        StatusCode::CREATED,
        Json(CreateBucketResponse { bucket, auth_token }),
    ))
}

/// GET /api/buckets
pub async fn list_buckets(State(state): State<AppState>) -> Json<Vec<BucketMetadata>> {
    Json(state.buckets.list_buckets())
}

/// GET /api/buckets/{bucket}
pub async fn get_bucket(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> Result<Json<BucketMetadata>, ApiError> {
    state
        .buckets
        .get_bucket(&bucket)
        .map(Json)
        .ok_or_else(|| StoreError::BucketNotFound.into())
}

/// DELETE /api/buckets/{bucket}
pub async fn delete_bucket(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    Json(req): Json<DeleteBucketRequest>,
) -> Result<StatusCode, ApiError> {
    let token = decode_token(&req.auth_token).ok_or(StoreError::Unauthorized)?;
    state.buckets.delete_bucket(&bucket, &token)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/buckets/{bucket}/kv
pub async fn set_kv(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    headers: HeaderMap,
    Json(req): Json<CreateKvRequest>,
) -> Result<StatusCode, ApiError> {
    if req.ttl < 0 {
        return Err(StoreError::InvalidTtl.into());
    }
    let store = authorize(&state, &headers, &bucket)?;

    let key = req.key.trim().to_string();
    store.set(
        key,
        Bytes::from(req.value.into_bytes()),
        Duration::from_secs(req.ttl as u64),
        req.single_read,
    )?;
    Ok(StatusCode::CREATED)
}

/// GET /api/buckets/{bucket}/kv/{key}
pub async fn get_kv(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<KvResponse>, ApiError> {
    let store = authorize(&state, &headers, &bucket)?;
    let entry = store.get(&key).ok_or(StoreError::KeyNotFound)?;

    Ok(Json(KvResponse {
        key: entry.key.clone(),
        value: String::from_utf8_lossy(&entry.value).into_owned(),
        ttl: entry.ttl_nanos / 1_000_000_000,
        created_at: entry.created_at / 1_000_000_000,
        expires_at: entry.expires_at / 1_000_000_000,
        single_read: entry.single_read,
    }))
}

/// DELETE /api/buckets/{bucket}/kv/{key}
pub async fn delete_kv(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let store = authorize(&state, &headers, &bucket)?;
    if !store.delete(&key) {
        return Err(StoreError::KeyNotFound.into());
    }
    Ok(StatusCode::NO_CONTENT)
}
