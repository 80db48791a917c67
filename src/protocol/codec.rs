//! Payload Field Encoding
//!
//! Request and response payloads are flat field sequences. Strings are
//! length-prefixed with a big-endian u16, values with a big-endian u32:
//!
//! ```text
//! SET:      token, bucket, key, ttl_be64, single_read_u8, value_be32
//! GET/DEL:  token, bucket, key
//! VALUE:    key, ttl_be64, created_be64, expires_be64, single_read_u8, value_be32
//! ```
//!
//! Decoders never index past what they have checked; any short field
//! surfaces as [`ProtocolError::Truncated`] and closes the request with
//! a bad-request status rather than a panic.

use crate::protocol::frame::ProtocolError;
use bytes::{BufMut, Bytes, BytesMut};

/// A decoded SET payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetRequest {
    pub token: String,
    pub bucket: String,
    pub key: String,
    /// TTL in whole seconds; 0 = never expires
    pub ttl: i64,
    pub single_read: bool,
    pub value: Bytes,
}

/// A decoded GET or DELETE payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRequest {
    pub token: String,
    pub bucket: String,
    pub key: String,
}

/// The body of a successful GET response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueResponse {
    pub key: String,
    /// TTL in whole seconds as originally requested
    pub ttl: i64,
    /// Unix seconds
    pub created_at: i64,
    /// Unix seconds; 0 = never expires
    pub expires_at: i64,
    pub single_read: bool,
    pub value: Bytes,
}

fn put_string(buf: &mut BytesMut, s: &str) {
    debug_assert!(s.len() <= u16::MAX as usize);
    buf.put_u16(s.len() as u16);
    buf.put_slice(s.as_bytes());
}

fn read_string<'a>(data: &'a [u8], offset: &mut usize) -> Result<&'a str, ProtocolError> {
    let len = read_u16(data, offset)? as usize;
    let end = *offset + len;
    if data.len() < end {
        return Err(ProtocolError::Truncated("string body"));
    }
    let s = std::str::from_utf8(&data[*offset..end])
        .map_err(|_| ProtocolError::Malformed("string is not utf-8"))?;
    *offset = end;
    Ok(s)
}

fn read_u16(data: &[u8], offset: &mut usize) -> Result<u16, ProtocolError> {
    let end = *offset + 2;
    if data.len() < end {
        return Err(ProtocolError::Truncated("u16 field"));
    }
    let v = u16::from_be_bytes([data[*offset], data[*offset + 1]]);
    *offset = end;
    Ok(v)
}

fn read_u32(data: &[u8], offset: &mut usize) -> Result<u32, ProtocolError> {
    let end = *offset + 4;
    if data.len() < end {
        return Err(ProtocolError::Truncated("u32 field"));
    }
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&data[*offset..end]);
    *offset = end;
    Ok(u32::from_be_bytes(bytes))
}

fn read_u64(data: &[u8], offset: &mut usize) -> Result<u64, ProtocolError> {
    let end = *offset + 8;
    if data.len() < end {
        return Err(ProtocolError::Truncated("u64 field"));
    }
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[*offset..end]);
    *offset = end;
    Ok(u64::from_be_bytes(bytes))
}

fn read_u8(data: &[u8], offset: &mut usize) -> Result<u8, ProtocolError> {
    let v = *data
        .get(*offset)
        .ok_or(ProtocolError::Truncated("u8 field"))?;
    *offset += 1;
    Ok(v)
}

pub fn encode_set_payload(req: &SetRequest) -> Bytes {
    let mut buf = BytesMut::with_capacity(
        2 + req.token.len() + 2 + req.bucket.len() + 2 + req.key.len() + 8 + 1 + 4
            + req.value.len(),
    );
    put_string(&mut buf, &req.token);
    put_string(&mut buf, &req.bucket);
    put_string(&mut buf, &req.key);
    buf.put_i64(req.ttl);
    buf.put_u8(req.single_read as u8);
    buf.put_u32(req.value.len() as u32);
    buf.put_slice(&req.value);
    buf.freeze()
}

pub fn decode_set_payload(data: &[u8]) -> Result<SetRequest, ProtocolError> {
    let mut offset = 0;
    let token = read_string(data, &mut offset)?.to_string();
    let bucket = read_string(data, &mut offset)?.to_string();
    let key = read_string(data, &mut offset)?.to_string();
    let ttl = read_u64(data, &mut offset)? as i64;
    let single_read = read_u8(data, &mut offset)? == 1;

    let value_len = read_u32(data, &mut offset)? as usize;
    let end = offset + value_len;
    if data.len() < end {
        return Err(ProtocolError::Truncated("value body"));
    }
    let value = Bytes::copy_from_slice(&data[offset..end]);

    Ok(SetRequest {
        token,
        bucket,
        key,
        ttl,
        single_read,
        value,
    })
}

pub fn encode_key_payload(req: &KeyRequest) -> Bytes {
    let mut buf =
        BytesMut::with_capacity(2 + req.token.len() + 2 + req.bucket.len() + 2 + req.key.len());
    put_string(&mut buf, &req.token);
    put_string(&mut buf, &req.bucket);
    put_string(&mut buf, &req.key);
    buf.freeze()
}

pub fn decode_key_payload(data: &[u8]) -> Result<KeyRequest, ProtocolError> {
    let mut offset = 0;
    let token = read_string(data, &mut offset)?.to_string();
    let bucket = read_string(data, &mut offset)?.to_string();
    let key = read_string(data, &mut offset)?.to_string();
    Ok(KeyRequest { token, bucket, key })
}

pub fn encode_value_response(resp: &ValueResponse) -> Bytes {
    let mut buf =
        BytesMut::with_capacity(2 + resp.key.len() + 8 + 8 + 8 + 1 + 4 + resp.value.len());
    put_string(&mut buf, &resp.key);
    buf.put_i64(resp.ttl);
    buf.put_i64(resp.created_at);
    buf.put_i64(resp.expires_at);
    buf.put_u8(resp.single_read as u8);
    buf.put_u32(resp.value.len() as u32);
    buf.put_slice(&resp.value);
    buf.freeze()
}

pub fn decode_value_response(data: &[u8]) -> Result<ValueResponse, ProtocolError> {
    let mut offset = 0;
    let key = read_string(data, &mut offset)?.to_string();
    let ttl = read_u64(data, &mut offset)? as i64;
    let created_at = read_u64(data, &mut offset)? as i64;
    let expires_at = read_u64(data, &mut offset)? as i64;
    let single_read = read_u8(data, &mut offset)? == 1;

    let value_len = read_u32(data, &mut offset)? as usize;
    let end = offset + value_len;
    if data.len() < end {
        return Err(ProtocolError::Truncated("value body"));
    }
    let value = Bytes::copy_from_slice(&data[offset..end]);

    Ok(ValueResponse {
        key,
        ttl,
        created_at,
        expires_at,
        single_read,
        value,
    })
}
