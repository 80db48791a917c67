//! Binary Frame Format
//!
//! Every message on the wire is one frame:
//!
//! ```text
//! ┌──────────────┬─────────────┬────────────────┬─────────────┐
//! │ length (be32)│ command (1) │ request_id(be64)│  payload    │
//! └──────────────┴─────────────┴────────────────┴─────────────┘
//!      4 bytes       1 byte         8 bytes        variable
//! ```
//!
//! `length` covers the 13-byte header plus the payload. The request id
//! is chosen by the client and echoed in the response, which is what
//! lets many requests share one connection without ordering.
//!
//! Like any length-prefixed stream format, decoding distinguishes three
//! outcomes: a complete frame, not-enough-bytes-yet (`Ok(None)`), and a
//! protocol violation (`Err`). Only the last one kills the connection.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Size of the fixed frame header.
pub const HEADER_SIZE: usize = 13;

/// Largest allowed payload (16 MiB).
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Command bytes.
pub mod command {
    pub const SET: u8 = 0x01;
    pub const GET: u8 = 0x02;
    pub const DELETE: u8 = 0x03;
    pub const RESPONSE: u8 = 0xF0;
    pub const ERROR: u8 = 0xFF;
}

/// Status bytes carried in the first payload byte of RESPONSE/ERROR
/// frames.
pub mod status {
    pub const OK: u8 = 0x00;
    pub const CREATED: u8 = 0x01;
    pub const NO_CONTENT: u8 = 0x02;
    pub const BAD_REQUEST: u8 = 0x10;
    pub const UNAUTHORIZED: u8 = 0x11;
    pub const NOT_FOUND: u8 = 0x12;
    pub const CONFLICT: u8 = 0x13;
    pub const INTERNAL: u8 = 0x20;
    pub const INVALID_TTL: u8 = 0x21;
    pub const KEY_EXPIRED: u8 = 0x22;
}

/// Errors that make a byte stream unrecoverable as frames.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Declared frame length exceeds the maximum
    #[error("frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// Declared frame length is smaller than the header
    #[error("invalid frame length: {0}")]
    InvalidLength(usize),

    /// A payload field ran past the end of the payload
    #[error("truncated payload: {0}")]
    Truncated(&'static str),

    /// A payload field held an impossible value
    #[error("malformed payload: {0}")]
    Malformed(&'static str),
}

/// One wire message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: u8,
    pub request_id: u64,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(command: u8, request_id: u64, payload: Bytes) -> Self {
        Self {
            command,
            request_id,
            payload,
        }
    }

    /// Builds a RESPONSE frame: status byte followed by `data`.
    pub fn response(request_id: u64, status: u8, data: &[u8]) -> Self {
        let mut payload = BytesMut::with_capacity(1 + data.len());
        payload.put_u8(status);
        payload.put_slice(data);
        Self::new(command::RESPONSE, request_id, payload.freeze())
    }

    /// Builds an ERROR frame: status byte followed by a message.
    pub fn error(request_id: u64, status: u8, message: &str) -> Self {
        let mut payload = BytesMut::with_capacity(1 + message.len());
        payload.put_u8(status);
        payload.put_slice(message.as_bytes());
        Self::new(command::ERROR, request_id, payload.freeze())
    }

    /// Serializes the frame, header included.
    pub fn encode(&self) -> Bytes {
        let total = HEADER_SIZE + self.payload.len();
        let mut buf = BytesMut::with_capacity(total);
        buf.put_u32(total as u32);
        buf.put_u8(self.command);
        buf.put_u64(self.request_id);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Attempts to decode one frame from the front of `buf`.
    ///
    /// Returns the frame and the number of bytes it occupied, or
    /// `Ok(None)` when the buffer does not yet hold a whole frame.
    pub fn decode(buf: &[u8]) -> Result<Option<(Frame, usize)>, ProtocolError> {
        if buf.len() < HEADER_SIZE {
            return Ok(None);
        }

        let length = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        if length > HEADER_SIZE + MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: length,
                max: HEADER_SIZE + MAX_PAYLOAD_SIZE,
            });
        }
        if length < HEADER_SIZE {
            return Err(ProtocolError::InvalidLength(length));
        }
        if buf.len() < length {
            return Ok(None);
        }

        let command = buf[4];
        let request_id = u64::from_be_bytes([
            buf[5], buf[6], buf[7], buf[8], buf[9], buf[10], buf[11], buf[12],
        ]);
        let payload = Bytes::copy_from_slice(&buf[HEADER_SIZE..length]);

        Ok(Some((
            Frame {
                command,
                request_id,
                payload,
            },
            length,
        )))
    }

    /// Splits a RESPONSE/ERROR payload into its status byte and body.
    pub fn split_status(&self) -> Result<(u8, &[u8]), ProtocolError> {
        let Some((&status, body)) = self.payload.split_first() else {
            return Err(ProtocolError::Truncated("missing status byte"));
        };
        Ok((status, body))
    }
}
