//! Wire Protocol Implementation
//!
//! The binary TCP protocol: length-prefixed frames tagged with a client
//! request id, multiplexing any number of in-flight requests over one
//! connection.
//!
//! ## Modules
//!
//! - `frame`: the 13-byte header format, command and status bytes
//! - `codec`: payload field encoding for SET/GET/DELETE and responses
//!
//! ## Example
//!
//! ```
//! use vaultkv::protocol::{Frame, command};
//! use bytes::Bytes;
//!
//! let frame = Frame::new(command::GET, 42, Bytes::from_static(b"payload"));
//! let wire = frame.encode();
//! let (decoded, consumed) = Frame::decode(&wire).unwrap().unwrap();
//! assert_eq!(decoded.request_id, 42);
//! assert_eq!(consumed, wire.len());
//! ```

pub mod codec;
pub mod frame;

// Re-export commonly used types for convenience
pub use codec::{
    decode_key_payload, decode_set_payload, decode_value_response, encode_key_payload,
    encode_set_payload, encode_value_response, KeyRequest, SetRequest, ValueResponse,
};
pub use frame::{command, status, Frame, ProtocolError, HEADER_SIZE, MAX_PAYLOAD_SIZE};
