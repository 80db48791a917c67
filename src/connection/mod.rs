//! Connection Management Module
//!
//! The TCP transport: an accept loop that gives every client its own
//! async task, per-connection frame extraction with a capped buffer, and
//! pipelined dispatch keyed by request id.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TcpServer                              │
//! │                     accept loop                             │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │ spawn per connection
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │              handle_connection (one task each)              │
//! │                                                             │
//! │  read bytes ──> extract frames ──> spawn dispatch per frame │
//! │                                          │                  │
//! │        writer task <── response queue <──┘                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod handler;
pub mod server;

// Re-export commonly used types
pub use handler::{handle_connection, ConnectionError, ConnectionStats, MAX_CONNECTION_BUFFER};
pub use server::TcpServer;
