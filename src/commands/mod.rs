//! Command Handling Module
//!
//! Decoded request frames come in, response frames go out:
//!
//! ```text
//! Frame ──> CommandHandler ──> authorize ──> ShardedStore op
//!                 │                               │
//!                 └──────── status byte <─────────┘
//! ```
//!
//! The handler is cheap to clone; each connection gets its own copy
//! sharing the bucket manager underneath.

pub mod handler;

// Re-export the main command handler
pub use handler::CommandHandler;
