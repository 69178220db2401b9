//! # Error Types
//!
//! Error handling for the ARN protocol core.
//!
//! This module defines every local failure that can occur while framing,
//! dispatching or serving messages. Failures the remote peer should learn
//! about are NOT represented here: those travel back on the wire as
//! [`Error`](crate::core::message::MessageType::Error) messages carrying an
//! [`ErrorCode`](crate::protocol::types::ErrorCode).
//!
//! ## Error Categories
//! - **I/O Errors**: socket reads, writes and binds
//! - **Envelope Errors**: truncated, mis-sized or oversized messages
//! - **Registry Errors**: invalid capabilities and bridges, poisoned locks
//! - **Callback Errors**: failures reported by injected handlers
//! - **Lifecycle Errors**: timeouts and shutdown
//!
//! ## Example Usage
//! ```rust
//! use arn_protocol::core::message::Message;
//! use arn_protocol::error::ProtocolError;
//!
//! match Message::from_bytes(&[1, 1, 0]) {
//!     Err(ProtocolError::MessageTooShort(len)) => assert_eq!(len, 3),
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Registry lock errors
    pub const ERR_CAPABILITY_WRITE_LOCK: &str = "Failed to acquire write lock on capability registry";
    pub const ERR_CAPABILITY_READ_LOCK: &str = "Failed to acquire read lock on capability registry";
    pub const ERR_BRIDGE_WRITE_LOCK: &str = "Failed to acquire write lock on bridge registry";
    pub const ERR_BRIDGE_READ_LOCK: &str = "Failed to acquire read lock on bridge registry";

    /// Registration errors
    pub const ERR_CAPABILITY_ID_REQUIRED: &str = "capability ID required";
    pub const ERR_BRIDGE_ID_REQUIRED: &str = "bridge ID required";

    /// Error texts returned to peers
    pub const ERR_INVALID_CAPABILITY: &str = "invalid capability format";
    pub const ERR_INVALID_QUERY: &str = "invalid query format";
    pub const ERR_INVALID_BRIDGE: &str = "invalid MCP bridge format";
    pub const ERR_INVALID_BRIDGE_REQUEST: &str = "invalid bridge request format";
    pub const ERR_BRIDGE_NOT_FOUND: &str = "bridge not found";
    pub const ERR_UNSUPPORTED_DATA_TYPE: &str = "unsupported data type";
}

/// Primary error type for all protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Message too short: {0} bytes (minimum 14)")]
    MessageTooShort(usize),

    #[error("Invalid message size: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("Payload too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Timestamp cannot be represented in nanoseconds since the Unix epoch")]
    InvalidTimestamp,

    #[error("Invalid capability: {0}")]
    InvalidCapability(String),

    #[error("Invalid bridge: {0}")]
    InvalidBridge(String),

    #[error("mcp bridge notification failed: {0}")]
    BridgeNotification(#[source] Box<ProtocolError>),

    #[error("Message handler error: {0}")]
    MessageHandler(String),

    #[error("Synchronization primitive poisoned: {0}")]
    LockPoisoned(&'static str),

    #[error("Timeout occurred")]
    Timeout,

    #[error("Server is shutting down")]
    Shutdown,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("{0}")]
    Custom(String),
}

impl ProtocolError {
    /// True for the error the accept/receive loops return once the server is
    /// stopping.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, ProtocolError::Shutdown)
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
