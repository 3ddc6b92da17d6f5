//! # Error Types
//!
//! Comprehensive error handling for the messaging core.
//!
//! This module defines all error variants that can occur while a connection
//! is being established, framed traffic is being coded, or messages are
//! being dispatched.
//!
//! ## Error Categories
//! - **Transport Errors**: bind/connect failures, I/O faults, timeouts
//! - **Frame Errors**: malformed or oversized frames on the wire
//! - **Security Errors**: per-direction transform failures, TLS issues
//! - **Dispatch Errors**: unknown message types, registration conflicts
//! - **Lifecycle Errors**: closed connections, heartbeat expiry
//!
//! All fatal conditions on a live connection are routed through
//! [`Hooks::on_except`](crate::service::Hooks::on_except) with the variant
//! describing the cause. Only [`WireError::UnknownMessage`] is recoverable,
//! via [`Hooks::on_unknown_message`](crate::service::Hooks::on_unknown_message).
//!
//! ## Example Usage
//! ```rust
//! use sockwire::error::{Result, WireError};
//!
//! fn check_frame_len(len: usize, limit: usize) -> Result<()> {
//!     if len > limit {
//!         return Err(WireError::FrameTooLarge { size: len, limit });
//!     }
//!     Ok(())
//! }
//!
//! assert!(check_frame_len(2048, 1024).is_err());
//! ```

use std::io;
use thiserror::Error;

/// WireError is the primary error type for all messaging operations
#[derive(Error, Debug)]
pub enum WireError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Bind failed for {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Connect failed for {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Frame too large: {size} bytes (limit {limit})")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("Security transform failed: {0}")]
    SecurityError(String),

    #[error("Unknown message type: {0}")]
    UnknownMessage(u32),

    #[error("Heartbeat expired after {idle_ms} ms without a heartbeat")]
    HeartbeatExpired { idle_ms: u64 },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Not connected")]
    NotConnected,

    #[error("Operation timed out")]
    Timeout,

    #[error("Duplicate prototype registration for type {0}")]
    DuplicateProtocol(u32),

    #[error("Duplicate consumer registration for type {0}")]
    DuplicateConsumer(u32),

    #[error("Type {0} is reserved for built-in messages")]
    ReservedType(u32),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("TLS error: {0}")]
    TlsError(String),
}

/// Type alias for Results using WireError
pub type Result<T> = std::result::Result<T, WireError>;
