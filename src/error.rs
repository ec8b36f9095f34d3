//! Error types for b2b-link.

use thiserror::Error;

/// Main error type for all B2B link operations.
///
/// Timeouts waiting for a response are not errors: request/response
/// operations report them as an absent response.
#[derive(Debug, Error)]
pub enum B2bError {
    /// I/O error on the serial link.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while loading configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Protocol error (bad header, short body, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Every packet buffer in the pool is in use.
    #[error("Packet buffer pool exhausted")]
    PoolExhausted,

    /// Packet does not fit in a pool buffer.
    #[error("Packet of {len} bytes exceeds maximum {max}")]
    PacketTooLarge { len: usize, max: usize },

    /// No handler registered for the given message type.
    #[error("Handler not found for message type: {0}")]
    HandlerNotFound(u16),

    /// Link closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Backpressure timeout - writer queue full.
    #[error("Backpressure timeout")]
    BackpressureTimeout,
}

/// Result type alias using B2bError.
pub type Result<T> = std::result::Result<T, B2bError>;
