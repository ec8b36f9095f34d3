//! Link configuration.
//!
//! All fields have defaults, so a partial JSON document is valid:
//!
//! ```
//! use b2b_link::LinkConfig;
//!
//! let config = LinkConfig::from_json(r#"{ "retries": 3, "response_timeout_ms": 250 }"#).unwrap();
//! assert_eq!(config.retries, 3);
//! assert_eq!(config.mru, 2048);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::buffer_pool::DEFAULT_POOL_BUFFERS;
use crate::correlator::DEFAULT_RESPONSE_QUEUE_DEPTH;
use crate::error::Result;
use crate::message::{DEFAULT_RETRIES, DEFAULT_TIMEOUT, IDENTITY_TIMEOUT};
use crate::protocol::{DEFAULT_MRU, HEADER_SIZE};
use crate::writer::{
    WriterConfig, DEFAULT_BACKPRESSURE_TIMEOUT, DEFAULT_CHANNEL_CAPACITY,
    DEFAULT_MAX_PENDING_FRAMES,
};

/// Default maximum concurrent request handlers.
pub const DEFAULT_MAX_CONCURRENT_HANDLERS: usize = 32;

/// Configuration of one end of a B2B link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Maximum Receive Unit: largest information field accepted.
    pub mru: usize,
    /// Retries after the first attempt of a request.
    pub retries: u8,
    /// Wait per attempt for a response.
    pub response_timeout_ms: u64,
    /// Wait per attempt for an identity response.
    pub identity_timeout_ms: u64,
    /// Depth of the response queue.
    pub response_queue_depth: usize,
    /// Packet buffers that may be outstanding at once.
    pub pool_buffers: usize,
    /// Request handlers that may run at once.
    pub max_concurrent_handlers: usize,
    /// Frames queued for the writer before senders wait.
    pub max_pending_frames: usize,
    /// Writer channel capacity.
    pub channel_capacity: usize,
    /// How long senders wait for backpressure to clear.
    pub backpressure_timeout_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            mru: DEFAULT_MRU,
            retries: DEFAULT_RETRIES,
            response_timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
            identity_timeout_ms: IDENTITY_TIMEOUT.as_millis() as u64,
            response_queue_depth: DEFAULT_RESPONSE_QUEUE_DEPTH,
            pool_buffers: DEFAULT_POOL_BUFFERS,
            max_concurrent_handlers: DEFAULT_MAX_CONCURRENT_HANDLERS,
            max_pending_frames: DEFAULT_MAX_PENDING_FRAMES,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            backpressure_timeout_ms: DEFAULT_BACKPRESSURE_TIMEOUT.as_millis() as u64,
        }
    }
}

impl LinkConfig {
    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize the configuration to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Wait per attempt for a response.
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    /// Wait per attempt for an identity response.
    pub fn identity_timeout(&self) -> Duration {
        Duration::from_millis(self.identity_timeout_ms)
    }

    /// Backpressure timeout of the writer.
    pub fn backpressure_timeout(&self) -> Duration {
        Duration::from_millis(self.backpressure_timeout_ms)
    }

    /// Largest packet a pool buffer must hold.
    ///
    /// A whole packet (header included) travels in one information field.
    pub fn max_packet(&self) -> usize {
        self.mru.max(HEADER_SIZE)
    }

    /// Writer task settings.
    pub fn writer_config(&self) -> WriterConfig {
        WriterConfig {
            max_pending_frames: self.max_pending_frames,
            channel_capacity: self.channel_capacity.max(1),
            backpressure_timeout: self.backpressure_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LinkConfig::default();

        assert_eq!(config.mru, 2048);
        assert_eq!(config.retries, 1);
        assert_eq!(config.response_timeout(), Duration::from_millis(500));
        assert_eq!(config.identity_timeout(), Duration::from_secs(5));
        assert_eq!(config.response_queue_depth, 10);
        assert_eq!(config.pool_buffers, 16);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = LinkConfig::from_json(r#"{ "mru": 512 }"#).unwrap();

        assert_eq!(config.mru, 512);
        assert_eq!(config.retries, DEFAULT_RETRIES);
        assert_eq!(config.max_concurrent_handlers, DEFAULT_MAX_CONCURRENT_HANDLERS);
    }

    #[test]
    fn test_invalid_json() {
        let result = LinkConfig::from_json(r#"{ "retries": "many" }"#);
        assert!(matches!(result, Err(crate::error::B2bError::Json(_))));
    }

    #[test]
    fn test_json_roundtrip() {
        let config = LinkConfig {
            retries: 4,
            backpressure_timeout_ms: 100,
            ..LinkConfig::default()
        };
        let json = config.to_json().unwrap();

        assert_eq!(LinkConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_writer_config() {
        let config = LinkConfig {
            max_pending_frames: 8,
            channel_capacity: 0,
            backpressure_timeout_ms: 250,
            ..LinkConfig::default()
        };
        let writer = config.writer_config();

        assert_eq!(writer.max_pending_frames, 8);
        assert_eq!(writer.channel_capacity, 1);
        assert_eq!(writer.backpressure_timeout, Duration::from_millis(250));
    }
}
