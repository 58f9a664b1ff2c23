//! Runtime settings for a bridge session.

use crate::constants::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bridge settings. Missing fields take the protocol defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Serial device path or name
    pub port_name: String,
    pub write_timeout_ms: u64,
    /// Interval between notification checks
    pub poll_interval_ms: u64,
    pub event_queue_capacity: usize,
    pub diagnostics_capacity: usize,
    /// Raw received bytes retained for `read_available`
    pub capture_limit: usize,
    pub partial_frame_timeout_ms: u64,
    pub reply_timeout_ms: u64,
    /// Refuse to send while a reply is outstanding
    pub strict_pairing: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            port_name: DEFAULT_PORT.to_string(),
            write_timeout_ms: TIMEOUT_MS,
            poll_interval_ms: POLL_INTERVAL_MS,
            event_queue_capacity: EVENT_QUEUE_CAPACITY,
            diagnostics_capacity: DIAGNOSTICS_CAPACITY,
            capture_limit: CAPTURE_LIMIT,
            partial_frame_timeout_ms: PARTIAL_FRAME_TIMEOUT_MS,
            reply_timeout_ms: REPLY_TIMEOUT_MS,
            strict_pairing: false,
        }
    }
}

impl BridgeConfig {
    pub fn with_port(mut self, port_name: impl Into<String>) -> Self {
        self.port_name = port_name.into();
        self
    }

    pub fn with_strict_pairing(mut self, strict: bool) -> Self {
        self.strict_pairing = strict;
        self
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn partial_frame_timeout(&self) -> Duration {
        Duration::from_millis(self.partial_frame_timeout_ms)
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }
}
