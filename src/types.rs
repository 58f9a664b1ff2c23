use crate::channels::CoinIdentity;
use crate::codec;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

/// What a received frame meant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// Command accepted; `command` is the header that was awaiting a reply
    Ack { command: Option<u8> },
    /// Command refused
    Nak { command: Option<u8> },
    /// Channel id table received and the channel map replaced
    ChannelMapUpdated,
    /// Coin id of a single channel received and stored in the channel map
    ChannelIdentified {
        /// Channel index, 0 to 15
        channel: u8,
        /// `None` when the channel is not programmed
        identity: Option<CoinIdentity>,
    },
    /// A coin was accepted on `channel` (0 to 15)
    CoinAccepted {
        channel: u8,
        /// Resolved from the channel map, `None` before it is known
        identity: Option<CoinIdentity>,
        /// Sorter path the coin was sent down
        sorter_path: u8,
    },
    /// Coin acceptor error code from the event log
    Fault { code: u8 },
    /// Self check result, 0 meaning no fault
    SelfCheck { fault_code: u8 },
    /// Any other reply
    Reply {
        /// Header byte of the reply frame
        header: u8,
        /// Reply payload
        data: Vec<u8>,
    },
}

/// Decoded event surfaced to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedEvent {
    /// When the frame was decoded
    pub received_at: DateTime<Utc>,
    /// What the frame meant
    pub kind: EventKind,
    /// Exact bytes of the frame
    pub raw: Vec<u8>,
}

impl DecodedEvent {
    pub fn new(kind: EventKind, raw: Vec<u8>) -> Self {
        Self {
            received_at: Utc::now(),
            kind,
            raw,
        }
    }

    /// Raw frame as uppercase hex
    pub fn raw_hex(&self) -> String {
        codec::encode(&self.raw)
    }
}

/// A recorded receive-path failure
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    /// When the failure was recorded
    pub timestamp: DateTime<Utc>,
    /// Human readable description
    pub message: String,
}

/// Bounded, shareable ring of recent diagnostics
#[derive(Debug, Clone)]
pub struct Diagnostics {
    inner: Arc<Mutex<VecDeque<Diagnostic>>>,
    capacity: usize,
}

impl Diagnostics {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
        }
    }

    /// Record a diagnostic, dropping the oldest when full
    pub fn record(&self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{}", message);
        let mut ring = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if ring.len() == self.capacity {
            ring.pop_front();
        }
        ring.push_back(Diagnostic {
            timestamp: Utc::now(),
            message,
        });
    }

    /// Remove and return everything recorded so far
    pub fn take(&self) -> Vec<Diagnostic> {
        let mut ring = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        ring.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Modem control line levels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ModemStatus {
    /// CTS line
    pub clear_to_send: bool,
    /// DSR line
    pub data_set_ready: bool,
    /// RI line
    pub ring_indicator: bool,
    /// CD line
    pub carrier_detect: bool,
}

/// Conditions the receive loop watches for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    /// Inbound bytes are buffered
    DataAvailable,
    /// Carrier, ring or flow control lines changed
    LinesChanged(ModemStatus),
}
