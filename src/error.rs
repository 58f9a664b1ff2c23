//! Error types for Pelicano bridge operations.

use thiserror::Error;

/// Result type alias for Pelicano operations.
pub type Result<T> = std::result::Result<T, PelicanoError>;

/// Error types for Pelicano communication.
#[derive(Error, Debug)]
pub enum PelicanoError {
    /// Named serial port does not exist
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Serial port is held by another process or session
    #[error("Port busy: {0}")]
    PortBusy(String),

    /// Driver rejected the 9600-8-N-1 configuration
    #[error("Unsupported configuration on {port}: {reason}")]
    UnsupportedConfiguration {
        /// Port being configured
        port: String,
        /// Driver message
        reason: String,
    },

    /// Frame could not be fully written
    #[error("Write failed: {0}")]
    IoWriteError(std::io::Error),

    /// Driver-level read failure
    #[error("Read failed: {0}")]
    IoReadError(std::io::Error),

    /// Operation attempted on a closed or never-opened port
    #[error("Not connected")]
    NotConnected,

    /// A previous command is still awaiting its reply
    #[error("Command in flight: header {header:#04x} awaiting reply")]
    CommandInFlight {
        /// Header of the outstanding command
        header: u8,
    },

    /// Hex text could not be decoded
    #[error("Malformed hex: {0}")]
    MalformedHex(String),

    /// Value does not fit the requested hex width
    #[error("Value {value} does not fit in {width} bytes")]
    ValueOutOfRange {
        /// Value that was being formatted
        value: u64,
        /// Target width in bytes
        width: usize,
    },

    /// Received bytes could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Other serial port driver error
    #[error("Serial port error: {0}")]
    SerialPort(#[from] serialport::Error),

    /// Receive worker could not be started
    #[error("Worker error: {0}")]
    Worker(std::io::Error),
}

/// Frame level decoding failures, reported through the diagnostics sink.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Frame bytes did not sum to zero
    #[error("Checksum mismatch: frame sums to {sum:#04x}")]
    ChecksumMismatch {
        /// Byte sum modulo 256 of the candidate frame
        sum: u8,
    },

    /// Incomplete frame discarded after the inter-byte timeout
    #[error("Truncated frame: expected {expected} bytes, got {received}")]
    Truncated {
        /// Frame length announced by the length byte
        expected: usize,
        /// Bytes actually buffered
        received: usize,
    },

    /// Frame was well formed but its content is not
    #[error("Malformed frame: {0}")]
    Malformed(String),
}
