//! Protocol constants for Pelicano communication.
//!
//! This module defines the bus addresses, header bytes, frame geometry,
//! serial port configuration and timing defaults used by the bridge.

/// Address the host (this bridge) answers to
pub const HOST_ADDRESS: u8 = 0x01;

/// Address of the Pelicano on the bus
pub const DEVICE_ADDRESS: u8 = 0x02;

/// Reply header: command accepted
pub const HEADER_ACK: u8 = 0x00;

/// Reply header: command refused
pub const HEADER_NAK: u8 = 0x05;

/// Reset device
pub const HEADER_RESET: u8 = 0x01;

/// Request coin id
pub const HEADER_REQUEST_COIN_ID: u8 = 0xB8;

/// Read buffered credit or error codes
pub const HEADER_READ_BUFFERED_CREDIT: u8 = 0xE5;

/// Perform self-check
pub const HEADER_SELF_CHECK: u8 = 0xE8;

/// Operate motors (speed, trash door)
pub const HEADER_OPERATE_MOTORS: u8 = 0xEF;

/// Test solenoids
pub const HEADER_TEST_SOLENOIDS: u8 = 0xF0;

/// Simple poll
pub const HEADER_SIMPLE_POLL: u8 = 0xFE;

/// Bytes around the data block: destination, length, source, header, checksum
pub const FRAME_OVERHEAD: usize = 5;

/// Number of coin channels the Pelicano reports
pub const CHANNEL_COUNT: usize = 16;

/// Width of one coin id field, e.g. `CN010B`
pub const COIN_ID_WIDTH: usize = 6;

/// Data length of a full channel id table reply
pub const CHANNEL_TABLE_LEN: usize = CHANNEL_COUNT * COIN_ID_WIDTH;

/// Data length of a buffered credit reply: counter plus five result pairs
pub const BUFFERED_CREDIT_LEN: usize = 11;

/// Baud rate (9600 bps)
pub const BAUD_RATE: u32 = 9600;

/// Data bits per character
pub const DATA_BITS: serialport::DataBits = serialport::DataBits::Eight;

/// Stop bits configuration
pub const STOP_BITS: serialport::StopBits = serialport::StopBits::One;

/// Parity configuration
pub const PARITY: serialport::Parity = serialport::Parity::None;

/// Write timeout in milliseconds
pub const TIMEOUT_MS: u64 = 2000;

/// Upper bound on bytes collected by a single drain
pub const MAX_DRAIN_BYTES: usize = 4096;

/// Interval between notification checks in the receive loop
pub const POLL_INTERVAL_MS: u64 = 10;

/// Age after which an incomplete frame is discarded
pub const PARTIAL_FRAME_TIMEOUT_MS: u64 = 100;

/// How long a sent command waits for its reply before the slot is released
pub const REPLY_TIMEOUT_MS: u64 = 500;

/// Default bounded event queue capacity
pub const EVENT_QUEUE_CAPACITY: usize = 64;

/// Default number of retained diagnostics
pub const DIAGNOSTICS_CAPACITY: usize = 32;

/// Default number of raw received bytes retained for `read_available`
pub const CAPTURE_LIMIT: usize = 4096;

/// Default serial device
#[cfg(windows)]
pub const DEFAULT_PORT: &str = "COM3";

/// Default serial device
#[cfg(not(windows))]
pub const DEFAULT_PORT: &str = "/dev/tty.SOC";

/// Human readable description of a coin acceptor error code
pub fn fault_description(code: u8) -> &'static str {
    match code {
        0 => "no error",
        1 => "reject coin",
        2 => "inhibited coin",
        3 => "multiple window",
        5 => "validation timeout",
        6 => "credit sensor timeout",
        7 => "sorter opto timeout",
        8 => "second close coin error",
        10 => "credit sequence error",
        12 => "coin too fast",
        13 => "coin too slow",
        14 => "coin on string mechanism activated",
        17 => "coin going backwards",
        20 => "inhibited coin (serial)",
        254 => "coin return mechanism activated",
        _ => "unknown fault",
    }
}
