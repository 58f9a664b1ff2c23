//! # Pelicano Bridge
//!
//! A Rust library bridging a Pelicano coin acceptor over its serial
//! command/response protocol.
//!
//! ## Features
//!
//! - Open and close the 9600-8-N-1 serial link
//! - Send catalog commands (poll, reset, self check, solenoid test, speed,
//!   trash door, channel ids, buffered credit) or raw hex frames
//! - Background receive worker that reassembles frames and publishes
//!   decoded events on a bounded channel
//! - 16 channel coin identity cache used to resolve acceptance events
//!
//! ## Example
//!
//! ```no_run
//! use pelicano_bridge::{BridgeConfig, Pelicano};
//! use std::time::Duration;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pelicano = Pelicano::new(BridgeConfig::default().with_port("/dev/ttyUSB0"));
//!     let events = pelicano.events().expect("first call");
//!     pelicano.open_port()?;
//!     pelicano.request_channel_ids()?;
//!     if let Ok(event) = events.recv_timeout(Duration::from_secs(1)) {
//!         println!("{:?} ({})", event.kind, event.raw_hex());
//!     }
//!     pelicano.close_port();
//!     Ok(())
//! }
//! ```

pub mod channels;
pub mod codec;
pub mod commands;
pub mod config;
pub mod constants;
pub mod decoder;
pub mod error;
pub mod frame;
pub mod protocol;
pub mod receiver;
pub mod transport;
pub mod types;

pub use channels::{ChannelEntry, ChannelMap, CoinIdentity};
pub use commands::{Command, MotorSpeed};
pub use config::BridgeConfig;
pub use error::{DecodeError, PelicanoError, Result};
pub use protocol::Pelicano;
pub use transport::{MemoryLink, SerialLink, Transport};
pub use types::*;
