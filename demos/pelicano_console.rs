//! Pelicano Console
//!
//! Opens the coin acceptor, reads its channel table and prints every
//! decoded event for a while:
//! - Listing and selecting serial ports
//! - Poll, self check and channel id query
//! - Periodic buffered credit reads while coins are inserted
//!
//! Usage:
//!   cargo run --example pelicano_console                  # Interactive mode
//!   cargo run --example pelicano_console -- /dev/ttyUSB0  # Specify port
//!
//! Set RUST_LOG environment variable to control logging:
//!   RUST_LOG=debug cargo run --example pelicano_console

use inquire::Select;
use log::info;
use pelicano_bridge::constants::fault_description;
use pelicano_bridge::{BridgeConfig, EventKind, Pelicano, Result};
use std::time::{Duration, Instant};

/// Interactive serial port selection using inquire
fn select_port() -> Result<String> {
    let ports = Pelicano::list_ports()?;

    if ports.is_empty() {
        eprintln!("No serial ports found!");
        std::process::exit(1);
    }

    let port_names: Vec<String> = ports.iter().map(|p| p.port_name.clone()).collect();

    match Select::new("Select a serial port:", port_names).prompt() {
        Ok(port) => Ok(port),
        Err(e) => {
            eprintln!("Selection cancelled: {}", e);
            std::process::exit(1);
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let port_name = match std::env::args().nth(1) {
        Some(port) => port,
        None => select_port()?,
    };

    let pelicano = Pelicano::new(BridgeConfig::default().with_port(port_name.clone()));
    let Some(events) = pelicano.events() else {
        return Ok(());
    };

    info!("Connecting to Pelicano on {}...", port_name);
    pelicano.open_port()?;

    pelicano.poll()?;
    std::thread::sleep(Duration::from_millis(200));
    pelicano.self_check()?;
    std::thread::sleep(Duration::from_millis(200));
    pelicano.request_channel_ids()?;

    info!("=== Insert coins (30 seconds) ===");
    let start = Instant::now();
    let mut last_credit_read = Instant::now();
    while start.elapsed() < Duration::from_secs(30) {
        if last_credit_read.elapsed() > Duration::from_millis(250) {
            pelicano.read_buffered_credit()?;
            last_credit_read = Instant::now();
        }
        match events.recv_timeout(Duration::from_millis(50)) {
            Ok(event) => match &event.kind {
                EventKind::ChannelMapUpdated => {
                    for entry in pelicano.channel_map().entries() {
                        if let Some(id) = entry.identity {
                            info!("Channel {:2}: {}", entry.index, id);
                        }
                    }
                }
                EventKind::CoinAccepted { channel, identity, .. } => match identity {
                    Some(id) => info!("Coin accepted on channel {}: {}", channel, id),
                    None => info!("Coin accepted on channel {} (unknown coin)", channel),
                },
                EventKind::Fault { code } | EventKind::SelfCheck { fault_code: code } => {
                    info!("Fault {}: {}", code, fault_description(*code))
                }
                other => info!("{:?} [{}]", other, event.raw_hex()),
            },
            Err(_) => continue,
        }
    }

    for diagnostic in pelicano.take_diagnostics() {
        info!("{} {}", diagnostic.timestamp.format("%H:%M:%S%.3f"), diagnostic.message);
    }

    pelicano.close_port();
    info!("=== Console Complete ===");
    Ok(())
}
