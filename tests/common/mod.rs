#![allow(dead_code)]

use pelicano_bridge::commands::build_frame;
use pelicano_bridge::constants::*;
use pelicano_bridge::{BridgeConfig, DecodedEvent, MemoryLink, Pelicano};
use std::sync::mpsc::Receiver;
use std::time::Duration;

pub const WAIT: Duration = Duration::from_secs(2);

pub fn config() -> BridgeConfig {
    BridgeConfig {
        poll_interval_ms: 1,
        ..BridgeConfig::default()
    }
    .with_port("mem")
}

/// An open bridge over a memory link, with its event stream.
pub fn open_bridge(config: BridgeConfig) -> (Pelicano, MemoryLink, Receiver<DecodedEvent>) {
    let link = MemoryLink::new();
    let pelicano = Pelicano::new(config);
    let events = pelicano.events().expect("event stream");
    pelicano
        .open_with_link("mem", Box::new(link.clone()))
        .expect("open memory link");
    (pelicano, link, events)
}

pub fn reply(data: &[u8]) -> Vec<u8> {
    build_frame(HOST_ADDRESS, DEVICE_ADDRESS, HEADER_ACK, data)
}

pub fn channel_table(ids: [&str; CHANNEL_COUNT]) -> Vec<u8> {
    reply(&ids.iter().flat_map(|id| id.bytes()).collect::<Vec<u8>>())
}
