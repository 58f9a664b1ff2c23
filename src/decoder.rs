//! Frame classification and the channel id cache.

use crate::channels::{ChannelMap, CoinIdentity};
use crate::config::BridgeConfig;
use crate::constants::*;
use crate::error::DecodeError;
use crate::frame::{Frame, FrameAssembler};
use crate::types::{DecodedEvent, EventKind};
use std::time::{Duration, Instant};

/// Everything one batch of bytes produced, in arrival order
pub type Decoded = Vec<Result<DecodedEvent, DecodeError>>;

#[derive(Debug, Clone, Copy)]
struct PendingReply {
    header: u8,
    argument: Option<u8>,
    since: Instant,
}

/// Turns drained bytes into [`DecodedEvent`]s.
pub struct FrameDecoder {
    assembler: FrameAssembler,
    channels: ChannelMap,
    pending: Option<PendingReply>,
    reply_timeout: Duration,
    last_event_counter: Option<u8>,
}

impl FrameDecoder {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            assembler: FrameAssembler::new(config.partial_frame_timeout()),
            channels: ChannelMap::new(),
            pending: None,
            reply_timeout: config.reply_timeout(),
            last_event_counter: None,
        }
    }

    /// Forget everything from a previous session.
    pub fn reset(&mut self) {
        self.assembler.clear();
        self.channels.clear();
        self.pending = None;
        self.last_event_counter = None;
    }

    pub fn channel_map(&self) -> &ChannelMap {
        &self.channels
    }

    /// Note that a command with `header` was sent and awaits its reply.
    /// `argument` is the command's first data byte, if any.
    pub fn expect_reply(&mut self, header: u8, argument: Option<u8>, now: Instant) {
        self.pending = Some(PendingReply {
            header,
            argument,
            since: now,
        });
    }

    /// Note the exact bytes just written, so their echo is recognised.
    pub fn expect_echo(&mut self, bytes: &[u8]) {
        self.assembler.expect_echo(bytes);
    }

    /// Forget the outstanding command and its echo.
    pub fn clear_pending(&mut self) {
        self.pending = None;
        self.assembler.clear_echo();
    }

    /// Header of the command still awaiting a reply, if not yet expired
    pub fn pending_reply(&self, now: Instant) -> Option<u8> {
        self.live_pending(now).map(|p| p.header)
    }

    fn live_pending(&self, now: Instant) -> Option<PendingReply> {
        self.pending
            .filter(|p| now.duration_since(p.since) < self.reply_timeout)
    }

    /// Feed drained bytes, returning every event and error they produce.
    pub fn feed(&mut self, bytes: &[u8], now: Instant) -> Decoded {
        let mut out = self.expire(now);
        self.assembler.push(bytes, now);
        self.drain_frames(now, &mut out);
        out
    }

    /// Drop bytes left waiting too long, then decode any frame they hid.
    pub fn expire(&mut self, now: Instant) -> Decoded {
        let mut out = Vec::new();
        if let Some(err) = self.assembler.expire(now) {
            out.push(Err(err));
            self.drain_frames(now, &mut out);
        }
        out
    }

    fn drain_frames(&mut self, now: Instant, out: &mut Decoded) {
        while let Some(result) = self.assembler.next_frame() {
            match result {
                Ok(frame) => self.classify(frame, now, out),
                Err(e) => out.push(Err(e)),
            }
        }
    }

    fn classify(&mut self, frame: Frame, now: Instant, out: &mut Decoded) {
        if frame.destination != HOST_ADDRESS {
            // Our own command looped back on the single wire bus.
            log::trace!("echo of header {:#04x}", frame.header);
            if frame.destination == DEVICE_ADDRESS {
                self.expect_reply(frame.header, frame.data.first().copied(), now);
            }
            return;
        }

        let awaiting = self.live_pending(now);
        self.pending = None;
        let command = awaiting.map(|p| p.header);

        if frame.header == HEADER_NAK {
            out.push(Ok(DecodedEvent::new(EventKind::Nak { command }, frame.raw)));
            return;
        }

        match (command, frame.data.len()) {
            (_, CHANNEL_TABLE_LEN) => match ChannelMap::from_table(&frame.data) {
                Ok(map) => {
                    self.channels.replace(map);
                    log::info!("Channel map updated");
                    out.push(Ok(DecodedEvent::new(EventKind::ChannelMapUpdated, frame.raw)));
                }
                Err(e) => out.push(Err(e)),
            },
            (Some(HEADER_REQUEST_COIN_ID), COIN_ID_WIDTH) => {
                let requested = awaiting.and_then(|p| p.argument);
                out.push(self.coin_id(requested, &frame));
            }
            (Some(HEADER_READ_BUFFERED_CREDIT), _) | (None, BUFFERED_CREDIT_LEN) => {
                self.buffered_credit(&frame, out)
            }
            (Some(HEADER_SELF_CHECK), 1) => {
                let fault_code = frame.data[0];
                if fault_code != 0 {
                    log::warn!(
                        "Self check fault {}: {}",
                        fault_code,
                        fault_description(fault_code)
                    );
                }
                out.push(Ok(DecodedEvent::new(EventKind::SelfCheck { fault_code }, frame.raw)))
            }
            (command, 0) => out.push(Ok(DecodedEvent::new(EventKind::Ack { command }, frame.raw))),
            _ => out.push(Ok(DecodedEvent::new(
                EventKind::Reply {
                    header: frame.header,
                    data: frame.data.clone(),
                },
                frame.raw,
            ))),
        }
    }

    /// Reply to a single channel coin id request, numbered from 1.
    fn coin_id(
        &mut self,
        requested: Option<u8>,
        frame: &Frame,
    ) -> Result<DecodedEvent, DecodeError> {
        let channel = match requested {
            Some(n @ 1..=16) => n - 1,
            other => {
                return Err(DecodeError::Malformed(format!(
                    "coin id reply for channel {:?} outside 1-16",
                    other
                )))
            }
        };
        let identity = CoinIdentity::parse(&frame.data)?;
        self.channels.set(channel, identity.clone())?;
        log::info!("Channel {} identified", channel);
        Ok(DecodedEvent::new(
            EventKind::ChannelIdentified { channel, identity },
            frame.raw.clone(),
        ))
    }

    /// `[counter][credit, sorter or error] x 5`, newest pair first.
    fn buffered_credit(&mut self, frame: &Frame, out: &mut Decoded) {
        let data = &frame.data;
        if data.len() < 3 || data.len() % 2 == 0 {
            out.push(Err(DecodeError::Malformed(format!(
                "buffered credit block of {} bytes",
                data.len()
            ))));
            return;
        }

        let counter = data[0];
        let pairs = (data.len() - 1) / 2;
        let fresh = match self.last_event_counter {
            None => 1,
            Some(last) => new_event_count(last, counter),
        };
        self.last_event_counter = Some(counter);
        if counter == 0 {
            // Counter zero means the device has just powered up or reset.
            return;
        }

        // Oldest first, so callers see events in the order they happened.
        for i in (0..fresh.min(pairs)).rev() {
            let credit = data[1 + i * 2];
            let detail = data[2 + i * 2];
            let kind = match credit {
                0 if detail == 0 => continue,
                0 => {
                    log::warn!("Coin acceptor fault {}: {}", detail, fault_description(detail));
                    EventKind::Fault { code: detail }
                }
                1..=16 => {
                    let channel = credit - 1;
                    EventKind::CoinAccepted {
                        channel,
                        identity: self.channels.get(channel).cloned(),
                        sorter_path: detail,
                    }
                }
                other => {
                    out.push(Err(DecodeError::Malformed(format!(
                        "credit code {} outside channels 1-16",
                        other
                    ))));
                    continue;
                }
            };
            out.push(Ok(DecodedEvent::new(kind, frame.raw.clone())));
        }
    }
}

/// Events logged between two counter readings. After power-up the counter
/// runs 1 to 255 and wraps back to 1, never to 0.
fn new_event_count(last: u8, counter: u8) -> usize {
    if counter >= last {
        (counter - last) as usize
    } else {
        counter as usize + 255 - last as usize
    }
}
