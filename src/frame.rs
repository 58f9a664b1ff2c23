//! Frame reassembly over the byte stream.
//!
//! Frames are `[destination][length][source][header][data...][checksum]` and
//! a valid frame sums to zero modulo 256. The serial link carries no
//! delimiters, so a drain may hold part of a frame or several frames at once.

use crate::constants::FRAME_OVERHEAD;
use crate::error::DecodeError;
use std::time::{Duration, Instant};

/// One checksum-valid protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Address the frame is sent to
    pub destination: u8,
    /// Address of the sender
    pub source: u8,
    /// Command header, or 0 for a reply
    pub header: u8,
    /// Payload between header and checksum
    pub data: Vec<u8>,
    /// The whole frame as received
    pub raw: Vec<u8>,
}

impl Frame {
    /// Parse exactly one frame from `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < FRAME_OVERHEAD {
            return Err(DecodeError::Truncated {
                expected: FRAME_OVERHEAD,
                received: bytes.len(),
            });
        }
        let expected = bytes[1] as usize + FRAME_OVERHEAD;
        if bytes.len() != expected {
            return Err(DecodeError::Truncated {
                expected,
                received: bytes.len(),
            });
        }
        let sum = byte_sum(bytes);
        if sum != 0 {
            return Err(DecodeError::ChecksumMismatch { sum });
        }
        Ok(Self::from_raw(bytes.to_vec()))
    }

    /// Length-consistent bytes, checksum not checked.
    fn from_raw(raw: Vec<u8>) -> Self {
        let end = raw.len() - 1;
        Frame {
            destination: raw[0],
            source: raw[2],
            header: raw[3],
            data: raw[4..end].to_vec(),
            raw,
        }
    }
}

fn is_frame_shaped(bytes: &[u8]) -> bool {
    bytes.len() >= FRAME_OVERHEAD && bytes[1] as usize + FRAME_OVERHEAD == bytes.len()
}

fn byte_sum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Accumulates drained bytes and yields complete frames.
#[derive(Debug)]
pub struct FrameAssembler {
    buffer: Vec<u8>,
    last_push: Option<Instant>,
    partial_timeout: Duration,
    echo: Option<Vec<u8>>,
}

impl FrameAssembler {
    pub fn new(partial_timeout: Duration) -> Self {
        Self {
            buffer: Vec::new(),
            last_push: None,
            partial_timeout,
            echo: None,
        }
    }

    /// Expect `bytes` to loop back on the bus. The echo is matched
    /// byte for byte, so it is recognised even when it does not balance.
    pub fn expect_echo(&mut self, bytes: &[u8]) {
        self.echo = is_frame_shaped(bytes).then(|| bytes.to_vec());
    }

    pub fn clear_echo(&mut self) {
        self.echo = None;
    }

    /// Append freshly drained bytes.
    pub fn push(&mut self, bytes: &[u8], now: Instant) {
        self.buffer.extend_from_slice(bytes);
        self.last_push = Some(now);
    }

    /// Number of bytes waiting to form a frame.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.last_push = None;
        self.echo = None;
    }

    /// Next complete frame, or `None` when more bytes are needed.
    ///
    /// A checksum failure skips ahead to the next offset holding a valid
    /// frame, keeping everything after it.
    pub fn next_frame(&mut self) -> Option<Result<Frame, DecodeError>> {
        if let Some(echo) = &self.echo {
            if self.buffer.starts_with(echo) {
                let raw: Vec<u8> = self.buffer.drain(..echo.len()).collect();
                self.echo = None;
                return Some(Ok(Frame::from_raw(raw)));
            }
            if !self.buffer.is_empty() && echo.starts_with(&self.buffer) {
                return None;
            }
        }

        if self.buffer.len() < 2 {
            return None;
        }
        let expected = self.buffer[1] as usize + FRAME_OVERHEAD;
        if self.buffer.len() < expected {
            return None;
        }
        match Frame::parse(&self.buffer[..expected]) {
            Ok(frame) => {
                self.buffer.drain(..expected);
                Some(Ok(frame))
            }
            Err(e) => {
                let skip = self
                    .next_valid_offset()
                    .or_else(|| self.next_partial_offset())
                    .unwrap_or(self.buffer.len());
                self.buffer.drain(..skip);
                Some(Err(e))
            }
        }
    }

    /// Discard bytes that have waited past the timeout without forming a
    /// frame. Any valid frame further along the buffer is kept.
    pub fn expire(&mut self, now: Instant) -> Option<DecodeError> {
        let last = self.last_push?;
        if self.buffer.is_empty() || now.duration_since(last) < self.partial_timeout {
            return None;
        }
        let expected = match self.buffer.get(1) {
            Some(&len) => len as usize + FRAME_OVERHEAD,
            None => FRAME_OVERHEAD,
        };
        let received = self.buffer.len();
        match self.next_valid_offset() {
            Some(skip) => {
                self.buffer.drain(..skip);
            }
            None => {
                self.buffer.clear();
                self.last_push = None;
            }
        }
        Some(DecodeError::Truncated { expected, received })
    }

    /// First offset past the start where a complete, balanced frame sits.
    fn next_valid_offset(&self) -> Option<usize> {
        (1..self.buffer.len()).find(|&i| {
            let rest = &self.buffer[i..];
            match rest.get(1) {
                Some(&len) => {
                    let expected = len as usize + FRAME_OVERHEAD;
                    rest.len() >= expected && Frame::parse(&rest[..expected]).is_ok()
                }
                None => false,
            }
        })
    }

    /// First offset past the start whose frame could still complete.
    fn next_partial_offset(&self) -> Option<usize> {
        (1..self.buffer.len()).find(|&i| {
            let rest = &self.buffer[i..];
            match rest.get(1) {
                Some(&len) => rest.len() < len as usize + FRAME_OVERHEAD,
                None => true,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{Command, MotorSpeed};

    const ACK: [u8; 5] = [0x01, 0x00, 0x02, 0x00, 0xFD];

    fn assembler() -> FrameAssembler {
        FrameAssembler::new(Duration::from_millis(100))
    }

    #[test]
    fn parses_a_single_frame() {
        let frame = Frame::parse(Command::TestSolenoid.bytes()).unwrap();
        assert_eq!(frame.destination, 0x02);
        assert_eq!(frame.source, 0x01);
        assert_eq!(frame.header, 0xF0);
        assert_eq!(frame.data, vec![0x01]);
    }

    #[test]
    fn rejects_bad_checksum() {
        let err = Frame::parse(&[0x01, 0x00, 0x02, 0x00, 0xFE]).unwrap_err();
        assert_eq!(err, DecodeError::ChecksumMismatch { sum: 0x01 });
    }

    #[test]
    fn reassembles_split_frames() {
        let mut asm = assembler();
        let now = Instant::now();
        asm.push(&ACK[..2], now);
        assert!(asm.next_frame().is_none());
        asm.push(&ACK[2..], now);
        let frame = asm.next_frame().unwrap().unwrap();
        assert_eq!(frame.raw, ACK);
        assert_eq!(asm.pending(), 0);
    }

    #[test]
    fn splits_coalesced_frames() {
        let mut asm = assembler();
        let mut bytes = Command::Poll.bytes().to_vec();
        bytes.extend_from_slice(&ACK);
        asm.push(&bytes, Instant::now());
        let echo = asm.next_frame().unwrap().unwrap();
        assert_eq!(echo.header, 0xFE);
        let ack = asm.next_frame().unwrap().unwrap();
        assert_eq!(ack.destination, 0x01);
        assert!(asm.next_frame().is_none());
    }

    #[test]
    fn resynchronises_after_garbage() {
        let mut asm = assembler();
        let mut bytes = vec![0x55];
        bytes.extend_from_slice(&ACK);
        asm.push(&bytes, Instant::now());

        let mut frames = Vec::new();
        let mut errors = 0;
        while let Some(result) = asm.next_frame() {
            match result {
                Ok(frame) => frames.push(frame),
                Err(_) => errors += 1,
            }
        }
        assert!(errors >= 1);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].raw, ACK);
    }

    #[test]
    fn expires_stale_partial() {
        let mut asm = assembler();
        let start = Instant::now();
        asm.push(&ACK[..3], start);
        assert!(asm.expire(start + Duration::from_millis(10)).is_none());
        let err = asm.expire(start + Duration::from_millis(150)).unwrap();
        assert_eq!(err, DecodeError::Truncated { expected: 5, received: 3 });
        assert_eq!(asm.pending(), 0);
    }

    #[test]
    fn unbalanced_frame_then_valid_frame_in_one_push() {
        let mut asm = assembler();
        let mut bytes = Command::SetSpeed(MotorSpeed::FourPerSecond).bytes().to_vec();
        bytes.extend_from_slice(&ACK);
        asm.push(&bytes, Instant::now());

        assert!(matches!(asm.next_frame(), Some(Err(DecodeError::ChecksumMismatch { .. }))));
        assert_eq!(asm.next_frame().unwrap().unwrap().raw, ACK);
        assert!(asm.next_frame().is_none());
        assert_eq!(asm.pending(), 0);
    }

    #[test]
    fn expected_echo_skips_checksum() {
        let mut asm = assembler();
        let speed = Command::SetSpeed(MotorSpeed::FourPerSecond).bytes();
        asm.expect_echo(speed);
        let mut bytes = speed.to_vec();
        bytes.extend_from_slice(&ACK);
        asm.push(&bytes[..3], Instant::now());
        assert!(asm.next_frame().is_none());
        asm.push(&bytes[3..], Instant::now());

        let echo = asm.next_frame().unwrap().unwrap();
        assert_eq!(echo.raw, speed);
        assert_eq!(echo.header, 0xEF);
        assert_eq!(echo.data, vec![0x0A, 0x85]);
        assert_eq!(asm.next_frame().unwrap().unwrap().raw, ACK);
    }

    #[test]
    fn expiry_keeps_frames_behind_noise() {
        let mut asm = assembler();
        let start = Instant::now();
        let mut bytes = vec![0x00, 0xF0];
        bytes.extend_from_slice(&ACK);
        asm.push(&bytes, start);
        assert!(asm.next_frame().is_none());

        let err = asm.expire(start + Duration::from_millis(150)).unwrap();
        assert_eq!(err, DecodeError::Truncated { expected: 245, received: 7 });
        assert_eq!(asm.next_frame().unwrap().unwrap().raw, ACK);
        assert_eq!(asm.pending(), 0);
    }

    #[test]
    fn expiry_without_valid_frame_clears_everything() {
        let mut asm = assembler();
        let start = Instant::now();
        asm.push(&[0x00, 0xF0, 0x13, 0x37], start);
        assert!(asm.expire(start + Duration::from_millis(150)).is_some());
        assert_eq!(asm.pending(), 0);
    }
}
