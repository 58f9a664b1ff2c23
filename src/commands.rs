//! Fixed command catalog for the Pelicano.
//!
//! Every command is a ready-to-send frame. Templates are stored as bytes so
//! callers never round-trip through hex text to issue a named command.

use crate::constants::*;
use serde::{Deserialize, Serialize};

/// Coin recognition speed accepted by the operate-motors command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MotorSpeed {
    /// 3 coins per second (parameter 0x64)
    ThreePerSecond,
    /// 4 coins per second (parameter 0x85)
    FourPerSecond,
}

/// Named protocol commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    /// Ask whether the Pelicano is online
    Poll,
    /// Soft reset
    Reset,
    /// Run the built-in self check; the reply carries a fault code
    SelfCheck,
    /// Pulse each solenoid in turn, 200 ms apiece
    TestSolenoid,
    /// Change coin recognition speed
    SetSpeed(MotorSpeed),
    /// Open the foreign object / coin clearing gate
    OpenTrashDoor,
    /// Ask which coin occupies each channel
    RequestChannelIds,
    /// Fetch the buffered credit and error event log
    ReadBufferedCredit,
}

const POLL: &[u8] = &[0x02, 0x00, 0x01, 0xFE, 0xFF];
const RESET: &[u8] = &[0x02, 0x00, 0x01, 0x01, 0xFC];
const SELF_CHECK: &[u8] = &[0x02, 0x00, 0x01, 0xE8, 0x15];
const TEST_SOLENOID: &[u8] = &[0x02, 0x01, 0x01, 0xF0, 0x01, 0x0B];
const SET_SPEED_3: &[u8] = &[0x02, 0x02, 0x01, 0xEF, 0x0A, 0x64, 0x9E];
// Carried exactly as the device documentation lists it; its checksum byte
// does not balance the frame.
const SET_SPEED_4: &[u8] = &[0x02, 0x02, 0x01, 0xEF, 0x0A, 0x85, 0x70];
const OPEN_TRASH_DOOR: &[u8] = &[0x02, 0x01, 0x01, 0xEF, 0x01, 0x0C];
const REQUEST_CHANNEL_IDS: &[u8] = &[0x02, 0x01, 0x01, 0xB8, 0x01, 0x43];
const READ_BUFFERED_CREDIT: &[u8] = &[0x02, 0x00, 0x01, 0xE5, 0x18];

/// The full catalog, in declaration order.
pub const CATALOG: [Command; 9] = [
    Command::Poll,
    Command::Reset,
    Command::SelfCheck,
    Command::TestSolenoid,
    Command::SetSpeed(MotorSpeed::ThreePerSecond),
    Command::SetSpeed(MotorSpeed::FourPerSecond),
    Command::OpenTrashDoor,
    Command::RequestChannelIds,
    Command::ReadBufferedCredit,
];

impl Command {
    /// Ready-to-send frame bytes
    pub fn bytes(self) -> &'static [u8] {
        match self {
            Command::Poll => POLL,
            Command::Reset => RESET,
            Command::SelfCheck => SELF_CHECK,
            Command::TestSolenoid => TEST_SOLENOID,
            Command::SetSpeed(MotorSpeed::ThreePerSecond) => SET_SPEED_3,
            Command::SetSpeed(MotorSpeed::FourPerSecond) => SET_SPEED_4,
            Command::OpenTrashDoor => OPEN_TRASH_DOOR,
            Command::RequestChannelIds => REQUEST_CHANNEL_IDS,
            Command::ReadBufferedCredit => READ_BUFFERED_CREDIT,
        }
    }

    /// Header byte, used to pair the reply with this command
    pub fn header(self) -> u8 {
        self.bytes()[3]
    }

    /// First data byte, e.g. the channel a coin id request asks about
    pub fn argument(self) -> Option<u8> {
        let bytes = self.bytes();
        (bytes.len() > FRAME_OVERHEAD).then(|| bytes[4])
    }

    /// Symbolic name used in logs
    pub fn name(self) -> &'static str {
        match self {
            Command::Poll => "POLL",
            Command::Reset => "RESET",
            Command::SelfCheck => "SELF_CHECK",
            Command::TestSolenoid => "TEST_SOLENOID",
            Command::SetSpeed(MotorSpeed::ThreePerSecond) => "SET_SPEED_3",
            Command::SetSpeed(MotorSpeed::FourPerSecond) => "SET_SPEED_4",
            Command::OpenTrashDoor => "OPEN_TRASH_DOOR",
            Command::RequestChannelIds => "REQUEST_CHANNEL_IDS",
            Command::ReadBufferedCredit => "READ_BUFFERED_CREDIT",
        }
    }

    /// Look a command up by its symbolic name
    pub fn from_name(name: &str) -> Option<Self> {
        CATALOG.iter().copied().find(|c| c.name().eq_ignore_ascii_case(name))
    }
}

/// Two's complement of the byte sum, so a whole frame sums to zero.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes
        .iter()
        .fold(0u8, |acc, &b| acc.wrapping_add(b))
        .wrapping_neg()
}

/// Build a checksummed frame. Data beyond 255 bytes is truncated.
pub fn build_frame(destination: u8, source: u8, header: u8, data: &[u8]) -> Vec<u8> {
    let data = &data[..data.len().min(u8::MAX as usize)];
    let mut frame = Vec::with_capacity(data.len() + FRAME_OVERHEAD);
    frame.push(destination);
    frame.push(data.len() as u8);
    frame.push(source);
    frame.push(header);
    frame.extend_from_slice(data);
    frame.push(checksum(&frame));
    frame
}

/// Build a host-to-Pelicano frame.
pub fn build_request(header: u8, data: &[u8]) -> Vec<u8> {
    build_frame(DEVICE_ADDRESS, HOST_ADDRESS, header, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;

    #[test]
    fn catalog_matches_documented_hex() {
        let expected = [
            (Command::Poll, "020001FEFF"),
            (Command::Reset, "02000101FC"),
            (Command::SelfCheck, "020001E815"),
            (Command::TestSolenoid, "020101F0010B"),
            (Command::SetSpeed(MotorSpeed::ThreePerSecond), "020201EF0A649E"),
            (Command::SetSpeed(MotorSpeed::FourPerSecond), "020201EF0A8570"),
            (Command::OpenTrashDoor, "020101EF010C"),
            (Command::RequestChannelIds, "020101B80143"),
            (Command::ReadBufferedCredit, "020001E518"),
        ];
        for (command, hex) in expected {
            assert_eq!(codec::encode(command.bytes()), hex, "{}", command.name());
        }
    }

    #[test]
    fn builder_reproduces_balanced_templates() {
        assert_eq!(build_request(HEADER_SIMPLE_POLL, &[]), Command::Poll.bytes());
        assert_eq!(build_request(HEADER_RESET, &[]), Command::Reset.bytes());
        assert_eq!(build_request(HEADER_SELF_CHECK, &[]), Command::SelfCheck.bytes());
        assert_eq!(build_request(HEADER_TEST_SOLENOIDS, &[0x01]), Command::TestSolenoid.bytes());
        assert_eq!(
            build_request(HEADER_OPERATE_MOTORS, &[0x0A, 0x64]),
            Command::SetSpeed(MotorSpeed::ThreePerSecond).bytes()
        );
        assert_eq!(build_request(HEADER_OPERATE_MOTORS, &[0x01]), Command::OpenTrashDoor.bytes());
        assert_eq!(build_request(HEADER_REQUEST_COIN_ID, &[0x01]), Command::RequestChannelIds.bytes());
        assert_eq!(
            build_request(HEADER_READ_BUFFERED_CREDIT, &[]),
            Command::ReadBufferedCredit.bytes()
        );
    }

    #[test]
    fn headers_and_names() {
        assert_eq!(Command::Poll.header(), HEADER_SIMPLE_POLL);
        assert_eq!(Command::RequestChannelIds.header(), HEADER_REQUEST_COIN_ID);
        assert_eq!(Command::RequestChannelIds.argument(), Some(0x01));
        assert_eq!(Command::Poll.argument(), None);
        assert_eq!(Command::from_name("request_channel_ids"), Some(Command::RequestChannelIds));
        assert_eq!(
            Command::from_name("SET_SPEED_4"),
            Some(Command::SetSpeed(MotorSpeed::FourPerSecond))
        );
        assert_eq!(Command::from_name("FLY"), None);
    }
}
