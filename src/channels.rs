//! Coin channel identification cache.

use crate::constants::{CHANNEL_COUNT, CHANNEL_TABLE_LEN, COIN_ID_WIDTH};
use crate::error::DecodeError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coin identity as reported by the Pelicano, e.g. `CN010B`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CoinIdentity {
    /// Two letter country code
    pub country: String,
    /// Three character denomination code
    pub denomination: String,
    /// Issue revision letter
    pub issue: char,
}

impl CoinIdentity {
    /// Parse one six byte coin id field. Unprogrammed slots yield `Ok(None)`.
    pub fn parse(field: &[u8]) -> Result<Option<Self>, DecodeError> {
        if field.len() != COIN_ID_WIDTH {
            return Err(DecodeError::Malformed(format!(
                "coin id field is {} bytes, expected {}",
                field.len(),
                COIN_ID_WIDTH
            )));
        }
        if field.iter().all(|&b| b == b'.' || b == b' ' || b == 0) {
            return Ok(None);
        }
        if !field.iter().all(|b| b.is_ascii_graphic()) {
            return Err(DecodeError::Malformed(format!(
                "coin id field {:02X?} is not printable ASCII",
                field
            )));
        }
        // ASCII checked above, so byte offsets are char boundaries.
        let text = String::from_utf8_lossy(field);
        Ok(Some(CoinIdentity {
            country: text[0..2].to_string(),
            denomination: text[2..5].to_string(),
            issue: field[5] as char,
        }))
    }
}

impl fmt::Display for CoinIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.country, self.denomination, self.issue)
    }
}

/// One slot of the channel table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelEntry {
    /// Channel index, 0 to 15
    pub index: u8,
    /// Coin assigned to the channel, if programmed
    pub identity: Option<CoinIdentity>,
}

/// The 16 slot coin channel table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMap {
    slots: [Option<CoinIdentity>; CHANNEL_COUNT],
    populated: bool,
}

impl ChannelMap {
    /// Empty map, as before the first channel id reply.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a full map from the data block of a channel id table reply.
    ///
    /// Any bad field rejects the whole table.
    pub fn from_table(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() != CHANNEL_TABLE_LEN {
            return Err(DecodeError::Malformed(format!(
                "channel table is {} bytes, expected {}",
                data.len(),
                CHANNEL_TABLE_LEN
            )));
        }
        let mut slots: [Option<CoinIdentity>; CHANNEL_COUNT] = Default::default();
        for (slot, field) in slots.iter_mut().zip(data.chunks_exact(COIN_ID_WIDTH)) {
            *slot = CoinIdentity::parse(field)?;
        }
        Ok(Self {
            slots,
            populated: true,
        })
    }

    /// Store the identity reported for a single channel.
    pub fn set(&mut self, index: u8, identity: Option<CoinIdentity>) -> Result<(), DecodeError> {
        let slot = self.slots.get_mut(index as usize).ok_or_else(|| {
            DecodeError::Malformed(format!("channel {} outside 0-{}", index, CHANNEL_COUNT - 1))
        })?;
        *slot = identity;
        self.populated = true;
        Ok(())
    }

    /// Whether any channel id reply has been received this session
    pub fn is_populated(&self) -> bool {
        self.populated
    }

    /// Identity stored for `index`, if any
    pub fn get(&self, index: u8) -> Option<&CoinIdentity> {
        self.slots.get(index as usize).and_then(Option::as_ref)
    }

    /// All 16 entries, indexed 0 to 15
    pub fn entries(&self) -> Vec<ChannelEntry> {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, identity)| ChannelEntry {
                index: i as u8,
                identity: identity.clone(),
            })
            .collect()
    }

    /// Replace the whole table.
    pub fn replace(&mut self, other: ChannelMap) {
        *self = other;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(ids: &[&str; CHANNEL_COUNT]) -> Vec<u8> {
        ids.iter().flat_map(|id| id.bytes()).collect()
    }

    fn sample_ids() -> [&'static str; CHANNEL_COUNT] {
        [
            "CN010B", "CN050A", "CN100C", "......", "EU020A", "EU050A", "EU100A", "EU200A",
            "......", "......", "......", "......", "......", "......", "......", "GB100B",
        ]
    }

    #[test]
    fn parses_coin_identity() {
        let id = CoinIdentity::parse(b"CN010B").unwrap().unwrap();
        assert_eq!(id.country, "CN");
        assert_eq!(id.denomination, "010");
        assert_eq!(id.issue, 'B');
        assert_eq!(id.to_string(), "CN010B");
        assert_eq!(CoinIdentity::parse(b"......").unwrap(), None);
        assert_eq!(CoinIdentity::parse(&[0; 6]).unwrap(), None);
        assert!(CoinIdentity::parse(b"CN01").is_err());
        assert!(CoinIdentity::parse(&[b'C', b'N', 0xFF, b'1', b'0', b'B']).is_err());
    }

    #[test]
    fn table_fills_sixteen_entries() {
        let map = ChannelMap::from_table(&table(&sample_ids())).unwrap();
        assert!(map.is_populated());
        let entries = map.entries();
        assert_eq!(entries.len(), 16);
        for (i, entry) in entries.iter().enumerate() {
            assert_eq!(entry.index as usize, i);
        }
        assert_eq!(map.get(0).unwrap().to_string(), "CN010B");
        assert_eq!(map.get(3), None);
        assert_eq!(map.get(15).unwrap().country, "GB");
        assert_eq!(map.get(16), None);
    }

    #[test]
    fn replace_is_wholesale() {
        let mut map = ChannelMap::from_table(&table(&sample_ids())).unwrap();
        let mut ids = ["......"; CHANNEL_COUNT];
        ids[3] = "US025A";
        map.replace(ChannelMap::from_table(&table(&ids)).unwrap());
        assert_eq!(map.get(0), None);
        assert_eq!(map.get(3).unwrap().to_string(), "US025A");
    }

    #[test]
    fn set_updates_one_slot() {
        let mut map = ChannelMap::new();
        let id = CoinIdentity::parse(b"CN010B").unwrap();
        map.set(0, id).unwrap();
        assert!(map.is_populated());
        assert_eq!(map.get(0).unwrap().to_string(), "CN010B");
        assert_eq!(map.get(1), None);
        assert!(map.set(16, None).is_err());
        assert_eq!(map.entries().iter().filter(|e| e.identity.is_some()).count(), 1);
    }

    #[test]
    fn rejects_wrong_length_table() {
        assert!(ChannelMap::from_table(&[b'.'; 90]).is_err());
        assert!(!ChannelMap::new().is_populated());
    }
}
