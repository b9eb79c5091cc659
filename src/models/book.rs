//! Order book channel models.

use std::fmt;

use rust_decimal::Decimal;
use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer};

/// Book depths accepted by the Kraken `book` subscription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BookDepth {
    #[default]
    D10,
    D25,
    D100,
    D500,
    D1000,
}

impl BookDepth {
    /// Returns the depth as sent in the subscription.
    pub fn as_u16(self) -> u16 {
        match self {
            BookDepth::D10 => 10,
            BookDepth::D25 => 25,
            BookDepth::D100 => 100,
            BookDepth::D500 => 500,
            BookDepth::D1000 => 1000,
        }
    }

    /// Maps a numeric depth to a supported variant.
    pub fn from_u16(depth: u16) -> Option<BookDepth> {
        match depth {
            10 => Some(BookDepth::D10),
            25 => Some(BookDepth::D25),
            100 => Some(BookDepth::D100),
            500 => Some(BookDepth::D500),
            1000 => Some(BookDepth::D1000),
            _ => None,
        }
    }

    /// Smallest supported depth that holds at least `limit` levels.
    pub fn covering(limit: usize) -> BookDepth {
        [
            BookDepth::D10,
            BookDepth::D25,
            BookDepth::D100,
            BookDepth::D500,
        ]
        .into_iter()
        .find(|d| usize::from(d.as_u16()) >= limit)
        .unwrap_or(BookDepth::D1000)
    }
}

/// A single `[price, volume, timestamp(, "r")]` entry of a book frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookLevel {
    pub price: Decimal,
    pub volume: Decimal,
    /// Seconds since the epoch, with microsecond fraction.
    pub timestamp: Decimal,
    /// Set when the level is a republish caused by an order book refresh.
    pub republish: bool,
}

impl<'de> Deserialize<'de> for BookLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LevelVisitor;

        impl<'de> Visitor<'de> for LevelVisitor {
            type Value = BookLevel;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an array of [price, volume, timestamp] with optional update type")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<BookLevel, A::Error> {
                let price: Decimal = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let volume: Decimal = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                let timestamp: Decimal = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(2, &self))?;
                let update_type: Option<String> = seq.next_element()?;
                if seq.next_element::<de::IgnoredAny>()?.is_some() {
                    return Err(de::Error::invalid_length(5, &self));
                }

                Ok(BookLevel {
                    price,
                    volume,
                    timestamp,
                    republish: update_type.as_deref() == Some("r"),
                })
            }
        }

        deserializer.deserialize_seq(LevelVisitor)
    }
}

/// First frame on a book channel: the full book up to the subscribed depth.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BookSnapshot {
    #[serde(rename = "as", default)]
    pub asks: Vec<BookLevel>,
    #[serde(rename = "bs", default)]
    pub bids: Vec<BookLevel>,
}

/// One of the (up to two) update objects in an incremental book frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BookUpdatePart {
    #[serde(rename = "a", default)]
    pub asks: Option<Vec<BookLevel>>,
    #[serde(rename = "b", default)]
    pub bids: Option<Vec<BookLevel>>,
    /// CRC32 of the top ten levels after this update, as a decimal string.
    #[serde(rename = "c", default)]
    pub checksum: Option<String>,
}

/// Incremental book update with ask and bid changes merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookUpdate {
    pub asks: Vec<BookLevel>,
    pub bids: Vec<BookLevel>,
    pub checksum: Option<u32>,
}

impl BookUpdate {
    /// Merges the update objects of one frame.
    ///
    /// Returns `None` if a checksum is present but not a valid `u32`.
    pub fn from_parts(parts: Vec<BookUpdatePart>) -> Option<BookUpdate> {
        let mut update = BookUpdate::default();
        for part in parts {
            if let Some(asks) = part.asks {
                update.asks.extend(asks);
            }
            if let Some(bids) = part.bids {
                update.bids.extend(bids);
            }
            if let Some(checksum) = part.checksum {
                update.checksum = Some(checksum.parse().ok()?);
            }
        }
        Some(update)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn book_depth_round_trips_supported_values() {
        for depth in [10u16, 25, 100, 500, 1000] {
            assert_eq!(BookDepth::from_u16(depth).map(BookDepth::as_u16), Some(depth));
        }
        assert_eq!(BookDepth::from_u16(50), None);
    }

    #[test]
    fn covering_picks_smallest_sufficient_depth() {
        assert_eq!(BookDepth::covering(5), BookDepth::D10);
        assert_eq!(BookDepth::covering(10), BookDepth::D10);
        assert_eq!(BookDepth::covering(11), BookDepth::D25);
        assert_eq!(BookDepth::covering(5000), BookDepth::D1000);
    }

    #[test]
    fn deserialize_level_with_republish_flag() {
        let level: BookLevel =
            serde_json::from_str(r#"["5541.30000", "2.50700000", "1534614248.123678", "r"]"#)
                .unwrap();

        assert_eq!(level.price, dec!(5541.30000));
        assert_eq!(level.volume, dec!(2.50700000));
        assert_eq!(level.timestamp, dec!(1534614248.123678));
        assert!(level.republish);
    }

    #[test]
    fn deserialize_level_rejects_short_array() {
        let result: Result<BookLevel, _> = serde_json::from_str(r#"["5541.3", "2.5"]"#);
        assert!(result.is_err());
    }

    #[test]
    fn merge_update_parts_keeps_checksum() {
        let a: BookUpdatePart =
            serde_json::from_str(r#"{"a": [["5541.30000", "2.50700000", "1534614248.456738"]]}"#)
                .unwrap();
        let b: BookUpdatePart = serde_json::from_str(
            r#"{"b": [["5541.20000", "0.00000000", "1534614335.345903"]], "c": "974942666"}"#,
        )
        .unwrap();

        let update = BookUpdate::from_parts(vec![a, b]).unwrap();

        assert_eq!(update.asks.len(), 1);
        assert_eq!(update.bids.len(), 1);
        assert_eq!(update.bids[0].volume, Decimal::ZERO);
        assert_eq!(update.checksum, Some(974942666));
    }
}
