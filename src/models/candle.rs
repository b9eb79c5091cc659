//! OHLC candlestick channel models.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::seconds_to_millis;

/// Raw `ohlc` payload:
/// `[time, etime, open, high, low, close, vwap, volume, count]`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OhlcPayload(
    pub Decimal,
    /// End time of the interval.
    pub Decimal,
    pub Decimal,
    pub Decimal,
    pub Decimal,
    pub Decimal,
    /// Volume weighted average price.
    pub Decimal,
    pub Decimal,
    pub u64,
);

/// Candle in the crate's public `[timestamp, open, high, low, close, volume]` schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ohlcv {
    pub symbol: String,
    /// Milliseconds since the epoch of the last update within the interval.
    pub timestamp: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Ohlcv {
    /// Translates a raw payload; `None` if the time does not fit in milliseconds.
    pub fn from_payload(symbol: &str, payload: &OhlcPayload) -> Option<Ohlcv> {
        Some(Ohlcv {
            symbol: symbol.to_string(),
            timestamp: seconds_to_millis(payload.0)?,
            open: payload.2,
            high: payload.3,
            low: payload.4,
            close: payload.5,
            volume: payload.7,
        })
    }
}

/// Maps a timeframe such as `1m` or `4h` to Kraken's interval in minutes.
pub fn timeframe_minutes(timeframe: &str) -> Option<u32> {
    match timeframe {
        "1m" => Some(1),
        "5m" => Some(5),
        "15m" => Some(15),
        "30m" => Some(30),
        "1h" => Some(60),
        "4h" => Some(240),
        "1d" => Some(1440),
        "1w" => Some(10080),
        "2w" => Some(21600),
        _ => None,
    }
}
