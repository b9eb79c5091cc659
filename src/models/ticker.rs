//! Ticker channel models.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Raw ticker payload as pushed on the `ticker` channel.
///
/// Every field is a short positional array; the first element refers to
/// today and the second to the last 24 hours unless noted otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TickerPayload {
    /// Best ask: price, whole lot volume, lot volume.
    pub a: (Decimal, i64, Decimal),
    /// Best bid: price, whole lot volume, lot volume.
    pub b: (Decimal, i64, Decimal),
    /// Last trade closed: price, lot volume.
    pub c: (Decimal, Decimal),
    pub v: (Decimal, Decimal),
    /// Volume weighted average price.
    pub p: (Decimal, Decimal),
    /// Number of trades.
    pub t: (u64, u64),
    pub l: (Decimal, Decimal),
    pub h: (Decimal, Decimal),
    /// Open price: today, last 24 hours.
    pub o: (Decimal, Decimal),
}

/// Ticker in the crate's public schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ticker {
    pub symbol: String,
    /// Local receive time in milliseconds since the epoch.
    pub timestamp: i64,
    pub high: Decimal,
    pub low: Decimal,
    pub bid: Decimal,
    pub bid_volume: Decimal,
    pub ask: Decimal,
    pub ask_volume: Decimal,
    pub vwap: Decimal,
    pub open: Decimal,
    pub close: Decimal,
    pub last: Decimal,
    pub base_volume: Decimal,
    /// Base volume times VWAP; `None` if the product is out of range.
    pub quote_volume: Option<Decimal>,
    pub trades: u64,
}

impl Ticker {
    /// Translates a raw payload for `symbol`, stamped with `timestamp`.
    pub fn from_payload(symbol: &str, payload: &TickerPayload, timestamp: i64) -> Ticker {
        let vwap = payload.p.0;
        let base_volume = payload.v.0;
        let last = payload.c.0;
        Ticker {
            symbol: symbol.to_string(),
            timestamp,
            high: payload.h.0,
            low: payload.l.0,
            bid: payload.b.0,
            bid_volume: payload.b.2,
            ask: payload.a.0,
            ask_volume: payload.a.2,
            vwap,
            open: payload.o.0,
            close: last,
            last,
            base_volume,
            quote_volume: base_volume.checked_mul(vwap),
            trades: payload.t.0,
        }
    }
}
