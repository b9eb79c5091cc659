//! Trade channel models.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::seconds_to_millis;

/// One `[price, volume, time, side, orderType, misc]` entry of a trade frame.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TradeEntry(
    pub Decimal,
    pub Decimal,
    pub Decimal,
    pub String,
    pub String,
    pub String,
);

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// Order type that triggered the trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeOrderType {
    Limit,
    Market,
}

/// Trade in the crate's public schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Trade {
    pub symbol: String,
    /// Milliseconds since the epoch.
    pub timestamp: i64,
    pub side: TradeSide,
    pub order_type: Option<TradeOrderType>,
    pub price: Decimal,
    pub amount: Decimal,
    pub cost: Decimal,
}

impl Trade {
    /// Translates a raw entry.
    ///
    /// Returns `None` for an unknown side code, or when the time or cost is
    /// out of range.
    pub fn from_entry(symbol: &str, entry: &TradeEntry) -> Option<Trade> {
        let side = match entry.3.as_str() {
            "b" => TradeSide::Buy,
            "s" => TradeSide::Sell,
            _ => return None,
        };
        let order_type = match entry.4.as_str() {
            "l" => Some(TradeOrderType::Limit),
            "m" => Some(TradeOrderType::Market),
            _ => None,
        };

        Some(Trade {
            symbol: symbol.to_string(),
            timestamp: seconds_to_millis(entry.2)?,
            side,
            order_type,
            price: entry.0,
            amount: entry.1,
            cost: entry.0.checked_mul(entry.1)?,
        })
    }
}
