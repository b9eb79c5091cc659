//! Shared models for Kraken WebSocket v1 messages.
//!
//! Contains channel definitions, subscription request types, and the
//! event frames (subscription status, heartbeat, system status, pong).
//! Per-channel payloads live in the submodules.

pub mod book;
pub mod candle;
pub mod ticker;
pub mod trade;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Public data channels the streaming core knows how to merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Book,
    Ticker,
    Trade,
    /// OHLC candlestick data (wire name: `"ohlc"`).
    Ohlc,
}

impl Channel {
    /// Returns the wire-format subscription name expected by the Kraken API.
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Book => "book",
            Channel::Ticker => "ticker",
            Channel::Trade => "trade",
            Channel::Ohlc => "ohlc",
        }
    }

    /// Parses a channel name as sent by the server.
    ///
    /// Kraken suffixes parameterised channels (`book-10`, `ohlc-5`), so only
    /// the part before the first `-` is considered.
    pub fn from_wire(name: &str) -> Option<Channel> {
        let base = name.split('-').next().unwrap_or(name);
        match base {
            "book" => Some(Channel::Book),
            "ticker" => Some(Channel::Ticker),
            "trade" => Some(Channel::Trade),
            "ohlc" => Some(Channel::Ohlc),
            _ => None,
        }
    }
}

/// Builds the key that routes stream pushes to awaiting callers.
pub fn message_hash(ws_name: &str, channel: Channel) -> String {
    format!("{ws_name}:{}", channel.as_str())
}

/// Converts fractional epoch seconds to whole milliseconds, rounding down.
pub fn seconds_to_millis(seconds: Decimal) -> Option<i64> {
    seconds
        .checked_mul(Decimal::ONE_THOUSAND)?
        .floor()
        .to_i64()
}

/// Requested parameters of a subscription.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionParams {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u32>,
}

impl SubscriptionParams {
    /// Parameters for a channel without depth or interval.
    #[must_use]
    pub fn new(channel: Channel) -> Self {
        Self {
            name: channel.as_str().to_string(),
            depth: None,
            interval: None,
        }
    }

    /// Sets the book depth.
    #[must_use]
    pub fn with_depth(mut self, depth: u16) -> Self {
        self.depth = Some(depth);
        self
    }

    /// Sets the OHLC interval in minutes.
    #[must_use]
    pub fn with_interval(mut self, interval: u32) -> Self {
        self.interval = Some(interval);
        self
    }
}

/// A `subscribe` request sent to the Kraken WebSocket API.
#[derive(Debug, Clone, Serialize)]
pub struct SubscribeRequest {
    pub event: String,
    pub reqid: u64,
    pub pair: Vec<String>,
    pub subscription: SubscriptionParams,
}

impl SubscribeRequest {
    /// Creates a subscribe request for a single pair.
    #[must_use]
    pub fn new(reqid: u64, ws_name: &str, subscription: SubscriptionParams) -> Self {
        Self {
            event: "subscribe".to_string(),
            reqid,
            pair: vec![ws_name.to_string()],
            subscription,
        }
    }
}

/// An `unsubscribe` request sent to the Kraken WebSocket API.
#[derive(Debug, Clone, Serialize)]
pub struct UnsubscribeRequest {
    pub event: String,
    pub reqid: u64,
    pub pair: Vec<String>,
    pub subscription: SubscriptionParams,
}

impl UnsubscribeRequest {
    /// Creates an unsubscribe request for a single pair.
    #[must_use]
    pub fn new(reqid: u64, ws_name: &str, subscription: SubscriptionParams) -> Self {
        Self {
            event: "unsubscribe".to_string(),
            reqid,
            pair: vec![ws_name.to_string()],
            subscription,
        }
    }
}

/// A `ping` request used to test connection liveness.
#[derive(Debug, Clone, Serialize)]
pub struct PingRequest {
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reqid: Option<u64>,
}

impl PingRequest {
    /// Creates a ping request with an optional request id echoed in the pong.
    #[must_use]
    pub fn new(reqid: Option<u64>) -> Self {
        Self {
            event: "ping".to_string(),
            reqid,
        }
    }
}

/// Periodic heartbeat sent when no other updates are flowing.
#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatEvent {
    pub event: String,
}

/// System status broadcast on connect and on status changes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SystemStatusEvent {
    pub event: String,
    #[serde(rename = "connectionID", default)]
    pub connection_id: Option<u64>,
    /// `online`, `maintenance`, `cancel_only`, `limit_only` or `post_only`.
    pub status: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// Acknowledgment (or rejection) of a subscribe/unsubscribe request.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionStatusEvent {
    pub event: String,
    #[serde(rename = "channelID", default)]
    pub channel_id: Option<u64>,
    #[serde(rename = "channelName", default)]
    pub channel_name: Option<String>,
    #[serde(default)]
    pub reqid: Option<u64>,
    #[serde(default)]
    pub pair: Option<String>,
    /// `subscribed`, `unsubscribed` or `error`.
    pub status: String,
    #[serde(default)]
    pub subscription: Option<SubscriptionParams>,
    #[serde(rename = "errorMessage", default)]
    pub error_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_from_wire_strips_parameter_suffix() {
        assert_eq!(Channel::from_wire("book-25"), Some(Channel::Book));
        assert_eq!(Channel::from_wire("ohlc-5"), Some(Channel::Ohlc));
        assert_eq!(Channel::from_wire("ticker"), Some(Channel::Ticker));
        assert_eq!(Channel::from_wire("trade"), Some(Channel::Trade));
        assert_eq!(Channel::from_wire("spread"), None);
        assert_eq!(Channel::from_wire("ownTrades"), None);
    }

    #[test]
    fn message_hash_joins_pair_and_channel() {
        assert_eq!(message_hash("XBT/USD", Channel::Book), "XBT/USD:book");
        assert_eq!(message_hash("ETH/XBT", Channel::Ohlc), "ETH/XBT:ohlc");
    }

    #[test]
    fn seconds_to_millis_floors_fraction() {
        use rust_decimal_macros::dec;

        assert_eq!(seconds_to_millis(dec!(1534614248.123678)), Some(1_534_614_248_123));
        assert_eq!(seconds_to_millis(dec!(2)), Some(2000));
    }

    #[test]
    fn serialize_book_subscribe_request() {
        let params = SubscriptionParams::new(Channel::Book).with_depth(25);
        let request = SubscribeRequest::new(42, "XBT/USD", params);

        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["event"], "subscribe");
        assert_eq!(value["reqid"], 42);
        assert_eq!(value["pair"][0], "XBT/USD");
        assert_eq!(value["subscription"]["name"], "book");
        assert_eq!(value["subscription"]["depth"], 25);
        assert!(value["subscription"].get("interval").is_none());
    }

    #[test]
    fn serialize_ping_without_reqid() {
        let value = serde_json::to_value(PingRequest::new(None)).unwrap();
        assert_eq!(value["event"], "ping");
        assert!(value.get("reqid").is_none());
    }

    #[test]
    fn deserialize_subscription_error() {
        let json = r#"{
            "errorMessage": "Currency pair not in ISO 4217-A3 format foobar",
            "event": "subscriptionStatus",
            "pair": "foobar",
            "reqid": 1574146735269,
            "status": "error",
            "subscription": { "name": "ticker" }
        }"#;

        let event: SubscriptionStatusEvent = serde_json::from_str(json).unwrap();

        assert_eq!(event.status, "error");
        assert_eq!(event.reqid, Some(1574146735269));
        assert!(event.channel_id.is_none());
        assert_eq!(
            event.error_message.as_deref(),
            Some("Currency pair not in ISO 4217-A3 format foobar")
        );
    }
}
