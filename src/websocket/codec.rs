//! Classification and decoding of inbound frames.
//!
//! Kraken v1 sends two shapes of frame: positional arrays carrying channel
//! data (`[channelID, payload..., channelName, pair]`) and JSON objects
//! carrying events (`{"event": ...}`). [`decode`] classifies a frame
//! without interpreting channel payloads; [`decode_payload`] then extracts
//! the payload once the channel is known.

use serde_json::Value;

use crate::Result;
use crate::error::StreamError;
use crate::models::Channel;
use crate::models::book::{BookSnapshot, BookUpdate, BookUpdatePart};
use crate::models::candle::OhlcPayload;
use crate::models::ticker::TickerPayload;
use crate::models::trade::TradeEntry;

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Channel data addressed by a server-assigned channel id.
    Sequence(SequenceFrame),
    /// A named event object.
    Event(EventFrame),
    /// Neither shape; carried unmodified.
    Unparseable(Value),
}

/// Channel data frame with its positional fields validated.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceFrame {
    pub channel_id: u64,
    /// Elements between the channel id and the trailing name and pair.
    pub payloads: Vec<Value>,
    pub channel_name: String,
    /// WebSocket pair name, e.g. `XBT/USD`.
    pub pair: String,
}

impl SequenceFrame {
    /// Channel named by the frame itself, if it is one the core handles.
    pub fn channel(&self) -> Option<Channel> {
        Channel::from_wire(&self.channel_name)
    }

    /// Reassembles the frame into its original wire shape.
    pub fn into_value(self) -> Value {
        let mut items = Vec::with_capacity(self.payloads.len() + 3);
        items.push(Value::from(self.channel_id));
        items.extend(self.payloads);
        items.push(Value::String(self.channel_name));
        items.push(Value::String(self.pair));
        Value::Array(items)
    }
}

/// Kinds of event the dispatcher routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Heartbeat,
    SystemStatus,
    SubscriptionStatus,
    Pong,
    Unrecognized,
}

/// Event frame with the routing fields lifted out of the body.
#[derive(Debug, Clone, PartialEq)]
pub struct EventFrame {
    pub event: String,
    pub reqid: Option<u64>,
    pub error_message: Option<String>,
    pub body: Value,
}

impl EventFrame {
    pub fn kind(&self) -> EventKind {
        match self.event.as_str() {
            "heartbeat" => EventKind::Heartbeat,
            "systemStatus" => EventKind::SystemStatus,
            "subscriptionStatus" => EventKind::SubscriptionStatus,
            "pong" => EventKind::Pong,
            _ => EventKind::Unrecognized,
        }
    }
}

/// Decoded channel payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelPayload {
    BookSnapshot(BookSnapshot),
    BookUpdate(BookUpdate),
    Ticker(TickerPayload),
    Trades(Vec<TradeEntry>),
    Ohlc(OhlcPayload),
}

/// Parses raw text and classifies it.
///
/// # Errors
///
/// Returns [`StreamError::MalformedMessage`] if the text is not JSON.
pub fn decode_text(text: &str) -> Result<Frame> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| StreamError::MalformedMessage(e.to_string()))?;
    Ok(decode(value))
}

/// Classifies a JSON value as a sequence frame, an event frame, or neither.
pub fn decode(value: Value) -> Frame {
    match value {
        Value::Array(items) => match parse_sequence(&items) {
            Some(frame) => Frame::Sequence(frame),
            None => Frame::Unparseable(Value::Array(items)),
        },
        Value::Object(ref map) => {
            let Some(event) = map.get("event").and_then(Value::as_str) else {
                return Frame::Unparseable(value);
            };
            Frame::Event(EventFrame {
                event: event.to_string(),
                reqid: map.get("reqid").and_then(Value::as_u64),
                error_message: map
                    .get("errorMessage")
                    .and_then(Value::as_str)
                    .map(String::from),
                body: value.clone(),
            })
        }
        other => Frame::Unparseable(other),
    }
}

/// Validates `[channelID, payload, (payload,) channelName, pair]`.
fn parse_sequence(items: &[Value]) -> Option<SequenceFrame> {
    let (first, rest) = items.split_first()?;
    let (pair, rest) = rest.split_last()?;
    let (channel_name, payloads) = rest.split_last()?;
    if payloads.is_empty() {
        return None;
    }

    Some(SequenceFrame {
        channel_id: first.as_u64()?,
        payloads: payloads.to_vec(),
        channel_name: channel_name.as_str()?.to_string(),
        pair: pair.as_str()?.to_string(),
    })
}

/// Extracts the payload of `frame` for `channel`.
///
/// # Errors
///
/// Returns [`StreamError::MalformedMessage`] if the payload count is wrong
/// for the channel, or [`StreamError::Json`] if a payload has the wrong
/// shape.
pub fn decode_payload(channel: Channel, frame: &SequenceFrame) -> Result<ChannelPayload> {
    match channel {
        Channel::Book => decode_book(frame),
        Channel::Ticker => {
            let payload = single_payload(frame)?;
            Ok(ChannelPayload::Ticker(serde_json::from_value(
                payload.clone(),
            )?))
        }
        Channel::Trade => {
            let payload = single_payload(frame)?;
            Ok(ChannelPayload::Trades(serde_json::from_value(
                payload.clone(),
            )?))
        }
        Channel::Ohlc => {
            let payload = single_payload(frame)?;
            Ok(ChannelPayload::Ohlc(serde_json::from_value(payload.clone())?))
        }
    }
}

fn single_payload(frame: &SequenceFrame) -> Result<&Value> {
    match frame.payloads.as_slice() {
        [payload] => Ok(payload),
        other => Err(StreamError::MalformedMessage(format!(
            "{} frame on channel {} has {} payloads, expected 1",
            frame.channel_name,
            frame.channel_id,
            other.len()
        ))),
    }
}

/// Snapshots carry `as`/`bs`; updates carry `a` and/or `b` in one or two objects.
fn decode_book(frame: &SequenceFrame) -> Result<ChannelPayload> {
    let is_snapshot = match frame.payloads.as_slice() {
        [payload] => payload.get("as").is_some() || payload.get("bs").is_some(),
        [_, _] => false,
        other => {
            return Err(StreamError::MalformedMessage(format!(
                "book frame on channel {} has {} payloads",
                frame.channel_id,
                other.len()
            )));
        }
    };

    if is_snapshot {
        let snapshot: BookSnapshot = serde_json::from_value(frame.payloads[0].clone())?;
        return Ok(ChannelPayload::BookSnapshot(snapshot));
    }

    let parts = frame
        .payloads
        .iter()
        .map(|p| serde_json::from_value::<BookUpdatePart>(p.clone()))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    BookUpdate::from_parts(parts)
        .map(ChannelPayload::BookUpdate)
        .ok_or_else(|| {
            StreamError::MalformedMessage(format!(
                "book update on channel {} has an invalid checksum",
                frame.channel_id
            ))
        })
}
