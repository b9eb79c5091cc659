//! Connection-scoped frame dispatcher.
//!
//! [`Dispatcher`] owns every piece of per-connection state (subscription
//! registry, pending request table, order books) and is their only writer.
//! It is synchronous: the connection task feeds it frames in arrival order
//! and sends whatever outbound requests it produces.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde_json::Value;
use tracing::{debug, info, warn};

use super::classify::ErrorClassifier;
use super::codec::{self, ChannelPayload, EventFrame, EventKind, Frame, SequenceFrame};
use super::pending::{Ack, AckReceiver, PendingRequests, StreamHandle, StreamValue};
use super::registry::{Subscription, SubscriptionRegistry};
use crate::Result;
use crate::error::{RequestError, StreamError};
use crate::markets::SymbolMetadata;
use crate::models::book::BookDepth;
use crate::models::candle::Ohlcv;
use crate::models::ticker::Ticker;
use crate::models::trade::Trade;
use crate::models::{
    Channel, PingRequest, SubscribeRequest, SubscriptionParams, SubscriptionStatusEvent,
    SystemStatusEvent, UnsubscribeRequest, message_hash,
};
use crate::orderbook::{OrderBook, OrderBookStore};

/// Stream slot for heartbeat events.
pub const HEARTBEAT_HASH: &str = "heartbeat";

/// Stream slot for pong events.
pub const PONG_HASH: &str = "pong";

/// Outcome of dispatching one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    /// The frame updated state or resolved a slot.
    Handled,
    /// The frame was not recognised and is returned unmodified.
    PassThrough(Value),
}

/// Result of a subscribe call.
#[derive(Debug)]
pub struct SubscribeOutcome {
    /// Request to send, absent when an existing subscription is reused.
    pub request: Option<SubscribeRequest>,
    /// Resolves with the server ack, absent when reused.
    pub ack: Option<AckReceiver>,
    pub stream: StreamHandle,
}

pub struct Dispatcher {
    metadata: Arc<dyn SymbolMetadata>,
    registry: SubscriptionRegistry,
    pending: PendingRequests,
    books: OrderBookStore,
    classifier: ErrorClassifier,
    default_depth: BookDepth,
    system_status: Option<SystemStatusEvent>,
    replay: Vec<Subscription>,
    next_reqid: u64,
    frames: u64,
}

impl Dispatcher {
    #[must_use]
    pub fn new(metadata: Arc<dyn SymbolMetadata>, default_depth: BookDepth) -> Self {
        Self {
            metadata,
            registry: SubscriptionRegistry::new(),
            pending: PendingRequests::new(),
            books: OrderBookStore::new(),
            classifier: ErrorClassifier::kraken(),
            default_depth,
            system_status: None,
            replay: Vec::new(),
            next_reqid: 1,
            frames: 0,
        }
    }

    #[must_use]
    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    fn next_reqid(&mut self) -> u64 {
        let reqid = self.next_reqid;
        self.next_reqid += 1;
        reqid
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    pub fn order_book(&self, symbol: &str) -> Option<&OrderBook> {
        self.books.get(symbol)
    }

    /// Latest `systemStatus` event seen on this connection.
    pub fn system_status(&self) -> Option<&SystemStatusEvent> {
        self.system_status.as_ref()
    }

    /// Prepares a subscription to `channel` for `symbol`.
    ///
    /// A second subscribe for the same channel and pair reuses the existing
    /// subscription and only hands out another stream handle.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::UnknownSymbol`] if the symbol has no
    /// WebSocket name, or a [`RequestError::BadRequest`] if the pair is
    /// already subscribed on this channel with a different depth or interval.
    pub fn subscribe(
        &mut self,
        channel: Channel,
        symbol: &str,
        params: SubscriptionParams,
    ) -> Result<SubscribeOutcome> {
        let ws_name = self
            .metadata
            .native_name(symbol)
            .ok_or_else(|| StreamError::UnknownSymbol(symbol.to_string()))?;
        let hash = message_hash(&ws_name, channel);

        if let Some(existing) = self.registry.find_tracked(&hash) {
            if existing.params != params {
                return Err(RequestError::BadRequest(format!(
                    "{hash} is already subscribed with depth {:?} and interval {:?}",
                    existing.params.depth, existing.params.interval
                ))
                .into());
            }
            debug!(message_hash = %hash, "Reusing existing subscription");
            return Ok(SubscribeOutcome {
                request: None,
                ack: None,
                stream: self.pending.stream(&hash),
            });
        }

        let stream = self.pending.stream(&hash);

        let reqid = self.next_reqid();
        self.registry.track(
            reqid,
            Subscription::pending(channel, &ws_name, symbol, params.clone()),
        );
        let ack = self.pending.create(reqid, Some(hash));

        Ok(SubscribeOutcome {
            request: Some(SubscribeRequest::new(reqid, &ws_name, params)),
            ack: Some(ack),
            stream,
        })
    }

    /// Prepares an unsubscribe request for an active subscription.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::UnknownSymbol`] for an unknown symbol, or a
    /// [`RequestError::BadRequest`] if nothing is subscribed.
    pub fn unsubscribe(
        &mut self,
        channel: Channel,
        symbol: &str,
    ) -> Result<(UnsubscribeRequest, AckReceiver)> {
        let ws_name = self
            .metadata
            .native_name(symbol)
            .ok_or_else(|| StreamError::UnknownSymbol(symbol.to_string()))?;
        let hash = message_hash(&ws_name, channel);
        let params = self
            .registry
            .find_active(&hash)
            .map(|s| s.params.clone())
            .ok_or_else(|| RequestError::BadRequest(format!("not subscribed to {hash}")))?;

        let reqid = self.next_reqid();
        let ack = self.pending.create(reqid, None);
        Ok((UnsubscribeRequest::new(reqid, &ws_name, params), ack))
    }

    /// Prepares a ping whose pong resolves the returned receiver.
    pub fn ping(&mut self) -> (PingRequest, AckReceiver) {
        let reqid = self.next_reqid();
        let ack = self.pending.create(reqid, None);
        (PingRequest::new(Some(reqid)), ack)
    }

    pub fn watch_heartbeat(&mut self) -> StreamHandle {
        self.pending.stream(HEARTBEAT_HASH)
    }

    /// Stream of pong events, carrying the echoed request id.
    pub fn watch_pong(&mut self) -> StreamHandle {
        self.pending.stream(PONG_HASH)
    }

    /// Parses and dispatches one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::MalformedMessage`] if the text is not JSON.
    pub fn dispatch_text(&mut self, text: &str) -> Result<Dispatched> {
        let frame = codec::decode_text(text)?;
        Ok(self.dispatch_frame(frame))
    }

    /// Dispatches one decoded JSON frame.
    pub fn dispatch(&mut self, value: Value) -> Dispatched {
        self.dispatch_frame(codec::decode(value))
    }

    fn dispatch_frame(&mut self, frame: Frame) -> Dispatched {
        self.frames += 1;
        match frame {
            Frame::Sequence(sequence) => self.on_sequence(sequence),
            Frame::Event(event) => self.on_event(event),
            Frame::Unparseable(value) => {
                debug!("Passing through unparseable frame");
                Dispatched::PassThrough(value)
            }
        }
    }

    fn on_sequence(&mut self, frame: SequenceFrame) -> Dispatched {
        let Some(subscription) = self.registry.lookup(frame.channel_id) else {
            debug!(
                channel_id = frame.channel_id,
                channel = %frame.channel_name,
                "Data for unregistered channel"
            );
            return Dispatched::PassThrough(frame.into_value());
        };
        if frame.channel() != Some(subscription.channel) {
            debug!(
                channel_id = frame.channel_id,
                channel = %frame.channel_name,
                "Channel name does not match subscription"
            );
            return Dispatched::PassThrough(frame.into_value());
        }

        let channel = subscription.channel;
        let symbol = subscription.symbol.clone();
        let hash = subscription.message_hash();
        let depth = subscription
            .params
            .depth
            .map_or(usize::from(self.default_depth.as_u16()), usize::from);

        let payload = match codec::decode_payload(channel, &frame) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(channel_id = frame.channel_id, "Failed to decode payload: {e}");
                return Dispatched::PassThrough(frame.into_value());
            }
        };

        let value = match payload {
            ChannelPayload::BookSnapshot(snapshot) => {
                let book = self.books.apply_snapshot(&symbol, depth, &snapshot);
                book.set_nonce(Some(self.frames));
                StreamValue::OrderBook(book.limited_view(depth))
            }
            ChannelPayload::BookUpdate(update) => {
                let Some(book) = self.books.apply_update(&symbol, &update) else {
                    warn!(symbol = %symbol, "Book update before snapshot");
                    return Dispatched::Handled;
                };
                book.set_nonce(Some(self.frames));
                if let Some(expected) = update.checksum {
                    let actual = book.checksum();
                    if actual != expected {
                        warn!(symbol = %symbol, expected, actual, "Book checksum mismatch");
                        book.mark_stale();
                    }
                }
                StreamValue::OrderBook(book.limited_view(depth))
            }
            ChannelPayload::Ticker(payload) => {
                StreamValue::Ticker(Ticker::from_payload(&symbol, &payload, now_millis()))
            }
            ChannelPayload::Trades(entries) => StreamValue::Trades(
                entries
                    .iter()
                    .filter_map(|entry| Trade::from_entry(&symbol, entry))
                    .collect(),
            ),
            ChannelPayload::Ohlc(payload) => {
                let Some(candle) = Ohlcv::from_payload(&symbol, &payload) else {
                    warn!(symbol = %symbol, "Candle time out of range");
                    return Dispatched::Handled;
                };
                StreamValue::Ohlcv(candle)
            }
        };

        self.pending.resolve_by_hash(&hash, value);
        Dispatched::Handled
    }

    fn on_event(&mut self, event: EventFrame) -> Dispatched {
        if let Some(message) = event.error_message.as_deref() {
            let error = self.classifier.to_error(message);
            match event.reqid {
                Some(reqid) => {
                    warn!(reqid, "Request rejected: {message}");
                    self.reject_request(reqid, error);
                }
                None => warn!("Error event without request id: {message}"),
            }
            return Dispatched::Handled;
        }

        match event.kind() {
            EventKind::Heartbeat => {
                self.pending.resolve_by_hash(HEARTBEAT_HASH, StreamValue::Heartbeat);
                Dispatched::Handled
            }
            EventKind::Pong => {
                if let Some(reqid) = event.reqid {
                    self.pending.resolve_by_id(reqid, Ack::Pong);
                }
                self.pending
                    .resolve_by_hash(PONG_HASH, StreamValue::Pong(event.reqid));
                Dispatched::Handled
            }
            EventKind::SystemStatus => {
                match serde_json::from_value::<SystemStatusEvent>(event.body.clone()) {
                    Ok(status) => {
                        info!(
                            status = %status.status,
                            connection_id = ?status.connection_id,
                            version = ?status.version,
                            "System status"
                        );
                        self.system_status = Some(status);
                        Dispatched::Handled
                    }
                    Err(e) => {
                        warn!("Failed to parse system status: {e}");
                        Dispatched::PassThrough(event.body)
                    }
                }
            }
            EventKind::SubscriptionStatus => {
                match serde_json::from_value::<SubscriptionStatusEvent>(event.body.clone()) {
                    Ok(status) => self.on_subscription_status(status, event.body),
                    Err(e) => {
                        warn!("Failed to parse subscription status: {e}");
                        Dispatched::PassThrough(event.body)
                    }
                }
            }
            EventKind::Unrecognized => {
                debug!(event = %event.event, "Passing through unrecognized event");
                Dispatched::PassThrough(event.body)
            }
        }
    }

    fn on_subscription_status(
        &mut self,
        status: SubscriptionStatusEvent,
        raw: Value,
    ) -> Dispatched {
        match status.status.as_str() {
            "subscribed" => {
                let Some(channel_id) = status.channel_id else {
                    warn!(reqid = ?status.reqid, "Subscription ack without channel id");
                    return Dispatched::PassThrough(raw);
                };
                let tracked = status.reqid.and_then(|r| self.registry.take_pending(r));
                let Some(subscription) = tracked.or_else(|| self.untracked_subscription(&status))
                else {
                    debug!(channel_id, "Ack for unknown channel");
                    return Dispatched::PassThrough(raw);
                };
                self.registry.register(channel_id, subscription);
                if let Some(reqid) = status.reqid {
                    self.pending.resolve_by_id(reqid, Ack::Subscribed { channel_id });
                }
            }
            "unsubscribed" => {
                let removed = status.channel_id.and_then(|id| self.registry.remove(id));
                if let Some(subscription) = removed {
                    info!(
                        channel = subscription.channel.as_str(),
                        symbol = %subscription.symbol,
                        "Unsubscribed from channel"
                    );
                    if subscription.channel == Channel::Book {
                        self.books.remove(&subscription.symbol);
                    }
                    let hash = subscription.message_hash();
                    self.pending
                        .reject_by_hash(&hash, RequestError::Unsubscribed(hash.clone()));
                }
                if let Some(reqid) = status.reqid {
                    self.pending.resolve_by_id(reqid, Ack::Unsubscribed);
                }
            }
            other => {
                let Some(reqid) = status.reqid else {
                    return Dispatched::PassThrough(raw);
                };
                self.reject_request(
                    reqid,
                    RequestError::Exchange(format!("subscription status {other}")),
                );
            }
        }
        Dispatched::Handled
    }

    /// Rebuilds a subscription from an ack this connection did not request.
    fn untracked_subscription(&self, status: &SubscriptionStatusEvent) -> Option<Subscription> {
        let ws_name = status.pair.as_deref()?;
        let params = status.subscription.clone()?;
        let channel = Channel::from_wire(&params.name)?;
        let symbol = self
            .metadata
            .symbol_for(ws_name)
            .unwrap_or_else(|| ws_name.to_string());
        Some(Subscription::pending(channel, ws_name, &symbol, params))
    }

    /// Rejects request `reqid` and the stream slot it armed.
    fn reject_request(&mut self, reqid: u64, error: RequestError) {
        let armed = self.pending.reject_by_id(reqid, error.clone()).flatten();
        let failed = self.registry.mark_error(reqid).map(|s| s.message_hash());
        if let Some(hash) = armed.or(failed) {
            self.pending.reject_by_hash(&hash, error);
        }
    }

    /// Rejects requests that have waited longer than `timeout`.
    pub fn expire(&mut self, timeout: Duration) {
        for (reqid, hash) in self.pending.expire(timeout, Instant::now()) {
            warn!(reqid, "Request timed out");
            self.registry.mark_error(reqid);
            if let Some(hash) = hash {
                self.pending
                    .reject_by_hash(&hash, RequestError::RequestTimeout { reqid });
            }
        }
    }

    /// Tears down all connection state after the transport closed.
    ///
    /// Every waiter receives [`RequestError::ConnectionClosed`]; the
    /// subscriptions are kept for [`Dispatcher::replay_subscriptions`].
    pub fn on_disconnect(&mut self) {
        let subscriptions = self.registry.clear();
        info!(
            subscriptions = subscriptions.len(),
            "Connection closed, resetting state"
        );
        self.replay = subscriptions;
        self.pending.reject_all(&RequestError::ConnectionClosed);
        self.books.invalidate();
    }

    /// Subscribe requests, with fresh ids, for everything that was
    /// subscribed when the previous connection closed.
    pub fn replay_subscriptions(&mut self) -> Vec<SubscribeRequest> {
        std::mem::take(&mut self.replay)
            .into_iter()
            .map(|subscription| {
                let reqid = self.next_reqid();
                let request = SubscribeRequest::new(
                    reqid,
                    &subscription.ws_name,
                    subscription.params.clone(),
                );
                self.registry.track(reqid, subscription);
                request
            })
            .collect()
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}
