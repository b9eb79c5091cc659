//! Pending request table.
//!
//! Two kinds of slot live here, in separate maps:
//!
//! - one-shot slots keyed by request id, resolved exactly once by the
//!   matching ack (or rejected) and removed on resolution;
//! - stream slots keyed by message hash, resolved every time a push
//!   arrives for that hash and awaited repeatedly through a
//!   [`StreamHandle`].
//!
//! Resolving a stream slot never waits on its readers. A value pushed while
//! nobody is awaiting stays in the slot and is handed to the next await.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::{oneshot, watch};
use tracing::{debug, warn};

use crate::error::RequestError;
use crate::models::candle::Ohlcv;
use crate::models::ticker::Ticker;
use crate::models::trade::Trade;
use crate::orderbook::OrderBookView;

/// Value published on a stream slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamValue {
    OrderBook(OrderBookView),
    Ticker(Ticker),
    Trades(Vec<Trade>),
    Ohlcv(Ohlcv),
    Heartbeat,
    Pong(Option<u64>),
}

/// Value a one-shot slot resolves with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    Subscribed { channel_id: u64 },
    Unsubscribed,
    Pong,
}

pub type AckResult = std::result::Result<Ack, RequestError>;

/// Receiving end of a one-shot slot.
pub type AckReceiver = oneshot::Receiver<AckResult>;

type SlotValue = Option<std::result::Result<StreamValue, RequestError>>;

struct OneShot {
    message_hash: Option<String>,
    created: Instant,
    tx: oneshot::Sender<AckResult>,
}

/// Reusable handle on a stream slot.
#[derive(Debug, Clone)]
pub struct StreamHandle {
    message_hash: String,
    rx: watch::Receiver<SlotValue>,
}

impl StreamHandle {
    pub fn message_hash(&self) -> &str {
        &self.message_hash
    }

    /// Waits for the next value published on the slot.
    ///
    /// A value published before this call and not yet seen by this handle
    /// is returned immediately. Once the slot is rejected every further
    /// call fails.
    ///
    /// # Errors
    ///
    /// Returns the rejection published on the slot, or
    /// [`RequestError::ConnectionClosed`] if the slot was dropped.
    pub async fn next(&mut self) -> std::result::Result<StreamValue, RequestError> {
        loop {
            if self.rx.changed().await.is_err() {
                return Err(RequestError::ConnectionClosed);
            }
            if let Some(value) = self.rx.borrow_and_update().clone() {
                return value;
            }
        }
    }
}

#[derive(Default)]
pub struct PendingRequests {
    one_shots: HashMap<u64, OneShot>,
    streams: HashMap<String, watch::Sender<SlotValue>>,
}

impl PendingRequests {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a one-shot slot for `reqid`, optionally tied to the stream
    /// slot the request arms.
    pub fn create(&mut self, reqid: u64, message_hash: Option<String>) -> AckReceiver {
        let (tx, rx) = oneshot::channel();
        let slot = OneShot {
            message_hash,
            created: Instant::now(),
            tx,
        };
        if self.one_shots.insert(reqid, slot).is_some() {
            warn!(reqid, "Replaced outstanding request with the same id");
        }
        rx
    }

    /// Returns a fresh handle on the stream slot for `hash`, creating it if
    /// needed.
    pub fn stream(&mut self, hash: &str) -> StreamHandle {
        let tx = self
            .streams
            .entry(hash.to_string())
            .or_insert_with(|| watch::channel(None).0);
        let mut rx = tx.subscribe();
        if rx.borrow().is_some() {
            rx.mark_changed();
        }
        StreamHandle {
            message_hash: hash.to_string(),
            rx,
        }
    }

    /// Resolves and removes the one-shot slot for `reqid`.
    ///
    /// Returns the stream hash the request was tied to, or `None` if no
    /// slot was outstanding.
    pub fn resolve_by_id(&mut self, reqid: u64, ack: Ack) -> Option<Option<String>> {
        let slot = self.one_shots.remove(&reqid)?;
        // The caller may have stopped waiting.
        let _ = slot.tx.send(Ok(ack));
        Some(slot.message_hash)
    }

    /// Rejects and removes the one-shot slot for `reqid`.
    pub fn reject_by_id(&mut self, reqid: u64, error: RequestError) -> Option<Option<String>> {
        let slot = self.one_shots.remove(&reqid)?;
        let _ = slot.tx.send(Err(error));
        Some(slot.message_hash)
    }

    /// Publishes `value` on the stream slot for `hash`.
    ///
    /// Returns the number of handles currently attached.
    pub fn resolve_by_hash(&mut self, hash: &str, value: StreamValue) -> usize {
        let tx = self
            .streams
            .entry(hash.to_string())
            .or_insert_with(|| watch::channel(None).0);
        tx.send_replace(Some(Ok(value)));
        tx.receiver_count()
    }

    /// Publishes a terminal `error` on the slot for `hash` and removes it.
    pub fn reject_by_hash(&mut self, hash: &str, error: RequestError) -> bool {
        let Some(tx) = self.streams.remove(hash) else {
            return false;
        };
        tx.send_replace(Some(Err(error)));
        true
    }

    /// Rejects one-shot slots older than `timeout` with
    /// [`RequestError::RequestTimeout`].
    ///
    /// Returns the expired request ids with their tied stream hashes.
    pub fn expire(&mut self, timeout: Duration, now: Instant) -> Vec<(u64, Option<String>)> {
        let expired: Vec<u64> = self
            .one_shots
            .iter()
            .filter(|(_, slot)| now.saturating_duration_since(slot.created) >= timeout)
            .map(|(reqid, _)| *reqid)
            .collect();

        expired
            .into_iter()
            .filter_map(|reqid| {
                debug!(reqid, "Request timed out");
                self.reject_by_id(reqid, RequestError::RequestTimeout { reqid })
                    .map(|hash| (reqid, hash))
            })
            .collect()
    }

    /// Rejects every one-shot and stream slot with `error`.
    pub fn reject_all(&mut self, error: &RequestError) {
        for (_, slot) in self.one_shots.drain() {
            let _ = slot.tx.send(Err(error.clone()));
        }
        for (_, tx) in self.streams.drain() {
            tx.send_replace(Some(Err(error.clone())));
        }
    }

    pub fn is_pending(&self, reqid: u64) -> bool {
        self.one_shots.contains_key(&reqid)
    }

    pub fn has_stream(&self, hash: &str) -> bool {
        self.streams.contains_key(hash)
    }

    /// Number of outstanding one-shot slots.
    pub fn len(&self) -> usize {
        self.one_shots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.one_shots.is_empty()
    }
}
