//! Subscription registry: server channel ids to subscription metadata.
//!
//! Channel ids are assigned by the server in the subscription ack, so a
//! subscription lives in two places over its life: keyed by request id
//! while pending, then keyed by channel id once acknowledged. The whole
//! registry is scoped to one connection and cleared on disconnect.

use std::collections::HashMap;

use tracing::{info, warn};

use crate::models::{Channel, SubscriptionParams, message_hash};

/// Lifecycle state of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Pending,
    Subscribed,
    Error,
}

/// One subscribed (or subscribing) channel for one pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub channel: Channel,
    /// WebSocket pair name, e.g. `XBT/USD`.
    pub ws_name: String,
    /// Unified symbol, e.g. `BTC/USD`.
    pub symbol: String,
    pub params: SubscriptionParams,
    pub status: SubscriptionStatus,
    pub channel_id: Option<u64>,
}

impl Subscription {
    /// A subscription that has been requested but not yet acknowledged.
    #[must_use]
    pub fn pending(
        channel: Channel,
        ws_name: &str,
        symbol: &str,
        params: SubscriptionParams,
    ) -> Self {
        Self {
            channel,
            ws_name: ws_name.to_string(),
            symbol: symbol.to_string(),
            params,
            status: SubscriptionStatus::Pending,
            channel_id: None,
        }
    }

    /// Key that routes this subscription's pushes.
    pub fn message_hash(&self) -> String {
        message_hash(&self.ws_name, self.channel)
    }
}

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    pending: HashMap<u64, Subscription>,
    active: HashMap<u64, Subscription>,
}

impl SubscriptionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a subscription whose request `reqid` has just been sent.
    pub fn track(&mut self, reqid: u64, subscription: Subscription) {
        self.pending.insert(reqid, subscription);
    }

    /// Removes and returns the pending subscription for `reqid`.
    pub fn take_pending(&mut self, reqid: u64) -> Option<Subscription> {
        self.pending.remove(&reqid)
    }

    /// Binds `channel_id` to an acknowledged subscription.
    ///
    /// If the id is already bound, the newer subscription wins and the
    /// displaced one is returned.
    pub fn register(
        &mut self,
        channel_id: u64,
        mut subscription: Subscription,
    ) -> Option<Subscription> {
        subscription.status = SubscriptionStatus::Subscribed;
        subscription.channel_id = Some(channel_id);
        info!(
            channel_id,
            channel = subscription.channel.as_str(),
            symbol = %subscription.symbol,
            "Subscribed to channel"
        );

        let displaced = self.active.insert(channel_id, subscription);
        if let Some(ref old) = displaced {
            warn!(
                channel_id,
                displaced = %old.message_hash(),
                "Channel id reused before release; keeping latest subscription"
            );
        }
        displaced
    }

    pub fn lookup(&self, channel_id: u64) -> Option<&Subscription> {
        self.active.get(&channel_id)
    }

    /// Drops the pending subscription for `reqid` after a rejection.
    pub fn mark_error(&mut self, reqid: u64) -> Option<Subscription> {
        let mut subscription = self.pending.remove(&reqid)?;
        subscription.status = SubscriptionStatus::Error;
        Some(subscription)
    }

    /// Releases `channel_id` after an unsubscribe ack.
    pub fn remove(&mut self, channel_id: u64) -> Option<Subscription> {
        self.active.remove(&channel_id)
    }

    /// Active subscription whose pushes route to `hash`.
    pub fn find_active(&self, hash: &str) -> Option<&Subscription> {
        self.active.values().find(|s| s.message_hash() == hash)
    }

    /// Pending or active subscription that already covers `hash`.
    pub fn find_tracked(&self, hash: &str) -> Option<&Subscription> {
        self.pending
            .values()
            .chain(self.active.values())
            .find(|s| s.message_hash() == hash)
    }

    pub fn is_tracked(&self, hash: &str) -> bool {
        self.find_tracked(hash).is_some()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Empties the registry, returning every subscription it held.
    ///
    /// Channel ids are reset on the returned values since they are not
    /// valid on another connection.
    pub fn clear(&mut self) -> Vec<Subscription> {
        let mut drained: Vec<Subscription> = self
            .pending
            .drain()
            .map(|(_, s)| s)
            .chain(self.active.drain().map(|(_, s)| s))
            .map(|mut s| {
                s.status = SubscriptionStatus::Pending;
                s.channel_id = None;
                s
            })
            .collect();
        drained.sort_by_key(Subscription::message_hash);
        drained
    }
}
