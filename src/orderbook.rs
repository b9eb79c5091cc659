//! Local order book state built from snapshot and delta frames.
//!
//! Each side is a `BTreeMap` keyed by exact decimal price, so sort order
//! and uniqueness of price levels hold by construction. Zero amounts are
//! never stored; they remove the level. After every merge both sides are
//! trimmed back to the subscribed depth.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::book::{BookLevel, BookSnapshot, BookUpdate};
use crate::models::seconds_to_millis;

/// Number of levels per side covered by the Kraken book checksum.
const CHECKSUM_LEVELS: usize = 10;

/// Which side of the book a [`BookSide`] holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Bid,
    Ask,
}

/// Amount resting at a price, plus an optional order count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Level {
    amount: Decimal,
    count: Option<u64>,
}

/// A published price level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}

/// One side of an order book.
#[derive(Debug, Clone)]
pub struct BookSide {
    side: Side,
    levels: BTreeMap<Decimal, Level>,
}

impl BookSide {
    fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
        }
    }

    /// Upserts a level, or removes it when `amount` is zero.
    pub fn store(&mut self, price: Decimal, amount: Decimal, count: Option<u64>) {
        if amount.is_zero() {
            self.levels.remove(&price);
        } else {
            self.levels.insert(price, Level { amount, count });
        }
    }

    /// Drops the least competitive levels until at most `depth` remain.
    pub fn trim(&mut self, depth: usize) {
        while self.levels.len() > depth {
            match self.side {
                Side::Bid => self.levels.pop_first(),
                Side::Ask => self.levels.pop_last(),
            };
        }
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Returns up to `n` levels, best price first.
    pub fn top(&self, n: usize) -> Vec<PriceLevel> {
        let to_level = |(price, level): (&Decimal, &Level)| PriceLevel {
            price: *price,
            amount: level.amount,
            count: level.count,
        };
        match self.side {
            Side::Bid => self.levels.iter().rev().take(n).map(to_level).collect(),
            Side::Ask => self.levels.iter().take(n).map(to_level).collect(),
        }
    }

    /// Applies wire levels and returns the latest timestamp among them.
    fn apply(&mut self, levels: &[BookLevel]) -> Option<i64> {
        let mut latest = None;
        for level in levels {
            self.store(level.price, level.volume, None);
            latest = latest.max(seconds_to_millis(level.timestamp));
        }
        latest
    }
}

/// Order book for one symbol.
#[derive(Debug, Clone)]
pub struct OrderBook {
    symbol: String,
    depth: usize,
    bids: BookSide,
    asks: BookSide,
    timestamp: Option<i64>,
    nonce: Option<u64>,
    stale: bool,
}

impl OrderBook {
    /// Creates an empty book retaining at most `depth` levels per side.
    #[must_use]
    pub fn new(symbol: &str, depth: usize) -> Self {
        Self {
            symbol: symbol.to_string(),
            depth,
            bids: BookSide::new(Side::Bid),
            asks: BookSide::new(Side::Ask),
            timestamp: None,
            nonce: None,
            stale: false,
        }
    }

    /// Builds a fresh book from a snapshot frame.
    #[must_use]
    pub fn from_snapshot(symbol: &str, depth: usize, snapshot: &BookSnapshot) -> Self {
        let mut book = Self::new(symbol, depth);
        let asks_ts = book.asks.apply(&snapshot.asks);
        let bids_ts = book.bids.apply(&snapshot.bids);
        book.timestamp = asks_ts.max(bids_ts);
        book.trim();
        book
    }

    /// Merges an incremental update into the book.
    pub fn apply_update(&mut self, update: &BookUpdate) {
        let asks_ts = self.asks.apply(&update.asks);
        let bids_ts = self.bids.apply(&update.bids);
        self.timestamp = self.timestamp.max(asks_ts).max(bids_ts);
        self.trim();
    }

    fn trim(&mut self) {
        self.bids.trim(self.depth);
        self.asks.trim(self.depth);
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn bids(&self) -> &BookSide {
        &self.bids
    }

    pub fn asks(&self) -> &BookSide {
        &self.asks
    }

    /// Latest contributing timestamp in milliseconds.
    pub fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }

    pub fn nonce(&self) -> Option<u64> {
        self.nonce
    }

    /// Records a transport sequence marker. Not interpreted by the book.
    pub fn set_nonce(&mut self, nonce: Option<u64>) {
        self.nonce = nonce;
    }

    /// Whether the book may have diverged from the exchange.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    /// CRC32 over the top ten asks (ascending) then top ten bids (descending).
    pub fn checksum(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        for level in self
            .asks
            .top(CHECKSUM_LEVELS)
            .iter()
            .chain(self.bids.top(CHECKSUM_LEVELS).iter())
        {
            hasher.update(checksum_digits(level.price).as_bytes());
            hasher.update(checksum_digits(level.amount).as_bytes());
        }
        hasher.finalize()
    }

    /// Copies at most `n` levels per side (never more than the depth).
    #[must_use]
    pub fn limited_view(&self, n: usize) -> OrderBookView {
        let n = n.min(self.depth);
        OrderBookView {
            symbol: self.symbol.clone(),
            bids: self.bids.top(n),
            asks: self.asks.top(n),
            timestamp: self.timestamp,
            nonce: self.nonce,
            stale: self.stale,
        }
    }
}

/// Decimal rendered without the point and without leading zeros.
fn checksum_digits(value: Decimal) -> String {
    let digits: String = value.to_string().chars().filter(|c| *c != '.').collect();
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Immutable copy of a book handed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderBookView {
    pub symbol: String,
    /// Highest price first.
    pub bids: Vec<PriceLevel>,
    /// Lowest price first.
    pub asks: Vec<PriceLevel>,
    pub timestamp: Option<i64>,
    pub nonce: Option<u64>,
    pub stale: bool,
}

impl OrderBookView {
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.first()
    }

    /// Keeps at most `n` levels per side.
    #[must_use]
    pub fn truncated(mut self, n: usize) -> Self {
        self.bids.truncate(n);
        self.asks.truncate(n);
        self
    }

    /// Best ask minus best bid.
    pub fn spread(&self) -> Option<Decimal> {
        let (bid, ask) = (self.best_bid()?, self.best_ask()?);
        ask.price.checked_sub(bid.price)
    }
}

/// Per-symbol books owned by one connection.
#[derive(Debug, Default)]
pub struct OrderBookStore {
    books: HashMap<String, OrderBook>,
}

impl OrderBookStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any existing book for `symbol` with one built from `snapshot`.
    pub fn apply_snapshot(
        &mut self,
        symbol: &str,
        depth: usize,
        snapshot: &BookSnapshot,
    ) -> &mut OrderBook {
        let slot = self
            .books
            .entry(symbol.to_string())
            .or_insert_with(|| OrderBook::new(symbol, depth));
        *slot = OrderBook::from_snapshot(symbol, depth, snapshot);
        slot
    }

    /// Merges `update` into the book for `symbol`.
    ///
    /// Returns `None` if no snapshot has been received for the symbol yet.
    pub fn apply_update(&mut self, symbol: &str, update: &BookUpdate) -> Option<&mut OrderBook> {
        let book = self.books.get_mut(symbol)?;
        book.apply_update(update);
        Some(book)
    }

    pub fn get(&self, symbol: &str) -> Option<&OrderBook> {
        self.books.get(symbol)
    }

    pub fn remove(&mut self, symbol: &str) -> Option<OrderBook> {
        self.books.remove(symbol)
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    /// Marks every book stale and drops them all.
    pub fn invalidate(&mut self) {
        for book in self.books.values_mut() {
            book.mark_stale();
        }
        self.books.clear();
    }
}
