//! Kraken WebSocket v1 streaming client library.
//!
//! Maintains order books, tickers, trades and candles from Kraken's public
//! WebSocket API. One connection task owns all per-connection state; callers
//! hold a cheap [`StreamClient`](websocket::StreamClient) and await typed
//! streams.

pub mod config;
pub mod error;
pub mod markets;
pub mod models;
pub mod orderbook;
pub mod websocket;

pub use error::{RequestError, Result, StreamError};
