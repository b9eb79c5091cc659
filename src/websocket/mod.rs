//! Async streaming client for the Kraken WebSocket v1 public API.
//!
//! This module is organized by concern:
//! - [`codec`] - Frame classification and payload decoding
//! - [`registry`] - Channel id to subscription mapping
//! - [`pending`] - One-shot and stream slots awaited by callers
//! - [`classify`] - Server error text to typed errors
//! - [`dispatcher`] - Per-connection state and frame routing
//! - [`connection`] - The task that drives one socket
//! - [`client`] - Caller-facing handle

pub mod classify;
pub mod client;
pub mod codec;
pub mod connection;
pub mod dispatcher;
pub mod pending;
pub mod registry;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};
use tungstenite::Message;

use crate::Result;

pub use client::{StreamClient, Watch};
pub use dispatcher::{Dispatched, Dispatcher};
pub use pending::{StreamHandle, StreamValue};

/// Write half of a Kraken WebSocket connection.
pub type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Read half of a Kraken WebSocket connection.
pub type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Establishes a WebSocket connection to the given URL.
///
/// # Errors
///
/// Returns a [`StreamError`](crate::StreamError) if the connection or TLS handshake fails.
pub async fn connect(url: &str) -> Result<(WsWriter, WsReader)> {
    let (ws_stream, _) = connect_async(url).await?;
    info!(url, "WebSocket handshake completed");

    Ok(ws_stream.split())
}

/// Serializes `request` and sends it as a text frame.
///
/// # Errors
///
/// Returns a [`StreamError`](crate::StreamError) if serialization or sending fails.
pub async fn send_request<T: Serialize>(write: &mut WsWriter, request: &T) -> Result<()> {
    let json = serde_json::to_string(request)?;
    debug!(request = %json, "Sending request");
    write.send(Message::Text(json.into())).await?;

    Ok(())
}
