//! Caller-facing handle on a streaming connection.
//!
//! [`StreamClient`] is cheap to clone; every clone talks to the same
//! connection task. The channel `watch_*` methods subscribe (or reuse an
//! existing subscription), wait for the server ack and the first value, and
//! return that value with a [`Watch`] whose [`next`](Watch::next) yields
//! each later value as it arrives.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::connection::{Command, Connection};
use super::dispatcher::Dispatcher;
use super::pending::{StreamHandle, StreamValue};
use super::{connect, send_request};
use crate::Result;
use crate::config::KrakenConfig;
use crate::error::RequestError;
use crate::markets::SymbolMetadata;
use crate::models::book::BookDepth;
use crate::models::candle::{Ohlcv, timeframe_minutes};
use crate::models::ticker::Ticker;
use crate::models::trade::Trade;
use crate::models::{Channel, SubscriptionParams, SystemStatusEvent};
use crate::orderbook::OrderBookView;

type Extract<T> = Box<dyn Fn(StreamValue) -> Option<T> + Send + Sync>;

/// Typed view of a stream slot.
pub struct Watch<T> {
    handle: StreamHandle,
    extract: Extract<T>,
}

impl<T> Watch<T> {
    fn new(
        handle: StreamHandle,
        extract: impl Fn(StreamValue) -> Option<T> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handle,
            extract: Box::new(extract),
        }
    }

    async fn with_first(mut self) -> Result<(T, Self)> {
        let first = self.next().await?;
        Ok((first, self))
    }

    pub fn message_hash(&self) -> &str {
        self.handle.message_hash()
    }

    /// Waits for the next value.
    ///
    /// # Errors
    ///
    /// Returns the terminal error of the stream: `ConnectionClosed` on
    /// disconnect, `Unsubscribed` after an unsubscribe, or the rejection of
    /// the subscribe request.
    pub async fn next(&mut self) -> Result<T> {
        loop {
            let value = self.handle.next().await?;
            if let Some(value) = (self.extract)(value) {
                return Ok(value);
            }
        }
    }
}

/// Handle on one streaming connection.
#[derive(Clone)]
pub struct StreamClient {
    commands: mpsc::UnboundedSender<Command>,
    task: Arc<Mutex<Option<JoinHandle<Dispatcher>>>>,
    book_depth: BookDepth,
}

impl StreamClient {
    /// Opens a connection to the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns a [`StreamError`](crate::StreamError) if the WebSocket
    /// handshake fails.
    pub async fn connect(config: &KrakenConfig, metadata: Arc<dyn SymbolMetadata>) -> Result<Self> {
        Self::start(config, Dispatcher::new(metadata, config.book_depth)).await
    }

    /// Opens a new connection for the dispatcher of a closed one and
    /// replays its subscriptions.
    ///
    /// Streams from the previous connection have ended; callers watch again
    /// to get new ones.
    ///
    /// # Errors
    ///
    /// Returns a [`StreamError`](crate::StreamError) if the handshake or a
    /// replayed request fails.
    pub async fn resume(config: &KrakenConfig, dispatcher: Dispatcher) -> Result<Self> {
        Self::start(config, dispatcher).await
    }

    async fn start(config: &KrakenConfig, mut dispatcher: Dispatcher) -> Result<Self> {
        let (mut write, read) = connect(&config.websocket_url).await?;

        let replay = dispatcher.replay_subscriptions();
        for request in &replay {
            send_request(&mut write, request).await?;
        }
        if !replay.is_empty() {
            info!(count = replay.len(), "Replayed subscriptions");
        }

        let (commands, cmd_rx) = mpsc::unbounded_channel();
        let connection = Connection::new(dispatcher, write, cmd_rx, config.request_timeout);
        let task = tokio::spawn(connection.run(read));

        Ok(Self {
            commands,
            task: Arc::new(Mutex::new(Some(task))),
            book_depth: config.book_depth,
        })
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| RequestError::ConnectionClosed.into())
    }

    async fn subscribe(
        &self,
        channel: Channel,
        symbol: &str,
        params: SubscriptionParams,
    ) -> Result<StreamHandle> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Subscribe {
            channel,
            symbol: symbol.to_string(),
            params,
            reply,
        })?;
        let subscribed = rx.await.map_err(|_| RequestError::ConnectionClosed)??;

        if let Some(ack) = subscribed.ack {
            ack.await.map_err(|_| RequestError::ConnectionClosed)??;
        }
        Ok(subscribed.stream)
    }

    /// Streams the order book for `symbol`, starting with the first view.
    ///
    /// `limit` picks the smallest Kraken depth holding that many levels and
    /// caps each published view; without it the configured depth is used.
    ///
    /// # Errors
    ///
    /// Returns `UnknownSymbol` for a symbol without market metadata,
    /// `BadRequest` if the pair is already subscribed at another depth, the
    /// classified rejection of the subscribe request, or the error that ends
    /// the stream before a first view arrives.
    pub async fn watch_order_book(
        &self,
        symbol: &str,
        limit: Option<usize>,
    ) -> Result<(OrderBookView, Watch<OrderBookView>)> {
        let depth = limit.map_or(self.book_depth, BookDepth::covering);
        let params = SubscriptionParams::new(Channel::Book).with_depth(depth.as_u16());
        let handle = self.subscribe(Channel::Book, symbol, params).await?;

        Watch::new(handle, move |value| match value {
            StreamValue::OrderBook(view) => Some(match limit {
                Some(n) => view.truncated(n),
                None => view,
            }),
            _ => None,
        })
        .with_first()
        .await
    }

    /// Streams ticker updates for `symbol`, starting with the first one.
    ///
    /// # Errors
    ///
    /// See [`StreamClient::watch_order_book`].
    pub async fn watch_ticker(&self, symbol: &str) -> Result<(Ticker, Watch<Ticker>)> {
        let params = SubscriptionParams::new(Channel::Ticker);
        let handle = self.subscribe(Channel::Ticker, symbol, params).await?;

        Watch::new(handle, |value| match value {
            StreamValue::Ticker(ticker) => Some(ticker),
            _ => None,
        })
        .with_first()
        .await
    }

    /// Streams batches of public trades for `symbol`.
    ///
    /// # Errors
    ///
    /// See [`StreamClient::watch_order_book`].
    pub async fn watch_trades(&self, symbol: &str) -> Result<(Vec<Trade>, Watch<Vec<Trade>>)> {
        let params = SubscriptionParams::new(Channel::Trade);
        let handle = self.subscribe(Channel::Trade, symbol, params).await?;

        Watch::new(handle, |value| match value {
            StreamValue::Trades(trades) => Some(trades),
            _ => None,
        })
        .with_first()
        .await
    }

    /// Streams candles for `symbol` at `timeframe` (`1m` to `2w`).
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` for an unsupported timeframe, or if the pair is
    /// already subscribed at another timeframe; otherwise see
    /// [`StreamClient::watch_order_book`].
    pub async fn watch_ohlcv(
        &self,
        symbol: &str,
        timeframe: &str,
    ) -> Result<(Ohlcv, Watch<Ohlcv>)> {
        let interval = timeframe_minutes(timeframe).ok_or_else(|| {
            RequestError::BadRequest(format!("unsupported timeframe {timeframe}"))
        })?;
        let params = SubscriptionParams::new(Channel::Ohlc).with_interval(interval);
        let handle = self.subscribe(Channel::Ohlc, symbol, params).await?;

        Watch::new(handle, |value| match value {
            StreamValue::Ohlcv(candle) => Some(candle),
            _ => None,
        })
        .with_first()
        .await
    }

    /// Streams the heartbeats the server sends while no data is flowing.
    ///
    /// Returns without waiting for a heartbeat; a busy connection may not
    /// send one for a long time.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionClosed` if the connection has ended.
    pub async fn watch_heartbeat(&self) -> Result<Watch<()>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::WatchHeartbeat { reply })?;
        let handle = rx.await.map_err(|_| RequestError::ConnectionClosed)?;

        Ok(Watch::new(handle, |value| match value {
            StreamValue::Heartbeat => Some(()),
            _ => None,
        }))
    }

    /// Streams every pong received, yielding the echoed request id.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionClosed` if the connection has ended.
    pub async fn watch_pong(&self) -> Result<Watch<Option<u64>>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::WatchPong { reply })?;
        let handle = rx.await.map_err(|_| RequestError::ConnectionClosed)?;

        Ok(Watch::new(handle, |value| match value {
            StreamValue::Pong(reqid) => Some(reqid),
            _ => None,
        }))
    }

    /// Private balance streaming has no handler on the public connection.
    ///
    /// # Errors
    ///
    /// Always returns `NotImplemented`.
    pub async fn watch_balance(&self) -> Result<()> {
        Err(RequestError::NotImplemented("watch_balance".to_string()).into())
    }

    /// Cancels the subscription to `channel` for `symbol`.
    ///
    /// Every [`Watch`] on it ends with `Unsubscribed`.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` if nothing is subscribed, or the rejection of
    /// the unsubscribe request.
    pub async fn unsubscribe(&self, channel: Channel, symbol: &str) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Unsubscribe {
            channel,
            symbol: symbol.to_string(),
            reply,
        })?;
        let ack = rx.await.map_err(|_| RequestError::ConnectionClosed)??;
        ack.await.map_err(|_| RequestError::ConnectionClosed)??;
        Ok(())
    }

    /// Round-trips a ping.
    ///
    /// # Errors
    ///
    /// Returns `RequestTimeout` if no pong arrives in time.
    pub async fn ping(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Ping { reply })?;
        let ack = rx.await.map_err(|_| RequestError::ConnectionClosed)?;
        ack.await.map_err(|_| RequestError::ConnectionClosed)??;
        Ok(())
    }

    /// Latest system status reported by the server.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionClosed` if the connection has ended.
    pub async fn system_status(&self) -> Result<Option<SystemStatusEvent>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::SystemStatus { reply })?;
        Ok(rx.await.map_err(|_| RequestError::ConnectionClosed)?)
    }

    /// Waits for the connection task to end and returns its dispatcher.
    ///
    /// Returns `None` if another handle already joined the task.
    pub async fn join(&self) -> Option<Dispatcher> {
        let task = self.task.lock().await.take()?;
        match task.await {
            Ok(dispatcher) => Some(dispatcher),
            Err(e) => {
                warn!("Connection task failed: {e}");
                None
            }
        }
    }

    /// Closes the connection and waits for it to shut down.
    pub async fn close(&self) -> Option<Dispatcher> {
        // Already closed if the task has gone.
        let _ = self.commands.send(Command::Close);
        self.join().await
    }
}
