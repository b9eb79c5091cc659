//! The task that drives one WebSocket connection.
//!
//! [`Connection`] owns the write half of the socket and the
//! [`Dispatcher`]. It multiplexes inbound frames, caller commands and a
//! periodic timeout sweep in one loop, so frames are always processed in
//! arrival order and the dispatcher never needs a lock. Reconnecting is
//! left to the caller: when the loop exits every waiter is rejected and the
//! dispatcher is handed back for [`StreamClient::resume`](super::StreamClient::resume).

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use tungstenite::Message as WsMessage;

use super::dispatcher::{Dispatched, Dispatcher};
use super::pending::{AckReceiver, StreamHandle};
use super::{WsReader, WsWriter, send_request};
use crate::Result;
use crate::models::{Channel, SubscriptionParams, SystemStatusEvent};

/// How often pending requests are checked for timeouts.
const SWEEP_INTERVAL: Duration = Duration::from_millis(250);

/// Reply to a subscribe command.
#[derive(Debug)]
pub struct Subscribed {
    pub ack: Option<AckReceiver>,
    pub stream: StreamHandle,
}

/// Commands sent from [`StreamClient`](super::StreamClient) handles.
#[derive(Debug)]
pub enum Command {
    Subscribe {
        channel: Channel,
        symbol: String,
        params: SubscriptionParams,
        reply: oneshot::Sender<Result<Subscribed>>,
    },
    Unsubscribe {
        channel: Channel,
        symbol: String,
        reply: oneshot::Sender<Result<AckReceiver>>,
    },
    Ping {
        reply: oneshot::Sender<AckReceiver>,
    },
    WatchHeartbeat {
        reply: oneshot::Sender<StreamHandle>,
    },
    WatchPong {
        reply: oneshot::Sender<StreamHandle>,
    },
    SystemStatus {
        reply: oneshot::Sender<Option<SystemStatusEvent>>,
    },
    Close,
}

/// Why the read loop exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DisconnectReason {
    /// The connection was lost or errored.
    ConnectionError,
    /// The server sent a close frame.
    ServerClosed,
    /// A close was requested or every client handle was dropped.
    Shutdown,
}

pub struct Connection {
    dispatcher: Dispatcher,
    write: WsWriter,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    request_timeout: Duration,
}

impl Connection {
    #[must_use]
    pub fn new(
        dispatcher: Dispatcher,
        write: WsWriter,
        cmd_rx: mpsc::UnboundedReceiver<Command>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            dispatcher,
            write,
            cmd_rx,
            request_timeout,
        }
    }

    /// Runs until the socket closes or the connection is shut down, then
    /// rejects every outstanding request and stream.
    ///
    /// Returns the dispatcher, whose subscriptions can be replayed on a new
    /// connection.
    pub async fn run(mut self, mut read: WsReader) -> Dispatcher {
        let reason = self.read_loop(&mut read).await;

        match reason {
            DisconnectReason::Shutdown => {
                info!("Closing WebSocket connection");
                if let Err(e) = self.write.close().await {
                    debug!("Close handshake failed: {e}");
                }
            }
            DisconnectReason::ServerClosed => info!("Server closed the connection"),
            DisconnectReason::ConnectionError => warn!("Connection lost"),
        }

        self.dispatcher.on_disconnect();
        self.dispatcher
    }

    async fn read_loop(&mut self, read: &mut WsReader) -> DisconnectReason {
        let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(WsMessage::Text(text))) => self.on_text(&text),
                        Some(Ok(WsMessage::Close(frame))) => {
                            debug!(?frame, "Received close frame");
                            return DisconnectReason::ServerClosed;
                        }
                        Some(Ok(_)) => {} // Binary/Ping/Pong frames
                        Some(Err(e)) => {
                            warn!("WebSocket error: {e}");
                            return DisconnectReason::ConnectionError;
                        }
                        None => {
                            warn!("WebSocket stream ended");
                            return DisconnectReason::ConnectionError;
                        }
                    }
                }

                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(Command::Close) | None => return DisconnectReason::Shutdown,
                        Some(cmd) => {
                            if let Err(e) = self.on_command(cmd).await {
                                warn!("Failed to send request: {e}");
                                return DisconnectReason::ConnectionError;
                            }
                        }
                    }
                }

                _ = sweep.tick() => self.dispatcher.expire(self.request_timeout),
            }
        }
    }

    fn on_text(&mut self, text: &str) {
        match self.dispatcher.dispatch_text(text) {
            Ok(Dispatched::Handled) => {}
            Ok(Dispatched::PassThrough(frame)) => debug!(%frame, "Unhandled frame"),
            Err(e) => warn!("Discarding frame: {e}"),
        }
    }

    async fn on_command(&mut self, cmd: Command) -> Result<()> {
        // Reply errors mean the caller stopped waiting.
        match cmd {
            Command::Subscribe {
                channel,
                symbol,
                params,
                reply,
            } => match self.dispatcher.subscribe(channel, &symbol, params) {
                Ok(outcome) => {
                    if let Some(request) = &outcome.request {
                        send_request(&mut self.write, request).await?;
                    }
                    let _ = reply.send(Ok(Subscribed {
                        ack: outcome.ack,
                        stream: outcome.stream,
                    }));
                }
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            },
            Command::Unsubscribe {
                channel,
                symbol,
                reply,
            } => match self.dispatcher.unsubscribe(channel, &symbol) {
                Ok((request, ack)) => {
                    send_request(&mut self.write, &request).await?;
                    let _ = reply.send(Ok(ack));
                }
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            },
            Command::Ping { reply } => {
                let (request, ack) = self.dispatcher.ping();
                send_request(&mut self.write, &request).await?;
                let _ = reply.send(ack);
            }
            Command::WatchHeartbeat { reply } => {
                let _ = reply.send(self.dispatcher.watch_heartbeat());
            }
            Command::WatchPong { reply } => {
                let _ = reply.send(self.dispatcher.watch_pong());
            }
            Command::SystemStatus { reply } => {
                let _ = reply.send(self.dispatcher.system_status().cloned());
            }
            Command::Close => {}
        }
        Ok(())
    }
}
