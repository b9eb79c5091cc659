//! Crate-level error types.
//!
//! [`StreamError`] unifies every error source (configuration, WebSocket,
//! JSON, exchange rejections) behind a single enum so callers can match on
//! the variant they care about while still using the `?` operator for easy
//! propagation.
//!
//! [`RequestError`] is the narrower, cloneable value delivered through
//! pending request futures and stream slots. A single rejection may reach
//! several awaiters, so it carries owned text rather than source errors.

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StreamError>;

/// Top-level error type returned by all public APIs.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Configuration could not be read or validated.
    #[error("configuration error: {0}")]
    Config(String),

    /// A WebSocket operation (connect, send, receive) failed.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// An inbound frame did not match any known shape.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// No market metadata is known for the symbol.
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    /// A pending request or stream was rejected.
    #[error(transparent)]
    Request(#[from] RequestError),
}

/// Rejection value for one-shot requests and stream slots.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// The exchange rejected the request as invalid.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The exchange did not recognise the requested pair.
    #[error("bad symbol: {0}")]
    BadSymbol(String),

    /// Any other error reported by the exchange.
    #[error("exchange error: {0}")]
    Exchange(String),

    /// The operation has no handler wired up.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// No acknowledgment arrived within the request timeout.
    #[error("request {reqid} timed out")]
    RequestTimeout { reqid: u64 },

    /// The connection closed before the request completed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The stream ended because its subscription was cancelled.
    #[error("unsubscribed from {0}")]
    Unsubscribed(String),
}

/// Classification assigned to a server error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    BadSymbol,
    Exchange,
}

impl ErrorKind {
    /// Builds the rejection value for this kind, carrying the server text.
    #[must_use]
    pub fn into_error(self, message: &str) -> RequestError {
        match self {
            ErrorKind::BadRequest => RequestError::BadRequest(message.to_string()),
            ErrorKind::BadSymbol => RequestError::BadSymbol(message.to_string()),
            ErrorKind::Exchange => RequestError::Exchange(message.to_string()),
        }
    }
}
