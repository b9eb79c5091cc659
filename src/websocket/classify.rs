//! Server error text to typed rejection.
//!
//! Exact matches are tried first, then substring ("broad") matches. Broad
//! patterns are looser and must never shadow an exact classification.

use crate::error::{ErrorKind, RequestError};

#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    exact: Vec<(String, ErrorKind)>,
    broad: Vec<(String, ErrorKind)>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::kraken()
    }
}

impl ErrorClassifier {
    /// Classifier with no patterns; everything maps to [`ErrorKind::Exchange`].
    #[must_use]
    pub fn empty() -> Self {
        Self {
            exact: Vec::new(),
            broad: Vec::new(),
        }
    }

    /// Error texts returned by the Kraken v1 public WebSocket API.
    #[must_use]
    pub fn kraken() -> Self {
        Self::empty()
            .with_exact("Event(s) not found", ErrorKind::BadRequest)
            .with_exact("Subscription depth not supported", ErrorKind::BadRequest)
            .with_exact("Subscription ohlc interval not supported", ErrorKind::BadRequest)
            .with_exact("Already subscribed", ErrorKind::BadRequest)
            .with_broad("Currency pair not in ISO 4217-A3 format", ErrorKind::BadSymbol)
            .with_broad("Currency pair not supported", ErrorKind::BadSymbol)
            .with_broad("Subscription name invalid", ErrorKind::BadRequest)
    }

    #[must_use]
    pub fn with_exact(mut self, message: &str, kind: ErrorKind) -> Self {
        self.exact.push((message.to_string(), kind));
        self
    }

    #[must_use]
    pub fn with_broad(mut self, pattern: &str, kind: ErrorKind) -> Self {
        self.broad.push((pattern.to_string(), kind));
        self
    }

    pub fn classify(&self, message: &str) -> ErrorKind {
        if let Some((_, kind)) = self.exact.iter().find(|(m, _)| m == message) {
            return *kind;
        }
        self.broad
            .iter()
            .find(|(pattern, _)| message.contains(pattern.as_str()))
            .map_or(ErrorKind::Exchange, |(_, kind)| *kind)
    }

    /// Builds the rejection for `message`, keeping the server text.
    pub fn to_error(&self, message: &str) -> RequestError {
        self.classify(message).into_error(message)
    }
}
