//! Application configuration loaded from environment variables.
//!
//! All variables are optional:
//! - `KRAKEN_WEBSOCKET_URL` - public WebSocket endpoint
//! - `KRAKEN_BOOK_DEPTH` - default order book depth (10, 25, 100, 500 or 1000)
//! - `KRAKEN_REQUEST_TIMEOUT_MS` - how long a subscribe request may wait for its ack

use std::time::Duration;

use crate::models::book::BookDepth;

/// Default public WebSocket endpoint.
const DEFAULT_WEBSOCKET_URL: &str = "wss://ws.kraken.com";

/// Default time a pending request may wait for its acknowledgment.
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub kraken: KrakenConfig,
}

/// Kraken-specific configuration values.
#[derive(Debug, Clone)]
pub struct KrakenConfig {
    pub websocket_url: String,
    pub book_depth: BookDepth,
    pub request_timeout: Duration,
}

impl Default for KrakenConfig {
    fn default() -> Self {
        Self {
            websocket_url: DEFAULT_WEBSOCKET_URL.to_string(),
            book_depth: BookDepth::default(),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }
}

/// Loads the application configuration from environment variables.
///
/// # Errors
///
/// Returns [`StreamError::Config`](crate::StreamError::Config) if the book
/// depth is not one Kraken supports or the timeout is not a positive
/// integer.
pub fn fetch_config() -> crate::Result<AppConfig> {
    let websocket_url = non_empty_var("KRAKEN_WEBSOCKET_URL")
        .unwrap_or_else(|| DEFAULT_WEBSOCKET_URL.to_string());

    let book_depth = match non_empty_var("KRAKEN_BOOK_DEPTH") {
        Some(raw) => {
            let depth: u16 = raw.parse().map_err(|_| {
                crate::StreamError::Config(format!("KRAKEN_BOOK_DEPTH is not a number: {raw}"))
            })?;
            BookDepth::from_u16(depth).ok_or_else(|| {
                crate::StreamError::Config(format!(
                    "KRAKEN_BOOK_DEPTH must be one of 10, 25, 100, 500, 1000 (got {depth})"
                ))
            })?
        }
        None => BookDepth::default(),
    };

    let timeout_ms = match non_empty_var("KRAKEN_REQUEST_TIMEOUT_MS") {
        Some(raw) => match raw.parse::<u64>() {
            Ok(ms) if ms > 0 => ms,
            _ => {
                return Err(crate::StreamError::Config(format!(
                    "KRAKEN_REQUEST_TIMEOUT_MS must be a positive integer (got {raw})"
                )));
            }
        },
        None => DEFAULT_REQUEST_TIMEOUT_MS,
    };

    Ok(AppConfig {
        kraken: KrakenConfig {
            websocket_url,
            book_depth,
            request_timeout: Duration::from_millis(timeout_ms),
        },
    })
}

/// Returns the value of an environment variable if it exists and is non-empty.
fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}
