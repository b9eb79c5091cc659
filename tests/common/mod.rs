//! Shared test utilities and constants.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use kraken_stream::markets::{Markets, SymbolMetadata};

/// Kraken WebSocket v1 public endpoint URL.
pub const KRAKEN_WS_URL: &str = "wss://ws.kraken.com";

/// Helper to get the path to test fixtures directory.
pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

/// Reads and parses a JSON fixture.
pub fn fixture(name: &str) -> serde_json::Value {
    let content = std::fs::read_to_string(fixtures_dir().join(name))
        .unwrap_or_else(|e| panic!("Failed to read fixture {name}: {e}"));
    serde_json::from_str(&content).unwrap_or_else(|e| panic!("Invalid fixture {name}: {e}"))
}

/// Market metadata built from the `AssetPairs` fixture.
pub fn test_markets() -> Arc<dyn SymbolMetadata> {
    let body = std::fs::read_to_string(fixtures_dir().join("asset_pairs.json"))
        .expect("Failed to read asset pairs fixture");
    Arc::new(Markets::from_asset_pairs(&body).expect("Failed to parse asset pairs"))
}
