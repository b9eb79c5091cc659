//! Symbol metadata: translation between unified symbols and Kraken
//! WebSocket pair names.
//!
//! Unified symbols use common currency codes (`BTC/USD`), while the
//! WebSocket API uses Kraken's own codes (`XBT/USD`). The connection holds
//! a [`SymbolMetadata`] implementation for its whole lifetime; [`Markets`]
//! is the in-memory one shipped with the crate.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::debug;

use crate::Result;
use crate::error::StreamError;

/// Lookup between unified symbols and exchange-native WebSocket names.
pub trait SymbolMetadata: Send + Sync {
    /// WebSocket pair name for a unified symbol.
    fn native_name(&self, symbol: &str) -> Option<String>;

    /// Unified symbol for a WebSocket pair name.
    fn symbol_for(&self, native_name: &str) -> Option<String>;
}

/// Kraken currency codes that differ from the common ones.
fn common_currency_code(code: &str) -> &str {
    match code {
        "XBT" => "BTC",
        "XDG" => "DOGE",
        other => other,
    }
}

/// Unified symbol for a `BASE/QUOTE` WebSocket name.
fn unified_symbol(ws_name: &str) -> Option<String> {
    let (base, quote) = ws_name.split_once('/')?;
    Some(format!(
        "{}/{}",
        common_currency_code(base),
        common_currency_code(quote)
    ))
}

/// Entry of the REST `AssetPairs` result, reduced to what the stream needs.
#[derive(Debug, Deserialize)]
struct AssetPairInfo {
    #[serde(default)]
    wsname: Option<String>,
}

/// Envelope of the REST `AssetPairs` response.
#[derive(Debug, Deserialize)]
struct AssetPairsResponse {
    #[serde(default)]
    error: Vec<String>,
    #[serde(default)]
    result: HashMap<String, AssetPairInfo>,
}

/// In-memory two-way symbol map.
#[derive(Debug, Clone, Default)]
pub struct Markets {
    by_symbol: HashMap<String, String>,
    by_native: HashMap<String, String>,
}

impl Markets {
    /// Builds the map from `(unified symbol, websocket name)` pairs.
    pub fn from_pairs<I, S, N>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, N)>,
        S: Into<String>,
        N: Into<String>,
    {
        let mut markets = Markets::default();
        for (symbol, native) in pairs {
            markets.insert(symbol.into(), native.into());
        }
        markets
    }

    /// Builds the map from WebSocket names alone, deriving unified symbols.
    pub fn from_ws_names<I, N>(names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: AsRef<str>,
    {
        let mut markets = Markets::default();
        for name in names {
            let name = name.as_ref();
            if let Some(symbol) = unified_symbol(name) {
                markets.insert(symbol, name.to_string());
            }
        }
        markets
    }

    /// Parses the body of a Kraken REST `AssetPairs` response.
    ///
    /// Dark-pool pairs (ids ending in `.d`) and pairs without a WebSocket
    /// name are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Json`] if the body is not valid JSON, or
    /// [`StreamError::MalformedMessage`] if the response carries errors.
    pub fn from_asset_pairs(body: &str) -> Result<Self> {
        let response: AssetPairsResponse = serde_json::from_str(body)?;
        if !response.error.is_empty() {
            return Err(StreamError::MalformedMessage(response.error.join(", ")));
        }

        let mut markets = Markets::default();
        for (id, info) in response.result {
            if id.ends_with(".d") {
                continue;
            }
            let Some(ws_name) = info.wsname else {
                debug!(id = %id, "Skipping pair without websocket name");
                continue;
            };
            if let Some(symbol) = unified_symbol(&ws_name) {
                markets.insert(symbol, ws_name);
            }
        }
        Ok(markets)
    }

    fn insert(&mut self, symbol: String, native: String) {
        self.by_native.insert(native.clone(), symbol.clone());
        self.by_symbol.insert(symbol, native);
    }

    pub fn len(&self) -> usize {
        self.by_symbol.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_symbol.is_empty()
    }
}

impl SymbolMetadata for Markets {
    fn native_name(&self, symbol: &str) -> Option<String> {
        self.by_symbol.get(symbol).cloned()
    }

    fn symbol_for(&self, native_name: &str) -> Option<String> {
        self.by_native.get(native_name).cloned()
    }
}
