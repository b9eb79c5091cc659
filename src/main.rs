use std::sync::Arc;

use kraken_stream::StreamError;
use kraken_stream::config::fetch_config;
use kraken_stream::markets::Markets;
use kraken_stream::websocket::StreamClient;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), StreamError> {
    // Initialize tracing subscriber for logging output.
    tracing_subscriber::fmt::init();

    let app_config = fetch_config()?;
    let markets = Markets::from_ws_names(["XBT/USD", "ETH/USD"]);

    let client = StreamClient::connect(&app_config.kraken, Arc::new(markets)).await?;

    // Kraken sends its system status on connect, ahead of any subscription data.
    let (view, mut book) = client.watch_order_book("BTC/USD", Some(10)).await?;
    if let Some(status) = client.system_status().await? {
        info!(status = %status.status, "Exchange status");
    }
    info!(symbol = %view.symbol, levels = view.bids.len(), "Order book snapshot");

    let (tick, mut ticker) = client.watch_ticker("ETH/USD").await?;
    info!(symbol = %tick.symbol, last = %tick.last, "Ticker");

    loop {
        tokio::select! {
            view = book.next() => {
                let view = view?;
                info!(
                    symbol = %view.symbol,
                    best_bid = ?view.best_bid().map(|l| l.price),
                    best_ask = ?view.best_ask().map(|l| l.price),
                    stale = view.stale,
                    "Order book"
                );
            }
            tick = ticker.next() => {
                let tick = tick?;
                info!(symbol = %tick.symbol, last = %tick.last, "Ticker");
            }
            _ = tokio::signal::ctrl_c() => {
                client.close().await;
                return Ok(());
            }
        }
    }
}
