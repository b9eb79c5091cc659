//! Decoding tests for Kraken WebSocket v1 frames captured from the API docs.

mod common;

use rust_decimal_macros::dec;

use common::fixture;
use kraken_stream::markets::{Markets, SymbolMetadata};
use kraken_stream::models::candle::Ohlcv;
use kraken_stream::models::ticker::Ticker;
use kraken_stream::models::trade::{Trade, TradeOrderType, TradeSide};
use kraken_stream::models::{
    Channel, HeartbeatEvent, SubscriptionStatusEvent, SystemStatusEvent,
};
use kraken_stream::websocket::codec::{self, ChannelPayload, Frame, SequenceFrame};

fn sequence(name: &str) -> SequenceFrame {
    match codec::decode(fixture(name)) {
        Frame::Sequence(frame) => frame,
        other => panic!("{name} is not a sequence frame: {other:?}"),
    }
}

#[test]
fn test_book_snapshot_decodes() {
    let frame = sequence("book_snapshot.json");
    assert_eq!(frame.channel_id, 336);
    assert_eq!(frame.channel(), Some(Channel::Book));

    let payload = codec::decode_payload(Channel::Book, &frame).expect("Failed to decode book");
    let ChannelPayload::BookSnapshot(snapshot) = payload else {
        panic!("Expected a snapshot");
    };

    assert_eq!(snapshot.asks.len(), 3);
    assert_eq!(snapshot.bids.len(), 3);
    assert_eq!(snapshot.asks[0].price, dec!(5541.30000));
    assert_eq!(snapshot.asks[0].volume, dec!(2.50700000));
    assert_eq!(snapshot.bids[2].volume, dec!(5.00000000));
    assert_eq!(snapshot.bids[2].timestamp, dec!(1534613831.243486));
    assert!(!snapshot.asks[0].republish);
}

#[test]
fn test_book_update_merges_both_parts() {
    let frame = sequence("book_update.json");
    assert_eq!(frame.payloads.len(), 2);

    let payload = codec::decode_payload(Channel::Book, &frame).expect("Failed to decode book");
    let ChannelPayload::BookUpdate(update) = payload else {
        panic!("Expected an update");
    };

    assert_eq!(update.asks.len(), 2);
    assert_eq!(update.bids.len(), 1);
    assert_eq!(update.bids[0].volume, dec!(0));
    assert_eq!(update.checksum, None);
}

#[test]
fn test_ticker_translates() {
    let frame = sequence("ticker.json");
    let payload = codec::decode_payload(Channel::Ticker, &frame).expect("Failed to decode ticker");
    let ChannelPayload::Ticker(raw) = payload else {
        panic!("Expected a ticker");
    };

    let ticker = Ticker::from_payload("BTC/USD", &raw, 1_700_000_000_000);

    assert_eq!(ticker.symbol, "BTC/USD");
    assert_eq!(ticker.timestamp, 1_700_000_000_000);
    assert_eq!(ticker.ask, dec!(5525.40000));
    assert_eq!(ticker.bid, dec!(5525.10000));
    assert_eq!(ticker.last, dec!(5525.10000));
    assert_eq!(ticker.close, ticker.last);
    assert_eq!(ticker.high, dec!(5783.00000));
    assert_eq!(ticker.low, dec!(5505.00000));
    assert_eq!(ticker.open, dec!(5760.70000));
    assert_eq!(ticker.vwap, dec!(5631.44067));
    assert_eq!(ticker.base_volume, dec!(2634.11501494));
    assert_eq!(
        ticker.quote_volume,
        Some(dec!(2634.11501494) * dec!(5631.44067))
    );
    assert_eq!(ticker.trades, 11493);
}

#[test]
fn test_trades_translate() {
    let frame = sequence("trade.json");
    let payload = codec::decode_payload(Channel::Trade, &frame).expect("Failed to decode trades");
    let ChannelPayload::Trades(entries) = payload else {
        panic!("Expected trades");
    };

    let trades: Vec<Trade> = entries
        .iter()
        .filter_map(|entry| Trade::from_entry("BTC/USD", entry))
        .collect();

    assert_eq!(trades.len(), 2);
    assert_eq!(trades[0].side, TradeSide::Sell);
    assert_eq!(trades[0].order_type, Some(TradeOrderType::Limit));
    assert_eq!(trades[0].timestamp, 1_534_614_057_321);
    assert_eq!(trades[1].side, TradeSide::Buy);
    assert_eq!(trades[1].order_type, Some(TradeOrderType::Market));
    assert_eq!(trades[1].cost, dec!(6060.00000) * dec!(0.02455000));
}

#[test]
fn test_ohlc_translates() {
    let frame = sequence("ohlc.json");
    assert_eq!(frame.channel_name, "ohlc-5");

    let payload = codec::decode_payload(Channel::Ohlc, &frame).expect("Failed to decode ohlc");
    let ChannelPayload::Ohlc(raw) = payload else {
        panic!("Expected a candle");
    };

    let candle = Ohlcv::from_payload("BTC/USD", &raw).expect("Candle out of range");

    assert_eq!(candle.timestamp, 1_542_057_314_748);
    assert_eq!(candle.open, dec!(3586.70000));
    assert_eq!(candle.high, dec!(3586.70000));
    assert_eq!(candle.low, dec!(3586.60000));
    assert_eq!(candle.close, dec!(3586.60000));
    assert_eq!(candle.volume, dec!(0.03373000));
}

#[test]
fn test_subscription_status_deserializes() {
    let event: SubscriptionStatusEvent = serde_json::from_value(fixture("subscription_status.json"))
        .expect("Failed to deserialize subscription status");

    assert_eq!(event.status, "subscribed");
    assert_eq!(event.channel_id, Some(336));
    assert_eq!(event.channel_name.as_deref(), Some("book-10"));
    assert_eq!(event.pair.as_deref(), Some("XBT/USD"));
    assert_eq!(event.reqid, Some(1));
    let subscription = event.subscription.expect("Missing subscription");
    assert_eq!(subscription.name, "book");
    assert_eq!(subscription.depth, Some(10));
}

#[test]
fn test_subscription_error_is_an_event_frame() {
    let Frame::Event(event) = codec::decode(fixture("subscription_error.json")) else {
        panic!("Expected an event frame");
    };

    assert_eq!(event.reqid, Some(1));
    assert_eq!(
        event.error_message.as_deref(),
        Some("Currency pair not in ISO 4217-A3 format foobar")
    );
}

#[test]
fn test_system_status_and_heartbeat_deserialize() {
    let status: SystemStatusEvent =
        serde_json::from_value(fixture("system_status.json")).expect("Failed to deserialize");
    assert_eq!(status.status, "online");
    assert_eq!(status.connection_id, Some(8_628_615_390_848_610_000));
    assert_eq!(status.version.as_deref(), Some("1.0.0"));

    let heartbeat: HeartbeatEvent =
        serde_json::from_value(fixture("heartbeat.json")).expect("Failed to deserialize");
    assert_eq!(heartbeat.event, "heartbeat");
}

#[test]
fn test_asset_pairs_build_markets() {
    let body = std::fs::read_to_string(common::fixtures_dir().join("asset_pairs.json"))
        .expect("Failed to read fixture");
    let markets = Markets::from_asset_pairs(&body).expect("Failed to parse asset pairs");

    assert_eq!(markets.len(), 3);
    assert_eq!(markets.native_name("BTC/USD").as_deref(), Some("XBT/USD"));
    assert_eq!(markets.native_name("DOGE/USD").as_deref(), Some("XDG/USD"));
    assert_eq!(markets.symbol_for("ETH/USD").as_deref(), Some("ETH/USD"));
}
