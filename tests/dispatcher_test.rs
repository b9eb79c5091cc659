//! Frame routing tests driving a dispatcher with captured frames.

mod common;

use std::time::Duration;

use rust_decimal_macros::dec;
use serde_json::json;

use common::{fixture, test_markets};
use kraken_stream::RequestError;
use kraken_stream::models::book::BookDepth;
use kraken_stream::models::{Channel, SubscriptionParams};
use kraken_stream::orderbook::OrderBookView;
use kraken_stream::websocket::pending::Ack;
use kraken_stream::websocket::{Dispatched, Dispatcher, StreamHandle, StreamValue};

/// Dispatcher with an acknowledged `XBT/USD` book subscription on channel 336.
fn subscribed_book() -> (Dispatcher, StreamHandle) {
    let mut dispatcher = Dispatcher::new(test_markets(), BookDepth::D10);
    let params = SubscriptionParams::new(Channel::Book).with_depth(10);
    let outcome = dispatcher
        .subscribe(Channel::Book, "BTC/USD", params)
        .expect("Failed to subscribe");
    assert_eq!(outcome.request.as_ref().map(|r| r.reqid), Some(1));

    let handled = dispatcher.dispatch(fixture("subscription_status.json"));
    assert_eq!(handled, Dispatched::Handled);
    (dispatcher, outcome.stream)
}

async fn next_book(stream: &mut StreamHandle) -> OrderBookView {
    match stream.next().await {
        Ok(StreamValue::OrderBook(view)) => view,
        other => panic!("Expected an order book, got {other:?}"),
    }
}

/// Acks a subscription for `channel` on `channel_id` and returns its stream.
fn subscribe_acked(
    dispatcher: &mut Dispatcher,
    channel: Channel,
    params: SubscriptionParams,
    channel_id: u64,
    channel_name: &str,
) -> StreamHandle {
    let outcome = dispatcher
        .subscribe(channel, "BTC/USD", params.clone())
        .expect("Failed to subscribe");
    let reqid = outcome.request.expect("Expected a request").reqid;
    dispatcher.dispatch(json!({
        "channelID": channel_id,
        "channelName": channel_name,
        "event": "subscriptionStatus",
        "pair": "XBT/USD",
        "reqid": reqid,
        "status": "subscribed",
        "subscription": params,
    }));
    outcome.stream
}

#[tokio::test]
async fn test_ack_registers_channel() {
    let (dispatcher, _stream) = subscribed_book();

    let subscription = dispatcher.registry().lookup(336).expect("Channel not registered");
    assert_eq!(subscription.symbol, "BTC/USD");
    assert_eq!(subscription.ws_name, "XBT/USD");
    assert_eq!(subscription.params.depth, Some(10));
    assert!(dispatcher.pending().is_empty());
}

#[tokio::test]
async fn test_snapshot_then_update() {
    let (mut dispatcher, mut stream) = subscribed_book();

    dispatcher.dispatch(fixture("book_snapshot.json"));
    let view = next_book(&mut stream).await;

    assert_eq!(view.symbol, "BTC/USD");
    let asks: Vec<_> = view.asks.iter().map(|l| l.price).collect();
    let bids: Vec<_> = view.bids.iter().map(|l| l.price).collect();
    assert_eq!(asks, vec![dec!(5541.3), dec!(5541.8), dec!(5542.7)]);
    assert_eq!(bids, vec![dec!(5541.2), dec!(5539.9), dec!(5539.5)]);
    assert_eq!(view.timestamp, Some(1_534_614_248_765));

    dispatcher.dispatch(fixture("book_update.json"));
    let view = next_book(&mut stream).await;

    let asks: Vec<_> = view.asks.iter().map(|l| l.price).collect();
    assert_eq!(
        asks,
        vec![dec!(5541.3), dec!(5541.8), dec!(5542.5), dec!(5542.7)]
    );
    // The zero-volume bid named a price not in the book.
    assert_eq!(view.bids.len(), 3);
    assert_eq!(view.timestamp, Some(1_534_614_335_345));
    assert!(!view.stale);
}

#[tokio::test]
async fn test_new_snapshot_replaces_book() {
    let (mut dispatcher, mut stream) = subscribed_book();
    dispatcher.dispatch(fixture("book_snapshot.json"));
    dispatcher.dispatch(fixture("book_update.json"));
    let merged = next_book(&mut stream).await;
    assert_eq!(merged.asks.len(), 4);

    dispatcher.dispatch(fixture("book_snapshot.json"));
    let view = next_book(&mut stream).await;

    assert_eq!(view.asks.len(), 3);
    assert!(view.asks.iter().all(|l| l.price != dec!(5542.5)));
}

#[test]
fn test_data_before_ack_passes_through() {
    let mut dispatcher = Dispatcher::new(test_markets(), BookDepth::D10);
    let frame = fixture("book_snapshot.json");

    assert_eq!(dispatcher.dispatch(frame.clone()), Dispatched::PassThrough(frame));
    assert!(dispatcher.order_book("BTC/USD").is_none());
}

#[tokio::test]
async fn test_subscription_error_rejects_with_bad_symbol() {
    let mut dispatcher = Dispatcher::new(test_markets(), BookDepth::D10);
    let outcome = dispatcher
        .subscribe(Channel::Ticker, "BTC/USD", SubscriptionParams::new(Channel::Ticker))
        .expect("Failed to subscribe");
    let ack = outcome.ack.expect("Expected an ack receiver");

    dispatcher.dispatch(fixture("subscription_error.json"));

    let result = ack.await.expect("Ack slot dropped");
    assert_eq!(
        result,
        Err(RequestError::BadSymbol(
            "Currency pair not in ISO 4217-A3 format foobar".to_string()
        ))
    );
    assert!(dispatcher.pending().is_empty());
}

#[tokio::test]
async fn test_repeated_ack_resolves_once() {
    let (mut dispatcher, _stream) = subscribed_book();

    // A duplicate ack finds no pending request; the mapping is unchanged.
    assert_eq!(
        dispatcher.dispatch(fixture("subscription_status.json")),
        Dispatched::Handled
    );
    assert_eq!(dispatcher.registry().len(), 1);
    assert_eq!(dispatcher.registry().lookup(336).map(|s| s.symbol.as_str()), Some("BTC/USD"));
}

#[tokio::test]
async fn test_unsubscribe_ends_stream() {
    let (mut dispatcher, mut stream) = subscribed_book();
    dispatcher.dispatch(fixture("book_snapshot.json"));
    next_book(&mut stream).await;

    let (request, ack) = dispatcher
        .unsubscribe(Channel::Book, "BTC/USD")
        .expect("Failed to unsubscribe");
    assert_eq!(request.reqid, 2);
    assert_eq!(request.subscription.depth, Some(10));

    dispatcher.dispatch(fixture("unsubscribed.json"));

    assert_eq!(ack.await.expect("Ack slot dropped"), Ok(Ack::Unsubscribed));
    assert_eq!(
        stream.next().await,
        Err(RequestError::Unsubscribed("XBT/USD:book".to_string()))
    );
    assert!(dispatcher.registry().is_empty());
    assert!(dispatcher.order_book("BTC/USD").is_none());
}

#[tokio::test]
async fn test_ticker_trade_and_ohlc_streams() {
    let mut dispatcher = Dispatcher::new(test_markets(), BookDepth::D10);
    let mut ticker = subscribe_acked(
        &mut dispatcher,
        Channel::Ticker,
        SubscriptionParams::new(Channel::Ticker),
        340,
        "ticker",
    );
    let mut trades = subscribe_acked(
        &mut dispatcher,
        Channel::Trade,
        SubscriptionParams::new(Channel::Trade),
        337,
        "trade",
    );
    let mut candles = subscribe_acked(
        &mut dispatcher,
        Channel::Ohlc,
        SubscriptionParams::new(Channel::Ohlc).with_interval(5),
        338,
        "ohlc-5",
    );

    dispatcher.dispatch(fixture("ticker.json"));
    dispatcher.dispatch(fixture("trade.json"));
    dispatcher.dispatch(fixture("ohlc.json"));

    match ticker.next().await {
        Ok(StreamValue::Ticker(t)) => {
            assert_eq!(t.symbol, "BTC/USD");
            assert_eq!(t.bid, dec!(5525.1));
        }
        other => panic!("Expected a ticker, got {other:?}"),
    }
    match trades.next().await {
        Ok(StreamValue::Trades(batch)) => assert_eq!(batch.len(), 2),
        other => panic!("Expected trades, got {other:?}"),
    }
    match candles.next().await {
        Ok(StreamValue::Ohlcv(candle)) => assert_eq!(candle.close, dec!(3586.6)),
        other => panic!("Expected a candle, got {other:?}"),
    }
}

#[tokio::test]
async fn test_out_of_range_values_do_not_break_dispatch() {
    let mut dispatcher = Dispatcher::new(test_markets(), BookDepth::D10);
    let mut ticker = subscribe_acked(
        &mut dispatcher,
        Channel::Ticker,
        SubscriptionParams::new(Channel::Ticker),
        340,
        "ticker",
    );
    let mut trades = subscribe_acked(
        &mut dispatcher,
        Channel::Trade,
        SubscriptionParams::new(Channel::Trade),
        337,
        "trade",
    );

    let mut ticker_frame = fixture("ticker.json");
    ticker_frame[1]["v"] = json!(["100000000000000000000", "100000000000000000000"]);
    ticker_frame[1]["p"] = json!(["10000000000", "10000000000"]);
    assert_eq!(dispatcher.dispatch(ticker_frame), Dispatched::Handled);

    let trade_frame = json!([
        337,
        [
            ["100000000000000000000", "10000000000", "1534614057.321597", "b", "l", ""],
            ["6060.00000", "0.02455000", "1534614057.324998", "b", "m", ""]
        ],
        "trade",
        "XBT/USD"
    ]);
    assert_eq!(dispatcher.dispatch(trade_frame), Dispatched::Handled);

    match ticker.next().await {
        Ok(StreamValue::Ticker(t)) => {
            assert_eq!(t.base_volume, dec!(100000000000000000000));
            assert_eq!(t.quote_volume, None);
        }
        other => panic!("Expected a ticker, got {other:?}"),
    }
    match trades.next().await {
        Ok(StreamValue::Trades(batch)) => {
            assert_eq!(batch.len(), 1);
            assert_eq!(batch[0].price, dec!(6060));
        }
        other => panic!("Expected trades, got {other:?}"),
    }
}

#[tokio::test]
async fn test_heartbeat_and_system_status() {
    let mut dispatcher = Dispatcher::new(test_markets(), BookDepth::D10);
    let mut heartbeat = dispatcher.watch_heartbeat();

    assert_eq!(dispatcher.dispatch(fixture("system_status.json")), Dispatched::Handled);
    assert_eq!(dispatcher.dispatch(fixture("heartbeat.json")), Dispatched::Handled);

    assert_eq!(heartbeat.next().await, Ok(StreamValue::Heartbeat));
    let status = dispatcher.system_status().expect("No system status");
    assert_eq!(status.status, "online");
}

#[tokio::test]
async fn test_timeout_then_late_ack() {
    let mut dispatcher = Dispatcher::new(test_markets(), BookDepth::D10);
    let outcome = dispatcher
        .subscribe(Channel::Book, "BTC/USD", SubscriptionParams::new(Channel::Book).with_depth(10))
        .expect("Failed to subscribe");
    let ack = outcome.ack.expect("Expected an ack receiver");

    dispatcher.expire(Duration::ZERO);
    assert_eq!(
        ack.await.expect("Ack slot dropped"),
        Err(RequestError::RequestTimeout { reqid: 1 })
    );

    // The late ack is still honoured for routing, but resolves nothing.
    dispatcher.dispatch(fixture("subscription_status.json"));
    assert!(dispatcher.registry().lookup(336).is_some());
    assert!(dispatcher.pending().is_empty());
}

#[tokio::test]
async fn test_disconnect_resets_everything() {
    let (mut dispatcher, mut stream) = subscribed_book();
    dispatcher.dispatch(fixture("book_snapshot.json"));
    next_book(&mut stream).await;

    dispatcher.on_disconnect();

    assert_eq!(stream.next().await, Err(RequestError::ConnectionClosed));
    assert!(dispatcher.registry().is_empty());
    assert!(dispatcher.order_book("BTC/USD").is_none());

    // Channel ids from the old connection are no longer routed.
    let frame = fixture("book_update.json");
    assert_eq!(dispatcher.dispatch(frame.clone()), Dispatched::PassThrough(frame));

    let replayed = dispatcher.replay_subscriptions();
    assert_eq!(replayed.len(), 1);
    assert_eq!(replayed[0].pair, vec!["XBT/USD".to_string()]);
    assert_eq!(replayed[0].subscription.depth, Some(10));
}
