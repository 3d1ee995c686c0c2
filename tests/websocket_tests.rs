/// Tests for stream subscriptions using an in-process mock WebSocket server.
///
/// The stub server records the path each client asked for and counts live
/// connections, so tests can assert both what was subscribed and that
/// stopping a subscription really closes its socket.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rust_decimal_macros::dec;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message as WsMsg;

use binance_service::errors::BinanceError;
use binance_service::models::*;
use binance_service::websocket::{StreamManager, TypedStream, WsConfig};
use binance_service::{ApiService, Network, Service, ServiceConfig};

struct StubServer {
    base: String,
    live: Arc<AtomicUsize>,
    paths: Arc<Mutex<Vec<String>>>,
}

impl StubServer {
    fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    fn paths(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }

    async fn wait_until_idle(&self) {
        for _ in 0..40 {
            if self.live() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("stub server still has {} live connection(s)", self.live());
    }
}

/// Start a server that sends `frames` to every client, then either closes
/// (`close_after`) or keeps the connection open until the client leaves.
async fn start_stub(frames: Vec<String>, close_after: bool) -> StubServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let live = Arc::new(AtomicUsize::new(0));
    let paths = Arc::new(Mutex::new(Vec::new()));

    let server_live = live.clone();
    let server_paths = paths.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let frames = frames.clone();
            let live = server_live.clone();
            let paths = server_paths.clone();
            tokio::spawn(async move {
                let record = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    paths.lock().unwrap().push(req.uri().path().to_string());
                    Ok(resp)
                };
                let Ok(mut ws) = accept_hdr_async(stream, record).await else {
                    return;
                };
                live.fetch_add(1, Ordering::SeqCst);

                for frame in frames {
                    if ws.send(WsMsg::Text(frame)).await.is_err() {
                        break;
                    }
                }
                if close_after {
                    let _ = ws.send(WsMsg::Close(None)).await;
                }
                while let Some(Ok(msg)) = ws.next().await {
                    if let WsMsg::Close(_) = msg {
                        break;
                    }
                }
                live.fetch_sub(1, Ordering::SeqCst);
            });
        }
    });

    StubServer {
        base: format!("ws://{addr}/ws"),
        live,
        paths,
    }
}

fn agg_trade_frame(id: u64) -> String {
    json!({
        "e": "aggTrade",
        "E": 1672515782136_i64,
        "s": "BNBBTC",
        "a": id,
        "p": "0.001",
        "q": "100",
        "f": 100,
        "l": 105,
        "T": 1672515782136_i64,
        "m": true,
        "M": true
    })
    .to_string()
}

async fn next_within<T>(stream: &mut TypedStream<T>) -> Option<T> {
    tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("timed out waiting for the stream")
}

fn service_for(stub: &StubServer) -> ApiService {
    let config =
        ServiceConfig::from_network(Network::Testnet).with_endpoints("http://127.0.0.1:1", &stub.base);
    ApiService::public(config).unwrap()
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_ws_events_arrive_in_order_then_stream_ends() {
    let stub = start_stub((1..=3).map(agg_trade_frame).collect(), true).await;
    let manager = StreamManager::new(&stub.base, WsConfig::default()).unwrap();
    let (mut events, _stop) = manager
        .subscribe::<AggTradeEvent>("bnbbtc@aggTrade")
        .unwrap();

    let mut ids = vec![];
    while let Some(event) = next_within(&mut events).await {
        ids.push(event.id);
    }

    assert_eq!(ids, vec![1, 2, 3], "events should arrive once each, in order");
    stub.wait_until_idle().await;
}

#[tokio::test]
async fn test_ws_malformed_frame_is_skipped() {
    let frames = vec![
        agg_trade_frame(1),
        "{not json".to_string(),
        json!({"e": "aggTrade", "unexpected": true}).to_string(),
        agg_trade_frame(2),
    ];
    let stub = start_stub(frames, true).await;
    let manager = StreamManager::new(&stub.base, WsConfig::default()).unwrap();
    let (mut events, _stop) = manager
        .subscribe::<AggTradeEvent>("bnbbtc@aggTrade")
        .unwrap();

    assert_eq!(next_within(&mut events).await.unwrap().id, 1);
    assert_eq!(next_within(&mut events).await.unwrap().id, 2);
    assert!(next_within(&mut events).await.is_none());
}

#[tokio::test]
async fn test_ws_decode_failure_limit_closes_subscription() {
    let frames = vec![
        "garbage".to_string(),
        "garbage".to_string(),
        agg_trade_frame(1),
    ];
    let stub = start_stub(frames, false).await;
    let config = WsConfig {
        max_consecutive_decode_failures: Some(2),
        ..WsConfig::default()
    };
    let manager = StreamManager::new(&stub.base, config).unwrap();
    let (mut events, _stop) = manager
        .subscribe::<AggTradeEvent>("bnbbtc@aggTrade")
        .unwrap();

    assert!(next_within(&mut events).await.is_none());
    stub.wait_until_idle().await;
}

// ---------------------------------------------------------------------------
// Shutdown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_ws_stop_closes_connection() {
    let stub = start_stub(vec![agg_trade_frame(7)], false).await;
    let manager = StreamManager::new(&stub.base, WsConfig::default()).unwrap();
    let (mut events, stop) = manager
        .subscribe::<AggTradeEvent>("bnbbtc@aggTrade")
        .unwrap();

    assert_eq!(next_within(&mut events).await.unwrap().id, 7);
    assert_eq!(stub.live(), 1);

    stop.stop();

    assert!(next_within(&mut events).await.is_none());
    stub.wait_until_idle().await;
}

#[tokio::test]
async fn test_ws_dropping_stop_handle_closes_connection() {
    let stub = start_stub(vec![agg_trade_frame(1)], false).await;
    let manager = StreamManager::new(&stub.base, WsConfig::default()).unwrap();
    let (mut events, stop) = manager
        .subscribe::<AggTradeEvent>("bnbbtc@aggTrade")
        .unwrap();

    assert!(next_within(&mut events).await.is_some());
    drop(stop);

    assert!(next_within(&mut events).await.is_none());
    stub.wait_until_idle().await;
}

#[tokio::test]
async fn test_ws_dropping_event_stream_closes_connection() {
    let stub = start_stub(vec![agg_trade_frame(1)], false).await;
    let manager = StreamManager::new(&stub.base, WsConfig::default()).unwrap();
    let (mut events, mut stop) = manager
        .subscribe::<AggTradeEvent>("bnbbtc@aggTrade")
        .unwrap();

    assert!(next_within(&mut events).await.is_some());
    drop(events);

    tokio::time::timeout(Duration::from_secs(2), stop.finished())
        .await
        .expect("reader task should exit once the consumer is gone");
    assert!(stop.is_finished());
    stub.wait_until_idle().await;
}

#[tokio::test]
async fn test_ws_connection_refused_ends_stream() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let manager = StreamManager::new(&format!("ws://{addr}/ws"), WsConfig::default()).unwrap();
    let (mut events, _stop) = manager
        .subscribe::<AggTradeEvent>("bnbbtc@aggTrade")
        .unwrap();

    assert!(next_within(&mut events).await.is_none());
}

#[test]
fn test_ws_subscribe_requires_runtime() {
    let manager = StreamManager::new("ws://127.0.0.1:1/ws", WsConfig::default()).unwrap();
    match manager.subscribe::<AggTradeEvent>("bnbbtc@aggTrade") {
        Err(BinanceError::Config(_)) => {}
        Err(other) => panic!("expected config error, got {other:?}"),
        Ok(_) => panic!("subscribe should fail outside a runtime"),
    }
}

#[test]
fn test_ws_stream_urls() {
    let manager = StreamManager::new("wss://stream.binance.com:9443/ws", WsConfig::default()).unwrap();
    assert_eq!(
        manager.stream_url("bnbbtc@depth").unwrap().as_str(),
        "wss://stream.binance.com:9443/ws/bnbbtc@depth"
    );
    assert!(manager.stream_url("").is_err());
    assert!(manager.stream_url("a/b").is_err());
    assert!(manager.stream_url("a?b").is_err());

    assert!(StreamManager::new("http://stream.binance.com", WsConfig::default()).is_err());
}

// ---------------------------------------------------------------------------
// Service streams
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_ws_depth_stream_uses_lowercase_symbol() {
    let frame = json!({
        "e": "depthUpdate",
        "E": 123456789,
        "s": "BNBBTC",
        "U": 157,
        "u": 160,
        "b": [["0.0024", "10"]],
        "a": [["0.0026", "100"]]
    })
    .to_string();
    let stub = start_stub(vec![frame], true).await;
    let service = service_for(&stub);

    let (mut events, _stop) = service
        .depth_websocket(DepthWebsocketRequest {
            symbol: "BNBBTC".into(),
        })
        .unwrap();
    let update = next_within(&mut events).await.unwrap();

    assert_eq!(update.first_update_id, 157);
    assert_eq!(update.final_update_id, 160);
    assert_eq!(update.bids[0].price, dec!(0.0024));
    assert_eq!(update.asks[0].quantity, dec!(100));
    assert_eq!(stub.paths(), vec!["/ws/bnbbtc@depth".to_string()]);
}

#[tokio::test]
async fn test_ws_kline_stream() {
    let frame = json!({
        "e": "kline",
        "E": 123456789,
        "s": "BNBBTC",
        "k": {
            "t": 123400000, "T": 123460000, "s": "BNBBTC", "i": "1m",
            "f": 100, "L": 200,
            "o": "0.0010", "c": "0.0020", "h": "0.0025", "l": "0.0015",
            "v": "1000", "n": 100, "x": false,
            "q": "1.0000", "V": "500", "Q": "0.500", "B": "123456"
        }
    })
    .to_string();
    let stub = start_stub(vec![frame], true).await;
    let service = service_for(&stub);

    let (mut events, _stop) = service
        .kline_websocket(KlineWebsocketRequest {
            symbol: "BNBBTC".into(),
            interval: Interval::Minute1,
        })
        .unwrap();
    let event = next_within(&mut events).await.unwrap();

    assert_eq!(event.kline.interval, Interval::Minute1);
    assert_eq!(event.kline.high, dec!(0.0025));
    assert!(!event.kline.is_final);
    assert_eq!(stub.paths(), vec!["/ws/bnbbtc@kline_1m".to_string()]);
}

#[tokio::test]
async fn test_ws_trade_stream() {
    let stub = start_stub(vec![agg_trade_frame(12345)], true).await;
    let service = service_for(&stub);

    let (mut events, _stop) = service
        .trade_websocket(TradeWebsocketRequest {
            symbol: "BNBBTC".into(),
        })
        .unwrap();
    let trade = next_within(&mut events).await.unwrap();

    assert_eq!(trade.id, 12345);
    assert_eq!(trade.price, dec!(0.001));
    assert!(trade.buyer_maker);
    assert_eq!(stub.paths(), vec!["/ws/bnbbtc@aggTrade".to_string()]);
}

#[tokio::test]
async fn test_ws_user_data_stream_decodes_each_event_kind() {
    let frames = vec![
        json!({
            "e": "outboundAccountPosition",
            "E": 1564034571105_i64,
            "u": 1564034571073_i64,
            "B": [{"a": "ETH", "f": "10000.000000", "l": "0.000000"}]
        })
        .to_string(),
        json!({
            "e": "balanceUpdate",
            "E": 1573200697110_i64,
            "a": "BTC",
            "d": "100.00000000",
            "T": 1573200697068_i64
        })
        .to_string(),
        json!({
            "e": "executionReport",
            "E": 1499405658658_i64,
            "s": "ETHBTC",
            "c": "mUvoqJxFIILMdfAW5iGSOW",
            "S": "BUY",
            "o": "LIMIT",
            "f": "GTC",
            "q": "1.00000000",
            "p": "0.10264410",
            "P": "0.00000000",
            "x": "NEW",
            "X": "NEW",
            "r": "NONE",
            "i": 4293153,
            "l": "0.00000000",
            "z": "0.00000000",
            "L": "0.00000000",
            "n": "0",
            "N": null,
            "T": 1499405658657_i64,
            "t": -1,
            "w": true,
            "m": false
        })
        .to_string(),
        json!({"e": "listStatus", "E": 1}).to_string(),
    ];
    let stub = start_stub(frames, true).await;
    let service = service_for(&stub);

    let (mut events, _stop) = service
        .user_data_websocket(UserDataWebsocketRequest {
            listen_key: "pqia91ma19a5s61cv6a81va65sdf19v8a65a1".into(),
        })
        .unwrap();

    match next_within(&mut events).await.unwrap() {
        AccountEvent::AccountPosition(position) => {
            assert_eq!(position.balances[0].asset, "ETH");
            assert_eq!(position.balances[0].free, dec!(10000));
        }
        other => panic!("expected account position, got {other:?}"),
    }
    match next_within(&mut events).await.unwrap() {
        AccountEvent::BalanceUpdate(update) => assert_eq!(update.delta, dec!(100)),
        other => panic!("expected balance update, got {other:?}"),
    }
    match next_within(&mut events).await.unwrap() {
        AccountEvent::ExecutionReport(report) => {
            assert_eq!(report.order_id, 4293153);
            assert_eq!(report.side, Side::Buy);
            assert_eq!(report.status, OrderStatus::New);
        }
        other => panic!("expected execution report, got {other:?}"),
    }
    // Unknown event kinds are skipped, then the peer closes.
    assert!(next_within(&mut events).await.is_none());
    assert_eq!(
        stub.paths(),
        vec!["/ws/pqia91ma19a5s61cv6a81va65sdf19v8a65a1".to_string()]
    );
}

#[tokio::test]
async fn test_ws_invalid_subscriptions_are_rejected() {
    let stub = start_stub(vec![], false).await;
    let service = service_for(&stub);

    assert!(matches!(
        service.trade_websocket(TradeWebsocketRequest::default()),
        Err(BinanceError::Construction(_))
    ));
    assert!(matches!(
        service.user_data_websocket(UserDataWebsocketRequest::default()),
        Err(BinanceError::Construction(_))
    ));
    assert!(stub.paths().is_empty());
}
