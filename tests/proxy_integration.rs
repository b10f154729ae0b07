//! End-to-end tests: a local stream server and a wiremock REST server stand in
//! for the exchange, and requests go through the spot dispatcher.

use std::future::Future;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::{Request, StatusCode};
use futures_util::SinkExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request as WsRequest, Response as WsResponse};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use wiremock::matchers::{body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use binance_proxy::backoff::BackoffConfig;
use binance_proxy::config::ProxyConfig;
use binance_proxy::server::ProxyServer;
use binance_proxy::types::MarketClass;

const KLINES_BODY: &str = r#"[[1700000000000,"100.0","101.0","99.0","100.5","10.0",1700000059999,"1005.0",42,"5.0","502.5","0"],[1700000060000,"100.5","102.0","100.0","101.5","12.0",1700000119999,"1218.0",50,"6.0","609.0","0"]]"#;

const TICKER_BODY: &str = r#"{"symbol":"BTCUSDT","priceChange":"0","priceChangePercent":"0","weightedAvgPrice":"100","prevClosePrice":"100","lastPrice":"100","lastQty":"1","bidPrice":"99","bidQty":"1","askPrice":"101","askQty":"1","openPrice":"100","highPrice":"100","lowPrice":"100","volume":"1","quoteVolume":"100","openTime":0,"closeTime":86400000,"firstId":1,"lastId":1,"count":1}"#;

const TICKER_A: &str = r#"{"e":"24hrTicker","E":1,"s":"BTCUSDT","p":"5","P":"5.0","w":"102","x":"100","c":"105","Q":"1","b":"104","B":"1","a":"106","A":"1","o":"100","h":"110","l":"95","v":"10","q":"1020","O":0,"C":86400000,"F":1,"L":10,"n":10}"#;

const TICKER_B: &str = r#"{"e":"24hrTicker","E":2,"s":"BTCUSDT","p":"10","P":"10.0","w":"104","x":"100","c":"110","Q":"2","b":"109","B":"1","a":"111","A":"1","o":"100","h":"112","l":"95","v":"12","q":"1250","O":1000,"C":86401000,"F":1,"L":12,"n":12}"#;

const EXCHANGE_INFO_BODY: &str = r#"{"timezone":"UTC","serverTime":1700000000000,"rateLimits":[],"exchangeFilters":[],"symbols":[{"symbol":"BTCUSDT","status":"TRADING"}]}"#;

/// A stream connection accepted by [`StreamUpstream`]. Dropping it closes
/// the connection.
struct StreamConnection {
    path: String,
    frames: mpsc::UnboundedSender<String>,
}

impl StreamConnection {
    fn send(&self, frame: &str) {
        self.frames.send(frame.to_string()).unwrap();
    }
}

/// Minimal stream server handing every accepted connection to the test.
struct StreamUpstream {
    base_url: String,
    connections: mpsc::UnboundedReceiver<StreamConnection>,
}

impl StreamUpstream {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, connections) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(serve_connection(socket, tx.clone()));
            }
        });

        Self {
            base_url: format!("ws://{addr}/ws"),
            connections,
        }
    }

    async fn next_connection(&mut self) -> StreamConnection {
        tokio::time::timeout(Duration::from_secs(5), self.connections.recv())
            .await
            .expect("no stream connection within 5s")
            .expect("stream server stopped")
    }
}

async fn serve_connection(socket: TcpStream, connections: mpsc::UnboundedSender<StreamConnection>) {
    let mut path = String::new();
    let callback = |request: &WsRequest, response: WsResponse| -> Result<WsResponse, ErrorResponse> {
        path = request.uri().path().to_string();
        Ok(response)
    };
    let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(socket, callback).await else {
        return;
    };

    let (frames, mut outgoing) = mpsc::unbounded_channel::<String>();
    if connections.send(StreamConnection { path, frames }).is_err() {
        return;
    }

    while let Some(frame) = outgoing.recv().await {
        if ws.send(Message::text(frame)).await.is_err() {
            return;
        }
    }
    let _ = ws.close(None).await;
}

fn spot_config(rest_url: &str, ws_url: &str) -> ProxyConfig {
    ProxyConfig::builder()
        .enabled(MarketClass::Futures, false)
        .enabled(MarketClass::Delivery, false)
        .listen(MarketClass::Spot, "127.0.0.1:0")
        .rest_url(MarketClass::Spot, rest_url)
        .ws_url(MarketClass::Spot, ws_url)
        .debug_addr(None)
        .idle_timeout(None)
        .backoff(BackoffConfig {
            initial: Duration::from_millis(10),
            max: Duration::from_millis(50),
        })
        .build()
}

fn spot_router(server: &ProxyServer) -> Router {
    server.dispatcher(MarketClass::Spot).unwrap().clone().router()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Bytes) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body)
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Bytes) {
    let (status, _, body) = send(router, Request::builder().uri(uri).body(Body::empty()).unwrap()).await;
    (status, body)
}

async fn get_json(router: &Router, uri: &str) -> serde_json::Value {
    let (status, body) = get(router, uri).await;
    assert_eq!(status, StatusCode::OK, "body: {}", String::from_utf8_lossy(&body));
    serde_json::from_slice(&body).unwrap()
}

async fn upstream_calls(server: &MockServer, endpoint: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == endpoint)
        .count()
}

async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..250 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not met within 5s");
}

#[tokio::test]
async fn test_concurrent_klines_requests_share_one_backfill() {
    let rest = MockServer::start().await;
    let mut stream = StreamUpstream::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .and(query_param("symbol", "BTCUSDT"))
        .and(query_param("interval", "1m"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(KLINES_BODY, "application/json"))
        .expect(1)
        .mount(&rest)
        .await;

    let cancel = CancellationToken::new();
    let server = ProxyServer::new(spot_config(&rest.uri(), &stream.base_url), cancel.clone());
    let router = spot_router(&server);

    let mut requests = JoinSet::new();
    for _ in 0..50 {
        let router = router.clone();
        requests.spawn(async move { get_json(&router, "/api/v3/klines?symbol=BTCUSDT&interval=1m&limit=1").await });
    }

    while let Some(candles) = requests.join_next().await {
        let candles = candles.unwrap();
        let candles = candles.as_array().unwrap();
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0][0], 1_700_000_060_000_i64);
        assert_eq!(candles[0][4], "101.5");
    }

    let connection = stream.next_connection().await;
    assert_eq!(connection.path, "/ws/btcusdt@kline_1m");
    assert!(stream.connections.try_recv().is_err());
    assert_eq!(server.dispatcher(MarketClass::Spot).unwrap().registry().len().await, 1);

    cancel.cancel();
}

#[tokio::test]
async fn test_kline_events_update_the_series() {
    let rest = MockServer::start().await;
    let mut stream = StreamUpstream::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(KLINES_BODY, "application/json"))
        .mount(&rest)
        .await;

    let cancel = CancellationToken::new();
    let server = ProxyServer::new(spot_config(&rest.uri(), &stream.base_url), cancel.clone());
    let router = spot_router(&server);
    let uri = "/api/v3/klines?symbol=BTCUSDT&interval=1m";

    assert_eq!(get_json(&router, uri).await.as_array().unwrap().len(), 2);

    let connection = stream.next_connection().await;
    // Updates the last candle, then opens a new one.
    connection.send(r#"{"e":"kline","E":1,"s":"BTCUSDT","k":{"t":1700000060000,"T":1700000119999,"s":"BTCUSDT","i":"1m","o":"100.5","c":"103.0","h":"103.0","l":"100.0","v":"13.0","n":51,"x":true,"q":"1300.0","V":"6.0","Q":"610.0","B":"0"}}"#);
    connection.send(r#"{"e":"kline","E":2,"s":"BTCUSDT","k":{"t":1700000120000,"T":1700000179999,"s":"BTCUSDT","i":"1m","o":"103.0","c":"103.5","h":"104.0","l":"103.0","v":"1.0","n":3,"x":false,"q":"103.5","V":"0.5","Q":"51.0","B":"0"}}"#);

    let router = &router;
    eventually(|| async move {
        let candles = get_json(router, uri).await;
        let candles = candles.as_array().unwrap().clone();
        candles.len() == 3 && candles[1][4] == "103.0" && candles[2][0] == 1_700_000_120_000_i64
    })
    .await;

    cancel.cancel();
}

#[tokio::test]
async fn test_ticker_serves_latest_event() {
    let rest = MockServer::start().await;
    let mut stream = StreamUpstream::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v3/ticker/24hr"))
        .and(query_param("symbol", "BTCUSDT"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(TICKER_BODY, "application/json"))
        .expect(1)
        .mount(&rest)
        .await;

    let cancel = CancellationToken::new();
    let server = ProxyServer::new(spot_config(&rest.uri(), &stream.base_url), cancel.clone());
    let router = spot_router(&server);
    let uri = "/api/v3/ticker/24hr?symbol=BTCUSDT";

    assert_eq!(get_json(&router, uri).await["lastPrice"], "100");

    let connection = stream.next_connection().await;
    assert_eq!(connection.path, "/ws/btcusdt@ticker");
    connection.send(TICKER_A);
    connection.send(TICKER_B);

    let router = &router;
    eventually(|| async move { get_json(router, uri).await["lastPrice"] == "110" }).await;

    let ticker = get_json(router, uri).await;
    assert_eq!(ticker["symbol"], "BTCUSDT");
    assert_eq!(ticker["count"], 12);

    cancel.cancel();
}

#[tokio::test]
async fn test_dropped_stream_reconnects_and_backfills_again() {
    let rest = MockServer::start().await;
    let mut stream = StreamUpstream::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(KLINES_BODY, "application/json"))
        .mount(&rest)
        .await;

    let cancel = CancellationToken::new();
    let server = ProxyServer::new(spot_config(&rest.uri(), &stream.base_url), cancel.clone());
    let router = spot_router(&server);
    let uri = "/api/v3/klines?symbol=BTCUSDT&interval=1m";

    get_json(&router, uri).await;
    let first = stream.next_connection().await;
    assert_eq!(upstream_calls(&rest, "/api/v3/klines").await, 1);

    drop(first);

    let second = stream.next_connection().await;
    assert_eq!(second.path, "/ws/btcusdt@kline_1m");

    let rest = &rest;
    eventually(|| async move { upstream_calls(rest, "/api/v3/klines").await == 2 }).await;

    // Still served while and after reconnecting.
    assert_eq!(get_json(&router, uri).await.as_array().unwrap().len(), 2);

    cancel.cancel();
}

#[tokio::test]
async fn test_depth_gap_forces_a_new_snapshot() {
    let rest = MockServer::start().await;
    let mut stream = StreamUpstream::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v3/depth"))
        .and(query_param("symbol", "BTCUSDT"))
        .and(query_param("limit", "1000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "lastUpdateId": 100,
            "bids": [["99.00", "1.0"], ["98.00", "2.0"]],
            "asks": [["101.00", "1.5"]]
        })))
        .mount(&rest)
        .await;

    let cancel = CancellationToken::new();
    let server = ProxyServer::new(spot_config(&rest.uri(), &stream.base_url), cancel.clone());
    let router = spot_router(&server);
    let uri = "/api/v3/depth?symbol=BTCUSDT&limit=5";

    let book = get_json(&router, uri).await;
    assert_eq!(book["lastUpdateId"], 100);
    assert_eq!(book["bids"][0][0], "99.00");

    let connection = stream.next_connection().await;
    assert_eq!(connection.path, "/ws/btcusdt@depth@100ms");

    connection.send(r#"{"e":"depthUpdate","E":1,"s":"BTCUSDT","U":101,"u":102,"b":[["99.50","3.0"],["98.00","0"]],"a":[]}"#);

    let router = &router;
    eventually(|| async move { get_json(router, uri).await["lastUpdateId"] == 102 }).await;

    let book = get_json(router, uri).await;
    assert_eq!(book["bids"], serde_json::json!([["99.50", "3.0"], ["99.00", "1.0"]]));
    assert_eq!(upstream_calls(&rest, "/api/v3/depth").await, 1);

    // 103..=109 never arrive.
    connection.send(r#"{"e":"depthUpdate","E":2,"s":"BTCUSDT","U":110,"u":112,"b":[],"a":[["101.00","0"]]}"#);

    let rest = &rest;
    eventually(|| async move { upstream_calls(rest, "/api/v3/depth").await == 2 }).await;

    // Resynchronized over the same subscription.
    assert!(stream.connections.try_recv().is_err());

    cancel.cancel();
}

#[tokio::test]
async fn test_futures_depth_without_limit_serves_upstream_default() {
    let rest = MockServer::start().await;
    let mut stream = StreamUpstream::start().await;

    let bids: Vec<[String; 2]> = (0..600).map(|i| [format!("{}.00", 1000 - i), "1.0".to_string()]).collect();
    Mock::given(method("GET"))
        .and(path("/fapi/v1/depth"))
        .and(query_param("symbol", "BTCUSDT"))
        .and(query_param("limit", "1000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "lastUpdateId": 7,
            "E": 1_700_000_000_000_i64,
            "T": 1_700_000_000_000_i64,
            "bids": bids,
            "asks": [["1001.00", "1.0"], ["1002.00", "2.0"]]
        })))
        .mount(&rest)
        .await;

    let config = ProxyConfig::builder()
        .enabled(MarketClass::Spot, false)
        .enabled(MarketClass::Delivery, false)
        .listen(MarketClass::Futures, "127.0.0.1:0")
        .rest_url(MarketClass::Futures, rest.uri())
        .ws_url(MarketClass::Futures, stream.base_url.clone())
        .debug_addr(None)
        .idle_timeout(None)
        .build();
    let cancel = CancellationToken::new();
    let server = ProxyServer::new(config, cancel.clone());
    let router = server.dispatcher(MarketClass::Futures).unwrap().clone().router();

    let book = get_json(&router, "/fapi/v1/depth?symbol=BTCUSDT").await;
    let served = book["bids"].as_array().unwrap();
    assert_eq!(served.len(), 500);
    assert_eq!(served[0][0], "1000.00");
    assert_eq!(served[499][0], "501.00");
    assert_eq!(book["asks"].as_array().unwrap().len(), 2);

    let connection = stream.next_connection().await;
    assert_eq!(connection.path, "/ws/btcusdt@depth@100ms");

    cancel.cancel();
}

#[tokio::test]
async fn test_exchange_info_is_served_byte_identical() {
    let rest = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v3/exchangeInfo"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(EXCHANGE_INFO_BODY, "application/json"))
        .expect(1)
        .mount(&rest)
        .await;

    let cancel = CancellationToken::new();
    let server = ProxyServer::new(spot_config(&rest.uri(), "ws://127.0.0.1:1/ws"), cancel.clone());
    let router = spot_router(&server);

    for _ in 0..3 {
        let (status, headers, body) = send(
            &router,
            Request::builder().uri("/api/v3/exchangeInfo").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["content-type"], "application/json");
        assert_eq!(&body[..], EXCHANGE_INFO_BODY.as_bytes());
    }

    cancel.cancel();
}

#[tokio::test]
async fn test_passthrough_preserves_request_and_response() {
    let rest = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v3/order"))
        .and(query_param("symbol", "BTCUSDT"))
        .and(header("x-mbx-apikey", "test-key"))
        .and(body_string("side=BUY&quantity=1"))
        .respond_with(
            ResponseTemplate::new(401)
                .insert_header("x-mbx-used-weight-1m", "7")
                .set_body_raw(r#"{"code":-2015,"msg":"Invalid API-key, IP, or permissions for action."}"#, "application/json"),
        )
        .expect(1)
        .mount(&rest)
        .await;

    let cancel = CancellationToken::new();
    let server = ProxyServer::new(spot_config(&rest.uri(), "ws://127.0.0.1:1/ws"), cancel.clone());
    let router = spot_router(&server);

    let request = Request::builder()
        .method("POST")
        .uri("/api/v3/order?symbol=BTCUSDT")
        .header("X-MBX-APIKEY", "test-key")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from("side=BUY&quantity=1"))
        .unwrap();
    let (status, headers, body) = send(&router, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(headers["x-mbx-used-weight-1m"], "7");
    assert_eq!(
        &body[..],
        br#"{"code":-2015,"msg":"Invalid API-key, IP, or permissions for action."}"#
    );
    // Nothing was cached for a pass-through request.
    assert!(server.dispatcher(MarketClass::Spot).unwrap().registry().is_empty().await);

    cancel.cancel();
}

#[tokio::test]
async fn test_unreachable_upstream_is_bad_gateway() {
    let cancel = CancellationToken::new();
    let server = ProxyServer::new(spot_config("http://127.0.0.1:1", "ws://127.0.0.1:1/ws"), cancel.clone());
    let router = spot_router(&server);

    let (status, body) = get(&router, "/api/v3/time").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["code"], -1);

    cancel.cancel();
}

#[tokio::test]
async fn test_cache_that_never_becomes_ready_falls_back_to_passthrough() {
    let rest = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .and(query_param("limit", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(KLINES_BODY, "application/json"))
        .expect(1)
        .mount(&rest)
        .await;

    let cancel = CancellationToken::new();
    let config = ProxyConfig {
        ready_timeout: Duration::from_millis(200),
        ..spot_config(&rest.uri(), "ws://127.0.0.1:1/ws")
    };
    let server = ProxyServer::new(config, cancel.clone());
    let router = spot_router(&server);

    let (status, body) = get(&router, "/api/v3/klines?symbol=BTCUSDT&interval=1m&limit=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], KLINES_BODY.as_bytes());

    cancel.cancel();
}

#[tokio::test]
async fn test_request_waiting_on_an_evicted_cache_is_forwarded() {
    let rest = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v3/ticker/24hr"))
        .and(query_param("symbol", "BTCUSDT"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(TICKER_BODY, "application/json"))
        .expect(1)
        .mount(&rest)
        .await;

    let cancel = CancellationToken::new();
    let server = ProxyServer::new(spot_config(&rest.uri(), "ws://127.0.0.1:1/ws"), cancel.clone());
    let dispatcher = server.dispatcher(MarketClass::Spot).unwrap().clone();
    let router = dispatcher.clone().router();

    let waiting = tokio::spawn(async move { get(&router, "/api/v3/ticker/24hr?symbol=BTCUSDT").await });

    let registry = dispatcher.registry();
    eventually(|| async move { registry.len().await == 1 }).await;
    assert_eq!(registry.sweep_idle(Duration::ZERO).await, 1);

    let (status, body) = waiting.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], TICKER_BODY.as_bytes());

    cancel.cancel();
}

#[tokio::test]
async fn test_bound_listener_serves_over_tcp() {
    let rest = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v3/exchangeInfo"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(EXCHANGE_INFO_BODY, "application/json"))
        .mount(&rest)
        .await;

    let cancel = CancellationToken::new();
    let bound = ProxyServer::new(spot_config(&rest.uri(), "ws://127.0.0.1:1/ws"), cancel.clone())
        .bind()
        .await
        .unwrap();
    let addr = bound.local_addr(MarketClass::Spot).unwrap();
    let serving = tokio::spawn(bound.serve());

    let body = reqwest::get(format!("http://{addr}/api/v3/exchangeInfo"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, EXCHANGE_INFO_BODY);

    cancel.cancel();
    serving.await.unwrap().unwrap();
}
