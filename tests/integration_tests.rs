//! End-to-end integration tests: an application client talks to the running
//! bridge over `/ws`, and the bridge talks to a local echo upstream.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use wsb_socket::{ConnectPolicy, WebSocketConnector};
use wsb_transport::{TransportConfig, TransportServer};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Start a bridge on a random port.
async fn start_test_server(max_connections: Option<usize>) -> TransportServer {
    let config = TransportConfig {
        port: 0,
        hostname: "127.0.0.1".into(),
        max_connections,
        ..TransportConfig::default()
    };
    let connector = WebSocketConnector::new(ConnectPolicy::default())
        .with_connect_timeout(Duration::from_secs(2));

    TransportServer::start(config, Arc::new(connector)).await.unwrap()
}

/// Echo upstream. `binary` is answered with a binary frame; every close frame
/// the upstream receives is reported as `(code, reason)`.
async fn start_upstream() -> (SocketAddr, mpsc::UnboundedReceiver<(u16, String)>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (closes_tx, closes_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let closes_tx = closes_tx.clone();
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(msg)) = ws.next().await {
                    match msg {
                        Message::Text(text) if text.as_str() == "binary" => {
                            let _ = ws.send(Message::Binary(vec![7u8, 7, 7].into())).await;
                        }
                        Message::Text(_) => {
                            let _ = ws.send(msg).await;
                        }
                        Message::Close(frame) => {
                            let report = frame
                                .map(|f| (u16::from(f.code), f.reason.as_str().to_string()))
                                .unwrap_or((1005, String::new()));
                            let _ = closes_tx.send(report);
                        }
                        _ => {}
                    }
                }
            });
        }
    });

    (addr, closes_rx)
}

async fn connect_client(port: u16) -> Client {
    let url = format!("ws://127.0.0.1:{port}/ws");
    let (ws, _) = connect_async(&url).await.expect("Failed to connect");
    ws
}

async fn send_command(ws: &mut Client, command: Value) {
    ws.send(Message::Text(command.to_string().into())).await.unwrap();
}

async fn next_event(ws: &mut Client) -> Value {
    loop {
        let msg = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("Timeout waiting for event")
            .expect("Stream ended")
            .expect("WebSocket error");
        if msg.is_text() {
            let text = msg.into_text().unwrap();
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn wait_for_clients(server: &TransportServer, expected: usize) {
    for _ in 0..100 {
        if server.client_count() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("client count never reached {expected} (is {})", server.client_count());
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn open_transmit_close_round_trip() {
    let server = start_test_server(None).await;
    let (upstream, mut closes) = start_upstream().await;
    let mut ws = connect_client(server.port()).await;

    send_command(&mut ws, json!(["feed", "open", { "url": format!("ws://{upstream}/") }])).await;
    assert_eq!(next_event(&mut ws).await, json!(["feed", "connected", null]));

    send_command(&mut ws, json!(["feed", "transmit", "hello"])).await;
    assert_eq!(next_event(&mut ws).await, json!(["feed", "message", "hello"]));

    send_command(&mut ws, json!(["feed", "close", { "code": 4000, "reason": "done" }])).await;
    assert_eq!(next_event(&mut ws).await, json!(["feed", "disconnected", null]));

    let (code, reason) = timeout(Duration::from_secs(5), closes.recv()).await.unwrap().unwrap();
    assert_eq!(code, 4000);
    assert_eq!(reason, "done");
}

#[tokio::test]
async fn transmit_before_open_is_an_error() {
    let server = start_test_server(None).await;
    let mut ws = connect_client(server.port()).await;

    send_command(&mut ws, json!([7, "transmit", "too soon"])).await;
    assert_eq!(
        next_event(&mut ws).await,
        json!([7, "error", "cannot transmit on closed websocket"])
    );
}

#[tokio::test]
async fn unknown_commands_are_dropped() {
    let server = start_test_server(None).await;
    let mut ws = connect_client(server.port()).await;

    send_command(&mut ws, json!(["a", "reconnect", null])).await;
    ws.send(Message::Text("{not json".into())).await.unwrap();
    ws.send(Message::Binary(vec![1u8, 2, 3].into())).await.unwrap();
    send_command(&mut ws, json!(["a", "transmit", "x"])).await;

    // Nothing came back for the first three frames.
    assert_eq!(
        next_event(&mut ws).await,
        json!(["a", "error", "cannot transmit on closed websocket"])
    );
}

#[tokio::test]
async fn malformed_url_is_reported() {
    let server = start_test_server(None).await;
    let mut ws = connect_client(server.port()).await;

    send_command(&mut ws, json!(["a", "open", { "url": "http://example.test" }])).await;
    let event = next_event(&mut ws).await;
    assert_eq!(event[0], "a");
    assert_eq!(event[1], "error");
    assert!(event[2].as_str().unwrap().contains("invalid websocket url"), "{event}");
}

#[tokio::test]
async fn binary_from_upstream_is_an_error_not_a_disconnect() {
    let server = start_test_server(None).await;
    let (upstream, _closes) = start_upstream().await;
    let mut ws = connect_client(server.port()).await;

    send_command(&mut ws, json!(["a", "open", { "url": format!("ws://{upstream}") }])).await;
    assert_eq!(next_event(&mut ws).await, json!(["a", "connected", null]));

    send_command(&mut ws, json!(["a", "transmit", "binary"])).await;
    assert_eq!(
        next_event(&mut ws).await,
        json!([
            "a",
            "error",
            "Received non-string message of type binary, which cannot be handled"
        ])
    );

    send_command(&mut ws, json!(["a", "transmit", "still open"])).await;
    assert_eq!(next_event(&mut ws).await, json!(["a", "message", "still open"]));
}

#[tokio::test]
async fn unreachable_upstream_errors_then_disconnects() {
    let server = start_test_server(None).await;
    let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = dead.local_addr().unwrap();
    drop(dead);
    let mut ws = connect_client(server.port()).await;

    send_command(&mut ws, json!(["a", "open", { "url": format!("ws://{dead_addr}") }])).await;
    assert_eq!(next_event(&mut ws).await[1], "error");
    assert_eq!(next_event(&mut ws).await, json!(["a", "disconnected", null]));
}

#[tokio::test]
async fn sessions_do_not_share_handles() {
    let server = start_test_server(None).await;
    let (upstream, _closes) = start_upstream().await;
    let mut first = connect_client(server.port()).await;
    let mut second = connect_client(server.port()).await;

    send_command(&mut first, json!(["a", "open", { "url": format!("ws://{upstream}") }])).await;
    assert_eq!(next_event(&mut first).await, json!(["a", "connected", null]));

    send_command(&mut second, json!(["a", "transmit", "mine?"])).await;
    assert_eq!(
        next_event(&mut second).await,
        json!(["a", "error", "cannot transmit on closed websocket"])
    );

    send_command(&mut first, json!(["a", "transmit", "mine"])).await;
    assert_eq!(next_event(&mut first).await, json!(["a", "message", "mine"]));
}

#[tokio::test]
async fn client_disconnect_closes_upstreams_going_away() {
    let server = start_test_server(None).await;
    let (upstream, mut closes) = start_upstream().await;
    let mut ws = connect_client(server.port()).await;

    send_command(&mut ws, json!(["a", "open", { "url": format!("ws://{upstream}") }])).await;
    assert_eq!(next_event(&mut ws).await, json!(["a", "connected", null]));

    ws.close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: "".into(),
    }))
    .await
    .unwrap();

    let (code, reason) = timeout(Duration::from_secs(5), closes.recv()).await.unwrap().unwrap();
    assert_eq!(code, 1001);
    assert_eq!(reason, "going away");
    wait_for_clients(&server, 0).await;
}

#[tokio::test]
async fn health_reports_connected_clients() {
    let server = start_test_server(None).await;
    let url = format!("http://127.0.0.1:{}/health", server.port());

    let body: Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
    assert_eq!(body, json!({ "status": "ok", "clients": 0 }));

    let _ws = connect_client(server.port()).await;
    wait_for_clients(&server, 1).await;

    let body: Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
    assert_eq!(body["clients"], 1);
}

#[tokio::test]
async fn connection_limit_rejects_extra_clients() {
    let server = start_test_server(Some(1)).await;
    let _first = connect_client(server.port()).await;
    wait_for_clients(&server, 1).await;

    let url = format!("ws://127.0.0.1:{}/ws", server.port());
    assert!(connect_async(&url).await.is_err());
}

#[tokio::test]
async fn stop_shuts_the_listener() {
    let mut server = start_test_server(None).await;
    let port = server.port();
    server.stop().await;

    let url = format!("ws://127.0.0.1:{port}/ws");
    assert!(connect_async(&url).await.is_err());
}
