#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use minicord::config::Config;

/// What the scripted gateway does on its own; everything else is driven
/// through `MockGateway::inject`.
#[derive(Debug, Clone)]
pub struct GatewayBehavior {
    pub heartbeat_interval_ms: u64,
    pub ack_heartbeats: bool,
    pub send_ready: bool,
    /// Stop reading and writing after HELLO, like a hung peer.
    pub mute_after_hello: bool,
}

impl Default for GatewayBehavior {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 45000,
            ack_heartbeats: true,
            send_ready: true,
            mute_after_hello: false,
        }
    }
}

#[derive(Debug)]
pub enum ServerAction {
    Send(Value),
    SendRaw(String),
    Close { code: u16, reason: String },
}

#[derive(Clone)]
struct MockState {
    behavior: GatewayBehavior,
    ws_url: String,
    received_tx: mpsc::UnboundedSender<Value>,
    inject_rx: Arc<tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<ServerAction>>>>,
}

/// In-process scripted gateway: one axum app serving both the discovery
/// route and the WebSocket endpoint. Frames received from the client are
/// forwarded on `received`; close frames arrive as `{"_close": code}`.
pub struct MockGateway {
    pub api_url: String,
    pub received: mpsc::UnboundedReceiver<Value>,
    pub inject: mpsc::UnboundedSender<ServerAction>,
}

pub async fn spawn_gateway(behavior: GatewayBehavior) -> MockGateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let api_url = format!("http://127.0.0.1:{}", addr.port());
    let ws_url = format!("ws://127.0.0.1:{}/ws", addr.port());

    let (received_tx, received_rx) = mpsc::unbounded_channel();
    let (inject_tx, inject_rx) = mpsc::unbounded_channel();

    let state = MockState {
        behavior,
        ws_url,
        received_tx,
        inject_rx: Arc::new(tokio::sync::Mutex::new(Some(inject_rx))),
    };

    let app = Router::new()
        .route("/gateway", get(discovery))
        .route("/ws", get(ws_upgrade))
        .with_state(state);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockGateway {
        api_url,
        received: received_rx,
        inject: inject_tx,
    }
}

impl MockGateway {
    /// Next client frame with the given opcode, skipping others.
    pub async fn expect_op(&mut self, op: u64) -> Value {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let value = self
                    .received
                    .recv()
                    .await
                    .expect("mock gateway channel closed");
                if value.get("op").and_then(Value::as_u64) == Some(op) {
                    return value;
                }
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for op {op}"))
    }

    /// Wait for the client to close the socket; returns (code, reason).
    pub async fn expect_close(&mut self) -> (u16, String) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let value = self
                    .received
                    .recv()
                    .await
                    .expect("mock gateway channel closed");
                if let Some(code) = value.get("_close").and_then(Value::as_u64) {
                    let reason = value
                        .get("_reason")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    return (code as u16, reason);
                }
            }
        })
        .await
        .expect("timed out waiting for a close frame")
    }
}

pub fn test_config(api_url: &str) -> Config {
    Config {
        api_url: api_url.to_string(),
        token: "test-token".to_string(),
        intents: 513,
        connect_timeout: Duration::from_secs(5),
    }
}

async fn discovery(State(state): State<MockState>) -> Json<Value> {
    Json(json!({ "url": state.ws_url }))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<MockState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: MockState) {
    let hello = json!({
        "op": 10,
        "d": { "heartbeat_interval": state.behavior.heartbeat_interval_ms }
    });
    if socket
        .send(Message::Text(hello.to_string().into()))
        .await
        .is_err()
    {
        return;
    }

    if state.behavior.mute_after_hello {
        // Hold the socket open without ever servicing it again.
        std::future::pending::<()>().await;
    }

    // Only the first connection gets the inject script; later connections
    // (reconnect tests) just run the behavior-driven half.
    let mut inject_rx = state.inject_rx.lock().await.take();

    loop {
        tokio::select! {
            action = async {
                match inject_rx.as_mut() {
                    Some(rx) => rx.recv().await,
                    None => std::future::pending::<Option<ServerAction>>().await,
                }
            } => {
                match action {
                    Some(ServerAction::Send(value)) => {
                        if socket.send(Message::Text(value.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    Some(ServerAction::SendRaw(text)) => {
                        if socket.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Some(ServerAction::Close { code, reason }) => {
                        let _ = socket
                            .send(Message::Close(Some(CloseFrame {
                                code,
                                reason: reason.into(),
                            })))
                            .await;
                        break;
                    }
                    None => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let Ok(value) = serde_json::from_str::<Value>(&text) else {
                            continue;
                        };
                        let op = value.get("op").and_then(Value::as_u64);
                        let _ = state.received_tx.send(value);
                        match op {
                            Some(2) if state.behavior.send_ready => {
                                let ready = json!({
                                    "op": 0,
                                    "t": "READY",
                                    "s": 1,
                                    "d": {
                                        "v": 10,
                                        "session_id": "mock-session",
                                        "resume_gateway_url": "wss://resume.example"
                                    }
                                });
                                if socket.send(Message::Text(ready.to_string().into())).await.is_err() {
                                    break;
                                }
                            }
                            Some(1) if state.behavior.ack_heartbeats => {
                                let ack = json!({ "op": 11 });
                                if socket.send(Message::Text(ack.to_string().into())).await.is_err() {
                                    break;
                                }
                            }
                            _ => {}
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .as_ref()
                            .map(|f| (f.code, f.reason.to_string()))
                            .unwrap_or((1005, String::new()));
                        let _ = state
                            .received_tx
                            .send(json!({ "_close": code, "_reason": reason }));
                        // Echo the close so the client sees the code back.
                        let _ = socket.send(Message::Close(frame)).await;
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(_)) | None => break,
                }
            }
        }
    }
}
