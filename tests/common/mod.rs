//! In-process mock of the Token Bowl server for integration tests.
//!
//! REST endpoints are canned responses registered with [`MockServer::stub`];
//! every request is recorded. `/connection/websocket` speaks enough of the
//! Centrifugo JSON protocol to drive the realtime client, one scripted
//! [`WsBehavior`] per accepted connection.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde_json::{Value, json};

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub api_key: Option<String>,
    pub content_type: Option<String>,
    pub body: Option<Value>,
}

#[derive(Debug, Clone)]
struct Stub {
    method: Method,
    /// Matched against `path?query` when it contains `?`, else against the path.
    target: String,
    status: u16,
    body: Option<Value>,
    delay: Option<Duration>,
}

#[derive(Debug, Clone)]
pub enum WsBehavior {
    /// Ack connect and subscriptions, send `pushes`, ping, then stay open.
    Serve { pushes: Vec<Value> },
    RejectConnect { code: u32, message: String },
    /// Read the connect command and never answer it.
    IgnoreConnect,
    /// Like `Serve` with no pushes, but answer the subscribe for `channel` with an error.
    RejectSubscribe { channel: String, code: u32, message: String },
    /// Ack connect and subscriptions, then drop the socket without a close frame.
    DropAfterSubscribe,
    CloseAfterSubscribe { code: u16, reason: String },
}

#[derive(Default)]
struct MockState {
    stubs: Mutex<Vec<Stub>>,
    requests: Mutex<Vec<Recorded>>,
    ws_behaviors: Mutex<VecDeque<WsBehavior>>,
    ws_received: Mutex<Vec<String>>,
    ws_connections: Mutex<u32>,
    channels: Mutex<Vec<String>>,
}

pub struct MockServer {
    pub addr: SocketAddr,
    state: Arc<MockState>,
}

impl MockServer {
    /// Bind on an ephemeral port and serve from a dedicated thread and runtime,
    /// so both async and blocking tests can use it.
    pub fn start() -> Self {
        let state = Arc::new(MockState::default());
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let addr = listener.local_addr().unwrap();

        let app = Router::new()
            .route("/connection/websocket", get(ws_handler))
            .fallback(stub_handler)
            .with_state(state.clone());

        std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener).unwrap();
                axum::serve(listener, app).await.unwrap();
            });
        });

        Self { addr, state }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn stub(&self, method: Method, target: &str, status: u16, body: Value) -> &Self {
        self.push_stub(method, target, status, Some(body), None)
    }

    pub fn stub_empty(&self, method: Method, target: &str, status: u16) -> &Self {
        self.push_stub(method, target, status, None, None)
    }

    pub fn stub_delayed(&self, method: Method, target: &str, body: Value, delay: Duration) -> &Self {
        self.push_stub(method, target, 200, Some(body), Some(delay))
    }

    fn push_stub(&self, method: Method, target: &str, status: u16, body: Option<Value>, delay: Option<Duration>) -> &Self {
        self.state.stubs.lock().unwrap().push(Stub {
            method,
            target: target.to_string(),
            status,
            body,
            delay,
        });
        self
    }

    /// Serve `/centrifugo/connection-token` pointing at this server's websocket.
    pub fn enable_realtime(&self, channels: &[&str]) -> &Self {
        let channels: Vec<String> = channels.iter().map(|c| c.to_string()).collect();
        *self.state.channels.lock().unwrap() = channels.clone();
        self.stub(
            Method::GET,
            "/centrifugo/connection-token",
            200,
            json!({
                "url": format!("ws://{}/connection/websocket", self.addr),
                "token": "test-token",
                "channels": channels,
            }),
        )
    }

    pub fn script_ws(&self, behaviors: Vec<WsBehavior>) -> &Self {
        self.state.ws_behaviors.lock().unwrap().extend(behaviors);
        self
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> Recorded {
        self.requests().pop().expect("no request recorded")
    }

    pub fn ws_received(&self) -> Vec<String> {
        self.state.ws_received.lock().unwrap().clone()
    }

    pub fn ws_connections(&self) -> u32 {
        *self.state.ws_connections.lock().unwrap()
    }

    /// Poll until the websocket endpoint has received `text` from a client.
    pub async fn wait_for_ws_text(&self, text: &str) -> bool {
        for _ in 0..100 {
            if self.ws_received().iter().any(|t| t == text) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }
}

// ── REST ──────────────────────────────────────────────────────────────────────

async fn stub_handler(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
    state.requests.lock().unwrap().push(Recorded {
        method: method.clone(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        api_key: header("x-api-key"),
        content_type: header("content-type"),
        body: serde_json::from_slice(&body).ok(),
    });

    let full = match uri.query() {
        Some(q) => format!("{}?{q}", uri.path()),
        None => uri.path().to_string(),
    };
    let stub = state
        .stubs
        .lock()
        .unwrap()
        .iter()
        .rev()
        .find(|s| {
            s.method == method
                && if s.target.contains('?') { s.target == full } else { s.target == uri.path() }
        })
        .cloned();

    let Some(stub) = stub else {
        return (StatusCode::NOT_FOUND, axum::Json(json!({"detail": "no stub"}))).into_response();
    };
    if let Some(delay) = stub.delay {
        tokio::time::sleep(delay).await;
    }
    let status = StatusCode::from_u16(stub.status).unwrap();
    match stub.body {
        Some(body) => (status, axum::Json(body)).into_response(),
        None => status.into_response(),
    }
}

// ── Websocket ─────────────────────────────────────────────────────────────────

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<MockState>>) -> Response {
    ws.on_upgrade(move |socket| ws_session(socket, state))
}

async fn recv_text(socket: &mut WebSocket, state: &MockState) -> Option<Value> {
    loop {
        match socket.recv().await? {
            Ok(Message::Text(text)) => {
                state.ws_received.lock().unwrap().push(text.as_str().to_string());
                return serde_json::from_str(text.as_str()).ok();
            }
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}

async fn send_json(socket: &mut WebSocket, value: Value) -> bool {
    socket.send(Message::Text(value.to_string().into())).await.is_ok()
}

async fn ws_session(mut socket: WebSocket, state: Arc<MockState>) {
    let connection = {
        let mut n = state.ws_connections.lock().unwrap();
        *n += 1;
        *n
    };
    let behavior = state
        .ws_behaviors
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or(WsBehavior::Serve { pushes: Vec::new() });

    let Some(connect) = recv_text(&mut socket, &state).await else { return };
    let id = connect["id"].as_u64().unwrap_or(0);
    if connect["connect"]["token"] != "test-token" {
        send_json(&mut socket, json!({"id": id, "error": {"code": 101, "message": "unauthorized"}})).await;
        return;
    }
    match &behavior {
        WsBehavior::RejectConnect { code, message } => {
            send_json(&mut socket, json!({"id": id, "error": {"code": code, "message": message}})).await;
            return;
        }
        WsBehavior::IgnoreConnect => {
            while recv_text(&mut socket, &state).await.is_some() {}
            return;
        }
        _ => {}
    }
    let reply = json!({"id": id, "connect": {"client": format!("client-{connection}"), "version": "test"}});
    if !send_json(&mut socket, reply).await {
        return;
    }

    let channel_count = state.channels.lock().unwrap().len();
    for _ in 0..channel_count {
        let Some(sub) = recv_text(&mut socket, &state).await else { return };
        let id = sub["id"].as_u64().unwrap_or(0);
        let reply = match &behavior {
            WsBehavior::RejectSubscribe { channel, code, message } if sub["subscribe"]["channel"] == channel.as_str() => {
                json!({"id": id, "error": {"code": code, "message": message}})
            }
            _ => json!({"id": id, "subscribe": {}}),
        };
        if !send_json(&mut socket, reply).await {
            return;
        }
    }

    match behavior {
        WsBehavior::Serve { pushes } => {
            serve(&mut socket, &state, pushes).await;
        }
        WsBehavior::RejectSubscribe { .. } => serve(&mut socket, &state, Vec::new()).await,
        WsBehavior::DropAfterSubscribe => drop(socket),
        WsBehavior::CloseAfterSubscribe { code, reason } => {
            let _ = socket
                .send(Message::Close(Some(CloseFrame { code, reason: reason.into() })))
                .await;
        }
        WsBehavior::RejectConnect { .. } | WsBehavior::IgnoreConnect => {}
    }
}

/// Send `pushes`, ping once, then read until the client goes away.
async fn serve(socket: &mut WebSocket, state: &MockState, pushes: Vec<Value>) {
    for push in pushes {
        if !send_json(socket, push).await {
            return;
        }
    }
    if !send_json(socket, json!({})).await {
        return;
    }
    while recv_text(socket, state).await.is_some() {}
}

// ── Fixtures ──────────────────────────────────────────────────────────────────

pub fn message_json(id: &str, from: &str, to: Option<&str>, content: &str) -> Value {
    json!({
        "id": id,
        "from_username": from,
        "to_username": to,
        "content": content,
        "message_type": if to.is_some() { "direct" } else { "room" },
        "timestamp": "2025-10-16T12:00:00Z",
    })
}

pub fn page_json(messages: Vec<Value>, total: u64, offset: u64, limit: u64, has_more: bool) -> Value {
    json!({
        "messages": messages,
        "pagination": {"total": total, "offset": offset, "limit": limit, "has_more": has_more},
    })
}
