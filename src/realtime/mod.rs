//! Realtime message stream over Centrifugo websockets.
//!
//! # Lifecycle
//!
//! [`RealtimeClient::connect`] fetches a connection token over REST, opens the
//! websocket it names and completes the connect handshake before returning a
//! [`RealtimeHandle`]. From then on a background task owns the socket: it
//! subscribes to every channel listed with the token, answers pings, turns
//! publications into [`RealtimeEvent`]s and, when the session drops for a
//! non-terminal reason, reconnects with exponential backoff.
//!
//! The task stops when the shared [`CancellationToken`] is cancelled, when the
//! handle is dropped (even on an idle session), or when reconnect attempts are
//! exhausted.
//!
//! Centrifugo does not accept client publications here; send through
//! [`RealtimeHandle::client`] instead.

pub mod event;
pub mod protocol;

use std::collections::HashMap;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::TokenBowlClient;
use crate::error::ClientError;
use protocol::{Command, Frame, ReplyError};

pub use event::RealtimeEvent;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const CONNECT_COMMAND_ID: u32 = 1;

/// Close code reported when the client itself ends the session.
const NORMAL_CLOSE: u16 = 1000;
/// Close code reported when the transport vanished without a close frame.
const ABNORMAL_CLOSE: u16 = 1006;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeConfig {
    /// Bound on websocket open plus connect handshake.
    pub connect_timeout: Duration,
    /// Consecutive failed reconnects before giving up. `0` disables reconnects.
    pub max_reconnect_attempts: u32,
    pub reconnect_backoff: Duration,
    pub reconnect_backoff_max: Duration,
    /// Capacity of the event queue between the socket task and the handle.
    pub event_buffer: usize,
    /// Client name announced in the connect command.
    pub client_name: String,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            max_reconnect_attempts: 5,
            reconnect_backoff: Duration::from_millis(500),
            reconnect_backoff_max: Duration::from_secs(20),
            event_buffer: 256,
            client_name: "token-bowl-rust".to_string(),
        }
    }
}

/// Factory for realtime sessions. Holds the REST client used for tokens.
#[derive(Debug, Clone)]
pub struct RealtimeClient {
    rest: TokenBowlClient,
    config: RealtimeConfig,
}

impl RealtimeClient {
    pub fn new(rest: TokenBowlClient, config: RealtimeConfig) -> Self {
        Self { rest, config }
    }

    pub fn client(&self) -> &TokenBowlClient {
        &self.rest
    }

    /// Connect and start streaming events.
    ///
    /// Fails without touching the network when no API key is configured.
    pub async fn connect(&self, shutdown: CancellationToken) -> Result<RealtimeHandle, ClientError> {
        if self.rest.api_key().is_none_or(str::is_empty) {
            return Err(ClientError::Authentication(
                "API key is required for realtime connection".into(),
            ));
        }

        let session = establish(&self.rest, &self.config).await?;

        let (event_tx, event_rx) = mpsc::channel(self.config.event_buffer.max(1));
        let (connected_tx, connected_rx) = watch::channel(true);

        let worker = Worker {
            rest: self.rest.clone(),
            config: self.config.clone(),
            events: event_tx,
            connected: connected_tx,
            shutdown: shutdown.clone(),
        };
        let task = tokio::spawn(worker.run(session));

        Ok(RealtimeHandle {
            rest: self.rest.clone(),
            events: event_rx,
            connected: connected_rx,
            shutdown,
            task,
        })
    }
}

// ── RealtimeHandle ────────────────────────────────────────────────────────────

/// Caller side of a running realtime session.
pub struct RealtimeHandle {
    rest: TokenBowlClient,
    events: mpsc::Receiver<RealtimeEvent>,
    connected: watch::Receiver<bool>,
    shutdown: CancellationToken,
    task: JoinHandle<Result<(), ClientError>>,
}

impl RealtimeHandle {
    /// Next event, or `None` once the background task has exited and the
    /// queue is drained.
    pub async fn next_event(&mut self) -> Option<RealtimeEvent> {
        self.events.recv().await
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Wait for the session to be (re)established.
    pub async fn wait_until_connected(&mut self, timeout: Duration) -> Result<(), ClientError> {
        tokio::time::timeout(timeout, self.connected.wait_for(|connected| *connected))
            .await
            .map_err(|_| ClientError::Timeout("connection timeout".into()))?
            .map(|_| ())
            .map_err(|_| ClientError::Network("realtime task has exited".into()))
    }

    /// REST client bound to the same server and API key.
    pub fn client(&self) -> &TokenBowlClient {
        &self.rest
    }

    /// Close the session and wait for the background task.
    pub async fn disconnect(self) -> Result<(), ClientError> {
        self.shutdown.cancel();
        self.join().await
    }

    /// Wait for the background task to finish.
    ///
    /// The event queue is dropped first, which a still-running session treats
    /// as a shutdown request.
    pub async fn join(self) -> Result<(), ClientError> {
        drop(self.events);
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(ClientError::Network(format!("realtime task panicked: {e}"))),
        }
    }
}

// ── Session setup ─────────────────────────────────────────────────────────────

struct Session {
    ws: WsStream,
    client_id: String,
    channels: Vec<String>,
}

fn ws_error(e: tungstenite::Error) -> ClientError {
    ClientError::Network(format!("websocket error: {e}"))
}

fn connect_rejected(error: ReplyError) -> ClientError {
    let message = format!("realtime connect rejected: {} (code {})", error.message, error.code);
    match error.code {
        protocol::UNAUTHORIZED_CODE | protocol::TOKEN_EXPIRED_CODE => ClientError::Authentication(message),
        _ => ClientError::Network(message),
    }
}

/// Token fetch, websocket open and connect handshake.
async fn establish(rest: &TokenBowlClient, config: &RealtimeConfig) -> Result<Session, ClientError> {
    let info = rest.connection_token().await?;
    debug!(url = %info.url, channels = info.channels.len(), "fetched realtime connection token");

    let handshake = async {
        let (mut ws, _) = connect_async(info.url.as_str()).await.map_err(ws_error)?;
        let command = Command::connect(CONNECT_COMMAND_ID, &info.token, &config.client_name);
        ws.send(Message::Text(command.encode())).await.map_err(ws_error)?;
        let result = await_connect_reply(&mut ws).await?;
        Ok::<_, ClientError>((ws, result))
    };

    let (ws, result) = tokio::time::timeout(config.connect_timeout, handshake)
        .await
        .map_err(|_| ClientError::Timeout(format!("realtime connect to {} timed out", info.url)))??;

    info!(client_id = %result.client, url = %info.url, "connected to realtime server");
    Ok(Session { ws, client_id: result.client, channels: info.channels })
}

async fn await_connect_reply(ws: &mut WsStream) -> Result<protocol::ConnectResult, ClientError> {
    while let Some(message) = ws.next().await {
        match message.map_err(ws_error)? {
            Message::Text(text) => {
                for frame in protocol::decode_frames(&text) {
                    match frame? {
                        Frame::Connected { id: CONNECT_COMMAND_ID, result } => return Ok(result),
                        Frame::Error { id: CONNECT_COMMAND_ID, error } => return Err(connect_rejected(error)),
                        Frame::Ping => ws.send(Message::Text(protocol::PONG.to_string())).await.map_err(ws_error)?,
                        _ => {}
                    }
                }
            }
            Message::Close(frame) => {
                let reason = frame.map(|f| format!("{} {}", u16::from(f.code), f.reason)).unwrap_or_default();
                return Err(ClientError::Network(format!("closed during handshake: {reason}")));
            }
            _ => {}
        }
    }
    Err(ClientError::Network("connection closed before connect reply".into()))
}

// ── Worker ────────────────────────────────────────────────────────────────────

enum Outcome {
    /// Cancelled locally or nobody is listening any more.
    Shutdown,
    Lost { code: u16, reason: String, reconnect: bool },
}

struct Worker {
    rest: TokenBowlClient,
    config: RealtimeConfig,
    events: mpsc::Sender<RealtimeEvent>,
    connected: watch::Sender<bool>,
    shutdown: CancellationToken,
}

impl Worker {
    async fn run(self, mut session: Session) -> Result<(), ClientError> {
        loop {
            self.connected.send_replace(true);
            let client_id = session.client_id.clone();
            let outcome = if self.emit(RealtimeEvent::Connected { client_id }).await {
                self.drive(&mut session).await
            } else {
                Outcome::Shutdown
            };
            self.connected.send_replace(false);

            match outcome {
                Outcome::Shutdown => {
                    if let Err(e) = session.ws.close(None).await {
                        debug!(error = %e, "error while closing websocket");
                    }
                    info!("realtime session closed");
                    let _ = self.events.try_send(RealtimeEvent::Disconnected {
                        code: NORMAL_CLOSE,
                        reason: "client disconnect".into(),
                        reconnect: false,
                    });
                    return Ok(());
                }
                Outcome::Lost { code, reason, reconnect } => {
                    let reconnect = reconnect && self.config.max_reconnect_attempts > 0;
                    warn!(code, %reason, reconnect, "realtime session lost");
                    if !self.emit(RealtimeEvent::Disconnected { code, reason, reconnect }).await || !reconnect {
                        return Ok(());
                    }
                }
            }

            session = match self.reconnect().await? {
                Some(session) => session,
                None => return Ok(()),
            };
        }
    }

    /// Retry [`establish`] with exponential backoff. `Ok(None)` means shutdown
    /// was requested while waiting.
    async fn reconnect(&self) -> Result<Option<Session>, ClientError> {
        let mut backoff = self.config.reconnect_backoff;
        for attempt in 1..=self.config.max_reconnect_attempts {
            debug!(attempt, ?backoff, "scheduling realtime reconnect");
            tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(None),
                _ = self.events.closed() => return Ok(None),
                _ = tokio::time::sleep(backoff) => {}
            }

            let result = tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(None),
                _ = self.events.closed() => return Ok(None),
                result = establish(&self.rest, &self.config) => result,
            };
            match result {
                Ok(session) => return Ok(Some(session)),
                Err(e @ ClientError::Authentication(_)) => {
                    warn!(error = %e, "realtime reconnect rejected");
                    self.emit(RealtimeEvent::Error(e.to_string())).await;
                    return Err(e);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "realtime reconnect failed");
                    if !self.emit(RealtimeEvent::Error(e.to_string())).await {
                        return Ok(None);
                    }
                }
            }
            backoff = next_backoff(backoff, self.config.reconnect_backoff_max);
        }

        let message = format!(
            "giving up after {} reconnect attempts",
            self.config.max_reconnect_attempts
        );
        self.emit(RealtimeEvent::Error(message.clone())).await;
        Err(ClientError::Network(message))
    }

    /// Subscribe, then pump frames until the session ends.
    async fn drive(&self, session: &mut Session) -> Outcome {
        let mut pending: HashMap<u32, String> = HashMap::new();
        for (id, channel) in (CONNECT_COMMAND_ID + 1..).zip(session.channels.iter()) {
            let command = Command::subscribe(id, channel);
            if let Err(e) = session.ws.send(Message::Text(command.encode())).await {
                return lost(e.to_string());
            }
            pending.insert(id, channel.clone());
        }

        loop {
            let message = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Outcome::Shutdown,
                _ = self.events.closed() => return Outcome::Shutdown,
                message = session.ws.next() => message,
            };

            let text = match message {
                None => return lost("connection closed".into()),
                Some(Err(e)) => return lost(e.to_string()),
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.into_owned()))
                        .unwrap_or((ABNORMAL_CLOSE, String::new()));
                    return Outcome::Lost { code, reason, reconnect: !protocol::is_terminal_close(code) };
                }
                Some(Ok(_)) => continue,
            };

            for frame in protocol::decode_frames(&text) {
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(error = %e, "dropping undecodable realtime message");
                        if !self.emit(RealtimeEvent::Error(e.to_string())).await {
                            return Outcome::Shutdown;
                        }
                        continue;
                    }
                };
                let event = match frame {
                    Frame::Ping => {
                        if let Err(e) = session.ws.send(Message::Text(protocol::PONG.to_string())).await {
                            return lost(e.to_string());
                        }
                        continue;
                    }
                    Frame::Subscribed { id } => match pending.remove(&id) {
                        Some(channel) => {
                            info!(%channel, "subscribed to channel");
                            RealtimeEvent::Subscribed { channel }
                        }
                        None => continue,
                    },
                    Frame::Error { id, error } => {
                        let message = match pending.remove(&id) {
                            Some(channel) => format!("subscribe to {channel} failed: {} (code {})", error.message, error.code),
                            None => format!("server error: {} (code {})", error.message, error.code),
                        };
                        warn!(%message, "realtime error reply");
                        RealtimeEvent::Error(message)
                    }
                    Frame::Publication { channel, data } => RealtimeEvent::from_publication(channel, data),
                    Frame::Disconnect(info) => {
                        let reconnect = info.reconnect && !protocol::is_terminal_close(info.code);
                        return Outcome::Lost { code: info.code, reason: info.reason, reconnect };
                    }
                    Frame::Connected { .. } | Frame::Ignored => continue,
                };
                if !self.emit(event).await {
                    return Outcome::Shutdown;
                }
            }
        }
    }

    /// Queue an event. `false` when the handle is gone or shutdown started.
    async fn emit(&self, event: RealtimeEvent) -> bool {
        tokio::select! {
            sent = self.events.send(event) => sent.is_ok(),
            _ = self.shutdown.cancelled() => false,
        }
    }
}

fn lost(reason: String) -> Outcome {
    Outcome::Lost { code: ABNORMAL_CLOSE, reason, reconnect: true }
}

fn next_backoff(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}
