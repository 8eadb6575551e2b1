//! Centrifugo client protocol, JSON encoding.
//!
//! Commands carry an `id` and exactly one request object. The server answers
//! with a reply carrying the same `id`, or sends asynchronous pushes with no
//! `id`. A bare `{}` is a ping and must be answered with `{}`. One websocket
//! text frame may hold several newline-delimited JSON objects.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ClientError;

/// Reply error codes meaning the token was rejected or has expired.
pub const UNAUTHORIZED_CODE: u32 = 101;
pub const TOKEN_EXPIRED_CODE: u32 = 109;

// ── Outbound ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct Command {
    pub id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect: Option<ConnectRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<SubscribeRequest>,
}

#[derive(Debug, Serialize)]
pub struct ConnectRequest {
    pub token: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct SubscribeRequest {
    pub channel: String,
}

impl Command {
    pub fn connect(id: u32, token: &str, name: &str) -> Self {
        Self {
            id,
            connect: Some(ConnectRequest { token: token.to_string(), name: name.to_string() }),
            subscribe: None,
        }
    }

    pub fn subscribe(id: u32, channel: &str) -> Self {
        Self {
            id,
            connect: None,
            subscribe: Some(SubscribeRequest { channel: channel.to_string() }),
        }
    }

    pub fn encode(&self) -> String {
        // Plain structs of strings and integers always serialize.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Answer to a server ping.
pub const PONG: &str = "{}";

// ── Inbound ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct RawReply {
    #[serde(default)]
    id: u32,
    #[serde(default)]
    error: Option<ReplyError>,
    #[serde(default)]
    connect: Option<ConnectResult>,
    #[serde(default)]
    subscribe: Option<Value>,
    #[serde(default)]
    push: Option<RawPush>,
}

#[derive(Debug, Deserialize)]
struct RawPush {
    #[serde(default)]
    channel: String,
    #[serde(default, rename = "pub")]
    publication: Option<RawPublication>,
    #[serde(default)]
    disconnect: Option<DisconnectInfo>,
}

#[derive(Debug, Deserialize)]
struct RawPublication {
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReplyError {
    pub code: u32,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ConnectResult {
    #[serde(default)]
    pub client: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DisconnectInfo {
    pub code: u16,
    #[serde(default)]
    pub reason: String,
    #[serde(default = "default_reconnect")]
    pub reconnect: bool,
}

fn default_reconnect() -> bool {
    true
}

/// One decoded server message.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Ping,
    Error { id: u32, error: ReplyError },
    Connected { id: u32, result: ConnectResult },
    Subscribed { id: u32 },
    Publication { channel: String, data: Value },
    Disconnect(DisconnectInfo),
    /// Replies and pushes this client does not act on.
    Ignored,
}

impl From<RawReply> for Frame {
    fn from(raw: RawReply) -> Self {
        if let Some(push) = raw.push {
            return match (push.publication, push.disconnect) {
                (Some(publication), _) => Frame::Publication { channel: push.channel, data: publication.data },
                (None, Some(info)) => Frame::Disconnect(info),
                (None, None) => Frame::Ignored,
            };
        }
        if let Some(error) = raw.error {
            return Frame::Error { id: raw.id, error };
        }
        if let Some(result) = raw.connect {
            return Frame::Connected { id: raw.id, result };
        }
        if raw.subscribe.is_some() {
            return Frame::Subscribed { id: raw.id };
        }
        if raw.id == 0 {
            return Frame::Ping;
        }
        Frame::Ignored
    }
}

/// Decode every JSON object in a text frame. Lines decode independently, so
/// one malformed line does not cost the others.
pub fn decode_frames(text: &str) -> Vec<Result<Frame, ClientError>> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            serde_json::from_str::<RawReply>(line)
                .map(Frame::from)
                .map_err(|e| ClientError::Decode(format!("invalid realtime frame: {e}")))
        })
        .collect()
}

/// Whether a websocket close code forbids reconnecting.
pub fn is_terminal_close(code: u16) -> bool {
    matches!(code, 3500..=3999 | 4500..=4999)
}
