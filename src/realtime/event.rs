//! Typed events delivered by the realtime client.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::models::{MessageResponse, UnreadCountResponse};

#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    /// Connect handshake accepted. Emitted again after every reconnect.
    Connected { client_id: String },
    Subscribed { channel: String },
    Message(MessageResponse),
    ReadReceipt { message_id: String, read_by: String },
    UnreadCount(UnreadCountResponse),
    Typing { username: String, to_username: Option<String> },
    /// A publication that matched none of the known payload shapes.
    Publication { channel: String, data: Value },
    /// Non-fatal problem, e.g. a rejected subscription.
    Error(String),
    Disconnected { code: u16, reason: String, reconnect: bool },
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TypedPayload {
    ReadReceipt {
        message_id: String,
        read_by: String,
    },
    UnreadCount(UnreadCountResponse),
    Typing {
        username: String,
        #[serde(default)]
        to_username: Option<String>,
    },
}

impl From<TypedPayload> for RealtimeEvent {
    fn from(payload: TypedPayload) -> Self {
        match payload {
            TypedPayload::ReadReceipt { message_id, read_by } => RealtimeEvent::ReadReceipt { message_id, read_by },
            TypedPayload::UnreadCount(counts) => RealtimeEvent::UnreadCount(counts),
            TypedPayload::Typing { username, to_username } => RealtimeEvent::Typing { username, to_username },
        }
    }
}

impl RealtimeEvent {
    /// Classify publication data. Never fails: unknown shapes come back as
    /// [`RealtimeEvent::Publication`].
    pub fn from_publication(channel: String, data: Value) -> Self {
        let kind = data.get("type").and_then(Value::as_str);
        let decoded = if matches!(kind, Some("read_receipt" | "unread_count" | "typing")) {
            TypedPayload::deserialize(&data).map(RealtimeEvent::from).ok()
        } else {
            MessageResponse::deserialize(&data).map(RealtimeEvent::Message).ok()
        };

        decoded.unwrap_or_else(|| {
            debug!(%channel, "unrecognised publication payload");
            RealtimeEvent::Publication { channel, data }
        })
    }
}
