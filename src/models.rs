//! Wire types exchanged with the Token Bowl server.
//!
//! All response types ignore unknown fields so newer servers stay compatible.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ClientError;

/// Maximum message length accepted by the server, in characters.
pub const MAX_CONTENT_CHARS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Room,
    Direct,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: String,
    pub from_username: String,
    #[serde(default)]
    pub to_username: Option<String>,
    pub content: String,
    pub message_type: MessageType,
    #[serde(deserialize_with = "utc_timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// RFC 3339, or a naive `YYYY-MM-DDTHH:MM:SS[.fff]` taken as UTC.
fn utc_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| serde::de::Error::custom(format!("invalid timestamp '{raw}': {e}")))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationMetadata {
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginatedMessagesResponse {
    pub messages: Vec<MessageResponse>,
    pub pagination: PaginationMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRegistration {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRegistrationResponse {
    pub username: String,
    pub api_key: String,
    #[serde(default)]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_username: Option<String>,
}

impl SendMessageRequest {
    /// Build a request, rejecting content outside 1..=10000 characters.
    pub fn new(content: impl Into<String>, to_username: Option<String>) -> Result<Self, ClientError> {
        let content = content.into();
        let len = content.chars().count();
        if len == 0 {
            return Err(ClientError::Validation("message content must not be empty".into()));
        }
        if len > MAX_CONTENT_CHARS {
            return Err(ClientError::Validation(format!(
                "message content is {len} characters, maximum is {MAX_CONTENT_CHARS}"
            )));
        }
        Ok(Self { content, to_username })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadCountResponse {
    #[serde(default)]
    pub unread_room_messages: u64,
    #[serde(default)]
    pub unread_direct_messages: u64,
    #[serde(default)]
    pub total_unread: u64,
}

/// Realtime bootstrap data returned by `/centrifugo/connection-token`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub url: String,
    pub token: String,
    #[serde(default)]
    pub channels: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkAllReadResponse {
    #[serde(default)]
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Pagination parameters for message listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageQuery {
    pub limit: u32,
    pub offset: u32,
    pub since: Option<DateTime<Utc>>,
}

impl Default for MessageQuery {
    fn default() -> Self {
        Self { limit: 50, offset: 0, since: None }
    }
}

impl MessageQuery {
    pub fn new(limit: u32, offset: u32) -> Self {
        Self { limit, offset, since: None }
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Query pairs in wire order: `limit`, `offset`, then `since` when set.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("limit", self.limit.to_string()),
            ("offset", self.offset.to_string()),
        ];
        if let Some(since) = self.since {
            pairs.push(("since", since.to_rfc3339_opts(SecondsFormat::AutoSi, true)));
        }
        pairs
    }
}
