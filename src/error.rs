//! Error types for the Token Bowl client.
//!
//! Every fallible operation in the crate returns [`ClientError`]. HTTP status
//! codes are classified by [`ClientError::from_status`]; transport failures by
//! [`ClientError::from_transport`].

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("authentication error: {0}")]
    Authentication(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("rate limited: {0}")]
    RateLimit(String),

    #[error("server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("unexpected HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Classify a failing HTTP response by status code.
    ///
    /// `body` is the raw response text; see [`error_message`] for how the
    /// human-readable message is extracted from it.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = error_message(status, body);
        match status.as_u16() {
            401 => ClientError::Authentication(message),
            404 => ClientError::NotFound(message),
            409 => ClientError::Conflict(message),
            422 => ClientError::Validation(message),
            429 => ClientError::RateLimit(message),
            s if s >= 500 => ClientError::Server { status: s, message },
            s => ClientError::Http { status: s, message },
        }
    }

    /// Classify a transport-level `reqwest` failure.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout(err.to_string())
        } else if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else {
            ClientError::Network(err.to_string())
        }
    }

    /// HTTP status carried by this error, when it came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Server { status, .. } | ClientError::Http { status, .. } => Some(*status),
            ClientError::NotFound(_) => Some(404),
            ClientError::Conflict(_) => Some(409),
            ClientError::RateLimit(_) => Some(429),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    detail: Detail,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Detail {
    Text(String),
    Entries(Vec<DetailEntry>),
}

#[derive(Deserialize)]
struct DetailEntry {
    msg: String,
}

/// Extract a readable message from an error response body.
///
/// `{"detail": "..."}` yields the detail string, a list of validation entries
/// yields their `msg` fields joined with `; `, any other non-empty body is
/// returned verbatim, and an empty body becomes `HTTP <status>`.
pub fn error_message(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return format!("HTTP {}", status.as_u16());
    }
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope { detail: Detail::Text(text) }) => text,
        Ok(ErrorEnvelope { detail: Detail::Entries(entries) }) if !entries.is_empty() => entries
            .into_iter()
            .map(|e| e.msg)
            .collect::<Vec<_>>()
            .join("; "),
        _ => body.to_string(),
    }
}
