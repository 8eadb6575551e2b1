//! Transport-agnostic request descriptors shared by the async and blocking
//! clients.
//!
//! Each REST operation is described once as an [`ApiRequest`]; the two client
//! flavours only differ in how they put it on the wire.

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::error::ClientError;
use crate::models::{MessageQuery, SendMessageRequest, UserRegistration};

pub(crate) const API_KEY_HEADER: HeaderName = HeaderName::from_static("x-api-key");

#[derive(Debug, Clone)]
pub(crate) struct ApiRequest {
    pub method: Method,
    pub segments: Vec<String>,
    pub requires_auth: bool,
    pub query: Vec<(&'static str, String)>,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    fn new(method: Method, segments: &[&str]) -> Self {
        Self {
            method,
            segments: segments.iter().map(|s| s.to_string()).collect(),
            requires_auth: false,
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(segments: &[&str]) -> Self {
        Self::new(Method::GET, segments)
    }

    pub fn post(segments: &[&str]) -> Self {
        Self::new(Method::POST, segments)
    }

    pub fn authenticated(mut self) -> Self {
        self.requires_auth = true;
        self
    }

    pub fn query(mut self, pairs: Vec<(&'static str, String)>) -> Self {
        self.query = pairs;
        self
    }

    pub fn json<B: Serialize>(mut self, body: &B) -> Result<Self, ClientError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ClientError::Decode(format!("failed to encode request body: {e}")))?;
        self.body = Some(value);
        Ok(self)
    }

    /// Path for log lines, e.g. `/messages/direct`.
    pub fn path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }
}

// ── Operations ────────────────────────────────────────────────────────────────

pub(crate) fn register(username: Option<&str>, webhook_url: Option<&str>) -> Result<ApiRequest, ClientError> {
    let registration = UserRegistration {
        username: username.map(str::to_string).unwrap_or_else(generate_username),
        webhook_url: webhook_url.map(str::to_string),
    };
    ApiRequest::post(&["register"]).json(&registration)
}

pub(crate) fn send_message(content: &str, to_username: Option<&str>) -> Result<ApiRequest, ClientError> {
    let request = SendMessageRequest::new(content, to_username.map(str::to_string))?;
    ApiRequest::post(&["messages"]).authenticated().json(&request)
}

pub(crate) fn get_messages(query: &MessageQuery) -> ApiRequest {
    ApiRequest::get(&["messages"]).authenticated().query(query.to_pairs())
}

pub(crate) fn get_direct_messages(query: &MessageQuery) -> ApiRequest {
    ApiRequest::get(&["messages", "direct"]).authenticated().query(query.to_pairs())
}

pub(crate) fn get_users() -> ApiRequest {
    ApiRequest::get(&["users"]).authenticated()
}

pub(crate) fn get_online_users() -> ApiRequest {
    ApiRequest::get(&["users", "online"]).authenticated()
}

pub(crate) fn health_check() -> ApiRequest {
    ApiRequest::get(&["health"])
}

pub(crate) fn mark_as_read(message_id: &str) -> Result<ApiRequest, ClientError> {
    if message_id.trim().is_empty() {
        return Err(ClientError::Validation("message id must not be empty".into()));
    }
    Ok(ApiRequest::post(&["messages", message_id, "read"]).authenticated())
}

pub(crate) fn mark_all_as_read() -> ApiRequest {
    ApiRequest::post(&["messages", "mark-all-read"]).authenticated()
}

pub(crate) fn connection_token() -> ApiRequest {
    ApiRequest::get(&["centrifugo", "connection-token"]).authenticated()
}

// ── Shared plumbing ───────────────────────────────────────────────────────────

/// `user_` followed by the first 12 hex characters of a random UUID.
pub(crate) fn generate_username() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("user_{}", &hex[..12])
}

pub(crate) fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Resolve the URL and headers for `req`, enforcing the API key requirement
/// before anything touches the network.
pub(crate) fn prepare(
    base_url: &str,
    api_key: Option<&str>,
    req: &ApiRequest,
) -> Result<(Url, HeaderMap), ClientError> {
    let api_key = api_key.filter(|k| !k.is_empty());
    if req.requires_auth && api_key.is_none() {
        return Err(ClientError::Authentication("API key required for this operation".into()));
    }

    let mut url = Url::parse(base_url)
        .map_err(|e| ClientError::Config(format!("invalid base url '{base_url}': {e}")))?;
    url.path_segments_mut()
        .map_err(|_| ClientError::Config(format!("base url '{base_url}' cannot carry a path")))?
        .pop_if_empty()
        .extend(req.segments.iter());

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(key) = api_key {
        let value = HeaderValue::from_str(key)
            .map_err(|_| ClientError::Authentication("API key contains invalid header characters".into()))?;
        headers.insert(API_KEY_HEADER, value);
    }

    Ok((url, headers))
}

/// Turn a status + body pair into either the body or a classified error.
pub(crate) fn check_status(status: StatusCode, body: String) -> Result<String, ClientError> {
    if status.is_client_error() || status.is_server_error() {
        Err(ClientError::from_status(status, &body))
    } else {
        Ok(body)
    }
}

pub(crate) fn decode<T: DeserializeOwned>(path: &str, body: &str) -> Result<T, ClientError> {
    serde_json::from_str(body).map_err(|e| ClientError::Decode(format!("invalid response from {path}: {e}")))
}
