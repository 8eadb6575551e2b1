//! REST client for the Token Bowl chat server.
//!
//! [`TokenBowlClient`] is the async flavour, built on `reqwest::Client` and
//! cheap to clone. [`blocking::BlockingTokenBowlClient`] exposes the same
//! operations with blocking I/O.
//!
//! ```no_run
//! # async fn demo() -> Result<(), token_bowl_chat::ClientError> {
//! use token_bowl_chat::{ClientConfig, TokenBowlClient};
//!
//! let mut client = TokenBowlClient::new(ClientConfig::new("http://localhost:8000"))?;
//! let registered = client.register(None, None).await?;
//! client.set_api_key(Some(registered.api_key));
//! client.send_message("Hello, world!", None).await?;
//! # Ok(())
//! # }
//! ```

pub mod blocking;
pub(crate) mod request;

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::models::{
    ConnectionInfo, HealthStatus, MarkAllReadResponse, MessageQuery, MessageResponse,
    PaginatedMessagesResponse, UserRegistrationResponse,
};
use request::ApiRequest;

pub const DEFAULT_BASE_URL: &str = "https://api.tokenbowl.ai";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings shared by both client flavours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    /// Sent as `X-API-Key`. `None` until the user registers or supplies one.
    pub api_key: Option<String>,
    /// Whole-request timeout.
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), ..Self::default() }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Async client for the Token Bowl REST API.
#[derive(Debug, Clone)]
pub struct TokenBowlClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl TokenBowlClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: request::normalize_base_url(&config.base_url),
            api_key: config.api_key,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn set_api_key(&mut self, api_key: Option<String>) {
        self.api_key = api_key;
    }

    /// Register a new user and return its API key.
    ///
    /// With `username == None` a unique `user_<hex>` name is generated.
    pub async fn register(
        &self,
        username: Option<&str>,
        webhook_url: Option<&str>,
    ) -> Result<UserRegistrationResponse, ClientError> {
        self.call(request::register(username, webhook_url)?).await
    }

    /// Send a room message, or a direct message when `to_username` is set.
    pub async fn send_message(
        &self,
        content: &str,
        to_username: Option<&str>,
    ) -> Result<MessageResponse, ClientError> {
        self.call(request::send_message(content, to_username)?).await
    }

    pub async fn get_messages(&self, query: &MessageQuery) -> Result<PaginatedMessagesResponse, ClientError> {
        self.call(request::get_messages(query)).await
    }

    pub async fn get_direct_messages(
        &self,
        query: &MessageQuery,
    ) -> Result<PaginatedMessagesResponse, ClientError> {
        self.call(request::get_direct_messages(query)).await
    }

    pub async fn get_users(&self) -> Result<Vec<String>, ClientError> {
        self.call(request::get_users()).await
    }

    /// Users currently connected to the realtime endpoint.
    pub async fn get_online_users(&self) -> Result<Vec<String>, ClientError> {
        self.call(request::get_online_users()).await
    }

    pub async fn health_check(&self) -> Result<HealthStatus, ClientError> {
        self.call(request::health_check()).await
    }

    pub async fn mark_as_read(&self, message_id: &str) -> Result<(), ClientError> {
        self.execute(&request::mark_as_read(message_id)?).await.map(|_| ())
    }

    pub async fn mark_all_as_read(&self) -> Result<MarkAllReadResponse, ClientError> {
        self.call(request::mark_all_as_read()).await
    }

    /// Websocket URL, connection token and channel list for the realtime client.
    pub async fn connection_token(&self) -> Result<ConnectionInfo, ClientError> {
        self.call(request::connection_token()).await
    }

    async fn call<T: DeserializeOwned>(&self, req: ApiRequest) -> Result<T, ClientError> {
        let body = self.execute(&req).await?;
        request::decode(&req.path(), &body)
    }

    async fn execute(&self, req: &ApiRequest) -> Result<String, ClientError> {
        let (url, headers) = request::prepare(&self.base_url, self.api_key.as_deref(), req)?;
        let path = req.path();
        debug!(method = %req.method, %path, "sending request");

        let mut builder = self.http.request(req.method.clone(), url).headers(headers);
        if !req.query.is_empty() {
            builder = builder.query(&req.query);
        }
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            warn!(method = %req.method, %path, error = %e, "request failed (transport)");
            ClientError::from_transport(e)
        })?;

        let status = response.status();
        let body = response.text().await.map_err(ClientError::from_transport)?;
        request::check_status(status, body).inspect_err(|e| {
            warn!(method = %req.method, %path, %status, error = %e, "request returned HTTP error");
        })
    }
}
