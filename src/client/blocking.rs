//! Blocking flavour of the REST client.
//!
//! Backed by `reqwest::blocking`, which runs its own internal runtime: do not
//! call it from inside an async context.

use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::ClientConfig;
use super::request::{self, ApiRequest};
use crate::error::ClientError;
use crate::models::{
    ConnectionInfo, HealthStatus, MarkAllReadResponse, MessageQuery, MessageResponse,
    PaginatedMessagesResponse, UserRegistrationResponse,
};

#[derive(Debug, Clone)]
pub struct BlockingTokenBowlClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl BlockingTokenBowlClient {
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

    pub fn register(
        &self,
        username: Option<&str>,
        webhook_url: Option<&str>,
    ) -> Result<UserRegistrationResponse, ClientError> {
        self.call(request::register(username, webhook_url)?)
    }

    pub fn send_message(&self, content: &str, to_username: Option<&str>) -> Result<MessageResponse, ClientError> {
        self.call(request::send_message(content, to_username)?)
    }

    pub fn get_messages(&self, query: &MessageQuery) -> Result<PaginatedMessagesResponse, ClientError> {
        self.call(request::get_messages(query))
    }

    pub fn get_direct_messages(&self, query: &MessageQuery) -> Result<PaginatedMessagesResponse, ClientError> {
        self.call(request::get_direct_messages(query))
    }

    pub fn get_users(&self) -> Result<Vec<String>, ClientError> {
        self.call(request::get_users())
    }

    pub fn get_online_users(&self) -> Result<Vec<String>, ClientError> {
        self.call(request::get_online_users())
    }

    pub fn health_check(&self) -> Result<HealthStatus, ClientError> {
        self.call(request::health_check())
    }

    pub fn mark_as_read(&self, message_id: &str) -> Result<(), ClientError> {
        self.execute(&request::mark_as_read(message_id)?).map(|_| ())
    }

    pub fn mark_all_as_read(&self) -> Result<MarkAllReadResponse, ClientError> {
        self.call(request::mark_all_as_read())
    }

    pub fn connection_token(&self) -> Result<ConnectionInfo, ClientError> {
        self.call(request::connection_token())
    }

    fn call<T: DeserializeOwned>(&self, req: ApiRequest) -> Result<T, ClientError> {
        let body = self.execute(&req)?;
        request::decode(&req.path(), &body)
    }

    fn execute(&self, req: &ApiRequest) -> Result<String, ClientError> {
        let (url, headers) = request::prepare(&self.base_url, self.api_key.as_deref(), req)?;
        let path = req.path();
        debug!(method = %req.method, %path, "sending blocking request");

        let mut builder = self.http.request(req.method.clone(), url).headers(headers);
        if !req.query.is_empty() {
            builder = builder.query(&req.query);
        }
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        let response = builder.send().map_err(|e| {
            warn!(method = %req.method, %path, error = %e, "request failed (transport)");
            ClientError::from_transport(e)
        })?;

        let status = response.status();
        let body = response.text().map_err(ClientError::from_transport)?;
        request::check_status(status, body).inspect_err(|e| {
            warn!(method = %req.method, %path, %status, error = %e, "request returned HTTP error");
        })
    }
}
