//! Async REST client against the mock server.

mod common;

use std::time::Duration;

use axum::http::Method;
use chrono::{TimeZone, Utc};
use serde_json::json;

use common::{MockServer, message_json, page_json};
use token_bowl_chat::{ClientConfig, ClientError, MessageQuery, MessageType, TokenBowlClient};

fn client(server: &MockServer) -> TokenBowlClient {
    TokenBowlClient::new(ClientConfig::new(server.base_url())).unwrap()
}

fn authed(server: &MockServer) -> TokenBowlClient {
    TokenBowlClient::new(ClientConfig::new(server.base_url()).with_api_key("test-key-123")).unwrap()
}

#[tokio::test]
async fn register_success() {
    let server = MockServer::start();
    server.stub(
        Method::POST,
        "/register",
        201,
        json!({"username": "alice", "api_key": "test-key-123", "webhook_url": null}),
    );

    let response = client(&server).register(Some("alice"), None).await.unwrap();

    assert_eq!(response.username, "alice");
    assert_eq!(response.api_key, "test-key-123");
    assert_eq!(response.webhook_url, None);

    let req = server.last_request();
    assert_eq!(req.body, Some(json!({"username": "alice"})));
    assert_eq!(req.api_key, None);
    assert_eq!(req.content_type.as_deref(), Some("application/json"));
}

#[tokio::test]
async fn register_with_webhook_and_generated_username() {
    let server = MockServer::start();
    let webhook = "https://example.com/webhook";
    server.stub(
        Method::POST,
        "/register",
        201,
        json!({"username": "user_0123456789ab", "api_key": "k", "webhook_url": webhook}),
    );

    let response = client(&server).register(None, Some(webhook)).await.unwrap();
    assert_eq!(response.webhook_url.as_deref(), Some(webhook));

    let body = server.last_request().body.unwrap();
    let username = body["username"].as_str().unwrap();
    assert!(username.starts_with("user_") && username.len() == 17, "got {username}");
    assert_eq!(body["webhook_url"], webhook);
}

#[tokio::test]
async fn register_conflict() {
    let server = MockServer::start();
    server.stub(Method::POST, "/register", 409, json!({"detail": "Username already exists"}));

    let err = client(&server).register(Some("alice"), None).await.unwrap_err();
    assert!(matches!(err, ClientError::Conflict(ref m) if m == "Username already exists"), "got {err:?}");
}

#[tokio::test]
async fn send_room_message() {
    let server = MockServer::start();
    server.stub(Method::POST, "/messages", 201, message_json("msg-1", "alice", None, "Hello, room!"));

    let response = authed(&server).send_message("Hello, room!", None).await.unwrap();

    assert_eq!(response.id, "msg-1");
    assert_eq!(response.to_username, None);
    assert_eq!(response.message_type, MessageType::Room);

    let req = server.last_request();
    assert_eq!(req.api_key.as_deref(), Some("test-key-123"));
    assert_eq!(req.body, Some(json!({"content": "Hello, room!"})));
}

#[tokio::test]
async fn send_direct_message() {
    let server = MockServer::start();
    server.stub(Method::POST, "/messages", 201, message_json("msg-2", "alice", Some("bob"), "Hello, Bob!"));

    let response = authed(&server).send_message("Hello, Bob!", Some("bob")).await.unwrap();

    assert_eq!(response.to_username.as_deref(), Some("bob"));
    assert_eq!(response.message_type, MessageType::Direct);
    assert_eq!(server.last_request().body.unwrap()["to_username"], "bob");
}

#[tokio::test]
async fn send_without_api_key_fails_locally() {
    let server = MockServer::start();

    let err = client(&server).send_message("Hello!", None).await.unwrap_err();

    assert!(matches!(err, ClientError::Authentication(ref m) if m.contains("API key required")));
    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn api_key_can_be_set_later() {
    let server = MockServer::start();
    server.stub(Method::GET, "/users", 200, json!(["alice"]));

    let mut client = client(&server);
    assert!(client.get_users().await.is_err());
    client.set_api_key(Some("late-key".into()));
    assert_eq!(client.get_users().await.unwrap(), vec!["alice"]);
    assert_eq!(server.last_request().api_key.as_deref(), Some("late-key"));
}

#[tokio::test]
async fn send_to_unknown_recipient() {
    let server = MockServer::start();
    server.stub(Method::POST, "/messages", 404, json!({"detail": "User not found"}));

    let err = authed(&server).send_message("Hello!", Some("nonexistent")).await.unwrap_err();
    assert!(matches!(err, ClientError::NotFound(_)));
    assert_eq!(err.status(), Some(404));
}

#[tokio::test]
async fn empty_content_is_rejected_before_sending() {
    let server = MockServer::start();

    let err = authed(&server).send_message("", None).await.unwrap_err();
    assert!(matches!(err, ClientError::Validation(_)));
    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn server_validation_error() {
    let server = MockServer::start();
    server.stub(
        Method::POST,
        "/messages",
        422,
        json!({"detail": [{"loc": ["body", "content"], "msg": "field required", "type": "value_error.missing"}]}),
    );

    let err = authed(&server).send_message("x", None).await.unwrap_err();
    assert!(matches!(err, ClientError::Validation(ref m) if m == "field required"), "got {err:?}");
}

#[tokio::test]
async fn get_messages_default_pagination() {
    let server = MockServer::start();
    server.stub(
        Method::GET,
        "/messages?limit=50&offset=0",
        200,
        page_json(vec![message_json("msg-1", "alice", None, "Hello!")], 1, 0, 50, false),
    );

    let response = authed(&server).get_messages(&MessageQuery::default()).await.unwrap();

    assert_eq!(response.messages.len(), 1);
    assert_eq!(response.messages[0].content, "Hello!");
    assert_eq!(response.pagination.total, 1);
    assert!(!response.pagination.has_more);
}

#[tokio::test]
async fn get_messages_custom_pagination_and_since() {
    let server = MockServer::start();
    server.stub(
        Method::GET,
        "/messages?limit=10&offset=20&since=2025-10-16T12%3A00%3A00Z",
        200,
        page_json(vec![], 100, 20, 10, true),
    );

    let since = Utc.with_ymd_and_hms(2025, 10, 16, 12, 0, 0).unwrap();
    let response = authed(&server)
        .get_messages(&MessageQuery::new(10, 20).since(since))
        .await
        .unwrap();

    assert_eq!(response.pagination.offset, 20);
    assert_eq!(response.pagination.limit, 10);
    assert!(response.pagination.has_more);
}

#[tokio::test]
async fn get_direct_messages() {
    let server = MockServer::start();
    server.stub(
        Method::GET,
        "/messages/direct?limit=50&offset=0",
        200,
        page_json(vec![message_json("msg-dm-1", "bob", Some("alice"), "Private message")], 1, 0, 50, false),
    );

    let response = authed(&server).get_direct_messages(&MessageQuery::default()).await.unwrap();
    assert_eq!(response.messages[0].message_type, MessageType::Direct);
}

#[tokio::test]
async fn user_listings() {
    let server = MockServer::start();
    server.stub(Method::GET, "/users", 200, json!(["alice", "bob", "charlie"]));
    server.stub(Method::GET, "/users/online", 200, json!(["alice", "bob"]));

    let client = authed(&server);
    assert_eq!(client.get_users().await.unwrap(), vec!["alice", "bob", "charlie"]);
    assert_eq!(client.get_online_users().await.unwrap(), vec!["alice", "bob"]);
}

#[tokio::test]
async fn health_check_needs_no_key() {
    let server = MockServer::start();
    server.stub(Method::GET, "/health", 200, json!({"status": "healthy"}));

    let health = client(&server).health_check().await.unwrap();
    assert_eq!(health.status, "healthy");
}

#[tokio::test]
async fn read_markers() {
    let server = MockServer::start();
    server.stub_empty(Method::POST, "/messages/msg-7/read", 204);
    server.stub(Method::POST, "/messages/mark-all-read", 200, json!({"count": 12}));

    let client = authed(&server);
    client.mark_as_read("msg-7").await.unwrap();
    assert_eq!(server.last_request().path, "/messages/msg-7/read");
    assert_eq!(client.mark_all_as_read().await.unwrap().count, 12);
}

#[tokio::test]
async fn connection_token() {
    let server = MockServer::start();
    server.enable_realtime(&["room", "user:alice"]);

    let info = authed(&server).connection_token().await.unwrap();
    assert_eq!(info.token, "test-token");
    assert_eq!(info.channels, vec!["room", "user:alice"]);
}

#[tokio::test]
async fn status_mapping_for_other_codes() {
    let server = MockServer::start();
    server.stub(Method::GET, "/users", 429, json!({"detail": "slow down"}));
    server.stub(Method::GET, "/users/online", 503, json!({"detail": "maintenance"}));
    server.stub_empty(Method::GET, "/health", 401);

    let client = authed(&server);
    assert!(matches!(client.get_users().await, Err(ClientError::RateLimit(_))));
    assert!(matches!(
        client.get_online_users().await,
        Err(ClientError::Server { status: 503, .. })
    ));
    assert!(matches!(client.health_check().await, Err(ClientError::Authentication(ref m)) if m == "HTTP 401"));
}

#[tokio::test]
async fn undecodable_body_is_a_decode_error() {
    let server = MockServer::start();
    server.stub(Method::GET, "/users", 200, json!({"not": "a list"}));

    assert!(matches!(authed(&server).get_users().await, Err(ClientError::Decode(_))));
}

#[tokio::test]
async fn slow_server_times_out() {
    let server = MockServer::start();
    server.stub_delayed(Method::GET, "/health", json!({"status": "healthy"}), Duration::from_secs(3));

    let client = TokenBowlClient::new(
        ClientConfig::new(server.base_url()).with_timeout(Duration::from_millis(200)),
    )
    .unwrap();
    assert!(matches!(client.health_check().await, Err(ClientError::Timeout(_))));
}

#[tokio::test]
async fn unreachable_server_is_a_network_error() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let client = TokenBowlClient::new(ClientConfig::new(format!("http://127.0.0.1:{port}"))).unwrap();
    assert!(matches!(client.health_check().await, Err(ClientError::Network(_))));
}

#[tokio::test]
async fn trailing_slash_in_base_url() {
    let server = MockServer::start();
    server.stub(Method::GET, "/health", 200, json!({"status": "healthy"}));

    let client = TokenBowlClient::new(ClientConfig::new(format!("{}/", server.base_url()))).unwrap();
    assert_eq!(client.base_url(), server.base_url());
    assert!(client.health_check().await.is_ok());
}
