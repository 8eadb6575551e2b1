//! Client library for the Token Bowl chat server.
//!
//! * [`TokenBowlClient`] / [`BlockingTokenBowlClient`] — REST operations:
//!   registration, room and direct messages, user lists, read markers.
//! * [`RealtimeClient`] — Centrifugo websocket stream of [`RealtimeEvent`]s.
//! * [`config`] and [`logger`] — file/env configuration and tracing setup
//!   used by the `token-bowl` binary.

pub mod client;
pub mod config;
pub mod error;
pub mod logger;
pub mod models;
pub mod realtime;

pub use client::blocking::BlockingTokenBowlClient;
pub use client::{ClientConfig, TokenBowlClient};
pub use error::ClientError;
pub use models::{
    ConnectionInfo, HealthStatus, MarkAllReadResponse, MessageQuery, MessageResponse, MessageType,
    PaginatedMessagesResponse, PaginationMetadata, SendMessageRequest, UnreadCountResponse,
    UserRegistration, UserRegistrationResponse,
};
pub use realtime::{RealtimeClient, RealtimeConfig, RealtimeEvent, RealtimeHandle};
