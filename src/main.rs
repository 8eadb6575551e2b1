//! `token-bowl` — command-line client for the Token Bowl chat server.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Parse arguments
//!   3. Load config (file, env, flags)
//!   4. Init logger at the configured level
//!   5. Run the subcommand

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

use token_bowl_chat::config::{self, Overrides};
use token_bowl_chat::{
    ClientError, MessageQuery, MessageResponse, PaginatedMessagesResponse, RealtimeClient, RealtimeEvent,
    TokenBowlClient, logger,
};

#[derive(Debug, Parser)]
#[command(name = "token-bowl", version, about = "Token Bowl chat client")]
struct Cli {
    /// Config file (default: ./config/default.toml, then the user config dir).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Server base URL.
    #[arg(long, global = true, env = "TOKEN_BOWL_BASE_URL")]
    base_url: Option<String>,

    /// API key sent as X-API-Key.
    #[arg(long, global = true, env = "TOKEN_BOWL_CHAT_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Log level or filter directive.
    #[arg(long, global = true, env = "TOKEN_BOWL_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Register a new user and print its API key.
    Register {
        /// Username; generated when omitted.
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        webhook_url: Option<String>,
    },
    /// Send a room message, or a direct message with --to.
    Send {
        content: String,
        #[arg(long)]
        to: Option<String>,
    },
    /// List room messages.
    Messages(PageArgs),
    /// List direct messages for the current user.
    Direct(PageArgs),
    /// List registered usernames.
    Users,
    /// List users connected to the realtime endpoint.
    Online,
    /// Check server health.
    Health,
    /// Mark one message as read.
    Read { message_id: String },
    /// Mark all messages as read.
    ReadAll,
    /// Stream realtime events until Ctrl-C.
    Listen,
}

#[derive(Debug, Args)]
struct PageArgs {
    #[arg(long, default_value_t = 50)]
    limit: u32,
    #[arg(long, default_value_t = 0)]
    offset: u32,
    /// Only messages after this RFC 3339 timestamp.
    #[arg(long)]
    since: Option<DateTime<Utc>>,
}

impl PageArgs {
    fn query(&self) -> MessageQuery {
        MessageQuery { limit: self.limit, offset: self.offset, since: self.since }
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), ClientError> {
    // Load .env if present; the file is optional.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let overrides = Overrides {
        base_url: cli.base_url.clone(),
        api_key: cli.api_key.clone(),
        log_level: cli.log_level.clone(),
    };
    let config = config::load(cli.config.as_deref(), overrides)?;

    logger::init(&config.log_level)?;
    info!(
        base_url = %config.client.base_url,
        source = ?config.source,
        log_level = %config.log_level,
        "config loaded"
    );

    let client = TokenBowlClient::new(config.client.clone())?;

    match cli.command {
        Command::Register { username, webhook_url } => {
            let registered = client.register(username.as_deref(), webhook_url.as_deref()).await?;
            println!("username: {}", registered.username);
            println!("api_key:  {}", registered.api_key);
            if let Some(url) = registered.webhook_url {
                println!("webhook:  {url}");
            }
        }
        Command::Send { content, to } => {
            let sent = client.send_message(&content, to.as_deref()).await?;
            println!("sent {}", sent.id);
        }
        Command::Messages(page) => print_page(&client.get_messages(&page.query()).await?),
        Command::Direct(page) => print_page(&client.get_direct_messages(&page.query()).await?),
        Command::Users => client.get_users().await?.iter().for_each(|u| println!("{u}")),
        Command::Online => client.get_online_users().await?.iter().for_each(|u| println!("{u}")),
        Command::Health => {
            let health = client.health_check().await?;
            println!("status: {}", health.status);
            let mut extra: Vec<_> = health.extra.iter().collect();
            extra.sort_by(|a, b| a.0.cmp(b.0));
            for (key, value) in extra {
                println!("{key}: {value}");
            }
        }
        Command::Read { message_id } => {
            client.mark_as_read(&message_id).await?;
            println!("marked {message_id} as read");
        }
        Command::ReadAll => {
            let marked = client.mark_all_as_read().await?;
            println!("marked {} messages as read", marked.count);
        }
        Command::Listen => listen(client, config.realtime).await?,
    }

    Ok(())
}

async fn listen(client: TokenBowlClient, realtime: token_bowl_chat::RealtimeConfig) -> Result<(), ClientError> {
    let shutdown = CancellationToken::new();
    let connect_timeout = realtime.connect_timeout;
    let mut handle = RealtimeClient::new(client, realtime).connect(shutdown.clone()).await?;
    handle.wait_until_connected(connect_timeout.max(Duration::from_secs(1))).await?;

    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, disconnecting");
            ctrl_c.cancel();
        }
    });

    while let Some(event) = handle.next_event().await {
        match event {
            RealtimeEvent::Connected { client_id } => println!("* connected ({client_id})"),
            RealtimeEvent::Subscribed { channel } => println!("* subscribed to {channel}"),
            RealtimeEvent::Message(message) => print_message(&message),
            RealtimeEvent::ReadReceipt { message_id, read_by } => println!("* {read_by} read {message_id}"),
            RealtimeEvent::UnreadCount(counts) => println!(
                "* unread: {} total ({} room, {} direct)",
                counts.total_unread, counts.unread_room_messages, counts.unread_direct_messages
            ),
            RealtimeEvent::Typing { username, to_username } => match to_username {
                Some(to) => println!("* {username} is typing to {to}"),
                None => println!("* {username} is typing"),
            },
            RealtimeEvent::Publication { channel, data } => println!("* [{channel}] {data}"),
            RealtimeEvent::Error(message) => eprintln!("! {message}"),
            RealtimeEvent::Disconnected { code, reason, reconnect } => {
                println!("* disconnected ({code} {reason}){}", if reconnect { ", reconnecting" } else { "" });
            }
        }
    }

    handle.disconnect().await
}

fn print_page(page: &PaginatedMessagesResponse) {
    for message in &page.messages {
        print_message(message);
    }
    let p = &page.pagination;
    println!(
        "-- {} of {} (offset {}, limit {}){}",
        page.messages.len(),
        p.total,
        p.offset,
        p.limit,
        if p.has_more { ", more available" } else { "" }
    );
}

fn print_message(message: &MessageResponse) {
    let target = message
        .to_username
        .as_deref()
        .map(|to| format!(" -> {to}"))
        .unwrap_or_default();
    println!(
        "[{}] {}{}: {}",
        message.timestamp.format("%Y-%m-%d %H:%M:%S"),
        message.from_username,
        target,
        message.content
    );
}
