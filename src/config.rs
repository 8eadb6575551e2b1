//! Configuration loading with env-var overrides.
//!
//! Reads an optional TOML file, then applies overrides. Lookup order for the
//! file: explicit path, `config/default.toml` relative to the current working
//! directory, `<user config dir>/token-bowl/config.toml`. With no file at all
//! the built-in defaults are used.
//!
//! The API key is never read from TOML: it comes from `TOKEN_BOWL_CHAT_API_KEY`
//! or an explicit override.

use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use reqwest::Url;
use serde::Deserialize;

use crate::client::{ClientConfig, DEFAULT_BASE_URL};
use crate::error::ClientError;
use crate::realtime::RealtimeConfig;

pub const API_KEY_ENV: &str = "TOKEN_BOWL_CHAT_API_KEY";
pub const BASE_URL_ENV: &str = "TOKEN_BOWL_BASE_URL";
pub const LOG_LEVEL_ENV: &str = "TOKEN_BOWL_LOG_LEVEL";

const LOCAL_CONFIG: &str = "config/default.toml";

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub client: ClientConfig,
    pub realtime: RealtimeConfig,
    pub log_level: String,
    /// File the values came from, `None` when running on defaults.
    pub source: Option<PathBuf>,
}

/// Values that take precedence over the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub log_level: Option<String>,
}

impl Overrides {
    /// Read `TOKEN_BOWL_BASE_URL`, `TOKEN_BOWL_CHAT_API_KEY` and
    /// `TOKEN_BOWL_LOG_LEVEL`. Empty values count as unset.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());
        Self {
            base_url: var(BASE_URL_ENV),
            api_key: var(API_KEY_ENV),
            log_level: var(LOG_LEVEL_ENV),
        }
    }

    /// Fields set on `self` win; unset ones fall back to `other`.
    pub fn or(self, other: Overrides) -> Self {
        Self {
            base_url: self.base_url.or(other.base_url),
            api_key: self.api_key.or(other.api_key),
            log_level: self.log_level.or(other.log_level),
        }
    }
}

// ── Raw TOML shape ────────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    client: RawClient,
    #[serde(default)]
    realtime: RawRealtime,
    #[serde(default)]
    logging: RawLogging,
}

#[derive(Deserialize)]
struct RawClient {
    #[serde(default = "default_base_url")]
    base_url: String,
    #[serde(default = "default_timeout_seconds")]
    timeout_seconds: u64,
}

#[derive(Deserialize)]
struct RawRealtime {
    #[serde(default = "default_connect_timeout_seconds")]
    connect_timeout_seconds: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    max_reconnect_attempts: u32,
    #[serde(default = "default_reconnect_backoff_ms")]
    reconnect_backoff_ms: u64,
    #[serde(default = "default_reconnect_backoff_max_ms")]
    reconnect_backoff_max_ms: u64,
    #[serde(default = "default_event_buffer")]
    event_buffer: usize,
}

#[derive(Deserialize)]
struct RawLogging {
    #[serde(default = "default_log_level")]
    log_level: String,
}

impl Default for RawClient {
    fn default() -> Self {
        Self { base_url: default_base_url(), timeout_seconds: default_timeout_seconds() }
    }
}

impl Default for RawRealtime {
    fn default() -> Self {
        Self {
            connect_timeout_seconds: default_connect_timeout_seconds(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
            reconnect_backoff_max_ms: default_reconnect_backoff_max_ms(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl Default for RawLogging {
    fn default() -> Self {
        Self { log_level: default_log_level() }
    }
}

fn default_base_url() -> String { DEFAULT_BASE_URL.to_string() }
fn default_timeout_seconds() -> u64 { 30 }
fn default_connect_timeout_seconds() -> u64 { 10 }
fn default_max_reconnect_attempts() -> u32 { 5 }
fn default_reconnect_backoff_ms() -> u64 { 500 }
fn default_reconnect_backoff_max_ms() -> u64 { 20_000 }
fn default_event_buffer() -> usize { 256 }
fn default_log_level() -> String { "info".to_string() }

// ── Loading ───────────────────────────────────────────────────────────────────

/// Load config from the first file found (see module docs), then apply
/// `overrides` and, beneath them, the environment.
pub fn load(explicit_path: Option<&Path>, overrides: Overrides) -> Result<Config, ClientError> {
    let overrides = overrides.or(Overrides::from_env());
    let path = match explicit_path {
        Some(p) => Some(p.to_path_buf()),
        None => default_path(),
    };
    load_from(path.as_deref(), overrides)
}

/// First existing default config location, if any.
pub fn default_path() -> Option<PathBuf> {
    first_existing(Path::new(LOCAL_CONFIG), dirs::config_dir().as_deref())
}

fn first_existing(local: &Path, user_config_dir: Option<&Path>) -> Option<PathBuf> {
    if local.is_file() {
        return Some(local.to_path_buf());
    }
    user_config_dir
        .map(|dir| dir.join("token-bowl").join("config.toml"))
        .filter(|p| p.is_file())
}

/// Internal loader: explicit path (or none for defaults) and explicit
/// overrides. Tests call this directly instead of mutating env vars.
pub fn load_from(path: Option<&Path>, overrides: Overrides) -> Result<Config, ClientError> {
    let raw = match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .map_err(|e| ClientError::Config(format!("cannot read {}: {e}", path.display())))?;
            toml::from_str::<RawConfig>(&text)
                .map_err(|e| ClientError::Config(format!("parse error in {}: {e}", path.display())))?
        }
        None => RawConfig::default(),
    };

    resolve(raw, overrides, path.map(Path::to_path_buf))
}

fn resolve(raw: RawConfig, overrides: Overrides, source: Option<PathBuf>) -> Result<Config, ClientError> {
    let base_url = overrides.base_url.unwrap_or(raw.client.base_url);
    Url::parse(&base_url).map_err(|e| ClientError::Config(format!("invalid base_url '{base_url}': {e}")))?;

    if raw.client.timeout_seconds == 0 {
        return Err(ClientError::Config("client.timeout_seconds must be greater than 0".into()));
    }
    if raw.realtime.connect_timeout_seconds == 0 {
        return Err(ClientError::Config("realtime.connect_timeout_seconds must be greater than 0".into()));
    }
    if raw.realtime.event_buffer == 0 {
        return Err(ClientError::Config("realtime.event_buffer must be greater than 0".into()));
    }
    if raw.realtime.reconnect_backoff_max_ms < raw.realtime.reconnect_backoff_ms {
        return Err(ClientError::Config(
            "realtime.reconnect_backoff_max_ms must not be below reconnect_backoff_ms".into(),
        ));
    }

    Ok(Config {
        client: ClientConfig {
            base_url,
            api_key: overrides.api_key.filter(|k| !k.is_empty()),
            timeout: Duration::from_secs(raw.client.timeout_seconds),
        },
        realtime: RealtimeConfig {
            connect_timeout: Duration::from_secs(raw.realtime.connect_timeout_seconds),
            max_reconnect_attempts: raw.realtime.max_reconnect_attempts,
            reconnect_backoff: Duration::from_millis(raw.realtime.reconnect_backoff_ms),
            reconnect_backoff_max: Duration::from_millis(raw.realtime.reconnect_backoff_max_ms),
            event_buffer: raw.realtime.event_buffer,
            ..RealtimeConfig::default()
        },
        log_level: overrides.log_level.unwrap_or(raw.logging.log_level),
        source,
    })
}
