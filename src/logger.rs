//! Logging initialisation via tracing-subscriber.
//!
//! Library code only emits `tracing` events; the `token-bowl` binary installs
//! the subscriber once its configuration is resolved.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::error::ClientError;

/// Targets a plain level applies to. Everything else (reqwest, hyper,
/// tungstenite) stays at `warn`.
const OWN_TARGETS: [&str; 2] = ["token_bowl_chat", "token_bowl"];

/// Install the global subscriber, writing to stderr.
///
/// `RUST_LOG` wins when set and valid. Otherwise `level` is either a plain
/// level, scoped to this crate by [`directives`], or a full filter directive
/// used as given.
pub fn init(level: &str) -> Result<(), ClientError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let directives = directives(level)?;
            EnvFilter::try_new(&directives)
                .map_err(|e| ClientError::Logger(format!("invalid log filter '{directives}': {e}")))?
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| ClientError::Logger(format!("failed to set subscriber: {e}")))
}

/// Expand a configured level into filter directives.
///
/// `"debug"` becomes `warn,token_bowl_chat=debug,token_bowl=debug`; `"off"`
/// silences everything; strings containing `=` or `,` pass through unchanged.
pub fn directives(level: &str) -> Result<String, ClientError> {
    if level.contains(['=', ',']) {
        return Ok(level.to_string());
    }
    let parsed = parse_level(level)?;
    if parsed == LevelFilter::OFF {
        return Ok("off".to_string());
    }
    let parsed = parsed.to_string().to_lowercase();
    let scoped: Vec<String> = OWN_TARGETS.iter().map(|target| format!("{target}={parsed}")).collect();
    Ok(format!("warn,{}", scoped.join(",")))
}

/// Parse a plain log level string, rejecting unrecognised values.
pub fn parse_level(level: &str) -> Result<LevelFilter, ClientError> {
    if level.is_empty() {
        return Err(ClientError::Logger("log level must not be empty".into()));
    }
    level
        .parse::<LevelFilter>()
        .map_err(|_| ClientError::Logger(format!("unrecognised log level: '{level}'")))
}
