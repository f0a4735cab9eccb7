//! Environment-driven runtime configuration.
//!
//! The binary calls `dotenvy::dotenv()` before [`Config::from_env`], so
//! values can come from a `.env` file or the real environment. Every
//! tunable has a default except `GATEWAY_URL`, which is required.

use std::path::PathBuf;
use std::time::Duration;

use crate::types::Jid;

/// Default directory for the persisted credential bundle.
pub const DEFAULT_SESSION_DIR: &str = "sessions";

/// Default command prefix recognized by the plugin dispatcher.
pub const DEFAULT_COMMAND_PREFIX: &str = ".";

/// Default base URL of the remote blob store holding session bundles.
pub const DEFAULT_BLOB_STORE_URL: &str = "https://mega.nz/file";

/// Default ceiling on consecutive reconnect attempts.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Default base delay for the capped-linear reconnect backoff.
pub const DEFAULT_RECONNECT_BASE: Duration = Duration::from_secs(3);

/// Default upper bound on the reconnect backoff delay.
pub const DEFAULT_RECONNECT_CAP: Duration = Duration::from_secs(30);

/// Runtime configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// WebSocket base URL of the messaging gateway, e.g. `wss://gw.example.com`.
    pub gateway_url: String,

    /// Distribution identifier for a remote session bundle, if any.
    ///
    /// May carry the `WIRE~` prefix used when session ids are handed out;
    /// the bootstrap layer strips it before addressing the blob store.
    pub session_id: Option<String>,

    /// Directory holding the persisted credential bundle.
    pub session_dir: PathBuf,

    /// HTTP base URL of the blob store that serves session bundles.
    pub blob_store_url: String,

    /// Prefix that marks an inbound message as a command.
    pub command_prefix: String,

    /// Address of the bot owner, used by owner-only plugins.
    pub owner_jid: Option<Jid>,

    /// Optional image URL attached to the greeting message.
    pub menu_image_url: Option<String>,

    /// Ceiling on consecutive reconnect attempts before giving up.
    pub max_reconnect_attempts: u32,

    /// Base delay of the capped-linear reconnect backoff.
    pub reconnect_base: Duration,

    /// Upper bound on the reconnect backoff delay.
    pub reconnect_cap: Duration,
}

impl Config {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through an arbitrary variable lookup.
    ///
    /// Factored out of [`from_env`](Self::from_env) so tests can supply
    /// values without mutating process-global environment state.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let gateway_url = required(&lookup, "GATEWAY_URL")?;

        Ok(Self {
            gateway_url,
            session_id: optional(&lookup, "SESSION_ID"),
            session_dir: optional(&lookup, "SESSION_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SESSION_DIR)),
            blob_store_url: optional(&lookup, "BLOB_STORE_URL")
                .unwrap_or_else(|| DEFAULT_BLOB_STORE_URL.to_string()),
            command_prefix: optional(&lookup, "COMMAND_PREFIX")
                .unwrap_or_else(|| DEFAULT_COMMAND_PREFIX.to_string()),
            owner_jid: optional(&lookup, "OWNER_JID"),
            menu_image_url: optional(&lookup, "MENU_IMG"),
            max_reconnect_attempts: parse_or(
                &lookup,
                "MAX_RECONNECT_ATTEMPTS",
                DEFAULT_MAX_RECONNECT_ATTEMPTS,
            )?,
            reconnect_base: duration_ms_or(&lookup, "RECONNECT_BASE_MS", DEFAULT_RECONNECT_BASE)?,
            reconnect_cap: duration_ms_or(&lookup, "RECONNECT_CAP_MS", DEFAULT_RECONNECT_CAP)?,
        })
    }
}

/// Fetch a required variable, treating empty strings as unset.
fn required<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, name).ok_or(ConfigError::Missing(name))
}

/// Fetch an optional variable, treating empty strings as unset.
fn optional<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Parse a variable into `T`, falling back to `default` when unset.
fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match optional(lookup, name) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
            var: name,
            value: raw,
        }),
        None => Ok(default),
    }
}

/// Parse a millisecond-valued variable into a [`Duration`].
fn duration_ms_or<F>(
    lookup: &F,
    name: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match optional(lookup, name) {
        Some(raw) => {
            let ms: u64 = raw.parse().map_err(|_| ConfigError::Invalid {
                var: name,
                value: raw.clone(),
            })?;
            if ms == 0 {
                return Err(ConfigError::Invalid { var: name, value: raw });
            }
            Ok(Duration::from_millis(ms))
        }
        None => Ok(default),
    }
}

/// Errors produced while resolving configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is unset or empty.
    #[error("Required environment variable {0} is not set")]
    Missing(&'static str),

    /// A variable is set but cannot be parsed.
    #[error("Environment variable {var} has invalid value '{value}'")]
    Invalid { var: &'static str, value: String },
}
