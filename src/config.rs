//! Client configuration, with environment-variable loading.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:8000";
pub const DEFAULT_PING_DEBOUNCE_MS: u64 = 4_000;
pub const DEFAULT_KEEPALIVE_MS: u64 = 5_000;
pub const DEFAULT_TICK_MS: u64 = 16;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server base URL; the scheme selects the transport backend.
    pub server_url: String,
    /// Log every outbound and inbound frame at `debug`.
    pub log_messages: bool,
    /// Minimum quiet period since the last send before `ping` issues a call.
    pub ping_debounce: Duration,
    /// How often the driver calls `ping`.
    pub keepalive_interval: Duration,
    /// How often the driver calls `tick`.
    pub tick_interval: Duration,
    /// Persist the session id to this JSON file instead of memory.
    pub session_file: Option<PathBuf>,
}

impl ClientConfig {
    /// Defaults for the given server URL.
    #[must_use]
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            log_messages: false,
            ping_debounce: Duration::from_millis(DEFAULT_PING_DEBOUNCE_MS),
            keepalive_interval: Duration::from_millis(DEFAULT_KEEPALIVE_MS),
            tick_interval: Duration::from_millis(DEFAULT_TICK_MS),
            session_file: None,
        }
    }

    /// Build config from environment variables.
    ///
    /// Optional:
    /// - `SERVERVILLE_URL`: default `ws://127.0.0.1:8000`
    /// - `SERVERVILLE_LOG_MESSAGES`: `true`/`false`, default false
    /// - `SERVERVILLE_PING_DEBOUNCE_MS`: default 4000
    /// - `SERVERVILLE_KEEPALIVE_MS`: default 5000
    /// - `SERVERVILLE_TICK_MS`: default 16
    /// - `SERVERVILLE_SESSION_FILE`: path of a JSON session store
    #[must_use]
    pub fn from_env() -> Self {
        let server_url = std::env::var("SERVERVILLE_URL")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_owned());
        let session_file = std::env::var("SERVERVILLE_SESSION_FILE")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        Self {
            server_url,
            log_messages: env_parse("SERVERVILLE_LOG_MESSAGES", false),
            ping_debounce: Duration::from_millis(env_parse("SERVERVILLE_PING_DEBOUNCE_MS", DEFAULT_PING_DEBOUNCE_MS)),
            keepalive_interval: Duration::from_millis(env_parse("SERVERVILLE_KEEPALIVE_MS", DEFAULT_KEEPALIVE_MS)),
            tick_interval: Duration::from_millis(env_parse("SERVERVILLE_TICK_MS", DEFAULT_TICK_MS)),
            session_file,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SERVER_URL)
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
