//! Client configuration.
//!
//! Use the builder methods to customize, or [`ClientConfig::from_env`] to
//! read `MAILPILOT_*` environment variables.
//!
//! # Example
//!
//! ```ignore
//! use mailpilot::config::ClientConfig;
//!
//! let config = ClientConfig::default()
//!     .with_api_base_url("https://api.mailpilot.dev")
//!     .with_ws_url("wss://api.mailpilot.dev/ws");
//! ```

use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::live::ReconnectPolicy;

/// Paths of the authentication endpoints, relative to the API base URL.
///
/// Requests to these paths never trigger silent renewal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPaths {
    pub login: String,
    pub register: String,
    pub refresh: String,
}

impl AuthPaths {
    /// Whether `path` (query string ignored) is an authentication endpoint.
    pub fn contains(&self, path: &str) -> bool {
        let path = path.split('?').next().unwrap_or(path);
        path == self.login || path == self.register || path == self.refresh
    }
}

impl Default for AuthPaths {
    fn default() -> Self {
        Self {
            login: "/auth/login".to_string(),
            register: "/auth/register".to_string(),
            refresh: "/auth/refresh".to_string(),
        }
    }
}

/// Configuration shared by the request coordinator and the live channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// REST API base URL (default: http://localhost:8000)
    pub api_base_url: String,
    /// Live channel endpoint (default: ws://localhost:8000/ws)
    pub ws_url: String,
    /// Per-request timeout for the HTTP adapter
    pub request_timeout: Duration,
    /// Reconnect backoff for the live channel
    pub reconnect: ReconnectPolicy,
    pub auth_paths: AuthPaths,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".to_string(),
            ws_url: "ws://localhost:8000/ws".to_string(),
            request_timeout: Duration::from_secs(30),
            reconnect: ReconnectPolicy::default(),
            auth_paths: AuthPaths::default(),
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the REST API base URL.
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Set the live channel URL.
    pub fn with_ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = url.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Replace the whole reconnect policy.
    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn with_auth_paths(mut self, paths: AuthPaths) -> Self {
        self.auth_paths = paths;
        self
    }

    /// Build config from `MAILPILOT_*` environment variables.
    ///
    /// Unset variables keep their defaults. Unparseable values are logged and
    /// ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("MAILPILOT_API_URL") {
            config.api_base_url = url;
        }
        if let Ok(url) = std::env::var("MAILPILOT_WS_URL") {
            config.ws_url = url;
        }
        if let Some(secs) = env_parse::<u64>("MAILPILOT_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = env_parse::<u64>("MAILPILOT_RECONNECT_BASE_MS") {
            config.reconnect.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("MAILPILOT_RECONNECT_MAX_MS") {
            config.reconnect.max_delay = Duration::from_millis(ms);
        }
        if let Some(attempts) = env_parse::<u32>("MAILPILOT_RECONNECT_MAX_ATTEMPTS") {
            config.reconnect.max_attempts = attempts;
        }

        config
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var = name, value = %raw, "ignoring unparseable environment value");
            None
        }
    }
}
