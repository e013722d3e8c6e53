//! Client configuration, from defaults or environment variables.

use std::time::Duration;

use thiserror::Error;
use url::Url;

pub const DEFAULT_WS_BASE: &str = "ws://localhost:8080";
pub const DEFAULT_API_BASE: &str = "http://localhost:8080";
/// `{key}` is replaced with the url-encoded subscription key.
pub const DEFAULT_POLL_PATH: &str = "/api/investors/{key}/kyc";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} is not a valid URL: {source}")]
    InvalidUrl {
        var: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("{var} must use one of {expected}, got `{value}`")]
    UnsupportedScheme {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("{var} must be a non-negative integer, got `{value}`")]
    InvalidNumber { var: &'static str, value: String },
}

/// Configuration for auto-reconnect behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Reconnect attempts before falling back to polling
    pub max_attempts: u32,
    /// Delay before the first reconnect attempt
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
        }
    }
}

impl ReconnectConfig {
    /// Delay before reconnect attempt `attempt` (1-based): `initial * 2^(attempt-1)`,
    /// capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_delay
            .checked_mul(1u32 << exponent)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

/// Everything the realtime client needs to reach the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeConfig {
    /// Base websocket URL; sockets connect to `<ws_base>/kyc/<key>`.
    pub ws_base: String,
    /// Base URL of the REST API used by the polling fallback.
    pub api_base: String,
    /// Path template of the polling request.
    pub poll_path: String,
    /// Optional bearer token attached to polling requests.
    pub api_token: Option<String>,
    pub reconnect: ReconnectConfig,
    pub poll_interval: Duration,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            ws_base: DEFAULT_WS_BASE.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            poll_path: DEFAULT_POLL_PATH.to_string(),
            api_token: None,
            reconnect: ReconnectConfig::default(),
            poll_interval: Duration::from_millis(5000),
        }
    }
}

impl RealtimeConfig {
    /// Parse configuration from environment variables.
    ///
    /// Environment variables (all optional):
    /// - `KYCWATCH_WS_URL`: websocket base (default: "ws://localhost:8080")
    /// - `KYCWATCH_API_URL`: REST base (default: "http://localhost:8080")
    /// - `KYCWATCH_API_TOKEN`: bearer token for polling requests
    /// - `KYCWATCH_POLL_PATH`: polling path template (default: "/api/investors/{key}/kyc")
    /// - `KYCWATCH_MAX_ATTEMPTS`: reconnect attempts before polling (default: 5)
    /// - `KYCWATCH_BACKOFF_BASE_MS`: first reconnect delay (default: 1000)
    /// - `KYCWATCH_BACKOFF_MAX_MS`: reconnect delay ceiling (default: 30000)
    /// - `KYCWATCH_POLL_INTERVAL_MS`: polling period (default: 5000)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(ws) = lookup("KYCWATCH_WS_URL") {
            config.ws_base = checked_url("KYCWATCH_WS_URL", &ws, &["ws", "wss"], "ws/wss")?;
        }
        if let Some(api) = lookup("KYCWATCH_API_URL") {
            config.api_base =
                checked_url("KYCWATCH_API_URL", &api, &["http", "https"], "http/https")?;
        }
        if let Some(token) = lookup("KYCWATCH_API_TOKEN").filter(|t| !t.trim().is_empty()) {
            config.api_token = Some(token);
        }
        if let Some(path) = lookup("KYCWATCH_POLL_PATH") {
            config.poll_path = path;
        }
        if let Some(n) = number(&lookup, "KYCWATCH_MAX_ATTEMPTS")? {
            config.reconnect.max_attempts = u32::try_from(n).map_err(|_| {
                ConfigError::InvalidNumber {
                    var: "KYCWATCH_MAX_ATTEMPTS",
                    value: n.to_string(),
                }
            })?;
        }
        if let Some(ms) = number(&lookup, "KYCWATCH_BACKOFF_BASE_MS")? {
            config.reconnect.initial_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = number(&lookup, "KYCWATCH_BACKOFF_MAX_MS")? {
            config.reconnect.max_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = number(&lookup, "KYCWATCH_POLL_INTERVAL_MS")? {
            config.poll_interval = Duration::from_millis(ms);
        }

        Ok(config)
    }

    pub fn with_ws_base(mut self, ws_base: impl Into<String>) -> Self {
        self.ws_base = ws_base.into();
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Address of the socket scoped to `key`.
    pub fn socket_url(&self, key: &str) -> String {
        socket_url(&self.ws_base, key)
    }

    /// Path of the polling request for `key`.
    pub fn poll_path_for(&self, key: &str) -> String {
        poll_path_for(&self.poll_path, key)
    }
}

pub(crate) fn socket_url(ws_base: &str, key: &str) -> String {
    format!(
        "{}/kyc/{}",
        ws_base.trim_end_matches('/'),
        urlencoding::encode(key)
    )
}

pub(crate) fn poll_path_for(template: &str, key: &str) -> String {
    template.replace("{key}", &urlencoding::encode(key))
}

fn checked_url(
    var: &'static str,
    raw: &str,
    schemes: &[&str],
    expected: &'static str,
) -> Result<String, ConfigError> {
    let url = Url::parse(raw).map_err(|source| ConfigError::InvalidUrl { var, source })?;
    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::UnsupportedScheme {
            var,
            expected,
            value: raw.to_string(),
        });
    }
    Ok(raw.trim_end_matches('/').to_string())
}

fn number(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<u64>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { var, value: raw }),
    }
}
