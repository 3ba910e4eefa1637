//! Client configuration.
//!
//! Every field has a default matching the stock server, so an empty TOML
//! document is a valid config.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::error::ConfigError;
use crate::state::connection::{Backoff, ReconnectPolicy, DEFAULT_MAX_RECONNECT_ATTEMPTS};
use crate::state::grid::Bounds;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_WS_PATH: &str = "/ws";
pub const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 3_000;
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 30_000;
pub const DEFAULT_KEEPALIVE_INTERVAL_MS: u64 = 30_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    #[default]
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// HTTP base URL of the game API; the push channel lives on the same host.
    pub api_url: String,
    /// Force `wss` (true) or `ws` (false). Follows the API scheme when unset.
    pub secure: Option<bool>,
    pub ws_path: String,
    pub max_reconnect_attempts: u32,
    pub reconnect_interval_ms: u64,
    pub backoff: BackoffKind,
    pub max_backoff_ms: u64,
    pub keepalive_interval_ms: u64,
    /// Playable area until a snapshot says otherwise.
    pub map_bounds: Bounds,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            secure: None,
            ws_path: DEFAULT_WS_PATH.to_string(),
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_interval_ms: DEFAULT_RECONNECT_INTERVAL_MS,
            backoff: BackoffKind::Fixed,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            keepalive_interval_ms: DEFAULT_KEEPALIVE_INTERVAL_MS,
            map_bounds: Bounds::default(),
        }
    }
}

impl ClientConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.api_base()?;
        if self.keepalive_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "keepalive_interval_ms must be positive".into(),
            ));
        }
        if !self.map_bounds.is_valid() {
            return Err(ConfigError::Invalid(format!(
                "map_bounds are inverted: {:?}",
                self.map_bounds
            )));
        }
        if !self.ws_path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "ws_path must start with '/': {}",
                self.ws_path
            )));
        }
        Ok(())
    }

    fn api_base(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.api_url)
            .map_err(|err| ConfigError::Invalid(format!("api_url {}: {err}", self.api_url)))?;
        if url.host_str().is_none() {
            return Err(ConfigError::Invalid(format!(
                "api_url has no host: {}",
                self.api_url
            )));
        }
        Ok(url)
    }

    /// Whether the push channel uses `wss`.
    pub fn is_secure(&self) -> bool {
        match self.secure {
            Some(secure) => secure,
            None => self
                .api_base()
                .map(|url| matches!(url.scheme(), "https" | "wss"))
                .unwrap_or(false),
        }
    }

    /// Push channel URL carrying `token` as a query parameter.
    pub fn endpoint_url(&self, token: &str) -> Result<Url, ConfigError> {
        let base = self.api_base()?;
        let scheme = if self.is_secure() { "wss" } else { "ws" };
        let host = base.host_str().unwrap_or("localhost");

        let mut url = Url::parse(&format!("{scheme}://{host}"))
            .map_err(|err| ConfigError::Invalid(format!("push url: {err}")))?;
        if url.set_port(base.port()).is_err() {
            return Err(ConfigError::Invalid(format!("cannot set port on {url}")));
        }
        url.set_path(&self.ws_path);
        url.query_pairs_mut().append_pair("token", token);
        Ok(url)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        let interval = Duration::from_millis(self.reconnect_interval_ms);
        let backoff = match self.backoff {
            BackoffKind::Fixed => Backoff::Fixed(interval),
            BackoffKind::Exponential => Backoff::Exponential {
                base: interval,
                max: Duration::from_millis(self.max_backoff_ms),
            },
        };
        ReconnectPolicy {
            max_attempts: self.max_reconnect_attempts,
            backoff,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_document_is_default() {
        let config = ClientConfig::from_toml_str("").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.keepalive_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_document() {
        let config = ClientConfig::from_toml_str(
            r#"
            api_url = "https://empire.example.com"
            max_reconnect_attempts = 2
            backoff = "exponential"

            [map_bounds]
            x_min = 0
            x_max = 10
            y_min = 0
            y_max = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.max_reconnect_attempts, 2);
        assert_eq!(config.backoff, BackoffKind::Exponential);
        assert_eq!(config.map_bounds, Bounds::new(0, 10, 0, 10));
        assert_eq!(config.reconnect_interval_ms, DEFAULT_RECONNECT_INTERVAL_MS);
    }

    #[test]
    fn test_endpoint_follows_api_scheme() {
        let config = ClientConfig::default();
        assert_eq!(
            config.endpoint_url("abc").unwrap().as_str(),
            "ws://localhost:8000/ws?token=abc"
        );

        let config = ClientConfig {
            api_url: "https://empire.example.com".into(),
            ..ClientConfig::default()
        };
        assert_eq!(
            config.endpoint_url("abc").unwrap().as_str(),
            "wss://empire.example.com/ws?token=abc"
        );
    }

    #[test]
    fn test_secure_override() {
        let config = ClientConfig {
            secure: Some(true),
            ..ClientConfig::default()
        };
        assert_eq!(
            config.endpoint_url("t").unwrap().as_str(),
            "wss://localhost:8000/ws?token=t"
        );
    }

    #[test]
    fn test_token_is_encoded() {
        let url = ClientConfig::default().endpoint_url("a b&c").unwrap();
        assert_eq!(url.query(), Some("token=a+b%26c"));
    }

    #[test]
    fn test_invalid_configs_rejected() {
        assert!(ClientConfig::from_toml_str("keepalive_interval_ms = 0").is_err());
        assert!(ClientConfig::from_toml_str("api_url = \"not a url\"").is_err());
        assert!(ClientConfig::from_toml_str("ws_path = \"ws\"").is_err());
        assert!(ClientConfig::from_toml_str("max_reconnect_attempts = \"many\"").is_err());
    }

    #[test]
    fn test_reconnect_policy_from_config() {
        let policy = ClientConfig::default().reconnect_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delay_for(1), Duration::from_secs(3));
        assert_eq!(policy.delay_for(4), Duration::from_secs(3));
    }
}
