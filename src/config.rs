//! Configuration management for the Flux Studio CLI and SDK

use config::{Config, Environment};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Result, StudioError};

/// Default public API base for serverless endpoints.
pub const DEFAULT_API_BASE: &str = "https://api.runpod.ai/v2";

/// Default interval between status polls, in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3_000;

/// Default total wait budget for one job, in milliseconds (10 minutes).
pub const DEFAULT_MAX_WAIT_MS: u64 = 600_000;

pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("flux-studio")
}

/// Root for persisted state slices and exported images.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("flux-studio")
}

/// Client configuration
///
/// One `ClientConfig` describes one credential pair; the caller constructs a
/// client from it explicitly and passes the client down. There is no hidden
/// client cache keyed on mutable credential fields.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub endpoint_id: String,
    #[serde(default)]
    pub api_key: String,
    /// Per-request HTTP timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
    #[serde(default = "default_use_proxy")]
    pub use_proxy: bool,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_max_wait_ms() -> u64 {
    DEFAULT_MAX_WAIT_MS
}

fn default_use_proxy() -> bool {
    true
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            endpoint_id: String::new(),
            api_key: String::new(),
            timeout: default_timeout(),
            poll_interval_ms: default_poll_interval_ms(),
            max_wait_ms: default_max_wait_ms(),
            use_proxy: default_use_proxy(),
        }
    }
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Build the base configuration from defaults overlaid with
    /// `FLUXSTUDIO_*` environment variables (e.g. `FLUXSTUDIO_API_KEY`).
    pub fn from_env() -> Result<Self> {
        let config = Config::builder()
            .set_default("api_base", DEFAULT_API_BASE)?
            .set_default("endpoint_id", "")?
            .set_default("api_key", "")?
            .set_default("timeout", default_timeout() as i64)?
            .set_default("poll_interval_ms", DEFAULT_POLL_INTERVAL_MS as i64)?
            .set_default("max_wait_ms", DEFAULT_MAX_WAIT_MS as i64)?
            .set_default("use_proxy", true)?
            .add_source(Environment::with_prefix("FLUXSTUDIO").try_parsing(true))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_base.is_empty() {
            return Err(StudioError::invalid_endpoint("API base cannot be empty"));
        }
        if self.api_key.is_empty() {
            return Err(StudioError::missing_credentials(
                "API key is not set; run `fluxstudio login` first",
            ));
        }
        if self.endpoint_id.is_empty() {
            return Err(StudioError::missing_credentials(
                "Endpoint id is not set; run `fluxstudio login` first",
            ));
        }
        Ok(())
    }

    /// Join an operation path onto `{api_base}/{endpoint_id}`.
    pub fn endpoint_url(&self, path: &str) -> String {
        let path = path.strip_prefix('/').unwrap_or(path);
        let base = if self.api_base.starts_with("http://") || self.api_base.starts_with("https://")
        {
            self.api_base.clone()
        } else {
            format!("https://{}", self.api_base)
        };

        format!(
            "{}/{}/{}",
            base.trim_end_matches('/'),
            self.endpoint_id,
            path
        )
    }
}

/// Builder for ClientConfig
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    api_base: Option<String>,
    endpoint_id: Option<String>,
    api_key: Option<String>,
    timeout: Option<u64>,
    poll_interval_ms: Option<u64>,
    max_wait_ms: Option<u64>,
    use_proxy: Option<bool>,
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn api_base<S: Into<String>>(mut self, api_base: S) -> Self {
        self.api_base = Some(api_base.into());
        self
    }

    pub fn endpoint_id<S: Into<String>>(mut self, endpoint_id: S) -> Self {
        self.endpoint_id = Some(endpoint_id.into());
        self
    }

    pub fn api_key<S: Into<String>>(mut self, api_key: S) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn timeout(mut self, timeout: u64) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = Some(ms);
        self
    }

    pub fn max_wait_ms(mut self, ms: u64) -> Self {
        self.max_wait_ms = Some(ms);
        self
    }

    pub fn use_proxy(mut self, use_proxy: bool) -> Self {
        self.use_proxy = Some(use_proxy);
        self
    }

    /// Resolve environment and defaults, apply explicit overrides, validate.
    ///
    /// Credentials given through the builder (usually from the settings
    /// slice) win only when the environment did not supply a value, so CI
    /// can point the CLI at a different endpoint without touching state.
    pub fn build(self) -> Result<ClientConfig> {
        let mut config = ClientConfig::from_env()?;

        if let Some(api_base) = self.api_base {
            config.api_base = api_base;
        }
        if config.endpoint_id.is_empty() {
            if let Some(endpoint_id) = self.endpoint_id {
                config.endpoint_id = endpoint_id;
            }
        }
        if config.api_key.is_empty() {
            if let Some(api_key) = self.api_key {
                config.api_key = api_key;
            }
        }
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }
        if let Some(ms) = self.poll_interval_ms {
            config.poll_interval_ms = ms;
        }
        if let Some(ms) = self.max_wait_ms {
            config.max_wait_ms = ms;
        }
        if let Some(use_proxy) = self.use_proxy {
            config.use_proxy = use_proxy;
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_url_joins_base_endpoint_and_path() {
        let config = ClientConfig {
            api_base: "https://api.runpod.ai/v2/".to_string(),
            endpoint_id: "ep-123".to_string(),
            api_key: "rp_key".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.endpoint_url("/status/j-1"),
            "https://api.runpod.ai/v2/ep-123/status/j-1"
        );
        assert_eq!(
            config.endpoint_url("runsync"),
            "https://api.runpod.ai/v2/ep-123/runsync"
        );
    }

    #[test]
    fn endpoint_url_defaults_to_https() {
        let config = ClientConfig {
            api_base: "api.example.com/v2".to_string(),
            endpoint_id: "ep".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.endpoint_url("health"),
            "https://api.example.com/v2/ep/health"
        );
    }

    #[test]
    fn validate_requires_both_credentials() {
        let mut config = ClientConfig {
            api_key: "key".to_string(),
            endpoint_id: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.endpoint_id = "ep".to_string();
        assert!(config.validate().is_ok());

        config.api_key.clear();
        assert!(config.validate().is_err());
    }
}
