//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! `API_BASE_URL` and `SESSION_STORE_PATH` override their TOML fields so a
//! container can repoint the gateway without editing the file.

use serde::Deserialize;
use session_auth::{
    DEFAULT_LEAD_TIME, DEFAULT_MIN_DELAY, DEFAULT_RENEWAL_PATH, DEFAULT_RENEWAL_TIMEOUT,
    DEFAULT_REQUEST_TIMEOUT, Slot,
};
use session_core::SessionConfig;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionSettings,
    pub gateway: GatewayConfig,
}

/// Upstream API settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_renewal_path")]
    pub renewal_path: String,
    #[serde(default = "default_renewal_timeout")]
    pub renewal_timeout_secs: u64,
}

/// Credential persistence and renewal timing
#[derive(Debug, Deserialize)]
pub struct SessionSettings {
    /// File holding the credential; in-memory only when absent
    #[serde(default)]
    pub store_path: Option<PathBuf>,
    #[serde(default = "default_lead_time")]
    pub lead_time_secs: u64,
    #[serde(default = "default_min_delay")]
    pub min_delay_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            store_path: None,
            lead_time_secs: default_lead_time(),
            min_delay_secs: default_min_delay(),
        }
    }
}

/// Inbound HTTP settings
#[derive(Debug, Deserialize)]
pub struct GatewayConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_secs()
}

fn default_renewal_path() -> String {
    DEFAULT_RENEWAL_PATH.to_string()
}

fn default_renewal_timeout() -> u64 {
    DEFAULT_RENEWAL_TIMEOUT.as_secs()
}

fn default_lead_time() -> u64 {
    DEFAULT_LEAD_TIME.as_secs()
}

fn default_min_delay() -> u64 {
    DEFAULT_MIN_DELAY.as_secs()
}

fn default_max_connections() -> usize {
    1000
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Ok(url) = std::env::var("API_BASE_URL") {
            config.api.base_url = url;
        }
        if let Ok(store) = std::env::var("SESSION_STORE_PATH") {
            config.session.store_path = Some(PathBuf::from(store));
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://")
        {
            return Err(common::Error::invalid(
                "api.base_url",
                format!("must start with http:// or https://, got: {}", self.api.base_url),
            ));
        }
        if self.api.timeout_secs == 0 {
            return Err(common::Error::invalid(
                "api.timeout_secs",
                "must be greater than 0",
            ));
        }
        if self.api.renewal_timeout_secs == 0 {
            return Err(common::Error::invalid(
                "api.renewal_timeout_secs",
                "must be greater than 0",
            ));
        }
        if !self.api.renewal_path.starts_with('/') {
            return Err(common::Error::invalid(
                "api.renewal_path",
                format!("must start with '/', got: {}", self.api.renewal_path),
            ));
        }
        if self.session.min_delay_secs == 0 {
            return Err(common::Error::invalid(
                "session.min_delay_secs",
                "must be greater than 0",
            ));
        }
        if self.gateway.max_connections == 0 {
            return Err(common::Error::invalid(
                "gateway.max_connections",
                "must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Coordinator settings derived from `[api]` and `[session]`.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            lead_time: Duration::from_secs(self.session.lead_time_secs),
            min_delay: Duration::from_secs(self.session.min_delay_secs),
            renewal_path: self.api.renewal_path.clone(),
            renewal_timeout: Duration::from_secs(self.api.renewal_timeout_secs),
            ..SessionConfig::default()
        }
    }

    pub fn store_slot(&self) -> Slot {
        match &self.session.store_path {
            Some(path) => Slot::File(path.clone()),
            None => Slot::Memory,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("session-gateway.toml")
    }
}
