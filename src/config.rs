//! Service configuration
//!
//! Loaded from an optional YAML file, with every section defaulted, then
//! overridden from environment variables.
//!
//! ```yaml
//! refresh:
//!   interval_secs: 900
//! retry:
//!   max_attempts: 10
//!   min_delay_ms: 1000
//! throttle:
//!   calls_per_second: 5
//! sources:
//!   slack: true
//!   spark: false
//! ```

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub retry: RetryConfig,
    pub throttle: ThrottleConfig,
    pub refresh: RefreshConfig,
    pub resolution: ResolutionConfig,
    pub sources: SourcesConfig,
}

/// Webhook listener configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

/// Management API client configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub api_key_header: String,
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.meraki.com/api/v0".to_string(),
            api_key_env: "MERAKI_API_KEY".to_string(),
            api_key_header: "X-Cisco-Meraki-API-Key".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Retry executor configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            min_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }
}

/// Process-wide upstream call throttle
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    pub calls_per_second: u32,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            calls_per_second: 5,
        }
    }
}

/// Snapshot refresh configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub interval_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self { interval_secs: 900 }
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Resolution and prompt rendering configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolutionConfig {
    /// Maximum list entries shown before "and N others" summarization
    pub display_limit: usize,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self { display_limit: 10 }
    }
}

/// Chat platforms the webhook accepts requests from
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub google: bool,
    pub facebook: bool,
    pub slack: bool,
    pub spark: bool,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            google: true,
            facebook: true,
            slack: true,
            spark: true,
        }
    }
}

impl SourcesConfig {
    /// Map an official platform source string to whether it is enabled.
    ///
    /// Returns `None` for platforms this service does not know about.
    pub fn is_enabled(&self, official_source: &str) -> Option<bool> {
        match official_source {
            "ACTIONS_ON_GOOGLE" | "google" => Some(self.google),
            "FACEBOOK" | "facebook" => Some(self.facebook),
            "SLACK" | "slack" => Some(self.slack),
            "spark" => Some(self.spark),
            _ => None,
        }
    }

    pub fn any_enabled(&self) -> bool {
        self.google || self.facebook || self.slack || self.spark
    }
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Load from an optional file, apply process environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through the given lookup function
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("NETASSIST_ADDR") {
            self.server.addr = addr
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("NETASSIST_ADDR: {addr}")))?;
        } else if let Some(port) = lookup("PORT") {
            let port: u16 = port
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("PORT: {port}")))?;
            self.server.addr.set_port(port);
        }

        if let Some(url) = lookup("UPSTREAM_BASE_URL") {
            self.upstream.base_url = url;
        }

        if let Some(secs) = lookup("REFRESH_INTERVAL_SECS") {
            self.refresh.interval_secs = secs
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("REFRESH_INTERVAL_SECS: {secs}")))?;
        }

        let flags = [
            ("GOOGLE_SUPPORT", &mut self.sources.google),
            ("FACEBOOK_SUPPORT", &mut self.sources.facebook),
            ("SLACK_SUPPORT", &mut self.sources.slack),
            ("SPARK_SUPPORT", &mut self.sources.spark),
        ];
        for (key, slot) in flags {
            if let Some(value) = lookup(key) {
                *slot = parse_bool(&value)
                    .ok_or_else(|| ConfigError::Invalid(format!("{key}: {value}")))?;
            }
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.throttle.calls_per_second == 0 {
            return Err(ConfigError::Invalid(
                "throttle.calls_per_second must be at least 1".into(),
            ));
        }
        if self.resolution.display_limit == 0 {
            return Err(ConfigError::Invalid(
                "resolution.display_limit must be at least 1".into(),
            ));
        }
        if self.refresh.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "refresh.interval_secs must be at least 1".into(),
            ));
        }
        if !self.sources.any_enabled() {
            return Err(ConfigError::Invalid(
                "at least one chat platform source must be enabled".into(),
            ));
        }
        Ok(())
    }
}

/// Parse "true"/"false" in any casing
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}
