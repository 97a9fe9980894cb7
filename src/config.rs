//! Configuration management for Tollgate.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use tracing::info;

use crate::error::{Result, TollgateError};
use crate::ratelimit::MAX_LEVEL_LIMIT;

/// Main configuration for the Tollgate service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TollgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 1337))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Tokens handed to each client identifier
    #[serde(default = "default_rate")]
    pub rate: u64,

    /// Idle seconds after which a client's bucket may be evicted
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,

    /// Seconds between compaction passes
    #[serde(default = "default_compaction_interval")]
    pub compaction_interval_secs: u64,

    /// Refill buckets to capacity every this many seconds; never when unset
    #[serde(default)]
    pub refill_interval_secs: Option<u64>,

    /// Tower height cap for the identifier store
    #[serde(default = "default_max_level")]
    pub max_level: usize,

    /// Take the client address from `X-Forwarded-For` when present
    #[serde(default = "default_trust_forwarded_for")]
    pub trust_forwarded_for: bool,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            rate: default_rate(),
            stale_after_secs: default_stale_after(),
            compaction_interval_secs: default_compaction_interval(),
            refill_interval_secs: None,
            max_level: default_max_level(),
            trust_forwarded_for: default_trust_forwarded_for(),
        }
    }
}

fn default_rate() -> u64 {
    10
}

fn default_stale_after() -> u64 {
    86400
}

fn default_compaction_interval() -> u64 {
    86400
}

fn default_max_level() -> usize {
    32
}

fn default_trust_forwarded_for() -> bool {
    true
}

impl RateLimitingConfig {
    /// Reject values the limiter cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.rate == 0 {
            return Err(TollgateError::InvalidRate(self.rate));
        }
        if self.compaction_interval_secs == 0 {
            return Err(TollgateError::Config(
                "compaction_interval_secs must be positive".to_string(),
            ));
        }
        if self.refill_interval_secs == Some(0) {
            return Err(TollgateError::Config(
                "refill_interval_secs must be positive when set".to_string(),
            ));
        }
        if self.max_level == 0 || self.max_level > MAX_LEVEL_LIMIT {
            return Err(TollgateError::Config(format!(
                "max_level must be between 1 and {}",
                MAX_LEVEL_LIMIT
            )));
        }
        Ok(())
    }
}

impl TollgateConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TollgateConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.rate_limiting.validate()
    }
}
