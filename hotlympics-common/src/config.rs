//! Configuration loading for the rating client
//!
//! Settings are resolved in priority order:
//! 1. Command-line arguments (applied by the binary after loading)
//! 2. Environment variables (`HOTLYMPICS_API_URL`, `HOTLYMPICS_TOKEN`)
//! 3. TOML config file (`HOTLYMPICS_CONFIG`, or `<config_dir>/hotlympics/rater.toml`)
//! 4. Compiled defaults
//!
//! A missing config file is not an error: defaults are used and a warning is
//! logged.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::models::Cohort;
use crate::{Error, Result};

pub const ENV_CONFIG_PATH: &str = "HOTLYMPICS_CONFIG";
pub const ENV_API_URL: &str = "HOTLYMPICS_API_URL";
pub const ENV_TOKEN: &str = "HOTLYMPICS_TOKEN";

/// Full client configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RaterConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub leaderboard: LeaderboardConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Backend connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Static bearer token, used when the identity provider has none
    #[serde(default)]
    pub bearer_token: Option<String>,
}

/// Prefetch queue settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Items requested per block
    #[serde(default = "default_block_size")]
    pub block_size: usize,
}

/// Media cache bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_entries")]
    pub max_entries: usize,
    #[serde(default = "default_cache_bytes")]
    pub max_bytes: usize,
}

/// Session gate settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Cohort shown when the viewer's own cohort is unknown
    #[serde(default = "default_cohort")]
    pub default_cohort: Cohort,
}

/// Leaderboard reader settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardConfig {
    /// How long a fetched board is served from memory; 0 always refetches
    #[serde(default = "default_leaderboard_ttl_secs")]
    pub ttl_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_block_size() -> usize {
    10
}

fn default_cache_entries() -> usize {
    50
}

fn default_cache_bytes() -> usize {
    100 * 1024 * 1024
}

fn default_cohort() -> Cohort {
    Cohort::Female
}

fn default_leaderboard_ttl_secs() -> u64 {
    600
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            bearer_token: None,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            block_size: default_block_size(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_cache_entries(),
            max_bytes: default_cache_bytes(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_cohort: default_cohort(),
        }
    }
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_leaderboard_ttl_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl RaterConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Read and parse a TOML config file
    pub fn load_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Resolve, load and apply environment overrides
    ///
    /// `cli_path` is the `--config` argument, if any. An explicitly named file
    /// that cannot be read is an error; a missing default file is not.
    /// Values are not validated here: the caller applies command-line
    /// overrides first and then calls [`RaterConfig::validate`].
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let explicit = cli_path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(ENV_CONFIG_PATH).map(PathBuf::from));

        let mut config = match explicit {
            Some(path) => {
                info!("Loading config from {}", path.display());
                Self::load_file(&path).map_err(|e| {
                    Error::Config(format!("Cannot load {}: {}", path.display(), e))
                })?
            }
            None => match default_config_path().filter(|p| p.exists()) {
                Some(path) => {
                    info!("Loading config from {}", path.display());
                    Self::load_file(&path)?
                }
                None => {
                    warn!("No config file found, using compiled defaults");
                    Self::default()
                }
            },
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `HOTLYMPICS_API_URL` and `HOTLYMPICS_TOKEN` when set and non-empty
    pub fn apply_env_overrides(&mut self) {
        if let Some(url) = non_empty_env(ENV_API_URL) {
            self.api.base_url = url;
        }
        if let Some(token) = non_empty_env(ENV_TOKEN) {
            self.api.bearer_token = Some(token);
        }
    }

    /// Reject settings the client cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(Error::Config("api.base_url must not be empty".to_string()));
        }
        if !(self.api.base_url.starts_with("http://") || self.api.base_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "api.base_url must be an http(s) URL, got {:?}",
                self.api.base_url
            )));
        }
        if self.api.timeout_secs == 0 {
            return Err(Error::Config("api.timeout_secs must be positive".to_string()));
        }
        if self.queue.block_size < 2 {
            return Err(Error::Config(format!(
                "queue.block_size must hold at least one pair, got {}",
                self.queue.block_size
            )));
        }
        if self.cache.max_entries == 0 || self.cache.max_bytes == 0 {
            return Err(Error::Config("cache limits must be positive".to_string()));
        }
        Ok(())
    }
}

/// Platform config file location (`~/.config/hotlympics/rater.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("hotlympics").join("rater.toml"))
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
