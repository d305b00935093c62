//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub profile: ProfileConfig,

    #[serde(default)]
    pub upload: UploadConfig,

    #[serde(default)]
    pub scheduler: SchedulerSection,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Local profile store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_data_dir() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("vitalsync").to_string_lossy().to_string())
        .unwrap_or_else(|| "./vitalsync_data".to_string())
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Upload destination and auth endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Endpoint exchanging the identity token for storage credentials
    #[serde(default = "default_exchange_url")]
    pub credential_exchange_url: String,

    /// Endpoint refreshing the identity token itself
    #[serde(default = "default_token_url")]
    pub token_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_endpoint() -> String {
    "http://localhost:9000".to_string()
}

fn default_bucket() -> String {
    "health-snapshots".to_string()
}

fn default_exchange_url() -> String {
    "http://localhost:9001/v1/credentials".to_string()
}

fn default_token_url() -> String {
    "http://localhost:9001/v1/token".to_string()
}

fn default_request_timeout() -> u64 {
    30_000
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            bucket: default_bucket(),
            credential_exchange_url: default_exchange_url(),
            token_url: default_token_url(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

/// Scheduler timing configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSection {
    /// Local wall-clock hour of the daily upload
    #[serde(default = "default_daily_hour")]
    pub daily_hour: u32,

    #[serde(default)]
    pub daily_minute: u32,

    /// How often to request a background execution window (hours)
    #[serde(default = "default_background_interval")]
    pub background_interval_hours: u64,

    /// Granted window duration (seconds)
    #[serde(default = "default_background_window")]
    pub background_window_secs: u64,
}

fn default_daily_hour() -> u32 {
    17
}

fn default_background_interval() -> u64 {
    24
}

fn default_background_window() -> u64 {
    30
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            daily_hour: default_daily_hour(),
            daily_minute: 0,
            background_interval_hours: default_background_interval(),
            background_window_secs: default_background_window(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,

    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("vitalsync").join("config.toml")),
            Some(PathBuf::from("/etc/vitalsync/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        if let Ok(data_dir) = std::env::var("VITALSYNC_DATA_DIR") {
            self.profile.data_dir = data_dir;
        }

        if let Ok(endpoint) = std::env::var("VITALSYNC_UPLOAD_ENDPOINT") {
            self.upload.endpoint = endpoint;
        }
        if let Ok(bucket) = std::env::var("VITALSYNC_UPLOAD_BUCKET") {
            self.upload.bucket = bucket;
        }

        if let Ok(level) = std::env::var("VITALSYNC_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("VITALSYNC_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            profile: ProfileConfig::default(),
            upload: UploadConfig::default(),
            scheduler: SchedulerSection::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Vitalsync Configuration
#
# Environment variables override these settings:
# - VITALSYNC_DATA_DIR
# - VITALSYNC_UPLOAD_ENDPOINT
# - VITALSYNC_UPLOAD_BUCKET
# - VITALSYNC_LOG_LEVEL
# - VITALSYNC_LOG_FORMAT

[profile]
# Directory for the local profile store (cached token, display name)
data_dir = "~/.local/share/vitalsync"

[upload]
# Object store API base URL
endpoint = "http://localhost:9000"

# Bucket holding one snapshot object per user per day
bucket = "health-snapshots"

# Endpoint exchanging the identity token for storage credentials
credential_exchange_url = "http://localhost:9001/v1/credentials"

# Endpoint refreshing the identity token
token_url = "http://localhost:9001/v1/token"

# Request timeout in milliseconds
request_timeout_ms = 30000

[scheduler]
# Local wall-clock time of the daily upload
daily_hour = 17
daily_minute = 0

# How often to request a background execution window (hours)
background_interval_hours = 24

# Granted window duration (seconds)
background_window_secs = 30

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

# Optional log file path
# file = "/var/log/vitalsync/vitalsync.log"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = Config::default();
        assert_eq!(config.scheduler.daily_hour, 17);
        assert_eq!(config.upload.bucket, "health-snapshots");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn generated_config_parses() {
        let content = generate_default_config();
        let config: Config = toml::from_str(&content).unwrap();
        assert_eq!(config.scheduler.background_window_secs, 30);
        assert_eq!(config.upload.endpoint, "http://localhost:9000");
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let config: Config = toml::from_str("[scheduler]\ndaily_hour = 6\n").unwrap();
        assert_eq!(config.scheduler.daily_hour, 6);
        assert_eq!(config.scheduler.daily_minute, 0);
        assert_eq!(config.upload.bucket, "health-snapshots");
    }
}
