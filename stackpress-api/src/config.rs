//! Configuration management for Stackpress API
//!
//! Settings are layered, lowest priority first:
//! 1. Default values
//! 2. Configuration file (TOML format)
//! 3. Environment variables

use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::validation;

/// Disk size used when a request does not give a usable one
pub const DEFAULT_DISK_SIZE_GB: NonZeroU32 = match NonZeroU32::new(5) {
    Some(size) => size,
    None => NonZeroU32::MIN,
};

/// Main configuration struct for Stackpress
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StackpressConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Defaults and cluster settings for provisioned stacks
    pub provisioning: ProvisioningConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Directory for log files
    pub log_dir: PathBuf,
    /// Write JSON logs to `log_dir` in addition to the console
    pub file_logging_enabled: bool,
    /// Use JSON formatting on the console as well
    pub json_format: bool,
}

/// Provisioning defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    /// Prefix used when a request has no `deployment_name`
    pub default_prefix: String,
    /// Disk size used when a request omits one or sends a non-positive value
    pub default_disk_size_gb: NonZeroU32,
    /// Length of generated database passwords
    pub credential_length: usize,
    /// Node directory under which hostPath volumes are created
    pub host_path_root: String,
    pub database_image: String,
    pub app_image: String,
    /// How long each tier has to report a ready replica
    pub readiness_timeout_secs: u64,
    pub readiness_poll_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: PathBuf::from("/var/log/stackpress"),
            file_logging_enabled: false,
            json_format: false,
        }
    }
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            default_prefix: "wp".to_string(),
            default_disk_size_gb: DEFAULT_DISK_SIZE_GB,
            credential_length: 16,
            host_path_root: "/mnt/data".to_string(),
            database_image: "mysql:8".to_string(),
            app_image: "wordpress:6.7.1".to_string(),
            readiness_timeout_secs: 120,
            readiness_poll_interval_secs: 5,
        }
    }
}

impl ProvisioningConfig {
    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_secs)
    }

    pub fn readiness_poll_interval(&self) -> Duration {
        Duration::from_secs(self.readiness_poll_interval_secs)
    }
}

impl StackpressConfig {
    /// Load defaults, then the first config file found, then the environment
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::find_config_file() {
            Some(path) => Self::load_from_file(&path)?,
            None => Self::default(),
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_path_buf(), e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let paths = [
            std::env::var("STACKPRESS_CONFIG").ok().map(PathBuf::from),
            Some(PathBuf::from("/etc/stackpress/config.toml")),
            Some(PathBuf::from("./stackpress.toml")),
        ];

        paths.into_iter().flatten().find(|p| p.exists())
    }

    /// Apply overrides; `lookup` returns the value of an environment variable
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Server
        if let Some(host) = lookup("STACKPRESS_HOST") {
            self.server.host = host;
        }
        // STACKPRESS_PORT wins over the generic PORT
        for key in ["PORT", "STACKPRESS_PORT"] {
            if let Some(port) = lookup(key).and_then(|p| p.parse().ok()) {
                self.server.port = port;
            }
        }

        // Logging
        if let Some(level) = lookup("STACKPRESS_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(dir) = lookup("STACKPRESS_LOG_DIR") {
            self.logging.log_dir = PathBuf::from(dir);
        }
        if let Some(enabled) = lookup("STACKPRESS_FILE_LOGGING") {
            self.logging.file_logging_enabled = enabled.parse().unwrap_or(false);
        }
        if let Some(json) = lookup("STACKPRESS_LOG_JSON") {
            self.logging.json_format = json.parse().unwrap_or(false);
        }

        // Provisioning
        if let Some(prefix) = lookup("STACKPRESS_DEFAULT_PREFIX") {
            self.provisioning.default_prefix = prefix;
        }
        if let Some(size) = lookup("STACKPRESS_DEFAULT_DISK_SIZE_GB").and_then(|s| s.parse().ok()) {
            self.provisioning.default_disk_size_gb = size;
        }
        if let Some(root) = lookup("STACKPRESS_HOST_PATH_ROOT") {
            self.provisioning.host_path_root = root;
        }
        if let Some(image) = lookup("STACKPRESS_DATABASE_IMAGE") {
            self.provisioning.database_image = image;
        }
        if let Some(image) = lookup("STACKPRESS_APP_IMAGE") {
            self.provisioning.app_image = image;
        }
        if let Some(secs) = lookup("STACKPRESS_READINESS_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            self.provisioning.readiness_timeout_secs = secs;
        }
        if let Some(secs) =
            lookup("STACKPRESS_READINESS_POLL_INTERVAL_SECS").and_then(|s| s.parse().ok())
        {
            self.provisioning.readiness_poll_interval_secs = secs;
        }
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation("Port cannot be 0".to_string()));
        }

        let provisioning = &self.provisioning;
        if provisioning.default_prefix.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Default prefix cannot be empty".to_string(),
            ));
        }
        validation::validate_deployment_prefix(&provisioning.default_prefix)
            .map_err(|e| ConfigError::Validation(format!("Invalid default prefix: {}", e)))?;
        if provisioning.credential_length == 0 {
            return Err(ConfigError::Validation(
                "Credential length must be at least 1".to_string(),
            ));
        }
        if provisioning.host_path_root.is_empty() {
            return Err(ConfigError::Validation(
                "Host path root cannot be empty".to_string(),
            ));
        }
        if provisioning.database_image.is_empty() || provisioning.app_image.is_empty() {
            return Err(ConfigError::Validation(
                "Container images cannot be empty".to_string(),
            ));
        }
        if provisioning.readiness_timeout_secs == 0 || provisioning.readiness_poll_interval_secs == 0
        {
            return Err(ConfigError::Validation(
                "Readiness timeout and poll interval must be at least 1 second".to_string(),
            ));
        }
        if provisioning.readiness_poll_interval_secs > provisioning.readiness_timeout_secs {
            return Err(ConfigError::Validation(
                "Readiness poll interval cannot exceed the timeout".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("Failed to read config file {0:?}: {1}")]
    FileRead(PathBuf, String),
    /// Failed to parse configuration
    #[error("Failed to parse config: {0}")]
    Parse(String),
    /// Configuration validation failed
    #[error("Config validation failed: {0}")]
    Validation(String),
}
