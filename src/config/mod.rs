//! Configuration management.
//!
//! Configuration comes from three layers, later layers winning: built-in
//! defaults, an optional TOML file, and `FRANNIE_BACKUP_*` environment
//! variables. The binary loads `.env` files through `dotenvy` before this
//! module reads the environment.

use crate::retry::RetryPolicy;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Environment variable naming the config file path.
pub const CONFIG_PATH_ENV: &str = "FRANNIE_BACKUP_CONFIG_PATH";

/// Main configuration for the backup service.
#[derive(Debug, Clone)]
pub struct BackupConfig {
    /// Base URL of the backup API (scheme, host, port; no path).
    pub api_base_url: String,
    /// Directory holding the local snapshot history.
    pub data_dir: PathBuf,
    /// Seconds between automatic captures.
    pub backup_interval_secs: u64,
    /// Seconds between database health probes.
    pub health_check_interval_secs: u64,
    /// Maximum snapshots kept in the local history.
    pub local_retention: usize,
    /// Maximum backup files kept on the server.
    pub remote_retention: usize,
    /// Retry policy for remote calls.
    pub retry: RetryPolicy,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Backup API base URL.
    pub api_base_url: Option<String>,
    /// Local data directory.
    pub data_dir: Option<String>,
    /// Capture interval in seconds.
    pub backup_interval_secs: Option<u64>,
    /// Health probe interval in seconds.
    pub health_check_interval_secs: Option<u64>,
    /// Local history cap.
    pub local_retention: Option<usize>,
    /// Remote file cap.
    pub remote_retention: Option<usize>,
    /// Retry section.
    pub retry: Option<ConfigFileRetry>,
}

/// Retry section in the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileRetry {
    /// Maximum retries after the first attempt.
    pub max_retries: Option<u32>,
    /// Backoff base delay in milliseconds.
    pub retry_delay_ms: Option<u64>,
    /// Whether final failures are surfaced to the operator.
    pub notify_user: Option<bool>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:5000".to_string(),
            data_dir: default_data_dir(),
            backup_interval_secs: 3600,
            health_check_interval_secs: 300,
            local_retention: 24,
            remote_retention: 48,
            retry: RetryPolicy::default(),
        }
    }
}

/// Platform data directory, falling back to a hidden dir in cwd.
fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from(".frannie-backup"),
        |b| b.data_local_dir().join("frannie-backup"),
    )
}

impl BackupConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file cannot be read, parsed, or
    /// fails validation.
    pub fn load_from_file(path: &std::path::Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;

        let file: ConfigFile = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("cannot parse {}: {e}", path.display())))?;

        let config = Self::from_config_file(file).with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from the default location.
    ///
    /// Checks, in order: the `FRANNIE_BACKUP_CONFIG_PATH` environment
    /// variable, then `config.toml` under the platform config dir. Falls back
    /// to defaults (plus environment overrides) when no file is found.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a file was found but is invalid, or
    /// when environment overrides produce an invalid configuration.
    pub fn load_default() -> Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            if !path.trim().is_empty() {
                return Self::load_from_file(std::path::Path::new(&path));
            }
        }

        if let Some(base_dirs) = directories::BaseDirs::new() {
            let platform_config = base_dirs
                .config_dir()
                .join("frannie-backup")
                .join("config.toml");
            if platform_config.exists() {
                return Self::load_from_file(&platform_config);
            }
        }

        let config = Self::default().with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Converts a parsed [`ConfigFile`] into a configuration.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(url) = file.api_base_url {
            config.api_base_url = url;
        }
        if let Some(dir) = file.data_dir {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(secs) = file.backup_interval_secs {
            config.backup_interval_secs = secs;
        }
        if let Some(secs) = file.health_check_interval_secs {
            config.health_check_interval_secs = secs;
        }
        if let Some(n) = file.local_retention {
            config.local_retention = n;
        }
        if let Some(n) = file.remote_retention {
            config.remote_retention = n;
        }
        if let Some(retry) = file.retry {
            if let Some(n) = retry.max_retries {
                config.retry.max_retries = n;
            }
            if let Some(ms) = retry.retry_delay_ms {
                config.retry.retry_delay_ms = ms;
            }
            if let Some(v) = retry.notify_user {
                config.retry.notify_user = v;
            }
        }

        config
    }

    /// Applies `FRANNIE_BACKUP_*` environment overrides.
    #[must_use]
    fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("FRANNIE_BACKUP_API_URL") {
            if !url.trim().is_empty() {
                self.api_base_url = url;
            }
        }
        if let Ok(dir) = std::env::var("FRANNIE_BACKUP_DATA_DIR") {
            if !dir.trim().is_empty() {
                self.data_dir = PathBuf::from(dir);
            }
        }
        if let Ok(secs) = std::env::var("FRANNIE_BACKUP_INTERVAL_SECS") {
            if let Ok(parsed) = secs.parse() {
                self.backup_interval_secs = parsed;
            }
        }
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for zero intervals, zero retention, or an
    /// empty API base URL.
    pub fn validate(&self) -> Result<()> {
        if self.api_base_url.trim().is_empty() {
            return Err(Error::Config("api_base_url must not be empty".to_string()));
        }
        if self.backup_interval_secs == 0 {
            return Err(Error::Config(
                "backup_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.health_check_interval_secs == 0 {
            return Err(Error::Config(
                "health_check_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.local_retention == 0 {
            return Err(Error::Config(
                "local_retention must be greater than zero".to_string(),
            ));
        }
        if self.remote_retention == 0 {
            return Err(Error::Config(
                "remote_retention must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Sets the backup API base URL.
    #[must_use]
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Sets the local data directory.
    #[must_use]
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = path.into();
        self
    }

    /// Sets the capture interval in seconds.
    #[must_use]
    pub const fn with_backup_interval_secs(mut self, secs: u64) -> Self {
        self.backup_interval_secs = secs;
        self
    }

    /// Sets the health probe interval in seconds.
    #[must_use]
    pub const fn with_health_check_interval_secs(mut self, secs: u64) -> Self {
        self.health_check_interval_secs = secs;
        self
    }

    /// Sets the local history cap.
    #[must_use]
    pub const fn with_local_retention(mut self, n: usize) -> Self {
        self.local_retention = n;
        self
    }

    /// Sets the remote file cap.
    #[must_use]
    pub const fn with_remote_retention(mut self, n: usize) -> Self {
        self.remote_retention = n;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}
