use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Project directory holding the YAML layers.
pub const CONFIG_DIR: &str = ".dynacache";

/// Prefix of environment overrides (`DYNACACHE_CACHE__ENTITY_TTL_SECONDS`).
pub const ENV_PREFIX: &str = "DYNACACHE_";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid {field}: TTL must be at least 1 second")]
    ZeroTtl { field: &'static str },

    #[error("Invalid list_ttl_seconds: {list} must not exceed entity_ttl_seconds ({entity})")]
    ListTtlTooLong { list: u64, entity: u64 },

    #[error("Invalid cleanup_interval_seconds: must be at least 1")]
    ZeroCleanupInterval,

    #[error("Database URL cannot be empty")]
    EmptyDatabaseUrl,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Notification channel cannot be empty")]
    EmptyNotificationChannel,

    #[error("Invalid notification channel: {0}. Use letters, digits and underscores")]
    InvalidNotificationChannel(String),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must be less than max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Invalid wake_interval_ms: must be at least 1")]
    ZeroWakeInterval,

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for the current directory.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. .dynacache/config.yaml
    /// 3. .dynacache/local.yaml (optional overrides)
    /// 4. DYNACACHE_* environment variables, `__` separating sections
    pub fn load() -> Result<Config> {
        Self::load_from_dir(".")
    }

    /// Same as [`ConfigLoader::load`] rooted at `root`.
    pub fn load_from_dir(root: impl AsRef<Path>) -> Result<Config> {
        let dir = root.as_ref().join(CONFIG_DIR);
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, without env overrides.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let cache = &config.cache;
        for (field, value) in [
            ("entity_ttl_seconds", cache.entity_ttl_seconds),
            ("tool_ttl_seconds", cache.tool_ttl_seconds),
            ("list_ttl_seconds", cache.list_ttl_seconds),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroTtl { field });
            }
        }

        if cache.list_ttl_seconds > cache.entity_ttl_seconds {
            return Err(ConfigError::ListTtlTooLong {
                list: cache.list_ttl_seconds,
                entity: cache.entity_ttl_seconds,
            });
        }

        if cache.cleanup_interval_seconds == 0 {
            return Err(ConfigError::ZeroCleanupInterval);
        }

        let database = &config.database;
        if database.url.trim().is_empty() {
            return Err(ConfigError::EmptyDatabaseUrl);
        }

        if database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(database.max_connections));
        }

        if database.notification_channel.is_empty() {
            return Err(ConfigError::EmptyNotificationChannel);
        }

        if !database
            .notification_channel
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ConfigError::InvalidNotificationChannel(
                database.notification_channel.clone(),
            ));
        }

        let listener = &config.listener;
        if listener.initial_backoff_ms >= listener.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                listener.initial_backoff_ms,
                listener.max_backoff_ms,
            ));
        }

        if listener.wake_interval_ms == 0 {
            return Err(ConfigError::ZeroWakeInterval);
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        Ok(())
    }
}
