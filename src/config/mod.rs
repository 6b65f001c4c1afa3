//! Configuration management for activity-status
//!
//! This module handles loading and validating configuration from environment
//! variables and TOML files. Command-line flags override individual values
//! after loading.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::bus::{BusSubjects, RedisBusConfig};
use crate::coordinator::CoordinatorConfig;
use crate::prober::ProberConfig;
use crate::seed::SeedConfig;
use crate::store::PostgresStoreConfig;
use crate::worker::WorkerConfig;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Message bus configuration
    pub bus: BusConfig,

    /// State store configuration
    pub store: PostgresStoreConfig,

    /// Sweep configuration
    pub coordinator: CoordinatorConfig,

    /// Worker pool configuration
    pub worker: WorkerConfig,

    /// Liveness probe configuration
    pub prober: ProberConfig,

    /// Fleet to seed
    pub seed: SeedConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Admin endpoint configuration
    pub admin: AdminConfig,
}

/// Message bus configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Redis Streams connection
    pub redis: RedisBusConfig,

    /// Subject and group names
    pub subjects: BusSubjects,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

/// Admin endpoint (metrics and liveness of the process itself)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Serve the admin router at all
    pub enabled: bool,

    /// Bind address
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: String::from("0.0.0.0:9090"),
        }
    }
}

impl AdminConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind_address.parse().map_err(|_| {
            ConfigError::invalid(
                "admin.bind_address",
                format!("Invalid address: {}", self.bind_address),
            )
        })
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse::<T>().ok())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("REDIS_URL") {
            config.bus.redis.url = url;
        }
        if let Ok(prefix) = std::env::var("STATUS_SUBJECT_PREFIX") {
            if !prefix.is_empty() {
                config.bus.subjects = BusSubjects::with_prefix(&prefix);
            }
        }

        if let Ok(url) = std::env::var("POSTGRES_URL").or_else(|_| std::env::var("DATABASE_URL")) {
            config.store.database_url = url;
        }
        if let Some(size) = env_parse("STATUS_DB_POOL_SIZE") {
            config.store.pool_size = size;
        }

        if let Some(secs) = env_parse("STATUS_SWEEP_INTERVAL_SECS") {
            config.coordinator.sweep_interval_secs = secs;
        }
        if let Some(replicas) = env_parse("STATUS_WORKER_REPLICAS") {
            config.worker.replicas = replicas;
        }

        if let Some(timeout_ms) = env_parse("STATUS_PROBE_TIMEOUT_MS") {
            config.prober.timeout_ms = timeout_ms;
        }
        if let Ok(path) = std::env::var("STATUS_HEALTH_PATH") {
            config.prober.health_path = path;
        }

        config.seed = SeedConfig::from_env();

        if let Ok(level) = std::env::var("STATUS_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("STATUS_LOG_FORMAT") {
            config.logging.format = format;
        }

        if let Ok(bind) = std::env::var("STATUS_ADMIN_BIND") {
            config.admin.bind_address = bind;
        }

        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bus
            .subjects
            .validate()
            .map_err(|reason| ConfigError::invalid("bus.subjects", reason))?;

        if self.bus.redis.pool_size == 0 {
            return Err(ConfigError::invalid("bus.redis.pool_size", "must be greater than 0"));
        }

        if self.store.pool_size == 0 {
            return Err(ConfigError::invalid("store.pool_size", "must be greater than 0"));
        }
        self.store
            .collection
            .validate()
            .map_err(|reason| ConfigError::invalid("store.collection", reason))?;

        self.coordinator.validate()?;

        self.worker
            .validate()
            .map_err(|reason| ConfigError::invalid("worker.replicas", reason))?;

        self.prober
            .validate()
            .map_err(|reason| ConfigError::invalid("prober", reason))?;

        self.seed
            .validate()
            .map_err(|reason| ConfigError::invalid("seed", reason))?;

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            return Err(ConfigError::invalid(
                "logging.format",
                format!("expected 'text' or 'json', got '{}'", self.logging.format),
            ));
        }

        if self.admin.enabled {
            self.admin.socket_addr()?;
        }

        Ok(())
    }
}
