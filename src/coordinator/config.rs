//! Coordinator configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ConfigError;

/// Default pause between sweep starts
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

/// Configuration for the coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Seconds between sweep starts
    pub sweep_interval_secs: u64,

    /// Seed the store before the first sweep
    pub seed_on_start: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            seed_on_start: false,
        }
    }
}

impl CoordinatorConfig {
    /// Create a new config builder
    pub fn builder() -> CoordinatorConfigBuilder {
        CoordinatorConfigBuilder::default()
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sweep_interval_secs".to_string(),
                reason: "Must be at least 1 second".to_string(),
            });
        }

        Ok(())
    }
}

/// Builder for CoordinatorConfig
#[derive(Debug, Default)]
pub struct CoordinatorConfigBuilder {
    sweep_interval_secs: Option<u64>,
    seed_on_start: Option<bool>,
}

impl CoordinatorConfigBuilder {
    /// Set sweep interval
    pub fn sweep_interval_secs(mut self, secs: u64) -> Self {
        self.sweep_interval_secs = Some(secs);
        self
    }

    /// Seed before the first sweep
    pub fn seed_on_start(mut self, seed: bool) -> Self {
        self.seed_on_start = Some(seed);
        self
    }

    /// Build the config
    pub fn build(self) -> Result<CoordinatorConfig, ConfigError> {
        let defaults = CoordinatorConfig::default();
        let config = CoordinatorConfig {
            sweep_interval_secs: self
                .sweep_interval_secs
                .unwrap_or(defaults.sweep_interval_secs),
            seed_on_start: self.seed_on_start.unwrap_or(defaults.seed_on_start),
        };

        config.validate()?;
        Ok(config)
    }
}
