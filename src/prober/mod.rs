//! Liveness prober
//!
//! One probe is one `GET http://{host}:{port}{path}` with a bounded timeout
//! and no retries. Only the status code is inspected:
//!
//! | outcome                                   | classification |
//! |-------------------------------------------|----------------|
//! | 2xx                                       | `ACTIVE`       |
//! | 500 Internal Server Error                 | `ERRORED`      |
//! | any other status                          | `INACTIVE`     |
//! | refused, timed out, DNS failure, ...      | `INACTIVE`     |

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::InstanceStatus;

/// Liveness path probed on every target
pub const DEFAULT_HEALTH_PATH: &str = "/health";

/// Upper bound on a single probe
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 3;

/// Prober configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProberConfig {
    /// Path requested on each target
    pub health_path: String,

    /// Total time allowed for connect + response, in milliseconds
    pub timeout_ms: u64,

    /// User agent sent with each probe
    pub user_agent: String,
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            health_path: DEFAULT_HEALTH_PATH.to_string(),
            timeout_ms: DEFAULT_PROBE_TIMEOUT_SECS * 1000,
            user_agent: format!("activity-status/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ProberConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.timeout_ms == 0 {
            return Err("timeout_ms must be greater than 0".to_string());
        }
        if !self.health_path.starts_with('/') {
            return Err(format!(
                "health_path '{}' must start with '/'",
                self.health_path
            ));
        }
        Ok(())
    }
}

/// Errors building a prober
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("invalid prober config: {0}")]
    Config(String),
}

/// Something that can classify the health of `host:port`
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, host: &str, port: u16) -> InstanceStatus;
}

/// Map an HTTP status code to an instance status
pub fn classify_status(status: StatusCode) -> InstanceStatus {
    if status.is_success() {
        InstanceStatus::Active
    } else if status == StatusCode::INTERNAL_SERVER_ERROR {
        InstanceStatus::Errored
    } else {
        InstanceStatus::Inactive
    }
}

/// HTTP liveness prober
#[derive(Clone)]
pub struct HealthProber {
    client: Client,
    config: ProberConfig,
}

impl HealthProber {
    pub fn new(config: ProberConfig) -> Result<Self, ProbeError> {
        config.validate().map_err(ProbeError::Config)?;

        let client = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ProberConfig {
        &self.config
    }

    /// URL probed for a target
    pub fn health_url(&self, host: &str, port: u16) -> String {
        format!("http://{host}:{port}{}", self.config.health_path)
    }
}

#[async_trait]
impl Probe for HealthProber {
    async fn probe(&self, host: &str, port: u16) -> InstanceStatus {
        let url = self.health_url(host, port);

        match self.client.get(&url).send().await {
            Ok(response) => {
                let status = classify_status(response.status());
                tracing::debug!(
                    url = %url,
                    http_status = response.status().as_u16(),
                    classified = %status,
                    "Probe completed"
                );
                status
            }
            Err(e) => {
                tracing::debug!(
                    url = %url,
                    timeout = e.is_timeout(),
                    connect = e.is_connect(),
                    error = %e,
                    "Probe failed"
                );
                InstanceStatus::Inactive
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(StatusCode::OK), InstanceStatus::Active);
        assert_eq!(classify_status(StatusCode::NO_CONTENT), InstanceStatus::Active);
        assert_eq!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR),
            InstanceStatus::Errored
        );
        assert_eq!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE),
            InstanceStatus::Inactive
        );
        assert_eq!(classify_status(StatusCode::NOT_FOUND), InstanceStatus::Inactive);
        assert_eq!(
            classify_status(StatusCode::MOVED_PERMANENTLY),
            InstanceStatus::Inactive
        );
    }

    #[test]
    fn test_config_validation() {
        assert!(ProberConfig::default().validate().is_ok());

        let config = ProberConfig {
            timeout_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ProberConfig {
            health_path: "health".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_health_url() {
        let prober = HealthProber::new(ProberConfig::default()).unwrap();
        assert_eq!(prober.health_url("svc-a", 8080), "http://svc-a:8080/health");
    }

    #[test]
    fn test_timeout_is_bounded_by_default() {
        let config = ProberConfig::default();
        assert_eq!(config.timeout(), Duration::from_secs(3));

        let config = config.with_timeout(Duration::from_millis(250));
        assert_eq!(config.timeout_ms, 250);
    }
}
