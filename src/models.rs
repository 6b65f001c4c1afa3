// Core data structures for the instance status store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::protocol::CheckRequest;

/// Store-assigned identifier of a monitored instance
///
/// Opaque to everything except the store that minted it. It travels inside
/// check requests and responses and is the only correlation key between them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for InstanceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for InstanceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Observed status of an instance
///
/// A record that has never been checked has no status at all, which is
/// modelled as `Option<InstanceStatus>` rather than a fourth variant so
/// that a check response can never carry "unset".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InstanceStatus {
    /// Health endpoint answered with a success status
    Active,
    /// Unreachable, timed out, or answered with an unexpected status
    Inactive,
    /// Health endpoint reported an internal failure
    Errored,
}

impl InstanceStatus {
    /// Wire and storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
            Self::Errored => "ERRORED",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Every status, in wire order
    pub fn all() -> [Self; 3] {
        [Self::Active, Self::Inactive, Self::Errored]
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "INACTIVE" => Ok(Self::Inactive),
            "ERRORED" => Ok(Self::Errored),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A status string that is not one of the three known values
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown instance status: {0}")]
pub struct UnknownStatus(pub String);

/// One monitored endpoint as held by the state store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub id: InstanceId,
    pub host: String,
    pub port: u16,
    pub name: String,
    pub region: String,
    pub status: Option<InstanceStatus>,
    pub last_updated: Option<DateTime<Utc>>,
    pub last_active: Option<DateTime<Utc>>,
}

impl InstanceRecord {
    /// Materialize a freshly seeded record under a store-assigned id
    pub fn from_new(id: InstanceId, new: NewInstance) -> Self {
        Self {
            id,
            host: new.host,
            port: new.port,
            name: new.name,
            region: new.region,
            status: None,
            last_updated: None,
            last_active: None,
        }
    }

    /// `host:port` of the endpoint
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Build the bus message asking a worker to probe this instance
    pub fn check_request(&self) -> CheckRequest {
        CheckRequest {
            id: self.id.clone(),
            host: self.host.clone(),
            port: self.port,
        }
    }

    /// Whether this instance has ever been checked
    pub fn is_checked(&self) -> bool {
        self.status.is_some()
    }
}

/// An instance that has not been inserted yet (no id)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInstance {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub region: String,
}

impl NewInstance {
    pub fn new(
        name: impl Into<String>,
        region: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            name: name.into(),
            region: region.into(),
        }
    }
}
