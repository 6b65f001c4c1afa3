//! Instance state store
//!
//! One record per monitored instance, kept in the `status` collection of the
//! `instances` namespace. The core only needs four things from a store:
//!
//! - existence check of the collection
//! - bulk insert that skips instances whose `host` is already known
//! - full scan
//! - conditional update of one record by id, touching only the named fields
//!
//! An update that matches no record is reported as
//! [`UpdateOutcome::NotFound`], never as success.

pub mod memory;
pub mod postgres;
pub mod update;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{InstanceId, InstanceRecord, NewInstance};

pub use self::memory::MemoryStore;
pub use self::postgres::{PostgresStore, PostgresStoreConfig};
pub use self::update::StatusUpdate;

/// Default namespace holding the status collection
pub const DEFAULT_NAMESPACE: &str = "instances";

/// Default collection of instance records
pub const DEFAULT_COLLECTION: &str = "status";

/// Where instance records live inside the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionName {
    pub namespace: String,
    pub collection: String,
}

impl Default for CollectionName {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
        }
    }
}

impl CollectionName {
    /// Names are spliced into SQL as quoted identifiers, so keep them plain
    pub fn validate(&self) -> Result<(), String> {
        for (field, value) in [
            ("namespace", &self.namespace),
            ("collection", &self.collection),
        ] {
            let valid = !value.is_empty()
                && value
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
            if !valid {
                return Err(format!(
                    "{field} '{value}' must be non-empty lowercase ascii, digits or '_'"
                ));
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for CollectionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.namespace, self.collection)
    }
}

/// Result of a bulk conditional insert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertReport {
    /// Records written
    pub inserted: usize,
    /// Records skipped because their host already existed
    pub skipped: usize,
}

/// Result of a conditional update by id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// A record matched and its fields were set
    Updated,
    /// No record carries this id
    NotFound,
}

impl UpdateOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, Self::Updated)
    }
}

/// Storage backend for instance records
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Whether the namespace/collection pair exists
    async fn collection_exists(&self) -> Result<bool, StoreError>;

    /// Create the collection if it is missing
    async fn ensure_collection(&self) -> Result<(), StoreError>;

    /// Insert every instance whose host is not present yet
    async fn insert_missing(
        &self,
        instances: Vec<NewInstance>,
    ) -> Result<InsertReport, StoreError>;

    /// Read every record
    async fn find_all(&self) -> Result<Vec<InstanceRecord>, StoreError>;

    /// Read one record by id
    async fn find_by_id(&self, id: &InstanceId) -> Result<Option<InstanceRecord>, StoreError>;

    /// Set status fields on the record with this id
    async fn update_status(
        &self,
        id: &InstanceId,
        update: &StatusUpdate,
    ) -> Result<UpdateOutcome, StoreError>;
}

/// Store failures
#[derive(Error, Debug)]
pub enum StoreError {
    /// Could not reach the store
    #[error("failed to connect to state store: {0}")]
    Connect(String),

    /// A query or command failed
    #[error("store operation '{operation}' failed: {reason}")]
    Query {
        operation: &'static str,
        reason: String,
    },

    /// A stored record could not be mapped back into a typed record
    #[error("invalid record '{id}': {reason}")]
    InvalidRecord { id: String, reason: String },
}

impl StoreError {
    pub(crate) fn query(operation: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Query {
            operation,
            reason: err.to_string(),
        }
    }
}
