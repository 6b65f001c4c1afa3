//! PostgreSQL instance store
//!
//! The namespace is a schema and the collection a table inside it:
//!
//! ```sql
//! CREATE TABLE instances.status (
//!     id           TEXT PRIMARY KEY DEFAULT gen_random_uuid()::text,
//!     host         TEXT NOT NULL UNIQUE,
//!     port         INTEGER NOT NULL,
//!     name         TEXT NOT NULL,
//!     region       TEXT NOT NULL,
//!     status       TEXT,
//!     last_updated TIMESTAMPTZ,
//!     last_active  TIMESTAMPTZ
//! );
//! ```
//!
//! Status updates are a single `UPDATE ... WHERE id = $1`, so concurrent
//! writes to the same row resolve by row-level atomicity with last write
//! winning. `last_active` is `COALESCE($4, last_active)`: overwritten by an
//! ACTIVE update, left alone otherwise, never cleared.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Config as PgConfig, ManagerConfig, Pool, RecyclingMethod, Runtime};
use serde::{Deserialize, Serialize};
use tokio_postgres::{NoTls, Row};

use super::{
    CollectionName, InsertReport, InstanceStore, StatusUpdate, StoreError, UpdateOutcome,
};
use crate::models::{InstanceId, InstanceRecord, InstanceStatus, NewInstance};

/// PostgreSQL store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostgresStoreConfig {
    /// PostgreSQL connection URL
    pub database_url: String,

    /// Connection pool size
    pub pool_size: usize,

    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,

    /// Schema and table holding the records
    pub collection: CollectionName,
}

impl Default for PostgresStoreConfig {
    fn default() -> Self {
        Self {
            database_url: "postgresql://localhost/instances".to_string(),
            pool_size: 10,
            connect_timeout_secs: 10,
            collection: CollectionName::default(),
        }
    }
}

impl PostgresStoreConfig {
    /// Set database URL
    pub fn with_database_url(mut self, url: &str) -> Self {
        self.database_url = url.to_string();
        self
    }

    /// Set pool size
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// [`InstanceStore`] backed by a PostgreSQL connection pool
pub struct PostgresStore {
    pool: Pool,
    collection: CollectionName,
    table: String,
}

impl PostgresStore {
    /// Create the pool and verify a connection can be made
    pub async fn connect(config: PostgresStoreConfig) -> Result<Self, StoreError> {
        config.collection.validate().map_err(StoreError::Connect)?;

        let mut pg_config = PgConfig::new();
        pg_config.url = Some(config.database_url.clone());
        pg_config.connect_timeout = Some(config.connect_timeout());
        pg_config.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        pg_config.pool = Some(deadpool_postgres::PoolConfig::new(config.pool_size));

        let pool = pg_config
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StoreError::Connect(format!("failed to create pool: {e}")))?;

        let client = pool
            .get()
            .await
            .map_err(|e| StoreError::Connect(e.to_string()))?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| StoreError::Connect(e.to_string()))?;

        tracing::info!(collection = %config.collection, "Connected to PostgreSQL state store");

        let table = quoted_table(&config.collection);
        Ok(Self {
            pool,
            collection: config.collection,
            table,
        })
    }

    async fn client(
        &self,
        operation: &'static str,
    ) -> Result<deadpool_postgres::Object, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::query(operation, e))
    }

    fn select_columns(&self) -> String {
        format!(
            "SELECT id, host, port, name, region, status, last_updated, last_active FROM {}",
            self.table
        )
    }
}

fn quoted_table(collection: &CollectionName) -> String {
    format!("\"{}\".\"{}\"", collection.namespace, collection.collection)
}

fn row_to_record(row: &Row) -> Result<InstanceRecord, StoreError> {
    let id: String = row.get("id");

    let port: i32 = row.get("port");
    let port = u16::try_from(port).map_err(|_| StoreError::InvalidRecord {
        id: id.clone(),
        reason: format!("port {port} out of range"),
    })?;

    let status = row
        .get::<_, Option<String>>("status")
        .map(|s| s.parse::<InstanceStatus>())
        .transpose()
        .map_err(|e| StoreError::InvalidRecord {
            id: id.clone(),
            reason: e.to_string(),
        })?;

    Ok(InstanceRecord {
        id: InstanceId::new(id),
        host: row.get("host"),
        port,
        name: row.get("name"),
        region: row.get("region"),
        status,
        last_updated: row.get::<_, Option<DateTime<Utc>>>("last_updated"),
        last_active: row.get::<_, Option<DateTime<Utc>>>("last_active"),
    })
}

#[async_trait]
impl InstanceStore for PostgresStore {
    async fn collection_exists(&self) -> Result<bool, StoreError> {
        let client = self.client("collection_exists").await?;

        let row = client
            .query_one(
                r#"
                SELECT EXISTS(
                    SELECT 1 FROM information_schema.tables
                    WHERE table_schema = $1 AND table_name = $2
                )
                "#,
                &[&self.collection.namespace, &self.collection.collection],
            )
            .await
            .map_err(|e| StoreError::query("collection_exists", e))?;

        Ok(row.get(0))
    }

    async fn ensure_collection(&self) -> Result<(), StoreError> {
        let client = self.client("ensure_collection").await?;

        client
            .batch_execute(&format!(
                r#"
                CREATE SCHEMA IF NOT EXISTS "{namespace}";

                CREATE TABLE IF NOT EXISTS {table} (
                    id TEXT PRIMARY KEY DEFAULT gen_random_uuid()::text,
                    host TEXT NOT NULL UNIQUE,
                    port INTEGER NOT NULL CHECK (port > 0 AND port < 65536),
                    name TEXT NOT NULL,
                    region TEXT NOT NULL,
                    status TEXT CHECK (status IN ('ACTIVE', 'INACTIVE', 'ERRORED')),
                    last_updated TIMESTAMPTZ,
                    last_active TIMESTAMPTZ
                );
                "#,
                namespace = self.collection.namespace,
                table = self.table,
            ))
            .await
            .map_err(|e| StoreError::query("ensure_collection", e))?;

        tracing::info!(collection = %self.collection, "Instance collection ready");
        Ok(())
    }

    async fn insert_missing(
        &self,
        instances: Vec<NewInstance>,
    ) -> Result<InsertReport, StoreError> {
        if instances.is_empty() {
            return Ok(InsertReport::default());
        }

        let mut client = self.client("insert_missing").await?;
        let tx = client
            .transaction()
            .await
            .map_err(|e| StoreError::query("insert_missing", e))?;

        let statement = tx
            .prepare(&format!(
                "INSERT INTO {} (host, port, name, region) VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (host) DO NOTHING",
                self.table
            ))
            .await
            .map_err(|e| StoreError::query("insert_missing", e))?;

        let mut report = InsertReport::default();
        for instance in &instances {
            let port = i32::from(instance.port);
            let written = tx
                .execute(
                    &statement,
                    &[&instance.host, &port, &instance.name, &instance.region],
                )
                .await
                .map_err(|e| StoreError::query("insert_missing", e))?;

            if written == 0 {
                tracing::debug!(host = %instance.host, "Instance already exists, skipping");
                report.skipped += 1;
            } else {
                report.inserted += 1;
            }
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::query("insert_missing", e))?;

        Ok(report)
    }

    async fn find_all(&self) -> Result<Vec<InstanceRecord>, StoreError> {
        let client = self.client("find_all").await?;

        let rows = client
            .query(&format!("{} ORDER BY region, name", self.select_columns()), &[])
            .await
            .map_err(|e| StoreError::query("find_all", e))?;

        rows.iter().map(row_to_record).collect()
    }

    async fn find_by_id(&self, id: &InstanceId) -> Result<Option<InstanceRecord>, StoreError> {
        let client = self.client("find_by_id").await?;

        let row = client
            .query_opt(
                &format!("{} WHERE id = $1", self.select_columns()),
                &[&id.as_str()],
            )
            .await
            .map_err(|e| StoreError::query("find_by_id", e))?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn update_status(
        &self,
        id: &InstanceId,
        update: &StatusUpdate,
    ) -> Result<UpdateOutcome, StoreError> {
        let client = self.client("update_status").await?;

        let matched = client
            .execute(
                &format!(
                    "UPDATE {} SET status = $2, last_updated = $3, \
                     last_active = COALESCE($4, last_active) WHERE id = $1",
                    self.table
                ),
                &[
                    &id.as_str(),
                    &update.status.as_str(),
                    &update.last_updated,
                    &update.last_active,
                ],
            )
            .await
            .map_err(|e| StoreError::query("update_status", e))?;

        if matched == 0 {
            Ok(UpdateOutcome::NotFound)
        } else {
            Ok(UpdateOutcome::Updated)
        }
    }
}
