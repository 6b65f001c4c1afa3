//! In-memory instance store
//!
//! Mirrors the Postgres store's semantics (host uniqueness, store-assigned
//! ids, field-level updates) for tests and single-process runs.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{InsertReport, InstanceStore, StatusUpdate, StoreError, UpdateOutcome};
use crate::models::{InstanceId, InstanceRecord, NewInstance};

/// Instance store held in process memory
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<RwLock<BTreeMap<InstanceId, InstanceRecord>>>,
    collection_created: Arc<AtomicBool>,
    update_count: Arc<AtomicU64>,
    failed_updates: Arc<AtomicU64>,
    fail_scans: Arc<AtomicBool>,
    fail_updates: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with records that already carry ids
    pub async fn with_records(records: impl IntoIterator<Item = InstanceRecord>) -> Self {
        let store = Self::new();
        {
            let mut map = store.records.write().await;
            for record in records {
                map.insert(record.id.clone(), record);
            }
        }
        store.collection_created.store(true, Ordering::SeqCst);
        store
    }

    /// Number of updates that matched a record
    pub fn update_count(&self) -> u64 {
        self.update_count.load(Ordering::SeqCst)
    }

    /// Make subsequent `find_all` calls fail, to exercise aborted sweeps
    pub fn set_fail_scans(&self, fail: bool) {
        self.fail_scans.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `update_status` calls fail without touching any record
    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    /// Number of updates rejected while failures were injected
    pub fn failed_update_count(&self) -> u64 {
        self.failed_updates.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl InstanceStore for MemoryStore {
    async fn collection_exists(&self) -> Result<bool, StoreError> {
        Ok(self.collection_created.load(Ordering::SeqCst))
    }

    async fn ensure_collection(&self) -> Result<(), StoreError> {
        self.collection_created.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn insert_missing(
        &self,
        instances: Vec<NewInstance>,
    ) -> Result<InsertReport, StoreError> {
        let mut records = self.records.write().await;
        let mut hosts: HashSet<String> = records.values().map(|r| r.host.clone()).collect();
        let mut report = InsertReport::default();

        for new in instances {
            if !hosts.insert(new.host.clone()) {
                report.skipped += 1;
                continue;
            }

            let id = InstanceId::new(uuid::Uuid::new_v4().to_string());
            records.insert(id.clone(), InstanceRecord::from_new(id, new));
            report.inserted += 1;
        }

        Ok(report)
    }

    async fn find_all(&self) -> Result<Vec<InstanceRecord>, StoreError> {
        if self.fail_scans.load(Ordering::SeqCst) {
            return Err(StoreError::query("find_all", "scan failure injected"));
        }
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn find_by_id(&self, id: &InstanceId) -> Result<Option<InstanceRecord>, StoreError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn update_status(
        &self,
        id: &InstanceId,
        update: &StatusUpdate,
    ) -> Result<UpdateOutcome, StoreError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            self.failed_updates.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::query("update_status", "update failure injected"));
        }

        let mut records = self.records.write().await;

        match records.get_mut(id) {
            Some(record) => {
                update.apply_to(record);
                self.update_count.fetch_add(1, Ordering::SeqCst);
                Ok(UpdateOutcome::Updated)
            }
            None => Ok(UpdateOutcome::NotFound),
        }
    }
}
