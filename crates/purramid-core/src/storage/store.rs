//! Record store contract and the in-memory implementation.

use std::collections::BTreeMap;
use std::sync::Mutex;

use super::record::Record;
use crate::error::StoreError;
use crate::feature::FeatureType;

/// Durable storage for instance records keyed by `(feature, instance_id)`.
///
/// Implementations are shared by every instance of every feature; keys are
/// disjoint so no cross-instance locking is expected from callers.
pub trait StateStore: Send + Sync {
    fn get(&self, feature: FeatureType, instance_id: u32) -> Result<Option<Record>, StoreError>;

    /// Insert or fully replace the record.
    fn upsert(&self, record: &Record) -> Result<(), StoreError>;

    /// Remove the record. Deleting a missing record is not an error.
    fn delete(&self, feature: FeatureType, instance_id: u32) -> Result<(), StoreError>;

    /// Every stored record of `feature`, ordered by instance ID.
    fn list_active(&self, feature: FeatureType) -> Result<Vec<Record>, StoreError>;
}

/// Process-local store, used by tests and hosts that do not need durability.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<(FeatureType, u32), Record>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<(FeatureType, u32), Record>>, StoreError> {
        self.records
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }

    pub fn len(&self) -> usize {
        self.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StateStore for MemoryStore {
    fn get(&self, feature: FeatureType, instance_id: u32) -> Result<Option<Record>, StoreError> {
        Ok(self.lock()?.get(&(feature, instance_id)).cloned())
    }

    fn upsert(&self, record: &Record) -> Result<(), StoreError> {
        self.lock()?
            .insert((record.feature, record.instance_id), record.clone());
        Ok(())
    }

    fn delete(&self, feature: FeatureType, instance_id: u32) -> Result<(), StoreError> {
        self.lock()?.remove(&(feature, instance_id));
        Ok(())
    }

    fn list_active(&self, feature: FeatureType) -> Result<Vec<Record>, StoreError> {
        Ok(self
            .lock()?
            .range((feature, 0)..=(feature, u32::MAX))
            .map(|(_, r)| r.clone())
            .collect())
    }
}
