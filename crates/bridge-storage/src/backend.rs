//! Record persistence
//!
//! [`BridgeStorage`] is a narrow key/value interface. Backends do no
//! locking of their own beyond what a single call needs; the server
//! serializes read-compare-write sequences.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

#[cfg(test)]
use mockall::automock;

use bridge_common::{Error, ImportKey};

use crate::wire::StoredRecord;

/// Key/value persistence for catalog records
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BridgeStorage: Send + Sync {
    /// Read one record
    async fn get(&self, key: &ImportKey) -> Result<Option<StoredRecord>, Error>;

    /// Write one record, replacing any existing one
    async fn put(&self, key: &ImportKey, record: StoredRecord) -> Result<(), Error>;

    /// Delete one record; returns whether it existed
    async fn remove(&self, key: &ImportKey) -> Result<bool, Error>;

    /// Every stored key, sorted
    async fn list_keys(&self) -> Result<Vec<ImportKey>, Error>;
}

/// Process-local storage
#[derive(Debug, Default)]
pub struct MemoryStorage {
    records: RwLock<BTreeMap<ImportKey, StoredRecord>>,
}

impl MemoryStorage {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BridgeStorage for MemoryStorage {
    async fn get(&self, key: &ImportKey) -> Result<Option<StoredRecord>, Error> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn put(&self, key: &ImportKey, record: StoredRecord) -> Result<(), Error> {
        self.records.write().await.insert(key.clone(), record);
        Ok(())
    }

    async fn remove(&self, key: &ImportKey) -> Result<bool, Error> {
        Ok(self.records.write().await.remove(key).is_some())
    }

    async fn list_keys(&self) -> Result<Vec<ImportKey>, Error> {
        Ok(self.records.read().await.keys().cloned().collect())
    }
}
