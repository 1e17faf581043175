pub mod disk;
pub mod memory;

use anyhow::{Context, Result};
use async_trait::async_trait;
use disk::DiskCollection;
use fjall::{Keyspace, PartitionCreateOptions};
use memory::MemoryCollection;
use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, RwLock},
};

/// A named bag of key-value pairs. Keys and values are raw bytes; callers
/// bring their own serialization.
#[async_trait]
pub trait KeyValueCollection: Send + Sync {
    async fn get(&self, key: &[u8]) -> Option<Vec<u8>>;
    async fn put(&self, key: &[u8], value: &[u8]);
    async fn remove(&self, key: &[u8]);
    async fn entries(&self) -> Vec<(Vec<u8>, Vec<u8>)>;
}

/// A thread-safe key-value store that can hold multiple collections.
/// Collections are fjall partitions when the store was opened on disk,
/// plain maps otherwise.
pub struct KeyValueStore {
    collections: RwLock<HashMap<String, Arc<dyn KeyValueCollection>>>,
    keyspace: Option<Arc<Keyspace>>,
}

impl KeyValueStore {
    pub fn open(path: &Path) -> Result<Self> {
        let keyspace = fjall::Config::new(path)
            .open()
            .with_context(|| format!("Failed to open key-value store at {}", path.display()))?;
        Ok(Self {
            collections: RwLock::new(HashMap::new()),
            keyspace: Some(Arc::new(keyspace)),
        })
    }

    /// A store that never touches disk; used by tests and `--ephemeral`
    /// runs.
    pub fn in_memory() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            keyspace: None,
        }
    }

    pub fn collection(&self, name: &str) -> Result<Arc<dyn KeyValueCollection>> {
        {
            let collections = self.collections.read().unwrap();
            if let Some(existing) = collections.get(name) {
                return Ok(Arc::clone(existing));
            }
        }

        let created: Arc<dyn KeyValueCollection> = match &self.keyspace {
            Some(keyspace) => {
                let partition = keyspace
                    .open_partition(name, PartitionCreateOptions::default())
                    .with_context(|| format!("Failed to open partition '{name}'"))?;
                Arc::new(DiskCollection::new(partition))
            }
            None => Arc::new(MemoryCollection::new()),
        };

        let mut collections = self.collections.write().unwrap();
        Ok(Arc::clone(
            collections
                .entry(name.to_string())
                .or_insert(created),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_collections_are_shared_by_name() {
        let store = KeyValueStore::in_memory();
        let a = store.collection("holdings").unwrap();
        let b = store.collection("holdings").unwrap();

        a.put(b"BTC", b"0.5").await;
        assert_eq!(b.get(b"BTC").await, Some(b"0.5".to_vec()));
    }

    #[tokio::test]
    async fn test_disk_store_round_trip() {
        let dir = tempdir().unwrap();
        {
            let store = KeyValueStore::open(dir.path()).unwrap();
            let holdings = store.collection("holdings").unwrap();
            holdings.put(b"BTC", b"0.5").await;
        }

        // Reopen and read back.
        let store = KeyValueStore::open(dir.path()).unwrap();
        let holdings = store.collection("holdings").unwrap();
        assert_eq!(holdings.get(b"BTC").await, Some(b"0.5".to_vec()));
    }
}
