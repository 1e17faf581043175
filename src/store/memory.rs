use crate::store::KeyValueCollection;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// In-memory collection with the same contract as the disk one.
pub struct MemoryCollection {
    inner: Arc<Mutex<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }
}

impl Default for MemoryCollection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueCollection for MemoryCollection {
    async fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let map = self.inner.lock().await;
        let value = map.get(key).cloned();
        if value.is_some() {
            debug!("Store HIT for key: {:?}", String::from_utf8_lossy(key));
        } else {
            debug!("Store MISS for key: {:?}", String::from_utf8_lossy(key));
        }
        value
    }

    async fn put(&self, key: &[u8], value: &[u8]) {
        let mut map = self.inner.lock().await;
        map.insert(key.to_vec(), value.to_vec());
    }

    async fn remove(&self, key: &[u8]) {
        let mut map = self.inner.lock().await;
        map.remove(key);
    }

    async fn entries(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        let map = self.inner.lock().await;
        map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}
