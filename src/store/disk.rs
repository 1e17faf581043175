use crate::store::KeyValueCollection;
use async_trait::async_trait;
use fjall::PartitionHandle;
use tracing::debug;

/// Collection persisted as one fjall partition.
pub struct DiskCollection {
    partition: PartitionHandle,
}

impl DiskCollection {
    pub fn new(partition: PartitionHandle) -> Self {
        Self { partition }
    }
}

#[async_trait]
impl KeyValueCollection for DiskCollection {
    async fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.partition.get(key) {
            Ok(Some(value)) => {
                debug!("Store HIT for key: {:?}", String::from_utf8_lossy(key));
                Some(value.to_vec())
            }
            Ok(None) => {
                debug!("Store MISS for key: {:?}", String::from_utf8_lossy(key));
                None
            }
            Err(e) => {
                debug!("DiskCollection get error: {}", e);
                None
            }
        }
    }

    async fn put(&self, key: &[u8], value: &[u8]) {
        if let Err(e) = self.partition.insert(key, value) {
            debug!("DiskCollection put error: {}", e);
        }
    }

    async fn remove(&self, key: &[u8]) {
        if let Err(e) = self.partition.remove(key) {
            debug!("DiskCollection remove error: {}", e);
        }
    }

    async fn entries(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.partition
            .iter()
            .filter_map(|kv| kv.ok())
            .map(|(k, v)| (k.to_vec(), v.to_vec()))
            .collect()
    }
}
