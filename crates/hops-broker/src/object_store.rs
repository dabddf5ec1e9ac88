//! Key/value object storage for serialized automations

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::error::{BrokerError, BrokerResult};

/// Opaque byte storage keyed by string
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fails with `NotFound` for unknown keys
    async fn get(&self, key: &str) -> BrokerResult<Vec<u8>>;
    async fn put(&self, key: &str, data: Vec<u8>) -> BrokerResult<()>;
}

/// Object store bucket held in memory
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: DashMap<String, Vec<u8>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.contains_key(key)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, key: &str) -> BrokerResult<Vec<u8>> {
        self.objects
            .get(key)
            .map(|data| data.value().clone())
            .ok_or_else(|| BrokerError::NotFound {
                key: key.to_string(),
            })
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> BrokerResult<()> {
        debug!(key, size = data.len(), "Storing object");
        self.objects.insert(key.to_string(), data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_and_put() {
        let store = MemoryObjectStore::new();
        assert!(matches!(
            store.get("hopsconf-abc").await,
            Err(BrokerError::NotFound { .. })
        ));

        store.put("hopsconf-abc", b"{}".to_vec()).await.unwrap();
        assert_eq!(store.get("hopsconf-abc").await.unwrap(), b"{}");

        store.put("hopsconf-abc", b"[]".to_vec()).await.unwrap();
        assert_eq!(store.get("hopsconf-abc").await.unwrap(), b"[]");
        assert!(store.contains("hopsconf-abc"));
    }
}
