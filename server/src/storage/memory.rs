use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::storage::{ObjectStore, StoreError};

/// In-memory object store for tests and local experimentation. Supports
/// injecting read/write/presign failures so degraded-storage paths can be
/// exercised without a network.
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
    fail_presign: Arc<AtomicBool>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_presign(&self, fail: bool) {
        self.fail_presign.store(fail, Ordering::SeqCst);
    }

    pub async fn insert(&self, key: &str, bytes: Vec<u8>) {
        self.objects.write().await.insert(key.to_string(), bytes);
    }

    pub async fn insert_json<T: Serialize>(&self, key: &str, value: &T) {
        let bytes = serde_json::to_vec(value).expect("serializable test fixture");
        self.insert(key, bytes).await;
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.objects.read().await.contains_key(key)
    }

    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Http(503));
        }
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Http(503));
        }
        self.objects.write().await.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Http(503));
        }
        Ok(self
            .objects
            .read()
            .await
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn presign_get(&self, key: &str, _ttl: Duration) -> Result<String, StoreError> {
        if self.fail_presign.load(Ordering::SeqCst) {
            return Err(StoreError::InvalidResponse(
                "presigning disabled for this store".to_string(),
            ));
        }
        Ok(format!("memory://{}", key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_reports_missing_keys() {
        let store = MemoryObjectStore::new();
        let err = store.get("puzzles/none.json").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn list_filters_by_prefix() {
        let store = MemoryObjectStore::new();
        store.insert("puzzles/a.json", vec![1]).await;
        store.insert("puzzles/b.json", vec![2]).await;
        store.insert("solutions_by_id/a.json", vec![3]).await;

        let keys = store.list("puzzles/").await.expect("list");
        assert_eq!(keys, vec!["puzzles/a.json", "puzzles/b.json"]);
    }

    #[tokio::test]
    async fn injected_failures_surface_as_errors() {
        let store = MemoryObjectStore::new();
        store.insert("puzzles/a.json", vec![1]).await;

        store.set_fail_reads(true);
        assert!(store.get("puzzles/a.json").await.is_err());
        assert!(store.list("puzzles/").await.is_err());

        store.set_fail_reads(false);
        assert!(store.get("puzzles/a.json").await.is_ok());

        store.set_fail_writes(true);
        assert!(store
            .put("puzzles/c.json", vec![9], "application/json")
            .await
            .is_err());
    }
}
