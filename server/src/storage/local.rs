use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs;

use crate::storage::{ObjectStore, StoreError};

/// Filesystem-backed store used as the dead-letter destination for rating
/// writes when the remote bucket is unreachable. Keys map directly onto
/// paths under `root`, so `rating_logs/2026-08-24-09.json` lands at
/// `<root>/rating_logs/2026-08-24-09.json`.
#[derive(Clone, Debug)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        match fs::read(self.object_path(key)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(key.to_string()))
            }
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<(), StoreError> {
        let path = self.object_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, bytes).await?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        // Keys in this store are always `<dir>/<file>`, so listing a prefix
        // means listing the directory it names.
        let dir = self.object_path(prefix.trim_end_matches('/'));
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Io(e)),
        };

        let normalized_prefix = if prefix.ends_with('/') || prefix.is_empty() {
            prefix.to_string()
        } else {
            format!("{}/", prefix)
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                keys.push(format!(
                    "{}{}",
                    normalized_prefix,
                    entry.file_name().to_string_lossy()
                ));
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn presign_get(&self, key: &str, _ttl: Duration) -> Result<String, StoreError> {
        Ok(format!("file://{}", self.object_path(key).display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn scratch_store() -> LocalObjectStore {
        let root = std::env::temp_dir().join(format!("quadword-local-store-{}", Uuid::new_v4()));
        LocalObjectStore::new(root)
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = scratch_store();
        store
            .put("ratings/abc.json", b"{\"total\":1}".to_vec(), "application/json")
            .await
            .expect("put");

        let bytes = store.get("ratings/abc.json").await.expect("get");
        assert_eq!(bytes, b"{\"total\":1}");

        std::fs::remove_dir_all(store.root()).ok();
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let store = scratch_store();
        let err = store.get("ratings/nope.json").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn list_returns_keys_under_prefix() {
        let store = scratch_store();
        store
            .put("rating_logs/2026-08-24-09.json", b"[]".to_vec(), "application/json")
            .await
            .expect("put");
        store
            .put("rating_logs/2026-08-24-10.json", b"[]".to_vec(), "application/json")
            .await
            .expect("put");

        let keys = store.list("rating_logs/").await.expect("list");
        assert_eq!(
            keys,
            vec![
                "rating_logs/2026-08-24-09.json",
                "rating_logs/2026-08-24-10.json"
            ]
        );

        let empty = store.list("ratings/").await.expect("list empty");
        assert!(empty.is_empty());

        std::fs::remove_dir_all(store.root()).ok();
    }
}
