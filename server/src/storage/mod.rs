use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub mod local;
pub mod memory;
pub mod s3;

pub use local::LocalObjectStore;
pub use memory::MemoryObjectStore;
pub use s3::S3ObjectStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no object store configured")]
    Unconfigured,

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("storage returned HTTP status {0}")]
    Http(u16),

    #[error("storage request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unexpected storage response: {0}")]
    InvalidResponse(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Minimal object-store surface the game needs: whole-object reads and
/// writes, prefix listing, and presigned download URLs for image assets.
///
/// Keys are flat, `/`-separated strings (`puzzles/abc.json`). Implementations
/// must report a missing object as [`StoreError::NotFound`] so callers can
/// distinguish "not there yet" from a transport failure.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StoreError>;

    /// Returns every key under `prefix`. Implementations paginate internally;
    /// an empty bucket is `Ok(vec![])`, not an error.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Builds a time-limited download URL for `key` without touching the
    /// object itself.
    fn presign_get(&self, key: &str, ttl: Duration) -> Result<String, StoreError>;
}
