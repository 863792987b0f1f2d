//! An in-memory blob store.
use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use url::Url;

use crate::{BlobStore, BlobStoreError};

/// A blob store that keeps everything in memory. Useful for offline work and
/// for tests.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Bytes>>,
}

impl MemoryBlobStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.blobs.lock().is_empty()
    }

    /// The stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.blobs.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn has(&self, key: &str) -> Result<bool, BlobStoreError> {
        Ok(self.blobs.lock().contains_key(key))
    }

    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), BlobStoreError> {
        self.blobs.lock().entry(key.to_string()).or_insert(bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, BlobStoreError> {
        self.blobs
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| BlobStoreError::NotFound(key.to_string()))
    }

    fn url(&self, key: &str) -> Result<Url, BlobStoreError> {
        Url::parse(&format!("memory://{key}"))
            .map_err(|_| BlobStoreError::InvalidUrl(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_existing_content_is_kept() {
        let store = MemoryBlobStore::new();
        store.put("/blob/a", Bytes::from_static(b"first")).await.unwrap();
        store.put("/blob/a", Bytes::from_static(b"second")).await.unwrap();
        assert_eq!(store.get("/blob/a").await.unwrap(), "first");
        assert_eq!(store.len(), 1);
        assert_matches!(
            store.get("/blob/b").await,
            Err(BlobStoreError::NotFound(key)) if key == "/blob/b"
        );
    }
}
