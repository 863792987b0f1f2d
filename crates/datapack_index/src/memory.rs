use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use datapack_blobstore::{BlobOrchestrator, MemoryBlobStore};
use datapack_digest::ContentHash;
use datapack_types::DatasetRefs;
use parking_lot::Mutex;
use url::Url;

use crate::{DatasetIndex, RefIndex, RefIndexError};

/// The refs of one dataset kept in memory. Clones share the same refs.
#[derive(Debug, Clone, Default)]
pub struct MemoryRefIndex {
    dataset: String,
    refs: Arc<Mutex<DatasetRefs>>,
    puts: Arc<Mutex<usize>>,
}

impl MemoryRefIndex {
    /// Creates an empty ref index for `dataset`.
    pub fn new(dataset: impl Into<String>) -> Self {
        Self::from_refs(dataset, DatasetRefs::default())
    }

    /// Creates a ref index for `dataset` holding `refs`.
    pub fn from_refs(dataset: impl Into<String>, refs: DatasetRefs) -> Self {
        Self {
            dataset: dataset.into(),
            refs: Arc::new(Mutex::new(refs)),
            puts: Arc::default(),
        }
    }

    /// Points `version` at `reference`, the way an index does when it reads
    /// the version from a published Datafile.
    pub fn tag(&self, version: impl Into<String>, reference: ContentHash) {
        self.refs.lock().versions.insert(version.into(), reference);
    }

    /// A snapshot of the current refs.
    pub fn refs(&self) -> DatasetRefs {
        self.refs.lock().clone()
    }

    /// The number of times a ref was put.
    pub fn put_count(&self) -> usize {
        *self.puts.lock()
    }
}

#[async_trait]
impl RefIndex for MemoryRefIndex {
    fn dataset(&self) -> &str {
        &self.dataset
    }

    async fn fetch_refs(&self, _refresh: bool) -> Result<DatasetRefs, RefIndexError> {
        Ok(self.refs())
    }

    async fn put(&self, reference: &ContentHash) -> Result<(), RefIndexError> {
        *self.puts.lock() += 1;
        if !self.refs.lock().publish(*reference, Utc::now()) {
            tracing::debug!("{reference} was already published to {}", self.dataset);
        }
        Ok(())
    }
}

/// An index that lives entirely in memory: a [`MemoryBlobStore`] and one
/// [`MemoryRefIndex`] per dataset.
#[derive(Debug, Clone)]
pub struct MemoryIndex {
    url: Url,
    blobs: BlobOrchestrator,
    store: Arc<MemoryBlobStore>,
    datasets: Arc<Mutex<HashMap<String, MemoryRefIndex>>>,
}

impl MemoryIndex {
    /// Creates an empty index that reports itself as `url`.
    pub fn new(url: Url) -> Self {
        let store = Arc::new(MemoryBlobStore::new());
        Self {
            url,
            blobs: BlobOrchestrator::new(store.clone()),
            store,
            datasets: Arc::default(),
        }
    }

    /// The blob store of the index.
    pub fn store(&self) -> &Arc<MemoryBlobStore> {
        &self.store
    }

    /// The ref index of `dataset`, created on first use.
    pub fn refs_of(&self, dataset: &str) -> MemoryRefIndex {
        self.datasets
            .lock()
            .entry(dataset.to_string())
            .or_insert_with(|| MemoryRefIndex::new(dataset))
            .clone()
    }
}

impl DatasetIndex for MemoryIndex {
    fn url(&self) -> &Url {
        &self.url
    }

    fn blobs(&self) -> &BlobOrchestrator {
        &self.blobs
    }

    fn ref_index(&self, dataset: &str) -> Result<Box<dyn RefIndex>, RefIndexError> {
        Ok(Box::new(self.refs_of(dataset)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use datapack_digest::compute_bytes_digest;

    #[tokio::test]
    async fn test_put_then_resolve_latest() {
        let index = MemoryIndex::new(Url::parse("memory:///").unwrap());
        let refs = index.refs_of("jbenet/foo");
        let h1 = compute_bytes_digest("snapshot 1");

        assert_matches!(
            refs.version_ref("").await,
            Err(RefIndexError::NotFound(what)) if what == "version '' of jbenet/foo"
        );

        index.ref_index("jbenet/foo").unwrap().put(&h1).await.unwrap();
        assert_eq!(refs.version_ref("").await.unwrap(), h1);
        assert_eq!(refs.version_ref("latest").await.unwrap(), h1);
        assert!(refs.ref_timestamp(&h1).await.unwrap().is_some());
        assert_eq!(refs.put_count(), 1);

        // Unnamed refs stand in for their own version.
        assert_eq!(refs.ref_version(&h1.to_string()).await.unwrap(), h1.to_string());
        refs.tag("1.0", h1);
        assert_eq!(refs.ref_version(&h1.to_string()).await.unwrap(), "1.0");
        assert_eq!(refs.version_ref("1.0").await.unwrap(), h1);
    }

    #[tokio::test]
    async fn test_republishing_keeps_timestamp() {
        let refs = MemoryRefIndex::new("jbenet/foo");
        let h1 = compute_bytes_digest("snapshot 1");
        refs.put(&h1).await.unwrap();
        let first = refs.ref_timestamp(&h1).await.unwrap();
        refs.put(&h1).await.unwrap();
        assert_eq!(refs.ref_timestamp(&h1).await.unwrap(), first);
        assert_eq!(refs.sorted_published().await.unwrap().len(), 1);
        assert_eq!(refs.last_updated().await.unwrap(), first);
    }
}
