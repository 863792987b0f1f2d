#![deny(missing_docs)]

//! The remote side of datapack: the ref index that records which snapshots
//! of a dataset were published and under which version, and the
//! [`DataIndex`] context that bundles the index URL, an authenticated HTTP
//! client and the blob store.
//!
//! Refs are append-only from the point of view of a client. A client reads
//! the [`DatasetRefs`] of a dataset once and reuses them until it asks for a
//! refresh explicitly.

use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use datapack_blobstore::BlobOrchestrator;
use datapack_digest::ContentHash;
use datapack_networking::HttpError;
use datapack_types::DatasetRefs;
use thiserror::Error;
use url::Url;

mod context;
mod http;
mod memory;

pub use context::{is_archive_url, DataIndex, DataIndexError, ARCHIVE_SUFFIX, DOWNLOADS_DIR};
pub use http::HttpRefIndex;
pub use memory::{MemoryIndex, MemoryRefIndex};

/// An error returned by a [`RefIndex`].
#[derive(Debug, Error)]
pub enum RefIndexError {
    /// The dataset path cannot be addressed below the index.
    #[error("invalid dataset path '{0}'")]
    InvalidDataset(String),

    /// The dataset, ref or version does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// The index rejected the credentials (or there were none).
    #[error(transparent)]
    Unauthorized(HttpError),

    /// The index could not be reached or failed to answer.
    #[error(transparent)]
    Transport(HttpError),

    /// The index answered with something that is not a list of refs.
    #[error("failed to parse the refs served at {url}")]
    Parse {
        /// The URL of the refs
        url: Url,
        /// The underlying error
        #[source]
        source: serde_yaml::Error,
    },
}

impl From<HttpError> for RefIndexError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::NotFound { url, .. } => RefIndexError::NotFound(url.to_string()),
            err @ HttpError::Unauthorized { .. } => RefIndexError::Unauthorized(err),
            err => RefIndexError::Transport(err),
        }
    }
}

impl RefIndexError {
    /// Returns true if the requested object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RefIndexError::NotFound(_))
    }

    /// Returns true if no connection to the index could be made.
    pub fn is_connect(&self) -> bool {
        matches!(self, RefIndexError::Transport(err) if err.is_connect())
    }
}

/// The publication timeline and version table of one dataset.
#[async_trait]
pub trait RefIndex: Send + Sync + Debug {
    /// The `author/name` path of the dataset.
    fn dataset(&self) -> &str;

    /// Returns the refs of the dataset. They are fetched once and cached,
    /// pass `refresh` to fetch them again.
    async fn fetch_refs(&self, refresh: bool) -> Result<DatasetRefs, RefIndexError>;

    /// Publishes `reference`. The index stamps the time of publication.
    async fn put(&self, reference: &ContentHash) -> Result<(), RefIndexError>;

    /// Resolves a version name (or `latest`, or a ref hash) to a ref.
    async fn version_ref(&self, version: &str) -> Result<ContentHash, RefIndexError> {
        self.fetch_refs(false)
            .await?
            .resolve_ref(version)
            .ok_or_else(|| {
                RefIndexError::NotFound(format!("version '{version}' of {}", self.dataset()))
            })
    }

    /// Returns the version name of a ref, or the ref itself if it has no
    /// name.
    async fn ref_version(&self, reference: &str) -> Result<String, RefIndexError> {
        self.fetch_refs(false)
            .await?
            .resolve_version(reference)
            .ok_or_else(|| RefIndexError::NotFound(format!("ref '{reference}' of {}", self.dataset())))
    }

    /// The time `reference` was published, if it was.
    async fn ref_timestamp(
        &self,
        reference: &ContentHash,
    ) -> Result<Option<DateTime<Utc>>, RefIndexError> {
        Ok(self.fetch_refs(false).await?.ref_timestamp(reference))
    }

    /// All published refs from oldest to newest.
    async fn sorted_published(&self) -> Result<Vec<(ContentHash, DateTime<Utc>)>, RefIndexError> {
        Ok(self.fetch_refs(false).await?.sorted_published())
    }

    /// The time of the most recent publication.
    async fn last_updated(&self) -> Result<Option<DateTime<Utc>>, RefIndexError> {
        Ok(self.fetch_refs(false).await?.last_updated())
    }
}

/// Everything a dataset workflow needs from a remote index: the blobs and
/// the refs of each dataset.
pub trait DatasetIndex: Send + Sync + Debug {
    /// The base URL of the index, used in messages.
    fn url(&self) -> &Url;

    /// The blob transfers against the store of the index.
    fn blobs(&self) -> &BlobOrchestrator;

    /// The ref index of the dataset at `author/name`.
    fn ref_index(&self, dataset: &str) -> Result<Box<dyn RefIndex>, RefIndexError>;
}
