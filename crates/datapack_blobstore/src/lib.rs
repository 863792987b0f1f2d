#![deny(missing_docs)]

//! Content addressed blob storage.
//!
//! A [`BlobStore`] is a flat key/value store that holds the contents of
//! files keyed by `/blob/<hash>` (see [`blob_key`]). This crate ships a store
//! on the local file system, one that talks plain HTTP, one on top of S3 and
//! an in-memory one.
//!
//! The [`BlobOrchestrator`] drives a store: it never transfers a blob the
//! store already has, prefers verified local copies over downloads and
//! checks the hash of every byte it moves.

use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;
use datapack_digest::ContentHash;
use datapack_networking::HttpError;
use thiserror::Error;
use url::Url;

mod orchestrator;
pub mod store;

pub use orchestrator::{BatchReport, BlobError, BlobOrchestrator, GetOutcome, PutOutcome};
pub use store::{
    fs::LocalFilesystemStore,
    http::HttpBlobStore,
    memory::MemoryBlobStore,
    s3::{S3BlobStore, S3Credentials},
};

/// Returns the key a blob with the given hash is stored under.
pub fn blob_key(hash: &ContentHash) -> String {
    format!("/blob/{hash}")
}

/// An error returned by a [`BlobStore`].
#[derive(Debug, Error)]
pub enum BlobStoreError {
    /// The store does not hold the key.
    #[error("{0} does not exist in the blob store")]
    NotFound(String),

    /// The store rejected the credentials (or there were none).
    #[error("access to {0} was denied, check the store credentials")]
    Unauthorized(String),

    /// The store could not be reached or failed to answer.
    #[error(transparent)]
    Transport(HttpError),

    /// No URL can be formed for the key.
    #[error("cannot form a URL for {0}")]
    InvalidUrl(String),

    /// A local file system operation failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The storage backend reported an error.
    #[error("blob store backend error")]
    Backend(#[from] opendal::Error),
}

impl BlobStoreError {
    /// Classifies a failed HTTP request for `key`.
    pub fn from_http(key: &str, err: HttpError) -> Self {
        match err {
            HttpError::NotFound { .. } => BlobStoreError::NotFound(key.to_string()),
            HttpError::Unauthorized { url, .. } => BlobStoreError::Unauthorized(url.to_string()),
            err => BlobStoreError::Transport(err),
        }
    }

    /// Returns true if the key does not exist in the store.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BlobStoreError::NotFound(_))
    }
}

/// A flat, content addressed key/value store.
///
/// Keys are produced by [`blob_key`]. Implementations must treat a `put` of
/// a key that already exists as a success: the content behind a key never
/// changes.
#[async_trait]
pub trait BlobStore: Send + Sync + Debug {
    /// Returns true if the store holds `key`.
    async fn has(&self, key: &str) -> Result<bool, BlobStoreError>;

    /// Stores `bytes` under `key`.
    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), BlobStoreError>;

    /// Returns the bytes stored under `key`.
    async fn get(&self, key: &str) -> Result<Bytes, BlobStoreError>;

    /// Returns the URL under which `key` can be retrieved.
    fn url(&self, key: &str) -> Result<Url, BlobStoreError>;
}
