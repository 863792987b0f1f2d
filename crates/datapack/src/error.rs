use std::path::PathBuf;

use datapack_blobstore::BlobError;
use datapack_digest::ContentHash;
use datapack_index::RefIndexError;
use datapack_types::{DatafileError, ManifestError};
use itertools::Itertools;
use thiserror::Error;
use url::Url;

/// An error that occurred while running a dataset workflow.
#[derive(Debug, Error)]
pub enum PackError {
    /// The manifest could not be read, written or hashed.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// The Datafile is invalid or could not be read or written.
    #[error(transparent)]
    Datafile(#[from] DatafileError),

    /// Some manifest entries have not been hashed yet.
    #[error("the manifest is incomplete ({} unhashed file(s)). Run 'pack make' first.", .pending.len())]
    ManifestIncomplete {
        /// The paths without a hash
        pending: Vec<String>,
    },

    /// The store does not have every blob of the dataset yet.
    #[error("{count} object(s) must be uploaded first. Run 'pack upload'.")]
    BlobsNotUploaded {
        /// The number of missing blobs
        count: usize,
    },

    /// The version is already published with different content.
    #[error(
        "version {version} was already published as {existing}, which differs from {attempted}. \
         Bump the version in the Datafile to publish the new content."
    )]
    Conflict {
        /// The version that was published
        version: String,
        /// The ref the version points to
        existing: ContentHash,
        /// The ref that was about to be published
        attempted: ContentHash,
    },

    /// Files no longer match their hash in the manifest.
    #[error("{}/{total} checksums failed:\n  {}", .failed.len(), .failed.iter().join("\n  "))]
    ChecksumsFailed {
        /// The paths whose content changed
        failed: Vec<String>,
        /// The number of checked paths
        total: usize,
    },

    /// The index refused the connection.
    #[error("could not connect to the index at {url}. Is it running, and is 'index.url' set correctly?")]
    IndexUnreachable {
        /// The configured index
        url: Url,
        /// The underlying error
        #[source]
        source: RefIndexError,
    },

    /// The index failed.
    #[error(transparent)]
    RefIndex(#[from] RefIndexError),

    /// A blob transfer failed.
    #[error(transparent)]
    Blob(#[from] BlobError),

    /// A directory could not be listed.
    #[error("failed to read {}", .path.display())]
    Io {
        /// The directory
        path: PathBuf,
        /// The underlying error
        #[source]
        source: std::io::Error,
    },

    /// The dataset was opened without an index.
    #[error("no dataset index is configured. Set 'index.url' first.")]
    NoIndex,

    /// The operation was cancelled before it finished.
    #[error("the operation was cancelled")]
    Cancelled,
}
