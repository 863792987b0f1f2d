//! Blobs stored as files below a local directory.
use std::{
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use super::relative_key;
use crate::{BlobStore, BlobStoreError};

/// A blob store in a directory on the local file system. The key
/// `/blob/<hash>` is stored at `<root>/blob/<hash>`.
#[derive(Debug, Clone)]
pub struct LocalFilesystemStore {
    root: PathBuf,
}

impl LocalFilesystemStore {
    /// Creates a store rooted at `root`. The directory is created on the
    /// first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for_key(&self, key: &str) -> PathBuf {
        self.root.join(relative_key(key))
    }
}

/// Writes `bytes` to a temporary file next to `path` and moves it into place
/// unless `path` already exists.
fn write_noclobber(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| std::io::Error::other(format!("{} has no parent", path.display())))?;
    fs_err::create_dir_all(parent)?;

    let mut temp_file = tempfile::NamedTempFile::new_in(parent)?;
    temp_file.write_all(bytes)?;
    temp_file.flush()?;

    match temp_file
        .into_temp_path()
        .persist_noclobber(path)
        .map_err(std::io::Error::from)
    {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(()),
        Err(err) => Err(err),
    }
}

#[async_trait]
impl BlobStore for LocalFilesystemStore {
    async fn has(&self, key: &str) -> Result<bool, BlobStoreError> {
        Ok(fs_err::tokio::metadata(self.path_for_key(key))
            .await
            .map(|metadata| metadata.is_file())
            .or_else(|err| match err.kind() {
                ErrorKind::NotFound => Ok(false),
                _ => Err(err),
            })?)
    }

    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), BlobStoreError> {
        let path = self.path_for_key(key);
        match tokio::task::spawn_blocking(move || write_noclobber(&path, &bytes)).await {
            Ok(result) => Ok(result?),
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => Err(std::io::Error::from(ErrorKind::Interrupted).into()),
        }
    }

    async fn get(&self, key: &str) -> Result<Bytes, BlobStoreError> {
        match fs_err::tokio::read(self.path_for_key(key)).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(BlobStoreError::NotFound(key.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn url(&self, key: &str) -> Result<Url, BlobStoreError> {
        let path = self.path_for_key(key);
        let path = std::path::absolute(&path)?;
        Url::from_file_path(&path).map_err(|()| BlobStoreError::InvalidUrl(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_put_get_has() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFilesystemStore::new(dir.path());
        let key = "/blob/aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d";

        assert!(!store.has(key).await.unwrap());
        store.put(key, Bytes::from_static(b"hello")).await.unwrap();
        assert!(store.has(key).await.unwrap());
        assert!(dir
            .path()
            .join("blob/aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d")
            .is_file());
        assert_eq!(store.get(key).await.unwrap(), "hello");

        // A second put of the same key is a success and keeps the content.
        store.put(key, Bytes::from_static(b"other")).await.unwrap();
        assert_eq!(store.get(key).await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFilesystemStore::new(dir.path());
        assert_matches!(
            store.get("/blob/nope").await,
            Err(BlobStoreError::NotFound(key)) if key == "/blob/nope"
        );
    }

    #[test]
    fn test_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFilesystemStore::new(dir.path());
        let url = store.url("/blob/abc").unwrap();
        assert_eq!(url.scheme(), "file");
        assert!(url.path().ends_with("/blob/abc"));
    }
}
