use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

#[cfg(feature = "s3")]
use datapack_blobstore::S3BlobStore;
use datapack_blobstore::{
    BlobOrchestrator, BlobStore, BlobStoreError, HttpBlobStore, LocalFilesystemStore,
};
use datapack_config::{Config, ConfigError, StoreKind};
use datapack_networking::{
    check_response, retry_policies::default_retry_policy, Authentication,
    AuthenticationMiddleware, AuthenticationStorage, HttpError,
};
use datapack_types::{Handle, DATASETS_DIR};
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::RetryTransientMiddleware;
use thiserror::Error;
use url::Url;

use crate::{DatasetIndex, HttpRefIndex, RefIndex, RefIndexError};

/// The file name suffix of dataset archives.
pub const ARCHIVE_SUFFIX: &str = ".tar.gz";

/// The directory below [`DATASETS_DIR`] that downloaded archives are saved
/// in.
pub const DOWNLOADS_DIR: &str = ".downloads";

/// The ref that archives of unversioned handles are served under.
const DEFAULT_ARCHIVE_REF: &str = "master";

const USER_AGENT: &str = concat!("datapack/", env!("CARGO_PKG_VERSION"));

/// Returns true if `s` is an `http(s)` URL of a dataset archive.
pub fn is_archive_url(s: &str) -> bool {
    (s.starts_with("http://") || s.starts_with("https://")) && s.ends_with(ARCHIVE_SUFFIX)
}

/// An error that occurs while setting up or using a [`DataIndex`].
#[derive(Debug, Error)]
pub enum DataIndexError {
    /// A required configuration value is missing.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The HTTP client could not be built.
    #[error("failed to create the http client")]
    Client(#[from] reqwest::Error),

    /// The configured credentials could not be installed.
    #[error("failed to set up credentials")]
    Credentials(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The blob store could not be created.
    #[error("failed to set up the blob store")]
    BlobStore(#[from] BlobStoreError),

    /// The configured store kind was not compiled in.
    #[error("the '{0}' blob store is not supported by this build")]
    UnsupportedStore(&'static str),

    /// A URL could not be formed.
    #[error("invalid url")]
    InvalidUrl(#[from] url::ParseError),

    /// A download failed.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// A downloaded file could not be written.
    #[error("failed to write {}", .path.display())]
    Io {
        /// The file that was written
        path: PathBuf,
        /// The underlying error
        #[source]
        source: std::io::Error,
    },
}

/// The client side context of a dataset index.
///
/// It is built once from the configuration and passed to everything that
/// talks to the index: it holds the index URL, an HTTP client that
/// authenticates and retries transient failures, and the blob store.
#[derive(Debug, Clone)]
pub struct DataIndex {
    url: Url,
    client: ClientWithMiddleware,
    blobs: BlobOrchestrator,
}

impl DataIndex {
    /// Creates a context from its parts.
    pub fn new(url: Url, client: ClientWithMiddleware, store: Arc<dyn BlobStore>) -> Self {
        Self {
            url,
            client,
            blobs: BlobOrchestrator::new(store),
        }
    }

    /// Sets the number of parallel blob transfers.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.blobs = self.blobs.with_concurrency(concurrency);
        self
    }

    /// Creates a context from the configuration. Credentials from the
    /// configuration take priority over stored ones.
    pub fn from_config(config: &Config) -> Result<Self, DataIndexError> {
        let url = config.index_url()?.clone();

        let mut storage = AuthenticationStorage::from_env_and_defaults()
            .map_err(|err| DataIndexError::Credentials(err.into()))?;
        if let Some(token) = config.index.token.as_deref() {
            let auth = Authentication::from_user_and_token(config.index.user.as_deref(), token);
            storage = storage
                .with_credentials_for(&url, auth)
                .map_err(|err| DataIndexError::Credentials(err.into()))?;
        }

        let client = Self::client(storage.clone())?;
        let store: Arc<dyn BlobStore> = match config.store.kind {
            None | Some(StoreKind::Http) => {
                let base = config.store.url.clone().unwrap_or_else(|| url.clone());
                Arc::new(HttpBlobStore::new(client.clone(), base))
            }
            #[cfg(feature = "s3")]
            Some(StoreKind::S3) => Arc::new(S3BlobStore::from_store_config(&config.store, &storage)?),
            #[cfg(not(feature = "s3"))]
            Some(StoreKind::S3) => return Err(DataIndexError::UnsupportedStore("s3")),
            Some(StoreKind::Filesystem) => {
                let root = config
                    .store
                    .root
                    .clone()
                    .ok_or(ConfigError::MissingKey("store.root"))?;
                Arc::new(LocalFilesystemStore::new(root))
            }
        };
        tracing::debug!("using index {url} with blob store {store:?}");

        Ok(Self::new(url, client, store).with_concurrency(config.concurrency.transfers))
    }

    /// Builds the HTTP client: transient failures are retried and requests
    /// are authenticated from `storage`.
    pub fn client(storage: AuthenticationStorage) -> Result<ClientWithMiddleware, DataIndexError> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(reqwest_middleware::ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(
                default_retry_policy(),
            ))
            .with_arc(Arc::new(AuthenticationMiddleware::new(storage)))
            .build())
    }

    /// The HTTP client of the context.
    pub fn http_client(&self) -> &ClientWithMiddleware {
        &self.client
    }

    /// The HTTP ref index of `dataset` (`author/name`).
    pub fn http_ref_index(&self, dataset: &str) -> Result<HttpRefIndex, RefIndexError> {
        HttpRefIndex::new(self.client.clone(), &self.url, dataset)
    }

    /// The URL of the archive of `handle`:
    /// `<index>/<author>/<name>/archive/<version>.tar.gz`. Handles without a
    /// version refer to `master`.
    pub fn archive_url(&self, handle: &Handle) -> Result<Url, DataIndexError> {
        let reference = handle.version.as_deref().unwrap_or(DEFAULT_ARCHIVE_REF);
        Ok(Url::parse(&format!(
            "{}/{}/archive/{reference}{ARCHIVE_SUFFIX}",
            self.url.as_str().trim_end_matches('/'),
            handle.path()
        ))?)
    }

    /// Downloads the archive at `url` into `<dir>/datasets/.downloads/` and
    /// returns the path of the file. Extracting it is up to the caller.
    pub async fn download_archive(&self, url: &Url, dir: &Path) -> Result<PathBuf, DataIndexError> {
        let file_name = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .unwrap_or("archive.tar.gz")
            .to_string();
        let path = dir.join(DATASETS_DIR).join(DOWNLOADS_DIR).join(file_name);

        tracing::info!("downloading archive at {url}");
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|err| HttpError::transport(url.clone(), err))
            .and_then(check_response)?;
        let bytes = response
            .bytes()
            .await
            .map_err(|err| HttpError::transport(url.clone(), err.into()))?;

        let io_err = |source| DataIndexError::Io {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs_err::tokio::create_dir_all(parent).await.map_err(io_err)?;
        }
        fs_err::tokio::write(&path, &bytes).await.map_err(io_err)?;
        Ok(path)
    }
}

impl DatasetIndex for DataIndex {
    fn url(&self) -> &Url {
        &self.url
    }

    fn blobs(&self) -> &BlobOrchestrator {
        &self.blobs
    }

    fn ref_index(&self, dataset: &str) -> Result<Box<dyn RefIndex>, RefIndexError> {
        Ok(Box::new(self.http_ref_index(dataset)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datapack_blobstore::MemoryBlobStore;
    use rstest::rstest;

    fn index() -> DataIndex {
        DataIndex::new(
            Url::parse("http://datadex.io").unwrap(),
            reqwest_middleware::ClientBuilder::new(reqwest::Client::new()).build(),
            Arc::new(MemoryBlobStore::new()),
        )
    }

    #[rstest]
    #[case("jbenet/foo", "http://datadex.io/jbenet/foo/archive/master.tar.gz")]
    #[case("jbenet/foo@1.0", "http://datadex.io/jbenet/foo/archive/1.0.tar.gz")]
    #[case("jbenet/foo.csv@1.0", "http://datadex.io/jbenet/foo/archive/1.0.tar.gz")]
    fn test_archive_url(#[case] handle: &str, #[case] expected: &str) {
        let handle = Handle::parse(handle).unwrap();
        assert_eq!(index().archive_url(&handle).unwrap().as_str(), expected);
    }

    #[rstest]
    #[case("http://datadex.io/jbenet/foo/archive/master.tar.gz", true)]
    #[case("https://datadex.io/a/b/archive/1.0.tar.gz", true)]
    #[case("datadex.io/a/b/archive/1.0.tar.gz", false)]
    #[case("http://datadex.io/a/b", false)]
    #[case("jbenet/foo@1.0", false)]
    fn test_is_archive_url(#[case] s: &str, #[case] expected: bool) {
        assert_eq!(is_archive_url(s), expected);
    }

    #[rstest]
    #[case("ftp://[/x")]
    #[case("http://elsewhere.org/x")]
    fn test_ref_index_rejects_foreign_paths(#[case] dataset: &str) {
        assert_matches::assert_matches!(
            index().ref_index(dataset),
            Err(RefIndexError::InvalidDataset(path)) if path == dataset
        );
    }

    #[test]
    fn test_from_config_requires_index_url() {
        let err = DataIndex::from_config(&Config::default()).unwrap_err();
        insta::assert_snapshot!(err, @"configuration key 'index.url' is not set (use `config index.url <value>` to set it)");
    }
}
