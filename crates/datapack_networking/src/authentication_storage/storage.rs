//! Lookup of credentials by host
use std::sync::Arc;

use anyhow::{anyhow, Result};
use url::Url;

use super::{
    authentication::Authentication,
    backends::{configured::ConfiguredCredentials, file::FileStorage},
    StorageBackend,
};

/// Looks up credentials by host. Backends are consulted in order and the
/// first one that knows the host wins.
#[derive(Debug, Clone, Default)]
pub struct AuthenticationStorage {
    /// The backends, in the order they are consulted
    pub backends: Vec<Arc<dyn StorageBackend + Send + Sync>>,
}

impl AuthenticationStorage {
    /// Create a new authentication storage with no backends
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a new authentication storage with the default backends: the
    /// JSON credentials file in the user's home directory.
    pub fn from_env_and_defaults() -> Result<Self> {
        let mut storage = Self::empty();
        match FileStorage::new() {
            Ok(file) => storage.add_backend(Arc::from(file)),
            Err(e) => tracing::warn!("credentials file is not available: {e}"),
        }
        Ok(storage)
    }

    /// Prepends a backend that holds `authentication` for the host of `url`.
    /// Credentials from the configuration file take priority over stored
    /// credentials this way.
    pub fn with_credentials_for(mut self, url: &Url, authentication: Authentication) -> Result<Self> {
        let host = url
            .host_str()
            .ok_or_else(|| anyhow!("{url} has no host to attach credentials to"))?;
        let configured = ConfiguredCredentials::default().with(host, authentication);
        self.backends.insert(0, Arc::new(configured));
        Ok(self)
    }

    /// Add a new storage backend to the authentication storage
    /// (backends are tried in the order they are added)
    pub fn add_backend(&mut self, backend: Arc<dyn StorageBackend + Send + Sync>) {
        self.backends.push(backend);
    }

    /// Retrieve the authentication information for the given host
    pub fn get(&self, host: &str) -> Result<Option<Authentication>> {
        for backend in &self.backends {
            match backend.get(host) {
                Ok(Some(auth)) => return Ok(Some(auth)),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("error retrieving credentials from backend {backend:?}: {e}");
                }
            }
        }
        Ok(None)
    }

    /// Retrieve the authentication information for the given URL
    pub fn get_by_url(&self, url: &Url) -> Result<Option<Authentication>> {
        match url.host_str() {
            Some(host) => self.get(host),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_credentials_take_priority() {
        let mut storage = AuthenticationStorage::empty();
        storage.add_backend(Arc::new(
            ConfiguredCredentials::default()
                .with("datadex.io", Authentication::BearerToken("stored".to_string()))
                .with("other.io", Authentication::BearerToken("other".to_string())),
        ));
        let url = Url::parse("https://datadex.io/jbenet/foo/refs").unwrap();
        let storage = storage
            .with_credentials_for(&url, Authentication::BearerToken("configured".to_string()))
            .unwrap();

        assert_eq!(
            storage.get_by_url(&url).unwrap(),
            Some(Authentication::BearerToken("configured".to_string()))
        );
        assert_eq!(
            storage.get("other.io").unwrap(),
            Some(Authentication::BearerToken("other".to_string()))
        );
        assert_eq!(storage.get("unknown.io").unwrap(), None);
    }

    #[test]
    fn test_url_without_host() {
        let storage = AuthenticationStorage::empty();
        let url = Url::parse("file:///tmp/blobs").unwrap();
        assert_eq!(storage.get_by_url(&url).unwrap(), None);
        assert!(storage
            .with_credentials_for(&url, Authentication::BearerToken("x".to_string()))
            .is_err());
    }
}
