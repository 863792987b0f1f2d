//! Blobs read from and written to an index over HTTP.
use async_trait::async_trait;
use bytes::Bytes;
use datapack_networking::{check_response, HttpError};
use reqwest_middleware::ClientWithMiddleware;
use url::Url;

use super::relative_key;
use crate::{BlobStore, BlobStoreError};

/// A blob store served over HTTP. `HEAD`, `PUT` and `GET` requests are sent
/// to `<base>/blob/<hash>`. Authentication is left to the middleware of the
/// client.
#[derive(Debug, Clone)]
pub struct HttpBlobStore {
    client: ClientWithMiddleware,
    base_url: Url,
}

impl HttpBlobStore {
    /// Creates a store below `base_url`.
    pub fn new(client: ClientWithMiddleware, mut base_url: Url) -> Self {
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }
        Self { client, base_url }
    }

    /// The URL all keys are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn has(&self, key: &str) -> Result<bool, BlobStoreError> {
        let url = self.url(key)?;
        let response = self
            .client
            .head(url.clone())
            .send()
            .await
            .map_err(|err| HttpError::transport(url, err))
            .and_then(check_response);
        match response {
            Ok(_) => Ok(true),
            Err(HttpError::NotFound { .. }) => Ok(false),
            Err(err) => Err(BlobStoreError::from_http(key, err)),
        }
    }

    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), BlobStoreError> {
        let url = self.url(key)?;
        self.client
            .put(url.clone())
            .body(bytes)
            .send()
            .await
            .map_err(|err| HttpError::transport(url, err))
            .and_then(check_response)
            .map_err(|err| BlobStoreError::from_http(key, err))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, BlobStoreError> {
        let url = self.url(key)?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|err| HttpError::transport(url.clone(), err))
            .and_then(check_response)
            .map_err(|err| BlobStoreError::from_http(key, err))?;
        response.bytes().await.map_err(|err| {
            BlobStoreError::Transport(HttpError::transport(url, err.into()))
        })
    }

    fn url(&self, key: &str) -> Result<Url, BlobStoreError> {
        self.base_url
            .join(relative_key(key))
            .map_err(|_| BlobStoreError::InvalidUrl(key.to_string()))
    }
}
