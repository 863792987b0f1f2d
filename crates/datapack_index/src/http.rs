use async_trait::async_trait;
use datapack_digest::ContentHash;
use datapack_networking::{check_response, HttpError};
use datapack_types::DatasetRefs;
use parking_lot::Mutex;
use reqwest_middleware::ClientWithMiddleware;
use url::Url;

use crate::{RefIndex, RefIndexError};

/// The refs of a dataset served by an index over HTTP.
///
/// `GET <index>/<author>/<name>/refs` returns the refs as YAML and
/// `POST <index>/<author>/<name>/refs/<hash>` publishes a new ref.
#[derive(Debug)]
pub struct HttpRefIndex {
    client: ClientWithMiddleware,
    dataset: String,
    refs_url: Url,
    cache: Mutex<Option<DatasetRefs>>,
}

impl HttpRefIndex {
    /// Creates the ref index of `dataset` (`author/name`) below `index_url`.
    ///
    /// Fails with [`RefIndexError::InvalidDataset`] if the dataset does not
    /// name a location below the index.
    pub fn new(
        client: ClientWithMiddleware,
        index_url: &Url,
        dataset: &str,
    ) -> Result<Self, RefIndexError> {
        let mut base = index_url.clone();
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        let refs_url = base
            .join(&format!("{}/refs/", dataset.trim_matches('/')))
            .ok()
            .filter(|url| url.as_str().starts_with(base.as_str()))
            .ok_or_else(|| RefIndexError::InvalidDataset(dataset.to_string()))?;
        Ok(Self {
            client,
            dataset: dataset.to_string(),
            refs_url,
            cache: Mutex::new(None),
        })
    }

    /// The URL the refs are served at.
    pub fn refs_url(&self) -> Url {
        let mut url = self.refs_url.clone();
        url.set_path(self.refs_url.path().trim_end_matches('/'));
        url
    }
}

#[async_trait]
impl RefIndex for HttpRefIndex {
    fn dataset(&self) -> &str {
        &self.dataset
    }

    async fn fetch_refs(&self, refresh: bool) -> Result<DatasetRefs, RefIndexError> {
        if !refresh {
            if let Some(refs) = self.cache.lock().as_ref() {
                tracing::debug!("using cached refs of {}", self.dataset);
                return Ok(refs.clone());
            }
        }

        let url = self.refs_url();
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|err| HttpError::transport(url.clone(), err))
            .and_then(check_response)?;
        let body = response
            .text()
            .await
            .map_err(|err| HttpError::transport(url.clone(), err.into()))?;
        let refs = DatasetRefs::from_yaml_str(&body)
            .map_err(|source| RefIndexError::Parse { url, source })?;

        // Only a complete fetch replaces the cache.
        *self.cache.lock() = Some(refs.clone());
        Ok(refs)
    }

    async fn put(&self, reference: &ContentHash) -> Result<(), RefIndexError> {
        let url = self
            .refs_url
            .join(&reference.to_string())
            .map_err(|_| RefIndexError::NotFound(format!("ref '{reference}'")))?;
        self.client
            .post(url.clone())
            .send()
            .await
            .map_err(|err| HttpError::transport(url, err))
            .and_then(check_response)?;
        tracing::info!("published {} to {}", reference, self.dataset);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let client = reqwest_middleware::ClientBuilder::new(reqwest::Client::new()).build();
        let index = HttpRefIndex::new(
            client,
            &Url::parse("http://datadex.io").unwrap(),
            "jbenet/foo",
        )
        .unwrap();
        assert_eq!(index.refs_url().as_str(), "http://datadex.io/jbenet/foo/refs");
        assert_eq!(
            index
                .refs_url
                .join("aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d")
                .unwrap()
                .as_str(),
            "http://datadex.io/jbenet/foo/refs/aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d"
        );
    }
}
