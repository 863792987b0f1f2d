//! Blobs stored in an S3 compatible bucket.
use async_trait::async_trait;
use bytes::Bytes;
use datapack_config::StoreConfig;
use datapack_networking::{Authentication, AuthenticationStorage};
use opendal::{ErrorKind, Operator};
use url::Url;

use super::relative_key;
use crate::{BlobStore, BlobStoreError};

/// Environment variable holding the S3 access key id.
pub const ACCESS_KEY_ENV: &str = "S3_ACCESS_KEY";

/// Environment variable holding the S3 secret access key.
pub const SECRET_KEY_ENV: &str = "S3_SECRET_KEY";

const AWS_DOMAIN: &str = "s3.amazonaws.com";

/// Credentials to sign S3 requests with.
#[derive(Clone, PartialEq, Eq)]
pub struct S3Credentials {
    /// The access key id
    pub access_key_id: String,
    /// The secret access key
    pub secret_access_key: String,
    /// An optional session token for temporary credentials
    pub session_token: Option<String>,
}

impl std::fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key_id", &self.access_key_id)
            .finish_non_exhaustive()
    }
}

impl S3Credentials {
    /// Reads the credentials from `S3_ACCESS_KEY` and `S3_SECRET_KEY`.
    pub fn from_env() -> Option<Self> {
        let access_key_id = std::env::var(ACCESS_KEY_ENV).ok()?;
        let secret_access_key = std::env::var(SECRET_KEY_ENV).ok()?;
        Some(Self {
            access_key_id,
            secret_access_key,
            session_token: None,
        })
    }

    /// Finds credentials for the configured bucket. The keys in the
    /// configuration win, then credentials stored for the bucket name, then
    /// the environment.
    pub fn resolve(config: &StoreConfig, storage: &AuthenticationStorage) -> Option<Self> {
        if let (Some(access_key_id), Some(secret_access_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            return Some(Self {
                access_key_id: access_key_id.clone(),
                secret_access_key: secret_access_key.clone(),
                session_token: None,
            });
        }

        if let Some(bucket) = &config.bucket {
            match storage.get(bucket) {
                Ok(Some(Authentication::S3Credentials {
                    access_key_id,
                    secret_access_key,
                    session_token,
                })) => {
                    return Some(Self {
                        access_key_id,
                        secret_access_key,
                        session_token,
                    })
                }
                Ok(Some(other)) => {
                    tracing::warn!("ignoring non-S3 credentials {other:?} stored for bucket {bucket}");
                }
                Ok(None) => {}
                Err(err) => tracing::warn!("failed to look up credentials for bucket {bucket}: {err}"),
            }
        }

        Self::from_env()
    }
}

/// A blob store in an S3 (compatible) bucket.
#[derive(Debug, Clone)]
pub struct S3BlobStore {
    operator: Operator,
    public_url: Url,
}

/// The URL objects of `bucket` are publicly reachable under.
fn public_url(bucket: &str, endpoint: Option<&Url>, path_style: bool) -> Result<Url, BlobStoreError> {
    let invalid = || BlobStoreError::InvalidUrl(format!("bucket {bucket}"));
    match endpoint {
        Some(endpoint) if path_style => {
            let mut url = endpoint.clone();
            url.set_path(&format!("{}/", url.path().trim_end_matches('/')));
            url.join(&format!("{bucket}/")).map_err(|_| invalid())
        }
        Some(endpoint) => {
            let host = endpoint.host_str().ok_or_else(invalid)?;
            let mut url = endpoint.clone();
            url.set_host(Some(&format!("{bucket}.{host}")))
                .map_err(|_| invalid())?;
            url.set_path("/");
            Ok(url)
        }
        None => Url::parse(&format!("https://{bucket}.{AWS_DOMAIN}/")).map_err(|_| invalid()),
    }
}

impl S3BlobStore {
    /// Wraps an already configured operator. `public_url` is the URL the
    /// root of the operator is reachable under.
    pub fn from_operator(operator: Operator, public_url: Url) -> Self {
        Self {
            operator,
            public_url,
        }
    }

    /// Creates a store from the `store` section of the configuration.
    #[cfg(feature = "s3")]
    pub fn from_store_config(
        config: &StoreConfig,
        storage: &AuthenticationStorage,
    ) -> Result<Self, BlobStoreError> {
        use opendal::{layers::RetryLayer, services::S3Config, Configurator};

        let bucket = config
            .bucket
            .clone()
            .ok_or_else(|| BlobStoreError::InvalidUrl("the S3 store (store.bucket is not set)".to_string()))?;
        let path_style = config.force_path_style.unwrap_or(false);

        let mut s3_config = S3Config::default();
        s3_config.root = Some("/".to_string());
        s3_config.bucket = bucket.clone();
        s3_config.region = Some(
            config
                .region
                .clone()
                .unwrap_or_else(|| "us-east-1".to_string()),
        );
        s3_config.endpoint = config.endpoint_url.as_ref().map(Url::to_string);
        s3_config.enable_virtual_host_style = !path_style;

        match S3Credentials::resolve(config, storage) {
            Some(credentials) => {
                s3_config.access_key_id = Some(credentials.access_key_id);
                s3_config.secret_access_key = Some(credentials.secret_access_key);
                s3_config.session_token = credentials.session_token;
            }
            None => tracing::debug!("no S3 credentials found, requests to {bucket} are unsigned"),
        }

        let public_url = public_url(&bucket, config.endpoint_url.as_ref(), path_style)?;
        let operator = Operator::new(s3_config.into_builder())?
            .layer(RetryLayer::new())
            .finish();
        Ok(Self::from_operator(operator, public_url))
    }
}

fn map_err(key: &str, err: opendal::Error) -> BlobStoreError {
    match err.kind() {
        ErrorKind::NotFound => BlobStoreError::NotFound(key.to_string()),
        ErrorKind::PermissionDenied => BlobStoreError::Unauthorized(key.to_string()),
        _ => BlobStoreError::Backend(err),
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn has(&self, key: &str) -> Result<bool, BlobStoreError> {
        self.operator
            .exists(relative_key(key))
            .await
            .map_err(|err| map_err(key, err))
    }

    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), BlobStoreError> {
        self.operator
            .write(relative_key(key), bytes)
            .await
            .map_err(|err| map_err(key, err))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, BlobStoreError> {
        let buffer = self
            .operator
            .read(relative_key(key))
            .await
            .map_err(|err| map_err(key, err))?;
        Ok(buffer.to_bytes())
    }

    fn url(&self, key: &str) -> Result<Url, BlobStoreError> {
        self.public_url
            .join(relative_key(key))
            .map_err(|_| BlobStoreError::InvalidUrl(key.to_string()))
    }
}
