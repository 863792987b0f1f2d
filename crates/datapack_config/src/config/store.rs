use std::{fmt::Display, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{ConfigSection, MergeError, ValidationError};
use crate::edit::{parse_bool, parse_url, ConfigEditError};

/// The kind of blob store to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreKind {
    /// An HTTP endpoint serving `<url>/blob/<hash>`.
    Http,
    /// An S3 (compatible) bucket.
    S3,
    /// A directory on the local file system.
    Filesystem,
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(StoreKind::Http),
            "s3" => Ok(StoreKind::S3),
            "filesystem" => Ok(StoreKind::Filesystem),
            _ => Err(format!(
                "unknown store kind '{s}', expected one of: http, s3, filesystem"
            )),
        }
    }
}

impl Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            StoreKind::Http => "http",
            StoreKind::S3 => "s3",
            StoreKind::Filesystem => "filesystem",
        })
    }
}

/// Configuration of the blob store. When `kind` is not set the blobs are
/// served over HTTP by the index itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StoreConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<StoreKind>,

    /// Base URL of an HTTP store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<Url>,

    /// Root directory of a file system store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    /// The S3 bucket name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,

    /// The S3 region.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// The S3 endpoint, for S3 compatible services.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<Url>,

    /// Force path style URLs instead of subdomain style.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_path_style: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<String>,
}

impl ConfigSection for StoreConfig {
    fn section_name(&self) -> &'static str {
        "store"
    }

    fn merge_config(self, other: &Self) -> Result<Self, MergeError> {
        Ok(Self {
            kind: other.kind.or(self.kind),
            url: other.url.clone().or(self.url),
            root: other.root.clone().or(self.root),
            bucket: other.bucket.clone().or(self.bucket),
            region: other.region.clone().or(self.region),
            endpoint_url: other.endpoint_url.clone().or(self.endpoint_url),
            force_path_style: other.force_path_style.or(self.force_path_style),
            access_key_id: other.access_key_id.clone().or(self.access_key_id),
            secret_access_key: other.secret_access_key.clone().or(self.secret_access_key),
        })
    }

    fn validate(&self) -> Result<(), ValidationError> {
        match self.kind {
            Some(StoreKind::S3) if self.bucket.is_none() => Err(
                ValidationError::MissingRequiredField("store.bucket".to_string()),
            ),
            Some(StoreKind::Filesystem) if self.root.is_none() => Err(
                ValidationError::MissingRequiredField("store.root".to_string()),
            ),
            _ if self.access_key_id.is_some() != self.secret_access_key.is_some() => {
                Err(ValidationError::InvalidValue(
                    "store.access-key-id".to_string(),
                    "access-key-id and secret-access-key must be set together".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }

    fn keys(&self) -> Vec<String> {
        [
            "kind",
            "url",
            "root",
            "bucket",
            "region",
            "endpoint-url",
            "force-path-style",
            "access-key-id",
            "secret-access-key",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }

    fn get(&self, key: &str) -> Option<String> {
        match key {
            "kind" => self.kind.map(|kind| kind.to_string()),
            "url" => self.url.as_ref().map(Url::to_string),
            "root" => self.root.as_ref().map(|root| root.display().to_string()),
            "bucket" => self.bucket.clone(),
            "region" => self.region.clone(),
            "endpoint-url" => self.endpoint_url.as_ref().map(Url::to_string),
            "force-path-style" => self.force_path_style.map(|v| v.to_string()),
            "access-key-id" => self.access_key_id.clone(),
            "secret-access-key" => self
                .secret_access_key
                .as_ref()
                .map(|_| "********".to_string()),
            _ => None,
        }
    }

    fn set(&mut self, key: &str, value: Option<String>) -> Result<(), ConfigEditError> {
        match key {
            "kind" => {
                self.kind = value
                    .map(|v| {
                        v.parse().map_err(|e: String| ConfigEditError::InvalidValue {
                            key: "store.kind".to_string(),
                            source: e.into(),
                        })
                    })
                    .transpose()?;
            }
            "url" => self.url = value.map(|v| parse_url("store.url", &v)).transpose()?,
            "root" => self.root = value.map(PathBuf::from),
            "bucket" => self.bucket = value,
            "region" => self.region = value,
            "endpoint-url" => {
                self.endpoint_url = value
                    .map(|v| parse_url("store.endpoint-url", &v))
                    .transpose()?;
            }
            "force-path-style" => {
                self.force_path_style = value
                    .map(|v| parse_bool("store.force-path-style", &v))
                    .transpose()?;
            }
            "access-key-id" => self.access_key_id = value,
            "secret-access-key" => self.secret_access_key = value,
            _ => {
                return Err(ConfigEditError::UnknownKeyInner {
                    key: key.to_string(),
                })
            }
        }
        Ok(())
    }
}
