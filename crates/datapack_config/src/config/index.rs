use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{ConfigSection, MergeError, ValidationError};
use crate::edit::{parse_url, ConfigEditError};

/// Location of and credentials for the dataset index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct IndexConfig {
    /// Base URL of the index, refs live below `<url>/<author>/<name>/refs`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<Url>,

    /// The user name to authenticate as.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// The token that authenticates `user`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl ConfigSection for IndexConfig {
    fn section_name(&self) -> &'static str {
        "index"
    }

    fn merge_config(self, other: &Self) -> Result<Self, MergeError> {
        Ok(Self {
            url: other.url.clone().or(self.url),
            user: other.user.clone().or(self.user),
            token: other.token.clone().or(self.token),
        })
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.user.is_some() && self.token.is_none() {
            return Err(ValidationError::MissingRequiredField(
                "index.token".to_string(),
            ));
        }
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        vec!["url".to_string(), "user".to_string(), "token".to_string()]
    }

    fn get(&self, key: &str) -> Option<String> {
        match key {
            "url" => self.url.as_ref().map(Url::to_string),
            "user" => self.user.clone(),
            // Never echo the secret itself.
            "token" => self.token.as_ref().map(|_| "********".to_string()),
            _ => None,
        }
    }

    fn set(&mut self, key: &str, value: Option<String>) -> Result<(), ConfigEditError> {
        match key {
            "url" => self.url = value.map(|v| parse_url("index.url", &v)).transpose()?,
            "user" => self.user = value,
            "token" => self.token = value,
            _ => {
                return Err(ConfigEditError::UnknownKeyInner {
                    key: key.to_string(),
                })
            }
        }
        Ok(())
    }
}
