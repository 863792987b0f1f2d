use serde::{Deserialize, Serialize};

use crate::config::{ConfigSection, MergeError, ValidationError};
use crate::edit::ConfigEditError;

fn default_datasets_dir() -> String {
    "datasets".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct ManifestConfig {
    /// The top-level directory that holds installed datasets. It is never
    /// included in a manifest.
    #[serde(default = "default_datasets_dir")]
    pub datasets_dir: String,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            datasets_dir: default_datasets_dir(),
        }
    }
}

impl ConfigSection for ManifestConfig {
    fn section_name(&self) -> &'static str {
        "manifest"
    }

    fn merge_config(self, other: &Self) -> Result<Self, MergeError> {
        Ok(Self {
            datasets_dir: if other.datasets_dir == default_datasets_dir() {
                self.datasets_dir
            } else {
                other.datasets_dir.clone()
            },
        })
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.datasets_dir.is_empty() || self.datasets_dir.contains(['/', '\\']) {
            return Err(ValidationError::InvalidValue(
                "manifest.datasets-dir".to_string(),
                "must be a single directory name".to_string(),
            ));
        }
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        vec!["datasets-dir".to_string()]
    }

    fn get(&self, key: &str) -> Option<String> {
        (key == "datasets-dir").then(|| self.datasets_dir.clone())
    }

    fn set(&mut self, key: &str, value: Option<String>) -> Result<(), ConfigEditError> {
        match key {
            "datasets-dir" => {
                self.datasets_dir = value.unwrap_or_else(default_datasets_dir);
                Ok(())
            }
            _ => Err(ConfigEditError::UnknownKeyInner {
                key: key.to_string(),
            }),
        }
    }
}
