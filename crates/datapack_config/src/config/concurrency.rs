use serde::{Deserialize, Serialize};

use crate::config::{ConfigSection, MergeError, ValidationError};
use crate::edit::{parse_number, ConfigEditError};

/// The default maximum number of blob transfers that run at the same time.
fn default_max_concurrent_transfers() -> usize {
    8
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct ConcurrencyConfig {
    /// The maximum number of blobs that are uploaded or downloaded at once.
    // Needing to set this default next to the default of the full struct to avoid serde defaulting
    // to 0 if the partial struct was omitted.
    #[serde(default = "default_max_concurrent_transfers")]
    pub transfers: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            transfers: default_max_concurrent_transfers(),
        }
    }
}

impl ConfigSection for ConcurrencyConfig {
    fn section_name(&self) -> &'static str {
        "concurrency"
    }

    fn merge_config(self, other: &Self) -> Result<Self, MergeError> {
        Ok(Self {
            transfers: if other.transfers == default_max_concurrent_transfers() {
                self.transfers
            } else {
                other.transfers
            },
        })
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.transfers == 0 {
            return Err(ValidationError::InvalidValue(
                "concurrency.transfers".to_string(),
                "The number of concurrent transfers must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        vec!["transfers".to_string()]
    }

    fn get(&self, key: &str) -> Option<String> {
        (key == "transfers").then(|| self.transfers.to_string())
    }

    fn set(&mut self, key: &str, value: Option<String>) -> Result<(), ConfigEditError> {
        match key {
            "transfers" => {
                self.transfers = value
                    .map(|v| parse_number("concurrency.transfers", &v))
                    .transpose()?
                    .unwrap_or_else(default_max_concurrent_transfers);
                Ok(())
            }
            _ => Err(ConfigEditError::UnknownKeyInner {
                key: key.to_string(),
            }),
        }
    }
}
