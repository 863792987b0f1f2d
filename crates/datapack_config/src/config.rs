use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::config::{
    concurrency::ConcurrencyConfig, index::IndexConfig, manifest::ManifestConfig,
    store::StoreConfig,
};
use crate::edit::ConfigEditError;

pub mod concurrency;
pub mod index;
pub mod manifest;
pub mod store;

/// The directory below the home directory that holds the user configuration.
const CONFIG_DIR: &str = ".datapack";

/// The name of the configuration file.
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Missing required field.
    #[error("Missing required field: {0}")]
    MissingRequiredField(String),

    /// Invalid value for a field.
    #[error("Invalid value for field {0}: {1}")]
    InvalidValue(String, String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    /// Error merging configurations.
    #[error("Error merging configurations: {0}")]
    Error(String),
}

#[derive(Error, Debug)]
pub enum LoadError {
    /// Error merging configuration.
    #[error("Error merging configuration files: {0} ({1})")]
    MergeError(MergeError, PathBuf),

    /// IO error while reading configuration file.
    #[error("IO error while reading configuration file: {0}")]
    IoError(#[from] std::io::Error),

    /// Error parsing configuration file.
    #[error("Error parsing configuration file: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Error validating configuration.
    #[error("Error validating configuration: {0}")]
    ValidationError(#[from] ValidationError),
}

/// A configuration value that an operation requires is not set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The key has no value.
    #[error("configuration key '{0}' is not set (use `config {0} <value>` to set it)")]
    MissingKey(&'static str),
}

/// One section of the configuration file.
pub trait ConfigSection:
    Serialize + DeserializeOwned + std::fmt::Debug + Clone + PartialEq + Default
{
    /// The name of the section, which prefixes its keys.
    fn section_name(&self) -> &'static str;

    /// Merge another configuration (file) into this one.
    /// Note: the "other" configuration takes priority over the current one.
    fn merge_config(self, other: &Self) -> Result<Self, MergeError>;

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ValidationError>;

    fn is_default(&self) -> bool {
        self == &Self::default()
    }

    /// The valid keys of the section, without the section prefix.
    fn keys(&self) -> Vec<String>;

    /// The current value of a key as a string.
    fn get(&self, key: &str) -> Option<String>;

    /// Set (or with `None`, unset) a key.
    fn set(&mut self, key: &str, value: Option<String>) -> Result<(), ConfigEditError>;
}

/// The configuration of datapack.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Where the dataset index lives and how to authenticate with it.
    #[serde(default, skip_serializing_if = "IndexConfig::is_default")]
    pub index: IndexConfig,

    /// The blob store that file contents are transferred to and from.
    #[serde(default, skip_serializing_if = "StoreConfig::is_default")]
    pub store: StoreConfig,

    /// Limits on parallel transfers.
    #[serde(default, skip_serializing_if = "ConcurrencyConfig::is_default")]
    pub concurrency: ConcurrencyConfig,

    /// Options for manifest generation.
    #[serde(default, skip_serializing_if = "ManifestConfig::is_default")]
    pub manifest: ManifestConfig,

    /// The files this configuration was loaded from.
    #[serde(skip)]
    pub loaded_from: Vec<PathBuf>,
}

/// Returns the default location of the user configuration file,
/// `~/.datapack/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR).join(CONFIG_FILE_NAME))
}

impl Config {
    /// Loads and merges the given configuration files. Later files take
    /// priority over earlier ones.
    pub fn load_from_files<I, P>(paths: I) -> Result<Self, LoadError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut config = Config::default();

        for path in paths {
            let content = fs_err::read_to_string(path.as_ref())?;
            let mut other: Config = toml::from_str(&content)?;
            other.loaded_from = vec![path.as_ref().to_path_buf()];
            config = config
                .merge_config(&other)
                .map_err(|e| LoadError::MergeError(e, path.as_ref().to_path_buf()))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Loads the user configuration file if it exists, otherwise returns the
    /// default configuration.
    pub fn load_global() -> Result<Self, LoadError> {
        match default_config_path() {
            Some(path) if path.is_file() => Self::load_from_files([path]),
            _ => {
                tracing::debug!("no configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Merge another configuration into this one.
    pub fn merge_config(self, other: &Self) -> Result<Self, MergeError> {
        Ok(Self {
            index: self.index.merge_config(&other.index)?,
            store: self.store.merge_config(&other.store)?,
            concurrency: self.concurrency.merge_config(&other.concurrency)?,
            manifest: self.manifest.merge_config(&other.manifest)?,
            loaded_from: self
                .loaded_from
                .iter()
                .chain(other.loaded_from.iter())
                .cloned()
                .collect(),
        })
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.index.validate()?;
        self.store.validate()?;
        self.concurrency.validate()?;
        self.manifest.validate()
    }

    /// Writes the configuration to `path`, creating parent directories as
    /// needed.
    pub fn save(&self, path: &Path) -> Result<(), ConfigEditError> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs_err::create_dir_all(parent)?;
        }
        fs_err::write(path, contents)?;
        Ok(())
    }

    /// The base URL of the dataset index.
    pub fn index_url(&self) -> Result<&Url, ConfigError> {
        self.index
            .url
            .as_ref()
            .ok_or(ConfigError::MissingKey("index.url"))
    }

    /// The user to authenticate as.
    pub fn auth_user(&self) -> Result<&str, ConfigError> {
        self.index
            .user
            .as_deref()
            .ok_or(ConfigError::MissingKey("index.user"))
    }

    /// The token to authenticate with.
    pub fn auth_token(&self) -> Result<&str, ConfigError> {
        self.index
            .token
            .as_deref()
            .ok_or(ConfigError::MissingKey("index.token"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::store::StoreKind;
    use assert_matches::assert_matches;

    #[test]
    fn test_load_and_merge() {
        let dir = tempfile::tempdir().unwrap();
        let global = dir.path().join("global.toml");
        let local = dir.path().join("local.toml");
        fs_err::write(
            &global,
            r#"
[index]
url = "https://datadex.example.com/"
user = "jbenet"
token = "secret"

[concurrency]
transfers = 4
"#,
        )
        .unwrap();
        fs_err::write(
            &local,
            r#"
[store]
kind = "s3"
bucket = "datasets"
region = "eu-west-1"

[index]
token = "other"
"#,
        )
        .unwrap();

        let config = Config::load_from_files([&global, &local]).unwrap();
        assert_eq!(
            config.index_url().unwrap().as_str(),
            "https://datadex.example.com/"
        );
        assert_eq!(config.auth_user().unwrap(), "jbenet");
        assert_eq!(config.auth_token().unwrap(), "other");
        assert_eq!(config.concurrency.transfers, 4);
        assert_eq!(config.store.kind, Some(StoreKind::S3));
        assert_eq!(config.store.bucket.as_deref(), Some("datasets"));
        assert_eq!(config.loaded_from, vec![global, local]);
    }

    #[test]
    fn test_missing_keys_are_typed() {
        let config = Config::default();
        assert_matches!(config.index_url(), Err(ConfigError::MissingKey("index.url")));
        assert_matches!(config.auth_token(), Err(ConfigError::MissingKey("index.token")));
        insta::assert_snapshot!(
            config.auth_user().unwrap_err().to_string(),
            @"configuration key 'index.user' is not set (use `config index.user <value>` to set it)"
        );
    }

    #[test]
    fn test_validation_fails_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs_err::write(&path, "[store]\nkind = \"s3\"\n").unwrap();
        assert_matches!(
            Config::load_from_files([&path]),
            Err(LoadError::ValidationError(ValidationError::MissingRequiredField(field))) if field == "store.bucket"
        );
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.set("index.url", Some("https://example.com/".to_owned())).unwrap();
        config.set("manifest.datasets-dir", Some("deps".to_owned())).unwrap();
        config.save(&path).unwrap();

        let mut loaded = Config::load_from_files([&path]).unwrap();
        loaded.loaded_from.clear();
        assert_eq!(loaded, config);
    }
}
