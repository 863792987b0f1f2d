use itertools::Itertools;
use thiserror::Error;
use url::Url;

use crate::config::{Config, ConfigSection};

#[derive(Error, Debug)]
pub enum ConfigEditError {
    #[error("Unknown configuration key: {key}\nSupported keys:\n\t{supported_keys}")]
    UnknownKey { key: String, supported_keys: String },

    #[error("Unknown key: {key}")]
    UnknownKeyInner { key: String },

    #[error("Invalid value for '{key}': {source}")]
    InvalidValue {
        key: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Failed to parse URL for '{key}': {source}")]
    UrlParseError {
        key: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Failed to parse boolean for '{key}': {source}")]
    BoolParseError {
        key: String,
        #[source]
        source: std::str::ParseBoolError,
    },

    #[error("Failed to parse number for '{key}': {source}")]
    NumberParseError {
        key: String,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
}

pub(crate) fn parse_url(key: &str, value: &str) -> Result<Url, ConfigEditError> {
    Url::parse(value).map_err(|source| ConfigEditError::UrlParseError {
        key: key.to_string(),
        source,
    })
}

pub(crate) fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigEditError> {
    value.parse().map_err(|source| ConfigEditError::BoolParseError {
        key: key.to_string(),
        source,
    })
}

pub(crate) fn parse_number(key: &str, value: &str) -> Result<usize, ConfigEditError> {
    value
        .parse()
        .map_err(|source| ConfigEditError::NumberParseError {
            key: key.to_string(),
            source,
        })
}

impl Config {
    /// Every supported `section.key`.
    pub fn keys(&self) -> Vec<String> {
        fn prefixed<S: ConfigSection>(section: &S) -> impl Iterator<Item = String> + '_ {
            section
                .keys()
                .into_iter()
                .map(move |key| format!("{}.{key}", section.section_name()))
        }

        prefixed(&self.index)
            .chain(prefixed(&self.store))
            .chain(prefixed(&self.concurrency))
            .chain(prefixed(&self.manifest))
            .collect()
    }

    /// Returns the value of a dotted `section.key` as a string. Secrets are
    /// masked.
    pub fn get(&self, key: &str) -> Result<Option<String>, ConfigEditError> {
        let (section, inner) = self.split_key(key)?;
        Ok(match section {
            "index" => self.index.get(inner),
            "store" => self.store.get(inner),
            "concurrency" => self.concurrency.get(inner),
            _ => self.manifest.get(inner),
        })
    }

    /// Modify this config with the given key and value. `None` unsets the
    /// key (or restores its default).
    ///
    /// It is required to call `save()` to persist the changes on disk.
    pub fn set(&mut self, key: &str, value: Option<String>) -> Result<(), ConfigEditError> {
        let (section, inner) = self.split_key(key)?;
        let result = match section {
            "index" => self.index.set(inner, value),
            "store" => self.store.set(inner, value),
            "concurrency" => self.concurrency.set(inner, value),
            _ => self.manifest.set(inner, value),
        };
        result.map_err(|e| match e {
            ConfigEditError::UnknownKeyInner { .. } => self.unknown_key(key),
            e => e,
        })
    }

    fn split_key<'k>(&self, key: &'k str) -> Result<(&'k str, &'k str), ConfigEditError> {
        if !self.keys().iter().any(|k| k == key) {
            return Err(self.unknown_key(key));
        }
        key.split_once('.').ok_or_else(|| self.unknown_key(key))
    }

    fn unknown_key(&self, key: &str) -> ConfigEditError {
        ConfigEditError::UnknownKey {
            key: key.to_string(),
            supported_keys: self.keys().iter().join(",\n\t"),
        }
    }
}
