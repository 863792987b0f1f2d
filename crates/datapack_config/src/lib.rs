//! Typed configuration for datapack.
//!
//! The configuration is read from one or more TOML files that are merged in
//! order. Operations read it through typed fields and accessors such as
//! [`Config::index_url`], which return a [`ConfigError::MissingKey`] naming
//! the key when a required value is absent. [`Config::get`] and
//! [`Config::set`] offer a dotted `section.key` view on top for command line
//! editing.

pub mod config;
pub mod edit;

pub use config::{
    concurrency::ConcurrencyConfig,
    default_config_path,
    index::IndexConfig,
    manifest::ManifestConfig,
    store::{StoreConfig, StoreKind},
    Config, ConfigError, ConfigSection, LoadError, MergeError, ValidationError,
};
pub use edit::ConfigEditError;
