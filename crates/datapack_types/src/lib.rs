#![deny(missing_docs)]
//! `datapack_types` contains the data models of a dataset package: the
//! [`Handle`] that names a dataset, the [`Manifest`] that lists its files by
//! content address, the [`Datafile`] that describes it and the
//! [`DatasetRefs`] that record its published snapshots and versions.
//!
//! Apart from reading and writing these models to disk (and hashing the files
//! a manifest lists) the crate performs no I/O.

mod datafile;
mod handle;
pub mod manifest;
mod refs;

pub use datafile::{installed_datafile_path, Datafile, DatafileError, DATAFILE_NAME};
pub use handle::{Handle, InvalidHandleError, InvalidHandleKind};
pub use manifest::{
    CheckReport, GenerateOptions, Manifest, ManifestEntry, ManifestError, MANIFEST_FILE_NAME,
};
pub use refs::{DatasetRefs, LATEST};

pub use datapack_digest::ContentHash;

/// The directory, relative to a working directory, that installed datasets
/// are stored in.
pub const DATASETS_DIR: &str = "datasets";
