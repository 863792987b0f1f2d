#![deny(missing_docs)]

//! Workflows over a dataset working directory.
//!
//! A [`Pack`] ties together the [`Manifest`](datapack_types::Manifest) and
//! [`Datafile`](datapack_types::Datafile) at the root of a dataset and a
//! [`DatasetIndex`](datapack_index::DatasetIndex) to publish it to. A dataset
//! moves through these states:
//!
//! 1. `make` fills in the Datafile and hashes every file into the manifest.
//! 2. `upload` puts every blob, including the manifest itself, in the store.
//! 3. `publish` registers the manifest hash as a new ref of the dataset.
//!
//! Each step refuses to run when the previous one has not completed and
//! tells the user which command to run instead.

mod error;
mod filler;
mod installed;
mod pack;

pub use error::PackError;
pub use filler::{DatafileFiller, RequireComplete};
pub use installed::{installed_datafile, installed_datasets};
pub use pack::{Pack, PublishOutcome};
