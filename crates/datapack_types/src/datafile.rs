use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Handle, InvalidHandleError};

/// The name of the metadata file at the root of a dataset.
pub const DATAFILE_NAME: &str = "Datafile";

/// Errors that can occur when reading, writing or validating a [`Datafile`].
#[derive(Debug, Error)]
pub enum DatafileError {
    /// The datafile could not be read or written.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The datafile is not valid YAML or misses the `dataset` field.
    #[error("failed to parse datafile {0}")]
    Parse(PathBuf, #[source] serde_yaml::Error),

    /// The datafile could not be serialized.
    #[error("failed to serialize datafile")]
    Serialize(#[source] serde_yaml::Error),

    /// The `dataset` field is not a handle.
    #[error(transparent)]
    InvalidHandle(#[from] InvalidHandleError),

    /// The `dataset` field parses but does not match the handle grammar.
    #[error("'{0}' is not a valid dataset handle")]
    InvalidDataset(String),

    /// Fields that must be filled in before the dataset can be published.
    #[error("the datafile is missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),
}

/// Descriptive metadata of a dataset, stored as YAML next to its files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datafile {
    /// The handle of the dataset, `author/name[.format][@version]`.
    pub dataset: String,

    /// A short human readable title or tagline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// A longer description of the contents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Where the source of the dataset is maintained.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,

    /// The homepage of the dataset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,

    /// The license the dataset is distributed under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,

    /// Alternative locations the dataset can be fetched from.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mirrors: Vec<String>,

    /// Handles of the datasets this dataset depends on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,

    /// Map from format to the URL of the dataset in that format.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub formats: BTreeMap<String, String>,

    /// The people that contributed to the dataset.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contributors: Vec<String>,

    /// Where the data was originally obtained from.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
}

impl Datafile {
    /// Creates a datafile for the given handle with all other fields empty.
    pub fn new(handle: &Handle) -> Self {
        Self {
            dataset: handle.dataset(),
            ..Self::default()
        }
    }

    /// Reads a datafile from disk.
    pub fn from_path(path: &Path) -> Result<Self, DatafileError> {
        let contents = fs_err::read_to_string(path)?;
        serde_yaml::from_str(&contents).map_err(|e| DatafileError::Parse(path.to_path_buf(), e))
    }

    /// Reads the datafile from disk or returns an empty one if the file does
    /// not exist.
    pub fn from_path_or_default(path: &Path) -> Result<Self, DatafileError> {
        if path.is_file() {
            Self::from_path(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parses a datafile from a YAML string.
    pub fn from_yaml_str(contents: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(contents)
    }

    /// Converts the datafile into its on-disk form.
    pub fn to_yaml_string(&self) -> Result<String, DatafileError> {
        serde_yaml::to_string(self).map_err(DatafileError::Serialize)
    }

    /// Writes the datafile to disk.
    pub fn to_path(&self, path: &Path) -> Result<(), DatafileError> {
        fs_err::write(path, self.to_yaml_string()?)?;
        Ok(())
    }

    /// Parses the `dataset` field.
    pub fn handle(&self) -> Result<Handle, InvalidHandleError> {
        Handle::parse(&self.dataset)
    }

    /// Returns true if the `dataset` field is a valid handle.
    pub fn is_valid(&self) -> bool {
        self.handle().is_ok_and(|handle| handle.is_valid())
    }

    /// The fields that still need a value before this dataset can be
    /// published.
    pub fn missing_fields(&self) -> Vec<String> {
        let mut missing = Vec::new();
        match self.handle() {
            Ok(handle) => {
                if handle.version.is_none() {
                    missing.push("version".to_owned());
                }
            }
            Err(_) => missing.push("dataset".to_owned()),
        }
        if self.title.as_deref().map_or(true, str::is_empty) {
            missing.push("title".to_owned());
        }
        missing
    }

    /// Checks that the datafile describes a publishable dataset: a valid
    /// handle that includes a version, and a title.
    pub fn validate_for_publish(&self) -> Result<Handle, DatafileError> {
        let handle = self.handle()?;
        if !handle.is_valid() {
            return Err(DatafileError::InvalidDataset(self.dataset.clone()));
        }
        let missing = self.missing_fields();
        if !missing.is_empty() {
            return Err(DatafileError::MissingFields(missing));
        }
        Ok(handle)
    }
}

/// The location of the datafile of an installed dataset, relative to the
/// working directory.
pub fn installed_datafile_path(handle: &Handle) -> PathBuf {
    handle.install_dir().join(DATAFILE_NAME)
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_parse_minimal() {
        let datafile = Datafile::from_yaml_str("dataset: jbenet/foo@1.0\n").unwrap();
        assert_eq!(datafile.dataset, "jbenet/foo@1.0");
        assert!(datafile.is_valid());
        assert_eq!(datafile.missing_fields(), vec!["title"]);
    }

    #[test]
    fn test_dataset_is_required() {
        assert!(Datafile::from_yaml_str("title: Foo\n").is_err());
    }

    #[test]
    fn test_full_round_trip() {
        let contents = r#"
dataset: jbenet/mnist.csv@1.0
title: MNIST handwritten digits
description: Images of handwritten digits.
license: CC-BY-SA
dependencies:
  - jbenet/images@2.1
formats:
  csv: http://example.com/mnist.csv
sources:
  - http://yann.lecun.com/exdb/mnist/
"#;
        let datafile = Datafile::from_yaml_str(contents).unwrap();
        assert_eq!(datafile.formats.len(), 1);
        assert_eq!(datafile.dependencies, vec!["jbenet/images@2.1"]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DATAFILE_NAME);
        datafile.to_path(&path).unwrap();
        assert_eq!(Datafile::from_path(&path).unwrap(), datafile);

        let handle = datafile.validate_for_publish().unwrap();
        assert_eq!(handle.format.as_deref(), Some("csv"));
    }

    #[test]
    fn test_validate_for_publish() {
        let mut datafile = Datafile::new(&Handle::new("jbenet", "foo"));
        assert_matches!(
            datafile.validate_for_publish(),
            Err(DatafileError::MissingFields(fields)) if fields == vec!["version", "title"]
        );

        datafile.dataset = "not a handle".to_owned();
        assert_matches!(
            datafile.validate_for_publish(),
            Err(DatafileError::InvalidHandle(_))
        );

        datafile.dataset = "bad author/foo@1".to_owned();
        assert_matches!(
            datafile.validate_for_publish(),
            Err(DatafileError::InvalidDataset(_))
        );
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let datafile = Datafile::from_path_or_default(&dir.path().join(DATAFILE_NAME)).unwrap();
        assert_eq!(datafile, Datafile::default());
        assert!(!datafile.is_valid());
    }

    #[test]
    fn test_installed_datafile_path() {
        let handle: Handle = "jbenet/foo@1.0".parse().unwrap();
        assert_eq!(
            installed_datafile_path(&handle),
            PathBuf::from("datasets/jbenet/foo/Datafile")
        );
    }
}
