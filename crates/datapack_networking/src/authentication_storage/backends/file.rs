//! The credentials file, `~/.datapack/credentials.json`.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::authentication_storage::StorageBackend;
use crate::Authentication;

/// Credentials read from a JSON file that maps hosts to credentials:
///
/// ```json
/// {"datadex.io": {"BearerToken": "..."}}
/// ```
///
/// The file is read once, when the storage is created.
#[derive(Clone, Debug)]
pub struct FileStorage {
    /// The path to the JSON file
    pub path: PathBuf,

    hosts: BTreeMap<String, Authentication>,
}

/// An error that can occur when reading the credentials file
#[derive(thiserror::Error, Debug)]
pub enum FileStorageError {
    /// The file could not be read
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),

    /// The file does not hold a map of credentials
    #[error("failed to parse {}: {source}", .path.display())]
    JSONError {
        /// The credentials file
        path: PathBuf,
        /// The underlying error
        source: serde_json::Error,
    },
}

fn read_file(path: &Path) -> Result<BTreeMap<String, Authentication>, FileStorageError> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let contents = fs_err::read_to_string(path)?;
    serde_json::from_str(&contents).map_err(|source| FileStorageError::JSONError {
        path: path.to_path_buf(),
        source,
    })
}

impl FileStorage {
    /// Reads the credentials at `path`. A missing file holds no credentials.
    pub fn from_path(path: PathBuf) -> Result<Self, FileStorageError> {
        let hosts = read_file(&path)?;
        tracing::debug!("read {} credential(s) from {}", hosts.len(), path.display());
        Ok(Self { path, hosts })
    }

    /// Reads the credentials at `~/.datapack/credentials.json`
    pub fn new() -> Result<Self, FileStorageError> {
        let home = dirs::home_dir().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "could not determine the home directory",
            )
        })?;
        Self::from_path(home.join(".datapack").join("credentials.json"))
    }
}

impl StorageBackend for FileStorage {
    fn get(&self, host: &str) -> Result<Option<Authentication>> {
        Ok(self.hosts.get(host).cloned())
    }
}
