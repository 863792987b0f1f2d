//! The manifest of a dataset: a table from relative file path to the content
//! address of that file.
//!
//! The manifest is stored as YAML in a file called [`MANIFEST_FILE_NAME`] at
//! the root of the dataset. Entries that were discovered but not yet hashed
//! are stored as `null` ("pending"). A manifest with pending entries is
//! incomplete and cannot be uploaded or published.
//!
//! Every mutation rewrites the whole file atomically, so an interrupted
//! [`Manifest::generate`] leaves a valid manifest behind in which some
//! entries are still pending.

use std::{
    collections::{BTreeMap, BTreeSet},
    io::Write,
    path::{Path, PathBuf},
};

use datapack_digest::{compute_bytes_digest, compute_file_digest, ContentHash};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

use crate::DATASETS_DIR;

/// The name of the manifest file at the root of a dataset.
pub const MANIFEST_FILE_NAME: &str = "Manifest";

/// A single manifest entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestEntry {
    /// The file is known but has not been hashed yet.
    Pending,

    /// The content address of the file.
    Hashed(ContentHash),
}

impl ManifestEntry {
    /// Returns the hash of this entry, if it has one.
    pub fn hash(&self) -> Option<ContentHash> {
        match self {
            ManifestEntry::Pending => None,
            ManifestEntry::Hashed(hash) => Some(*hash),
        }
    }
}

impl Serialize for ManifestEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ManifestEntry::Pending => serializer.serialize_none(),
            ManifestEntry::Hashed(hash) => serializer.collect_str(hash),
        }
    }
}

impl<'de> Deserialize<'de> for ManifestEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Anything that is not a well formed hash (including legacy
        // placeholder strings) is read as pending so it blocks uploads.
        let value = Option::<String>::deserialize(deserializer)?;
        Ok(value
            .and_then(|value| value.parse().ok())
            .map_or(ManifestEntry::Pending, ManifestEntry::Hashed))
    }
}

/// Errors that can occur when working with a [`Manifest`].
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest file could not be read or written.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The manifest file is not valid YAML.
    #[error("failed to parse manifest {0}")]
    Parse(PathBuf, #[source] serde_yaml::Error),

    /// The manifest could not be serialized.
    #[error("failed to serialize manifest")]
    Serialize(#[source] serde_yaml::Error),

    /// The dataset directory could not be traversed.
    #[error("failed to walk the dataset directory")]
    Walk(#[from] walkdir::Error),

    /// A file listed in the manifest could not be hashed.
    #[error("failed to hash '{path}'")]
    Hash {
        /// The path relative to the dataset root.
        path: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The path is not listed in the manifest.
    #[error("'{0}' is not listed in the manifest")]
    UnknownPath(String),
}

/// Options that influence [`Manifest::generate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateOptions {
    /// Name of the top-level directory that holds nested (installed)
    /// datasets. It is never part of the manifest.
    pub datasets_dir: String,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            datasets_dir: DATASETS_DIR.to_owned(),
        }
    }
}

/// The result of verifying every entry of a manifest against the files on
/// disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    /// The number of entries that were checked.
    pub checked: usize,

    /// The paths whose content does not match the manifest.
    pub failed: Vec<String>,
}

impl CheckReport {
    /// Returns true if no entry failed.
    pub fn is_ok(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A path to content-address table for one dataset tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    root: PathBuf,
    entries: BTreeMap<String, ManifestEntry>,
}

impl Manifest {
    /// Creates a new empty manifest for the dataset rooted at `root`. Nothing
    /// is written to disk until the manifest is mutated or saved.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Loads the manifest of the dataset rooted at `root`.
    pub fn from_root(root: impl Into<PathBuf>) -> Result<Self, ManifestError> {
        let mut manifest = Self::new(root);
        let path = manifest.path();
        let contents = fs_err::read_to_string(&path)?;
        manifest.entries =
            serde_yaml::from_str::<Option<BTreeMap<String, ManifestEntry>>>(&contents)
                .map_err(|e| ManifestError::Parse(path, e))?
                .unwrap_or_default();
        Ok(manifest)
    }

    /// Loads the manifest of the dataset rooted at `root`, or returns an empty
    /// manifest if there is none yet.
    pub fn from_root_or_default(root: impl Into<PathBuf>) -> Result<Self, ManifestError> {
        let root = root.into();
        if root.join(MANIFEST_FILE_NAME).is_file() {
            Self::from_root(root)
        } else {
            Ok(Self::new(root))
        }
    }

    /// The root directory of the dataset.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The location of the manifest file.
    pub fn path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE_NAME)
    }

    /// Converts the manifest into its on-disk form.
    pub fn to_yaml_string(&self) -> Result<String, ManifestError> {
        serde_yaml::to_string(&self.entries).map_err(ManifestError::Serialize)
    }

    /// Writes the manifest to disk. The file is replaced atomically.
    pub fn save(&self) -> Result<(), ManifestError> {
        let contents = self.to_yaml_string()?;
        fs_err::create_dir_all(&self.root)?;
        let mut file = tempfile::NamedTempFile::new_in(&self.root)?;
        file.write_all(contents.as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(self.path()).map_err(|e| e.error)?;
        Ok(())
    }

    /// Returns the entry for `path`.
    pub fn get(&self, path: &str) -> Option<ManifestEntry> {
        self.entries.get(path).copied()
    }

    /// Iterates over all entries in path order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, ManifestEntry)> + '_ {
        self.entries.iter().map(|(path, entry)| (path.as_str(), *entry))
    }

    /// The number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the manifest has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Adds `path` as a pending entry and persists the manifest. Existing
    /// entries are never overwritten. Returns true if the entry is new.
    pub fn add(&mut self, path: impl Into<String>) -> Result<bool, ManifestError> {
        let path = path.into();
        if self.entries.contains_key(&path) {
            return Ok(false);
        }
        tracing::debug!("adding {path} to the manifest");
        self.entries.insert(path, ManifestEntry::Pending);
        self.save()?;
        Ok(true)
    }

    /// Computes the hash of the file at `path` (relative to the root), stores
    /// it and persists the manifest.
    pub fn hash(&mut self, path: &str) -> Result<ContentHash, ManifestError> {
        let hash = self.compute_hash(path)?;
        self.entries
            .insert(path.to_owned(), ManifestEntry::Hashed(hash));
        self.save()?;
        tracing::debug!("hashed {path}: {hash}");
        Ok(hash)
    }

    /// Removes every entry and persists the (now empty) manifest.
    pub fn clear(&mut self) -> Result<(), ManifestError> {
        self.entries.clear();
        self.save()
    }

    /// Walks the dataset tree once, adds every regular file as a pending
    /// entry and then hashes every pending entry, persisting after each hash.
    ///
    /// Hidden files and directories, the nested datasets directory and the
    /// manifest itself are skipped. Entries for files that no longer exist
    /// are left untouched.
    pub fn generate(&mut self, options: &GenerateOptions) -> Result<(), ManifestError> {
        let mut discovered = Vec::new();
        let walker = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !is_excluded(entry, options));
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(relative) = relative_path(&self.root, entry.path()) else {
                tracing::warn!(
                    "skipping {} because its path is not valid unicode",
                    entry.path().display()
                );
                continue;
            };
            if relative == MANIFEST_FILE_NAME {
                continue;
            }
            discovered.push(relative);
        }

        let mut added = false;
        for path in discovered {
            if !self.entries.contains_key(&path) {
                self.entries.insert(path, ManifestEntry::Pending);
                added = true;
            }
        }
        if added {
            self.save()?;
        }

        for path in self.pending_paths() {
            self.hash(&path)?;
        }

        Ok(())
    }

    /// Recomputes the hash of `path` and compares it with the stored one. A
    /// pending entry never passes.
    pub fn check(&self, path: &str) -> Result<bool, ManifestError> {
        let entry = self
            .get(path)
            .ok_or_else(|| ManifestError::UnknownPath(path.to_owned()))?;
        let actual = self.compute_hash(path)?;
        Ok(entry.hash() == Some(actual))
    }

    /// Checks every entry of the manifest.
    pub fn check_all(&self) -> Result<CheckReport, ManifestError> {
        let mut report = CheckReport::default();
        for path in self.entries.keys() {
            report.checked += 1;
            let passed = match self.check(path) {
                Ok(passed) => passed,
                Err(ManifestError::Hash { source, .. })
                    if source.kind() == std::io::ErrorKind::NotFound =>
                {
                    false
                }
                Err(e) => return Err(e),
            };
            if !passed {
                tracing::warn!("checksum failed: {path}");
                report.failed.push(path.clone());
            }
        }
        Ok(report)
    }

    /// Returns true if no entry is pending.
    pub fn is_complete(&self) -> bool {
        self.entries
            .values()
            .all(|entry| matches!(entry, ManifestEntry::Hashed(_)))
    }

    /// The paths that are still pending.
    pub fn pending_paths(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, entry)| matches!(entry, ManifestEntry::Pending))
            .map(|(path, _)| path.clone())
            .collect()
    }

    /// Every distinct hash in the manifest, in sorted order.
    pub fn all_hashes(&self) -> Vec<ContentHash> {
        self.entries
            .values()
            .filter_map(ManifestEntry::hash)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Every path in the manifest, in sorted order.
    pub fn all_paths(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// All paths whose content has the given hash. Identical files share a
    /// hash so this can return more than one path.
    pub fn paths_for_hash(&self, hash: &ContentHash) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.hash().as_ref() == Some(hash))
            .map(|(path, _)| path.clone())
            .collect()
    }

    /// The content address of the manifest itself, which identifies this
    /// snapshot of the dataset.
    ///
    /// This is the hash of the manifest file on disk. If the manifest was
    /// never written, the hash of the form it would be written in is
    /// returned.
    pub fn manifest_hash(&self) -> Result<ContentHash, ManifestError> {
        match compute_file_digest(self.path()) {
            Ok(hash) => Ok(hash),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(compute_bytes_digest(self.to_yaml_string()?))
            }
            Err(e) => Err(ManifestError::Io(e)),
        }
    }

    fn compute_hash(&self, path: &str) -> Result<ContentHash, ManifestError> {
        compute_file_digest(self.root.join(path)).map_err(|source| ManifestError::Hash {
            path: path.to_owned(),
            source,
        })
    }
}

/// Hidden entries, and the nested datasets directory directly below the root,
/// are not part of a dataset.
fn is_excluded(entry: &DirEntry, options: &GenerateOptions) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    if name.starts_with('.') {
        return true;
    }
    entry.depth() == 1 && entry.file_type().is_dir() && name == options.datasets_dir.as_str()
}

/// The `/` separated path of `path` relative to `root`.
fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let components = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    Some(components.join("/"))
}
