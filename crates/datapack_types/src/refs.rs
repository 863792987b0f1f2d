use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use datapack_digest::ContentHash;
use serde::{Deserialize, Serialize};

/// The name that resolves to the most recently published ref.
pub const LATEST: &str = "latest";

/// The publication timeline and version table of one dataset.
///
/// `published` maps every published ref (the manifest hash of a snapshot) to
/// the time the index received it. `versions` maps human chosen version names
/// to refs. A version may point at a ref that is not in `published`; such a
/// ref resolves normally but has no place on the timeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRefs {
    /// Published refs and the time they were published.
    #[serde(default)]
    pub published: BTreeMap<ContentHash, DateTime<Utc>>,

    /// Version names and the refs they point at.
    #[serde(default)]
    pub versions: BTreeMap<String, ContentHash>,
}

impl DatasetRefs {
    /// Parses refs from their YAML (or JSON) wire form.
    pub fn from_yaml_str(contents: &str) -> Result<Self, serde_yaml::Error> {
        Ok(serde_yaml::from_str::<Option<Self>>(contents)?.unwrap_or_default())
    }

    /// Converts the refs into their YAML wire form.
    pub fn to_yaml_string(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Resolves a name to a ref.
    ///
    /// An empty name means [`LATEST`], the most recently published ref. Any
    /// other name is looked up as a version first and then as a published
    /// ref hash. Returns `None` if nothing matches.
    pub fn resolve_ref(&self, name: &str) -> Option<ContentHash> {
        if name.is_empty() || name == LATEST {
            return self.latest();
        }
        if let Some(hash) = self.versions.get(name) {
            return Some(*hash);
        }
        name.parse::<ContentHash>()
            .ok()
            .filter(|hash| self.published.contains_key(hash))
    }

    /// The most recently published ref. Refs published at the same instant
    /// are ordered by their hash, the greatest wins.
    pub fn latest(&self) -> Option<ContentHash> {
        self.published
            .iter()
            .max_by_key(|(hash, time)| (**time, **hash))
            .map(|(hash, _)| *hash)
    }

    /// Returns the version name of the ref `name` resolves to. If no version
    /// points at that ref, the ref hash itself is returned. Returns `None`
    /// if `name` does not resolve at all.
    ///
    /// When several versions point at the same ref the alphabetically first
    /// one is returned.
    pub fn resolve_version(&self, name: &str) -> Option<String> {
        let hash = self.resolve_ref(name)?;
        let version = self
            .versions
            .iter()
            .find(|(_, version_hash)| **version_hash == hash)
            .map(|(version, _)| version.clone());
        Some(version.unwrap_or_else(|| hash.to_string()))
    }

    /// The time at which `hash` was published.
    pub fn ref_timestamp(&self, hash: &ContentHash) -> Option<DateTime<Utc>> {
        self.published.get(hash).copied()
    }

    /// All published refs ordered from oldest to newest.
    pub fn sorted_published(&self) -> Vec<(ContentHash, DateTime<Utc>)> {
        let mut published: Vec<_> = self
            .published
            .iter()
            .map(|(hash, time)| (*hash, *time))
            .collect();
        published.sort_by_key(|(hash, time)| (*time, *hash));
        published
    }

    /// The time of the most recent publication.
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.published.values().max().copied()
    }

    /// Records a publication. The timeline is append-only: an already
    /// published ref keeps its original timestamp. Returns true if the ref
    /// was new.
    pub fn publish(&mut self, hash: ContentHash, at: DateTime<Utc>) -> bool {
        if self.published.contains_key(&hash) {
            return false;
        }
        self.published.insert(hash, at);
        true
    }
}
