use std::{
    fmt::{Display, Formatter},
    path::PathBuf,
    str::FromStr,
};

use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;

use crate::DATASETS_DIR;

/// A dataset identifier of the form `author/name[.format][@version]`.
///
/// [`Handle::path`] (`author/name`) is the stable identity of a dataset, the
/// format and version select a particular rendition and release of it.
///
/// Parsing is lenient: it only fails when the author/name separator is
/// missing or when the author or name is empty. Use [`Handle::is_valid`] to
/// check the result against the full identifier grammar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, SerializeDisplay, DeserializeFromStr)]
pub struct Handle {
    /// The owner of the dataset.
    pub author: String,

    /// The name of the dataset.
    pub name: String,

    /// The optional format suffix (`.csv`, `.json`, ...), without the dot.
    pub format: Option<String>,

    /// The optional version suffix, without the `@`.
    pub version: Option<String>,
}

/// The specific reason a handle could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidHandleKind {
    /// There is no `/` between author and name.
    #[error("no author/name separator")]
    MissingSeparator,

    /// The part before the `/` is empty.
    #[error("empty author")]
    EmptyAuthor,

    /// The part between the `/` and the format or version is empty.
    #[error("empty name")]
    EmptyName,
}

/// Error that is returned when a string cannot be parsed as a [`Handle`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid handle ({kind}): {input}")]
pub struct InvalidHandleError {
    /// The string that failed to parse.
    pub input: String,

    /// Why it failed.
    pub kind: InvalidHandleKind,
}

impl Handle {
    /// Constructs a handle without format or version.
    pub fn new(author: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            name: name.into(),
            format: None,
            version: None,
        }
    }

    /// Returns a copy of this handle with the given version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Parses a handle.
    ///
    /// The scan order matters: the author/name separator is the first `/`,
    /// the version delimiter is the last `@` and the format delimiter is the
    /// last `.` between the two. A trailing `.ext` is therefore always read
    /// as a format.
    pub fn parse(s: &str) -> Result<Self, InvalidHandleError> {
        let invalid = |kind| InvalidHandleError {
            input: s.to_owned(),
            kind,
        };

        let name_idx = s
            .find('/')
            .ok_or_else(|| invalid(InvalidHandleKind::MissingSeparator))?;

        // An `@` in the author part is not a version delimiter.
        let version_idx = match s.rfind('@') {
            Some(idx) if idx > name_idx => idx,
            _ => s.len(),
        };

        let format_idx = s[name_idx..version_idx]
            .rfind('.')
            .map_or(version_idx, |idx| name_idx + idx);

        let author = &s[..name_idx];
        if author.is_empty() {
            return Err(invalid(InvalidHandleKind::EmptyAuthor));
        }

        let name = &s[name_idx + 1..format_idx];
        if name.is_empty() {
            return Err(invalid(InvalidHandleKind::EmptyName));
        }

        let non_empty = |part: &str| (!part.is_empty()).then(|| part.to_owned());
        let format = if format_idx < version_idx {
            non_empty(&s[format_idx + 1..version_idx])
        } else {
            None
        };
        let version = if version_idx < s.len() {
            non_empty(&s[version_idx + 1..])
        } else {
            None
        };

        Ok(Self {
            author: author.to_owned(),
            name: name.to_owned(),
            format,
            version,
        })
    }

    /// Returns the canonical `author/name[.format][@version]` string.
    pub fn dataset(&self) -> String {
        self.to_string()
    }

    /// Returns `author/name`, the identity of the dataset regardless of
    /// version or format.
    pub fn path(&self) -> String {
        format!("{}/{}", self.author, self.name)
    }

    /// Returns true if the canonical string matches the identifier grammar.
    ///
    /// The part between the `/` and the version neither starts nor ends with
    /// a `.`, so both the name and a format split off at its last `.` are
    /// non-empty. Every string the grammar accepts parses back to itself.
    pub fn is_valid(&self) -> bool {
        lazy_regex::regex_is_match!(
            r"^[A-Za-z0-9._-]+/[A-Za-z0-9_-]+(?:\.+[A-Za-z0-9_-]+)*(?:@[A-Za-z0-9._-]+)?$",
            &self.dataset()
        )
    }

    /// The directory an installed copy of this dataset lives in, relative to
    /// the working directory: `datasets/<author>/<name>`.
    pub fn install_dir(&self) -> PathBuf {
        PathBuf::from(DATASETS_DIR)
            .join(&self.author)
            .join(&self.name)
    }
}

impl Display for Handle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.author, self.name)?;
        if let Some(format) = &self.format {
            write!(f, ".{format}")?;
        }
        if let Some(version) = &self.version {
            write!(f, "@{version}")?;
        }
        Ok(())
    }
}

impl FromStr for Handle {
    type Err = InvalidHandleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Handle::parse(s)
    }
}
