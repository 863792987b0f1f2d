use std::{
    fmt::{Debug, Display, Formatter},
    str::FromStr,
};

use digest::Output;
use sha1::Sha1;
use thiserror::Error;

/// The number of hexadecimal characters in the textual form of a
/// [`ContentHash`].
const HEX_LEN: usize = 40;

/// The content address of a blob: the SHA-1 digest of its bytes.
///
/// The textual form is always 40 lowercase hexadecimal characters. Parsing
/// accepts either case but rejects anything that is not exactly 40 hex
/// digits, so a value of this type is always safe to use as a store key.
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serde",
    derive(serde_with::SerializeDisplay, serde_with::DeserializeFromStr)
)]
pub struct ContentHash([u8; 20]);

impl ContentHash {
    /// Returns the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Returns true if `s` is a well-formed textual content hash.
    pub fn is_valid(s: &str) -> bool {
        s.len() == HEX_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

impl From<Output<Sha1>> for ContentHash {
    fn from(output: Output<Sha1>) -> Self {
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&output);
        Self(bytes)
    }
}

impl From<[u8; 20]> for ContentHash {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl Display for ContentHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl Debug for ContentHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ContentHash({self})")
    }
}

/// The reason a string was rejected as a [`ContentHash`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidContentHashKind {
    /// The string does not have exactly 40 characters.
    WrongLength(usize),
    /// The string contains a character that is not a hexadecimal digit.
    NonHexCharacter(char),
}

impl Display for InvalidContentHashKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidContentHashKind::WrongLength(len) => {
                write!(f, "expected {HEX_LEN} characters, found {len}")
            }
            InvalidContentHashKind::NonHexCharacter(c) => {
                write!(f, "'{c}' is not a hexadecimal digit")
            }
        }
    }
}

/// Error that is returned when a string is not a valid [`ContentHash`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid hash '{input}': {kind}")]
pub struct InvalidContentHashError {
    /// The offending input.
    pub input: String,
    /// Why the input was rejected.
    pub kind: InvalidContentHashKind,
}

impl FromStr for ContentHash {
    type Err = InvalidContentHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |kind| InvalidContentHashError {
            input: s.to_owned(),
            kind,
        };

        if let Some(c) = s.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(invalid(InvalidContentHashKind::NonHexCharacter(c)));
        }
        if s.len() != HEX_LEN {
            return Err(invalid(InvalidContentHashKind::WrongLength(s.len())));
        }

        let mut bytes = [0u8; 20];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|_| invalid(InvalidContentHashKind::WrongLength(s.len())))?;
        Ok(Self(bytes))
    }
}

impl TryFrom<&str> for ContentHash {
    type Error = InvalidContentHashError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}
