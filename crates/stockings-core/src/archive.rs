//! Core archive types: names, versions and the archive tuple

use std::cmp::Ordering;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StockingsError;
use crate::identity::{PublisherKey, Signature};

/// Name of an archive, derived from the basename of the added directory.
///
/// Names double as file names in the archive store and as the first field of
/// an update frame, so anything that could escape the store directory or
/// break frame splitting is refused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArchiveName(String);

impl ArchiveName {
    /// Validate and wrap a name.
    pub fn new(name: impl Into<String>) -> Result<Self, StockingsError> {
        let name = name.into();
        let forbidden = |c: char| c == '/' || c == '\\' || c.is_control() || c.is_whitespace();
        if name.is_empty() || name.starts_with('.') || name.chars().any(forbidden) {
            return Err(StockingsError::InvalidName(name));
        }
        Ok(Self(name))
    }

    /// Derive the name from a directory path (its last non-empty component).
    ///
    /// `photos/`, `./photos` and `/home/me/photos` all yield `photos`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, StockingsError> {
        let dir = dir.as_ref();
        let last = dir
            .to_string_lossy()
            .split(['/', '\\'])
            .filter(|part| !part.trim().is_empty())
            .last()
            .map(str::to_string);
        match last {
            Some(name) => Self::new(name),
            None => Err(StockingsError::InvalidName(dir.display().to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArchiveName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ArchiveName {
    type Err = StockingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ArchiveName {
    type Error = StockingsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ArchiveName> for String {
    fn from(name: ArchiveName) -> Self {
        name.0
    }
}

/// One dot-separated piece of a version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Segment {
    Numeric(Digits),
    Text(String),
}

/// Decimal digits of any length with leading zeros stripped, so that
/// comparing (length, bytes) is numeric comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Digits(String);

impl Digits {
    fn parse(part: &str) -> Option<Self> {
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(Self(part.trim_start_matches('0').to_string()))
    }
}

impl PartialOrd for Digits {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Digits {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.as_bytes().cmp(other.0.as_bytes()))
    }
}

/// Archive version, totally ordered.
///
/// Dot-separated segments are compared pairwise: numeric segments by value,
/// text segments lexicographically, numeric before text. A version that is a
/// prefix of another sorts first (`1 < 1.0`). The raw string is kept for
/// display and for the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    raw: String,
    segments: Vec<Segment>,
}

impl Version {
    pub fn new(raw: impl Into<String>) -> Result<Self, StockingsError> {
        let raw = raw.into();
        if raw.is_empty() || raw.chars().any(|c| c.is_control() || c.is_whitespace()) {
            return Err(StockingsError::InvalidVersion(raw));
        }
        let segments = raw
            .split('.')
            .map(|part| match Digits::parse(part) {
                Some(digits) => Segment::Numeric(digits),
                None => Segment::Text(part.to_string()),
            })
            .collect();
        Ok(Self { raw, segments })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.segments == other.segments
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.segments.cmp(&other.segments)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for Version {
    type Err = StockingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Version {
    type Error = StockingsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.raw
    }
}

/// A named, versioned, signed archive.
///
/// The tuple is only ever replaced as a whole. `content` is the packed
/// directory exactly as it was signed and as it goes on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Archive {
    pub name: ArchiveName,
    pub version: Version,
    pub publisher_key: PublisherKey,
    pub signature: Signature,
    pub content: Vec<u8>,
}

impl Archive {
    /// Check the signature over the content under the publisher key.
    pub fn verify(&self) -> bool {
        self.publisher_key.verify(&self.content, &self.signature)
    }
}
