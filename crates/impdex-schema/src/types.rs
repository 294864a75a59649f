//! Value types shared by the ingestion pipeline and the catalog.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;

/// A distribution channel that serves package archives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Channel {
    /// The default Anaconda repository (`repo.anaconda.com` and its mirror).
    Anaconda,
    /// The community `conda-forge` channel.
    CondaForge,
}

impl Channel {
    /// Identifier stored in the catalog's `channel` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Anaconda => "anaconda",
            Self::CondaForge => "conda-forge",
        }
    }

    /// Parse a catalog `channel` column value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "anaconda" => Some(Self::Anaconda),
            "conda-forge" => Some(Self::CondaForge),
            _ => None,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compression scheme of a package archive, detected from its filename suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArchiveFormat {
    /// `.conda`: a zip container holding `metadata.json` and two `.tar.zst` members.
    #[serde(rename = "conda")]
    NestedZst,
    /// `.tar.bz2`: a single bzip2-compressed tarball.
    #[serde(rename = "tar.bz2")]
    FlatBz2,
}

impl ArchiveFormat {
    /// Filename suffix that identifies this format.
    pub fn suffix(self) -> &'static str {
        match self {
            Self::NestedZst => ".conda",
            Self::FlatBz2 => ".tar.bz2",
        }
    }

    /// Detect the format from a filename or URL, if the suffix is recognised.
    pub fn from_name(name: &str) -> Option<Self> {
        if name.ends_with(Self::NestedZst.suffix()) {
            Some(Self::NestedZst)
        } else if name.ends_with(Self::FlatBz2.suffix()) {
            Some(Self::FlatBz2)
        } else {
            None
        }
    }
}

/// A normalized package name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageName(String);

impl PackageName {
    /// Create a new package name, normalizing the input to lowercase.
    pub fn new(name: &str) -> Self {
        Self(name.to_lowercase())
    }

    /// Return the normalized name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PackageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Deref for PackageName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for PackageName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for PackageName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other.to_lowercase()
    }
}

impl PartialEq<&str> for PackageName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == other.to_lowercase()
    }
}

impl Borrow<str> for PackageName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PackageName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PackageName {
    fn from(s: String) -> Self {
        Self::new(&s)
    }
}

/// A raw version string, stored exactly as published.
///
/// Not `Ord`: versions are compared through the parsed key in
/// `impdex_core::version`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version(String);

impl Version {
    /// Create a new version from the given string (stored as-is).
    pub fn new(v: &str) -> Self {
        Self(v.to_string())
    }

    /// Return the version string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Deref for Version {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<&str> for Version {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Version {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl PartialEq<&str> for Version {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// One catalog row: the identity, dependencies and importable names of a single archive.
///
/// The primary key is `(channel, filename)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    /// Package name from `info/index.json`.
    pub package_name: PackageName,
    /// Comma-joined, sorted importable module names; `None` when nothing importable was found.
    pub imported_names: Option<String>,
    /// Channel the archive was fetched from.
    pub channel: Channel,
    /// Dependency list from `info/index.json`, serialized as a JSON array string.
    pub depends: String,
    /// Archive filename (last URL segment).
    pub filename: String,
    /// Source URL of the archive.
    pub url: String,
    /// Raw version string from `info/index.json`.
    pub version: Version,
    /// Space-joined root package names from `info/about.json`.
    pub root_package_names: String,
}

impl PackageRecord {
    /// Iterate over the individual importable names of this record.
    pub fn imported_names(&self) -> impl Iterator<Item = &str> {
        self.imported_names
            .as_deref()
            .into_iter()
            .flat_map(|names| names.split(','))
            .filter(|name| !name.is_empty())
    }

    /// Whether this record exposes `module` as one of its importable names.
    pub fn provides(&self, module: &str) -> bool {
        self.imported_names().any(|name| name == module)
    }
}

/// Result of writing a record to the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The row did not exist and was written.
    Inserted,
    /// An identical row already existed under the same key; nothing was written.
    AlreadyPresent,
}
