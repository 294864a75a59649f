//! Listing feed: package name to the archives published for it.
//!
//! The feed is produced by an external channel crawler as a JSON object:
//!
//! ```text
//! {
//!   "tqdm": [
//!     { "fn": "tqdm-4.64.1-py39_0.conda", "url": "https://...", "version": "4.64.1" },
//!     ...
//!   ]
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{ArchiveFormat, PackageName, Version};

/// Errors raised while loading a listing feed.
#[derive(Error, Debug)]
pub enum ListingError {
    /// The feed file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The feed is not a valid listing document.
    #[error("Invalid listing JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// A single archive published for a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingEntry {
    /// Archive filename.
    #[serde(rename = "fn")]
    pub filename: String,
    /// Download URL of the archive.
    pub url: String,
    /// Raw version string as published.
    pub version: Version,
}

impl ListingEntry {
    /// Archive format implied by the filename, if recognised.
    pub fn format(&self) -> Option<ArchiveFormat> {
        ArchiveFormat::from_name(&self.filename)
    }
}

/// The full feed, ordered by package name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Listing {
    packages: BTreeMap<PackageName, Vec<ListingEntry>>,
}

impl Listing {
    /// Load a listing feed from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ListingError::Io`] if the file cannot be read and
    /// [`ListingError::Json`] if it is not a valid listing document.
    pub fn load(path: &Path) -> Result<Self, ListingError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Parse a listing feed from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`ListingError::Json`] if the text is not a valid listing document.
    pub fn from_json(text: &str) -> Result<Self, ListingError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Iterate packages in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&PackageName, &[ListingEntry])> {
        self.packages
            .iter()
            .map(|(name, entries)| (name, entries.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"{
        "tqdm": [
            {"fn": "tqdm-4.64.1-py39_0.conda", "url": "https://repo.anaconda.com/pkgs/main/linux-64/tqdm-4.64.1-py39_0.conda", "version": "4.64.1"},
            {"fn": "tqdm-4.64.0-py39_0.tar.bz2", "url": "https://repo.anaconda.com/pkgs/main/linux-64/tqdm-4.64.0-py39_0.tar.bz2", "version": "4.64.0"}
        ],
        "attrs": []
    }"#;

    #[test]
    fn test_parse_feed_in_name_order() {
        let listing = Listing::from_json(FEED).unwrap();
        let packages: Vec<_> = listing.iter().collect();
        let names: Vec<&str> = packages.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["attrs", "tqdm"]);

        let tqdm = packages[1].1;
        assert_eq!(tqdm[0].filename, "tqdm-4.64.1-py39_0.conda");
        assert_eq!(tqdm[0].format(), Some(ArchiveFormat::NestedZst));
        assert_eq!(tqdm[1].format(), Some(ArchiveFormat::FlatBz2));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("listings.json");
        std::fs::write(&path, FEED).unwrap();

        let listing = Listing::load(&path).unwrap();
        let counts: Vec<usize> = listing.iter().map(|(_, entries)| entries.len()).collect();
        assert_eq!(counts, [0, 2]);
    }

    #[test]
    fn test_invalid_feed() {
        assert!(matches!(
            Listing::from_json("[1, 2, 3]"),
            Err(ListingError::Json(_))
        ));
    }
}
