//! Shared types for the impdex catalog.
//!
//! These are the value types passed between the ingestion pipeline
//! (`impdex-core`) and the catalog / command layer (`impdex-cli`).

pub mod listing;
pub mod types;

// Re-exports
pub use listing::{Listing, ListingEntry, ListingError};
pub use types::*;

/// Name of the fixed metadata member at the root of a nested `.conda` container.
pub const NESTED_METADATA_MEMBER: &str = "metadata.json";

/// Prefix of the info tarball member inside a nested `.conda` container.
pub const NESTED_INFO_PREFIX: &str = "info-";

/// Suffix every inner tarball of a nested `.conda` container must carry.
pub const NESTED_TAR_SUFFIX: &str = ".tar.zst";

/// Top-level directory holding the metadata files in a flat `.tar.bz2` tarball.
pub const FLAT_INFO_DIR: &str = "info/";

/// Path manifest inside the info section of an archive.
pub const PATHS_JSON: &str = "info/paths.json";

/// Provenance document inside the info section of an archive.
pub const ABOUT_JSON: &str = "info/about.json";

/// Index document inside the info section of an archive.
pub const INDEX_JSON: &str = "info/index.json";
