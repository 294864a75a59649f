//! Version ordering for "pick the latest archive" selection.
//!
//! Conda version strings are projected onto sequences of unbounded
//! non-negative integers:
//!
//! - `_` is removed and `+` becomes `.`
//! - an alphabetic run is replaced by a `.0.` boundary (`1.0rc1` -> `1.0.0.1`)
//! - an explicit epoch `N!` becomes a leading `N.`; when any candidate uses an
//!   epoch, the others get an implicit `0.`
//!
//! Anything that still fails to split into integers is an error rather than
//! being coerced.

use impdex_schema::{ArchiveFormat, ListingEntry};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unparseable version {raw:?} (normalized to {normalized:?})")]
pub struct VersionError {
    pub raw: String,
    pub normalized: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectError {
    #[error("No .conda or .tar.bz2 archive among {0} candidate(s)")]
    NoEligibleArchive(usize),

    #[error(transparent)]
    Version(#[from] VersionError),
}

/// Order-comparable projection of a version string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct VersionKey(Vec<Segment>);

/// A numeric segment of any width, kept as canonical digits (no leading
/// zeros) so that comparing length then digits compares value.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment(String);

impl Segment {
    fn parse(digits: &str) -> Option<Self> {
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let canonical = match digits.trim_start_matches('0') {
            "" => "0",
            trimmed => trimmed,
        };
        Some(Self(canonical.to_string()))
    }
}

impl Ord for Segment {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for Segment {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl VersionKey {
    /// Parse `raw`. `imply_epoch` is set when any sibling candidate carries
    /// an explicit epoch, so every key has the same leading shape.
    pub fn parse(raw: &str, imply_epoch: bool) -> Result<Self, VersionError> {
        let normalized = normalize(raw, imply_epoch);
        normalized
            .split('.')
            .map(Segment::parse)
            .collect::<Option<Vec<_>>>()
            .map(Self)
            .ok_or_else(|| VersionError {
                raw: raw.to_string(),
                normalized: normalized.clone(),
            })
    }
}

fn normalize(raw: &str, imply_epoch: bool) -> String {
    let mut version = raw.to_string();
    let mut implicit_epoch = imply_epoch;
    if imply_epoch && version.contains('!') {
        version = version.replace('!', ".");
        implicit_epoch = false;
    }
    version = version.replace('_', "").replace('+', ".");
    if version.chars().any(char::is_alphabetic) {
        version = relocate_alpha_runs(&version);
    }
    if version.is_empty() {
        version.push('0');
    }
    if implicit_epoch {
        version.insert_str(0, "0.");
    }
    version
}

/// Replace every alphabetic run with a `.0.` boundary.
fn relocate_alpha_runs(version: &str) -> String {
    let mut out = String::with_capacity(version.len() + 4);
    let mut in_run = false;
    for c in version.chars() {
        if c.is_alphabetic() {
            if !in_run && !out.is_empty() && !out.ends_with('.') {
                out.push('.');
            }
            in_run = true;
        } else if in_run {
            in_run = false;
            out.push('0');
            if c != '.' {
                out.push('.');
            }
            out.push(c);
        } else {
            out.push(c);
        }
    }
    if out.ends_with('.') {
        out.push('0');
    }
    out
}

/// Pick the newest archive among `entries`.
///
/// Only `.conda` and `.tar.bz2` entries are eligible. On equal versions a
/// `.conda` archive beats a `.tar.bz2`, and otherwise the earlier entry wins,
/// so the result is stable for a given input.
///
/// # Errors
///
/// [`SelectError::NoEligibleArchive`] if no entry has a recognised suffix and
/// [`SelectError::Version`] if an eligible version cannot be parsed.
pub fn select_latest(entries: &[ListingEntry]) -> Result<&ListingEntry, SelectError> {
    let eligible: Vec<(&ListingEntry, ArchiveFormat)> = entries
        .iter()
        .filter_map(|e| e.format().map(|f| (e, f)))
        .collect();
    let imply_epoch = eligible.iter().any(|(e, _)| e.version.contains('!'));

    let mut best: Option<(&ListingEntry, VersionKey, bool)> = None;
    for (entry, format) in eligible {
        let key = VersionKey::parse(&entry.version, imply_epoch)?;
        let nested = format == ArchiveFormat::NestedZst;
        let better = match &best {
            None => true,
            Some((_, best_key, best_nested)) => {
                (&key, nested) > (best_key, *best_nested)
            }
        };
        if better {
            best = Some((entry, key, nested));
        }
    }

    best.map(|(entry, _, _)| entry)
        .ok_or(SelectError::NoEligibleArchive(entries.len()))
}
