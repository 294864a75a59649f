//! Resolution of the importable top-level names a package installs.

use std::collections::{BTreeSet, HashSet};

use impdex_schema::PackageName;
use tracing::debug;

use crate::config::ResolverConfig;

/// Importable names found in a path manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Comma-joined names, `None` when nothing importable was found.
    pub imported_names: Option<String>,
    /// Non-fatal note about the resolution (nothing found, dropped natives).
    pub diagnostic: Option<String>,
}

/// Verdict on one native extension candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeCheck {
    /// Exports the loader entry point for this module name.
    Module(String),
    /// Checked, and exports no loader entry point.
    NoEntryPoint,
    /// Not checked, no symbol lister was available.
    Unverified,
}

/// Why a `site-packages` entry was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    ForeignSuffix,
    NonPackage,
    Bootstrap,
    DistributionMetadata,
}

#[derive(Debug, Clone)]
pub struct SitePackageResolver<'a> {
    config: &'a ResolverConfig,
}

impl<'a> SitePackageResolver<'a> {
    pub fn new(config: &'a ResolverConfig) -> Self {
        Self { config }
    }

    /// The entry directly under `site-packages` for `path`, if any.
    fn top_level_entry<'p>(&self, path: &'p str) -> Option<&'p str> {
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        segments.find(|s| *s == self.config.site_packages_dir)?;
        // `None` here means the path *is* the site-packages directory (a bare symlink)
        segments.next()
    }

    fn suffix_of<'s>(name: &str, suffixes: &'s [String]) -> Option<&'s str> {
        suffixes
            .iter()
            .map(String::as_str)
            .find(|suffix| name.ends_with(suffix))
    }

    fn is_native(&self, name: &str) -> bool {
        Self::suffix_of(name, &self.config.native_suffixes).is_some()
    }

    fn reject(&self, package: &PackageName, candidate: &str) -> Option<Rejection> {
        let recognised = Self::suffix_of(candidate, &self.config.source_suffixes).is_some()
            || self.is_native(candidate);
        if candidate.contains('.') && !recognised {
            return Some(Rejection::ForeignSuffix);
        }
        if self.config.non_package_names.contains(candidate) {
            return Some(Rejection::NonPackage);
        }
        if candidate == self.config.bootstrap_artifact
            && package.as_str() != self.config.bootstrap_owner
        {
            return Some(Rejection::Bootstrap);
        }
        if candidate.contains('-') && !self.is_native(candidate) {
            return Some(Rejection::DistributionMetadata);
        }
        None
    }

    fn strip_source_suffix<'n>(&self, name: &'n str) -> &'n str {
        Self::suffix_of(name, &self.config.source_suffixes)
            .and_then(|suffix| name.strip_suffix(suffix))
            .unwrap_or(name)
    }

    /// Accepted `site-packages` entries as `(path, candidate)`, first path per
    /// candidate, plus the last candidate seen whether accepted or not.
    fn accepted<'p>(
        &self,
        package: &PackageName,
        paths: impl IntoIterator<Item = &'p str>,
    ) -> (Vec<(&'p str, &'p str)>, Option<&'p str>) {
        let mut seen = HashSet::new();
        let mut accepted = Vec::new();
        let mut last_seen = None;

        for path in paths {
            let Some(candidate) = self.top_level_entry(path) else {
                continue;
            };
            if !seen.insert(candidate) {
                continue;
            }
            last_seen = Some(candidate);

            if let Some(rejection) = self.reject(package, candidate) {
                debug!(%package, candidate, ?rejection, "skipping site-packages entry");
                continue;
            }
            accepted.push((path, candidate));
        }
        (accepted, last_seen)
    }

    /// Archive paths of the native extension candidates `resolve` will ask
    /// about, so they can be extracted in one pass beforehand.
    pub fn native_candidates<'p>(
        &self,
        package: &PackageName,
        paths: impl IntoIterator<Item = &'p str>,
    ) -> Vec<&'p str> {
        self.accepted(package, paths)
            .0
            .into_iter()
            .filter(|(_, candidate)| self.is_native(candidate))
            .map(|(path, _)| path)
            .collect()
    }

    /// Resolve the importable names installed by `package`.
    ///
    /// `verify_native` is called with the full archive path of each native
    /// extension candidate.
    ///
    /// # Errors
    ///
    /// Only errors from `verify_native` are propagated.
    pub fn resolve<'p, F, E>(
        &self,
        package: &PackageName,
        paths: impl IntoIterator<Item = &'p str>,
        mut verify_native: F,
    ) -> Result<Resolution, E>
    where
        F: FnMut(&str) -> Result<NativeCheck, E>,
    {
        let (accepted, last_seen) = self.accepted(package, paths);
        let mut names = BTreeSet::new();
        let mut unverified = Vec::new();
        let mut no_entry_point = Vec::new();

        for (path, candidate) in accepted {
            if !self.is_native(candidate) {
                names.insert(ImportName(self.strip_source_suffix(candidate).to_string()));
                continue;
            }
            match verify_native(path)? {
                NativeCheck::Module(module) => {
                    names.insert(ImportName(module));
                }
                NativeCheck::NoEntryPoint => no_entry_point.push(candidate),
                NativeCheck::Unverified => unverified.push(candidate),
            }
        }

        let mut notes = Vec::new();
        if !no_entry_point.is_empty() {
            notes.push(format!(
                "native library without module entry point: {}",
                no_entry_point.join(", ")
            ));
        }
        if !unverified.is_empty() {
            notes.push(format!(
                "unverified native module(s): {}",
                unverified.join(", ")
            ));
        }

        let imported_names = if names.is_empty() {
            notes.push(match last_seen {
                Some(last) => format!("no site-packages name found (last seen: {last})"),
                None => "no site-packages name found".to_string(),
            });
            None
        } else {
            Some(
                names
                    .into_iter()
                    .map(|n| n.0)
                    .collect::<Vec<_>>()
                    .join(","),
            )
        };

        Ok(Resolution {
            imported_names,
            diagnostic: (!notes.is_empty()).then(|| notes.join("; ")),
        })
    }
}

/// Orders names by leading underscore count, then lexically, so `_foo`
/// sorts after `foo` and `bar`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ImportName(String);

impl ImportName {
    fn leading_underscores(&self) -> usize {
        self.0.len() - self.0.trim_start_matches('_').len()
    }
}

impl Ord for ImportName {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.leading_underscores()
            .cmp(&other.leading_underscores())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for ImportName {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
