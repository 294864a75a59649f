//! Static configuration injected into the pipeline.
//!
//! Everything the pipeline "knows" about the outside world (channel base
//! URLs, non-package directory names, loader conventions) lives here so
//! tests can substitute their own fixtures.

use std::collections::HashSet;
use std::time::Duration;

use impdex_schema::Channel;

/// Default number of archives in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 20;

/// Default number of fetch attempts per archive.
pub const DEFAULT_RETRIES: u32 = 3;

/// A base URL that identifies a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPrefix {
    pub prefix: String,
    pub channel: Channel,
}

impl ChannelPrefix {
    pub fn new(prefix: &str, channel: Channel) -> Self {
        Self {
            prefix: prefix.to_string(),
            channel,
        }
    }
}

/// Known channel base URLs.
pub fn default_channel_prefixes() -> Vec<ChannelPrefix> {
    vec![
        ChannelPrefix::new("https://repo.anaconda.com/pkgs/", Channel::Anaconda),
        ChannelPrefix::new("https://conda.anaconda.org/anaconda/", Channel::Anaconda),
        ChannelPrefix::new("https://conda.anaconda.org/conda-forge/", Channel::CondaForge),
    ]
}

/// Rules for deciding which top-level `site-packages` entries are importable.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Path segment under which importable names are installed.
    pub site_packages_dir: String,
    /// Suffixes of pure-source modules (stripped from accepted names).
    pub source_suffixes: Vec<String>,
    /// Suffixes of native extension modules (verified, then stripped).
    pub native_suffixes: Vec<String>,
    /// Entries that end up in `site-packages` but are never importable packages.
    pub non_package_names: HashSet<String>,
    /// Bootstrap installer shipped inside unrelated packages.
    pub bootstrap_artifact: String,
    /// The only package allowed to provide `bootstrap_artifact`.
    pub bootstrap_owner: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        let non_package_names = [
            "LICENSE",
            "README",
            "__pycache__",
            "bin",
            "share",
            "tests",
            "__init__.py",
            "AUTHORS",
            "docs",
        ]
        .into_iter()
        .map(str::to_string)
        .collect();

        Self {
            site_packages_dir: "site-packages".to_string(),
            source_suffixes: vec![".py".to_string()],
            native_suffixes: vec![".so".to_string()],
            non_package_names,
            bootstrap_artifact: "ez_setup.py".to_string(),
            bootstrap_owner: "ez_setup".to_string(),
        }
    }
}

/// Tunables for a batch ingestion run.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Maximum archives fetched and decoded concurrently.
    pub concurrency: usize,
    /// Fetch attempts per archive before the batch is aborted.
    pub retries: u32,
    /// Per-request timeout for archive downloads.
    pub request_timeout: Duration,
    /// Channel allowlist used by the detector.
    pub channels: Vec<ChannelPrefix>,
    /// Site-package resolution rules.
    pub resolver: ResolverConfig,
    /// Symbol prefix of the extension-module loader entry point.
    pub entry_point_prefix: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            retries: DEFAULT_RETRIES,
            request_timeout: Duration::from_secs(60),
            channels: default_channel_prefixes(),
            resolver: ResolverConfig::default(),
            entry_point_prefix: "PyInit_".to_string(),
        }
    }
}

impl IngestConfig {
    /// Override the concurrency width (clamped to at least one).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Override the retry budget (clamped to at least one attempt).
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries.max(1);
        self
    }
}
