//! Archive type and channel detection from a URL.
//!
//! Detection is pure: no I/O, and it fails closed on anything it does not
//! recognise.

use impdex_schema::{ArchiveFormat, Channel};
use thiserror::Error;

use crate::config::{ChannelPrefix, default_channel_prefixes};
use crate::paths::filename_from_url;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectError {
    #[error("Cannot detect channel from URL: {0}")]
    UnknownChannel(String),

    #[error("Cannot detect .conda or .tar.bz2 archive from URL: {0}")]
    UnknownArchiveFormat(String),
}

/// An archive to be fetched, with its channel and compression scheme resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveDescriptor {
    pub url: String,
    pub channel: Channel,
    pub format: ArchiveFormat,
}

impl ArchiveDescriptor {
    /// Archive filename (last URL segment).
    pub fn filename(&self) -> &str {
        filename_from_url(&self.url)
    }
}

/// Maps URLs to descriptors using a channel allowlist.
#[derive(Debug, Clone)]
pub struct ArchiveDetector {
    prefixes: Vec<ChannelPrefix>,
}

impl Default for ArchiveDetector {
    fn default() -> Self {
        Self::new(default_channel_prefixes())
    }
}

impl ArchiveDetector {
    pub fn new(prefixes: Vec<ChannelPrefix>) -> Self {
        Self { prefixes }
    }

    pub fn channel(&self, url: &str) -> Result<Channel, DetectError> {
        self.prefixes
            .iter()
            .find(|p| url.starts_with(&p.prefix))
            .map(|p| p.channel)
            .ok_or_else(|| DetectError::UnknownChannel(url.to_string()))
    }

    pub fn format(url: &str) -> Result<ArchiveFormat, DetectError> {
        ArchiveFormat::from_name(url)
            .ok_or_else(|| DetectError::UnknownArchiveFormat(url.to_string()))
    }

    /// Resolve channel and compression scheme for `url`.
    ///
    /// # Errors
    ///
    /// Returns [`DetectError::UnknownChannel`] if no allowlisted prefix
    /// matches and [`DetectError::UnknownArchiveFormat`] if the suffix is
    /// neither `.conda` nor `.tar.bz2`.
    pub fn detect(&self, url: &str) -> Result<ArchiveDescriptor, DetectError> {
        let channel = self.channel(url)?;
        let format = Self::format(url)?;
        Ok(ArchiveDescriptor {
            url: url.to_string(),
            channel,
            format,
        })
    }
}
