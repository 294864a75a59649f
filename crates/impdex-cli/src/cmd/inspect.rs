//! Inspect command

use std::path::Path;

use anyhow::{Context, Result};
use bytes::Bytes;
use crossterm::style::Stylize;
use impdex_core::flow::{self, FetchedArchive};
use impdex_core::native::NativeSymbolVerifier;
use impdex_core::{ArchiveDetector, Extraction, ResolverConfig};

use crate::ui::table::record_detail;

/// Decode the archive at `path` as if it had been fetched from `url`.
///
/// Nothing is written to the catalog.
pub fn inspect(
    path: &Path,
    url: &str,
    json: bool,
    verifier: Option<&NativeSymbolVerifier>,
) -> Result<Extraction> {
    let extraction = extract_local(path, url, verifier)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&extraction.record).context("Failed to encode record")?
        );
    } else {
        println!("{}", record_detail(&extraction.record));
    }
    if let Some(diagnostic) = &extraction.diagnostic {
        eprintln!("{} {}", "note:".yellow(), diagnostic);
    }
    Ok(extraction)
}

/// Produce the record for a local archive file.
pub fn extract_local(
    path: &Path,
    url: &str,
    verifier: Option<&NativeSymbolVerifier>,
) -> Result<Extraction> {
    let descriptor = ArchiveDetector::default()
        .detect(url)
        .with_context(|| format!("Cannot use {url} as the archive source"))?;
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;

    flow::extract(
        FetchedArchive::new(descriptor, Bytes::from(bytes)),
        &ResolverConfig::default(),
        verifier,
    )
    .with_context(|| format!("Failed to decode {}", path.display()))
}
