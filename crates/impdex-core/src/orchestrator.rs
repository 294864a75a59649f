//! Batch planning and bounded-concurrency ingestion.
//!
//! Planning turns a listing feed into one descriptor per package (the newest
//! archive). The orchestrator then fetches, decodes and records those
//! descriptors with at most `concurrency` archives in flight. Completions
//! arrive in any order and are matched back to their archive by URL.
//!
//! Malformed archives are reported and skipped. An exhausted retry budget or
//! a catalog failure aborts the batch, dropping every in-flight fetch.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::StreamExt;
use impdex_schema::{Channel, InsertOutcome, Listing, PackageName, PackageRecord};
use thiserror::Error;
use tracing::{debug, info};

use crate::Reporter;
use crate::config::{IngestConfig, ResolverConfig};
use crate::detect::{ArchiveDescriptor, ArchiveDetector, DetectError};
use crate::flow::{self, ArchiveError, Extraction, PendingArchive};
use crate::io::fetch::Fetcher;
use crate::native::NativeSymbolVerifier;
use crate::version::{SelectError, VersionError, select_latest};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogWriteError {
    #[error("A different record is already stored for ({channel}, {filename})")]
    DuplicateKey { channel: Channel, filename: String },

    #[error("Catalog storage error: {0}")]
    Storage(String),
}

/// Where finished records go. Implementations must serialize writes.
#[async_trait]
pub trait CatalogSink: Send + Sync {
    /// Store `record`, treating an identical existing row as a no-op.
    async fn record(&self, record: &PackageRecord) -> Result<InsertOutcome, CatalogWriteError>;
}

#[async_trait]
impl<T: CatalogSink + ?Sized> CatalogSink for Arc<T> {
    async fn record(&self, record: &PackageRecord) -> Result<InsertOutcome, CatalogWriteError> {
        (**self).record(record).await
    }
}

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("Cannot order versions of {package}: {source}")]
    Version {
        package: PackageName,
        #[source]
        source: VersionError,
    },
}

/// Why a package was left out of a batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanSkip {
    #[error("no .conda or .tar.bz2 archive among {0} candidate(s)")]
    NoEligibleArchive(usize),

    #[error(transparent)]
    Detect(#[from] DetectError),
}

/// Package filters applied while planning.
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// Resume at this package name (alphabetical order).
    pub start_from: Option<PackageName>,
    /// Restrict the batch to these packages.
    pub only: Option<HashSet<PackageName>>,
    /// Leave these packages out (e.g. already cataloged).
    pub skip: HashSet<PackageName>,
}

impl PlanOptions {
    fn admits(&self, name: &PackageName) -> bool {
        if self
            .start_from
            .as_ref()
            .is_some_and(|start| name.as_str() < start.as_str())
        {
            return false;
        }
        if self.only.as_ref().is_some_and(|only| !only.contains(name)) {
            return false;
        }
        !self.skip.contains(name)
    }
}

/// The archives chosen for one batch, in package order.
#[derive(Debug, Clone, Default)]
pub struct BatchPlan {
    pub archives: Vec<ArchiveDescriptor>,
    pub skipped: Vec<(PackageName, PlanSkip)>,
}

/// Select the newest archive of every admitted package and detect its layout.
///
/// # Errors
///
/// An unparseable version aborts planning: it means the version grammar has
/// changed and any ordering would be a guess.
pub fn plan_batch(
    listing: &Listing,
    detector: &ArchiveDetector,
    options: &PlanOptions,
) -> Result<BatchPlan, PlanError> {
    let mut plan = BatchPlan::default();

    for (name, entries) in listing.iter().filter(|(name, _)| options.admits(name)) {
        let selected = match select_latest(entries) {
            Ok(entry) => entry,
            Err(SelectError::NoEligibleArchive(n)) => {
                plan.skipped
                    .push((name.clone(), PlanSkip::NoEligibleArchive(n)));
                continue;
            }
            Err(SelectError::Version(source)) => {
                return Err(PlanError::Version {
                    package: name.clone(),
                    source,
                });
            }
        };

        match detector.detect(&selected.url) {
            Ok(descriptor) => {
                debug!(package = %name, url = %descriptor.url, "planned");
                plan.archives.push(descriptor);
            }
            Err(e) => plan.skipped.push((name.clone(), e.into())),
        }
    }

    Ok(plan)
}

/// Final counts of a batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// New rows written.
    pub inserted: usize,
    /// Identical rows that were already cataloged.
    pub already_present: usize,
    /// Archives abandoned as malformed or unavailable.
    pub skipped_format: usize,
    /// Recorded archives without any importable name.
    pub without_import_name: usize,
    /// Packages dropped during planning.
    pub skipped_planning: usize,
}

#[derive(Error, Debug)]
pub enum BatchError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("Catalog write failed: {0}")]
    Catalog(#[from] CatalogWriteError),

    #[error("Worker task failed: {0}")]
    Worker(String),
}

enum ArchiveOutcome {
    Recorded {
        outcome: InsertOutcome,
        without_import_name: bool,
    },
    Skipped,
}

/// Drives a batch through fetch, decode and catalog insertion.
pub struct Orchestrator<F, S, R> {
    fetcher: F,
    sink: S,
    reporter: R,
    config: IngestConfig,
    resolver: Arc<ResolverConfig>,
    verifier: Option<NativeSymbolVerifier>,
}

impl<F, S, R> Orchestrator<F, S, R>
where
    F: Fetcher,
    S: CatalogSink,
    R: Reporter,
{
    pub fn new(fetcher: F, sink: S, reporter: R, config: IngestConfig) -> Self {
        let resolver = Arc::new(config.resolver.clone());
        Self {
            fetcher,
            sink,
            reporter,
            config,
            resolver,
            verifier: None,
        }
    }

    /// Verify native extension candidates with `verifier`.
    pub fn with_verifier(mut self, verifier: NativeSymbolVerifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Run `plan` to completion or to the first fatal error.
    pub async fn run(&self, plan: BatchPlan) -> Result<BatchSummary, BatchError> {
        let started = Instant::now();
        let mut summary = BatchSummary {
            skipped_planning: plan.skipped.len(),
            ..BatchSummary::default()
        };

        if !plan.skipped.is_empty() {
            self.reporter.section("Planning");
            for (name, reason) in &plan.skipped {
                self.reporter.planning_skipped(name, &reason.to_string());
            }
        }

        self.reporter.section("Fetching");
        info!(
            archives = plan.archives.len(),
            concurrency = self.config.concurrency,
            "starting batch"
        );

        let mut outcomes = futures::stream::iter(plan.archives)
            .map(|descriptor| self.process(descriptor))
            .buffer_unordered(self.config.concurrency.max(1));

        while let Some(outcome) = outcomes.next().await {
            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.reporter
                        .error(&format!("{e}; cancelling in-flight archives"));
                    return Err(e);
                }
            };
            match outcome {
                ArchiveOutcome::Recorded {
                    outcome,
                    without_import_name,
                } => {
                    match outcome {
                        InsertOutcome::Inserted => summary.inserted += 1,
                        InsertOutcome::AlreadyPresent => summary.already_present += 1,
                    }
                    if without_import_name {
                        summary.without_import_name += 1;
                    }
                }
                ArchiveOutcome::Skipped => summary.skipped_format += 1,
            }
        }

        self.reporter
            .summary(&summary, started.elapsed().as_secs_f64());
        Ok(summary)
    }

    async fn process(&self, descriptor: ArchiveDescriptor) -> Result<ArchiveOutcome, BatchError> {
        let url = descriptor.url.clone();

        let fetched = match PendingArchive::new(descriptor)
            .fetch(&self.fetcher, self.config.retries, &self.reporter)
            .await
        {
            Ok(fetched) => fetched,
            Err(e) => return self.skip_or_abort(&url, e),
        };

        let resolver = Arc::clone(&self.resolver);
        let verifier = self.verifier.clone();
        let extraction = tokio::task::spawn_blocking(move || {
            flow::extract(fetched, &resolver, verifier.as_ref())
        })
        .await
        .map_err(|e| BatchError::Worker(e.to_string()))?;

        let Extraction { record, diagnostic } = match extraction {
            Ok(extraction) => extraction,
            Err(e) => return self.skip_or_abort(&url, e),
        };

        if let Some(diagnostic) = &diagnostic {
            self.reporter.diagnostic(&url, diagnostic);
        }

        let outcome = self.sink.record(&record).await?;
        match outcome {
            InsertOutcome::Inserted => self.reporter.recorded(&record),
            InsertOutcome::AlreadyPresent => self.reporter.already_present(&record),
        }

        Ok(ArchiveOutcome::Recorded {
            outcome,
            without_import_name: record.imported_names.is_none(),
        })
    }

    fn skip_or_abort(&self, url: &str, e: ArchiveError) -> Result<ArchiveOutcome, BatchError> {
        if e.is_fatal() {
            return Err(e.into());
        }
        self.reporter.skipped(url, &e.to_string());
        Ok(ArchiveOutcome::Skipped)
    }
}
