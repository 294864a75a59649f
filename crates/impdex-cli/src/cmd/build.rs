//! Build command

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use impdex_core::io::fetch::{Fetcher, HttpFetcher};
use impdex_core::native::NativeSymbolVerifier;
use impdex_core::{
    ArchiveDetector, BatchSummary, IngestConfig, Orchestrator, PlanOptions, Reporter, plan_batch,
};
use impdex_schema::{Listing, PackageName};

use crate::cmd::native_verifier;
use crate::store::{Catalog, CatalogHandle};
use crate::ui::ConsoleReporter;

/// Flags of `impdex build`, with paths already resolved.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub listings: PathBuf,
    pub catalog: PathBuf,
    pub concurrency: usize,
    pub retries: u32,
    pub timeout: Duration,
    pub start_from: Option<String>,
    pub only: Vec<String>,
    pub skip_existing: bool,
    pub verify: bool,
    pub verbose: bool,
}

impl BuildOptions {
    fn plan_options(&self) -> PlanOptions {
        PlanOptions {
            start_from: self.start_from.as_deref().map(PackageName::new),
            only: (!self.only.is_empty())
                .then(|| self.only.iter().map(String::as_str).map(PackageName::new).collect()),
            skip: HashSet::new(),
        }
    }
}

/// Everything [`ingest`] needs besides its I/O endpoints.
#[derive(Debug, Clone, Default)]
pub struct IngestRequest {
    pub config: IngestConfig,
    pub options: PlanOptions,
    /// Add every package already in the catalog to `options.skip`.
    pub skip_existing: bool,
    pub verifier: Option<NativeSymbolVerifier>,
}

/// Ingest the listing feed into the catalog over HTTP.
pub async fn build(opts: &BuildOptions) -> Result<BatchSummary> {
    let reporter = Arc::new(ConsoleReporter::stderr(opts.verbose));

    let mut config = IngestConfig::default()
        .with_concurrency(opts.concurrency)
        .with_retries(opts.retries);
    config.request_timeout = opts.timeout;

    let listing = Listing::load(&opts.listings)
        .with_context(|| format!("Failed to load listing feed {}", opts.listings.display()))?;
    let catalog = Catalog::open_at(&opts.catalog)
        .with_context(|| format!("Failed to open catalog {}", opts.catalog.display()))?;
    let fetcher = HttpFetcher::new(config.request_timeout).context("Failed to build HTTP client")?;

    let verifier = if opts.verify {
        native_verifier(&config.entry_point_prefix, &reporter)
    } else {
        None
    };

    let request = IngestRequest {
        config,
        options: opts.plan_options(),
        skip_existing: opts.skip_existing,
        verifier,
    };
    ingest(fetcher, catalog, &listing, request, reporter).await
}

/// Plan a batch from `listing` and run it into `catalog`.
///
/// The catalog is moved onto its writer thread for the duration of the run.
pub async fn ingest<F, R>(
    fetcher: F,
    catalog: Catalog,
    listing: &Listing,
    request: IngestRequest,
    reporter: R,
) -> Result<BatchSummary>
where
    F: Fetcher,
    R: Reporter,
{
    let IngestRequest {
        config,
        mut options,
        skip_existing,
        verifier,
    } = request;

    if skip_existing {
        for (name, _) in listing.iter() {
            if catalog
                .exists(name)
                .with_context(|| format!("Failed to look up {name} in the catalog"))?
            {
                options.skip.insert(name.clone());
            }
        }
        tracing::info!(packages = options.skip.len(), "skipping cataloged packages");
    }

    let detector = ArchiveDetector::new(config.channels.clone());
    let plan = plan_batch(listing, &detector, &options).context("Batch planning failed")?;

    let handle = CatalogHandle::spawn_with(catalog);
    let mut orchestrator = Orchestrator::new(fetcher, handle.clone(), reporter, config);
    if let Some(verifier) = verifier {
        orchestrator = orchestrator.with_verifier(verifier);
    }

    let result = orchestrator.run(plan).await;
    handle.shutdown();
    result.context("Batch aborted")
}
