pub mod config;
pub mod detect;
pub mod flow;
pub mod io;
pub mod metadata;
pub mod native;
pub mod orchestrator;
pub mod paths;
pub mod site_packages;
pub mod version;

pub mod reporter;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

pub use config::{IngestConfig, ResolverConfig};
pub use detect::{ArchiveDescriptor, ArchiveDetector};
pub use flow::{ArchiveError, Extraction};
pub use orchestrator::{
    BatchError, BatchPlan, BatchSummary, CatalogSink, CatalogWriteError, Orchestrator, PlanOptions,
    plan_batch,
};
pub use paths::*;
pub use reporter::{NullReporter, Reporter};

/// User Agent string for archive fetches
pub const USER_AGENT: &str = concat!("impdex-core/", env!("CARGO_PKG_VERSION"));
