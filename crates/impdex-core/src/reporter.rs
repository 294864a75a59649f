//! Reporter trait for dependency injection
//!
//! This trait allows the pipeline to report progress and status without
//! being coupled to a specific terminal implementation.

use impdex_schema::{PackageName, PackageRecord};

use crate::orchestrator::BatchSummary;

pub trait Reporter: Send + Sync {
    /// Indicates a new phase has started (e.g. "Planning", "Fetching").
    fn section(&self, title: &str);

    /// A package was dropped during planning.
    fn planning_skipped(&self, name: &PackageName, reason: &str);

    /// A fetch attempt for an archive has started.
    fn fetching(&self, url: &str, attempt: u32);

    /// A transient failure occurred and the fetch will be retried.
    fn retrying(&self, url: &str, attempt: u32, reason: &str);

    /// A record was written to the catalog.
    fn recorded(&self, record: &PackageRecord);

    /// The catalog already held an identical record.
    fn already_present(&self, record: &PackageRecord);

    /// An archive was abandoned because it is malformed.
    fn skipped(&self, url: &str, reason: &str);

    /// A non-fatal note about an archive (e.g. no importable names).
    fn diagnostic(&self, url: &str, msg: &str);

    /// Log a warning message.
    fn warning(&self, msg: &str);

    /// Log an error message.
    fn error(&self, msg: &str);

    /// Display the final counts of a batch.
    fn summary(&self, summary: &BatchSummary, elapsed_secs: f64);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn section(&self, title: &str) {
        (**self).section(title);
    }
    fn planning_skipped(&self, name: &PackageName, reason: &str) {
        (**self).planning_skipped(name, reason);
    }
    fn fetching(&self, url: &str, attempt: u32) {
        (**self).fetching(url, attempt);
    }
    fn retrying(&self, url: &str, attempt: u32, reason: &str) {
        (**self).retrying(url, attempt, reason);
    }
    fn recorded(&self, record: &PackageRecord) {
        (**self).recorded(record);
    }
    fn already_present(&self, record: &PackageRecord) {
        (**self).already_present(record);
    }
    fn skipped(&self, url: &str, reason: &str) {
        (**self).skipped(url, reason);
    }
    fn diagnostic(&self, url: &str, msg: &str) {
        (**self).diagnostic(url, msg);
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg);
    }
    fn error(&self, msg: &str) {
        (**self).error(msg);
    }
    fn summary(&self, summary: &BatchSummary, elapsed_secs: f64) {
        (**self).summary(summary, elapsed_secs);
    }
}

/// A no-op reporter for silent operations (e.g., testing).
#[derive(Debug, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn section(&self, _: &str) {}
    fn planning_skipped(&self, _: &PackageName, _: &str) {}
    fn fetching(&self, _: &str, _: u32) {}
    fn retrying(&self, _: &str, _: u32, _: &str) {}
    fn recorded(&self, _: &PackageRecord) {}
    fn already_present(&self, _: &PackageRecord) {}
    fn skipped(&self, _: &str, _: &str) {}
    fn diagnostic(&self, _: &str, _: &str) {}
    fn warning(&self, _: &str) {}
    fn error(&self, _: &str) {}
    fn summary(&self, _: &BatchSummary, _: f64) {}
}
