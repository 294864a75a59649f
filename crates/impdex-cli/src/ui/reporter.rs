//! Terminal implementation of the pipeline `Reporter`.
//!
//! Progress goes to stderr so lookup output on stdout stays pipeable.

use std::io::Write;
use std::sync::Mutex;

use crossterm::style::Stylize;
use impdex_core::{BatchSummary, Reporter};
use impdex_schema::{PackageName, PackageRecord};

use super::theme::{Theme, plural};

/// Line-oriented console reporter.
///
/// Per-archive lines (fetches, recorded rows) are only printed when
/// `verbose` is set; skips, retries, warnings and the summary always are.
pub struct ConsoleReporter {
    theme: Theme,
    verbose: bool,
    out: Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for ConsoleReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleReporter")
            .field("verbose", &self.verbose)
            .finish_non_exhaustive()
    }
}

impl ConsoleReporter {
    /// Report to stderr
    pub fn stderr(verbose: bool) -> Self {
        Self::with_writer(Box::new(std::io::stderr()), verbose)
    }

    pub fn with_writer(out: Box<dyn Write + Send>, verbose: bool) -> Self {
        Self {
            theme: Theme::default(),
            verbose,
            out: Mutex::new(out),
        }
    }

    fn line(&self, line: &str) {
        let mut out = match self.out.lock() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        };
        let _ = writeln!(out, "{line}");
    }
}

/// Plain-text body of the final summary line.
pub fn summary_text(summary: &BatchSummary, elapsed_secs: f64) -> String {
    let mut parts = vec![
        format!("{} inserted", summary.inserted),
        format!("{} already present", summary.already_present),
        format!("{} skipped (format)", summary.skipped_format),
        format!("{} without import name", summary.without_import_name),
    ];
    if summary.skipped_planning > 0 {
        parts.push(format!("{} skipped (planning)", summary.skipped_planning));
    }
    format!("{} in {elapsed_secs:.1}s", parts.join(", "))
}

/// `name version (imported names)` for a recorded row.
pub fn record_text(record: &PackageRecord) -> String {
    let names = record.imported_names.as_deref().unwrap_or("-");
    format!("{} {} ({names})", record.package_name, record.version)
}

impl Reporter for ConsoleReporter {
    fn section(&self, title: &str) {
        self.line("");
        self.line(&format!("{}", title.with(self.theme.colors.header).bold()));
    }

    fn planning_skipped(&self, name: &PackageName, reason: &str) {
        if self.verbose {
            self.line(&format!(
                "  {} {} {}",
                self.theme.icons.warning.with(self.theme.colors.warning),
                name.as_str().with(self.theme.colors.package_name),
                reason.with(self.theme.colors.secondary)
            ));
        }
    }

    fn fetching(&self, url: &str, attempt: u32) {
        if self.verbose && attempt == 1 {
            self.line(&format!(
                "  {} {}",
                "fetch".with(self.theme.colors.secondary),
                impdex_core::filename_from_url(url)
            ));
        }
    }

    fn retrying(&self, url: &str, attempt: u32, reason: &str) {
        self.line(&format!(
            "  {} {} attempt {attempt} failed: {}",
            self.theme.icons.retry.with(self.theme.colors.warning),
            impdex_core::filename_from_url(url),
            reason.with(self.theme.colors.secondary)
        ));
    }

    fn recorded(&self, record: &PackageRecord) {
        if self.verbose {
            self.line(&format!(
                "  {} {}",
                self.theme.icons.success.with(self.theme.colors.success),
                record_text(record)
            ));
        }
    }

    fn already_present(&self, record: &PackageRecord) {
        if self.verbose {
            self.line(&format!(
                "  {} {}",
                self.theme.icons.unchanged.with(self.theme.colors.secondary),
                record_text(record).with(self.theme.colors.secondary)
            ));
        }
    }

    fn skipped(&self, url: &str, reason: &str) {
        self.line(&format!(
            "  {} {} {}",
            self.theme.icons.error.with(self.theme.colors.error),
            impdex_core::filename_from_url(url),
            reason.with(self.theme.colors.secondary)
        ));
    }

    fn diagnostic(&self, url: &str, msg: &str) {
        if self.verbose {
            self.line(&format!(
                "  {} {} {}",
                self.theme.icons.warning.with(self.theme.colors.warning),
                impdex_core::filename_from_url(url),
                msg.with(self.theme.colors.secondary)
            ));
        }
    }

    fn warning(&self, msg: &str) {
        self.line(&format!(
            "{} {}",
            self.theme.icons.warning.with(self.theme.colors.warning),
            msg.with(self.theme.colors.warning)
        ));
    }

    fn error(&self, msg: &str) {
        self.line(&format!(
            "{} {}",
            self.theme.icons.error.with(self.theme.colors.error),
            msg.with(self.theme.colors.error)
        ));
    }

    fn summary(&self, summary: &BatchSummary, elapsed_secs: f64) {
        let archives = summary.inserted + summary.already_present + summary.skipped_format;
        self.line("");
        self.line(&format!(
            "{} {}: {}",
            self.theme.icons.success.with(self.theme.colors.success),
            plural(archives, "archive"),
            summary_text(summary, elapsed_secs)
        ));
    }
}
