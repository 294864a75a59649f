//! impdex - which conda package provides an importable module
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_panics_doc)]
//!
//! Builds and queries a catalog of conda archives and the top-level Python
//! modules they install.
//!
//! # Architecture
//!
//! - **Pipeline**: `impdex_core` plans a batch from a listing feed, then
//!   fetches, decodes and resolves every archive with bounded concurrency.
//! - **Actor Pattern**: catalog writes are serialized through
//!   [`CatalogHandle`], which owns the SQLite connection on its own thread.
//! - **Reporter**: progress is rendered by [`ui::ConsoleReporter`].
//!
//! # Directory Layout
//!
//! ```text
//! ~/.impdex/          # or $IMPDEX_HOME
//! ├── listings.json   # listing feed (package -> archives)
//! └── catalog.db      # SQLite catalog
//! ```

pub mod cmd;
pub mod store;
pub mod ui;

pub use crate::store::{Catalog, CatalogHandle};
pub use impdex_core::paths::*;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "impdex")]
#[command(author, version, about = "impdex - which conda package provides an importable module")]
pub struct Cli {
    /// Increase output (-v per-archive progress, -vv debug logs)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Catalog database [default: ~/.impdex/catalog.db]
    #[arg(long, env = "IMPDEX_CATALOG", global = true)]
    pub catalog: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Ingest the newest archive of every package in a listing feed
    Build {
        /// Listing feed JSON [default: ~/.impdex/listings.json]
        #[arg(long, env = "IMPDEX_LISTINGS")]
        listings: Option<PathBuf>,
        /// Archives fetched and decoded at once
        #[arg(long, env = "IMPDEX_CONCURRENCY", default_value_t = impdex_core::config::DEFAULT_CONCURRENCY)]
        concurrency: usize,
        /// Fetch attempts per archive before the batch is aborted
        #[arg(long, env = "IMPDEX_RETRIES", default_value_t = impdex_core::config::DEFAULT_RETRIES)]
        retries: u32,
        /// Per-request timeout in seconds
        #[arg(long, default_value_t = 60)]
        timeout: u64,
        /// Resume at this package (alphabetical order)
        #[arg(long)]
        start_from: Option<String>,
        /// Only ingest these packages (comma separated)
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,
        /// Skip packages that already have a catalog row
        #[arg(long)]
        skip_existing: bool,
        /// Do not verify native extension modules with nm
        #[arg(long)]
        no_verify: bool,
    },
    /// Find packages that provide an importable module
    Lookup {
        /// Module name, e.g. `yaml`
        module: String,
    },
    /// Show catalog rows for a package
    Package {
        /// Package name
        name: String,
    },
    /// Show the catalog row for an archive filename
    File {
        /// Archive filename, e.g. `tqdm-4.64.1-py39_0.conda`
        filename: String,
    },
    /// Decode a local archive and print the record it would produce
    Inspect {
        /// Path to a .conda or .tar.bz2 archive
        path: PathBuf,
        /// Source URL the archive was downloaded from (sets channel and filename)
        #[arg(long)]
        url: String,
        /// Print the record as JSON
        #[arg(long)]
        json: bool,
        /// Do not verify native extension modules with nm
        #[arg(long)]
        no_verify: bool,
    },
}
