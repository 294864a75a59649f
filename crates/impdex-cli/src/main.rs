//! impdex - conda import-name catalog CLI

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use impdex_core::IngestConfig;
use tracing_subscriber::EnvFilter;

use impdex_cli::cmd;
use impdex_cli::cmd::build::BuildOptions;
use impdex_cli::ui::ConsoleReporter;
use impdex_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over -v
    let default_directive = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let catalog = cmd::catalog_path_or_default(cli.catalog)?;

    match cli.command {
        Commands::Build {
            listings,
            concurrency,
            retries,
            timeout,
            start_from,
            only,
            skip_existing,
            no_verify,
        } => {
            let listings = listings
                .or_else(impdex_cli::listings_path)
                .context("Cannot locate home directory; pass --listings or set IMPDEX_HOME")?;
            cmd::build::build(&BuildOptions {
                listings,
                catalog,
                concurrency,
                retries,
                timeout: Duration::from_secs(timeout),
                start_from,
                only,
                skip_existing,
                verify: !no_verify,
                verbose: cli.verbose > 0,
            })
            .await?;
            Ok(())
        }
        Commands::Lookup { module } => cmd::lookup::lookup(&catalog, &module).map(drop),
        Commands::Package { name } => cmd::lookup::package(&catalog, &name).map(drop),
        Commands::File { filename } => cmd::lookup::file(&catalog, &filename).map(drop),
        Commands::Inspect {
            path,
            url,
            json,
            no_verify,
        } => {
            let verifier = if no_verify {
                None
            } else {
                let prefix = IngestConfig::default().entry_point_prefix;
                cmd::native_verifier(&prefix, &ConsoleReporter::stderr(false))
            };
            cmd::inspect::inspect(&path, &url, json, verifier.as_ref()).map(drop)
        }
    }
}
