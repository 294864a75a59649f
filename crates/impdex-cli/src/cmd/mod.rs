//! Command handlers

pub mod build;
pub mod inspect;
pub mod lookup;

use std::path::PathBuf;

use anyhow::{Result, anyhow};

/// `--catalog` if given, else `~/.impdex/catalog.db`.
pub fn catalog_path_or_default(catalog: Option<PathBuf>) -> Result<PathBuf> {
    catalog
        .or_else(crate::catalog_path)
        .ok_or_else(|| anyhow!("Cannot locate home directory; pass --catalog or set IMPDEX_HOME"))
}

/// Native verifier backed by `nm`, or `None` (with a warning) when it is missing.
pub fn native_verifier<R: impdex_core::Reporter>(
    prefix: &str,
    reporter: &R,
) -> Option<impdex_core::native::NativeSymbolVerifier> {
    use impdex_core::native::{NativeSymbolVerifier, NmSymbolLister};

    match NmSymbolLister::locate() {
        Ok(lister) => Some(NativeSymbolVerifier::new(std::sync::Arc::new(lister), prefix)),
        Err(e) => {
            reporter.warning(&format!(
                "{e}; native extension modules will not be verified"
            ));
            None
        }
    }
}
