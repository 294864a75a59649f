//! Native extension verification.
//!
//! A shared object only counts as an importable module if it exports a
//! loader entry point (`PyInit_<name>`). The module name is taken from that
//! symbol rather than from the file name, which usually carries an ABI tag.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum NativeError {
    #[error("{member} exports more than one module entry point: {names}")]
    AmbiguousExportedModuleName { member: String, names: String },

    #[error("Symbol lister not available: {0}")]
    ToolUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Lists the defined dynamic symbols of a shared object on disk.
pub trait SymbolLister: Send + Sync + std::fmt::Debug {
    fn defined_dynamic_symbols(&self, object: &Path) -> Result<Vec<String>, NativeError>;
}

/// Runs `nm -D --defined-only`.
#[derive(Debug, Clone)]
pub struct NmSymbolLister {
    nm: PathBuf,
}

impl NmSymbolLister {
    /// Find `nm` on `PATH`.
    pub fn locate() -> Result<Self, NativeError> {
        which::which("nm")
            .map(Self::new)
            .map_err(|e| NativeError::ToolUnavailable(format!("nm: {e}")))
    }

    pub fn new(nm: PathBuf) -> Self {
        Self { nm }
    }
}

impl SymbolLister for NmSymbolLister {
    fn defined_dynamic_symbols(&self, object: &Path) -> Result<Vec<String>, NativeError> {
        let output = Command::new(&self.nm)
            .args(["-D", "--defined-only"])
            .arg(object)
            .output()?;

        // nm exits non-zero for objects without a dynamic section
        if !output.status.success() {
            debug!(
                object = %object.display(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "nm found no dynamic symbols"
            );
            return Ok(Vec::new());
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|line| line.split_whitespace().next_back())
            .map(str::to_string)
            .collect())
    }
}

/// Recovers the importable name of a native extension module.
#[derive(Debug, Clone)]
pub struct NativeSymbolVerifier {
    lister: Arc<dyn SymbolLister>,
    entry_point_prefix: String,
}

impl NativeSymbolVerifier {
    pub fn new(lister: Arc<dyn SymbolLister>, entry_point_prefix: &str) -> Self {
        Self {
            lister,
            entry_point_prefix: entry_point_prefix.to_string(),
        }
    }

    /// Write `bytes` to a scoped temporary file named after `member` and
    /// derive the module name from its exported entry points.
    ///
    /// Returns `Ok(None)` when no entry point is exported. The temporary
    /// directory is removed when this returns, on success and on error.
    pub fn verify(&self, member: &str, bytes: &[u8]) -> Result<Option<String>, NativeError> {
        let scratch = tempfile::Builder::new().prefix("impdex-so-").tempdir()?;
        let file_name = member
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or("extension.so");
        let object = scratch.path().join(file_name);
        std::fs::write(&object, bytes)?;

        let symbols = self.lister.defined_dynamic_symbols(&object)?;
        self.module_name(member, &symbols)
    }

    /// Reduce a symbol table to the single module name it exports.
    pub fn module_name(
        &self,
        member: &str,
        symbols: &[String],
    ) -> Result<Option<String>, NativeError> {
        let names: BTreeSet<&str> = symbols
            .iter()
            .filter_map(|symbol| symbol.strip_prefix(self.entry_point_prefix.as_str()))
            .filter(|name| !name.is_empty())
            .collect();

        match names.len() {
            0 => Ok(None),
            1 => {
                let name = names.into_iter().collect::<String>();
                debug!(member, module = %name, "verified extension module");
                Ok(Some(name))
            }
            _ => Err(NativeError::AmbiguousExportedModuleName {
                member: member.to_string(),
                names: names.into_iter().collect::<Vec<_>>().join(","),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Returns canned symbols and remembers the path it was asked about.
    #[derive(Debug, Default)]
    struct FakeLister {
        symbols: Vec<String>,
        fail: bool,
        seen: Mutex<Option<(PathBuf, bool)>>,
    }

    impl FakeLister {
        fn with(symbols: &[&str]) -> Self {
            Self {
                symbols: symbols.iter().map(|s| (*s).to_string()).collect(),
                ..Self::default()
            }
        }
    }

    impl SymbolLister for FakeLister {
        fn defined_dynamic_symbols(&self, object: &Path) -> Result<Vec<String>, NativeError> {
            *self.seen.lock().unwrap() = Some((object.to_path_buf(), object.exists()));
            if self.fail {
                return Err(NativeError::Io(std::io::Error::other("lister crashed")));
            }
            Ok(self.symbols.clone())
        }
    }

    const MEMBER: &str = "lib/python3.9/site-packages/_foo.cpython-39-x86_64-linux-gnu.so";

    fn verifier(lister: &Arc<FakeLister>) -> NativeSymbolVerifier {
        NativeSymbolVerifier::new(lister.clone(), "PyInit_")
    }

    #[test]
    fn test_single_entry_point() {
        let lister = Arc::new(FakeLister::with(&["_init", "PyInit__foo", "__bss_start"]));
        let name = verifier(&lister).verify(MEMBER, b"\x7fELF").unwrap();
        assert_eq!(name.as_deref(), Some("_foo"));

        let (path, existed) = lister.seen.lock().unwrap().clone().unwrap();
        assert!(existed);
        assert!(path.ends_with("_foo.cpython-39-x86_64-linux-gnu.so"));
        assert!(!path.exists());
    }

    #[test]
    fn test_no_entry_point() {
        let lister = Arc::new(FakeLister::with(&["_init", "helper"]));
        assert_eq!(verifier(&lister).verify(MEMBER, b"").unwrap(), None);
    }

    #[test]
    fn test_duplicate_symbol_same_name() {
        let lister = Arc::new(FakeLister::with(&["PyInit_foo", "PyInit_foo"]));
        assert_eq!(
            verifier(&lister).verify(MEMBER, b"").unwrap().as_deref(),
            Some("foo")
        );
    }

    #[test]
    fn test_ambiguous_entry_points() {
        let lister = Arc::new(FakeLister::with(&["PyInit_foo", "PyInit_bar"]));
        let err = verifier(&lister).verify(MEMBER, b"").unwrap_err();
        assert!(
            matches!(err, NativeError::AmbiguousExportedModuleName { names, .. } if names == "bar,foo")
        );
    }

    #[test]
    fn test_temp_file_removed_on_failure() {
        let lister = Arc::new(FakeLister {
            fail: true,
            ..FakeLister::default()
        });
        assert!(verifier(&lister).verify(MEMBER, b"").is_err());
        let (path, existed) = lister.seen.lock().unwrap().clone().unwrap();
        assert!(existed);
        assert!(!path.exists());
    }
}
