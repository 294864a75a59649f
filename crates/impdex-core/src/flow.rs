//! Archive Flow Typestate Pattern
//!
//! Models the per-archive pipeline as explicit state transitions:
//!
//! ```text
//! PendingArchive --[fetch()]--> FetchedArchive --[decode()]--> DecodedArchive --[into_extraction()]--> Extraction
//! ```
//!
//! A record can only be produced from an archive whose container layout has
//! been validated, and the container is dropped as soon as the record exists.
//!
//! # Usage
//!
//! ```ignore
//! let pending = PendingArchive::new(descriptor);
//! let fetched = pending.fetch(&fetcher, config.retries, &reporter).await?;
//! let extraction = fetched.decode()?.into_extraction(&config.resolver, verifier.as_ref())?;
//! ```

use std::collections::HashMap;

use bytes::Bytes;
use impdex_schema::PackageRecord;
use thiserror::Error;

use crate::Reporter;
use crate::config::ResolverConfig;
use crate::detect::{ArchiveDescriptor, DetectError};
use crate::io::codec::{CodecError, Container, Section};
use crate::io::fetch::{FetchError, Fetcher, fetch_with_retry};
use crate::metadata::{InfoDocuments, MetadataError};
use crate::native::{NativeError, NativeSymbolVerifier};
use crate::site_packages::{NativeCheck, SitePackageResolver};

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error(transparent)]
    Detect(#[from] DetectError),

    #[error("Fetch failed for {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("Gave up on {url} after {attempts} attempt(s): {source}")]
    TransportExhausted {
        url: String,
        attempts: u32,
        #[source]
        source: FetchError,
    },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Native(#[from] NativeError),
}

impl ArchiveError {
    /// Whether this error must abort the whole batch.
    ///
    /// Only exhausted transport retries are fatal; everything else is a
    /// property of the single archive.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::TransportExhausted { .. })
    }
}

/// State 1: an archive that has been detected but not downloaded.
///
/// # Transitions
///
/// - [`fetch()`](Self::fetch) -> [`FetchedArchive`]
#[derive(Debug, Clone)]
pub struct PendingArchive {
    pub descriptor: ArchiveDescriptor,
}

/// State 2: the raw archive bytes are in memory.
///
/// # Transitions
///
/// - [`decode()`](Self::decode) -> [`DecodedArchive`]
#[derive(Debug)]
pub struct FetchedArchive {
    pub descriptor: ArchiveDescriptor,
    pub bytes: Bytes,
}

/// State 3: the container is open and its layout validated.
///
/// Info documents are parsed on first access and cached, so the info tarball
/// is decompressed at most once.
#[derive(Debug)]
pub struct DecodedArchive {
    descriptor: ArchiveDescriptor,
    container: Container,
    info: Option<InfoDocuments>,
}

/// The outcome of a successful pass through the flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub record: PackageRecord,
    /// Non-fatal note from site-package resolution.
    pub diagnostic: Option<String>,
}

impl PendingArchive {
    pub fn new(descriptor: ArchiveDescriptor) -> Self {
        Self { descriptor }
    }

    /// Download the archive, retrying transient failures up to `attempts` times.
    ///
    /// # Errors
    ///
    /// [`ArchiveError::TransportExhausted`] when every attempt failed
    /// transiently, [`ArchiveError::Fetch`] on a permanent failure.
    pub async fn fetch<F, R>(
        self,
        fetcher: &F,
        attempts: u32,
        reporter: &R,
    ) -> Result<FetchedArchive, ArchiveError>
    where
        F: Fetcher + ?Sized,
        R: Reporter + ?Sized,
    {
        let url = self.descriptor.url.as_str();
        match fetch_with_retry(fetcher, url, attempts, reporter).await {
            Ok(bytes) => Ok(FetchedArchive {
                descriptor: self.descriptor,
                bytes,
            }),
            Err(failure) if failure.is_exhausted() => Err(ArchiveError::TransportExhausted {
                url: url.to_string(),
                attempts: failure.attempts,
                source: failure.source,
            }),
            Err(failure) => Err(ArchiveError::Fetch {
                url: url.to_string(),
                source: failure.source,
            }),
        }
    }
}

impl FetchedArchive {
    /// Wrap bytes obtained elsewhere (e.g. a local file).
    pub fn new(descriptor: ArchiveDescriptor, bytes: Bytes) -> Self {
        Self { descriptor, bytes }
    }

    /// Open the container and validate its layout.
    pub fn decode(self) -> Result<DecodedArchive, ArchiveError> {
        let container = Container::open(self.descriptor.format, self.bytes)?;
        Ok(DecodedArchive {
            descriptor: self.descriptor,
            container,
            info: None,
        })
    }
}

impl DecodedArchive {
    fn read_info(&mut self) -> Result<InfoDocuments, ArchiveError> {
        let files = self
            .container
            .extract(Section::Info, &InfoDocuments::MEMBERS)?;
        Ok(InfoDocuments::from_members(&files)?)
    }

    /// The parsed info documents, decoding them on first call.
    pub fn info(&mut self) -> Result<&InfoDocuments, ArchiveError> {
        let info = match self.info.take() {
            Some(info) => info,
            None => self.read_info()?,
        };
        Ok(self.info.insert(info))
    }

    /// Produce the catalog record, consuming the archive.
    ///
    /// Native extension candidates are extracted from the payload in one pass
    /// and passed to `verifier`; without one they are left unverified and
    /// dropped.
    pub fn into_extraction(
        mut self,
        resolver: &ResolverConfig,
        verifier: Option<&NativeSymbolVerifier>,
    ) -> Result<Extraction, ArchiveError> {
        let info = match self.info.take() {
            Some(info) => info,
            None => self.read_info()?,
        };
        let package_name = info.package_name()?;
        let paths = info.installed_paths()?;
        let resolver = SitePackageResolver::new(resolver);

        let natives = match verifier {
            Some(_) => {
                let candidates = resolver.native_candidates(&package_name, paths.iter().copied());
                self.container.extract(Section::Payload, &candidates)?
            }
            None => HashMap::new(),
        };

        let resolution = resolver.resolve(
            &package_name,
            paths.iter().copied(),
            |member| -> Result<NativeCheck, ArchiveError> {
                let Some(verifier) = verifier else {
                    return Ok(NativeCheck::Unverified);
                };
                let bytes = natives.get(member).map(Vec::as_slice).unwrap_or_default();
                Ok(match verifier.verify(member, bytes)? {
                    Some(module) => NativeCheck::Module(module),
                    None => NativeCheck::NoEntryPoint,
                })
            },
        )?;

        let record = PackageRecord {
            package_name,
            imported_names: resolution.imported_names,
            channel: self.descriptor.channel,
            depends: info.depends()?,
            filename: self.descriptor.filename().to_string(),
            url: self.descriptor.url.clone(),
            version: info.version()?,
            root_package_names: info.root_package_names()?,
        };

        Ok(Extraction {
            record,
            diagnostic: resolution.diagnostic,
        })
    }
}

/// Decode `fetched` and produce its record in one blocking step.
pub fn extract(
    fetched: FetchedArchive,
    resolver: &ResolverConfig,
    verifier: Option<&NativeSymbolVerifier>,
) -> Result<Extraction, ArchiveError> {
    fetched.decode()?.into_extraction(resolver, verifier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NullReporter;
    use crate::detect::ArchiveDetector;
    use crate::fixtures::{CondaBuilder, about_json, bz2_tarball, index_json, paths_json};
    use crate::native::SymbolLister;
    use async_trait::async_trait;
    use serde_json::json;
    use std::path::Path;
    use std::sync::Arc;

    const FOO_URL: &str = "https://conda.anaconda.org/conda-forge/noarch/foo-1.0-0.conda";

    fn fetched(url: &str, bytes: Bytes) -> FetchedArchive {
        FetchedArchive::new(ArchiveDetector::default().detect(url).unwrap(), bytes)
    }

    fn foo_archive() -> Bytes {
        CondaBuilder::new("foo-1.0-0")
            .package(
                "foo",
                "1.0",
                &["bar"],
                &[
                    "lib/python3.9/site-packages/foo/__init__.py",
                    "lib/python3.9/site-packages/foo-1.0.dist-info/METADATA",
                ],
            )
            .build()
    }

    #[test]
    fn test_end_to_end_record() {
        let extraction = extract(
            fetched(FOO_URL, foo_archive()),
            &ResolverConfig::default(),
            None,
        )
        .unwrap();

        let record = extraction.record;
        assert_eq!(record.package_name, "foo");
        assert_eq!(record.imported_names.as_deref(), Some("foo"));
        assert_eq!(record.version, "1.0");
        assert_eq!(record.root_package_names, "foo");
        assert_eq!(record.depends, r#"["bar"]"#);
        assert_eq!(record.filename, "foo-1.0-0.conda");
        assert_eq!(record.url, FOO_URL);
        assert_eq!(extraction.diagnostic, None);
    }

    #[test]
    fn test_info_is_cached() {
        let mut decoded = fetched(FOO_URL, foo_archive()).decode().unwrap();
        assert!(decoded.info.is_none());
        let name = decoded.info().unwrap().package_name().unwrap();
        assert!(decoded.info.is_some());
        assert_eq!(decoded.info().unwrap().package_name().unwrap(), name);
    }

    #[test]
    fn test_metapackage_has_no_imported_names() {
        let bytes = CondaBuilder::new("meta-1.0-0")
            .package("meta", "1.0", &["foo", "bar"], &["share/meta/README"])
            .build();
        let extraction = extract(
            fetched(
                "https://repo.anaconda.com/pkgs/main/noarch/meta-1.0-0.conda",
                bytes,
            ),
            &ResolverConfig::default(),
            None,
        )
        .unwrap();
        assert_eq!(extraction.record.imported_names, None);
        assert!(extraction.diagnostic.is_some());
    }

    #[test]
    fn test_missing_info_member_is_codec_error() {
        let bytes = CondaBuilder::new("foo-1.0-0")
            .info_file("info/index.json", &index_json("foo", "1.0", &[]))
            .build();
        let err = extract(fetched(FOO_URL, bytes), &ResolverConfig::default(), None).unwrap_err();
        assert!(matches!(err, ArchiveError::Codec(CodecError::MissingMember(_))));
        assert!(!err.is_fatal());
    }

    #[derive(Debug)]
    struct OneEntryPoint;

    impl SymbolLister for OneEntryPoint {
        fn defined_dynamic_symbols(&self, object: &Path) -> Result<Vec<String>, NativeError> {
            assert_eq!(std::fs::read(object)?, b"\x7fELF-bar");
            Ok(vec!["PyInit__bar".to_string()])
        }
    }

    #[test]
    fn test_flat_archive_with_native_module() {
        let so = "lib/python3.10/site-packages/_bar.cpython-310-x86_64-linux-gnu.so";
        let bytes = bz2_tarball(&[
            (
                "info/index.json",
                index_json("bar", "2.1", &["python >=3.10"]).as_slice(),
            ),
            (
                "info/about.json",
                about_json(json!([{"name": "bar"}])).as_slice(),
            ),
            (
                "info/paths.json",
                paths_json(&[so, "lib/python3.10/site-packages/bar.py"]).as_slice(),
            ),
            (so, b"\x7fELF-bar".as_slice()),
            ("lib/python3.10/site-packages/bar.py", b"".as_slice()),
        ]);
        let verifier = NativeSymbolVerifier::new(Arc::new(OneEntryPoint), "PyInit_");
        let extraction = extract(
            fetched(
                "https://conda.anaconda.org/conda-forge/linux-64/bar-2.1-0.tar.bz2",
                bytes,
            ),
            &ResolverConfig::default(),
            Some(&verifier),
        )
        .unwrap();
        assert_eq!(extraction.record.imported_names.as_deref(), Some("bar,_bar"));
        assert_eq!(extraction.record.root_package_names, "bar");
    }

    /// Exports an entry point only for the `_foo` object.
    #[derive(Debug)]
    struct ByContents;

    impl SymbolLister for ByContents {
        fn defined_dynamic_symbols(&self, object: &Path) -> Result<Vec<String>, NativeError> {
            Ok(match std::fs::read(object)?.as_slice() {
                b"\x7fELF-foo" => vec!["PyInit__foo".to_string()],
                _ => vec!["helper_init".to_string()],
            })
        }
    }

    #[test]
    fn test_nested_archive_with_several_natives() {
        let foo = "lib/python3.9/site-packages/_foo.cpython-39-x86_64-linux-gnu.so";
        let helper = "lib/python3.9/site-packages/libhelper.so";
        let bytes = CondaBuilder::new("foo-1.0-0")
            .package("foo", "1.0", &[], &[foo, helper])
            .pkg_file(foo, b"\x7fELF-foo")
            .pkg_file(helper, b"\x7fELF-helper")
            .build();
        let verifier = NativeSymbolVerifier::new(Arc::new(ByContents), "PyInit_");

        let extraction = extract(
            fetched(FOO_URL, bytes),
            &ResolverConfig::default(),
            Some(&verifier),
        )
        .unwrap();
        assert_eq!(extraction.record.imported_names.as_deref(), Some("_foo"));
        assert_eq!(
            extraction.diagnostic.as_deref(),
            Some("native library without module entry point: libhelper.so")
        );
    }

    #[test]
    fn test_native_without_verifier_is_dropped() {
        let so = "lib/python3.9/site-packages/_foo.cpython-39-x86_64-linux-gnu.so";
        let bytes = CondaBuilder::new("foo-1.0-0")
            .package("foo", "1.0", &[], &[so])
            .pkg_file(so, b"\x7fELF")
            .build();
        let extraction = extract(fetched(FOO_URL, bytes), &ResolverConfig::default(), None).unwrap();
        assert_eq!(extraction.record.imported_names, None);
        assert!(
            extraction
                .diagnostic
                .unwrap()
                .contains("unverified native module(s): _foo.cpython-39-x86_64-linux-gnu.so")
        );
    }

    /// Serves a fixed status.
    struct Failing(u16);

    #[async_trait]
    impl Fetcher for Failing {
        async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
            Err(FetchError::Status {
                status: self.0,
                url: url.to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_fetch_error_classification() {
        let descriptor = ArchiveDetector::default().detect(FOO_URL).unwrap();

        let err = PendingArchive::new(descriptor.clone())
            .fetch(&Failing(404), 3, &NullReporter)
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Fetch { .. }));
        assert!(!err.is_fatal());

        let err = PendingArchive::new(descriptor)
            .fetch(&Failing(502), 3, &NullReporter)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::TransportExhausted { attempts: 3, .. }
        ));
        assert!(err.is_fatal());
    }
}
