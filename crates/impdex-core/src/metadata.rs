//! Parsing of the `info/` documents shipped in every archive.

use std::collections::HashMap;

use impdex_schema::{ABOUT_JSON, INDEX_JSON, PATHS_JSON, PackageName, Version};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Missing field `{field}` in {document}")]
    MissingMetadataField {
        document: &'static str,
        field: &'static str,
    },

    #[error("Invalid JSON in {document}: {source}")]
    InvalidMetadataEncoding {
        document: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// `info/index.json`
#[derive(Debug, Clone, Deserialize)]
pub struct IndexDocument {
    pub name: Option<String>,
    pub version: Option<String>,
    pub depends: Option<Vec<String>>,
}

/// `info/about.json`
#[derive(Debug, Clone, Deserialize)]
pub struct AboutDocument {
    pub root_pkgs: Option<Vec<RootPackage>>,
}

/// A `root_pkgs` entry: either a `"name version build"` spec string or an
/// object carrying a `name` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RootPackage {
    Spec(String),
    Entry { name: Option<String> },
}

/// `info/paths.json`
#[derive(Debug, Clone, Deserialize)]
pub struct PathsManifest {
    pub paths: Option<Vec<PathEntry>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathEntry {
    #[serde(rename = "_path")]
    pub path: Option<String>,
}

/// The three parsed info documents of one archive.
#[derive(Debug, Clone)]
pub struct InfoDocuments {
    pub paths: PathsManifest,
    pub about: AboutDocument,
    pub index: IndexDocument,
}

fn parse_document<T: DeserializeOwned>(
    document: &'static str,
    bytes: &[u8],
) -> Result<T, MetadataError> {
    serde_json::from_slice(bytes)
        .map_err(|source| MetadataError::InvalidMetadataEncoding { document, source })
}

fn required<T>(
    value: Option<T>,
    document: &'static str,
    field: &'static str,
) -> Result<T, MetadataError> {
    value.ok_or(MetadataError::MissingMetadataField { document, field })
}

impl InfoDocuments {
    /// Archive members holding the info documents.
    pub const MEMBERS: [&'static str; 3] = [PATHS_JSON, ABOUT_JSON, INDEX_JSON];

    pub fn parse(paths: &[u8], about: &[u8], index: &[u8]) -> Result<Self, MetadataError> {
        Ok(Self {
            paths: parse_document(PATHS_JSON, paths)?,
            about: parse_document(ABOUT_JSON, about)?,
            index: parse_document(INDEX_JSON, index)?,
        })
    }

    /// Parse from the output of a container extraction of [`Self::MEMBERS`].
    pub fn from_members(files: &HashMap<String, Vec<u8>>) -> Result<Self, MetadataError> {
        fn member<'a>(files: &'a HashMap<String, Vec<u8>>, name: &str) -> &'a [u8] {
            files.get(name).map(Vec::as_slice).unwrap_or_default()
        }
        Self::parse(
            member(files, PATHS_JSON),
            member(files, ABOUT_JSON),
            member(files, INDEX_JSON),
        )
    }

    pub fn package_name(&self) -> Result<PackageName, MetadataError> {
        required(self.index.name.as_deref(), INDEX_JSON, "name").map(PackageName::new)
    }

    pub fn version(&self) -> Result<Version, MetadataError> {
        required(self.index.version.as_deref(), INDEX_JSON, "version").map(Version::new)
    }

    /// Dependency specs serialized as a JSON array string, e.g. `["bar >=1.0"]`.
    pub fn depends(&self) -> Result<String, MetadataError> {
        let depends = required(self.index.depends.as_ref(), INDEX_JSON, "depends")?;
        serde_json::to_string(depends).map_err(|source| MetadataError::InvalidMetadataEncoding {
            document: INDEX_JSON,
            source,
        })
    }

    /// Space-joined names of the root packages, stripped of version and build.
    pub fn root_package_names(&self) -> Result<String, MetadataError> {
        let roots = required(self.about.root_pkgs.as_ref(), ABOUT_JSON, "root_pkgs")?;
        let names = roots
            .iter()
            .map(|root| -> Result<&str, MetadataError> {
                let spec = match root {
                    RootPackage::Spec(spec) => spec.as_str(),
                    RootPackage::Entry { name } => {
                        required(name.as_deref(), ABOUT_JSON, "root_pkgs[].name")?
                    }
                };
                Ok(spec.split(' ').next().unwrap_or_default())
            })
            .collect::<Result<Vec<_>, MetadataError>>()?;
        Ok(names.join(" "))
    }

    /// Installed file paths, in manifest order.
    pub fn installed_paths(&self) -> Result<Vec<&str>, MetadataError> {
        required(self.paths.paths.as_ref(), PATHS_JSON, "paths")?
            .iter()
            .map(|entry| required(entry.path.as_deref(), PATHS_JSON, "paths[]._path"))
            .collect()
    }
}
