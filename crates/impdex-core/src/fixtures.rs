//! Builders for synthetic archives used in tests.
//!
//! Enabled for this crate's own tests and, through the `fixtures` feature,
//! for downstream integration tests.

use std::io::{Cursor, Write};

use bytes::Bytes;
use serde_json::{Value, json};

/// Build an uncompressed tarball from `(path, contents)` pairs.
pub fn tar_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, path, *data)
            .expect("append tar entry");
    }
    builder.into_inner().expect("finish tarball")
}

/// A `.tar.zst` inner member.
pub fn zst_tarball(files: &[(&str, &[u8])]) -> Vec<u8> {
    zstd::stream::encode_all(tar_bytes(files).as_slice(), 3).expect("zstd encode")
}

/// A flat `.tar.bz2` archive.
pub fn bz2_tarball(files: &[(&str, &[u8])]) -> Bytes {
    let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
    encoder
        .write_all(&tar_bytes(files))
        .expect("bzip2 encode");
    Bytes::from(encoder.finish().expect("bzip2 finish"))
}

/// `info/index.json` contents.
pub fn index_json(name: &str, version: &str, depends: &[&str]) -> Vec<u8> {
    json!({ "name": name, "version": version, "depends": depends })
        .to_string()
        .into_bytes()
}

/// `info/about.json` contents with the given `root_pkgs` value.
pub fn about_json(root_pkgs: Value) -> Vec<u8> {
    json!({ "root_pkgs": root_pkgs }).to_string().into_bytes()
}

/// `info/paths.json` contents listing `paths`.
pub fn paths_json(paths: &[&str]) -> Vec<u8> {
    let entries: Vec<Value> = paths
        .iter()
        .map(|p| json!({ "_path": p, "path_type": "hardlink" }))
        .collect();
    json!({ "paths": entries, "paths_version": 1 })
        .to_string()
        .into_bytes()
}

/// Assembles a `.conda` zip with its two inner tarballs.
#[derive(Debug, Default)]
pub struct CondaBuilder {
    stem: String,
    info: Vec<(String, Vec<u8>)>,
    pkg: Vec<(String, Vec<u8>)>,
    raw_info: Option<Vec<u8>>,
    extra: Vec<(String, Vec<u8>)>,
}

impl CondaBuilder {
    /// `stem` is the archive name without suffix, e.g. `foo-1.0-0`.
    pub fn new(stem: &str) -> Self {
        Self {
            stem: stem.to_string(),
            ..Self::default()
        }
    }

    pub fn info_file(mut self, path: &str, data: &[u8]) -> Self {
        self.info.push((path.to_string(), data.to_vec()));
        self
    }

    pub fn pkg_file(mut self, path: &str, data: &[u8]) -> Self {
        self.pkg.push((path.to_string(), data.to_vec()));
        self
    }

    /// Use `raw` verbatim as the `info-*.tar.zst` member.
    pub fn raw_info_member(mut self, raw: Vec<u8>) -> Self {
        self.raw_info = Some(raw);
        self
    }

    /// Add a raw outer member next to the standard three.
    pub fn extra_member(mut self, name: &str, data: &[u8]) -> Self {
        self.extra.push((name.to_string(), data.to_vec()));
        self
    }

    /// Populate the three info documents for a standard package.
    pub fn package(self, name: &str, version: &str, depends: &[&str], paths: &[&str]) -> Self {
        self.info_file("info/index.json", &index_json(name, version, depends))
            .info_file(
                "info/about.json",
                &about_json(json!([format!("{name} {version}")])),
            )
            .info_file("info/paths.json", &paths_json(paths))
    }

    pub fn build(self) -> Bytes {
        let borrow = |files: &[(String, Vec<u8>)]| -> Vec<u8> {
            let refs: Vec<(&str, &[u8])> = files
                .iter()
                .map(|(p, d)| (p.as_str(), d.as_slice()))
                .collect();
            zst_tarball(&refs)
        };

        let info = match self.raw_info {
            Some(raw) => raw,
            None => borrow(&self.info),
        };
        let mut members = vec![
            (
                "metadata.json".to_string(),
                br#"{"conda_pkg_format_version": 2}"#.to_vec(),
            ),
            (format!("pkg-{}.tar.zst", self.stem), borrow(&self.pkg)),
            (format!("info-{}.tar.zst", self.stem), info),
        ];
        members.extend(self.extra);

        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (name, data) in members {
            zip.start_file(name, options).expect("start zip member");
            zip.write_all(&data).expect("write zip member");
        }
        Bytes::from(zip.finish().expect("finish zip").into_inner())
    }
}
