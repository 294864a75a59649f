//! Archive container decoding
//!
//! Two layouts share one capability surface (`open`, `members`, `extract`):
//!
//! - `.conda`: a zip holding `metadata.json`, `info-*.tar.zst` and
//!   `pkg-*.tar.zst`. Only the requested inner tarball is decompressed, and
//!   only up to the last requested entry.
//! - `.tar.bz2`: a single bzip2 tarball, scanned once on open to build the
//!   member list and capture the info documents. Only payload extraction
//!   scans it again.

use std::collections::{HashMap, HashSet};
use std::io::{self, Cursor, Read};

use bytes::Bytes;
use impdex_schema::{
    ABOUT_JSON, ArchiveFormat, FLAT_INFO_DIR, INDEX_JSON, NESTED_INFO_PREFIX,
    NESTED_METADATA_MEMBER, NESTED_TAR_SUFFIX, PATHS_JSON,
};
use thiserror::Error;
use zip::ZipArchive;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Corrupt outer container: {0}")]
    CorruptOuterContainer(String),

    #[error("Malformed .conda archive: {0}")]
    MalformedNestedArchive(String),

    #[error("Corrupt tarball: {0}")]
    CorruptTarball(String),

    #[error("No info/ directory among {0} tarball members")]
    MissingInfoDirectory(usize),

    #[error("Archive does not contain {0}")]
    MissingMember(String),
}

/// Which part of an archive to read from.
///
/// For `.conda` archives the metadata and the installed files live in
/// separate inner tarballs; a flat tarball holds both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Info,
    Payload,
}

/// An opened, validated archive.
#[derive(Debug)]
pub enum Container {
    Nested(NestedContainer),
    Flat(FlatContainer),
}

impl Container {
    /// Open `bytes` with the codec for `format` and validate its layout.
    ///
    /// # Errors
    ///
    /// `.conda`: [`CodecError::CorruptOuterContainer`] if the bytes are not a
    /// zip, [`CodecError::MalformedNestedArchive`] if the member layout is
    /// wrong. `.tar.bz2`: [`CodecError::CorruptTarball`] if the stream cannot
    /// be read, [`CodecError::MissingInfoDirectory`] if nothing lives under
    /// `info/`.
    pub fn open(format: ArchiveFormat, bytes: Bytes) -> Result<Self, CodecError> {
        match format {
            ArchiveFormat::NestedZst => NestedContainer::open(bytes).map(Self::Nested),
            ArchiveFormat::FlatBz2 => FlatContainer::open(bytes).map(Self::Flat),
        }
    }

    /// Member names of the outermost layer, in archive order.
    pub fn members(&self) -> &[String] {
        match self {
            Self::Nested(c) => &c.members,
            Self::Flat(c) => &c.members,
        }
    }

    /// Read the named tar entries from `section`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::MissingMember`] if any requested name is absent
    /// and [`CodecError::CorruptTarball`] if the tar stream is unreadable.
    pub fn extract(
        &mut self,
        section: Section,
        names: &[&str],
    ) -> Result<HashMap<String, Vec<u8>>, CodecError> {
        match self {
            Self::Nested(c) => c.extract(section, names),
            Self::Flat(c) => c.extract(section, names),
        }
    }
}

pub struct NestedContainer {
    zip: ZipArchive<Cursor<Bytes>>,
    members: Vec<String>,
    info_member: String,
    pkg_member: String,
}

impl std::fmt::Debug for NestedContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NestedContainer")
            .field("members", &self.members)
            .field("info_member", &self.info_member)
            .field("pkg_member", &self.pkg_member)
            .finish_non_exhaustive()
    }
}

impl NestedContainer {
    fn open(bytes: Bytes) -> Result<Self, CodecError> {
        let zip = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| CodecError::CorruptOuterContainer(e.to_string()))?;
        let members: Vec<String> = zip.file_names().map(str::to_string).collect();
        let (info_member, pkg_member) = validate_nested_members(&members)?;

        Ok(Self {
            zip,
            members,
            info_member,
            pkg_member,
        })
    }

    /// Name of the `info-*.tar.zst` member.
    pub fn info_member(&self) -> &str {
        &self.info_member
    }

    /// Name of the package payload member.
    pub fn pkg_member(&self) -> &str {
        &self.pkg_member
    }

    fn extract(
        &mut self,
        section: Section,
        names: &[&str],
    ) -> Result<HashMap<String, Vec<u8>>, CodecError> {
        let member = match section {
            Section::Info => self.info_member.as_str(),
            Section::Payload => self.pkg_member.as_str(),
        };

        let entry = self
            .zip
            .by_name(member)
            .map_err(|e| CodecError::CorruptOuterContainer(format!("{member}: {e}")))?;
        let decoder = zstd::stream::read::Decoder::new(entry)
            .map_err(|e| CodecError::CorruptTarball(format!("{member}: {e}")))?;

        scan_tar(decoder, names, false)
            .map_err(|e| CodecError::CorruptTarball(format!("{member}: {e}")))?
            .into_complete(names)
    }
}

/// Check the `.conda` layout: `metadata.json`, exactly one `info-*` member,
/// one payload member, and every tarball compressed with zstd.
///
/// Returns `(info_member, pkg_member)`.
fn validate_nested_members(members: &[String]) -> Result<(String, String), CodecError> {
    if members.len() != 3 {
        return Err(CodecError::MalformedNestedArchive(format!(
            "expected 3 members, got {}: {members:?}",
            members.len()
        )));
    }

    let tarballs: Vec<&str> = members
        .iter()
        .map(String::as_str)
        .filter(|m| *m != NESTED_METADATA_MEMBER)
        .collect();
    if tarballs.len() != 2 {
        return Err(CodecError::MalformedNestedArchive(format!(
            "no {NESTED_METADATA_MEMBER} in {members:?}"
        )));
    }
    if let Some(bad) = tarballs.iter().find(|t| !t.ends_with(NESTED_TAR_SUFFIX)) {
        return Err(CodecError::MalformedNestedArchive(format!(
            "expected {NESTED_TAR_SUFFIX} member, got {bad}"
        )));
    }

    let infos: Vec<&str> = tarballs
        .iter()
        .copied()
        .filter(|t| t.starts_with(NESTED_INFO_PREFIX))
        .collect();
    let [info] = infos.as_slice() else {
        return Err(CodecError::MalformedNestedArchive(format!(
            "expected one {NESTED_INFO_PREFIX}* tarball, found {}",
            infos.len()
        )));
    };

    let pkg = tarballs
        .iter()
        .find(|t| *t != info)
        .ok_or_else(|| CodecError::MalformedNestedArchive("no package tarball".to_string()))?;

    Ok(((*info).to_string(), (*pkg).to_string()))
}

/// Info documents captured while a flat tarball is listed on open.
const INFO_DOCUMENTS: [&str; 3] = [PATHS_JSON, ABOUT_JSON, INDEX_JSON];

#[derive(Debug)]
pub struct FlatContainer {
    bytes: Bytes,
    members: Vec<String>,
    info: HashMap<String, Vec<u8>>,
}

impl FlatContainer {
    fn open(bytes: Bytes) -> Result<Self, CodecError> {
        let scan = scan_tar(
            bzip2::read::BzDecoder::new(Cursor::new(bytes.clone())),
            &INFO_DOCUMENTS,
            true,
        )
        .map_err(|e| CodecError::CorruptTarball(e.to_string()))?;

        if !scan.members.iter().any(|m| m.starts_with(FLAT_INFO_DIR)) {
            return Err(CodecError::MissingInfoDirectory(scan.members.len()));
        }

        Ok(Self {
            bytes,
            members: scan.members,
            info: scan.found,
        })
    }

    fn extract(
        &self,
        section: Section,
        names: &[&str],
    ) -> Result<HashMap<String, Vec<u8>>, CodecError> {
        if section == Section::Info {
            let cached: HashMap<String, Vec<u8>> = names
                .iter()
                .filter_map(|name| {
                    self.info
                        .get(*name)
                        .map(|data| ((*name).to_string(), data.clone()))
                })
                .collect();
            if cached.len() == names.len() {
                return Ok(cached);
            }
        }

        let decoder = bzip2::read::BzDecoder::new(Cursor::new(self.bytes.clone()));
        scan_tar(decoder, names, false)
            .map_err(|e| CodecError::CorruptTarball(e.to_string()))?
            .into_complete(names)
    }
}

/// Upper bound on the buffer reserved up front for one tar entry. Larger
/// entries grow as their data is actually read.
const MAX_PREALLOCATION: u64 = 64 * 1024;

/// What one pass over a tar stream produced.
struct TarScan {
    /// Every entry name, only filled when the whole stream was listed.
    members: Vec<String>,
    found: HashMap<String, Vec<u8>>,
}

impl TarScan {
    fn into_complete(self, names: &[&str]) -> Result<HashMap<String, Vec<u8>>, CodecError> {
        if let Some(missing) = names.iter().find(|n| !self.found.contains_key(**n)) {
            return Err(CodecError::MissingMember((*missing).to_string()));
        }
        Ok(self.found)
    }
}

fn entry_name<R: Read>(entry: &tar::Entry<'_, R>) -> io::Result<String> {
    let path = entry.path()?;
    let name = path.to_string_lossy();
    Ok(name.strip_prefix("./").unwrap_or(&*name).to_string())
}

/// Stream through a tar, keeping the wanted entries.
///
/// With `list_all` every entry name is collected and the whole stream is
/// read. Otherwise the scan stops as soon as every wanted entry has been
/// read, so the rest is never decompressed.
fn scan_tar<R: Read>(reader: R, names: &[&str], list_all: bool) -> io::Result<TarScan> {
    let wanted: HashSet<&str> = names.iter().copied().collect();
    let mut scan = TarScan {
        members: Vec::new(),
        found: HashMap::with_capacity(wanted.len()),
    };
    if wanted.is_empty() && !list_all {
        return Ok(scan);
    }

    let mut archive = tar::Archive::new(reader);
    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = entry_name(&entry)?;
        if list_all {
            scan.members.push(name.clone());
        }
        if !wanted.contains(name.as_str()) || scan.found.contains_key(&name) {
            continue;
        }

        let declared = entry.size();
        let mut buf = Vec::with_capacity(declared.min(MAX_PREALLOCATION) as usize);
        entry.read_to_end(&mut buf)?;
        if buf.len() as u64 != declared {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "{name} declares {declared} bytes but the stream holds {}",
                    buf.len()
                ),
            ));
        }
        scan.found.insert(name, buf);

        if !list_all && scan.found.len() == wanted.len() {
            break;
        }
    }
    Ok(scan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{CondaBuilder, bz2_tarball, zst_tarball};

    fn members(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_validate_nested_members() {
        let (info, pkg) = validate_nested_members(&members(&[
            "metadata.json",
            "pkg-foo-1.0-0.tar.zst",
            "info-foo-1.0-0.tar.zst",
        ]))
        .unwrap();
        assert_eq!(info, "info-foo-1.0-0.tar.zst");
        assert_eq!(pkg, "pkg-foo-1.0-0.tar.zst");
    }

    #[test]
    fn test_validate_rejects_two_members() {
        let err =
            validate_nested_members(&members(&["metadata.json", "info-foo.tar.zst"])).unwrap_err();
        assert!(matches!(err, CodecError::MalformedNestedArchive(_)));
    }

    #[test]
    fn test_validate_rejects_two_info_members() {
        let err = validate_nested_members(&members(&[
            "metadata.json",
            "info-a.tar.zst",
            "info-b.tar.zst",
        ]))
        .unwrap_err();
        assert!(matches!(err, CodecError::MalformedNestedArchive(_)));
    }

    #[test]
    fn test_validate_rejects_wrong_suffix() {
        let err = validate_nested_members(&members(&[
            "metadata.json",
            "info-foo.tar.zst",
            "pkg-foo.tar.bz2",
        ]))
        .unwrap_err();
        assert!(matches!(err, CodecError::MalformedNestedArchive(_)));
    }

    #[test]
    fn test_validate_rejects_missing_metadata() {
        let err = validate_nested_members(&members(&[
            "meta.json",
            "info-foo.tar.zst",
            "pkg-foo.tar.zst",
        ]))
        .unwrap_err();
        assert!(matches!(err, CodecError::MalformedNestedArchive(_)));
    }

    #[test]
    fn test_open_nested_and_extract_info() {
        let bytes = CondaBuilder::new("foo-1.0-0")
            .info_file("info/index.json", br#"{"name":"foo"}"#)
            .info_file("info/about.json", b"{}")
            .pkg_file("lib/python3.9/site-packages/foo/__init__.py", b"")
            .build();

        let mut container = Container::open(ArchiveFormat::NestedZst, bytes).unwrap();
        assert_eq!(container.members().len(), 3);
        let Container::Nested(nested) = &container else {
            panic!("expected nested container");
        };
        assert_eq!(nested.info_member(), "info-foo-1.0-0.tar.zst");
        assert_eq!(nested.pkg_member(), "pkg-foo-1.0-0.tar.zst");

        let files = container
            .extract(Section::Info, &["info/index.json"])
            .unwrap();
        assert_eq!(files["info/index.json"], br#"{"name":"foo"}"#);

        let payload = container
            .extract(
                Section::Payload,
                &["lib/python3.9/site-packages/foo/__init__.py"],
            )
            .unwrap();
        assert_eq!(payload.len(), 1);
    }

    #[test]
    fn test_nested_missing_member() {
        let bytes = CondaBuilder::new("foo-1.0-0")
            .info_file("info/index.json", b"{}")
            .build();
        let mut container = Container::open(ArchiveFormat::NestedZst, bytes).unwrap();
        let err = container
            .extract(Section::Info, &["info/index.json", "info/paths.json"])
            .unwrap_err();
        assert!(matches!(err, CodecError::MissingMember(name) if name == "info/paths.json"));
    }

    #[test]
    fn test_nested_corrupt_outer() {
        let err = Container::open(ArchiveFormat::NestedZst, Bytes::from_static(b"not a zip"))
            .unwrap_err();
        assert!(matches!(err, CodecError::CorruptOuterContainer(_)));
    }

    #[test]
    fn test_nested_extra_member_rejected() {
        let bytes = CondaBuilder::new("foo-1.0-0")
            .info_file("info/index.json", b"{}")
            .extra_member("info-extra.tar.zst", &zst_tarball(&[]))
            .build();
        let err = Container::open(ArchiveFormat::NestedZst, bytes).unwrap_err();
        assert!(matches!(err, CodecError::MalformedNestedArchive(_)));
    }

    #[test]
    fn test_open_flat_and_extract() {
        let bytes = bz2_tarball(&[
            ("info/index.json", br#"{"name":"bar"}"#.as_slice()),
            ("lib/python3.9/site-packages/bar.py", b"x = 1".as_slice()),
        ]);
        let mut container = Container::open(ArchiveFormat::FlatBz2, bytes).unwrap();
        assert_eq!(
            container.members(),
            ["info/index.json", "lib/python3.9/site-packages/bar.py"]
        );
        let Container::Flat(flat) = &container else {
            panic!("expected flat container");
        };
        assert_eq!(flat.info.len(), 1);

        let info = container
            .extract(Section::Info, &["info/index.json"])
            .unwrap();
        assert_eq!(info["info/index.json"], br#"{"name":"bar"}"#);
        assert!(container.extract(Section::Payload, &[]).unwrap().is_empty());

        let files = container
            .extract(Section::Payload, &["lib/python3.9/site-packages/bar.py"])
            .unwrap();
        assert_eq!(files["lib/python3.9/site-packages/bar.py"], b"x = 1");
    }

    #[test]
    fn test_flat_missing_info_dir() {
        let bytes = bz2_tarball(&[("lib/bar.py", b"".as_slice())]);
        let err = Container::open(ArchiveFormat::FlatBz2, bytes).unwrap_err();
        assert!(matches!(err, CodecError::MissingInfoDirectory(1)));
    }

    #[test]
    fn test_flat_corrupt() {
        let err = Container::open(
            ArchiveFormat::FlatBz2,
            Bytes::from_static(b"definitely not bzip2 data"),
        )
        .unwrap_err();
        assert!(matches!(err, CodecError::CorruptTarball(_)));
    }

    /// A tar whose single entry declares a terabyte but carries 1 KiB.
    fn oversized_entry_tar(name: &str) -> Vec<u8> {
        let mut header = tar::Header::new_gnu();
        header.set_size(1 << 40);
        header.set_mode(0o644);
        let mut builder = tar::Builder::new(Vec::new());
        builder
            .append_data(&mut header, name, [0u8; 1024].as_slice())
            .unwrap();
        builder.into_inner().unwrap()
    }

    #[test]
    fn test_nested_oversized_entry_is_corrupt() {
        let raw = zstd::stream::encode_all(oversized_entry_tar("info/index.json").as_slice(), 3)
            .unwrap();
        let bytes = CondaBuilder::new("foo-1.0-0").raw_info_member(raw).build();
        let mut container = Container::open(ArchiveFormat::NestedZst, bytes).unwrap();

        let err = container
            .extract(Section::Info, &["info/index.json"])
            .unwrap_err();
        assert!(matches!(err, CodecError::CorruptTarball(msg) if msg.contains("declares")));
    }

    #[test]
    fn test_flat_oversized_entry_is_corrupt() {
        use std::io::Write;

        let mut encoder =
            bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
        encoder
            .write_all(&oversized_entry_tar("info/index.json"))
            .unwrap();
        let bytes = Bytes::from(encoder.finish().unwrap());

        let err = Container::open(ArchiveFormat::FlatBz2, bytes).unwrap_err();
        assert!(matches!(err, CodecError::CorruptTarball(msg) if msg.contains("declares")));
    }
}
