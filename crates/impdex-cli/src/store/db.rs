//! SQLite package catalog
//!
//! One row per archive, keyed by `(channel, filename)`.

use std::path::{Path, PathBuf};

use impdex_schema::{Channel, InsertOutcome, PackageName, PackageRecord, Version};
use rusqlite::{Connection, OptionalExtension, Row, params};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Cannot create catalog directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("A different record is already stored for ({channel}, {filename})")]
    DuplicateKey { channel: Channel, filename: String },

    #[error("Unknown channel in catalog row: {0}")]
    UnknownChannel(String),

    #[error("Catalog actor died")]
    ActorDied,
}

const COLUMNS: &str =
    "package_name, imported_names, channel, depends, filename, url, version, root_package_names";

/// Catalog database
pub struct Catalog {
    conn: Connection,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog").finish_non_exhaustive()
    }
}

impl Catalog {
    /// Open or create the catalog at `path`
    pub fn open_at(path: &Path) -> Result<Self, CatalogError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| CatalogError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;

        // WAL lets lookups read while a build is writing
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        let catalog = Self { conn };
        catalog.create()?;
        Ok(catalog)
    }

    /// Create the table and indexes if they do not exist yet.
    pub fn create(&self) -> Result<(), CatalogError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS packages (
                channel TEXT NOT NULL,
                filename TEXT NOT NULL,
                package_name TEXT NOT NULL,
                imported_names TEXT,
                depends TEXT NOT NULL,
                url TEXT NOT NULL,
                version TEXT NOT NULL,
                root_package_names TEXT NOT NULL,
                PRIMARY KEY (channel, filename)
            );

            CREATE INDEX IF NOT EXISTS idx_packages_name ON packages(package_name);
            CREATE INDEX IF NOT EXISTS idx_packages_filename ON packages(filename);
            ",
        )?;
        Ok(())
    }

    /// Insert `record`.
    ///
    /// Re-inserting an identical row is a no-op. A differing row under the
    /// same key is rejected with [`CatalogError::DuplicateKey`] and the
    /// stored row is left untouched.
    pub fn insert(&mut self, record: &PackageRecord) -> Result<InsertOutcome, CatalogError> {
        let tx = self.conn.transaction()?;

        let existing = tx
            .query_row(
                &format!("SELECT {COLUMNS} FROM packages WHERE channel = ?1 AND filename = ?2"),
                params![record.channel.as_str(), record.filename],
                read_row,
            )
            .optional()?
            .transpose()?;

        let outcome = match existing {
            Some(stored) if stored == *record => InsertOutcome::AlreadyPresent,
            Some(_) => {
                return Err(CatalogError::DuplicateKey {
                    channel: record.channel,
                    filename: record.filename.clone(),
                });
            }
            None => {
                tx.execute(
                    &format!("INSERT INTO packages ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
                    params![
                        record.package_name.as_str(),
                        record.imported_names,
                        record.channel.as_str(),
                        record.depends,
                        record.filename,
                        record.url,
                        record.version.as_str(),
                        record.root_package_names,
                    ],
                )?;
                InsertOutcome::Inserted
            }
        };

        tx.commit()?;
        Ok(outcome)
    }

    /// All records for a package, newest insert last.
    pub fn find_by_name(&self, name: &PackageName) -> Result<Vec<PackageRecord>, CatalogError> {
        self.query(
            &format!("SELECT {COLUMNS} FROM packages WHERE package_name = ?1 ORDER BY rowid"),
            name.as_str(),
        )
    }

    /// Records whose archive filename is `filename` (one per channel at most).
    pub fn find_by_filename(&self, filename: &str) -> Result<Vec<PackageRecord>, CatalogError> {
        self.query(
            &format!("SELECT {COLUMNS} FROM packages WHERE filename = ?1 ORDER BY channel"),
            filename,
        )
    }

    /// Records that provide `module` as one of their importable names.
    pub fn find_by_imported_name(&self, module: &str) -> Result<Vec<PackageRecord>, CatalogError> {
        // LIKE narrows the scan; the exact element match happens below
        let pattern = format!("%{}%", escape_like(module));
        let candidates = self.query(
            &format!(
                "SELECT {COLUMNS} FROM packages
                 WHERE imported_names LIKE ?1 ESCAPE '\\'
                 ORDER BY package_name, channel"
            ),
            &pattern,
        )?;
        Ok(candidates
            .into_iter()
            .filter(|record| record.provides(module))
            .collect())
    }

    /// Whether any archive of `name` is cataloged.
    pub fn exists(&self, name: &PackageName) -> Result<bool, CatalogError> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM packages WHERE package_name = ?1 LIMIT 1",
                params![name.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn query(&self, sql: &str, arg: &str) -> Result<Vec<PackageRecord>, CatalogError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params![arg], read_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row??);
        }
        Ok(records)
    }
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<Result<PackageRecord, CatalogError>> {
    let channel: String = row.get(2)?;
    let Some(channel) = Channel::parse(&channel) else {
        return Ok(Err(CatalogError::UnknownChannel(channel)));
    };

    Ok(Ok(PackageRecord {
        package_name: PackageName::from(row.get::<_, String>(0)?),
        imported_names: row.get(1)?,
        channel,
        depends: row.get(3)?,
        filename: row.get(4)?,
        url: row.get(5)?,
        version: Version::from(row.get::<_, String>(6)?),
        root_package_names: row.get(7)?,
    }))
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(name: &str, filename: &str, imported: Option<&str>) -> PackageRecord {
        PackageRecord {
            package_name: PackageName::new(name),
            imported_names: imported.map(str::to_string),
            channel: Channel::CondaForge,
            depends: r#"["python"]"#.to_string(),
            filename: filename.to_string(),
            url: format!("https://conda.anaconda.org/conda-forge/noarch/{filename}"),
            version: Version::new("1.0"),
            root_package_names: String::new(),
        }
    }

    fn catalog() -> (tempfile::TempDir, Catalog) {
        let dir = tempdir().unwrap();
        let catalog = Catalog::open_at(&dir.path().join("catalog.db")).unwrap();
        (dir, catalog)
    }

    #[test]
    fn test_insert_is_idempotent() {
        let (_dir, mut catalog) = catalog();
        let rec = record("pyyaml", "pyyaml-6.0-0.conda", Some("yaml,_yaml"));

        assert_eq!(catalog.insert(&rec).unwrap(), InsertOutcome::Inserted);
        assert_eq!(catalog.insert(&rec).unwrap(), InsertOutcome::AlreadyPresent);
        assert_eq!(catalog.find_by_filename("pyyaml-6.0-0.conda").unwrap(), [rec]);
    }

    #[test]
    fn test_conflicting_insert_is_rejected() {
        let (_dir, mut catalog) = catalog();
        let rec = record("pyyaml", "pyyaml-6.0-0.conda", Some("yaml"));
        catalog.insert(&rec).unwrap();

        let conflicting = PackageRecord {
            imported_names: Some("other".to_string()),
            ..rec.clone()
        };
        let err = catalog.insert(&conflicting).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateKey { .. }));

        // stored row is unchanged
        assert_eq!(catalog.find_by_filename("pyyaml-6.0-0.conda").unwrap(), [rec]);
    }

    #[test]
    fn test_same_filename_on_two_channels() {
        let (_dir, mut catalog) = catalog();
        let forge = record("six", "six-1.16-0.tar.bz2", Some("six"));
        let anaconda = PackageRecord {
            channel: Channel::Anaconda,
            ..forge.clone()
        };
        catalog.insert(&forge).unwrap();
        assert_eq!(catalog.insert(&anaconda).unwrap(), InsertOutcome::Inserted);
        assert_eq!(catalog.find_by_filename("six-1.16-0.tar.bz2").unwrap().len(), 2);
    }

    #[test]
    fn test_find_by_imported_name_matches_whole_elements() {
        let (_dir, mut catalog) = catalog();
        catalog
            .insert(&record("pyyaml", "pyyaml-6.0-0.conda", Some("yaml,_yaml")))
            .unwrap();
        catalog
            .insert(&record("ruamel.yaml", "ruamel.yaml-0.17-0.conda", Some("ruamel")))
            .unwrap();
        catalog
            .insert(&record("meta", "meta-1.0-0.conda", None))
            .unwrap();

        let hits = catalog.find_by_imported_name("yaml").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].package_name, "pyyaml");

        assert_eq!(catalog.find_by_imported_name("_yaml").unwrap().len(), 1);
        assert!(catalog.find_by_imported_name("yam").unwrap().is_empty());
        assert!(catalog.find_by_imported_name("%").unwrap().is_empty());
    }

    #[test]
    fn test_find_by_name_and_exists() {
        let (_dir, mut catalog) = catalog();
        catalog
            .insert(&record("tqdm", "tqdm-4.64.1-0.conda", Some("tqdm")))
            .unwrap();

        let name = PackageName::new("tqdm");
        assert!(catalog.exists(&name).unwrap());
        assert!(!catalog.exists(&PackageName::new("attrs")).unwrap());
        assert_eq!(catalog.find_by_name(&name).unwrap().len(), 1);
    }

    #[test]
    fn test_reopen_keeps_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("catalog.db");
        let rec = record("attrs", "attrs-22.1.0-0.tar.bz2", Some("attr,attrs"));

        Catalog::open_at(&path).unwrap().insert(&rec).unwrap();
        let reopened = Catalog::open_at(&path).unwrap();
        reopened.create().unwrap();
        assert_eq!(reopened.find_by_name(&PackageName::new("attrs")).unwrap(), [rec]);
    }

    #[test]
    fn test_open_reports_unusable_directory() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();

        let err = Catalog::open_at(&blocker.join("catalog.db")).unwrap_err();
        assert!(matches!(err, CatalogError::CreateDir { ref path, .. } if *path == blocker));
    }
}
