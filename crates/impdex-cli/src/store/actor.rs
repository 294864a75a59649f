//! Catalog Actor - serialized writes to SQLite
//!
//! The connection lives on a dedicated thread and every write goes through
//! its queue, so concurrent ingestion workers never interleave a row.

use std::fmt;
use std::sync::mpsc;
use std::thread;

use async_trait::async_trait;
use impdex_core::{CatalogSink, CatalogWriteError};
use impdex_schema::{InsertOutcome, PackageRecord};
use tokio::sync::oneshot;

use super::db::{Catalog, CatalogError};

/// Requests handled by the catalog thread
pub enum CatalogEvent {
    /// Insert a record (idempotent for identical rows)
    Insert {
        record: Box<PackageRecord>,
        resp: oneshot::Sender<Result<InsertOutcome, CatalogError>>,
    },
    /// Stop the thread
    Shutdown,
}

impl fmt::Debug for CatalogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert { record, .. } => f
                .debug_struct("Insert")
                .field("channel", &record.channel)
                .field("filename", &record.filename)
                .finish_non_exhaustive(),
            Self::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// A cloneable, `Send + Sync` handle to the catalog thread.
#[derive(Clone)]
pub struct CatalogHandle {
    sender: mpsc::Sender<CatalogEvent>,
}

impl fmt::Debug for CatalogHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogHandle").finish_non_exhaustive()
    }
}

impl CatalogHandle {
    /// Start a thread owning an already opened catalog
    pub fn spawn_with(catalog: Catalog) -> Self {
        let (sender, receiver) = mpsc::channel();
        thread::spawn(move || {
            run_catalog_event_loop(catalog, receiver);
        });
        Self { sender }
    }

    async fn request<T, F>(&self, f: F) -> Result<T, CatalogError>
    where
        F: FnOnce(oneshot::Sender<Result<T, CatalogError>>) -> CatalogEvent,
    {
        let (tx, rx) = oneshot::channel();
        self.sender.send(f(tx)).map_err(|_| CatalogError::ActorDied)?;
        rx.await.map_err(|_| CatalogError::ActorDied)?
    }

    pub async fn insert(&self, record: PackageRecord) -> Result<InsertOutcome, CatalogError> {
        self.request(|resp| CatalogEvent::Insert {
            record: Box::new(record),
            resp,
        })
        .await
    }

    /// Ask the thread to stop once queued requests are handled
    pub fn shutdown(&self) {
        let _ = self.sender.send(CatalogEvent::Shutdown);
    }
}

#[async_trait]
impl CatalogSink for CatalogHandle {
    async fn record(&self, record: &PackageRecord) -> Result<InsertOutcome, CatalogWriteError> {
        self.insert(record.clone()).await.map_err(|e| match e {
            CatalogError::DuplicateKey { channel, filename } => {
                CatalogWriteError::DuplicateKey { channel, filename }
            }
            other => CatalogWriteError::Storage(other.to_string()),
        })
    }
}

#[allow(clippy::needless_pass_by_value)]
fn run_catalog_event_loop(mut catalog: Catalog, receiver: mpsc::Receiver<CatalogEvent>) {
    while let Ok(event) = receiver.recv() {
        match event {
            CatalogEvent::Insert { record, resp } => {
                let _ = resp.send(catalog.insert(&record));
            }
            CatalogEvent::Shutdown => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use impdex_schema::{Channel, PackageName, Version};
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn record(n: usize) -> PackageRecord {
        let filename = format!("pkg{n}-1.0-0.conda");
        PackageRecord {
            package_name: PackageName::new(&format!("pkg{n}")),
            imported_names: Some(format!("pkg{n}")),
            channel: Channel::Anaconda,
            depends: "[]".to_string(),
            url: format!("https://repo.anaconda.com/pkgs/main/noarch/{filename}"),
            filename,
            version: Version::new("1.0"),
            root_package_names: String::new(),
        }
    }

    fn spawn(path: &Path) -> CatalogHandle {
        CatalogHandle::spawn_with(Catalog::open_at(path).unwrap())
    }

    #[tokio::test]
    async fn test_concurrent_writers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.db");
        let handle = Arc::new(spawn(&path));

        let mut tasks = Vec::new();
        for n in 0..32 {
            let handle = Arc::clone(&handle);
            // every record is written twice from different tasks
            tasks.push(tokio::spawn(async move { handle.record(&record(n % 16)).await }));
        }

        let mut inserted = 0;
        let mut present = 0;
        for task in tasks {
            match task.await.unwrap().unwrap() {
                InsertOutcome::Inserted => inserted += 1,
                InsertOutcome::AlreadyPresent => present += 1,
            }
        }
        assert_eq!((inserted, present), (16, 16));

        // visible to a second connection while the writer thread is alive
        let reader = Catalog::open_at(&path).unwrap();
        assert!(reader.exists(&PackageName::new("pkg3")).unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_key_maps_to_write_error() {
        let dir = tempdir().unwrap();
        let handle = spawn(&dir.path().join("catalog.db"));
        handle.record(&record(1)).await.unwrap();

        let conflicting = PackageRecord {
            version: Version::new("2.0"),
            ..record(1)
        };
        assert_eq!(
            handle.record(&conflicting).await.unwrap_err(),
            CatalogWriteError::DuplicateKey {
                channel: Channel::Anaconda,
                filename: "pkg1-1.0-0.conda".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_requests_after_shutdown_fail() {
        let dir = tempdir().unwrap();
        let handle = spawn(&dir.path().join("catalog.db"));
        handle.shutdown();
        let err = handle.insert(record(1)).await.unwrap_err();
        assert!(matches!(err, CatalogError::ActorDied));
    }
}
