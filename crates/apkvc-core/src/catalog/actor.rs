//! Catalog actor
//!
//! `rusqlite::Connection` is not `Sync`, so the catalog database lives on a
//! dedicated thread and async callers talk to it through messages.

use std::fmt;
use std::path::Path;
use std::sync::mpsc;
use std::thread;

use apkvc_schema::{ArtifactRecord, ListFilter, NewArtifact};
use async_trait::async_trait;
use tokio::sync::oneshot;

use super::db::CatalogDb;
use super::{Catalog, CatalogError};
use crate::config::CatalogBackend;

type Reply<T> = oneshot::Sender<Result<T, CatalogError>>;

/// Requests handled by the actor thread
enum DbEvent {
    Insert {
        artifact: NewArtifact,
        resp: Reply<ArtifactRecord>,
    },
    Get {
        id: i64,
        resp: Reply<Option<ArtifactRecord>>,
    },
    Query {
        filter: ListFilter,
        resp: Reply<Vec<ArtifactRecord>>,
    },
    Delete {
        id: i64,
        resp: Reply<bool>,
    },
}

impl fmt::Debug for DbEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert { artifact, .. } => f
                .debug_struct("Insert")
                .field("stored_file_name", &artifact.stored_file_name)
                .finish_non_exhaustive(),
            Self::Get { id, .. } => f.debug_struct("Get").field("id", id).finish_non_exhaustive(),
            Self::Query { filter, .. } => f
                .debug_struct("Query")
                .field("filter", filter)
                .finish_non_exhaustive(),
            Self::Delete { id, .. } => f
                .debug_struct("Delete")
                .field("id", id)
                .finish_non_exhaustive(),
        }
    }
}

/// SQLite-backed catalog. Cheap to clone; every clone talks to the same thread.
///
/// The thread exits once the last handle is dropped.
#[derive(Clone)]
pub struct DatabaseCatalog {
    sender: mpsc::Sender<DbEvent>,
}

impl fmt::Debug for DatabaseCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseCatalog").finish_non_exhaustive()
    }
}

impl DatabaseCatalog {
    /// Open the database at `path` and spawn the actor thread.
    pub fn open(path: &Path) -> Result<Self, CatalogError> {
        Self::spawn(CatalogDb::open_at(path)?)
    }

    /// Host an already opened database.
    pub fn spawn(db: CatalogDb) -> Result<Self, CatalogError> {
        let (sender, receiver) = mpsc::channel();
        thread::Builder::new()
            .name("apkvc-catalog".to_string())
            .spawn(move || run_db_event_loop(db, receiver))?;
        Ok(Self { sender })
    }

    async fn request<T, F>(&self, f: F) -> Result<T, CatalogError>
    where
        F: FnOnce(Reply<T>) -> DbEvent,
    {
        let (tx, rx) = oneshot::channel();
        self.sender.send(f(tx)).map_err(|_| CatalogError::ActorDied)?;
        rx.await.map_err(|_| CatalogError::ActorDied)?
    }
}

#[async_trait]
impl Catalog for DatabaseCatalog {
    async fn insert(&self, artifact: NewArtifact) -> Result<ArtifactRecord, CatalogError> {
        self.request(|resp| DbEvent::Insert { artifact, resp }).await
    }

    async fn get(&self, id: i64) -> Result<Option<ArtifactRecord>, CatalogError> {
        self.request(|resp| DbEvent::Get { id, resp }).await
    }

    async fn all(&self) -> Result<Vec<ArtifactRecord>, CatalogError> {
        self.query(&ListFilter::default()).await
    }

    async fn query(&self, filter: &ListFilter) -> Result<Vec<ArtifactRecord>, CatalogError> {
        let filter = filter.clone();
        self.request(|resp| DbEvent::Query { filter, resp }).await
    }

    async fn delete(&self, id: i64) -> Result<bool, CatalogError> {
        self.request(|resp| DbEvent::Delete { id, resp }).await
    }

    fn backend(&self) -> CatalogBackend {
        CatalogBackend::Database
    }
}

// The db and receiver are moved into this thread so it has exclusive ownership.
#[allow(clippy::needless_pass_by_value)]
fn run_db_event_loop(mut db: CatalogDb, receiver: mpsc::Receiver<DbEvent>) {
    while let Ok(event) = receiver.recv() {
        match event {
            DbEvent::Insert { artifact, resp } => {
                // A dropped caller never stages a file for this row.
                if let Err(Ok(record)) = resp.send(db.insert(&artifact)) {
                    rollback_orphan(&mut db, &record);
                }
            }
            DbEvent::Get { id, resp } => {
                let _ = resp.send(db.get(id));
            }
            DbEvent::Query { filter, resp } => {
                let _ = resp.send(db.query(&filter));
            }
            DbEvent::Delete { id, resp } => {
                let _ = resp.send(db.delete(id));
            }
        }
    }
    tracing::debug!("catalog actor stopped");
}

fn rollback_orphan(db: &mut CatalogDb, record: &ArtifactRecord) {
    match db.delete(record.id) {
        Ok(_) => tracing::warn!(
            "Rolled back catalog record {} ({}): caller went away",
            record.id,
            record.stored_file_name
        ),
        Err(e) => tracing::warn!("Failed to roll back catalog record {}: {}", record.id, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::PathBuf;

    fn artifact(version: &str) -> NewArtifact {
        NewArtifact {
            name: "maps".to_string(),
            version: version.to_string(),
            client: None,
            size_bytes: 10,
            created_at: Utc::now(),
            storage_path: PathBuf::from("/srv/files"),
            stored_file_name: format!("maps-{version}--20240105.apk"),
        }
    }

    #[tokio::test]
    async fn test_actor_round_trip() {
        let catalog = DatabaseCatalog::spawn(CatalogDb::open_in_memory().unwrap()).unwrap();

        let record = catalog.insert(artifact("1.0")).await.unwrap();
        assert_eq!(catalog.get(record.id).await.unwrap(), Some(record.clone()));
        assert_eq!(catalog.all().await.unwrap().len(), 1);

        assert!(catalog.delete(record.id).await.unwrap());
        assert!(catalog.get(record.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_inserts_from_clones() {
        let catalog = DatabaseCatalog::spawn(CatalogDb::open_in_memory().unwrap()).unwrap();

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..10 {
            let catalog = catalog.clone();
            tasks.spawn(async move { catalog.insert(artifact(&format!("1.{i}"))).await });
        }
        while let Some(result) = tasks.join_next().await {
            result.unwrap().unwrap();
        }

        assert_eq!(catalog.all().await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_insert_without_receiver_is_rolled_back() {
        let catalog = DatabaseCatalog::spawn(CatalogDb::open_in_memory().unwrap()).unwrap();

        let (resp, rx) = oneshot::channel();
        drop(rx);
        catalog
            .sender
            .send(DbEvent::Insert {
                artifact: artifact("1.0"),
                resp,
            })
            .unwrap();

        // Events are handled in order, so the rollback is done by now.
        assert!(catalog.all().await.unwrap().is_empty());
        catalog.insert(artifact("1.0")).await.unwrap();
        assert_eq!(catalog.all().await.unwrap().len(), 1);
    }
}
