//! Version catalog
//!
//! Artifact metadata behind one [`Catalog`] trait with two backends: SQLite
//! ([`DatabaseCatalog`]) or a scan of the storage tree
//! ([`FilesystemScanCatalog`]). [`list`] ranks and tags query results.

mod actor;
pub mod db;
mod fs_scan;

use std::cmp::Reverse;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use apkvc_schema::{ArtifactRecord, ArtifactView, ListFilter, NewArtifact, VersionKey};
use async_trait::async_trait;
use thiserror::Error;

pub use actor::DatabaseCatalog;
pub use fs_scan::{FilesystemScanCatalog, path_id};

use crate::config::{CatalogBackend, Config};

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("{stored_file_name} already exists for client {}", .client.as_deref().unwrap_or("(none)"))]
    Duplicate {
        client: Option<String>,
        stored_file_name: String,
    },

    #[error("Stored file not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("{} is outside the storage root", .0.display())]
    OutsideRoot(PathBuf),

    #[error("Corrupt catalog row: {0}")]
    Corrupt(String),

    #[error("Storage scan failed: {0}")]
    Scan(String),

    #[error("Catalog task failed: {0}")]
    Background(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Catalog actor died")]
    ActorDied,
}

/// Artifact metadata store.
///
/// `query` and `all` return records in no particular order; use [`list`] for
/// the ranked view.
#[async_trait]
pub trait Catalog: fmt::Debug + Send + Sync {
    /// Persist a new record, committed before returning.
    async fn insert(&self, artifact: NewArtifact) -> Result<ArtifactRecord, CatalogError>;

    async fn get(&self, id: i64) -> Result<Option<ArtifactRecord>, CatalogError>;

    async fn all(&self) -> Result<Vec<ArtifactRecord>, CatalogError>;

    async fn query(&self, filter: &ListFilter) -> Result<Vec<ArtifactRecord>, CatalogError>;

    /// Remove a record. Returns whether one was removed.
    async fn delete(&self, id: i64) -> Result<bool, CatalogError>;

    fn backend(&self) -> CatalogBackend;
}

/// Open the backend selected by `config`.
pub fn open_catalog(config: &Config) -> Result<Arc<dyn Catalog>, CatalogError> {
    let catalog: Arc<dyn Catalog> = match config.catalog {
        CatalogBackend::Database => Arc::new(DatabaseCatalog::open(&config.database_path)?),
        CatalogBackend::Filesystem => Arc::new(FilesystemScanCatalog::new(&config.storage_root)),
    };
    tracing::debug!(backend = %config.catalog, "catalog opened");
    Ok(catalog)
}

/// Filtered, ranked and tagged records.
pub async fn list(
    catalog: &dyn Catalog,
    filter: &ListFilter,
) -> Result<Vec<ArtifactView>, CatalogError> {
    let records = catalog.query(filter).await?;
    Ok(rank_and_tag(records))
}

/// Order by version (numeric tuple), then `created_at`, then id, all
/// descending. The first entry is current, the second previous.
pub fn rank_and_tag(mut records: Vec<ArtifactRecord>) -> Vec<ArtifactView> {
    records.sort_by_cached_key(|r| {
        (
            Reverse(VersionKey::parse(&r.version)),
            Reverse(r.created_at),
            Reverse(r.id),
        )
    });

    records
        .into_iter()
        .enumerate()
        .map(|(rank, record)| {
            let mut view = ArtifactView::new(record);
            view.is_current_version = rank == 0;
            view.is_previous_version = rank == 1;
            view
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(id: i64, version: &str, day: u32) -> ArtifactRecord {
        ArtifactRecord {
            id,
            name: "maps".to_string(),
            version: version.to_string(),
            client: None,
            size_bytes: 1,
            created_at: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            storage_path: PathBuf::from("/srv/files"),
            stored_file_name: format!("maps-{version}--202401{day:02}.apk"),
        }
    }

    fn versions(views: &[ArtifactView]) -> Vec<&str> {
        views.iter().map(|v| v.record.version.as_str()).collect()
    }

    #[test]
    fn test_numeric_not_lexical_ordering() {
        let views = rank_and_tag(vec![
            record(1, "1.0.0", 1),
            record(2, "1.9.0", 2),
            record(3, "1.10.0", 3),
        ]);
        assert_eq!(versions(&views), ["1.10.0", "1.9.0", "1.0.0"]);
    }

    #[test]
    fn test_tags_top_two_only() {
        let views = rank_and_tag(vec![
            record(1, "2.9.0", 1),
            record(2, "2.10.0", 1),
            record(3, "1.0", 1),
        ]);
        assert!(views[0].is_current_version && !views[0].is_previous_version);
        assert!(!views[1].is_current_version && views[1].is_previous_version);
        assert!(!views[2].is_current_version && !views[2].is_previous_version);
    }

    #[test]
    fn test_single_entry_is_current_only() {
        let views = rank_and_tag(vec![record(1, "1.0", 1)]);
        assert!(views[0].is_current_version);
        assert!(!views[0].is_previous_version);
        assert!(rank_and_tag(Vec::new()).is_empty());
    }

    #[test]
    fn test_ties_break_on_created_at_then_id() {
        let views = rank_and_tag(vec![
            record(1, "1.0", 1),
            record(2, "1.0.0", 5),
            record(3, "1.0", 5),
        ]);
        let ids: Vec<i64> = views.iter().map(|v| v.record.id).collect();
        assert_eq!(ids, [3, 2, 1]);
    }

    #[test]
    fn test_unparseable_version_ranks_as_zero() {
        let views = rank_and_tag(vec![record(1, "nightly", 9), record(2, "0.1", 1)]);
        assert_eq!(versions(&views), ["0.1", "nightly"]);
    }

    #[tokio::test]
    async fn test_list_filters_before_tagging() {
        let catalog = DatabaseCatalog::spawn(db::CatalogDb::open_in_memory().unwrap()).unwrap();
        for (name, version) in [("maps", "3.0"), ("maps", "2.0"), ("scanner", "9.0")] {
            catalog
                .insert(NewArtifact {
                    name: name.to_string(),
                    version: version.to_string(),
                    client: None,
                    size_bytes: 1,
                    created_at: Utc::now(),
                    storage_path: PathBuf::from("/srv/files"),
                    stored_file_name: format!("{name}-{version}--20240105.apk"),
                })
                .await
                .unwrap();
        }

        let views = list(&catalog, &ListFilter::default().with_name("maps"))
            .await
            .unwrap();
        assert_eq!(versions(&views), ["3.0", "2.0"]);
        assert!(views[0].is_current_version);
        assert!(views[1].is_previous_version);
    }
}
