//! Filesystem-scan catalog
//!
//! Records are derived from `storage_root/{client?}/*.apk` on every call. The
//! id is a hash of the path relative to the root and `created_at` is the date
//! from the stored filename at midnight UTC.

use std::path::{Component, Path, PathBuf};

use apkvc_schema::{APK_EXTENSION, ArtifactRecord, ListFilter, NewArtifact, StoredName};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use walkdir::WalkDir;

use super::{Catalog, CatalogError};
use crate::config::CatalogBackend;

/// Catalog that treats the storage tree as the source of truth.
#[derive(Debug, Clone)]
pub struct FilesystemScanCatalog {
    root: PathBuf,
}

impl FilesystemScanCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn scan(&self) -> Result<Vec<ArtifactRecord>, CatalogError> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || scan_tree(&root))
            .await
            .map_err(|e| CatalogError::Background(e.to_string()))?
    }
}

#[async_trait]
impl Catalog for FilesystemScanCatalog {
    async fn insert(&self, artifact: NewArtifact) -> Result<ArtifactRecord, CatalogError> {
        let path = artifact.file_path();
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|_| CatalogError::MissingFile(path.clone()))?;
        if !metadata.is_file() {
            return Err(CatalogError::MissingFile(path));
        }

        let relative = path
            .strip_prefix(&self.root)
            .map_err(|_| CatalogError::OutsideRoot(path.clone()))?;
        let id = path_id(relative);
        Ok(artifact.into_record(id))
    }

    async fn get(&self, id: i64) -> Result<Option<ArtifactRecord>, CatalogError> {
        Ok(self.scan().await?.into_iter().find(|r| r.id == id))
    }

    async fn all(&self) -> Result<Vec<ArtifactRecord>, CatalogError> {
        self.scan().await
    }

    async fn query(&self, filter: &ListFilter) -> Result<Vec<ArtifactRecord>, CatalogError> {
        let mut records = self.scan().await?;
        records.retain(|r| filter.matches(r));
        Ok(records)
    }

    async fn delete(&self, id: i64) -> Result<bool, CatalogError> {
        let Some(record) = self.get(id).await? else {
            return Ok(false);
        };
        match tokio::fs::remove_file(record.file_path()).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn backend(&self) -> CatalogBackend {
        CatalogBackend::Filesystem
    }
}

/// Walk `root` and its client directories for stored APKs.
///
/// A missing root is an empty catalog. Files that do not parse as stored
/// names are skipped.
fn scan_tree(root: &Path) -> Result<Vec<ArtifactRecord>, CatalogError> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let mut records = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).max_depth(2) {
        let entry = entry.map_err(|e| CatalogError::Scan(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let is_apk = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(APK_EXTENSION));
        if !is_apk {
            continue;
        }

        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(stored) = StoredName::parse(file_name) else {
            tracing::debug!(path = %path.display(), "skipping file without a stored name");
            continue;
        };

        let relative = path.strip_prefix(root).unwrap_or(path);
        let client = (entry.depth() == 2)
            .then(|| {
                relative
                    .parent()
                    .and_then(|p| p.to_str())
                    .map(str::to_string)
            })
            .flatten();
        let storage_path = path.parent().unwrap_or(root).to_path_buf();
        let size_bytes = entry.metadata().map_err(|e| CatalogError::Scan(e.to_string()))?.len();

        records.push(ArtifactRecord {
            id: path_id(relative),
            name: stored.base,
            version: stored.version,
            client,
            size_bytes,
            created_at: midnight_utc(stored.date),
            storage_path,
            stored_file_name: file_name.to_string(),
        });
    }

    records.sort_by_key(|r| r.id);
    Ok(records)
}

/// Stable id for a path relative to the storage root.
///
/// First eight bytes of the BLAKE3 hash of the `/`-joined components, kept
/// positive.
pub fn path_id(relative: &Path) -> i64 {
    let joined = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/");
    let hash = blake3::hash(joined.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    (u64::from_le_bytes(bytes) & i64::MAX as u64) as i64
}

fn midnight_utc(date: chrono::NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::fs;
    use tempfile::tempdir;

    fn touch(path: &Path, bytes: usize) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, vec![0u8; bytes]).unwrap();
    }

    #[tokio::test]
    async fn test_scan_derives_records() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("maps-2.10.0--20240105.apk"), 100);
        touch(&dir.path().join("acme/scanner-1.0--20231201.apk"), 50);
        touch(&dir.path().join("notes.txt"), 1);
        touch(&dir.path().join("random.apk"), 1);

        let catalog = FilesystemScanCatalog::new(dir.path());
        let mut records = catalog.all().await.unwrap();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(records.len(), 2);

        let maps = &records[0];
        assert_eq!(maps.name, "maps");
        assert_eq!(maps.version, "2.10.0");
        assert_eq!(maps.client, None);
        assert_eq!(maps.size_bytes, 100);
        assert_eq!(
            maps.created_at,
            midnight_utc(NaiveDate::from_ymd_opt(2024, 1, 5).unwrap())
        );

        let scanner = &records[1];
        assert_eq!(scanner.client.as_deref(), Some("acme"));
        assert_eq!(scanner.storage_path, dir.path().join("acme"));
    }

    #[tokio::test]
    async fn test_ids_are_stable_and_distinct() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("maps-1.0--20240105.apk"), 1);
        touch(&dir.path().join("acme/maps-1.0--20240105.apk"), 1);

        let catalog = FilesystemScanCatalog::new(dir.path());
        let first: Vec<i64> = catalog.all().await.unwrap().iter().map(|r| r.id).collect();
        let second: Vec<i64> = catalog.all().await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_ne!(first[0], first[1]);
        assert!(first.iter().all(|id| *id >= 0));
    }

    #[tokio::test]
    async fn test_insert_requires_file() {
        let dir = tempdir().unwrap();
        let catalog = FilesystemScanCatalog::new(dir.path());
        let artifact = NewArtifact {
            name: "maps".to_string(),
            version: "1.0".to_string(),
            client: None,
            size_bytes: 3,
            created_at: Utc::now(),
            storage_path: dir.path().to_path_buf(),
            stored_file_name: "maps-1.0--20240105.apk".to_string(),
        };

        let err = catalog.insert(artifact.clone()).await.unwrap_err();
        assert!(matches!(err, CatalogError::MissingFile(_)));

        touch(&artifact.file_path(), 3);
        let record = catalog.insert(artifact).await.unwrap();
        assert_eq!(catalog.get(record.id).await.unwrap().unwrap().stored_file_name, record.stored_file_name);
    }

    #[tokio::test]
    async fn test_delete_removes_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("maps-1.0--20240105.apk");
        touch(&path, 1);

        let catalog = FilesystemScanCatalog::new(dir.path());
        let id = catalog.all().await.unwrap()[0].id;
        assert!(catalog.delete(id).await.unwrap());
        assert!(!path.exists());
        assert!(!catalog.delete(id).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_root_is_empty() {
        let catalog = FilesystemScanCatalog::new("/nonexistent/apkvc/files");
        assert!(catalog.all().await.unwrap().is_empty());
    }
}
