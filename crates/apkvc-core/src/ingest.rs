//! Ingestion pipeline
//!
//! spool upload -> extract -> read version -> name -> store -> catalog insert.
//!
//! Everything before the store step happens inside a per-ingestion temp
//! directory, and cancelling there leaves nothing behind. Store and catalog
//! insert run together on a spawned task that finishes even if the caller is
//! dropped. The stored file is held by a [`StagedFile`] until the insert
//! commits, so a failed ingestion leaves no file and no record.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use apkvc_schema::{APK_EXTENSION, ArtifactRecord, NewArtifact, normalize_client};
use chrono::{DateTime, Utc};
use tempfile::TempDir;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWriteExt};

use crate::catalog::{Catalog, CatalogError};
use crate::config::Config;
use crate::io::extract::{self, ExtractError, ExtractOptions};
use crate::manifest::{self, Decoder, ManifestError, ManifestInfo};
use crate::naming::{self, NamingError};

const SPOOL_FILE: &str = "upload.apk";
const EXTRACT_DIR: &str = "extracted";

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Naming(#[from] NamingError),

    #[error("Storage error: {context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("Artifact already exists: {}", .0.display())]
    Conflict(PathBuf),

    #[error("Catalog insert failed: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Ingestion task failed: {0}")]
    Background(String),
}

impl IngestError {
    fn storage(context: impl Into<String>, source: io::Error) -> Self {
        Self::Storage {
            context: context.into(),
            source,
        }
    }
}

/// What the uploader told us about the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestRequest {
    /// Filename as uploaded; must end in `.apk`.
    pub original_file_name: String,
    /// Optional tenant. Trimmed and lower-cased; blank means none.
    pub client: Option<String>,
}

impl IngestRequest {
    pub fn new(original_file_name: impl Into<String>) -> Self {
        Self {
            original_file_name: original_file_name.into(),
            client: None,
        }
    }

    pub fn with_client(mut self, client: impl Into<String>) -> Self {
        self.client = Some(client.into());
        self
    }
}

/// A stored file not yet backed by a catalog record.
///
/// Dropping it without [`StagedFile::commit`] deletes the file.
#[derive(Debug)]
pub struct StagedFile {
    path: Option<PathBuf>,
}

impl StagedFile {
    fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Keep the file.
    pub fn commit(mut self) -> PathBuf {
        self.path.take().unwrap_or_default()
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::warn!("Rolled back staged file {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Failed to roll back {}: {}", path.display(), e),
            }
        }
    }
}

/// Runs ingestions against one catalog and storage root.
#[derive(Debug, Clone)]
pub struct Ingestor {
    catalog: Arc<dyn Catalog>,
    decoder: Arc<dyn Decoder>,
    storage_root: PathBuf,
    work_dir: PathBuf,
    extract: ExtractOptions,
}

impl Ingestor {
    pub fn new(config: &Config, catalog: Arc<dyn Catalog>, decoder: Arc<dyn Decoder>) -> Self {
        Self {
            catalog,
            decoder,
            storage_root: config.storage_root.clone(),
            work_dir: config.work_dir.clone(),
            extract: config.extract.options(),
        }
    }

    /// Ingest an upload stream, stamped with the current time.
    pub async fn ingest<R>(
        &self,
        reader: R,
        request: &IngestRequest,
    ) -> Result<ArtifactRecord, IngestError>
    where
        R: AsyncRead + Unpin + Send,
    {
        self.ingest_at(reader, request, Utc::now()).await
    }

    /// Ingest an upload stream with an explicit ingestion time.
    pub async fn ingest_at<R>(
        &self,
        mut reader: R,
        request: &IngestRequest,
        now: DateTime<Utc>,
    ) -> Result<ArtifactRecord, IngestError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let original = validate_file_name(&request.original_file_name)?;
        let client = validate_client(request.client.as_deref())?;

        let storage_dir = match &client {
            Some(client) => self.storage_root.join(client),
            None => self.storage_root.clone(),
        };
        tokio::fs::create_dir_all(&storage_dir)
            .await
            .map_err(|e| IngestError::storage(format!("create {}", storage_dir.display()), e))?;

        // Shared with the blocking stage so the directory outlives it even if
        // this future is dropped mid-extraction.
        let scratch = Arc::new(self.scratch_dir().await?);
        let spool_path = scratch.path().join(SPOOL_FILE);
        let size_bytes = spool(&mut reader, &spool_path).await?;
        if size_bytes == 0 {
            return Err(IngestError::InvalidInput("uploaded file is empty".to_string()));
        }

        let info = self.inspect(Arc::clone(&scratch), spool_path.clone()).await?;
        tracing::debug!(
            "Read {} version {} ({} bytes)",
            original,
            info.version_name,
            size_bytes
        );

        let stored_file_name =
            naming::build_stored_name(original, &info.version_name, now.date_naive())?;
        let name = naming::sanitize_base(original)
            .ok_or_else(|| NamingError::InvalidFileName(original.to_string()))?;

        let dest = storage_dir.join(&stored_file_name);
        let artifact = NewArtifact {
            name,
            version: info.version_name,
            client,
            size_bytes,
            created_at: now,
            storage_path: storage_dir,
            stored_file_name,
        };

        // Storing and recording run on their own task, so dropping this
        // future cannot leave a record without its file or the reverse.
        // The stored file is rolled back unless the insert succeeds.
        let catalog = Arc::clone(&self.catalog);
        let store_and_record = async move {
            let staged = store(&spool_path, &dest).await?;
            drop(scratch);

            let record = match catalog.insert(artifact).await {
                Ok(record) => record,
                Err(CatalogError::Duplicate { .. }) => return Err(IngestError::Conflict(dest)),
                Err(e) => return Err(e.into()),
            };
            staged.commit();
            Ok::<_, IngestError>(record)
        };
        let record = tokio::spawn(store_and_record)
            .await
            .map_err(|e| IngestError::Background(e.to_string()))??;

        tracing::info!(
            "Ingested {} as {} (id {})",
            original,
            record.stored_file_name,
            record.id
        );
        Ok(record)
    }

    async fn scratch_dir(&self) -> Result<TempDir, IngestError> {
        tokio::fs::create_dir_all(&self.work_dir)
            .await
            .map_err(|e| IngestError::storage(format!("create {}", self.work_dir.display()), e))?;
        tempfile::Builder::new()
            .prefix("apkvc-ingest-")
            .tempdir_in(&self.work_dir)
            .map_err(|e| IngestError::storage("create ingestion temp dir", e))
    }

    /// Extract the spooled archive and read its manifest on the blocking pool.
    async fn inspect(
        &self,
        scratch: Arc<TempDir>,
        spool_path: PathBuf,
    ) -> Result<ManifestInfo, IngestError> {
        let decoder = Arc::clone(&self.decoder);
        let options = self.extract;

        tokio::task::spawn_blocking(move || -> Result<ManifestInfo, IngestError> {
            let extracted = scratch.path().join(EXTRACT_DIR);
            let summary = extract::extract_with(&spool_path, &extracted, &options)?;
            tracing::debug!(
                "Extracted {} files ({} bytes, {:?})",
                summary.files,
                summary.bytes_written,
                summary.strategy
            );
            let info = manifest::read_manifest(&extracted, decoder.as_ref())?;
            drop(scratch);
            Ok(info)
        })
        .await
        .map_err(|e| IngestError::Background(e.to_string()))?
    }
}

fn validate_file_name(file_name: &str) -> Result<&str, IngestError> {
    let file_name = file_name.trim();
    if file_name.is_empty() {
        return Err(IngestError::InvalidInput("file name is required".to_string()));
    }
    let is_apk = Path::new(file_name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(APK_EXTENSION));
    if !is_apk {
        return Err(IngestError::InvalidInput(format!(
            "only .{APK_EXTENSION} files are accepted, got {file_name:?}"
        )));
    }
    Ok(file_name)
}

/// Normalised client that is safe to use as one directory name.
fn validate_client(client: Option<&str>) -> Result<Option<String>, IngestError> {
    let Some(client) = normalize_client(client) else {
        return Ok(None);
    };
    let unsafe_name = client == "."
        || client == ".."
        || client
            .chars()
            .any(|c| c.is_control() || matches!(c, '/' | '\\' | '<' | '>' | ':' | '"' | '|' | '?' | '*'));
    if unsafe_name {
        return Err(IngestError::InvalidInput(format!(
            "client {client:?} is not a valid directory name"
        )));
    }
    Ok(Some(client))
}

async fn spool<R>(reader: &mut R, path: &Path) -> Result<u64, IngestError>
where
    R: AsyncRead + Unpin + Send,
{
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| IngestError::storage("create spool file", e))?;
    let bytes = tokio::io::copy(reader, &mut file)
        .await
        .map_err(|e| IngestError::storage("spool upload", e))?;
    file.flush()
        .await
        .map_err(|e| IngestError::storage("spool upload", e))?;
    Ok(bytes)
}

/// Copy the spooled upload to `dest`, which must not exist yet.
async fn store(spool_path: &Path, dest: &Path) -> Result<StagedFile, IngestError> {
    let mut out = match tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dest)
        .await
    {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Err(IngestError::Conflict(dest.to_path_buf()));
        }
        Err(e) => return Err(IngestError::storage(format!("create {}", dest.display()), e)),
    };
    let staged = StagedFile::new(dest.to_path_buf());

    let mut input = tokio::fs::File::open(spool_path)
        .await
        .map_err(|e| IngestError::storage("reopen spool file", e))?;
    tokio::io::copy(&mut input, &mut out)
        .await
        .map_err(|e| IngestError::storage(format!("write {}", dest.display()), e))?;
    out.sync_all()
        .await
        .map_err(|e| IngestError::storage(format!("sync {}", dest.display()), e))?;

    Ok(staged)
}
