//! Vault facade
//!
//! One entry point bundling configuration, catalog, decoder and retention:
//! upload, list, download, delete and sweep.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use apkvc_schema::{APK_CONTENT_TYPE, ArtifactRecord, ArtifactView, ListFilter};
use chrono::Utc;
use tokio::io::AsyncRead;

use crate::catalog::{self, Catalog};
use crate::config::Config;
use crate::error::VaultError;
use crate::ingest::{IngestError, IngestRequest, Ingestor};
use crate::manifest::{Decoder, JavaDecoder};
use crate::retention::{Retention, SweepReport};

/// Message the upload endpoint answers with on success.
pub const UPLOAD_SUCCESS_MESSAGE: &str = "APK file received, processed, and saved successfully.";

/// Where to serve an artifact from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTarget {
    pub id: i64,
    pub path: PathBuf,
    pub file_name: String,
    pub content_type: &'static str,
    pub size_bytes: u64,
}

/// Result of [`Vault::delete`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedArtifact {
    pub record: ArtifactRecord,
    /// False when the backing file was already gone.
    pub file_removed: bool,
}

#[derive(Debug, Clone)]
pub struct Vault {
    config: Config,
    catalog: Arc<dyn Catalog>,
    decoder: Arc<dyn Decoder>,
    ingestor: Ingestor,
    retention: Retention,
}

impl Vault {
    /// Create directories, open the configured catalog and the JVM decoder.
    pub fn open(config: Config) -> Result<Self, VaultError> {
        config.ensure_dirs()?;
        let catalog = catalog::open_catalog(&config)?;
        let decoder: Arc<dyn Decoder> = Arc::new(JavaDecoder::new(&config.decoder));
        Ok(Self::with_parts(config, catalog, decoder))
    }

    /// Assemble from explicit parts. Directories are not created.
    pub fn with_parts(config: Config, catalog: Arc<dyn Catalog>, decoder: Arc<dyn Decoder>) -> Self {
        let ingestor = Ingestor::new(&config, Arc::clone(&catalog), Arc::clone(&decoder));
        let retention = Retention::new(
            Arc::clone(&catalog),
            config.storage_root.clone(),
            config.retention.window_months,
        );
        Self {
            config,
            catalog,
            decoder,
            ingestor,
            retention,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.catalog
    }

    pub fn ingestor(&self) -> &Ingestor {
        &self.ingestor
    }

    /// Retention policy, for handing to a [`crate::retention::RetentionSweeper`].
    pub fn retention(&self) -> &Retention {
        &self.retention
    }

    pub async fn ingest<R>(
        &self,
        reader: R,
        request: &IngestRequest,
    ) -> Result<ArtifactRecord, VaultError>
    where
        R: AsyncRead + Unpin + Send,
    {
        Ok(self.ingestor.ingest(reader, request).await?)
    }

    /// Ingest a local file, using its filename as the upload name.
    pub async fn ingest_file(
        &self,
        path: &Path,
        client: Option<&str>,
    ) -> Result<ArtifactRecord, VaultError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                IngestError::InvalidInput(format!("{} has no usable file name", path.display()))
            })?;
        let file = tokio::fs::File::open(path).await.map_err(|source| VaultError::Storage {
            context: format!("open {}", path.display()),
            source,
        })?;

        let mut request = IngestRequest::new(file_name);
        request.client = client.map(str::to_string);
        self.ingest(file, &request).await
    }

    pub async fn list(&self, filter: &ListFilter) -> Result<Vec<ArtifactView>, VaultError> {
        Ok(catalog::list(self.catalog.as_ref(), filter).await?)
    }

    pub async fn download(&self, id: i64) -> Result<DownloadTarget, VaultError> {
        let record = self
            .catalog
            .get(id)
            .await?
            .ok_or(VaultError::NotFound(id))?;

        let path = record.file_path();
        let is_file = tokio::fs::metadata(&path)
            .await
            .is_ok_and(|m| m.is_file());
        if !is_file {
            return Err(VaultError::FileMissing { id, path });
        }

        Ok(DownloadTarget {
            id,
            path,
            file_name: record.stored_file_name,
            content_type: APK_CONTENT_TYPE,
            size_bytes: record.size_bytes,
        })
    }

    /// Remove the backing file, then the record.
    pub async fn delete(&self, id: i64) -> Result<DeletedArtifact, VaultError> {
        let record = self
            .catalog
            .get(id)
            .await?
            .ok_or(VaultError::NotFound(id))?;

        let path = record.file_path();
        let file_removed = match tokio::fs::remove_file(&path).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("File for artifact {} was already gone: {}", id, path.display());
                false
            }
            Err(source) => {
                return Err(VaultError::Storage {
                    context: format!("delete {}", path.display()),
                    source,
                });
            }
        };

        // The filesystem backend has nothing left to remove once the file is gone.
        let removed = self.catalog.delete(id).await?;
        if !removed {
            tracing::debug!("Catalog had no separate record for artifact {}", id);
        }

        tracing::info!("Deleted {} (id {})", record.stored_file_name, id);
        Ok(DeletedArtifact {
            record,
            file_removed,
        })
    }

    pub async fn sweep(&self) -> Result<SweepReport, VaultError> {
        Ok(self.retention.sweep(Utc::now()).await?)
    }

    /// Check the decoder's runtime dependencies.
    pub async fn check_decoder(&self) -> Result<String, VaultError> {
        let decoder = Arc::clone(&self.decoder);
        let status = tokio::task::spawn_blocking(move || decoder.check())
            .await
            .map_err(|e| IngestError::Background(e.to_string()))??;
        Ok(status)
    }
}
