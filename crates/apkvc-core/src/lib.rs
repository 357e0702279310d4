//! apkvc core
//!
//! APK ingestion and versioning: archive extraction, manifest version
//! reading, stored-name construction, the version catalog, the ingestion
//! pipeline and the retention sweeper. [`Vault`] ties them together.

pub mod catalog;
pub mod config;
pub mod error;
pub mod ingest;
pub mod io;
pub mod manifest;
pub mod naming;
pub mod retention;
pub mod vault;

pub use catalog::{Catalog, CatalogError, DatabaseCatalog, FilesystemScanCatalog};
pub use config::{CatalogBackend, Config, ConfigError};
pub use error::{ErrorKind, VaultError};
pub use ingest::{IngestError, IngestRequest, Ingestor};
pub use manifest::{DecodeError, DecodedManifest, Decoder, JavaDecoder};
pub use retention::{Retention, RetentionSweeper, SweepReport};
pub use vault::{DeletedArtifact, DownloadTarget, UPLOAD_SUCCESS_MESSAGE, Vault};

pub use apkvc_schema as schema;
