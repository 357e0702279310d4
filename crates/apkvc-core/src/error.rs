//! Error taxonomy
//!
//! Every module error maps to an [`ErrorKind`] with a stable string and the
//! HTTP status an upload/list/download service would answer with.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::config::ConfigError;
use crate::ingest::IngestError;
use crate::io::extract::ExtractError;
use crate::manifest::{DecodeError, ManifestError};
use crate::naming::NamingError;
use crate::retention::RetentionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    InvalidFileName,
    Extraction,
    ManifestMissing,
    VersionNotFound,
    Decode,
    DependencyUnavailable,
    Conflict,
    Storage,
    NotFound,
    Catalog,
    Config,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "InvalidInputError",
            Self::InvalidFileName => "InvalidFileNameError",
            Self::Extraction => "ExtractionError",
            Self::ManifestMissing => "ManifestMissingError",
            Self::VersionNotFound => "VersionNotFoundError",
            Self::Decode => "DecodeError",
            Self::DependencyUnavailable => "DependencyUnavailableError",
            Self::Conflict => "ConflictError",
            Self::Storage => "StorageError",
            Self::NotFound => "NotFoundError",
            Self::Catalog => "CatalogError",
            Self::Config => "ConfigError",
        }
    }

    pub fn status_code(self) -> u16 {
        match self {
            Self::InvalidInput | Self::InvalidFileName => 400,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::Extraction | Self::ManifestMissing | Self::VersionNotFound | Self::Decode => 422,
            Self::DependencyUnavailable => 503,
            Self::Storage | Self::Catalog | Self::Config => 500,
        }
    }

    /// Client errors are the uploader's fault; the rest are ours.
    pub fn is_client_error(self) -> bool {
        (400..500).contains(&self.status_code())
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ExtractError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Destination { .. } => ErrorKind::Storage,
            _ => ErrorKind::Extraction,
        }
    }
}

impl DecodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DependencyUnavailable(_) => ErrorKind::DependencyUnavailable,
            Self::Failed(_) | Self::Io(_) => ErrorKind::Decode,
        }
    }
}

impl ManifestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Missing(_) => ErrorKind::ManifestMissing,
            Self::VersionNotFound(_) => ErrorKind::VersionNotFound,
            Self::Decode(e) => e.kind(),
            Self::Io(_) => ErrorKind::Storage,
        }
    }
}

impl NamingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidFileName(_) => ErrorKind::InvalidFileName,
            Self::InvalidVersion(_) => ErrorKind::VersionNotFound,
        }
    }
}

impl CatalogError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Duplicate { .. } => ErrorKind::Conflict,
            Self::MissingFile(_) | Self::OutsideRoot(_) | Self::Io(_) => ErrorKind::Storage,
            _ => ErrorKind::Catalog,
        }
    }
}

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Extraction(e) => e.kind(),
            Self::Manifest(e) => e.kind(),
            Self::Naming(e) => e.kind(),
            Self::Storage { .. } | Self::Background(_) => ErrorKind::Storage,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Catalog(e) => e.kind(),
        }
    }
}

impl RetentionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::StorageRootMissing(_) => ErrorKind::Storage,
            Self::Catalog(e) => e.kind(),
        }
    }
}

/// Error returned by [`crate::Vault`] operations.
#[derive(Error, Debug)]
pub enum VaultError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Retention(#[from] RetentionError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Artifact {0} not found")]
    NotFound(i64),

    #[error("File for artifact {id} is missing: {}", .path.display())]
    FileMissing { id: i64, path: PathBuf },

    #[error("Storage error: {context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl VaultError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Ingest(e) => e.kind(),
            Self::Catalog(e) => e.kind(),
            Self::Retention(e) => e.kind(),
            Self::Config(_) => ErrorKind::Config,
            Self::Decode(e) => e.kind(),
            Self::NotFound(_) | Self::FileMissing { .. } => ErrorKind::NotFound,
            Self::Storage { .. } => ErrorKind::Storage,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }

    /// `"{kind}: {message}"`, without the source chain.
    pub fn public_message(&self) -> String {
        format!("{}: {}", self.kind(), self)
    }
}
