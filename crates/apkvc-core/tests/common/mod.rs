#![allow(dead_code)]

use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use apkvc_core::manifest::{DecodeError, DecodedManifest, Decoder};
use apkvc_core::schema::{ArtifactRecord, ListFilter, NewArtifact};
use apkvc_core::{
    Catalog, CatalogBackend, CatalogError, Config, DatabaseCatalog, FilesystemScanCatalog, Vault,
};
use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Notify;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// Leading bytes of an Android binary XML chunk.
pub const BINARY_XML_MAGIC: [u8; 4] = [0x03, 0x00, 0x08, 0x00];

/// Test context with a private vault home
pub struct TestContext {
    pub temp_dir: TempDir,
    pub config: Config,
    pub vault: Vault,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_decoder(Arc::new(FakeDecoder))
    }

    pub fn with_decoder(decoder: Arc<dyn Decoder>) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let config = Config::for_home(temp_dir.path().join(".apkvc"));
        config.ensure_dirs().expect("failed to create vault dirs");

        let catalog = Arc::new(DatabaseCatalog::open(&config.database_path).expect("catalog"));
        let vault = Vault::with_parts(config.clone(), catalog, decoder);
        Self {
            temp_dir,
            config,
            vault,
        }
    }

    /// Database-backed vault whose inserts reply `delay` after committing.
    ///
    /// The returned [`Notify`] fires once the row is committed.
    pub fn with_slow_inserts(delay: Duration) -> (Self, Arc<Notify>) {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let config = Config::for_home(temp_dir.path().join(".apkvc"));
        config.ensure_dirs().expect("failed to create vault dirs");

        let inserted = Arc::new(Notify::new());
        let inner = Arc::new(DatabaseCatalog::open(&config.database_path).expect("catalog"));
        let catalog = Arc::new(SlowInsertCatalog {
            inner,
            delay,
            inserted: Arc::clone(&inserted),
        });
        let vault = Vault::with_parts(config.clone(), catalog, Arc::new(FakeDecoder));
        let ctx = Self {
            temp_dir,
            config,
            vault,
        };
        (ctx, inserted)
    }

    pub fn filesystem_backed() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let config = Config::for_home(temp_dir.path().join(".apkvc"));
        config.ensure_dirs().expect("failed to create vault dirs");

        let catalog = Arc::new(FilesystemScanCatalog::new(&config.storage_root));
        let vault = Vault::with_parts(config.clone(), catalog, Arc::new(FakeDecoder));
        Self {
            temp_dir,
            config,
            vault,
        }
    }

    /// Every regular file under the storage root.
    pub fn stored_files(&self) -> Vec<PathBuf> {
        walkdir::WalkDir::new(&self.config.storage_root)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().to_path_buf())
            .collect()
    }

    /// Entries left in the ingestion work dir.
    pub fn work_dir_entries(&self) -> usize {
        fs::read_dir(&self.config.work_dir)
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    /// Write an APK to disk outside the vault and return its path.
    pub fn write_apk(&self, file_name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.temp_dir.path().join(file_name);
        fs::write(&path, bytes).expect("write apk");
        path
    }
}

pub fn text_manifest(version: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<manifest xmlns:android="http://schemas.android.com/apk/res/android"
    package="com.example.app"
    android:versionCode="1"
    android:versionName="{version}">
    <application android:label="App"/>
</manifest>"#
    )
}

/// A minimal APK whose manifest is already text XML.
pub fn apk_with_version(version: &str) -> Vec<u8> {
    build_zip(&[
        ("AndroidManifest.xml", text_manifest(version).as_bytes()),
        ("classes.dex", b"dex\n035\0"),
        ("res/layout/main.xml", b"<LinearLayout/>"),
    ])
}

/// A minimal APK with a "binary" manifest that [`FakeDecoder`] understands.
pub fn apk_with_binary_manifest(version: &str) -> Vec<u8> {
    let mut manifest = BINARY_XML_MAGIC.to_vec();
    manifest.extend_from_slice(version.as_bytes());
    build_zip(&[("AndroidManifest.xml", &manifest), ("classes.dex", b"dex")])
}

/// An APK without a manifest.
pub fn apk_without_manifest() -> Vec<u8> {
    build_zip(&[("classes.dex", b"dex"), ("resources.arsc", b"arsc")])
}

pub fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (name, data) in entries {
        zip.start_file(*name, options).expect("start zip entry");
        zip.write_all(data).expect("write zip entry");
    }
    zip.finish().expect("finish zip").into_inner()
}

/// Decodes the fixture binary format: magic bytes followed by the version.
#[derive(Debug)]
pub struct FakeDecoder;

impl Decoder for FakeDecoder {
    fn decode(&self, input: &Path) -> Result<DecodedManifest, DecodeError> {
        let bytes = fs::read(input)?;
        let version = bytes
            .strip_prefix(&BINARY_XML_MAGIC[..])
            .ok_or_else(|| DecodeError::Failed("not binary XML".to_string()))?;
        let version = String::from_utf8_lossy(version).into_owned();

        let scratch = tempfile::tempdir()?;
        let out = scratch.path().join("ManifestDecode.xml");
        fs::write(&out, text_manifest(&version))?;
        Ok(DecodedManifest::in_scratch(out, scratch))
    }
}

/// Decoder whose runtime is never available.
#[derive(Debug)]
pub struct MissingRuntime;

impl Decoder for MissingRuntime {
    fn decode(&self, _input: &Path) -> Result<DecodedManifest, DecodeError> {
        Err(DecodeError::DependencyUnavailable(
            "Java 8 or higher is not installed".to_string(),
        ))
    }

    fn check(&self) -> Result<String, DecodeError> {
        Err(DecodeError::DependencyUnavailable(
            "Java 8 or higher is not installed".to_string(),
        ))
    }
}

/// Commits inserts immediately but holds the reply back.
#[derive(Debug)]
pub struct SlowInsertCatalog {
    inner: Arc<dyn Catalog>,
    delay: Duration,
    inserted: Arc<Notify>,
}

#[async_trait]
impl Catalog for SlowInsertCatalog {
    async fn insert(&self, artifact: NewArtifact) -> Result<ArtifactRecord, CatalogError> {
        let record = self.inner.insert(artifact).await?;
        self.inserted.notify_one();
        tokio::time::sleep(self.delay).await;
        Ok(record)
    }

    async fn get(&self, id: i64) -> Result<Option<ArtifactRecord>, CatalogError> {
        self.inner.get(id).await
    }

    async fn all(&self) -> Result<Vec<ArtifactRecord>, CatalogError> {
        self.inner.all().await
    }

    async fn query(&self, filter: &ListFilter) -> Result<Vec<ArtifactRecord>, CatalogError> {
        self.inner.query(filter).await
    }

    async fn delete(&self, id: i64) -> Result<bool, CatalogError> {
        self.inner.delete(id).await
    }

    fn backend(&self) -> CatalogBackend {
        self.inner.backend()
    }
}
