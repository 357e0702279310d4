//! Configuration
//!
//! Resolved from an optional TOML file plus `APKVC_*` environment overrides.
//! Every path defaults to a location under the home directory (`~/.apkvc`).

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use dirs::home_dir;
use serde::Deserialize;
use thiserror::Error;

use crate::io::extract::{DEFAULT_IN_MEMORY_THRESHOLD, ExtractOptions};

/// Config file looked up under the home directory when no path is given.
pub const CONFIG_FILE: &str = "config.toml";

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Longest accepted `retention.interval_secs` (ten years).
pub const MAX_SWEEP_INTERVAL_SECS: u64 = 3650 * SECS_PER_DAY;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine home directory. Set APKVC_HOME to override.")]
    NoHome,

    #[error("Failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Failed to create {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Which catalog backend to run. Fixed for the lifetime of a process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogBackend {
    #[default]
    Database,
    Filesystem,
}

impl FromStr for CatalogBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "database" | "db" | "sqlite" => Ok(Self::Database),
            "filesystem" | "fs" => Ok(Self::Filesystem),
            _ => Err(ConfigError::InvalidValue {
                key: "catalog",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for CatalogBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Database => f.write_str("database"),
            Self::Filesystem => f.write_str("filesystem"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractConfig {
    pub in_memory_threshold_bytes: u64,
    pub workers: Option<usize>,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            in_memory_threshold_bytes: DEFAULT_IN_MEMORY_THRESHOLD,
            workers: None,
        }
    }
}

impl ExtractConfig {
    pub fn options(&self) -> ExtractOptions {
        ExtractOptions {
            in_memory_threshold: self.in_memory_threshold_bytes,
            workers: self.workers,
        }
    }
}

/// Settings for the JVM-backed manifest decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Explicit `java` binary; `None` searches `PATH`.
    pub java: Option<PathBuf>,
    pub jar: PathBuf,
    pub timeout_secs: u64,
    pub min_java_major: u32,
}

impl DecoderConfig {
    pub fn for_home(home: &Path) -> Self {
        Self {
            java: None,
            jar: home.join("lib").join("AXMLPrinter2.jar"),
            timeout_secs: 30,
            min_java_major: 8,
        }
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self::for_home(&try_apkvc_home().unwrap_or_else(|| PathBuf::from(".apkvc")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionConfig {
    /// Artifacts older than this many calendar months are purged.
    pub window_months: u32,
    pub interval_secs: u64,
    pub run_on_start: bool,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            window_months: 2,
            interval_secs: 30 * SECS_PER_DAY,
            run_on_start: false,
        }
    }
}

/// Fully resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub home: PathBuf,
    pub storage_root: PathBuf,
    pub database_path: PathBuf,
    /// Scratch area for spooled uploads; keep it on the storage volume.
    pub work_dir: PathBuf,
    pub catalog: CatalogBackend,
    pub extract: ExtractConfig,
    pub decoder: DecoderConfig,
    pub retention: RetentionConfig,
}

/// On-disk shape of `config.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    home: Option<PathBuf>,
    storage_root: Option<PathBuf>,
    database_path: Option<PathBuf>,
    work_dir: Option<PathBuf>,
    catalog: Option<CatalogBackend>,
    extract: FileExtract,
    decoder: FileDecoder,
    retention: FileRetention,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileExtract {
    in_memory_threshold_bytes: Option<u64>,
    workers: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileDecoder {
    java: Option<PathBuf>,
    jar: Option<PathBuf>,
    timeout_secs: Option<u64>,
    min_java_major: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileRetention {
    window_months: Option<u32>,
    interval_secs: Option<u64>,
    run_on_start: Option<bool>,
}

/// Returns the home directory, or None if the user's home cannot be resolved.
pub fn try_apkvc_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("APKVC_HOME") {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".apkvc"))
}

impl Config {
    /// All defaults rooted at `home`. No file or environment is consulted.
    pub fn for_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        Self {
            storage_root: home.join("files"),
            database_path: home.join("catalog.db"),
            work_dir: home.join("tmp"),
            catalog: CatalogBackend::default(),
            extract: ExtractConfig::default(),
            decoder: DecoderConfig::for_home(&home),
            retention: RetentionConfig::default(),
            home,
        }
    }

    /// Load from `path`, or from `{home}/config.toml` if it exists, then apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let env = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

        let file = match path {
            Some(path) => read_file(path)?,
            None => {
                let default_path = try_apkvc_home()
                    .ok_or(ConfigError::NoHome)?
                    .join(CONFIG_FILE);
                if default_path.is_file() {
                    read_file(&default_path)?
                } else {
                    FileConfig::default()
                }
            }
        };

        let default_home = env("APKVC_HOME")
            .map(PathBuf::from)
            .or_else(|| file.home.clone())
            .or_else(try_apkvc_home)
            .ok_or(ConfigError::NoHome)?;

        resolve(file, default_home, env)
    }

    /// Parse TOML text on top of defaults rooted at `home`. No environment is consulted.
    pub fn from_toml_str(text: &str, home: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        let home = file.home.clone().unwrap_or_else(|| home.into());
        resolve(file, home, |_| None)
    }

    /// Create the storage root, work dir and database parent directory.
    pub fn ensure_dirs(&self) -> Result<(), ConfigError> {
        let db_parent = self.database_path.parent().map(Path::to_path_buf);
        for dir in [Some(self.storage_root.clone()), Some(self.work_dir.clone()), db_parent]
            .into_iter()
            .flatten()
        {
            if dir.as_os_str().is_empty() {
                continue;
            }
            fs::create_dir_all(&dir).map_err(|source| ConfigError::CreateDir {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Layer: environment > file > defaults derived from `home`.
fn resolve<F>(file: FileConfig, home: PathBuf, env: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = Config::for_home(home);

    config.storage_root = env("APKVC_STORAGE_ROOT")
        .map(PathBuf::from)
        .or(file.storage_root)
        .unwrap_or(config.storage_root);
    config.database_path = env("APKVC_DATABASE")
        .map(PathBuf::from)
        .or(file.database_path)
        .unwrap_or(config.database_path);
    config.work_dir = file.work_dir.unwrap_or(config.work_dir);

    config.catalog = match env("APKVC_CATALOG") {
        Some(value) => value.parse()?,
        None => file.catalog.unwrap_or(config.catalog),
    };

    if let Some(bytes) = file.extract.in_memory_threshold_bytes {
        config.extract.in_memory_threshold_bytes = bytes;
    }
    if let Some(workers) = file.extract.workers {
        if workers == 0 {
            return Err(ConfigError::InvalidValue {
                key: "extract.workers",
                value: workers.to_string(),
            });
        }
        config.extract.workers = Some(workers);
    }

    config.decoder.java = env("APKVC_JAVA").map(PathBuf::from).or(file.decoder.java);
    config.decoder.jar = env("APKVC_DECODER_JAR")
        .map(PathBuf::from)
        .or(file.decoder.jar)
        .unwrap_or(config.decoder.jar);
    if let Some(secs) = file.decoder.timeout_secs {
        config.decoder.timeout_secs = secs;
    }
    if let Some(major) = file.decoder.min_java_major {
        config.decoder.min_java_major = major;
    }

    if let Some(months) = file.retention.window_months {
        config.retention.window_months = months;
    }
    if let Some(secs) = file.retention.interval_secs {
        if secs == 0 || secs > MAX_SWEEP_INTERVAL_SECS {
            return Err(ConfigError::InvalidValue {
                key: "retention.interval_secs",
                value: secs.to_string(),
            });
        }
        config.retention.interval_secs = secs;
    }
    if let Some(run) = file.retention.run_on_start {
        config.retention.run_on_start = run;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_under_home() {
        let config = Config::for_home("/srv/apkvc");
        assert_eq!(config.storage_root, PathBuf::from("/srv/apkvc/files"));
        assert_eq!(config.database_path, PathBuf::from("/srv/apkvc/catalog.db"));
        assert_eq!(config.work_dir, PathBuf::from("/srv/apkvc/tmp"));
        assert_eq!(config.decoder.jar, PathBuf::from("/srv/apkvc/lib/AXMLPrinter2.jar"));
        assert_eq!(config.catalog, CatalogBackend::Database);
        assert_eq!(config.retention.window_months, 2);
        assert_eq!(config.retention.interval_secs, 30 * SECS_PER_DAY);
        assert!(!config.retention.run_on_start);
        assert_eq!(config.extract.in_memory_threshold_bytes, 100 * 1024 * 1024);
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let text = r#"
            catalog = "filesystem"
            storage_root = "/data/apks"

            [extract]
            workers = 2

            [decoder]
            timeout_secs = 5

            [retention]
            run_on_start = true
        "#;
        let config = Config::from_toml_str(text, "/srv/apkvc").unwrap();
        assert_eq!(config.catalog, CatalogBackend::Filesystem);
        assert_eq!(config.storage_root, PathBuf::from("/data/apks"));
        assert_eq!(config.database_path, PathBuf::from("/srv/apkvc/catalog.db"));
        assert_eq!(config.extract.workers, Some(2));
        assert_eq!(config.decoder.timeout_secs, 5);
        assert_eq!(config.decoder.min_java_major, 8);
        assert!(config.retention.run_on_start);
    }

    #[test]
    fn test_home_in_file_moves_derived_paths() {
        let config = Config::from_toml_str(r#"home = "/opt/vault""#, "/srv/apkvc").unwrap();
        assert_eq!(config.storage_root, PathBuf::from("/opt/vault/files"));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let err = Config::from_toml_str("storage = \"/x\"", "/srv").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_zero_workers_is_rejected() {
        let err = Config::from_toml_str("[extract]\nworkers = 0", "/srv").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "extract.workers", .. }));
    }

    #[test]
    fn test_sweep_interval_bounds() {
        for secs in [0, i64::MAX as u64, MAX_SWEEP_INTERVAL_SECS + 1] {
            let err = Config::from_toml_str(&format!("[retention]\ninterval_secs = {secs}"), "/srv")
                .unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { key: "retention.interval_secs", .. }));
        }

        let config = Config::from_toml_str(
            &format!("[retention]\ninterval_secs = {MAX_SWEEP_INTERVAL_SECS}"),
            "/srv",
        )
        .unwrap();
        assert_eq!(config.retention.interval_secs, MAX_SWEEP_INTERVAL_SECS);
    }

    #[test]
    fn test_env_takes_precedence_over_file() {
        let file: FileConfig = toml::from_str(
            r#"
            catalog = "filesystem"
            database_path = "/from/file.db"
            "#,
        )
        .unwrap();
        let env = |key: &str| match key {
            "APKVC_CATALOG" => Some("database".to_string()),
            "APKVC_DATABASE" => Some("/from/env.db".to_string()),
            "APKVC_JAVA" => Some("/usr/lib/jvm/bin/java".to_string()),
            _ => None,
        };
        let config = resolve(file, PathBuf::from("/srv"), env).unwrap();
        assert_eq!(config.catalog, CatalogBackend::Database);
        assert_eq!(config.database_path, PathBuf::from("/from/env.db"));
        assert_eq!(config.decoder.java, Some(PathBuf::from("/usr/lib/jvm/bin/java")));
    }

    #[test]
    fn test_catalog_backend_from_str() {
        assert_eq!("FS".parse::<CatalogBackend>().unwrap(), CatalogBackend::Filesystem);
        assert_eq!("sqlite".parse::<CatalogBackend>().unwrap(), CatalogBackend::Database);
        assert!("redis".parse::<CatalogBackend>().is_err());
    }

    #[test]
    fn test_ensure_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::for_home(dir.path().join("home"));
        config.ensure_dirs().unwrap();
        assert!(config.storage_root.is_dir());
        assert!(config.work_dir.is_dir());
        assert!(config.database_path.parent().unwrap().is_dir());
    }
}
