use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A stored APK as persisted in the catalog.
///
/// Records are immutable once committed: a new upload is always a new record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRecord {
    /// Surrogate key.
    pub id: i64,

    /// Logical package name (sanitized base of the uploaded filename).
    pub name: String,

    /// Version name read from the manifest (e.g. "2.10.0").
    pub version: String,

    /// Tenant/namespace, lower-cased. `None` for the shared partition.
    pub client: Option<String>,

    /// Size of the stored file in bytes.
    pub size_bytes: u64,

    /// Ingestion timestamp, authoritative for retention and ranking tie-breaks.
    pub created_at: DateTime<Utc>,

    /// Directory that holds the stored file.
    pub storage_path: PathBuf,

    /// `{base}-{version}--{yyyyMMdd}.apk`
    pub stored_file_name: String,
}

impl ArtifactRecord {
    /// Absolute path of the backing file.
    pub fn file_path(&self) -> PathBuf {
        self.storage_path.join(&self.stored_file_name)
    }

    /// Size in MiB rounded to two decimals, as the listing API reports it.
    pub fn size_mb(&self) -> f64 {
        size_in_mb(self.size_bytes)
    }
}

/// Insert payload for a catalog: an [`ArtifactRecord`] without its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewArtifact {
    /// Logical package name.
    pub name: String,
    /// Manifest version name.
    pub version: String,
    /// Lower-cased tenant, if any.
    pub client: Option<String>,
    /// Size of the stored file in bytes.
    pub size_bytes: u64,
    /// Ingestion timestamp.
    pub created_at: DateTime<Utc>,
    /// Directory that holds the stored file.
    pub storage_path: PathBuf,
    /// Stored filename.
    pub stored_file_name: String,
}

impl NewArtifact {
    /// Attach the id assigned by the catalog.
    pub fn into_record(self, id: i64) -> ArtifactRecord {
        ArtifactRecord {
            id,
            name: self.name,
            version: self.version,
            client: self.client,
            size_bytes: self.size_bytes,
            created_at: self.created_at,
            storage_path: self.storage_path,
            stored_file_name: self.stored_file_name,
        }
    }

    /// Absolute path of the file this record will point at.
    pub fn file_path(&self) -> PathBuf {
        self.storage_path.join(&self.stored_file_name)
    }
}

/// Query-time projection of a record with its positional tags.
///
/// The tags are only meaningful relative to the filtered result set they were
/// computed over and are never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactView {
    /// The underlying record.
    #[serde(flatten)]
    pub record: ArtifactRecord,

    /// Size in MiB, two decimals.
    pub size_mb: f64,

    /// First entry of the ranked result set.
    pub is_current_version: bool,

    /// Second entry of the ranked result set.
    pub is_previous_version: bool,
}

impl ArtifactView {
    /// Untagged view of a record.
    pub fn new(record: ArtifactRecord) -> Self {
        let size_mb = record.size_mb();
        Self {
            record,
            size_mb,
            is_current_version: false,
            is_previous_version: false,
        }
    }
}

/// Optional list criteria. Blank values behave as absent.
///
/// `version` matches exactly; `name` and `client` are case-insensitive
/// substring matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListFilter {
    /// Substring of the package name.
    pub name: Option<String>,
    /// Exact version name.
    pub version: Option<String>,
    /// Substring of the client.
    pub client: Option<String>,
}

impl ListFilter {
    /// Filter on a name substring.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Filter on an exact version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Filter on a client substring.
    pub fn with_client(mut self, client: impl Into<String>) -> Self {
        self.client = Some(client.into());
        self
    }

    /// Trimmed, lower-cased criteria with blanks dropped.
    ///
    /// The version is trimmed but keeps its case.
    pub fn normalized(&self) -> Self {
        Self {
            name: non_blank(self.name.as_deref()).map(str::to_lowercase),
            version: non_blank(self.version.as_deref()).map(str::to_string),
            client: non_blank(self.client.as_deref()).map(str::to_lowercase),
        }
    }

    /// Whether no criterion is set.
    pub fn is_empty(&self) -> bool {
        let n = self.normalized();
        n.name.is_none() && n.version.is_none() && n.client.is_none()
    }

    /// Evaluate the filter against a record.
    pub fn matches(&self, record: &ArtifactRecord) -> bool {
        let filter = self.normalized();

        if filter.version.as_ref().is_some_and(|v| record.version != *v) {
            return false;
        }
        if filter
            .name
            .as_ref()
            .is_some_and(|name| !record.name.to_lowercase().contains(name.as_str()))
        {
            return false;
        }
        if let Some(client) = &filter.client {
            match &record.client {
                Some(c) if c.to_lowercase().contains(client.as_str()) => {}
                _ => return false,
            }
        }
        true
    }
}

/// Normalise a client tag: trimmed and lower-cased, blanks become `None`.
pub fn normalize_client(client: Option<&str>) -> Option<String> {
    non_blank(client).map(str::to_lowercase)
}

/// Bytes to MiB, rounded to two decimals.
pub fn size_in_mb(bytes: u64) -> f64 {
    (bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(name: &str, version: &str, client: Option<&str>) -> ArtifactRecord {
        ArtifactRecord {
            id: 1,
            name: name.to_string(),
            version: version.to_string(),
            client: client.map(str::to_string),
            size_bytes: 3 * 1024 * 1024 / 2,
            created_at: Utc.with_ymd_and_hms(2024, 1, 5, 10, 0, 0).unwrap(),
            storage_path: PathBuf::from("/srv/files"),
            stored_file_name: format!("{name}-{version}--20240105.apk"),
        }
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = ListFilter::default();
        assert!(filter.is_empty());
        assert!(filter.matches(&record("app", "1.0", None)));
        assert!(filter.matches(&record("app", "1.0", Some("acme"))));
    }

    #[test]
    fn test_blank_values_are_absent() {
        let filter = ListFilter::default().with_name("  ").with_client("");
        assert!(filter.is_empty());
        assert!(filter.matches(&record("app", "1.0", None)));
    }

    #[test]
    fn test_name_is_case_insensitive_substring() {
        let filter = ListFilter::default().with_name("MAPS");
        assert!(filter.matches(&record("offline_maps", "1.0", None)));
        assert!(!filter.matches(&record("wallet", "1.0", None)));
    }

    #[test]
    fn test_version_is_exact() {
        let filter = ListFilter::default().with_version("1.0");
        assert!(filter.matches(&record("app", "1.0", None)));
        assert!(!filter.matches(&record("app", "1.0.1", None)));
    }

    #[test]
    fn test_client_filter_excludes_shared_partition() {
        let filter = ListFilter::default().with_client("Acme");
        assert!(filter.matches(&record("app", "1.0", Some("acme"))));
        assert!(!filter.matches(&record("app", "1.0", None)));
    }

    #[test]
    fn test_normalize_client() {
        assert_eq!(normalize_client(Some(" ACME ")), Some("acme".to_string()));
        assert_eq!(normalize_client(Some("   ")), None);
        assert_eq!(normalize_client(None), None);
    }

    #[test]
    fn test_file_path_and_size() {
        let r = record("app", "2.3.1", None);
        assert_eq!(
            r.file_path(),
            PathBuf::from("/srv/files/app-2.3.1--20240105.apk")
        );
        assert!((r.size_mb() - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_view_serializes_camel_case_flat() {
        let view = ArtifactView::new(record("app", "1.0", Some("acme")));
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["storedFileName"], "app-1.0--20240105.apk");
        assert_eq!(json["isCurrentVersion"], false);
        assert_eq!(json["client"], "acme");
    }
}
