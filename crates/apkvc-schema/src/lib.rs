//! Shared types for apkvc.
//!
//! The catalog record model, the query-time view, the list filter, the
//! dotted-tuple version ordering and the stored filename format all live here
//! so the core pipeline and any front end agree on them.

pub mod stored_name;
pub mod types;
pub mod version;

pub use stored_name::StoredName;
pub use types::*;
pub use version::{VersionKey, compare_versions};

/// MIME type served for downloaded artifacts.
pub const APK_CONTENT_TYPE: &str = "application/vnd.android.package-archive";

/// File extension (without the dot) accepted for uploads and used for stored files.
pub const APK_EXTENSION: &str = "apk";

/// `chrono` format of the ingestion date embedded in stored filenames.
pub const STORED_DATE_FORMAT: &str = "%Y%m%d";
