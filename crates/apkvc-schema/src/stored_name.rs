//! Stored filename wire format: `{base}-{version}--{yyyyMMdd}.apk`.
//!
//! The double dash before the date is the delimiter parsers split on, so a
//! valid `version` never contains `-`. The base may contain single dashes;
//! the version is always the segment after the last one.

use chrono::NaiveDate;
use std::fmt;

use crate::{APK_EXTENSION, STORED_DATE_FORMAT};

/// Components of a stored filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredName {
    /// Sanitized base name.
    pub base: String,
    /// Sanitized version (no `-`).
    pub version: String,
    /// Ingestion date.
    pub date: NaiveDate,
}

impl StoredName {
    /// Recover the components from a stored filename.
    ///
    /// Returns `None` for anything not in the stored format.
    pub fn parse(file_name: &str) -> Option<Self> {
        let stem = file_name
            .strip_suffix(APK_EXTENSION)
            .and_then(|s| s.strip_suffix('.'))?;

        let (head, date) = stem.rsplit_once("--")?;
        if date.len() != 8 {
            return None;
        }
        let date = NaiveDate::parse_from_str(date, STORED_DATE_FORMAT).ok()?;

        let (base, version) = head.rsplit_once('-')?;
        if base.is_empty() || version.is_empty() {
            return None;
        }

        Some(Self {
            base: base.to_string(),
            version: version.to_string(),
            date,
        })
    }
}

impl fmt::Display for StoredName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}--{}.{APK_EXTENSION}",
            self.base,
            self.version,
            self.date.format(STORED_DATE_FORMAT)
        )
    }
}
