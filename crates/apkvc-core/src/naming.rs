//! Stored filename construction
//!
//! `{base}-{version}--{yyyyMMdd}.apk`. The date follows the last `--` and the
//! version follows the last single `-`, so versions never contain a dash.

use apkvc_schema::{APK_EXTENSION, STORED_DATE_FORMAT};
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum NamingError {
    #[error("Invalid file name: {0:?} has no usable characters")]
    InvalidFileName(String),

    #[error("Invalid version: {0:?} has no usable characters")]
    InvalidVersion(String),
}

/// Build the stored filename for an upload.
pub fn build_stored_name(
    original_file_name: &str,
    version: &str,
    ingest_date: NaiveDate,
) -> Result<String, NamingError> {
    let base = sanitize_base(original_file_name)
        .ok_or_else(|| NamingError::InvalidFileName(original_file_name.to_string()))?;
    let version_part =
        sanitize_version(version).ok_or_else(|| NamingError::InvalidVersion(version.to_string()))?;

    Ok(format!(
        "{base}-{version_part}--{}.{APK_EXTENSION}",
        ingest_date.format(STORED_DATE_FORMAT)
    ))
}

/// Logical package name for an upload: the filename without directories or
/// extension, lower-cased, spaces and dots replaced with `_`.
pub fn sanitize_base(original_file_name: &str) -> Option<String> {
    let file_name = original_file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original_file_name)
        .trim();
    let stem = match file_name.rsplit_once('.') {
        Some((stem, _ext)) if !stem.is_empty() => stem,
        _ => file_name,
    };

    let sanitized: String = stem
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '.' { '_' } else { c })
        .filter(|c| is_valid_file_char(*c))
        .collect();

    (!sanitized.is_empty()).then_some(sanitized)
}

/// Version component: whitespace and `-` become `_`, invalid characters are dropped.
pub fn sanitize_version(version: &str) -> Option<String> {
    let sanitized: String = version
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() || c == '-' { '_' } else { c })
        .filter(|c| is_valid_file_char(*c))
        .collect();

    (!sanitized.is_empty()).then_some(sanitized)
}

fn is_valid_file_char(c: char) -> bool {
    !c.is_control() && !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*')
}

#[cfg(test)]
mod tests {
    use super::*;
    use apkvc_schema::StoredName;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_build_stored_name() {
        let name = build_stored_name("My App.apk", "2.3.1", date(2024, 1, 5)).unwrap();
        assert_eq!(name, "my_app-2.3.1--20240105.apk");
    }

    #[test]
    fn test_dots_in_base_become_underscores() {
        let name = build_stored_name("com.example.Maps.APK", "10.0", date(2023, 12, 31)).unwrap();
        assert_eq!(name, "com_example_maps-10.0--20231231.apk");
    }

    #[test]
    fn test_dash_in_version_is_replaced() {
        let name = build_stored_name("app.apk", "1.0.0-beta 2", date(2024, 3, 1)).unwrap();
        assert_eq!(name, "app-1.0.0_beta_2--20240301.apk");

        let parsed = StoredName::parse(&name).unwrap();
        assert_eq!(parsed.base, "app");
        assert_eq!(parsed.version, "1.0.0_beta_2");
    }

    #[test]
    fn test_dash_in_base_survives_parse() {
        let name = build_stored_name("field-service.apk", "3.1", date(2024, 6, 9)).unwrap();
        let parsed = StoredName::parse(&name).unwrap();
        assert_eq!(parsed.base, "field-service");
        assert_eq!(parsed.version, "3.1");
        assert_eq!(parsed.date, date(2024, 6, 9));
    }

    #[test]
    fn test_directory_components_are_dropped() {
        assert_eq!(sanitize_base("../../etc/evil.apk").as_deref(), Some("evil"));
        assert_eq!(sanitize_base(r"C:\Users\me\Scanner.apk").as_deref(), Some("scanner"));
    }

    #[test]
    fn test_invalid_characters_are_stripped() {
        assert_eq!(sanitize_base("a<b>c:d|e?f*.apk").as_deref(), Some("abcdef"));
        assert_eq!(sanitize_version("1.2\u{0}/3").as_deref(), Some("1.23"));
    }

    #[test]
    fn test_empty_base_is_rejected() {
        let err = build_stored_name("???.apk", "1.0", date(2024, 1, 1)).unwrap_err();
        assert!(matches!(err, NamingError::InvalidFileName(_)));

        let err = build_stored_name("", "1.0", date(2024, 1, 1)).unwrap_err();
        assert!(matches!(err, NamingError::InvalidFileName(_)));
    }

    #[test]
    fn test_empty_version_is_rejected() {
        let err = build_stored_name("app.apk", "  ", date(2024, 1, 1)).unwrap_err();
        assert_eq!(err, NamingError::InvalidVersion("  ".to_string()));
    }
}
