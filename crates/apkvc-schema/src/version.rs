//! Dotted-tuple version ordering.
//!
//! Manifest version names are only "semantic-ish", so ranking compares them as
//! tuples of unsigned integers: `2.10.0 > 2.9.0`. Anything that is not a pure
//! dotted numeric string ranks as `0.0.0`. Trailing zero components are
//! insignificant, so `1.0` and `1.0.0` compare equal.

use std::cmp::Ordering;
use std::fmt;

/// Comparable form of a version string.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionKey(Vec<u64>);

impl VersionKey {
    /// Parse a version name. Never fails; unparseable input is the zero key.
    pub fn parse(version: &str) -> Self {
        let version = version.trim();
        if version.is_empty() {
            return Self::default();
        }

        let mut parts = Vec::new();
        for segment in version.split('.') {
            if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
                return Self::default();
            }
            match segment.parse::<u64>() {
                Ok(n) => parts.push(n),
                Err(_) => return Self::default(),
            }
        }

        while parts.last() == Some(&0) {
            parts.pop();
        }
        Self(parts)
    }

    /// Whether this is the zero key (`0.0.0` or unparseable).
    pub fn is_zero(&self) -> bool {
        self.0.is_empty()
    }

    /// Numeric components with trailing zeros removed.
    pub fn components(&self) -> &[u64] {
        &self.0
    }
}

impl fmt::Display for VersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "0.0.0");
        }
        let parts: Vec<String> = self.0.iter().map(u64::to_string).collect();
        write!(f, "{}", parts.join("."))
    }
}

/// Compare two version names as dotted numeric tuples.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    VersionKey::parse(a).cmp(&VersionKey::parse(b))
}
