//! Two-part revision identifier
//!
//! `major.minor` with a total order (major first, then minor). Minor edits
//! stay on the same major line; major edits open a new one starting at `.1`.
//!
//! Author: Moroya Sakamoto

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ArchiveError;

/// Revision identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    major: u32,
    minor: u32,
}

impl Version {
    /// The version every new document starts at.
    pub const INITIAL: Version = Version { major: 1, minor: 1 };

    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    #[inline]
    pub fn major(&self) -> u32 {
        self.major
    }

    #[inline]
    pub fn minor(&self) -> u32 {
        self.minor
    }

    /// Minor increment: `1.4` → `1.5`. Saturates at `u32::MAX`, so the
    /// result is not greater than `self` there.
    pub fn next(&self) -> Version {
        Version::new(self.major, self.minor.saturating_add(1))
    }

    /// Major increment: `1.4` → `2.1`
    pub fn next_major(&self) -> Version {
        self.next_major_with(1)
    }

    /// Major increment with a caller-chosen minor, for imported histories.
    pub fn next_major_with(&self, minor: u32) -> Version {
        Version::new(self.major.saturating_add(1), minor)
    }

    /// True if both identifiers are on the same major line.
    #[inline]
    pub fn same_major(&self, other: &Version) -> bool {
        self.major == other.major
    }

    /// Parse `"major.minor"`.
    pub fn parse(s: &str) -> Result<Version, ArchiveError> {
        s.parse()
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then_with(|| self.minor.cmp(&other.minor))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for Version {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, minor) = s
            .split_once('.')
            .ok_or_else(|| ArchiveError::VersionFormat(s.to_string()))?;
        let digits = |part: &str| -> Result<u32, ArchiveError> {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(ArchiveError::VersionFormat(s.to_string()));
            }
            part.parse()
                .map_err(|_| ArchiveError::VersionFormat(s.to_string()))
        };
        Ok(Version::new(digits(major)?, digits(minor)?))
    }
}

impl TryFrom<String> for Version {
    type Error = ArchiveError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Version> for String {
    fn from(v: Version) -> Self {
        v.to_string()
    }
}

// ── Version Bump ──────────────────────────────────────────────────────

/// How the next revision's identifier is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VersionBump {
    /// Minor increment of the latest version
    #[default]
    Minor,
    /// Major increment of the latest version
    Major,
    /// Caller-supplied identifier (imports, migrations)
    Explicit(Version),
}

impl VersionBump {
    /// Resolve against the latest version, `None` for an empty history.
    pub fn resolve(self, latest: Option<Version>) -> Version {
        match (self, latest) {
            (VersionBump::Explicit(v), _) => v,
            (_, None) => Version::INITIAL,
            (VersionBump::Minor, Some(latest)) => latest.next(),
            (VersionBump::Major, Some(latest)) => latest.next_major(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_and_increments() {
        let v = Version::default();
        assert_eq!(v, Version::new(1, 1));
        assert_eq!(v.next(), Version::new(1, 2));
        assert_eq!(Version::new(1, 7).next_major(), Version::new(2, 1));
        assert_eq!(Version::new(1, 7).next_major_with(0), Version::new(2, 0));
    }

    #[test]
    fn test_increments_saturate() {
        let top = Version::new(u32::MAX, u32::MAX);
        assert_eq!(top.next(), top);
        assert_eq!(top.next_major(), Version::new(u32::MAX, 1));
        assert!(top.next_major() < top);
    }

    #[test]
    fn test_total_order() {
        let mut versions = vec![
            Version::new(2, 1),
            Version::new(1, 10),
            Version::new(1, 2),
            Version::new(10, 1),
        ];
        versions.sort();
        assert_eq!(
            versions,
            vec![
                Version::new(1, 2),
                Version::new(1, 10),
                Version::new(2, 1),
                Version::new(10, 1),
            ]
        );
    }

    #[test]
    fn test_same_major() {
        assert!(Version::new(3, 1).same_major(&Version::new(3, 9)));
        assert!(!Version::new(3, 1).same_major(&Version::new(4, 1)));
    }

    #[test]
    fn test_parse_and_display() {
        let v: Version = "12.345".parse().unwrap();
        assert_eq!(v, Version::new(12, 345));
        assert_eq!(v.to_string(), "12.345");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", "1", "1.", ".1", "a.b", "1.2.3", "-1.2", "1.+2", " 1.2"] {
            assert!(
                matches!(Version::parse(bad), Err(ArchiveError::VersionFormat(_))),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&Version::new(2, 4)).unwrap();
        assert_eq!(json, "\"2.4\"");
        let back: Version = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Version::new(2, 4));
        assert!(serde_json::from_str::<Version>("\"2\"").is_err());
    }

    #[test]
    fn test_bump_resolution() {
        let latest = Some(Version::new(1, 3));
        assert_eq!(VersionBump::Minor.resolve(None), Version::INITIAL);
        assert_eq!(VersionBump::Major.resolve(None), Version::INITIAL);
        assert_eq!(VersionBump::Minor.resolve(latest), Version::new(1, 4));
        assert_eq!(VersionBump::Major.resolve(latest), Version::new(2, 1));
        let explicit = Version::new(5, 2);
        assert_eq!(VersionBump::Explicit(explicit).resolve(latest), explicit);
    }
}
