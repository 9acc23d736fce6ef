//! Application version value type
//!
//! A thin ordered wrapper over `semver::Version`. Release tags may carry a
//! leading `v`, so parsing is lenient about that one prefix; everything else
//! follows semver.

use std::fmt;
use std::str::FromStr;

/// Ordered application version (major.minor.patch)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct AppVersion(semver::Version);

impl AppVersion {
    /// Parse a version string, tolerating a leading `v` or `V` and
    /// surrounding whitespace (release tags come in both shapes).
    pub fn parse(input: &str) -> Result<Self, semver::Error> {
        let trimmed = input.trim();
        let stripped = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);
        Ok(Self(semver::Version::parse(stripped)?))
    }
}

impl fmt::Display for AppVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for AppVersion {
    type Err = semver::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
