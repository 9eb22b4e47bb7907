use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use pep440_rs::Version;

use crate::error::LayerError;

/// Tag that asks the artifact repository for its newest release.
pub const LATEST_TAG: &str = "latest";

/// A supervisor release version.
///
/// Ordering and equality follow PEP 440 semantics on the parsed value, so
/// `1.5` and `1.5.0` compare equal. The raw tag is kept because it is what the
/// artifact repository and the layer description carry.
#[derive(Debug, Clone)]
pub struct SupervisorVersion {
    raw: String,
    parsed: Version,
}

impl SupervisorVersion {
    /// Returns the tag exactly as it was written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for SupervisorVersion {
    type Err = LayerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(LayerError::config("version must not be empty"));
        }
        let parsed = Version::from_str(trimmed)
            .map_err(|err| LayerError::config(format!("invalid version '{trimmed}': {err}")))?;
        Ok(Self {
            raw: trimmed.to_string(),
            parsed,
        })
    }
}

impl PartialEq for SupervisorVersion {
    fn eq(&self, other: &Self) -> bool {
        self.parsed == other.parsed
    }
}

impl Eq for SupervisorVersion {}

impl PartialOrd for SupervisorVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SupervisorVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.parsed.cmp(&other.parsed)
    }
}

impl fmt::Display for SupervisorVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Desired supervisor version as configured: a concrete release or `latest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionRequest {
    Latest,
    Exact(SupervisorVersion),
}

impl VersionRequest {
    /// Tag to request from the artifact repository.
    #[must_use]
    pub fn tag(&self) -> &str {
        match self {
            Self::Latest => LATEST_TAG,
            Self::Exact(version) => version.as_str(),
        }
    }
}

impl FromStr for VersionRequest {
    type Err = LayerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.trim().eq_ignore_ascii_case(LATEST_TAG) {
            return Ok(Self::Latest);
        }
        SupervisorVersion::from_str(value).map(Self::Exact)
    }
}

impl fmt::Display for VersionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Compares two version strings, or `None` when either does not parse.
#[must_use]
pub fn compare_versions(left: &str, right: &str) -> Option<Ordering> {
    let left = SupervisorVersion::from_str(left).ok()?;
    let right = SupervisorVersion::from_str(right).ok()?;
    Some(left.cmp(&right))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(raw: &str) -> SupervisorVersion {
        SupervisorVersion::from_str(raw).expect("valid version")
    }

    #[test]
    fn orders_release_segments_numerically() {
        assert!(v("1.4.0") < v("1.5.0"));
        assert!(v("1.10.0") > v("1.9.3"));
        assert!(v("2.0") > v("1.99.99"));
        assert_eq!(v("1.5"), v("1.5.0"));
        assert_eq!(v("1.5.0").as_str(), "1.5.0");
    }

    #[test]
    fn prereleases_sort_before_final() {
        assert!(v("1.5.0rc1") < v("1.5.0"));
        assert!(v("1.5.0a1") < v("1.5.0b1"));
        assert!(v("1.5.0.post1") > v("1.5.0"));
    }

    #[test]
    fn comparison_is_a_total_order() {
        let samples = [
            "0.1", "1.0.0", "1.0", "1.4.0", "1.5.0rc2", "1.5.0", "1.5.0.post1", "1.10.0", "2",
        ];
        let parsed: Vec<_> = samples.iter().map(|raw| v(raw)).collect();
        for a in &parsed {
            for b in &parsed {
                let outcomes = [a < b, a == b, a > b];
                assert_eq!(
                    outcomes.iter().filter(|held| **held).count(),
                    1,
                    "trichotomy violated for {a} vs {b}"
                );
                for c in &parsed {
                    if a < b && b < c {
                        assert!(a < c, "transitivity violated for {a} < {b} < {c}");
                    }
                    if a == b && b == c {
                        assert_eq!(a, c);
                    }
                }
            }
        }
    }

    #[test]
    fn compare_versions_rejects_garbage() {
        assert_eq!(compare_versions("1.4.0", "1.5.0"), Some(Ordering::Less));
        assert_eq!(compare_versions("1.5.0", "1.5.0"), Some(Ordering::Equal));
        assert_eq!(compare_versions("not-a-version", "1.5.0"), None);
        assert_eq!(compare_versions("1.5.0", ""), None);
    }

    #[test]
    fn version_request_understands_latest() {
        assert_eq!(
            VersionRequest::from_str("latest").expect("latest"),
            VersionRequest::Latest
        );
        assert_eq!(
            VersionRequest::from_str("LATEST").expect("latest").tag(),
            LATEST_TAG
        );
        let exact = VersionRequest::from_str(" 1.5.0 ").expect("exact");
        assert_eq!(exact.tag(), "1.5.0");
        assert!(matches!(
            VersionRequest::from_str("one-point-five"),
            Err(LayerError::Config(_))
        ));
    }
}
