//! Dotted numeric versions.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use super::error::VersionError;

/// A `major.minor[.build[.revision]]` version.
///
/// Components compare left to right; when one version is a prefix of the
/// other, the shorter one is older (`1.0 < 1.0.0`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    components: Vec<u32>,
}

impl Version {
    /// Parse a version string.
    pub fn parse(text: &str) -> Result<Self, VersionError> {
        let invalid = || VersionError::InvalidVersion(text.to_string());
        let components = text
            .trim()
            .split('.')
            .map(|part| part.parse::<u32>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>, _>>()?;
        if !(2..=4).contains(&components.len()) {
            return Err(invalid());
        }
        Ok(Self { components })
    }

    /// Version components.
    pub fn components(&self) -> &[u32] {
        &self.components
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.components.cmp(&other.components)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, component) in self.components.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{component}")?;
        }
        Ok(())
    }
}

/// Whether `version >= minimum`. Unparseable input never satisfies.
pub fn satisfies(version: &str, minimum: &str) -> bool {
    match (Version::parse(version), Version::parse(minimum)) {
        (Ok(version), Ok(minimum)) => version >= minimum,
        _ => {
            tracing::warn!(version, minimum, "cannot compare unparseable versions");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let version = Version::parse("1.2.3").unwrap();
        assert_eq!(version.components(), &[1, 2, 3]);
        assert_eq!(version.to_string(), "1.2.3");
        assert_eq!(" 2.0 ".parse::<Version>().unwrap().to_string(), "2.0");
    }

    #[test]
    fn test_invalid() {
        for text in ["", "1", "1.2.3.4.5", "1.x", "1..2", "-1.0"] {
            assert!(Version::parse(text).is_err(), "{text:?}");
        }
    }

    #[test]
    fn test_ordering() {
        let v = |s: &str| Version::parse(s).unwrap();
        assert!(v("1.10.0") > v("1.9.9"));
        assert!(v("2.0.0") > v("1.99"));
        assert!(v("1.0") < v("1.0.0"));
        assert_eq!(v("1.0.0"), v("1.0.0"));
    }

    #[test]
    fn test_satisfies() {
        assert!(satisfies("2.0.0", "2.0.0"));
        assert!(!satisfies("1.5.0", "2.0.0"));
        assert!(!satisfies("garbage", "0.0.0"));
    }
}
