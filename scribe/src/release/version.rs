//! Semantic version selection for releases.

use std::sync::LazyLock;

use anyhow::{Result, anyhow};
use regex::Regex;
use semver::Version;

/// Which component a bump increments. A user-entered custom version goes
/// through [`parse_custom`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bump {
    Major,
    Minor,
    Patch,
}

/// Increment exactly one component and zero all lower ones.
pub fn bump_version(current: &Version, bump: Bump) -> Version {
    match bump {
        Bump::Major => Version::new(current.major + 1, 0, 0),
        Bump::Minor => Version::new(current.major, current.minor + 1, 0),
        Bump::Patch => Version::new(current.major, current.minor, current.patch + 1),
    }
}

/// Validate a user-entered custom version against the strict dot-separated
/// three-integer form. Pre-release and build suffixes are rejected.
///
/// A custom version lower than the current one is accepted deliberately: it
/// is an operator override, not an input error.
pub fn parse_custom(input: &str) -> Result<Version> {
    static STRICT: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^\d+\.\d+\.\d+$").expect("version regex should be valid"));

    let trimmed = input.trim();
    if !STRICT.is_match(trimmed) {
        return Err(anyhow!(
            "'{trimmed}' is not a valid version (expected MAJOR.MINOR.PATCH)"
        ));
    }
    Version::parse(trimmed).map_err(|err| anyhow!("parse version '{trimmed}': {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).expect("version")
    }

    #[test]
    fn major_bump_zeroes_lower_components() {
        assert_eq!(bump_version(&v("1.2.3"), Bump::Major), v("2.0.0"));
    }

    #[test]
    fn minor_bump_zeroes_patch() {
        assert_eq!(bump_version(&v("1.2.3"), Bump::Minor), v("1.3.0"));
    }

    #[test]
    fn patch_bump_increments_patch() {
        assert_eq!(bump_version(&v("1.2.3"), Bump::Patch), v("1.2.4"));
    }

    #[test]
    fn custom_accepts_strict_triples() {
        assert_eq!(parse_custom("2.5.0").expect("valid"), v("2.5.0"));
    }

    #[test]
    fn custom_rejects_prerelease_suffix() {
        assert!(parse_custom("2.5.0-beta").is_err());
    }

    #[test]
    fn custom_rejects_partial_versions() {
        assert!(parse_custom("2.5").is_err());
        assert!(parse_custom("v2.5.0").is_err());
    }

    #[test]
    fn custom_lower_than_current_is_allowed() {
        // Deliberate operator override; only the form is validated.
        assert!(parse_custom("0.0.1").is_ok());
    }
}
