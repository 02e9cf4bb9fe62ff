//! Project metadata version handling.
//!
//! The version lives in a structured project file (`package.json`,
//! `manifest.json` or `Cargo.toml`). Updates happen in place, preserving all
//! other fields and the file's own formatting: JSON files get a targeted
//! replacement of the version value, TOML goes through a lossless edit.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use semver::Version;
use tracing::debug;

const CANDIDATES: [&str; 3] = ["package.json", "manifest.json", "Cargo.toml"];

static JSON_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""version"(\s*:\s*)"[^"]*""#).expect("version regex should be valid")
});

/// The project metadata file carrying the version field.
#[derive(Debug, Clone)]
pub struct ProjectManifest {
    path: PathBuf,
    is_toml: bool,
}

impl ProjectManifest {
    /// Locate the metadata file in a working copy, in candidate order.
    pub fn locate(workdir: &Path) -> Option<Self> {
        CANDIDATES.iter().find_map(|name| {
            let path = workdir.join(name);
            path.exists().then(|| {
                debug!(path = %path.display(), "located project manifest");
                Self {
                    is_toml: name.ends_with(".toml"),
                    path,
                }
            })
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name relative to the working copy root.
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("manifest")
    }

    /// Read the stored version. Stored versions carry no `v` prefix.
    pub fn version(&self) -> Result<Version> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("read {}", self.path.display()))?;
        let raw = if self.is_toml {
            let doc: toml_edit::DocumentMut = contents
                .parse()
                .with_context(|| format!("parse {}", self.path.display()))?;
            doc.get("package")
                .and_then(|package| package.get("version"))
                .and_then(|version| version.as_str())
                .map(str::to_string)
        } else {
            let value: serde_json::Value = serde_json::from_str(&contents)
                .with_context(|| format!("parse {}", self.path.display()))?;
            value
                .get("version")
                .and_then(|version| version.as_str())
                .map(str::to_string)
        };
        match raw {
            Some(raw) => Version::parse(&raw)
                .with_context(|| format!("parse version '{raw}' in {}", self.path.display())),
            None => Ok(Version::new(0, 0, 0)),
        }
    }

    /// Write the new version in place, preserving all other content.
    pub fn set_version(&self, version: &Version) -> Result<()> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("read {}", self.path.display()))?;
        let updated = if self.is_toml {
            let mut doc: toml_edit::DocumentMut = contents
                .parse()
                .with_context(|| format!("parse {}", self.path.display()))?;
            doc.get_mut("package")
                .and_then(|package| package.get_mut("version"))
                .map(|field| *field = toml_edit::value(version.to_string()))
                .ok_or_else(|| {
                    anyhow!("{} has no package.version field", self.path.display())
                })?;
            doc.to_string()
        } else {
            if !JSON_VERSION.is_match(&contents) {
                return Err(anyhow!("{} has no version field", self.path.display()));
            }
            // Replace only the value; indentation and field order are untouched.
            JSON_VERSION
                .replace(&contents, format!(r#""version"${{1}}"{version}""#))
                .into_owned()
        };
        fs::write(&self.path, updated).with_context(|| format!("write {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestRepo;

    fn v(s: &str) -> Version {
        Version::parse(s).expect("version")
    }

    #[test]
    fn locates_json_before_toml() {
        let repo = TestRepo::new().expect("repo");
        repo.write_file("package.json", "{\"name\": \"x\", \"version\": \"1.0.0\"}\n")
            .expect("write json");
        repo.write_file("Cargo.toml", "[package]\nversion = \"9.9.9\"\n")
            .expect("write toml");

        let manifest = ProjectManifest::locate(repo.git().workdir()).expect("locate");
        assert_eq!(manifest.file_name(), "package.json");
        assert_eq!(manifest.version().expect("version"), v("1.0.0"));
    }

    #[test]
    fn json_update_preserves_formatting() {
        let repo = TestRepo::new().expect("repo");
        let original = "{\n    \"name\": \"demo\",\n    \"version\": \"1.2.3\",\n    \"private\": true\n}\n";
        repo.write_file("manifest.json", original).expect("write");

        let manifest = ProjectManifest::locate(repo.git().workdir()).expect("locate");
        manifest.set_version(&v("2.0.0")).expect("set");

        let updated = std::fs::read_to_string(manifest.path()).expect("read");
        assert_eq!(
            updated,
            "{\n    \"name\": \"demo\",\n    \"version\": \"2.0.0\",\n    \"private\": true\n}\n"
        );
    }

    #[test]
    fn toml_update_preserves_other_fields() {
        let repo = TestRepo::new().expect("repo");
        let original = "[package]\nname = \"demo\" # keep me\nversion = \"0.1.0\"\nedition = \"2024\"\n";
        repo.write_file("Cargo.toml", original).expect("write");

        let manifest = ProjectManifest::locate(repo.git().workdir()).expect("locate");
        manifest.set_version(&v("0.2.0")).expect("set");

        let updated = std::fs::read_to_string(manifest.path()).expect("read");
        assert!(updated.contains("version = \"0.2.0\""));
        assert!(updated.contains("# keep me"));
        assert_eq!(manifest.version().expect("version"), v("0.2.0"));
    }

    #[test]
    fn missing_version_field_defaults_to_zero() {
        let repo = TestRepo::new().expect("repo");
        repo.write_file("manifest.json", "{\"name\": \"x\"}\n").expect("write");

        let manifest = ProjectManifest::locate(repo.git().workdir()).expect("locate");
        assert_eq!(manifest.version().expect("version"), v("0.0.0"));
    }

    #[test]
    fn locate_returns_none_without_candidates() {
        let repo = TestRepo::new().expect("repo");
        assert!(ProjectManifest::locate(repo.git().workdir()).is_none());
    }
}
