//! Keep a Changelog document handling.
//!
//! The changelog is markdown with a preamble, an `## [Unreleased]` heading
//! and dated `## [version] - date` sections. Section bodies use the fixed
//! subheadings Added, Changed, Deprecated, Removed, Fixed, Security, in that
//! order, with empty subheadings omitted entirely.

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::Value;

const UNRELEASED_HEADING: &str = "## [Unreleased]";

/// Skeleton used to seed a repository without a changelog.
pub const SKELETON: &str = "# Changelog\n\n\
All notable changes to this project will be documented in this file.\n\n\
The format is based on [Keep a Changelog](https://keepachangelog.com/en/1.1.0/),\n\
and this project adheres to [Semantic Versioning](https://semver.org/spec/v2.0.0.html).\n\n\
## [Unreleased]\n";

/// Structured changelog entries, one list per fixed category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ChangelogEntries {
    pub added: Vec<String>,
    pub changed: Vec<String>,
    pub deprecated: Vec<String>,
    pub removed: Vec<String>,
    pub fixed: Vec<String>,
    pub security: Vec<String>,
}

impl ChangelogEntries {
    /// Parse entries from a schema-validated generation result.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).context("parse changelog entries")
    }

    pub fn is_empty(&self) -> bool {
        self.sections().iter().all(|(_, items)| items.is_empty())
    }

    fn sections(&self) -> [(&'static str, &[String]); 6] {
        [
            ("Added", &self.added),
            ("Changed", &self.changed),
            ("Deprecated", &self.deprecated),
            ("Removed", &self.removed),
            ("Fixed", &self.fixed),
            ("Security", &self.security),
        ]
    }

    /// Render the entries as a markdown section body.
    ///
    /// Subheadings appear in the fixed order; empty ones are never emitted.
    pub fn format_entries(&self) -> String {
        let mut output = String::new();
        for (title, items) in self.sections() {
            if items.is_empty() {
                continue;
            }
            output.push_str(&format!("### {title}\n\n"));
            for item in items {
                output.push_str(&format!("- {item}\n"));
            }
            output.push('\n');
        }
        output.trim_end().to_string()
    }
}

/// Split a changelog into (before unreleased body, unreleased body, rest).
///
/// The unreleased body runs from the line after the heading to the next
/// `## ` heading or end of document.
fn split_at_unreleased(document: &str) -> Result<(&str, &str, &str)> {
    let heading_start = document
        .find(UNRELEASED_HEADING)
        .ok_or_else(|| anyhow!("changelog has no '{UNRELEASED_HEADING}' heading"))?;
    let body_start = match document[heading_start..].find('\n') {
        Some(offset) => heading_start + offset + 1,
        None => document.len(),
    };
    let body_end = document[body_start..]
        .find("\n## ")
        .map(|offset| body_start + offset + 1)
        .unwrap_or(document.len());
    Ok((
        &document[..body_start],
        &document[body_start..body_end],
        &document[body_end..],
    ))
}

/// Insert a new dated release section immediately under the Unreleased
/// heading.
///
/// Prior Unreleased content is moved into the new section, never duplicated
/// or discarded; the Unreleased heading remains, empty. When there was no
/// prior Unreleased content, `generated` becomes the section body.
pub fn insert_release(document: &str, version: &str, date: &str, generated: &str) -> Result<String> {
    let (head, unreleased, rest) = split_at_unreleased(document)?;
    let prior = unreleased.trim();
    let body = if prior.is_empty() { generated.trim() } else { prior };

    let mut output = String::with_capacity(document.len() + body.len() + 64);
    output.push_str(head.trim_end());
    output.push_str("\n\n");
    output.push_str(&format!("## [{version}] - {date}\n\n"));
    if !body.is_empty() {
        output.push_str(body);
        output.push('\n');
    }
    if !rest.trim().is_empty() {
        output.push('\n');
        output.push_str(rest.trim_start());
    }
    if !output.ends_with('\n') {
        output.push('\n');
    }
    Ok(output)
}

/// Append a section body under the Unreleased heading, preserving everything
/// else (used by the stand-alone changelog-update flow after a PR).
pub fn append_unreleased(document: &str, body: &str) -> Result<String> {
    let (head, unreleased, rest) = split_at_unreleased(document)?;
    let mut merged = unreleased.trim().to_string();
    if !merged.is_empty() {
        merged.push_str("\n\n");
    }
    merged.push_str(body.trim());

    let mut output = String::with_capacity(document.len() + body.len() + 8);
    output.push_str(head.trim_end());
    output.push_str("\n\n");
    output.push_str(&merged);
    output.push('\n');
    if !rest.trim().is_empty() {
        output.push('\n');
        output.push_str(rest.trim_start());
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries() -> ChangelogEntries {
        ChangelogEntries {
            added: vec!["new thing".to_string(), "other thing".to_string()],
            fixed: vec!["crash on empty input".to_string()],
            ..ChangelogEntries::default()
        }
    }

    #[test]
    fn format_entries_keeps_fixed_order_and_omits_empty() {
        let text = entries().format_entries();

        let added_pos = text.find("### Added").expect("added section");
        let fixed_pos = text.find("### Fixed").expect("fixed section");
        assert!(added_pos < fixed_pos, "Added before Fixed");
        assert_eq!(text.matches("### ").count(), 2);
        for absent in ["### Changed", "### Deprecated", "### Removed", "### Security"] {
            assert!(!text.contains(absent), "{absent} must be omitted");
        }
        assert_eq!(text.matches("- ").count(), 3);
    }

    #[test]
    fn insert_release_moves_unreleased_body() {
        let document = "# Changelog\n\nPreamble.\n\n## [Unreleased]\n\n### Added\n\n- pending feature\n\n## [1.0.0] - 2026-01-01\n\n### Fixed\n\n- old fix\n";
        let updated =
            insert_release(document, "1.1.0", "2026-08-29", "### Added\n\n- generated\n")
                .expect("insert");

        // New section carries the prior unreleased body, not the generated text.
        let section_pos = updated.find("## [1.1.0] - 2026-08-29").expect("new section");
        let pending_pos = updated.find("- pending feature").expect("moved body");
        assert!(section_pos < pending_pos);
        assert!(!updated.contains("- generated"));
        assert_eq!(updated.matches("- pending feature").count(), 1);

        // Unreleased heading remains, empty, immediately before the new section.
        let unreleased_pos = updated.find("## [Unreleased]").expect("unreleased");
        let between = &updated[unreleased_pos + "## [Unreleased]".len()..section_pos];
        assert!(between.trim().is_empty());

        // Prior releases are preserved.
        assert!(updated.contains("## [1.0.0] - 2026-01-01"));
        assert!(updated.contains("- old fix"));
    }

    #[test]
    fn insert_release_uses_generated_body_when_unreleased_empty() {
        let updated = insert_release(SKELETON, "0.1.0", "2026-08-29", "### Added\n\n- generated\n")
            .expect("insert");
        assert!(updated.contains("## [0.1.0] - 2026-08-29"));
        assert!(updated.contains("- generated"));
        assert!(updated.contains("## [Unreleased]"));
    }

    #[test]
    fn insert_release_is_idempotent_for_prior_content() {
        let document = "# Changelog\n\n## [Unreleased]\n\nB line one.\nB line two.\n";
        let updated = insert_release(document, "2.0.0", "2026-08-29", "ignored").expect("insert");

        let section_pos = updated.find("## [2.0.0]").expect("section");
        let body = &updated[section_pos..];
        assert!(body.contains("B line one.\nB line two."));
        assert_eq!(updated.matches("B line one.").count(), 1);
    }

    #[test]
    fn append_unreleased_merges_with_existing_body() {
        let document = "# Changelog\n\n## [Unreleased]\n\n### Added\n\n- first\n\n## [1.0.0] - 2026-01-01\n\n- old\n";
        let updated = append_unreleased(document, "### Fixed\n\n- second\n").expect("append");

        let unreleased_pos = updated.find("## [Unreleased]").expect("unreleased");
        let release_pos = updated.find("## [1.0.0]").expect("release");
        let body = &updated[unreleased_pos..release_pos];
        assert!(body.contains("- first"));
        assert!(body.contains("- second"));
    }

    #[test]
    fn missing_unreleased_heading_is_an_error() {
        assert!(insert_release("# Changelog\n", "1.0.0", "2026-08-29", "x").is_err());
    }

    #[test]
    fn entries_parse_from_structured_value() {
        let value = serde_json::json!({
            "added": ["a"], "changed": [], "deprecated": [],
            "removed": [], "fixed": ["b"], "security": []
        });
        let parsed = ChangelogEntries::from_value(value).expect("parse");
        assert_eq!(parsed.added, vec!["a".to_string()]);
        assert!(!parsed.is_empty());
    }
}
