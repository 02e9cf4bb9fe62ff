//! Variable builders for each generation task.
//!
//! One builder per task, each returning a variables map ready for the
//! generation adapter. The git accessor is the only side-effecting
//! dependency; precondition checks happen here, before any backend call.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::Precondition;
use crate::io::git::Git;
use crate::io::settings::Settings;

/// Default pull-request template location by platform convention.
const DEFAULT_PR_TEMPLATE: &str = ".github/pull_request_template.md";

fn string_var(value: impl Into<String>) -> Value {
    Value::String(value.into())
}

/// Variables for commit-message generation: the staged diff.
///
/// An empty staged diff is an expected precondition failure, not a
/// generation error.
pub fn commit_variables(git: &Git) -> Result<Map<String, Value>> {
    let diff = git.staged_diff()?;
    if diff.trim().is_empty() {
        return Err(Precondition("no staged changes".to_string()).into());
    }
    let mut variables = Map::new();
    variables.insert("diff".to_string(), string_var(diff));
    Ok(variables)
}

/// Variables for PR-description generation: the JSON-serialized branch diff
/// plus an optional PR template.
pub fn pr_variables(git: &Git, settings: &Settings, base: &str) -> Result<Map<String, Value>> {
    let commits = git.branch_diff(base)?;
    if commits.is_empty() {
        return Err(Precondition(format!("no commits ahead of {base}")).into());
    }
    let diff = serde_json::to_string_pretty(&commits).context("serialize branch diff")?;

    let mut variables = Map::new();
    variables.insert("diff".to_string(), string_var(diff));
    variables.insert(
        "template".to_string(),
        match pr_template(git.workdir(), settings) {
            Some(text) => string_var(text),
            None => Value::Null,
        },
    );
    Ok(variables)
}

/// Resolve PR template text: configured custom path, then the platform
/// convention path, then none (the built-in prompt stands alone).
///
/// A failure to read a *configured* path degrades to the default lookup with
/// a warning, never a hard failure.
fn pr_template(workdir: &Path, settings: &Settings) -> Option<String> {
    if let Some(custom) = &settings.pr_template_path {
        let path = workdir.join(custom);
        match fs::read_to_string(&path) {
            Ok(text) => {
                debug!(path = %path.display(), "using configured PR template");
                return Some(text);
            }
            Err(err) => {
                warn!(path = %path.display(), %err, "configured PR template unreadable, falling back");
            }
        }
    }
    fs::read_to_string(workdir.join(DEFAULT_PR_TEMPLATE)).ok()
}

/// Variables for changelog generation from raw commit history.
pub fn changelog_variables_from_commits(git: &Git, limit: usize) -> Result<Map<String, Value>> {
    let commits = git.recent_commits(limit)?;
    if commits.is_empty() {
        return Err(Precondition("no commits to summarize".to_string()).into());
    }
    let joined = commits
        .iter()
        .map(|entry| format!("{}: {}", entry.hash, entry.message))
        .collect::<Vec<_>>()
        .join("\n");

    let mut variables = Map::new();
    variables.insert("commits".to_string(), string_var(joined));
    variables.insert("description".to_string(), Value::Null);
    Ok(variables)
}

/// Variables for changelog generation following an approved PR description.
///
/// Shares the commit form's downstream prompt contract: both produce the
/// same structured section taxonomy.
pub fn changelog_variables_from_description(
    git: &Git,
    base: &str,
    description: &str,
) -> Result<Map<String, Value>> {
    let commits = git.branch_diff(base)?;
    let joined = commits
        .iter()
        .map(|entry| format!("{}: {}", entry.hash, entry.message))
        .collect::<Vec<_>>()
        .join("\n");

    let mut variables = Map::new();
    variables.insert("commits".to_string(), string_var(joined));
    variables.insert("description".to_string(), string_var(description));
    Ok(variables)
}

/// Variables for one refinement iteration, rebuilt fresh each time.
///
/// Previous feedback is not replayed beyond what is already folded into the
/// current content.
pub fn refinement_variables(feedback: &str, current_content: &str) -> Map<String, Value> {
    let mut variables = Map::new();
    variables.insert("refinement_input".to_string(), string_var(feedback));
    variables.insert("description".to_string(), string_var(current_content));
    variables
}
