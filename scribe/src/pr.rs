//! Pull-request description generation.
//!
//! Base-branch selection, description drafting through the review loop, a
//! schema-constrained title, an optional changelog update, and finally the
//! hosted compare URL (or a local file when the host is unrecognized).

use std::fs;

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

use crate::context;
use crate::error::{Cancelled, Precondition};
use crate::io::git::Git;
use crate::io::interact::Interact;
use crate::io::settings::Settings;
use crate::llm::backend::Backend;
use crate::llm::{
    CHANGELOG_SCHEMA, CHANGELOG_TEMPLATE, GenerationRequest, PR_DESCRIPTION_TEMPLATE,
    PR_TITLE_SCHEMA, PR_TITLE_TEMPLATE, REFINE_TEMPLATE, generate_with,
};
use crate::release::changelog::{self, ChangelogEntries};
use crate::release::hosted::parse_remote;
use crate::review::{ReviewLabels, ReviewOutcome, run_review};

/// Fallback file for the description when the remote host is unrecognized.
const FALLBACK_FILE: &str = "PR_DESCRIPTION.md";

const CHANGELOG_FILE: &str = "CHANGELOG.md";

const DESCRIPTION_LABELS: ReviewLabels = ReviewLabels {
    heading: "Pull-request description",
    submit: "Use this description",
    improve: "Improve the description",
    cancel: "Cancel",
};

const ENTRY_LABELS: ReviewLabels = ReviewLabels {
    heading: "Changelog entries",
    submit: "Add to the changelog",
    improve: "Improve the entries",
    cancel: "Skip the changelog",
};

/// Run the PR-description task end to end.
#[instrument(skip_all)]
pub fn run_pr<I: Interact>(
    git: &Git,
    settings: &Settings,
    backend: &dyn Backend,
    interact: &mut I,
) -> Result<()> {
    // Base selection comes first: cancelling here must leave no side effects,
    // so no generation or network call may precede it.
    let Some(base) = choose_base(git, interact)? else {
        return Err(Cancelled.into());
    };
    debug!(base = %base, "base branch chosen");

    let description = match run_review(
        interact,
        &DESCRIPTION_LABELS,
        || draft_description(backend, git, settings, &base),
        |current, feedback| refine_description(backend, git, settings, current, feedback),
    )? {
        ReviewOutcome::Approved { content, .. } => content,
        ReviewOutcome::Cancelled => return Err(Cancelled.into()),
    };

    let title = generate_title(backend, git, settings, &description)?;
    finish(git, interact, &base, &title, &description)?;

    if interact.choose("Add the change to the changelog?", &["Yes", "No"])? == Some(0) {
        update_changelog(backend, git, settings, interact, &base, &description)?;
    }
    Ok(())
}

/// Pick the base branch from the local branches, current branch excluded.
fn choose_base<I: Interact>(git: &Git, interact: &mut I) -> Result<Option<String>> {
    let current = git.current_branch()?;
    let bases: Vec<String> = git
        .all_branches()?
        .into_iter()
        .filter(|branch| branch != &current)
        .collect();
    if bases.is_empty() {
        return Err(Precondition(format!("no base branch other than {current}")).into());
    }
    let refs: Vec<&str> = bases.iter().map(String::as_str).collect();
    let choice = interact.choose(&format!("Base branch for {current}:"), &refs)?;
    Ok(choice.map(|index| bases[index].clone()))
}

fn draft_description(
    backend: &dyn Backend,
    git: &Git,
    settings: &Settings,
    base: &str,
) -> Result<String> {
    let variables = context::pr_variables(git, settings, base)?;
    let request = GenerationRequest::free_text(PR_DESCRIPTION_TEMPLATE, variables);
    generate_with(backend, git, settings, &request)?.into_text()
}

fn refine_description(
    backend: &dyn Backend,
    git: &Git,
    settings: &Settings,
    current: &str,
    feedback: &str,
) -> Result<String> {
    let variables = context::refinement_variables(feedback, current);
    let request = GenerationRequest::free_text(REFINE_TEMPLATE, variables).without_learning_example();
    generate_with(backend, git, settings, &request)?.into_text()
}

/// Schema-constrained title from the approved description.
fn generate_title(
    backend: &dyn Backend,
    git: &Git,
    settings: &Settings,
    description: &str,
) -> Result<String> {
    let mut variables = serde_json::Map::new();
    variables.insert(
        "description".to_string(),
        serde_json::Value::String(description.to_string()),
    );
    let request = GenerationRequest::structured(PR_TITLE_TEMPLATE, variables, PR_TITLE_SCHEMA);
    let object = generate_with(backend, git, settings, &request)?.into_object()?;
    object["title"]
        .as_str()
        .map(str::to_string)
        .context("title missing from structured reply")
}

/// Generate changelog entries from the approved description, walk them
/// through the review loop, and merge the approved body under the Unreleased
/// heading. Seeds the skeleton when no changelog exists.
///
/// Cancelling here skips only the changelog; the pull request itself has
/// already been reported.
fn update_changelog<I: Interact>(
    backend: &dyn Backend,
    git: &Git,
    settings: &Settings,
    interact: &mut I,
    base: &str,
    description: &str,
) -> Result<()> {
    let outcome = run_review(
        interact,
        &ENTRY_LABELS,
        || draft_entries(backend, git, settings, base, description),
        |current, feedback| refine_description(backend, git, settings, current, feedback),
    )?;
    let ReviewOutcome::Approved { content, .. } = outcome else {
        warn!("changelog update skipped");
        return Ok(());
    };

    let path = git.workdir().join(CHANGELOG_FILE);
    let document = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(_) => changelog::SKELETON.to_string(),
    };
    let updated = changelog::append_unreleased(&document, &content)?;
    fs::write(&path, updated).with_context(|| format!("write {}", path.display()))?;
    interact.notify("Changelog updated under [Unreleased].")?;
    Ok(())
}

/// Structured changelog entries rendered as a markdown section body.
fn draft_entries(
    backend: &dyn Backend,
    git: &Git,
    settings: &Settings,
    base: &str,
    description: &str,
) -> Result<String> {
    let variables = context::changelog_variables_from_description(git, base, description)?;
    let request = GenerationRequest::structured(CHANGELOG_TEMPLATE, variables, CHANGELOG_SCHEMA);
    let object = generate_with(backend, git, settings, &request)?.into_object()?;
    let entries = ChangelogEntries::from_value(object)?;
    if entries.is_empty() {
        return Err(Precondition("no user-visible changes for the changelog".to_string()).into());
    }
    Ok(entries.format_entries())
}

/// Hand the approved content to its continuation: title, description and
/// compare URL for a recognized host, or the description written verbatim to
/// a local file for everything else.
fn finish<I: Interact>(
    git: &Git,
    interact: &mut I,
    base: &str,
    title: &str,
    description: &str,
) -> Result<()> {
    let branch = git.current_branch()?;
    let hosted = git.remote_url()?.and_then(|url| parse_remote(&url));
    match hosted {
        Some(repo) => {
            interact.notify(&format!("Title: {title}"))?;
            interact.notify(&format!("Description:\n{description}"))?;
            interact.notify(&format!(
                "Open a pull request: {}",
                repo.compare_url(base, &branch)
            ))?;
        }
        None => {
            let path = git.workdir().join(FALLBACK_FILE);
            fs::write(&path, description)
                .with_context(|| format!("write {}", path.display()))?;
            interact.notify(&format!(
                "Remote host not recognized; description written to {}",
                path.display()
            ))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Answer, ScriptedBackend, ScriptedInteract, TestRepo};

    fn feature_repo() -> TestRepo {
        let repo = TestRepo::new().expect("repo");
        repo.commit_file("base.txt", "base", "chore: base").expect("base");
        repo.run_git(&["checkout", "-b", "feature"]).expect("branch");
        repo.commit_file("one.txt", "one", "feat: one").expect("one");
        repo
    }

    #[test]
    fn cancelled_base_selection_has_no_side_effects() {
        let repo = feature_repo();
        let backend = ScriptedBackend::free_text(vec!["never used".to_string()]);
        let mut interact = ScriptedInteract::new(vec![Answer::Choice(None)]);

        let err = run_pr(&repo.git(), &Settings::default(), &backend, &mut interact).unwrap_err();
        assert!(err.downcast_ref::<crate::error::Cancelled>().is_some());
        assert!(backend.prompts().is_empty());
        assert!(!repo.path().join(FALLBACK_FILE).exists());
        assert!(!repo.path().join(CHANGELOG_FILE).exists());
    }

    #[test]
    fn unrecognized_host_writes_the_description_to_a_file() {
        let repo = feature_repo();
        repo.run_git(&["remote", "add", "origin", "https://git.example.com/acme/widget.git"])
            .expect("remote");
        let backend = ScriptedBackend::free_text(vec![
            "A description.".to_string(),
            r#"{"title": "feat: one"}"#.to_string(),
        ]);
        let mut interact = ScriptedInteract::new(vec![
            Answer::Choice(Some(0)), // base = main
            Answer::Choice(Some(0)), // submit description
            Answer::Choice(Some(1)), // no changelog update
        ]);

        run_pr(&repo.git(), &Settings::default(), &backend, &mut interact).expect("pr");

        let written = std::fs::read_to_string(repo.path().join(FALLBACK_FILE)).expect("read");
        assert_eq!(written, "A description.");
    }

    #[test]
    fn recognized_host_reports_a_compare_url() {
        let repo = feature_repo();
        repo.run_git(&["remote", "add", "origin", "git@github.com:acme/widget.git"])
            .expect("remote");
        let backend = ScriptedBackend::free_text(vec![
            "A description.".to_string(),
            r#"{"title": "feat: one"}"#.to_string(),
        ]);
        let mut interact = ScriptedInteract::new(vec![
            Answer::Choice(Some(0)),
            Answer::Choice(Some(0)),
            Answer::Choice(Some(1)),
        ]);

        run_pr(&repo.git(), &Settings::default(), &backend, &mut interact).expect("pr");

        let notices = interact.notices().join("\n");
        assert!(notices.contains("https://github.com/acme/widget/compare/"));
        assert!(notices.contains("A description."));
        assert!(!repo.path().join(FALLBACK_FILE).exists());
    }

    /// The continuation receives the refined content, never the draft.
    #[test]
    fn recognized_host_delivers_the_approved_description() {
        let repo = feature_repo();
        repo.run_git(&["remote", "add", "origin", "git@github.com:acme/widget.git"])
            .expect("remote");
        let backend = ScriptedBackend::free_text(vec![
            "Draft body.".to_string(),
            "Refined body.".to_string(),
            r#"{"title": "feat: one"}"#.to_string(),
        ]);
        let mut interact = ScriptedInteract::new(vec![
            Answer::Choice(Some(0)),                       // base = main
            Answer::Choice(Some(1)),                       // improve
            Answer::Input(Some("shorter".to_string())),
            Answer::Choice(Some(0)),                       // submit
            Answer::Choice(Some(1)),                       // no changelog update
        ]);

        run_pr(&repo.git(), &Settings::default(), &backend, &mut interact).expect("pr");

        let notices = interact.notices().join("\n");
        assert!(notices.contains("Refined body."));
        assert!(!notices.contains("Draft body."));
    }

    #[test]
    fn changelog_update_appends_under_unreleased() {
        let repo = feature_repo();
        repo.run_git(&["remote", "add", "origin", "git@github.com:acme/widget.git"])
            .expect("remote");
        let entries = r#"{"added": ["one feature"], "changed": [], "deprecated": [], "removed": [], "fixed": [], "security": []}"#;
        let backend = ScriptedBackend::free_text(vec![
            "A description.".to_string(),
            r#"{"title": "feat: one"}"#.to_string(),
            entries.to_string(),
        ]);
        let mut interact = ScriptedInteract::new(vec![
            Answer::Choice(Some(0)), // base = main
            Answer::Choice(Some(0)), // submit description
            Answer::Choice(Some(0)), // yes, update changelog
            Answer::Choice(Some(0)), // submit the entries
        ]);

        run_pr(&repo.git(), &Settings::default(), &backend, &mut interact).expect("pr");

        let changelog = std::fs::read_to_string(repo.path().join(CHANGELOG_FILE)).expect("read");
        assert!(changelog.contains("## [Unreleased]"));
        assert!(changelog.contains("- one feature"));
    }

    /// The entries get their own review round before anything is written.
    #[test]
    fn changelog_entries_go_through_the_review_loop() {
        let repo = feature_repo();
        repo.run_git(&["remote", "add", "origin", "git@github.com:acme/widget.git"])
            .expect("remote");
        let entries = r#"{"added": ["one feature"], "changed": [], "deprecated": [], "removed": [], "fixed": [], "security": []}"#;
        let backend = ScriptedBackend::free_text(vec![
            "A description.".to_string(),
            r#"{"title": "feat: one"}"#.to_string(),
            entries.to_string(),
            "### Added\n\n- one feature, now with detail\n".to_string(),
        ]);
        let mut interact = ScriptedInteract::new(vec![
            Answer::Choice(Some(0)),                             // base = main
            Answer::Choice(Some(0)),                             // submit description
            Answer::Choice(Some(0)),                             // yes, update changelog
            Answer::Choice(Some(1)),                             // improve the entries
            Answer::Input(Some("add more detail".to_string())),
            Answer::Choice(Some(0)),                             // submit the entries
        ]);

        run_pr(&repo.git(), &Settings::default(), &backend, &mut interact).expect("pr");

        let changelog = std::fs::read_to_string(repo.path().join(CHANGELOG_FILE)).expect("read");
        assert!(changelog.contains("- one feature, now with detail"));
        assert!(!changelog.contains("- one feature\n"));
    }

    /// Cancelling the entry review skips only the changelog; the PR has
    /// already been reported.
    #[test]
    fn cancelling_entry_review_writes_no_changelog() {
        let repo = feature_repo();
        repo.run_git(&["remote", "add", "origin", "git@github.com:acme/widget.git"])
            .expect("remote");
        let entries = r#"{"added": ["one feature"], "changed": [], "deprecated": [], "removed": [], "fixed": [], "security": []}"#;
        let backend = ScriptedBackend::free_text(vec![
            "A description.".to_string(),
            r#"{"title": "feat: one"}"#.to_string(),
            entries.to_string(),
        ]);
        let mut interact = ScriptedInteract::new(vec![
            Answer::Choice(Some(0)), // base = main
            Answer::Choice(Some(0)), // submit description
            Answer::Choice(Some(0)), // yes, update changelog
            Answer::Choice(None),    // dismiss the entry review
        ]);

        run_pr(&repo.git(), &Settings::default(), &backend, &mut interact).expect("pr");

        assert!(!repo.path().join(CHANGELOG_FILE).exists());
        let notices = interact.notices().join("\n");
        assert!(notices.contains("https://github.com/acme/widget/compare/"));
    }
}
