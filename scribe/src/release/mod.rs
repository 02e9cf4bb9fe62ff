//! Guarded release orchestration.
//!
//! A release runs as a fixed stage sequence: validate the working copy, sync
//! with the remote, choose the next version, assemble the changelog through
//! the review loop, then commit, tag, push and publish. Every stage must
//! succeed (or be explicitly skipped where noted) before the next one runs;
//! cancellation at any prompt leaves the repository untouched up to the
//! stages already completed.

pub mod changelog;
pub mod hosted;
pub mod manifest;
pub mod version;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use semver::Version;
use tracing::{debug, instrument, warn};

use crate::context;
use crate::error::{Cancelled, Precondition};
use crate::io::git::Git;
use crate::io::interact::Interact;
use crate::io::settings::{Settings, write_settings};
use crate::llm::backend::Backend;
use crate::llm::{CHANGELOG_SCHEMA, CHANGELOG_TEMPLATE, GenerationRequest, REFINE_TEMPLATE, generate_with};
use crate::release::changelog::ChangelogEntries;
use crate::release::hosted::{HostProvider, parse_remote, publish_release};
use crate::release::manifest::ProjectManifest;
use crate::release::version::{Bump, bump_version, parse_custom};
use crate::review::{ReviewLabels, ReviewOutcome, run_review};

const CHANGELOG_FILE: &str = "CHANGELOG.md";

/// Commit history window for release-note generation.
const NOTES_COMMIT_LIMIT: usize = 50;

const CHANGELOG_LABELS: ReviewLabels = ReviewLabels {
    heading: "Release notes",
    submit: "Use these notes",
    improve: "Improve the notes",
    cancel: "Cancel the release",
};

/// The version transition a release will perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleasePlan {
    pub current: Version,
    pub next: Version,
    pub tag: String,
}

impl ReleasePlan {
    fn new(current: Version, next: Version) -> Self {
        let tag = format!("v{next}");
        Self { current, next, tag }
    }
}

/// Run the full release sequence against a working copy.
///
/// `settings` may be mutated (a newly entered host token is persisted to
/// `settings_path` immediately, so a failed publication does not cost the
/// user a re-entry).
#[instrument(skip_all)]
pub fn run_release<I: Interact>(
    git: &Git,
    settings: &mut Settings,
    settings_path: &Path,
    backend: &dyn Backend,
    interact: &mut I,
) -> Result<()> {
    // Stage 1: validation. A dirty tree or missing remote stops the release
    // before anything is generated or written.
    git.ensure_clean()
        .map_err(|err| Precondition(format!("{err:#}")))?;
    let remote = git
        .remote_url()?
        .ok_or_else(|| Precondition("no 'origin' remote configured".to_string()))?;

    // Stage 2: sync. The branch ends this stage with a proven remote
    // counterpart: no upstream means an establishing push now, and a fetch
    // failure falls back to the same establishing push rather than letting
    // the release mutate anything before connectivity is demonstrated.
    match git.fetch() {
        Ok(()) => {
            if git.has_upstream()? {
                let behind = git.behind_count()?;
                if behind > 0 {
                    interact.notify(&format!("Branch is {behind} commit(s) behind; rebasing."))?;
                    git.pull_rebase()?;
                }
            } else {
                git.push_set_upstream(&git.current_branch()?)?;
            }
        }
        Err(err) => {
            warn!(%err, "fetch failed, falling back to an establishing push");
            interact.notify("Could not fetch from the remote; pushing to establish the branch.")?;
            git.push_set_upstream(&git.current_branch()?)?;
        }
    }

    // Stage 3: version selection.
    let manifest = ProjectManifest::locate(git.workdir()).ok_or_else(|| {
        Precondition("no project manifest (package.json, manifest.json or Cargo.toml)".to_string())
    })?;
    let current = manifest.version()?;
    let plan = match choose_version(interact, &current)? {
        Some(next) => ReleasePlan::new(current, next),
        None => return Err(Cancelled.into()),
    };
    debug!(current = %plan.current, next = %plan.next, "release plan");

    // Stage 4: release notes through the review loop.
    let notes = match run_review(
        interact,
        &CHANGELOG_LABELS,
        || draft_notes(backend, git, settings),
        |current_notes, feedback| refine_notes(backend, git, settings, current_notes, feedback),
    )? {
        ReviewOutcome::Approved { content, .. } => content,
        ReviewOutcome::Cancelled => return Err(Cancelled.into()),
    };

    // Stage 5: the single write-and-publish pass. Changelog and manifest are
    // written exactly once, committed together, then tagged and pushed.
    let changelog_path = git.workdir().join(CHANGELOG_FILE);
    let document = match fs::read_to_string(&changelog_path) {
        Ok(text) => text,
        Err(_) => changelog::SKELETON.to_string(),
    };
    let today = chrono::Local::now().format("%Y-%m-%d").to_string();
    let updated = changelog::insert_release(&document, &plan.next.to_string(), &today, &notes)?;
    fs::write(&changelog_path, updated)
        .with_context(|| format!("write {}", changelog_path.display()))?;
    manifest.set_version(&plan.next)?;

    git.commit_paths(
        &[CHANGELOG_FILE, manifest.file_name()],
        &format!("chore(release): {}", plan.tag),
    )?;
    git.tag_annotated(&plan.tag, &notes)?;
    git.push()?;
    git.push_tag(&plan.tag)?;
    interact.notify(&format!("Released {} (tag pushed).", plan.tag))?;

    // Stage 6: hosted release, when the remote is a service we can publish to.
    publish_hosted(&remote, &plan, &notes, settings, settings_path, interact)?;
    Ok(())
}

/// Present the bump menu and resolve the next version. `None` means the user
/// cancelled.
fn choose_version<I: Interact>(interact: &mut I, current: &Version) -> Result<Option<Version>> {
    let major = bump_version(current, Bump::Major);
    let minor = bump_version(current, Bump::Minor);
    let patch = bump_version(current, Bump::Patch);
    let options = [
        format!("Major ({major})"),
        format!("Minor ({minor})"),
        format!("Patch ({patch})"),
        "Custom".to_string(),
    ];
    let refs: Vec<&str> = options.iter().map(String::as_str).collect();

    let choice = interact.choose(&format!("Current version is {current}. Bump:"), &refs)?;
    match choice {
        Some(0) => Ok(Some(major)),
        Some(1) => Ok(Some(minor)),
        Some(2) => Ok(Some(patch)),
        Some(3) => loop {
            let Some(input) = interact.input("Enter the version (MAJOR.MINOR.PATCH):")? else {
                return Ok(None);
            };
            match parse_custom(&input) {
                Ok(next) => return Ok(Some(next)),
                Err(err) => interact.notify(&format!("{err:#}"))?,
            }
        },
        _ => Ok(None),
    }
}

/// Generate the structured release notes and render them as a section body.
fn draft_notes(backend: &dyn Backend, git: &Git, settings: &Settings) -> Result<String> {
    let variables = context::changelog_variables_from_commits(git, NOTES_COMMIT_LIMIT)?;
    let request = GenerationRequest::structured(CHANGELOG_TEMPLATE, variables, CHANGELOG_SCHEMA);
    let object = generate_with(backend, git, settings, &request)?.into_object()?;
    let entries = ChangelogEntries::from_value(object)?;
    if entries.is_empty() {
        return Err(Precondition("no notable changes to release".to_string()).into());
    }
    Ok(entries.format_entries())
}

/// One refinement round over the notes as free text.
fn refine_notes(
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

/// Publish the hosted release when the remote belongs to a supported service.
///
/// A missing token is prompted for once and persisted; declining the prompt
/// skips publication without failing the release.
fn publish_hosted<I: Interact>(
    remote: &str,
    plan: &ReleasePlan,
    notes: &str,
    settings: &mut Settings,
    settings_path: &Path,
    interact: &mut I,
) -> Result<()> {
    let Some(repo) = parse_remote(remote) else {
        interact.notify("Remote host not recognized; skipping hosted release.")?;
        return Ok(());
    };
    if !repo.provider.supports_releases() {
        interact.notify(&format!(
            "{} releases are not supported; skipping hosted release.",
            repo.provider.label()
        ))?;
        return Ok(());
    }

    let stored = match repo.provider {
        HostProvider::GitHub => settings.tokens.github.clone(),
        HostProvider::GitLab => settings.tokens.gitlab.clone(),
        HostProvider::Bitbucket => None,
    };
    let token = match stored {
        Some(token) => token,
        None => {
            let prompt = format!(
                "Enter a {} access token (leave empty to skip the hosted release):",
                repo.provider.label()
            );
            let Some(token) = interact.input(&prompt)? else {
                interact.notify("Skipping hosted release.")?;
                return Ok(());
            };
            match repo.provider {
                HostProvider::GitHub => settings.tokens.github = Some(token.clone()),
                HostProvider::GitLab => settings.tokens.gitlab = Some(token.clone()),
                HostProvider::Bitbucket => {}
            }
            write_settings(settings_path, settings)?;
            token
        }
    };

    publish_release(&repo, &token, &plan.tag, &plan.tag, notes)
        .context("hosted release publication failed (the tag is already pushed)")?;
    interact.notify(&format!(
        "Published {} release {}.",
        repo.provider.label(),
        plan.tag
    ))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Answer, ScriptedInteract};

    fn v(s: &str) -> Version {
        Version::parse(s).expect("version")
    }

    #[test]
    fn plan_tags_with_v_prefix() {
        let plan = ReleasePlan::new(v("1.0.0"), v("1.1.0"));
        assert_eq!(plan.tag, "v1.1.0");
    }

    #[test]
    fn menu_choice_maps_to_bump() {
        let mut interact = ScriptedInteract::new(vec![Answer::Choice(Some(1))]);
        let next = choose_version(&mut interact, &v("1.2.3")).expect("choose");
        assert_eq!(next, Some(v("1.3.0")));
    }

    #[test]
    fn custom_version_reprompts_until_valid() {
        let mut interact = ScriptedInteract::new(vec![
            Answer::Choice(Some(3)),
            Answer::Input(Some("2.5".to_string())),
            Answer::Input(Some("2.5.0".to_string())),
        ]);
        let next = choose_version(&mut interact, &v("1.2.3")).expect("choose");
        assert_eq!(next, Some(v("2.5.0")));
        assert_eq!(interact.notices().len(), 1);
    }

    #[test]
    fn dismissing_custom_input_cancels() {
        let mut interact =
            ScriptedInteract::new(vec![Answer::Choice(Some(3)), Answer::Input(None)]);
        let next = choose_version(&mut interact, &v("1.2.3")).expect("choose");
        assert_eq!(next, None);
    }

    #[test]
    fn dismissing_the_menu_cancels() {
        let mut interact = ScriptedInteract::new(vec![Answer::Choice(None)]);
        let next = choose_version(&mut interact, &v("1.2.3")).expect("choose");
        assert_eq!(next, None);
    }
}
