//! Commit-message generation.
//!
//! The one task that skips the refinement loop: the message is generated and
//! presented directly, ready to paste into `git commit`. Running the commit
//! itself stays with the user.

use anyhow::Result;
use tracing::instrument;

use crate::context;
use crate::io::git::Git;
use crate::io::interact::Interact;
use crate::io::settings::Settings;
use crate::llm::backend::Backend;
use crate::llm::{COMMIT_FULL_TEMPLATE, COMMIT_SIMPLE_TEMPLATE, GenerationRequest, generate_with};

/// Generate a commit message for the staged changes.
///
/// `simple` selects the one-line form; the default is a summary line plus
/// body.
#[instrument(skip_all, fields(simple))]
pub fn run_commit<I: Interact>(
    git: &Git,
    settings: &Settings,
    backend: &dyn Backend,
    interact: &mut I,
    simple: bool,
) -> Result<String> {
    let variables = context::commit_variables(git)?;
    let template = if simple {
        COMMIT_SIMPLE_TEMPLATE
    } else {
        COMMIT_FULL_TEMPLATE
    };
    let request = GenerationRequest::free_text(template, variables);
    let message = generate_with(backend, git, settings, &request)?.into_text()?;

    interact.show("Commit message", &message)?;
    Ok(message)
}
