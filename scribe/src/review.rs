//! Interactive refinement loop shared by the PR-description and changelog
//! tasks.
//!
//! An explicit state machine drives the session: draft, review, apply
//! feedback, until the user submits or cancels. Each transition is a pure
//! function of the current state and the user's choice plus one
//! side-effecting call (a generation or a prompt). The terminal continuation
//! (writing a file, opening a page) is owned by the calling task, not by the
//! loop.

use anyhow::Result;
use tracing::{debug, instrument, warn};

use crate::io::interact::Interact;

/// Session stage. Approved and Cancelled are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Drafting,
    Reviewing,
    ApplyingFeedback,
    Approved,
    Cancelled,
}

/// Single review session. Created when a generation task begins, mutated
/// only by the loop, discarded at a terminal stage.
#[derive(Debug, Clone)]
pub struct RefinementSession {
    pub current_content: String,
    pub stage: Stage,
    pub feedback_history: Vec<String>,
}

/// Task-specific wording for the three fixed choices.
#[derive(Debug, Clone, Copy)]
pub struct ReviewLabels {
    pub heading: &'static str,
    pub submit: &'static str,
    pub improve: &'static str,
    pub cancel: &'static str,
}

/// How a review session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewOutcome {
    Approved {
        content: String,
        feedback_rounds: usize,
    },
    Cancelled,
}

/// Run the refinement loop to a terminal state.
///
/// `draft` produces the initial content; `refine` is called with
/// `(current_content, feedback)` and returns the replacement content.
/// Empty or dismissed feedback stays in review without a regeneration call.
/// A refine failure offers retry (same feedback) or cancel.
#[instrument(skip_all)]
pub fn run_review<I, D, F>(
    interact: &mut I,
    labels: &ReviewLabels,
    mut draft: D,
    mut refine: F,
) -> Result<ReviewOutcome>
where
    I: Interact,
    D: FnMut() -> Result<String>,
    F: FnMut(&str, &str) -> Result<String>,
{
    let mut session = RefinementSession {
        current_content: String::new(),
        stage: Stage::Drafting,
        feedback_history: Vec::new(),
    };
    // Feedback being applied while in ApplyingFeedback; kept outside the
    // session so a failed attempt can be retried verbatim.
    let mut pending_feedback = String::new();

    loop {
        match session.stage {
            Stage::Drafting => {
                session.current_content = draft()?;
                session.stage = Stage::Reviewing;
            }
            Stage::Reviewing => {
                // Re-present on every entry; recovers a lost review surface.
                interact.show(labels.heading, &session.current_content)?;
                let choice = interact.choose(
                    "What next?",
                    &[labels.submit, labels.improve, labels.cancel],
                )?;
                match choice {
                    Some(0) => session.stage = Stage::Approved,
                    Some(1) => match interact.input("Describe what to improve:")? {
                        Some(feedback) if !feedback.trim().is_empty() => {
                            pending_feedback = feedback;
                            session.stage = Stage::ApplyingFeedback;
                        }
                        // No feedback given: stay put, no wasted regeneration.
                        _ => debug!("empty feedback, remaining in review"),
                    },
                    _ => session.stage = Stage::Cancelled,
                }
            }
            Stage::ApplyingFeedback => {
                match refine(&session.current_content, &pending_feedback) {
                    Ok(content) => {
                        session.current_content = content;
                        session.feedback_history.push(pending_feedback.clone());
                        session.stage = Stage::Reviewing;
                    }
                    Err(err) => {
                        warn!(%err, "refinement call failed");
                        interact.notify(&format!("Regeneration failed: {err:#}"))?;
                        let choice = interact.choose("Try again?", &["Retry", "Cancel"])?;
                        if choice != Some(0) {
                            session.stage = Stage::Cancelled;
                        }
                        // Retry re-enters ApplyingFeedback with the same feedback.
                    }
                }
            }
            Stage::Approved => {
                debug!(rounds = session.feedback_history.len(), "content approved");
                return Ok(ReviewOutcome::Approved {
                    content: session.current_content,
                    feedback_rounds: session.feedback_history.len(),
                });
            }
            Stage::Cancelled => {
                interact.notify("Cancelled.")?;
                return Ok(ReviewOutcome::Cancelled);
            }
        }
    }
}
