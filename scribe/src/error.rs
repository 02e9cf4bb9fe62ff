//! Failure taxonomy shared across tasks.
//!
//! Components return `anyhow::Result` and attach one of these typed values at
//! the point of failure. The command boundary in `main.rs` downcasts to decide
//! how to report: cancellations and precondition failures are expected and
//! reported quietly; everything else is an error.

use thiserror::Error;

/// Expected pre-flight failure (e.g. no staged changes). Not exceptional.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct Precondition(pub String);

/// Missing or unusable configuration; carries the fix action.
#[derive(Debug, Error)]
#[error("{message} (fix: {remediation})")]
pub struct Configuration {
    pub message: String,
    pub remediation: String,
}

impl Configuration {
    pub fn new(message: impl Into<String>, remediation: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            remediation: remediation.into(),
        }
    }
}

/// Non-zero exit from the underlying version-control executable.
#[derive(Debug, Error)]
#[error("git {command} failed: {stderr}")]
pub struct ExternalTool {
    pub command: String,
    pub stderr: String,
}

/// Backend call failure (network, HTTP status, malformed reply envelope).
#[derive(Debug, Error)]
#[error("generation failed: {0}")]
pub struct Generation(pub String);

/// Structured output did not conform to its schema.
///
/// Distinct from [`Generation`] so callers know a verbatim retry is pointless;
/// the model must be re-prompted instead.
#[derive(Debug, Error)]
#[error("structured output failed validation: {0}")]
pub struct Validation(pub String);

/// User dismissed a prompt. A normal terminal path, not an error.
#[derive(Debug, Error)]
#[error("cancelled")]
pub struct Cancelled;

/// True when the error chain ends in a quiet outcome (cancellation or an
/// expected precondition failure) that should not alarm the user.
pub fn is_quiet(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| cause.is::<Cancelled>() || cause.is::<Precondition>())
}
