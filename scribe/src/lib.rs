//! AI-assisted commit, PR, changelog and release workflow for git repositories.
//!
//! Scribe gathers repository state (staged diffs, commit history, branch
//! comparisons), sends it to a language-model backend behind one generation
//! contract, and walks the result through an interactive refinement loop
//! before applying it. The architecture enforces a strict separation:
//!
//! - **[`io`]**: Side-effecting operations (git subprocesses, settings file,
//!   terminal interaction). Isolated behind traits to enable scripted doubles
//!   in tests.
//! - **[`llm`]**: The provider-agnostic generation adapter: prompt templates,
//!   learning-mode augmentation, free-text and schema-validated paths.
//! - **[`release`]**: Pure version/changelog/manifest logic plus the staged
//!   release orchestrator.
//!
//! Task modules ([`commit`], [`pr`], [`review`]) coordinate io with generation
//! to implement CLI commands.

pub mod commit;
pub mod context;
pub mod error;
pub mod io;
pub mod llm;
pub mod logging;
pub mod pr;
pub mod release;
pub mod review;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
