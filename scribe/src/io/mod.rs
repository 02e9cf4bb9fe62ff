//! I/O helpers for scribe tasks.

pub mod git;
pub mod interact;
pub mod settings;
