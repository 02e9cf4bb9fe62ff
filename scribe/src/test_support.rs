//! Test doubles and fixtures shared by unit and integration tests.
//!
//! `TestRepo` provides a throwaway git repository; `ScriptedBackend` and
//! `ScriptedInteract` replay predetermined replies so tests never touch a
//! network or a terminal.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::io::git::Git;
use crate::io::interact::Interact;
use crate::llm::backend::{Backend, CompletionRequest};

/// A real git repository in a temporary directory, removed on drop.
///
/// Initialized with `main` as the initial branch so branch-relative tests
/// are independent of the host git configuration.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = TempDir::new().context("create temp dir")?;
        let repo = Self { dir };
        repo.run_git(&["init", "-b", "main"])?;
        repo.run_git(&["config", "user.email", "test@example.com"])?;
        repo.run_git(&["config", "user.name", "Test User"])?;
        Ok(repo)
    }

    pub fn git(&self) -> Git {
        Git::new(self.dir.path())
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Run a raw git subcommand against the fixture repository.
    pub fn run_git(&self, args: &[&str]) -> Result<()> {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.dir.path())
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))?;
        if !output.status.success() {
            return Err(anyhow!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(())
    }

    /// Write a file relative to the repository root, creating parent
    /// directories as needed.
    pub fn write_file(&self, path: &str, contents: &str) -> Result<()> {
        let full = self.dir.path().join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        fs::write(&full, contents).with_context(|| format!("write {}", full.display()))?;
        Ok(())
    }

    pub fn write_and_stage(&self, path: &str, contents: &str) -> Result<()> {
        self.write_file(path, contents)?;
        self.run_git(&["add", "--", path])
    }

    pub fn commit_file(&self, path: &str, contents: &str, message: &str) -> Result<()> {
        self.write_and_stage(path, contents)?;
        self.run_git(&["commit", "-m", message])
    }
}

/// Generation backend replaying scripted replies and recording prompts.
#[derive(Debug)]
pub struct ScriptedBackend {
    replies: RefCell<VecDeque<String>>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedBackend {
    /// Replies are consumed in order, one per completion call.
    pub fn free_text(replies: Vec<String>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl Backend for ScriptedBackend {
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String> {
        self.prompts.borrow_mut().push(request.prompt.to_string());
        self.replies
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted backend exhausted"))
    }
}

/// One scripted answer to an interaction prompt.
#[derive(Debug, Clone)]
pub enum Answer {
    Choice(Option<usize>),
    Input(Option<String>),
}

/// Interactor replaying scripted answers and recording what was presented.
pub struct ScriptedInteract {
    answers: VecDeque<Answer>,
    shown: Vec<String>,
    notices: Vec<String>,
}

impl ScriptedInteract {
    pub fn new(answers: Vec<Answer>) -> Self {
        Self {
            answers: answers.into(),
            shown: Vec::new(),
            notices: Vec::new(),
        }
    }

    /// Contents passed to `show`, in presentation order.
    pub fn shown(&self) -> Vec<String> {
        self.shown.clone()
    }

    /// Messages passed to `notify`, in order.
    pub fn notices(&self) -> Vec<String> {
        self.notices.clone()
    }
}

impl Interact for ScriptedInteract {
    fn choose(&mut self, prompt: &str, _options: &[&str]) -> Result<Option<usize>> {
        match self.answers.pop_front() {
            Some(Answer::Choice(choice)) => Ok(choice),
            other => panic!("unexpected choose('{prompt}'), scripted answer was {other:?}"),
        }
    }

    fn input(&mut self, prompt: &str) -> Result<Option<String>> {
        match self.answers.pop_front() {
            Some(Answer::Input(input)) => Ok(input),
            other => panic!("unexpected input('{prompt}'), scripted answer was {other:?}"),
        }
    }

    fn show(&mut self, _heading: &str, content: &str) -> Result<()> {
        self.shown.push(content.to_string());
        Ok(())
    }

    fn notify(&mut self, message: &str) -> Result<()> {
        self.notices.push(message.to_string());
        Ok(())
    }
}
