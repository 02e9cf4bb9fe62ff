//! Git adapter for scribe tasks.
//!
//! Every repository read and mutation goes through a small, explicit wrapper
//! around `git` subprocess calls. Subcommands run one at a time against the
//! working copy; there is no timeout (interactive single-user usage).

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::error::ExternalTool;

/// One-line substitute for dependency lock-file diffs.
///
/// Lock files flood the generation context with non-semantic noise, so their
/// diff content is never sent to the backend.
pub const LOCK_FILE_PLACEHOLDER: &str = "[lock file changed, diff omitted]";

/// Record separator between commits in log output. Cannot occur in commit text.
const COMMIT_SEP: char = '\u{1e}';
/// Unit separator between hash and message within one commit record.
const FIELD_SEP: char = '\u{1f}';

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    /// Path for the changed file.
    pub path: String,
}

/// A commit hash paired with its (possibly multi-line, trimmed) message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitEntry {
    pub hash: String,
    pub message: String,
}

/// One commit ahead of a comparison base, with its single-commit diff.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct BranchCommit {
    pub hash: String,
    pub message: String,
    pub diff: String,
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Return the current branch name (errors on detached HEAD).
    #[instrument(skip_all)]
    pub fn current_branch(&self) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        let name = out.trim().to_string();
        if name == "HEAD" {
            warn!("detached HEAD detected");
            return Err(anyhow!("detached HEAD (refuse to run)"));
        }
        debug!(branch = %name, "current branch");
        Ok(name)
    }

    /// List local branch names.
    pub fn all_branches(&self) -> Result<Vec<String>> {
        let out = self.run_capture(&["branch", "--format=%(refname:short)"])?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Paths staged for the next commit, in listing order.
    pub fn staged_files(&self) -> Result<Vec<String>> {
        let out = self.run_capture(&["diff", "--cached", "--name-only"])?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Staged diff with lock-file diffs replaced by [`LOCK_FILE_PLACEHOLDER`].
    ///
    /// Per-file diffs and placeholders are concatenated in staged file order.
    #[instrument(skip_all)]
    pub fn staged_diff(&self) -> Result<String> {
        let mut parts = Vec::new();
        for path in self.staged_files()? {
            if is_lock_file(&path) {
                debug!(path = %path, "substituting lock file placeholder");
                parts.push(format!("{path}: {LOCK_FILE_PLACEHOLDER}\n"));
            } else {
                parts.push(self.run_capture(&["diff", "--cached", "--", &path])?);
            }
        }
        Ok(parts.concat())
    }

    /// The most recent `limit` commits, newest first.
    pub fn recent_commits(&self, limit: usize) -> Result<Vec<CommitEntry>> {
        let count = format!("-n{limit}");
        let format = format!("--format=%H{FIELD_SEP}%B{COMMIT_SEP}");
        let out = self.run_capture(&["log", &count, &format])?;
        parse_commit_log(&out)
    }

    /// Message of the most recent commit, or `None` in an empty repository.
    pub fn latest_commit_message(&self) -> Result<Option<String>> {
        let output = self.run(&["log", "-n1", "--format=%B"])?;
        if !output.status.success() {
            // No commits yet is not a failure for this caller.
            return Ok(None);
        }
        let message = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!message.is_empty()).then_some(message))
    }

    /// Commits ahead of `base`, newest first, each with its single-commit diff.
    #[instrument(skip_all, fields(base))]
    pub fn branch_diff(&self, base: &str) -> Result<Vec<BranchCommit>> {
        let range = format!("{base}..HEAD");
        let format = format!("--format=%H{FIELD_SEP}%B{COMMIT_SEP}");
        let out = self.run_capture(&["log", &range, &format])?;
        let mut commits = Vec::new();
        for entry in parse_commit_log(&out)? {
            let diff = self.run_capture(&["show", &entry.hash, "--pretty=format:", "--patch"])?;
            commits.push(BranchCommit {
                hash: entry.hash,
                message: entry.message,
                diff,
            });
        }
        debug!(commits = commits.len(), "collected branch diff");
        Ok(commits)
    }

    /// Get status entries (including untracked) in porcelain format.
    pub fn status_porcelain(&self) -> Result<Vec<StatusEntry>> {
        let out = self.run_capture(&["status", "--porcelain=v1", "-uall"])?;
        let mut entries = Vec::new();
        for line in out.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(parse_status_line(line)?);
        }
        Ok(entries)
    }

    /// Ensure the worktree is fully clean (including untracked files).
    #[instrument(skip_all)]
    pub fn ensure_clean(&self) -> Result<()> {
        let entries = self.status_porcelain()?;
        if entries.is_empty() {
            debug!("worktree is clean");
            return Ok(());
        }
        warn!(entries = entries.len(), "worktree not clean");
        let mut msg = String::new();
        msg.push_str("working tree not clean:\n");
        for entry in entries {
            msg.push_str(&format!("{} {}\n", entry.code, entry.path));
        }
        Err(anyhow!(msg.trim_end().to_string()))
    }

    /// URL of the `origin` remote, or `None` when no remote is configured.
    pub fn remote_url(&self) -> Result<Option<String>> {
        let output = self.run(&["remote", "get-url", "origin"])?;
        if !output.status.success() {
            return Ok(None);
        }
        let url = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!url.is_empty()).then_some(url))
    }

    pub fn fetch(&self) -> Result<()> {
        self.run_checked(&["fetch", "--prune"])?;
        Ok(())
    }

    /// Whether the current branch has a remote counterpart.
    pub fn has_upstream(&self) -> Result<bool> {
        let status = self
            .run(&["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{upstream}"])?
            .status;
        Ok(status.success())
    }

    /// Number of commits the local branch is behind its upstream.
    pub fn behind_count(&self) -> Result<u32> {
        let out = self.run_capture(&["rev-list", "--count", "HEAD..@{upstream}"])?;
        out.trim()
            .parse()
            .with_context(|| format!("parse rev-list count '{}'", out.trim()))
    }

    pub fn pull_rebase(&self) -> Result<()> {
        self.run_checked(&["pull", "--rebase"])?;
        Ok(())
    }

    pub fn push(&self) -> Result<()> {
        self.run_checked(&["push"])?;
        Ok(())
    }

    pub fn push_set_upstream(&self, branch: &str) -> Result<()> {
        self.run_checked(&["push", "--set-upstream", "origin", branch])?;
        Ok(())
    }

    pub fn push_tag(&self, tag: &str) -> Result<()> {
        self.run_checked(&["push", "origin", tag])?;
        Ok(())
    }

    /// Stage the given paths and commit them with a message.
    #[instrument(skip_all)]
    pub fn commit_paths(&self, paths: &[&str], message: &str) -> Result<()> {
        let mut add = vec!["add", "--"];
        add.extend_from_slice(paths);
        self.run_checked(&add)?;
        self.run_checked(&["commit", "-m", message])?;
        Ok(())
    }

    /// Create an annotated tag carrying `annotation` as its message,
    /// byte-for-byte.
    ///
    /// The annotation is passed as a plain exec argument, so embedded quotes
    /// and other shell metacharacters cannot corrupt the command.
    #[instrument(skip_all, fields(name))]
    pub fn tag_annotated(&self, name: &str, annotation: &str) -> Result<()> {
        self.run_checked(&["tag", "-a", name, "-m", annotation])?;
        Ok(())
    }

    /// Most recent tag reachable from HEAD. No tags yet is `None`, not a failure.
    pub fn latest_tag(&self) -> Result<Option<String>> {
        let output = self.run(&["describe", "--tags", "--abbrev=0"])?;
        if !output.status.success() {
            debug!("no existing tags");
            return Ok(None);
        }
        let tag = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!tag.is_empty()).then_some(tag))
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExternalTool {
                command: args.join(" "),
                stderr: stderr.trim().to_string(),
            }
            .into());
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

/// True for paths matching recognized dependency-lock naming patterns.
pub fn is_lock_file(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.ends_with("lock.json") || name.ends_with(".lock") || name.ends_with("lock.yaml")
}

/// Parse sentinel-delimited log output into commit entries.
fn parse_commit_log(raw: &str) -> Result<Vec<CommitEntry>> {
    let mut entries = Vec::new();
    for record in raw.split(COMMIT_SEP) {
        let record = record.trim();
        if record.is_empty() {
            continue;
        }
        let (hash, message) = record
            .split_once(FIELD_SEP)
            .ok_or_else(|| anyhow!("unexpected log record: '{record}'"))?;
        entries.push(CommitEntry {
            hash: hash.trim().to_string(),
            message: message.trim().to_string(),
        });
    }
    Ok(entries)
}

fn parse_status_line(line: &str) -> Result<StatusEntry> {
    if let Some(path) = line.strip_prefix("?? ") {
        return Ok(StatusEntry {
            code: "??".to_string(),
            path: path.trim().to_string(),
        });
    }
    if line.len() < 4 {
        return Err(anyhow!("unexpected porcelain line: '{line}'"));
    }
    let code = line[..2].to_string();
    let mut path = line[3..].trim().to_string();
    if let Some((_, new)) = path.split_once("->") {
        path = new.trim().to_string();
    }
    Ok(StatusEntry { code, path })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestRepo;

    #[test]
    fn recognizes_lock_file_patterns() {
        assert!(is_lock_file("package-lock.json"));
        assert!(is_lock_file("Cargo.lock"));
        assert!(is_lock_file("yarn.lock"));
        assert!(is_lock_file("deep/dir/pnpm-lock.yaml"));
        assert!(!is_lock_file("src/main.rs"));
        assert!(!is_lock_file("locker.rs"));
    }

    #[test]
    fn parses_sentinel_delimited_log() {
        let raw = format!(
            "abc{FIELD_SEP}feat: add thing\n\nwith a body\n{COMMIT_SEP}\ndef{FIELD_SEP}fix: bug{COMMIT_SEP}"
        );
        let entries = parse_commit_log(&raw).expect("parse");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].hash, "abc");
        assert_eq!(entries[0].message, "feat: add thing\n\nwith a body");
        assert_eq!(entries[1].message, "fix: bug");
    }

    #[test]
    fn parses_untracked_line() {
        let e = parse_status_line("?? foo.txt").expect("parse");
        assert_eq!(e.code, "??");
        assert_eq!(e.path, "foo.txt");
    }

    #[test]
    fn parses_rename_line_uses_new_path() {
        let e = parse_status_line("R  old.txt -> new.txt").expect("parse");
        assert_eq!(e.path, "new.txt");
    }

    #[test]
    fn staged_diff_substitutes_lock_file_placeholder() {
        let repo = TestRepo::new().expect("repo");
        repo.write_and_stage("src/lib.rs", "pub fn hello() {}\n")
            .expect("stage source");
        repo.write_and_stage("Cargo.lock", "[[package]]\nname = \"secret-dep\"\n")
            .expect("stage lock");

        let diff = repo.git().staged_diff().expect("diff");
        assert!(diff.contains(LOCK_FILE_PLACEHOLDER));
        assert!(diff.contains("pub fn hello()"));
        assert!(!diff.contains("secret-dep"));
    }

    #[test]
    fn recent_commits_trims_multiline_messages() {
        let repo = TestRepo::new().expect("repo");
        repo.commit_file("a.txt", "one", "feat: first\n\nbody line\n")
            .expect("commit 1");
        repo.commit_file("b.txt", "two", "fix: second\n").expect("commit 2");

        let commits = repo.git().recent_commits(10).expect("log");
        assert_eq!(commits.len(), 2);
        // Newest first, matching log direction.
        assert_eq!(commits[0].message, "fix: second");
        assert_eq!(commits[1].message, "feat: first\n\nbody line");
    }

    #[test]
    fn branch_diff_is_newest_first_with_diffs() {
        let repo = TestRepo::new().expect("repo");
        repo.commit_file("base.txt", "base", "chore: base").expect("base");
        repo.run_git(&["checkout", "-b", "feature"]).expect("branch");
        repo.commit_file("one.txt", "one", "feat: one").expect("one");
        repo.commit_file("two.txt", "two", "feat: two").expect("two");

        let commits = repo.git().branch_diff("main").expect("branch diff");
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].message, "feat: two");
        assert!(commits[0].diff.contains("two.txt"));
        assert_eq!(commits[1].message, "feat: one");
    }

    #[test]
    fn tag_annotation_is_stored_byte_for_byte() {
        let repo = TestRepo::new().expect("repo");
        repo.commit_file("a.txt", "one", "chore: init").expect("commit");

        repo.git()
            .tag_annotated("v1.0.0", "Fixed the \"quoted\" case")
            .expect("tag");

        let output = std::process::Command::new("git")
            .args(["tag", "-l", "--format=%(contents)", "v1.0.0"])
            .current_dir(repo.path())
            .output()
            .expect("git tag -l");
        let stored = String::from_utf8_lossy(&output.stdout);
        assert_eq!(stored.trim(), "Fixed the \"quoted\" case");
    }

    #[test]
    fn latest_tag_is_none_without_tags() {
        let repo = TestRepo::new().expect("repo");
        repo.commit_file("a.txt", "one", "chore: init").expect("commit");
        assert_eq!(repo.git().latest_tag().expect("latest tag"), None);
    }
}
