//! Hosted-repository detection and release publication.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::error::Generation;

/// Recognized hosting services, pattern-matched from the remote URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostProvider {
    GitHub,
    GitLab,
    Bitbucket,
}

impl HostProvider {
    fn from_domain(domain: &str) -> Option<Self> {
        match domain {
            "github.com" => Some(Self::GitHub),
            "gitlab.com" => Some(Self::GitLab),
            "bitbucket.org" => Some(Self::Bitbucket),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::GitHub => "GitHub",
            Self::GitLab => "GitLab",
            Self::Bitbucket => "Bitbucket",
        }
    }

    /// Whether the service exposes a release-publication API scribe supports.
    pub fn supports_releases(self) -> bool {
        matches!(self, Self::GitHub | Self::GitLab)
    }
}

/// A remote parsed down to its hosting service and repository slug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedRepo {
    pub provider: HostProvider,
    pub owner: String,
    pub repo: String,
}

impl HostedRepo {
    /// Web URL for comparing a branch against its base (the "open a PR"
    /// entry point).
    pub fn compare_url(&self, base: &str, branch: &str) -> String {
        match self.provider {
            HostProvider::GitHub => format!(
                "https://github.com/{}/{}/compare/{base}...{branch}?expand=1",
                self.owner, self.repo
            ),
            HostProvider::GitLab => format!(
                "https://gitlab.com/{}/{}/-/merge_requests/new?merge_request[source_branch]={branch}&merge_request[target_branch]={base}",
                self.owner, self.repo
            ),
            HostProvider::Bitbucket => format!(
                "https://bitbucket.org/{}/{}/pull-requests/new?source={branch}&dest={base}",
                self.owner, self.repo
            ),
        }
    }
}

/// Parse a remote URL against both HTTPS and SSH hosted-repository
/// conventions. Unrecognized hosts yield `None`.
pub fn parse_remote(url: &str) -> Option<HostedRepo> {
    static HTTPS: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^https://([^/]+)/([^/]+)/(.+?)(?:\.git)?/?$").expect("https remote regex")
    });
    static SSH: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^(?:ssh://)?git@([^:/]+)[:/]([^/]+)/(.+?)(?:\.git)?$").expect("ssh remote regex")
    });

    let trimmed = url.trim();
    let caps = HTTPS.captures(trimmed).or_else(|| SSH.captures(trimmed))?;
    let provider = HostProvider::from_domain(&caps[1])?;
    Some(HostedRepo {
        provider,
        owner: caps[2].to_string(),
        repo: caps[3].to_string(),
    })
}

#[derive(Debug, Serialize)]
struct GitHubReleaseRequest<'a> {
    tag_name: &'a str,
    name: &'a str,
    body: &'a str,
    draft: bool,
    prerelease: bool,
}

#[derive(Debug, Serialize)]
struct GitLabReleaseRequest<'a> {
    tag_name: &'a str,
    name: &'a str,
    description: &'a str,
}

/// Publish a hosted release for an existing tag.
///
/// One authenticated creation call; the tag must already be pushed.
#[instrument(skip_all, fields(provider = repo.provider.label(), tag))]
pub fn publish_release(
    repo: &HostedRepo,
    token: &str,
    tag: &str,
    title: &str,
    body: &str,
) -> Result<()> {
    let client = reqwest::blocking::Client::builder()
        .user_agent("scribe/0.1.0")
        .build()
        .context("build HTTP client")?;

    let builder = match repo.provider {
        HostProvider::GitHub => client
            .post(format!(
                "https://api.github.com/repos/{}/{}/releases",
                repo.owner, repo.repo
            ))
            .header("Authorization", format!("Bearer {token}"))
            .header("Accept", "application/vnd.github+json")
            .json(&GitHubReleaseRequest {
                tag_name: tag,
                name: title,
                body,
                draft: false,
                prerelease: false,
            }),
        HostProvider::GitLab => client
            .post(format!(
                "https://gitlab.com/api/v4/projects/{}%2F{}/releases",
                repo.owner, repo.repo
            ))
            .header("PRIVATE-TOKEN", token)
            .json(&GitLabReleaseRequest {
                tag_name: tag,
                name: title,
                description: body,
            }),
        HostProvider::Bitbucket => {
            return Err(Generation("Bitbucket has no release API".to_string()).into());
        }
    };

    let response = builder
        .send()
        .map_err(|err| Generation(format!("release publication failed: {err}")))?;
    let status = response.status();
    if !status.is_success() {
        let text = response.text().unwrap_or_default();
        return Err(Generation(format!(
            "{} release API error: {status} - {text}",
            repo.provider.label()
        ))
        .into());
    }
    debug!("hosted release published");
    Ok(())
}
