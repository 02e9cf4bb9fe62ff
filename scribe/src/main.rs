//! AI-assisted commit, PR, changelog and release workflow.
//!
//! Generates commit messages, pull-request descriptions and changelog
//! entries from repository state via a language-model backend, with an
//! interactive refinement loop, plus a guarded release sequence.

use std::env;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use scribe::error::is_quiet;
use scribe::io::git::Git;
use scribe::io::interact::{Console, Interact};
use scribe::io::settings::{ProviderId, load_settings, settings_path, write_settings};
use scribe::llm::backend::backend_for;
use scribe::{commit, logging, pr, release};

#[derive(Parser)]
#[command(
    name = "scribe",
    version,
    about = "AI-assisted commit, PR, changelog and release workflow"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a commit message for the staged changes.
    Commit {
        /// One-line message instead of summary plus body.
        #[arg(short, long)]
        simple: bool,
    },
    /// Generate a pull-request description for the current branch.
    Pr,
    /// Run the release sequence: validate, sync, bump, changelog, tag, push.
    Release,
    /// Store an API key for a generation provider.
    SetApiKey,
    /// Print the settings path and the current non-secret values.
    Settings,
}

fn main() {
    logging::init();
    if let Err(err) = run() {
        // Cancellations and precondition failures are expected outcomes.
        if is_quiet(&err) {
            println!("{err:#}");
            return;
        }
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let git = Git::new(env::current_dir().context("resolve working directory")?);
    let mut console = Console;
    match cli.command {
        Command::Commit { simple } => cmd_commit(&git, &mut console, simple),
        Command::Pr => cmd_pr(&git, &mut console),
        Command::Release => cmd_release(&git, &mut console),
        Command::SetApiKey => cmd_set_api_key(&mut console),
        Command::Settings => cmd_settings(),
    }
}

fn cmd_commit(git: &Git, console: &mut Console, simple: bool) -> Result<()> {
    let settings = load_settings(&settings_path()?)?;
    let backend = backend_for(&settings)?;
    commit::run_commit(git, &settings, backend.as_ref(), console, simple)?;
    Ok(())
}

fn cmd_pr(git: &Git, console: &mut Console) -> Result<()> {
    let settings = load_settings(&settings_path()?)?;
    let backend = backend_for(&settings)?;
    pr::run_pr(git, &settings, backend.as_ref(), console)
}

fn cmd_release(git: &Git, console: &mut Console) -> Result<()> {
    let path = settings_path()?;
    let mut settings = load_settings(&path)?;
    let backend = backend_for(&settings)?;
    release::run_release(git, &mut settings, &path, backend.as_ref(), console)
}

fn cmd_set_api_key(console: &mut Console) -> Result<()> {
    let path = settings_path()?;
    let mut settings = load_settings(&path)?;

    let providers = [ProviderId::OpenAi, ProviderId::Anthropic, ProviderId::Ollama];
    let labels: Vec<&str> = providers.iter().map(|p| p.label()).collect();
    let Some(index) = console.choose("Provider:", &labels)? else {
        return Ok(());
    };
    let provider = providers[index];

    let Some(key) = console.input(&format!("API key for {}:", provider.label()))? else {
        return Ok(());
    };
    settings.provider_mut(provider).api_key = Some(key);
    write_settings(&path, &settings)?;
    console.notify(&format!(
        "API key for {} stored in {}",
        provider.label(),
        path.display()
    ))?;
    Ok(())
}

fn cmd_settings() -> Result<()> {
    let path = settings_path()?;
    let settings = load_settings(&path)?;

    println!("settings file: {}", path.display());
    println!("provider: {}", settings.provider.label());
    for (name, provider) in [
        ("openai", &settings.openai),
        ("anthropic", &settings.anthropic),
        ("ollama", &settings.ollama),
    ] {
        let key = if provider.api_key.is_some() { "set" } else { "unset" };
        match &provider.base_url {
            Some(url) => println!("{name}: model={} api_key={key} base_url={url}", provider.model),
            None => println!("{name}: model={} api_key={key}", provider.model),
        }
    }
    println!("learning_mode: {}", settings.learning_mode);
    if let Some(template) = &settings.pr_template_path {
        println!("pr_template_path: {template}");
    }
    println!(
        "tokens: github={} gitlab={}",
        if settings.tokens.github.is_some() { "set" } else { "unset" },
        if settings.tokens.gitlab.is_some() { "set" } else { "unset" },
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commit_with_simple_flag() {
        let cli = Cli::parse_from(["scribe", "commit", "--simple"]);
        assert!(matches!(cli.command, Command::Commit { simple: true }));
    }

    #[test]
    fn parses_release() {
        let cli = Cli::parse_from(["scribe", "release"]);
        assert!(matches!(cli.command, Command::Release));
    }

    #[test]
    fn parses_set_api_key() {
        let cli = Cli::parse_from(["scribe", "set-api-key"]);
        assert!(matches!(cli.command, Command::SetApiKey));
    }
}
