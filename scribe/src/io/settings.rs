//! Persistent scribe settings stored as TOML under the user config directory.
//!
//! Settings are loaded fresh at the start of every generation-bearing task and
//! passed down as a snapshot value. They are never cached across invocations,
//! so edits made between commands always take effect.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Which generation backend family handles requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    #[default]
    OpenAi,
    Anthropic,
    Ollama,
}

impl ProviderId {
    pub fn label(self) -> &'static str {
        match self {
            Self::OpenAi => "OpenAI",
            Self::Anthropic => "Anthropic",
            Self::Ollama => "Ollama",
        }
    }
}

/// Per-provider connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProviderSettings {
    pub model: String,
    pub api_key: Option<String>,
    /// Override for self-hosted or proxied deployments.
    pub base_url: Option<String>,
}

/// Personal access tokens for hosted-repository release publication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HostTokens {
    pub github: Option<String>,
    pub gitlab: Option<String>,
}

/// Scribe settings (TOML). Missing fields default to sensible values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Active backend; selection is a runtime branch, not compile-time.
    pub provider: ProviderId,

    pub openai: ProviderSettings,
    pub anthropic: ProviderSettings,
    pub ollama: ProviderSettings,

    /// Inject the latest commit message as a style example into prompts.
    pub learning_mode: bool,

    /// Custom PR template path relative to the repository root.
    pub pr_template_path: Option<String>,

    pub tokens: HostTokens,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: ProviderId::default(),
            openai: ProviderSettings {
                model: "gpt-4o".to_string(),
                ..ProviderSettings::default()
            },
            anthropic: ProviderSettings {
                model: "claude-sonnet-4-5".to_string(),
                ..ProviderSettings::default()
            },
            ollama: ProviderSettings {
                model: "llama3.1".to_string(),
                ..ProviderSettings::default()
            },
            learning_mode: false,
            pr_template_path: None,
            tokens: HostTokens::default(),
        }
    }
}

impl Settings {
    /// Connection settings for the active provider.
    pub fn active(&self) -> &ProviderSettings {
        match self.provider {
            ProviderId::OpenAi => &self.openai,
            ProviderId::Anthropic => &self.anthropic,
            ProviderId::Ollama => &self.ollama,
        }
    }

    pub fn provider_mut(&mut self, provider: ProviderId) -> &mut ProviderSettings {
        match provider {
            ProviderId::OpenAi => &mut self.openai,
            ProviderId::Anthropic => &mut self.anthropic,
            ProviderId::Ollama => &mut self.ollama,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, provider) in [
            ("openai", &self.openai),
            ("anthropic", &self.anthropic),
            ("ollama", &self.ollama),
        ] {
            if provider.model.trim().is_empty() {
                return Err(anyhow!("{name}.model must not be empty"));
            }
        }
        Ok(())
    }
}

/// Resolve the settings file path.
///
/// `SCRIBE_CONFIG` overrides; otherwise `$HOME/.config/scribe/config.toml`.
pub fn settings_path() -> Result<PathBuf> {
    if let Some(path) = env::var_os("SCRIBE_CONFIG") {
        return Ok(PathBuf::from(path));
    }
    let home = env::var_os("HOME").ok_or_else(|| anyhow!("HOME is not set"))?;
    Ok(PathBuf::from(home).join(".config/scribe/config.toml"))
}

/// Load settings from a TOML file.
///
/// If the file is missing, returns `Settings::default()`.
pub fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        let settings = Settings::default();
        settings.validate()?;
        return Ok(settings);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let settings: Settings =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    settings.validate()?;
    Ok(settings)
}

/// Atomically write settings to disk (temp file + rename).
pub fn write_settings(path: &Path, settings: &Settings) -> Result<()> {
    settings.validate()?;
    let mut buf = String::from("# scribe settings. API keys and tokens are stored in plain text.\n");
    buf.push_str(&toml::to_string_pretty(settings).context("serialize settings toml")?);
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("settings path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp settings {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace settings {}", path.display()))?;
    Ok(())
}
