//! Configuration for Haku.
//!
//! Loaded from TOML. Every section has defaults, so a missing file or a
//! partial file is valid:
//!
//! ```toml
//! [organs]
//! senses = "gemini"
//! brain = "gpt"
//! conscience = "claude"
//! hands = "grok"
//! local = "ollama"
//!
//! [pipeline]
//! history_window = 10
//! backend_timeout_secs = 120
//!
//! [backends.ollama]
//! kind = "ollama"
//! base_url = "http://127.0.0.1:11434"
//! model = "mistral:latest"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::backends::ollama::{DEFAULT_OLLAMA_MODEL, DEFAULT_OLLAMA_URL};
use crate::governance::{Organ, OrganMap};

/// Default system prompt placed at the top of every conversation.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are Haku, an AI orchestration assistant with access to Heritage knowledge.";

/// Default completion budget for cloud backends.
pub const DEFAULT_MAX_TOKENS: u32 = 4000;

const DEFAULT_TIMEOUT_SECS: u64 = 120;

// ── Top-level config ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Organ → backend binding.
    pub organs: OrganMap,
    /// Orchestrator settings.
    pub pipeline: PipelineConfig,
    /// Backend definitions keyed by identifier.
    pub backends: BTreeMap<String, BackendConfig>,
}

impl Default for Config {
    fn default() -> Self {
        let mut backends = BTreeMap::new();
        backends.insert(
            "gemini".into(),
            BackendConfig::openai_compat(
                "https://generativelanguage.googleapis.com/v1beta/openai",
                "gemini-2.0-flash",
                Some("GOOGLE_API_KEY"),
            ),
        );
        backends.insert(
            "gpt".into(),
            BackendConfig::openai_compat("https://api.openai.com/v1", "gpt-4o", Some("OPENAI_API_KEY")),
        );
        backends.insert(
            "claude".into(),
            BackendConfig::openai_compat(
                "https://api.anthropic.com/v1",
                "claude-sonnet-4-20250514",
                Some("ANTHROPIC_API_KEY"),
            ),
        );
        backends.insert(
            "grok".into(),
            BackendConfig::openai_compat("https://api.x.ai/v1", "grok-3", Some("XAI_API_KEY")),
        );
        backends.insert("ollama".into(), BackendConfig::default());

        Self {
            organs: OrganMap::default(),
            pipeline: PipelineConfig::default(),
            backends,
        }
    }
}

impl Config {
    /// Default config location (`~/.config/haku/config.toml` on Linux).
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "haku")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from `path`, or from [`Config::default_path`] when `None`.
    ///
    /// A file that does not exist yields the defaults. The result is
    /// validated before it is returned.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::default_path(),
        };

        let config = match path {
            Some(ref p) if p.exists() => {
                let raw = std::fs::read_to_string(p)
                    .with_context(|| format!("Failed to read config file {}", p.display()))?;
                let config = Self::from_toml(&raw)
                    .with_context(|| format!("Invalid config file {}", p.display()))?;
                tracing::debug!(path = %p.display(), "Loaded config");
                config
            }
            _ => {
                tracing::debug!("No config file found, using defaults");
                Self::default()
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Parse TOML text. Missing sections and fields take defaults.
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        toml::from_str(raw).context("Failed to parse config TOML")
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Write to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(path, self.to_toml()?)
            .with_context(|| format!("Failed to write config file {}", path.display()))
    }

    /// Check cross-section consistency.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.organs.validate()?;

        for organ in Organ::ALL {
            let backend = self.organs.backend_for(*organ);
            if !self.backends.contains_key(backend) {
                anyhow::bail!("organs.{organ} names backend '{backend}', which is not defined under [backends]");
            }
        }
        if !self.backends.contains_key(&self.organs.local) {
            anyhow::bail!(
                "organs.local names backend '{}', which is not defined under [backends]",
                self.organs.local
            );
        }

        if self.pipeline.backend_timeout_secs == 0 {
            anyhow::bail!("pipeline.backend_timeout_secs must be greater than 0");
        }
        for (id, backend) in &self.backends {
            if backend.timeout_secs == 0 {
                anyhow::bail!("backends.{id}.timeout_secs must be greater than 0");
            }
        }
        Ok(())
    }
}

/// Expand `~` in a user-supplied path.
pub fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

// ── Pipeline ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// System prompt sent first on every call.
    pub system_prompt: String,
    /// Prior conversation messages included in the prompt.
    pub history_window: usize,
    /// Upper bound on one backend call, in seconds.
    pub backend_timeout_secs: u64,
    /// Context snippets appended to the user message.
    pub context_max_results: usize,
    /// Characters kept from each context snippet.
    pub context_snippet_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            history_window: 10,
            backend_timeout_secs: DEFAULT_TIMEOUT_SECS,
            context_max_results: 3,
            context_snippet_chars: 200,
        }
    }
}

// ── Backends ─────────────────────────────────────────────────────

/// Wire protocol of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Ollama native chat API.
    Ollama,
    /// OpenAI-compatible `/chat/completions`.
    OpenaiCompat,
}

/// One `[backends.<id>]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    pub timeout_secs: u64,
    pub max_tokens: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Ollama,
            base_url: DEFAULT_OLLAMA_URL.into(),
            model: DEFAULT_OLLAMA_MODEL.into(),
            api_key_env: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl BackendConfig {
    pub fn openai_compat(base_url: &str, model: &str, api_key_env: Option<&str>) -> Self {
        Self {
            kind: BackendKind::OpenaiCompat,
            base_url: base_url.into(),
            model: model.into(),
            api_key_env: api_key_env.map(String::from),
            ..Self::default()
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
