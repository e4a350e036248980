//! Language-model backends.
//!
//! The pipeline sees one capability, [`Backend::respond`], addressed by
//! backend identifier. [`BackendRegistry`] implements it over concrete
//! [`ChatProvider`]s built from configuration:
//!
//! - `ollama`: local Ollama server, native `/api/chat`
//! - `openai_compat`: any OpenAI-compatible `/chat/completions` endpoint
//!
//! Retries and fallbacks are not done here; a failed call surfaces as a
//! [`BackendError`] and the caller decides what to do.

pub mod ollama;
pub mod openai_compat;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{BackendConfig, BackendKind, Config};

pub use ollama::OllamaProvider;
pub use openai_compat::OpenAiCompatProvider;

// ── Messages ─────────────────────────────────────────────────────

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One entry of the ordered message list sent to a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

// ── Errors ───────────────────────────────────────────────────────

/// Failure of a backend call.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The backend could not produce a reply: not configured, unreachable,
    /// rejected the request, or returned something unusable.
    #[error("backend '{backend}' unavailable: {reason}")]
    Unavailable { backend: String, reason: String },

    /// The backend did not answer in time.
    #[error("backend '{backend}' timed out after {secs}s")]
    Timeout { backend: String, secs: u64 },
}

impl BackendError {
    pub fn unavailable(backend: &str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            backend: backend.to_string(),
            reason: reason.into(),
        }
    }

    pub fn timeout(backend: &str, after: Duration) -> Self {
        Self::Timeout {
            backend: backend.to_string(),
            secs: after.as_secs(),
        }
    }

    /// Map a transport-level reqwest failure.
    pub(crate) fn from_transport(backend: &str, err: &reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::timeout(backend, timeout)
        } else {
            Self::unavailable(backend, err.to_string())
        }
    }
}

// ── Traits ───────────────────────────────────────────────────────

/// The single capability the pipeline consumes.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Send an ordered message list to the backend named `backend_id`
    /// and return its reply text.
    async fn respond(&self, backend_id: &str, messages: &[ChatMessage])
        -> Result<String, BackendError>;
}

/// One concrete model endpoint.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Backend identifier this provider is registered under.
    fn id(&self) -> &str;

    /// Model name sent to the endpoint.
    fn model(&self) -> &str;

    /// Run one non-streaming chat completion.
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, BackendError>;
}

// ── Registry ─────────────────────────────────────────────────────

/// Backend identifiers mapped to their providers.
#[derive(Default, Clone)]
pub struct BackendRegistry {
    providers: HashMap<String, Arc<dyn ChatProvider>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every backend declared in the configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let mut registry = Self::new();
        for (id, backend) in &config.backends {
            registry.register(create_provider(id, backend)?);
        }
        Ok(registry)
    }

    /// Register a provider under its own identifier, replacing any
    /// provider already registered there.
    pub fn register(&mut self, provider: Arc<dyn ChatProvider>) {
        self.providers.insert(provider.id().to_string(), provider);
    }

    pub fn get(&self, backend_id: &str) -> Option<&Arc<dyn ChatProvider>> {
        self.providers.get(backend_id)
    }

    /// Registered identifiers, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

#[async_trait]
impl Backend for BackendRegistry {
    async fn respond(
        &self,
        backend_id: &str,
        messages: &[ChatMessage],
    ) -> Result<String, BackendError> {
        let provider = self
            .get(backend_id)
            .ok_or_else(|| BackendError::unavailable(backend_id, "no provider configured"))?;
        tracing::debug!(
            backend = backend_id,
            model = provider.model(),
            messages = messages.len(),
            "Dispatching to backend"
        );
        provider.chat(messages).await
    }
}

/// Factory: create the right provider for a backend entry.
pub fn create_provider(id: &str, config: &BackendConfig) -> anyhow::Result<Arc<dyn ChatProvider>> {
    if config.base_url.trim().is_empty() {
        anyhow::bail!("backends.{id}.base_url cannot be empty");
    }
    if config.model.trim().is_empty() {
        anyhow::bail!("backends.{id}.model cannot be empty");
    }
    match config.kind {
        BackendKind::Ollama => Ok(Arc::new(OllamaProvider::from_config(id, config))),
        BackendKind::OpenaiCompat => Ok(Arc::new(OpenAiCompatProvider::from_config(id, config))),
    }
}

/// Shared HTTP client with the configured request timeout.
pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(5))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoProvider {
        id: String,
    }

    #[async_trait]
    impl ChatProvider for EchoProvider {
        fn id(&self) -> &str {
            &self.id
        }

        fn model(&self) -> &str {
            "echo-1"
        }

        async fn chat(&self, messages: &[ChatMessage]) -> Result<String, BackendError> {
            Ok(format!(
                "{}:{}",
                self.id,
                messages.last().map(|m| m.content.as_str()).unwrap_or_default()
            ))
        }
    }

    fn echo(id: &str) -> Arc<dyn ChatProvider> {
        Arc::new(EchoProvider { id: id.into() })
    }

    #[tokio::test]
    async fn registry_dispatches_by_identifier() {
        let mut registry = BackendRegistry::new();
        registry.register(echo("gpt"));
        registry.register(echo("ollama"));

        let reply = registry
            .respond("ollama", &[ChatMessage::user("hi")])
            .await
            .unwrap();
        assert_eq!(reply, "ollama:hi");
        assert_eq!(registry.ids(), vec!["gpt", "ollama"]);
    }

    #[tokio::test]
    async fn unknown_backend_is_unavailable() {
        let registry = BackendRegistry::new();
        let err = registry
            .respond("claude", &[ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Unavailable { ref backend, .. } if backend == "claude"));
    }

    #[test]
    fn registry_from_default_config_covers_all_organs() {
        let config = Config::default();
        let registry = BackendRegistry::from_config(&config).unwrap();
        for id in ["gemini", "gpt", "claude", "grok", "ollama"] {
            assert!(registry.get(id).is_some(), "missing backend {id}");
        }
    }

    #[test]
    fn factory_rejects_blank_model() {
        let config = BackendConfig {
            model: " ".into(),
            ..BackendConfig::default()
        };
        let err = create_provider("broken", &config).err().unwrap().to_string();
        assert!(err.contains("backends.broken.model"));
    }

    #[test]
    fn error_messages_name_the_backend() {
        let err = BackendError::timeout("gpt", Duration::from_secs(30));
        assert_eq!(err.to_string(), "backend 'gpt' timed out after 30s");
        let err = BackendError::unavailable("grok", "connection refused");
        assert_eq!(err.to_string(), "backend 'grok' unavailable: connection refused");
    }

    #[test]
    fn chat_message_serializes_lowercase_role() {
        let json = serde_json::to_value(ChatMessage::system("be brief")).unwrap();
        assert_eq!(json["role"], "system");
        assert_eq!(json["content"], "be brief");
    }
}
