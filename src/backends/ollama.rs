//! Local Ollama backend.
//!
//! This is the backend behind the local execution boundary: tier-3
//! requests only ever reach it. Uses Ollama's native chat API
//! (`POST /api/chat`, non-streaming).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{http_client, BackendError, ChatMessage, ChatProvider};
use crate::config::BackendConfig;

/// Default Ollama endpoint.
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default local model.
pub const DEFAULT_OLLAMA_MODEL: &str = "mistral:latest";

/// Ollama chat request (native API format, not OpenAI-compatible).
#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f64,
}

/// Ollama chat response.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: String,
}

/// Chat provider for a local Ollama server.
pub struct OllamaProvider {
    id: String,
    base_url: String,
    model: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl OllamaProvider {
    /// Create a provider for `base_url` (e.g. `http://127.0.0.1:11434`).
    pub fn new(id: &str, base_url: &str, model: &str, timeout: Duration) -> Self {
        Self {
            id: id.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            timeout,
            client: http_client(timeout),
        }
    }

    /// Create from a `[backends.<id>]` entry.
    pub fn from_config(id: &str, config: &BackendConfig) -> Self {
        Self::new(
            id,
            &config.base_url,
            &config.model,
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ChatProvider for OllamaProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, BackendError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = OllamaChatRequest {
            model: &self.model,
            messages,
            stream: false,
            options: OllamaOptions { temperature: 0.7 },
        };

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::from_transport(&self.id, &e, self.timeout))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let detail = resp.text().await.unwrap_or_default();
            return Err(BackendError::unavailable(
                &self.id,
                format!("Ollama returned status {status}: {detail}"),
            ));
        }

        let chat_resp: OllamaChatResponse = resp
            .json()
            .await
            .map_err(|e| BackendError::from_transport(&self.id, &e, self.timeout))?;

        let content = chat_resp.message.content.trim().to_string();
        if content.is_empty() {
            return Err(BackendError::unavailable(&self.id, "Ollama returned empty response"));
        }
        Ok(content)
    }
}
