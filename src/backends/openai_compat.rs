//! OpenAI-compatible chat completion backend.
//!
//! Covers every cloud organ in the default configuration: OpenAI, xAI,
//! and the OpenAI-compatible surfaces of Gemini and Anthropic all accept
//! `POST {base_url}/chat/completions` with a bearer key.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{http_client, BackendError, ChatMessage, ChatProvider};
use crate::config::BackendConfig;

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat provider for an OpenAI-compatible endpoint.
pub struct OpenAiCompatProvider {
    id: String,
    base_url: String,
    model: String,
    api_key: Option<String>,
    /// Environment variable the key was read from, for error messages.
    api_key_env: Option<String>,
    max_tokens: u32,
    timeout: Duration,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a provider with an explicit key.
    pub fn with_api_key(
        id: &str,
        base_url: &str,
        model: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            id: id.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            api_key_env: None,
            max_tokens: crate::config::DEFAULT_MAX_TOKENS,
            timeout,
            client: http_client(timeout),
        }
    }

    /// Create from a `[backends.<id>]` entry, reading the key from
    /// `api_key_env`. A missing key is reported when the backend is
    /// called, so unused backends need no credentials.
    pub fn from_config(id: &str, config: &BackendConfig) -> Self {
        let api_key = config
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.trim().is_empty());
        Self {
            api_key_env: config.api_key_env.clone(),
            max_tokens: config.max_tokens,
            ..Self::with_api_key(
                id,
                &config.base_url,
                &config.model,
                api_key,
                Duration::from_secs(config.timeout_secs),
            )
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl ChatProvider for OpenAiCompatProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, BackendError> {
        let Some(api_key) = self.api_key.as_deref() else {
            let hint = self
                .api_key_env
                .as_deref()
                .map(|var| format!("set {var}"))
                .unwrap_or_else(|| "configure api_key_env".into());
            return Err(BackendError::unavailable(
                &self.id,
                format!("no API key ({hint})"),
            ));
        };

        let url = format!("{}/chat/completions", self.base_url);
        let body = CompletionRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
        };

        let resp = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::from_transport(&self.id, &e, self.timeout))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let detail = resp.text().await.unwrap_or_default();
            return Err(BackendError::unavailable(
                &self.id,
                format!("API error {status}: {detail}"),
            ));
        }

        let completion: CompletionResponse = resp
            .json()
            .await
            .map_err(|e| BackendError::from_transport(&self.id, &e, self.timeout))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| BackendError::unavailable(&self.id, "response contained no content"))
    }
}
