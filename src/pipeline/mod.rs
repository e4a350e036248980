//! Request orchestrator.
//!
//! One request runs these stages in order:
//!
//! ```text
//! tier → context lookup → task class → mode → routing plan
//!      → primary backend call → TT-01 (when the plan requires it)
//!      → blocked notice | reply + validation footer
//! ```
//!
//! The orchestrator holds no per-request state. It is shared behind an
//! `Arc` and receives every collaborator explicitly.
//!
//! In a conversation the recent turns are part of the prompt, so the
//! request tier is raised to the highest tier among them. A secret turn
//! keeps the conversation local for as long as it stays in the window.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::backends::{Backend, BackendError, BackendRegistry, ChatMessage, Role};
use crate::config::{Config, PipelineConfig};
use crate::context::{format_context_block, joined_text, ContextLookup, ContextSnippet};
use crate::governance::{
    classify_privacy_tier, classify_task, detect_mode, format_validation_message,
    matched_privacy_cues, route, Mode, OrganMap, PrivacyTier, RoutingPlan, TaskClass,
    ValidationResult, ValidationStatus, validate_response,
};
use crate::history::{ConversationStore, ConversationTurn};

/// Text returned in place of a reply that TT-01 blocked.
pub const BLOCKED_NOTICE: &str = "This response was blocked by TT-01 and withheld.";

/// Separator between a reply and its validation footer.
const FOOTER_SEPARATOR: &str = "\n\n---\n";

// ── Errors ───────────────────────────────────────────────────────

/// Failure of a request. Classification cannot fail, so the only error
/// is a failed backend call.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("execution failed on backend '{backend}'")]
    ExecutionFailed {
        backend: String,
        #[source]
        source: BackendError,
    },
}

// ── Results ──────────────────────────────────────────────────────

/// Classification and routing for a request, before any backend call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    /// Tier from the text (raised by any hint), before routing overrides.
    pub classified_tier: PrivacyTier,
    /// Privacy keywords found in the text.
    pub privacy_cues: Vec<&'static str>,
    pub task_class: TaskClass,
    pub mode: Mode,
    pub plan: RoutingPlan,
    pub primary_backend: String,
}

impl Classification {
    /// Tier in force after routing overrides.
    pub fn privacy_tier(&self) -> PrivacyTier {
        self.plan.effective_tier
    }
}

/// Outcome of a handled request.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResponse {
    /// Text for the caller: the governed reply or the blocked notice.
    pub final_text: String,
    pub primary_backend: String,
    /// Effective tier after routing overrides.
    pub privacy_tier: PrivacyTier,
    pub task_class: TaskClass,
    pub mode: Mode,
    /// `None` when the plan did not call for TT-01.
    pub validation_status: Option<ValidationStatus>,
    pub validation: Option<ValidationResult>,
    pub plan: RoutingPlan,
}

impl PipelineResponse {
    pub fn is_blocked(&self) -> bool {
        self.validation_status == Some(ValidationStatus::Blocked)
    }
}

// ── Orchestrator ─────────────────────────────────────────────────

pub struct Pipeline {
    backend: Arc<dyn Backend>,
    context: Option<Arc<dyn ContextLookup>>,
    history: Option<Arc<dyn ConversationStore>>,
    organs: OrganMap,
    settings: PipelineConfig,
}

impl Pipeline {
    pub fn new(backend: Arc<dyn Backend>, organs: OrganMap, settings: PipelineConfig) -> Self {
        Self {
            backend,
            context: None,
            history: None,
            organs,
            settings,
        }
    }

    /// Build over a [`BackendRegistry`] created from `config`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        config.validate()?;
        let registry = BackendRegistry::from_config(config)?;
        tracing::debug!(backends = ?registry.ids(), "Backend registry ready");
        Ok(Self::new(
            Arc::new(registry),
            config.organs.clone(),
            config.pipeline.clone(),
        ))
    }

    pub fn with_context(mut self, context: Arc<dyn ContextLookup>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_history(mut self, history: Arc<dyn ConversationStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn organs(&self) -> &OrganMap {
        &self.organs
    }

    /// Run every classification stage without calling a backend.
    ///
    /// `privacy_hint` can raise the tier, never lower it. `context` is
    /// retrieved material and only feeds the task classifier.
    pub fn classify(
        &self,
        raw_text: &str,
        privacy_hint: Option<PrivacyTier>,
        context: Option<&str>,
    ) -> Classification {
        let detected = classify_privacy_tier(raw_text);
        let classified_tier = privacy_hint.map_or(detected, |hint| detected.max(hint));
        let privacy_cues = matched_privacy_cues(raw_text);
        let task_class = classify_task(raw_text, context);
        let mode = detect_mode(raw_text);
        let plan = route(task_class, classified_tier);
        let primary_backend = plan.primary_backend(&self.organs).to_string();

        tracing::debug!(
            detected = %detected,
            tier = %plan.effective_tier,
            task_class = %task_class,
            mode = %mode,
            "Classified request"
        );

        Classification {
            classified_tier,
            privacy_cues,
            task_class,
            mode,
            plan,
            primary_backend,
        }
    }

    /// Handle a standalone request.
    pub async fn handle_request(
        &self,
        raw_text: &str,
        privacy_hint: Option<PrivacyTier>,
    ) -> Result<PipelineResponse, PipelineError> {
        self.run(None, raw_text, privacy_hint).await
    }

    /// Handle a request within a conversation: recent turns go into the
    /// prompt and raise its tier, and the exchange is recorded unless
    /// TT-01 blocked it.
    pub async fn handle_in_conversation(
        &self,
        conversation_id: &str,
        raw_text: &str,
        privacy_hint: Option<PrivacyTier>,
    ) -> Result<PipelineResponse, PipelineError> {
        self.run(Some(conversation_id), raw_text, privacy_hint).await
    }

    async fn run(
        &self,
        conversation_id: Option<&str>,
        raw_text: &str,
        privacy_hint: Option<PrivacyTier>,
    ) -> Result<PipelineResponse, PipelineError> {
        let snippets = self.lookup_context(raw_text).await;
        let context_text = joined_text(&snippets);

        let history = match conversation_id {
            Some(id) => self.recent_turns(id).await,
            None => Vec::new(),
        };
        let history_tier = history.iter().map(turn_tier).max();
        if history_tier > privacy_hint {
            tracing::debug!(history_tier = ?history_tier, "Conversation history raises the tier");
        }

        let Classification {
            task_class,
            mode,
            plan,
            primary_backend,
            ..
        } = self.classify(raw_text, privacy_hint.max(history_tier), context_text.as_deref());
        let tier = plan.effective_tier;

        if task_class.demands_truth_check() && !plan.requires_conscience_check() {
            tracing::info!(tier = %tier, task_class = %task_class, "TT-01 waived for local-only request");
        }

        tracing::info!(
            tier = %tier,
            task_class = %task_class,
            backend = %primary_backend,
            local = plan.is_local(),
            "Routing request"
        );

        let messages = self.build_messages(&history, raw_text, &snippets);

        let reply = self
            .call_backend(&primary_backend, &messages)
            .await
            .map_err(|source| {
                tracing::warn!(backend = %primary_backend, "Backend call failed: {source}");
                PipelineError::ExecutionFailed {
                    backend: primary_backend.clone(),
                    source,
                }
            })?;

        let validation = plan
            .requires_conscience_check()
            .then(|| validate_response(&reply, raw_text, context_text.as_deref()));
        let validation_status = validation.as_ref().map(|v| v.status);

        let final_text = match &validation {
            Some(result) if result.is_blocked() => {
                tracing::warn!(
                    backend = %primary_backend,
                    issues = result.issues.len(),
                    shortcuts = result.shortcuts_detected.len(),
                    "TT-01 blocked reply"
                );
                blocked_text(result)
            }
            Some(result) => with_footer(&reply, &format_validation_message(result)),
            None => reply.clone(),
        };

        if let Some(status) = validation_status {
            tracing::info!(backend = %primary_backend, status = %status, "TT-01 verdict");
        }

        let response = PipelineResponse {
            final_text,
            primary_backend,
            privacy_tier: tier,
            task_class,
            mode,
            validation_status,
            validation,
            plan,
        };

        if let Some(id) = conversation_id {
            if response.is_blocked() {
                tracing::debug!(conversation_id = id, "Blocked exchange not recorded");
            } else {
                self.record_exchange(id, raw_text, &reply, &response).await;
            }
        }

        Ok(response)
    }

    async fn call_backend(
        &self,
        backend_id: &str,
        messages: &[ChatMessage],
    ) -> Result<String, BackendError> {
        let limit = Duration::from_secs(self.settings.backend_timeout_secs);
        match tokio::time::timeout(limit, self.backend.respond(backend_id, messages)).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::timeout(backend_id, limit)),
        }
    }

    /// Context snippets for `query`. Failures yield no context.
    async fn lookup_context(&self, query: &str) -> Vec<ContextSnippet> {
        let Some(context) = &self.context else {
            return Vec::new();
        };
        match context
            .lookup(query, self.settings.context_max_results)
            .await
        {
            Ok(snippets) => {
                tracing::debug!(source = context.name(), hits = snippets.len(), "Context lookup");
                snippets
            }
            Err(e) => {
                tracing::warn!(source = context.name(), "Context lookup failed: {e:#}");
                Vec::new()
            }
        }
    }

    async fn recent_turns(&self, conversation_id: &str) -> Vec<ConversationTurn> {
        let Some(history) = &self.history else {
            return Vec::new();
        };
        match history
            .recent(conversation_id, self.settings.history_window)
            .await
        {
            Ok(turns) => turns,
            Err(e) => {
                tracing::warn!(conversation_id, "History read failed: {e:#}");
                Vec::new()
            }
        }
    }

    /// Store the exchange. The assistant turn keeps the raw reply; the
    /// TT-01 footer is for the caller only.
    async fn record_exchange(
        &self,
        conversation_id: &str,
        raw_text: &str,
        reply: &str,
        response: &PipelineResponse,
    ) {
        let Some(history) = &self.history else {
            return;
        };

        let user = ConversationTurn::new(Role::User, raw_text)
            .with_metadata("tier", response.privacy_tier.level());
        let mut assistant = ConversationTurn::new(Role::Assistant, reply)
            .with_metadata("backend", &response.primary_backend)
            .with_metadata("tier", response.privacy_tier.level())
            .with_metadata("task_class", response.task_class)
            .with_metadata("mode", response.mode);
        if let Some(status) = response.validation_status {
            assistant = assistant.with_metadata("validation", status);
        }

        for turn in [user, assistant] {
            if let Err(e) = history.append(conversation_id, turn).await {
                tracing::warn!(conversation_id, "History append failed: {e:#}");
                return;
            }
        }
    }

    /// System prompt, history, then the user message with its context
    /// block.
    fn build_messages(
        &self,
        history: &[ConversationTurn],
        raw_text: &str,
        snippets: &[ContextSnippet],
    ) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        if !self.settings.system_prompt.trim().is_empty() {
            messages.push(ChatMessage::system(self.settings.system_prompt.as_str()));
        }
        messages.extend(history.iter().map(ConversationTurn::to_message));

        let block = format_context_block(
            snippets,
            self.settings.context_max_results,
            self.settings.context_snippet_chars,
        );
        messages.push(ChatMessage::user(format!("{raw_text}{block}")));
        messages
    }
}

/// Tier a stored turn was handled at. Turns without a readable tier are
/// classified from their content.
fn turn_tier(turn: &ConversationTurn) -> PrivacyTier {
    let recorded = turn
        .metadata
        .get("tier")
        .and_then(|level| level.parse::<u8>().ok())
        .and_then(|level| PrivacyTier::try_from(level).ok());
    recorded.unwrap_or_else(|| classify_privacy_tier(&turn.content))
}

/// Replacement text for a blocked reply. Never contains the reply.
fn blocked_text(result: &ValidationResult) -> String {
    let detail = format_validation_message(result);
    if detail.is_empty() {
        BLOCKED_NOTICE.to_string()
    } else {
        format!("{BLOCKED_NOTICE}\n\n{detail}")
    }
}

fn with_footer(reply: &str, message: &str) -> String {
    if message.is_empty() {
        reply.to_string()
    } else {
        format!("{reply}{FOOTER_SEPARATOR}{message}")
    }
}

// ── Tests ────────────────────────────────────────────────────────
