//! Conversation history and topic tagging.
//!
//! History is append-only and keyed by conversation id. The pipeline
//! reads recent turns to build the prompt and appends the user turn plus
//! the governed reply afterwards. History never influences routing.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::backends::{ChatMessage, Role};

/// Topic assigned when nothing else matches.
pub const GENERAL_TOPIC: &str = "General";

// ── Turns ────────────────────────────────────────────────────────

/// One stored message of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Topics detected in `content`.
    pub topics: Vec<String>,
    /// Routing metadata (backend, tier, task class, ...).
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ConversationTurn {
    /// Build a turn stamped now, with topics detected from the content.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            topics: detect_topics(&content),
            role,
            content,
            timestamp: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl ToString) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    /// The turn as a prompt message.
    pub fn to_message(&self) -> ChatMessage {
        ChatMessage {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

// ── Store ────────────────────────────────────────────────────────

/// Append-only conversation persistence.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Append a turn to `conversation_id`, creating it if needed.
    async fn append(&self, conversation_id: &str, turn: ConversationTurn) -> anyhow::Result<()>;

    /// The last `limit` turns of `conversation_id`, oldest first.
    async fn recent(&self, conversation_id: &str, limit: usize)
        -> anyhow::Result<Vec<ConversationTurn>>;
}

/// Conversations held in process memory.
#[derive(Default)]
pub struct InMemoryConversationStore {
    conversations: Mutex<HashMap<String, Vec<ConversationTurn>>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of turns stored for `conversation_id`.
    pub fn len(&self, conversation_id: &str) -> usize {
        self.conversations
            .lock()
            .get(conversation_id)
            .map_or(0, Vec::len)
    }

    /// Union of topics across a conversation, in first-seen order.
    pub fn topics(&self, conversation_id: &str) -> Vec<String> {
        let conversations = self.conversations.lock();
        let mut topics: Vec<String> = Vec::new();
        for turn in conversations.get(conversation_id).into_iter().flatten() {
            for topic in &turn.topics {
                if !topics.contains(topic) {
                    topics.push(topic.clone());
                }
            }
        }
        topics
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn append(&self, conversation_id: &str, turn: ConversationTurn) -> anyhow::Result<()> {
        if conversation_id.trim().is_empty() {
            anyhow::bail!("conversation id cannot be empty");
        }
        self.conversations
            .lock()
            .entry(conversation_id.to_string())
            .or_default()
            .push(turn);
        tracing::trace!(conversation_id, "Appended conversation turn");
        Ok(())
    }

    async fn recent(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<ConversationTurn>> {
        let conversations = self.conversations.lock();
        let Some(turns) = conversations.get(conversation_id) else {
            return Ok(Vec::new());
        };
        let start = turns.len().saturating_sub(limit);
        Ok(turns[start..].to_vec())
    }
}

// ── Topic detection ──────────────────────────────────────────────

static TOPIC_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("Patents", r"\b(?:patent|provisional|uspto|ip strategy|prior art|claims|filing)\b"),
        ("ForgedOS", r"\b(?:forgedos|platform|exit|valuation|buyer|earnout)\b"),
        ("Haku", r"\b(?:haku|orchestration|multi-ai|routing)\b"),
        ("MOA", r"\b(?:moa|model.organism|organ|senses|brain|conscience|hands)\b"),
        ("Governance", r"\b(?:tt-?01|hgc-?01|rao|etg|cbg|governance|compliance)\b"),
        ("TT-01", r"\b(?:tt-?01|truth team|validation|shortcut)\b"),
        ("HGC-01", r"\b(?:hgc-?01|heritage governance|mission)\b"),
        ("Valuation", r"(?:\bvaluation\b|\$\d+m\b|\bexit\b)"),
        ("Heritage", r"\b(?:heritage llm|encrypted|knowledge base|librarian)\b"),
        ("Mobile", r"\b(?:mobile|phone|responsive|ui)\b"),
        ("API", r"\b(?:api|anthropic|openai|google|grok|cost|tokens)\b"),
    ]
    .into_iter()
    .map(|(topic, pattern)| (topic, Regex::new(&format!("(?i){pattern}")).unwrap()))
    .collect()
});

/// Topics mentioned in `text`, in table order. Never empty: unmatched
/// text is tagged [`GENERAL_TOPIC`].
pub fn detect_topics(text: &str) -> Vec<String> {
    let topics: Vec<String> = TOPIC_PATTERNS
        .iter()
        .filter(|(_, re)| re.is_match(text))
        .map(|(topic, _)| (*topic).to_string())
        .collect();
    if topics.is_empty() {
        vec![GENERAL_TOPIC.to_string()]
    } else {
        topics
    }
}

// ── Tests ────────────────────────────────────────────────────────
