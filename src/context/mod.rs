//! Knowledge lookup used to enrich requests.
//!
//! The pipeline asks a [`ContextLookup`] for snippets related to the user
//! message. Snippets feed the task classifier and are appended to the
//! prompt as a "Relevant context" block. Lookup failures never fail a
//! request; the pipeline continues with no context.

use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Characters kept from each stored paragraph when it is returned.
pub const MAX_SNIPPET_CHARS: usize = 500;

/// A labelled piece of retrieved knowledge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSnippet {
    /// Topic or source the snippet came from.
    pub label: String,
    pub snippet: String,
}

impl ContextSnippet {
    pub fn new(label: impl Into<String>, snippet: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            snippet: snippet.into(),
        }
    }
}

/// Source of context snippets for a query.
#[async_trait]
pub trait ContextLookup: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Return at most `limit` snippets relevant to `query`, best first.
    async fn lookup(&self, query: &str, limit: usize) -> anyhow::Result<Vec<ContextSnippet>>;
}

/// Join snippet text into one string for the task classifier.
pub fn joined_text(snippets: &[ContextSnippet]) -> Option<String> {
    if snippets.is_empty() {
        return None;
    }
    Some(
        snippets
            .iter()
            .map(|s| s.snippet.as_str())
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

/// Render the block appended to the user message.
///
/// Empty when there are no snippets. Otherwise:
///
/// ```text
///
///
/// Relevant context:
/// - [label]: first N chars...
/// ```
pub fn format_context_block(
    snippets: &[ContextSnippet],
    max_results: usize,
    snippet_chars: usize,
) -> String {
    if snippets.is_empty() || max_results == 0 {
        return String::new();
    }
    let mut block = String::from("\n\nRelevant context:\n");
    for s in snippets.iter().take(max_results) {
        block.push_str(&format!(
            "- [{}]: {}...\n",
            s.label,
            truncate_chars(&s.snippet, snippet_chars)
        ));
    }
    block
}

/// Prefix of `text` holding at most `max` characters.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// ── In-memory knowledge base ─────────────────────────────────────

/// Keyword search over labelled paragraphs held in memory.
///
/// Paragraphs are ranked by how many distinct query words (three letters
/// or more) they contain. Ties keep insertion order.
#[derive(Default)]
pub struct InMemoryKnowledge {
    paragraphs: RwLock<Vec<ContextSnippet>>,
}

impl InMemoryKnowledge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one paragraph under `label`. Blank text is ignored.
    pub fn insert(&self, label: &str, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.paragraphs.write().push(ContextSnippet::new(label, text));
    }

    /// Split `text` on blank lines and add each paragraph under `label`.
    pub fn insert_document(&self, label: &str, text: &str) -> usize {
        let mut added = 0;
        for paragraph in text.split("\n\n") {
            if !paragraph.trim().is_empty() {
                self.insert(label, paragraph);
                added += 1;
            }
        }
        added
    }

    /// Load every `.md` and `.txt` file in `dir`, labelled by file stem.
    pub fn load_dir(dir: &Path) -> anyhow::Result<Self> {
        let knowledge = Self::new();
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read knowledge directory {}", dir.display()))?;

        let mut paths: Vec<_> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("md") | Some("txt")
                )
            })
            .collect();
        paths.sort();

        for path in paths {
            let label = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("knowledge")
                .to_string();
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let added = knowledge.insert_document(&label, &text);
            tracing::debug!(file = %path.display(), paragraphs = added, "Loaded knowledge file");
        }
        Ok(knowledge)
    }

    pub fn len(&self) -> usize {
        self.paragraphs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.paragraphs.read().is_empty()
    }
}

fn query_words(query: &str) -> Vec<String> {
    let mut words: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 3)
        .map(str::to_lowercase)
        .collect();
    words.sort();
    words.dedup();
    words
}

#[async_trait]
impl ContextLookup for InMemoryKnowledge {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn lookup(&self, query: &str, limit: usize) -> anyhow::Result<Vec<ContextSnippet>> {
        let words = query_words(query);
        if words.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let paragraphs = self.paragraphs.read();
        let mut scored: Vec<(usize, usize)> = paragraphs
            .iter()
            .enumerate()
            .filter_map(|(idx, p)| {
                let lower = p.snippet.to_lowercase();
                let hits = words.iter().filter(|w| lower.contains(w.as_str())).count();
                (hits > 0).then_some((idx, hits))
            })
            .collect();
        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| b.1.cmp(&a.1));

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(idx, _)| {
                let p = &paragraphs[idx];
                ContextSnippet::new(
                    p.label.clone(),
                    truncate_chars(&p.snippet, MAX_SNIPPET_CHARS),
                )
            })
            .collect())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn knowledge() -> InMemoryKnowledge {
        let kb = InMemoryKnowledge::new();
        kb.insert("Valuation", "The exit valuation depends on the earnout schedule.");
        kb.insert("Governance", "TT-01 reviews every strategy reply before release.");
        kb.insert("Valuation", "Buyer diligence asks for the earnout valuation model.");
        kb
    }

    #[tokio::test]
    async fn lookup_ranks_by_word_hits() {
        let kb = knowledge();
        let hits = kb.lookup("buyer earnout valuation", 3).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].snippet.starts_with("Buyer diligence"));
        assert_eq!(hits[1].label, "Valuation");
    }

    #[tokio::test]
    async fn lookup_respects_limit_and_short_words() {
        let kb = knowledge();
        assert_eq!(kb.lookup("earnout", 1).await.unwrap().len(), 1);
        assert!(kb.lookup("to a of", 3).await.unwrap().is_empty());
        assert!(kb.lookup("quantum", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn long_paragraphs_are_truncated() {
        let kb = InMemoryKnowledge::new();
        kb.insert("Notes", &format!("roadmap {}", "x".repeat(2000)));
        let hits = kb.lookup("roadmap", 1).await.unwrap();
        assert_eq!(hits[0].snippet.chars().count(), MAX_SNIPPET_CHARS);
    }

    #[test]
    fn context_block_layout() {
        let snippets = vec![
            ContextSnippet::new("Valuation", "a".repeat(300)),
            ContextSnippet::new("Governance", "TT-01 reviews replies."),
            ContextSnippet::new("Patents", "filing"),
            ContextSnippet::new("Extra", "dropped"),
        ];
        let block = format_context_block(&snippets, 3, 200);
        assert!(block.starts_with("\n\nRelevant context:\n- [Valuation]: "));
        assert!(block.contains(&format!("- [Valuation]: {}...\n", "a".repeat(200))));
        assert!(block.contains("- [Governance]: TT-01 reviews replies....\n"));
        assert!(!block.contains("Extra"));
        assert!(format_context_block(&[], 3, 200).is_empty());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }

    #[test]
    fn joined_text_for_classifier() {
        assert_eq!(joined_text(&[]), None);
        let joined = joined_text(&[
            ContextSnippet::new("a", "one"),
            ContextSnippet::new("b", "two"),
        ]);
        assert_eq!(joined.as_deref(), Some("one\ntwo"));
    }

    #[test]
    fn load_dir_reads_markdown_and_text() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("patents.md"), "Provisional filing.\n\nPrior art search.").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "Roadmap review.").unwrap();
        std::fs::write(tmp.path().join("ignored.json"), "{}").unwrap();

        let kb = InMemoryKnowledge::load_dir(tmp.path()).unwrap();
        assert_eq!(kb.len(), 3);
    }

    #[test]
    fn load_dir_missing_is_an_error() {
        let tmp = TempDir::new().unwrap();
        assert!(InMemoryKnowledge::load_dir(&tmp.path().join("absent")).is_err());
    }
}
