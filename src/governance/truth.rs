//! TT-01 truth validation.
//!
//! Inspects a backend reply against the query that produced it and
//! returns a governance verdict. Checks, in order:
//!
//! 1. **Shortcuts**: hedging language ("probably", "seems like", ...).
//! 2. **Unsupported certainty**: absolute claims with no evidence cue
//!    in the supplied context.
//! 3. **Contradictions**: a "but"/"however" sentence whose negation
//!    polarity flips in the sentence that follows.
//! 4. **Relevance**: share of the query's content words that the reply
//!    mentions.
//! 5. **Assumptions**: explicitly stated premises, quoted verbatim.
//!
//! The contradiction heuristic and the 0.30 relevance threshold are
//! policy placeholders; they are reproducible, not proven.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;

/// Minimum share of query content words the reply must mention.
pub const RELEVANCE_THRESHOLD: f64 = 0.30;

/// Issue count above which a reply is blocked outright.
const MAX_ISSUES_BEFORE_BLOCK: usize = 3;

/// Shortcut count above which a reply needs revision.
const MAX_SHORTCUTS_BEFORE_REVISION: usize = 2;

/// Length of a captured assumption, in characters.
const ASSUMPTION_CAPTURE_CHARS: usize = 100;

const CONTRADICTION_ISSUE: &str = "Response contains internal contradictions";
const OFF_TOPIC_ISSUE: &str = "Response doesn't directly address the query";
const OFF_TOPIC_CORRECTION: &str = "Refocus response on the specific question asked";

// ── Verdict types ────────────────────────────────────────────────

/// Governance disposition of a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Approved,
    RequiresRevision,
    Blocked,
    /// Reserved for future policy. No current rule produces it, but
    /// callers must handle it.
    Escalate,
}

impl ValidationStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::RequiresRevision => "requires_revision",
            Self::Blocked => "blocked",
            Self::Escalate => "escalate",
        }
    }
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Confidence attached to a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn label(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Verdict of one validation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub status: ValidationStatus,
    pub confidence: Confidence,
    pub issues: Vec<String>,
    pub corrections: Vec<String>,
    pub assumptions_identified: Vec<String>,
    pub shortcuts_detected: Vec<String>,
}

impl ValidationResult {
    /// Approved with high confidence: nothing worth telling the user.
    pub fn is_clean(&self) -> bool {
        self.status == ValidationStatus::Approved && self.confidence == Confidence::High
    }

    pub fn is_blocked(&self) -> bool {
        self.status == ValidationStatus::Blocked
    }
}

// ── Phrase tables ────────────────────────────────────────────────

/// A phrase and its case-insensitive substring pattern.
struct Phrase {
    text: &'static str,
    pattern: Regex,
}

/// Phrases match anywhere, so "unlikely" carries "likely".
fn compile(phrases: &[&'static str]) -> Vec<Phrase> {
    phrases
        .iter()
        .map(|&text| Phrase {
            text,
            pattern: Regex::new(&format!("(?i){}", regex::escape(text))).unwrap(),
        })
        .collect()
}

/// Hedging language: the model is guessing instead of knowing.
static SHORTCUT_PHRASES: LazyLock<Vec<Phrase>> = LazyLock::new(|| {
    compile(&[
        "probably",
        "likely",
        "seems like",
        "appears to",
        "I assume",
        "presumably",
        "I think",
        "maybe",
        "could be",
        "might be",
    ])
});

/// Absolute certainty that needs backing evidence.
static CERTAINTY_PHRASES: LazyLock<Vec<Phrase>> = LazyLock::new(|| {
    compile(&[
        "definitely",
        "certainly",
        "obviously",
        "clearly",
        "without a doubt",
    ])
});

/// Markers that introduce a stated premise.
static ASSUMPTION_MARKERS: LazyLock<Vec<Phrase>> =
    LazyLock::new(|| compile(&["assuming", "if we assume", "given that"]));

const CONTRAST_CUES: &[&str] = &["but", "however"];

const NEGATION_CUES: &[&str] = &["not", "no", "never", "cannot", "won't", "don't"];

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "what", "how", "when", "where", "why",
];

// ── Validation ───────────────────────────────────────────────────

/// Validate a backend reply against the query that produced it.
///
/// `context` is whatever material backed the reply. The word "evidence"
/// anywhere in it exempts certainty phrases from being flagged; callers
/// with richer provenance must embed that cue.
pub fn validate_response(
    response: &str,
    original_query: &str,
    context: Option<&str>,
) -> ValidationResult {
    let mut issues = Vec::new();
    let mut corrections = Vec::new();

    let shortcuts = detect_shortcuts(response);

    let has_evidence = context.is_some_and(|c| c.to_lowercase().contains("evidence"));
    if !has_evidence {
        issues.extend(
            unsupported_certainty(response)
                .map(|phrase| format!("Claims certainty without evidence: '{phrase}'")),
        );
    }

    let contradiction = has_contradiction(response);
    if contradiction {
        issues.push(CONTRADICTION_ISSUE.to_string());
    }

    if relevance_ratio(response, original_query).is_some_and(|r| r < RELEVANCE_THRESHOLD) {
        issues.push(OFF_TOPIC_ISSUE.to_string());
        corrections.push(OFF_TOPIC_CORRECTION.to_string());
    }

    let assumptions = extract_assumptions(response);

    let (status, confidence) = if contradiction || issues.len() > MAX_ISSUES_BEFORE_BLOCK {
        (ValidationStatus::Blocked, Confidence::Low)
    } else if !issues.is_empty() || shortcuts.len() > MAX_SHORTCUTS_BEFORE_REVISION {
        (ValidationStatus::RequiresRevision, Confidence::Medium)
    } else if !shortcuts.is_empty() {
        (ValidationStatus::Approved, Confidence::Medium)
    } else {
        (ValidationStatus::Approved, Confidence::High)
    };

    tracing::debug!(
        status = status.label(),
        confidence = confidence.label(),
        issues = issues.len(),
        shortcuts = shortcuts.len(),
        assumptions = assumptions.len(),
        "TT-01 validation complete"
    );

    ValidationResult {
        status,
        confidence,
        issues,
        corrections,
        assumptions_identified: assumptions,
        shortcuts_detected: shortcuts,
    }
}

/// One finding per distinct hedging phrase, quoting its first match.
fn detect_shortcuts(response: &str) -> Vec<String> {
    SHORTCUT_PHRASES
        .iter()
        .filter_map(|phrase| phrase.pattern.find(response))
        .map(|m| format!("Found assumption language: '{}'", m.as_str()))
        .collect()
}

/// Certainty phrases present in the reply, each reported once.
fn unsupported_certainty(response: &str) -> impl Iterator<Item = &'static str> + '_ {
    CERTAINTY_PHRASES
        .iter()
        .filter(move |phrase| phrase.pattern.is_match(response))
        .map(|phrase| phrase.text)
}

/// Up to 100 characters from the first occurrence of each marker.
fn extract_assumptions(response: &str) -> Vec<String> {
    ASSUMPTION_MARKERS
        .iter()
        .filter_map(|marker| marker.pattern.find(response))
        .map(|m| {
            response[m.start()..]
                .chars()
                .take(ASSUMPTION_CAPTURE_CHARS)
                .collect()
        })
        .collect()
}

/// Whether a contrast sentence flips negation in the sentence after it.
///
/// Sentences are the raw pieces between periods, so a reply ending in
/// "." has an empty last sentence. Cues match as substrings: "button"
/// carries "but" and "know" carries "no".
fn has_contradiction(response: &str) -> bool {
    let sentences: Vec<String> = response.split('.').map(str::to_lowercase).collect();

    sentences.windows(2).any(|pair| {
        let (current, next) = (&pair[0], &pair[1]);
        CONTRAST_CUES.iter().any(|cue| current.contains(cue))
            && is_negated(current) != is_negated(next)
    })
}

fn is_negated(sentence: &str) -> bool {
    NEGATION_CUES.iter().any(|cue| sentence.contains(cue))
}

/// Share of the query's content words that also appear in the reply.
///
/// `None` when the query has no content words; such a query cannot be
/// missed.
pub fn relevance_ratio(response: &str, query: &str) -> Option<f64> {
    let query_words = content_words(query);
    if query_words.is_empty() {
        return None;
    }
    let response_words = content_words(response);
    let overlap = query_words.intersection(&response_words).count();
    Some(overlap as f64 / query_words.len() as f64)
}

fn content_words(text: &str) -> HashSet<String> {
    words(text)
        .filter(|w| !STOP_WORDS.contains(&w.as_str()))
        .collect()
}

/// Lowercase words; apostrophes stay inside words so "don't" survives.
fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '\u{2019}'))
        .map(|w| w.trim_matches(|c: char| c == '\'' || c == '\u{2019}'))
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase().replace('\u{2019}', "'"))
}

// ── User-facing summary ──────────────────────────────────────────

/// Render a verdict for the user.
///
/// Empty for a clean (approved, high-confidence) verdict, which callers
/// treat as "no footer".
pub fn format_validation_message(result: &ValidationResult) -> String {
    if result.is_clean() {
        return String::new();
    }

    let mut lines: Vec<String> = Vec::new();

    if !result.shortcuts_detected.is_empty() {
        lines.push("TT-01 detected assumption language:".into());
        lines.extend(result.shortcuts_detected.iter().take(3).map(|s| format!("  • {s}")));
    }

    if !result.issues.is_empty() {
        push_section(&mut lines, "TT-01 issues:");
        lines.extend(result.issues.iter().take(3).map(|i| format!("  • {i}")));
    }

    if !result.assumptions_identified.is_empty() {
        push_section(&mut lines, "Stated assumptions:");
        lines.extend(
            result
                .assumptions_identified
                .iter()
                .take(2)
                .map(|a| format!("  • {a}")),
        );
    }

    match result.status {
        ValidationStatus::Blocked => {
            push_section(&mut lines, "Response blocked by TT-01 - requires correction")
        }
        ValidationStatus::RequiresRevision => {
            push_section(&mut lines, "TT-01 recommends revision before use")
        }
        ValidationStatus::Escalate => {
            push_section(&mut lines, "TT-01 escalated this response for human review")
        }
        ValidationStatus::Approved => {}
    }

    lines.join("\n")
}

/// Start a new section, separated from any previous one by a blank line.
fn push_section(lines: &mut Vec<String>, heading: &str) {
    if !lines.is_empty() {
        lines.push(String::new());
    }
    lines.push(heading.to_string());
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn result_with(status: ValidationStatus, confidence: Confidence) -> ValidationResult {
        ValidationResult {
            status,
            confidence,
            issues: vec![],
            corrections: vec![],
            assumptions_identified: vec![],
            shortcuts_detected: vec![],
        }
    }

    #[test]
    fn hedged_reply_needs_revision() {
        let result = validate_response(
            "I think the API probably works fine. It seems like the issue might be with your configuration.",
            "Why is the API failing?",
            None,
        );
        // "I think", "probably", "seems like", "might be"
        assert_eq!(result.shortcuts_detected.len(), 4);
        assert!(result.issues.is_empty(), "{:?}", result.issues);
        assert_eq!(result.status, ValidationStatus::RequiresRevision);
        assert_eq!(result.confidence, Confidence::Medium);
        assert!(!result.is_clean());
    }

    #[test]
    fn two_shortcuts_are_approved_with_medium_confidence() {
        let result = validate_response(
            "The API is probably rate limited. Maybe retry the API call later.",
            "Why is the API failing?",
            None,
        );
        assert_eq!(result.shortcuts_detected.len(), 2);
        assert_eq!(result.status, ValidationStatus::Approved);
        assert_eq!(result.confidence, Confidence::Medium);
    }

    #[test]
    fn three_shortcuts_require_revision() {
        let result = validate_response(
            "The API is probably rate limited. Maybe it could be the proxy.",
            "Why is the API failing?",
            None,
        );
        assert_eq!(result.shortcuts_detected.len(), 3);
        assert_eq!(result.status, ValidationStatus::RequiresRevision);
    }

    #[test]
    fn shortcut_findings_quote_matched_text() {
        let result = validate_response("PROBABLY fine, probably.", "fine", None);
        assert_eq!(
            result.shortcuts_detected,
            vec!["Found assumption language: 'PROBABLY'".to_string()]
        );
    }

    #[test]
    fn shortcuts_match_inside_longer_words() {
        let result = validate_response("An unlikely outcome for the deploy.", "deploy outcome", None);
        assert_eq!(
            result.shortcuts_detected,
            vec!["Found assumption language: 'likely'".to_string()]
        );
        assert_eq!(result.status, ValidationStatus::Approved);
        assert_eq!(result.confidence, Confidence::Medium);
    }

    #[test]
    fn clean_reply_is_approved_with_high_confidence() {
        let result = validate_response(
            "The login bug comes from an expired session cookie.",
            "What causes the login bug?",
            None,
        );
        assert_eq!(result.status, ValidationStatus::Approved);
        assert_eq!(result.confidence, Confidence::High);
        assert!(result.is_clean());
    }

    #[test]
    fn unrelated_reply_does_not_address_query() {
        let result = validate_response(
            "Whisk two eggs with flour and sugar, then bake for twenty minutes.",
            "Why does the login page reject valid passwords?",
            None,
        );
        assert!(result.issues.iter().any(|i| i.contains("doesn't directly address")));
        assert!(!result.corrections.is_empty());
        assert_eq!(result.status, ValidationStatus::RequiresRevision);
    }

    #[test]
    fn relevance_ratio_ignores_stop_words_and_punctuation() {
        assert_eq!(relevance_ratio("anything", "what is the"), None);
        let ratio = relevance_ratio("The API failing is a known issue.", "Why is the API failing?");
        assert_eq!(ratio, Some(1.0));
        let ratio = relevance_ratio("Check the API.", "Why is the API failing?");
        assert_eq!(ratio, Some(0.5));
    }

    #[test]
    fn four_certainty_phrases_block() {
        let result = validate_response(
            "This is definitely the cause. It is certainly the config. Obviously the fix works. \
             Clearly the config is the cause.",
            "What is the cause of the config failure?",
            None,
        );
        assert_eq!(result.issues.len(), 4, "{:?}", result.issues);
        assert_eq!(result.status, ValidationStatus::Blocked);
        assert_eq!(result.confidence, Confidence::Low);
    }

    #[test]
    fn repeated_certainty_phrase_is_one_issue() {
        let result = validate_response(
            "Definitely the config. Definitely the cache. Definitely the cause. Definitely.",
            "config cache cause",
            None,
        );
        assert_eq!(
            result.issues,
            vec!["Claims certainty without evidence: 'definitely'".to_string()]
        );
        assert_eq!(result.status, ValidationStatus::RequiresRevision);
        assert_eq!(result.confidence, Confidence::Medium);
    }

    #[test]
    fn certainty_issue_quotes_the_lowercase_phrase() {
        let result = validate_response("WITHOUT A DOUBT the cache.", "cache", None);
        assert_eq!(
            result.issues,
            vec!["Claims certainty without evidence: 'without a doubt'".to_string()]
        );
    }

    #[test]
    fn evidence_in_context_exempts_certainty() {
        let reply = "The config is definitely the cause.";
        let query = "What is the cause of the config failure?";
        let flagged = validate_response(reply, query, None);
        assert_eq!(flagged.issues.len(), 1);
        assert_eq!(flagged.status, ValidationStatus::RequiresRevision);

        let backed = validate_response(reply, query, Some("Cited EVIDENCE: log excerpt"));
        assert!(backed.issues.is_empty());
        assert!(backed.is_clean());
    }

    #[test]
    fn contradiction_blocks_even_with_no_other_issues() {
        let result = validate_response(
            "The cache works, but the cache is slow. The cache does not expire.",
            "Why is the cache slow?",
            None,
        );
        assert!(result.issues.iter().any(|i| i.contains("contradictions")));
        assert_eq!(result.status, ValidationStatus::Blocked);
        assert_eq!(result.confidence, Confidence::Low);
    }

    #[test]
    fn contradiction_is_flagged_once() {
        let result = validate_response(
            "The cache works, but it is slow. It never expires. However the cache is fast. It is not.",
            "cache",
            None,
        );
        let count = result.issues.iter().filter(|i| i.contains("contradictions")).count();
        assert_eq!(count, 1);
    }

    #[test]
    fn negated_contrast_before_final_period_is_a_contradiction() {
        // The empty piece after the last period counts as the next sentence.
        let result = validate_response(
            "The cache works, but not on Windows.",
            "Does the cache work?",
            None,
        );
        assert_eq!(result.issues, vec![CONTRADICTION_ISSUE.to_string()]);
        assert_eq!(result.status, ValidationStatus::Blocked);
        assert_eq!(result.confidence, Confidence::Low);
    }

    #[test]
    fn contrast_without_final_period_is_not_a_contradiction() {
        let result = validate_response(
            "The cache works, but not on Windows",
            "Does the cache work?",
            None,
        );
        assert!(result.is_clean(), "{:?}", result.issues);
    }

    #[test]
    fn contrast_and_negation_cues_match_as_substrings() {
        // "know" carries "no".
        let result = validate_response("The cache works, but it is slow. I know it.", "cache", None);
        assert!(result.is_blocked());

        // "button" carries "but".
        let result = validate_response(
            "Press the button. I know the menu.",
            "Which button opens the menu?",
            None,
        );
        assert!(result.is_blocked());
    }

    #[test]
    fn only_periods_split_sentences() {
        // "but" and "never" share one sentence when "!" is not a break.
        let result = validate_response(
            "The cache works but it is slow! It never expires",
            "cache",
            None,
        );
        assert!(!result.is_blocked(), "{:?}", result.issues);
    }

    #[test]
    fn assumptions_are_captured_verbatim() {
        let reply = "Assuming the Cache is warm, reads are fast. Given that writes are rare, \
                     the cache rarely invalidates.";
        let result = validate_response(reply, "Are cache reads fast?", None);
        assert_eq!(result.assumptions_identified.len(), 2);
        assert!(result.assumptions_identified[0].starts_with("Assuming the Cache is warm"));
        assert!(result.assumptions_identified[1].starts_with("Given that writes are rare"));
    }

    #[test]
    fn assumption_capture_is_bounded() {
        let reply = format!("assuming {}", "x".repeat(300));
        let result = validate_response(&reply, "x", None);
        assert_eq!(result.assumptions_identified[0].chars().count(), 100);
    }

    #[test]
    fn format_message_is_empty_for_clean_result() {
        let result = result_with(ValidationStatus::Approved, Confidence::High);
        assert_eq!(format_validation_message(&result), "");
    }

    #[test]
    fn format_message_lists_sections_and_closing_line() {
        let result = ValidationResult {
            issues: (1..=5).map(|i| format!("issue {i}")).collect(),
            shortcuts_detected: vec!["Found assumption language: 'maybe'".into()],
            assumptions_identified: vec!["a1".into(), "a2".into(), "a3".into()],
            ..result_with(ValidationStatus::Blocked, Confidence::Low)
        };
        let msg = format_validation_message(&result);
        assert!(msg.contains("TT-01 detected assumption language:"));
        assert!(msg.contains("TT-01 issues:"));
        assert!(msg.contains("issue 3"));
        assert!(!msg.contains("issue 4"));
        assert!(msg.contains("Stated assumptions:"));
        assert!(msg.contains("a2"));
        assert!(!msg.contains("a3"));
        assert!(msg.ends_with("Response blocked by TT-01 - requires correction"));
    }

    #[test]
    fn format_message_for_medium_confidence_approval_has_no_closing_line() {
        let result = ValidationResult {
            shortcuts_detected: vec!["Found assumption language: 'likely'".into()],
            ..result_with(ValidationStatus::Approved, Confidence::Medium)
        };
        let msg = format_validation_message(&result);
        assert!(msg.starts_with("TT-01 detected assumption language:"));
        assert!(!msg.contains("revision"));
        assert!(!msg.contains("blocked"));
    }

    #[test]
    fn format_message_for_revision_is_advisory() {
        let result = validate_response(
            "Whisk two eggs with flour.",
            "Why does login fail?",
            None,
        );
        let msg = format_validation_message(&result);
        assert!(msg.contains("TT-01 issues:"));
        assert!(msg.ends_with("TT-01 recommends revision before use"));
    }

    #[test]
    fn validation_is_deterministic() {
        let reply = "Maybe. Definitely the cache, but it is not.";
        assert_eq!(
            validate_response(reply, "cache", None),
            validate_response(reply, "cache", None)
        );
    }
}
