//! Privacy-tier classification.
//!
//! Ranks how sensitive a request is before any backend sees it. The
//! tier decides whether content may leave the local execution boundary:
//! tier 3 never does.

use serde::{Deserialize, Serialize};

// ── Privacy tier ─────────────────────────────────────────────────

/// Sensitivity of a request, ordered from public to secret.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum PrivacyTier {
    /// Generic or public knowledge.
    #[default]
    Public = 0,
    /// High-level planning.
    Planning = 1,
    /// Sensitive business reasoning.
    Sensitive = 2,
    /// Secrets: PII, credentials, deal terms. Local backend only.
    Secret = 3,
}

impl PrivacyTier {
    /// All tiers in ascending order.
    pub const ALL: &'static [PrivacyTier] = &[
        PrivacyTier::Public,
        PrivacyTier::Planning,
        PrivacyTier::Sensitive,
        PrivacyTier::Secret,
    ];

    /// Numeric level (0–3).
    pub fn level(self) -> u8 {
        self as u8
    }

    /// Whether content at this tier must stay on the local backend.
    pub fn is_local_only(self) -> bool {
        self == PrivacyTier::Secret
    }
}

impl TryFrom<u8> for PrivacyTier {
    type Error = String;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(PrivacyTier::Public),
            1 => Ok(PrivacyTier::Planning),
            2 => Ok(PrivacyTier::Sensitive),
            3 => Ok(PrivacyTier::Secret),
            other => Err(format!("privacy tier must be 0-3, got {other}")),
        }
    }
}

impl From<PrivacyTier> for u8 {
    fn from(tier: PrivacyTier) -> Self {
        tier.level()
    }
}

impl std::fmt::Display for PrivacyTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tier-{}", self.level())
    }
}

// ── Keyword sets ─────────────────────────────────────────────────

/// Secrets: PII, credentials, deal terms.
const SECRET_PATTERNS: &[&str] = &[
    "ssn",
    "social security",
    "credit card",
    "password",
    "api key",
    "private key",
    "access token",
    "customer data",
    "financial",
    "bank account",
    "account number",
    "passport",
    "deal terms",
    "term sheet",
];

/// Sensitive business reasoning.
const SENSITIVE_PATTERNS: &[&str] = &[
    "strategy",
    "competitive",
    "internal",
    "confidential",
    "proprietary",
    "acquisition",
];

/// Planning cues.
const PLANNING_PATTERNS: &[&str] = &["plan", "roadmap", "execute", "milestone", "timeline"];

/// Keyword sets in severity order; the first hit decides the tier.
const TIER_RULES: &[(PrivacyTier, &[&str])] = &[
    (PrivacyTier::Secret, SECRET_PATTERNS),
    (PrivacyTier::Sensitive, SENSITIVE_PATTERNS),
    (PrivacyTier::Planning, PLANNING_PATTERNS),
];

// ── Classification ───────────────────────────────────────────────

/// Classify a message into a privacy tier.
///
/// Case-insensitive substring match. Checking the most severe set first
/// makes the result the maximum tier any cue triggers. Every input maps
/// to a tier; empty text is [`PrivacyTier::Public`].
pub fn classify_privacy_tier(text: &str) -> PrivacyTier {
    let lower = text.to_lowercase();
    TIER_RULES
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|p| lower.contains(p)))
        .map_or(PrivacyTier::Public, |(tier, _)| *tier)
}

/// List every privacy cue present in a message, most severe first.
pub fn matched_privacy_cues(text: &str) -> Vec<&'static str> {
    let lower = text.to_lowercase();
    TIER_RULES
        .iter()
        .flat_map(|(_, patterns)| patterns.iter())
        .filter(|p| lower.contains(**p))
        .copied()
        .collect()
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn secret_cues_classify_as_tier_three() {
        assert_eq!(classify_privacy_tier("my password is x"), PrivacyTier::Secret);
        assert_eq!(classify_privacy_tier("My SSN is 123-45-6789"), PrivacyTier::Secret);
        assert_eq!(
            classify_privacy_tier("Here are the DEAL TERMS for the merger"),
            PrivacyTier::Secret
        );
    }

    #[test]
    fn sensitive_cues_classify_as_tier_two() {
        assert_eq!(
            classify_privacy_tier("our competitive position is weak"),
            PrivacyTier::Sensitive
        );
        assert_eq!(classify_privacy_tier("Confidential memo"), PrivacyTier::Sensitive);
    }

    #[test]
    fn planning_cues_classify_as_tier_one() {
        assert_eq!(classify_privacy_tier("draft the Q3 roadmap"), PrivacyTier::Planning);
    }

    #[test]
    fn unmatched_and_empty_input_is_public() {
        assert_eq!(classify_privacy_tier("What's the weather like?"), PrivacyTier::Public);
        assert_eq!(classify_privacy_tier(""), PrivacyTier::Public);
    }

    #[test]
    fn most_severe_cue_wins() {
        // "plan" is a tier-1 cue, "api key" is tier 3.
        assert_eq!(
            classify_privacy_tier("plan how to rotate the api key"),
            PrivacyTier::Secret
        );
        assert_eq!(
            classify_privacy_tier("internal plan for next year"),
            PrivacyTier::Sensitive
        );
    }

    #[test]
    fn classification_is_deterministic() {
        let text = "Confidential strategy plan with a password";
        assert_eq!(classify_privacy_tier(text), classify_privacy_tier(text));
    }

    #[test]
    fn keyword_sets_are_disjoint() {
        let mut seen = HashSet::new();
        for (_, patterns) in TIER_RULES {
            for p in *patterns {
                assert!(seen.insert(*p), "keyword '{p}' appears in more than one tier");
            }
        }
    }

    #[test]
    fn matched_cues_lists_all_hits() {
        let cues = matched_privacy_cues("Internal roadmap includes the password");
        assert_eq!(cues, vec!["password", "internal", "roadmap"]);
        assert!(matched_privacy_cues("hello").is_empty());
    }

    #[test]
    fn tier_conversion_round_trips_through_level() {
        for tier in PrivacyTier::ALL {
            assert_eq!(PrivacyTier::try_from(tier.level()).unwrap(), *tier);
        }
        assert!(PrivacyTier::try_from(4).is_err());
        assert_eq!(PrivacyTier::Secret.to_string(), "tier-3");
        assert!(PrivacyTier::Secret > PrivacyTier::Planning);
    }
}
