//! Working-mode detection.
//!
//! The mode is display and analytics metadata attached to a reply. It is
//! never an input to routing or validation.

use serde::{Deserialize, Serialize};

/// What the user appears to be doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Ideating,
    Executing,
    Validating,
    Researching,
    General,
}

impl Mode {
    pub fn label(self) -> &'static str {
        match self {
            Mode::Ideating => "ideating",
            Mode::Executing => "executing",
            Mode::Validating => "validating",
            Mode::Researching => "researching",
            Mode::General => "general",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

const IDEATE_PATTERNS: &[&str] = &[
    "what if",
    "could we",
    "should we",
    "idea",
    "brainstorm",
    "thinking about",
];

const EXECUTE_PATTERNS: &[&str] = &[
    "build",
    "create",
    "make",
    "implement",
    "deploy",
    "write",
    "add",
    "fix",
];

const VALIDATE_PATTERNS: &[&str] = &["check", "verify", "validate", "review", "is this", "correct"];

const RESEARCH_PATTERNS: &[&str] = &["what", "how", "why", "explain", "find", "search"];

const MODE_RULES: &[(Mode, &[&str])] = &[
    (Mode::Ideating, IDEATE_PATTERNS),
    (Mode::Executing, EXECUTE_PATTERNS),
    (Mode::Validating, VALIDATE_PATTERNS),
    (Mode::Researching, RESEARCH_PATTERNS),
];

/// Detect the user's working mode. First matching rule wins.
pub fn detect_mode(text: &str) -> Mode {
    let lower = text.to_lowercase();
    MODE_RULES
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|p| lower.contains(p)))
        .map_or(Mode::General, |(mode, _)| *mode)
}
