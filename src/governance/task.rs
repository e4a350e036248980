//! Task classification.
//!
//! Assigns exactly one [`TaskClass`] per request from an ordered keyword
//! table. Rule order is the tie-break: buyer-facing and execution
//! requests carry more risk than strategy or observation requests and
//! must not be shadowed by their looser cues. Change-control cues come
//! last, so they only decide a request no other rule claims.

use serde::{Deserialize, Serialize};

/// Coarse category of request intent, used to pick the primary organ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskClass {
    /// Perception and ingestion: summarize, extract, look up.
    Observation,
    /// Reasoning and planning.
    Strategy,
    /// Checking existing work.
    Validation,
    /// Building or deploying something.
    Execution,
    /// Content a buyer, customer or client will see.
    BuyerFacing,
    /// Changes to something already in place: rollbacks, migrations.
    ChangeControl,
}

impl TaskClass {
    pub const ALL: &'static [TaskClass] = &[
        TaskClass::Observation,
        TaskClass::Strategy,
        TaskClass::Validation,
        TaskClass::Execution,
        TaskClass::BuyerFacing,
        TaskClass::ChangeControl,
    ];

    /// Identifier used in logs, config and API payloads.
    pub fn id(self) -> &'static str {
        match self {
            TaskClass::Observation => "observation",
            TaskClass::Strategy => "strategy",
            TaskClass::Validation => "validation",
            TaskClass::Execution => "execution",
            TaskClass::BuyerFacing => "buyer_facing",
            TaskClass::ChangeControl => "change_control",
        }
    }

    /// Whether replies for this class should always pass TT-01.
    ///
    /// Advisory only. The router decides whether the check actually runs;
    /// the tier-3 override switches it off.
    pub fn demands_truth_check(self) -> bool {
        matches!(
            self,
            TaskClass::BuyerFacing
                | TaskClass::Strategy
                | TaskClass::Execution
                | TaskClass::ChangeControl
        )
    }
}

impl std::fmt::Display for TaskClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

// ── Rule table ───────────────────────────────────────────────────

const BUYER_FACING_PATTERNS: &[&str] = &["buyer", "customer", "client", "earnout", "valuation"];

const EXECUTION_PATTERNS: &[&str] = &[
    "build",
    "create",
    "implement",
    "deploy",
    "execute",
    "write code",
];

const CHANGE_CONTROL_PATTERNS: &[&str] = &[
    "change request",
    "change control",
    "rollback",
    "roll back",
    "revert",
    "migration",
];

const STRATEGY_PATTERNS: &[&str] = &[
    "plan",
    "strategy",
    "should we",
    "how to approach",
    "what if",
];

const VALIDATION_PATTERNS: &[&str] = &[
    "validate",
    "check",
    "verify",
    "is this correct",
    "review",
];

const OBSERVATION_PATTERNS: &[&str] = &["what is", "analyze", "summarize", "extract", "find"];

/// First matching rule wins.
const TASK_RULES: &[(TaskClass, &[&str])] = &[
    (TaskClass::BuyerFacing, BUYER_FACING_PATTERNS),
    (TaskClass::Execution, EXECUTION_PATTERNS),
    (TaskClass::Strategy, STRATEGY_PATTERNS),
    (TaskClass::Validation, VALIDATION_PATTERNS),
    (TaskClass::Observation, OBSERVATION_PATTERNS),
    (TaskClass::ChangeControl, CHANGE_CONTROL_PATTERNS),
];

/// Class assigned when no rule matches.
const DEFAULT_TASK_CLASS: TaskClass = TaskClass::Strategy;

/// Classify a request, optionally enriched with retrieved context.
///
/// Context is matched together with the message, so a cue that only
/// appears in retrieved material still counts.
pub fn classify_task(text: &str, context: Option<&str>) -> TaskClass {
    let mut haystack = text.to_lowercase();
    if let Some(ctx) = context.filter(|c| !c.trim().is_empty()) {
        haystack.push('\n');
        haystack.push_str(&ctx.to_lowercase());
    }

    TASK_RULES
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|p| haystack.contains(p)))
        .map_or(DEFAULT_TASK_CLASS, |(class, _)| *class)
}

// ── Tests ────────────────────────────────────────────────────────
