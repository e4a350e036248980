//! Governance stages of the routing pipeline.
//!
//! Every stage here is a pure, deterministic function of its inputs:
//!
//! - [`privacy`]: text → privacy tier (0–3)
//! - [`task`]: text (+ retrieved context) → task class
//! - [`mode`]: text → working mode, display metadata only
//! - [`router`]: (task class, tier) → routing plan over organs
//! - [`truth`]: TT-01 verdict on a backend reply
//!
//! ## Design
//! - Rule tables are ordered lists; the first matching rule wins
//! - Classifiers are total: unmatched input falls through to a default
//! - Nothing here holds state between requests

pub mod mode;
pub mod privacy;
pub mod router;
pub mod task;
pub mod truth;

pub use mode::{detect_mode, Mode};
pub use privacy::{classify_privacy_tier, matched_privacy_cues, PrivacyTier};
pub use router::{route, Organ, OrganMap, RouteTarget, RoutingPlan};
pub use task::{classify_task, TaskClass};
pub use truth::{
    format_validation_message, relevance_ratio, validate_response, Confidence, ValidationResult,
    ValidationStatus, RELEVANCE_THRESHOLD,
};
