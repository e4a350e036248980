//! Organ router.
//!
//! Maps a (task class, privacy tier) pair to a [`RoutingPlan`]. Routing
//! rules name functional roles (organs), never backends; the
//! [`OrganMap`] binds each organ to a backend identifier so a backend
//! can be swapped without touching the rules.
//!
//! Two overrides apply after the table lookup, in this order:
//! 1. Buyer-facing content is floored at tier 2.
//! 2. Tier 3 forces the local backend and drops every external
//!    validator. This supersedes everything else.

use serde::{Deserialize, Serialize};

use super::privacy::PrivacyTier;
use super::task::TaskClass;

// ── Organs ───────────────────────────────────────────────────────

/// A functional role bound to exactly one backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Organ {
    /// Perception and ingestion.
    Senses,
    /// Reasoning and planning.
    Brain,
    /// Truth and ethics; holds veto authority through TT-01.
    Conscience,
    /// Execution.
    Hands,
}

impl Organ {
    pub const ALL: &'static [Organ] = &[Organ::Senses, Organ::Brain, Organ::Conscience, Organ::Hands];

    pub fn id(self) -> &'static str {
        match self {
            Organ::Senses => "senses",
            Organ::Brain => "brain",
            Organ::Conscience => "conscience",
            Organ::Hands => "hands",
        }
    }
}

impl std::fmt::Display for Organ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Binding from organs (plus the local boundary) to backend identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganMap {
    pub senses: String,
    pub brain: String,
    pub conscience: String,
    pub hands: String,
    /// Backend that runs inside the local execution boundary.
    pub local: String,
}

impl Default for OrganMap {
    fn default() -> Self {
        Self {
            senses: "gemini".into(),
            brain: "gpt".into(),
            conscience: "claude".into(),
            hands: "grok".into(),
            local: "ollama".into(),
        }
    }
}

impl OrganMap {
    /// Backend identifier bound to an organ.
    pub fn backend_for(&self, organ: Organ) -> &str {
        match organ {
            Organ::Senses => &self.senses,
            Organ::Brain => &self.brain,
            Organ::Conscience => &self.conscience,
            Organ::Hands => &self.hands,
        }
    }

    /// Backend identifier a routing target resolves to.
    pub fn resolve(&self, target: RouteTarget) -> &str {
        match target {
            RouteTarget::Organ(organ) => self.backend_for(organ),
            RouteTarget::Local => &self.local,
        }
    }

    /// Check that the binding is injective and has no blank identifiers.
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut seen: Vec<(&str, Organ)> = Vec::with_capacity(Organ::ALL.len());
        for organ in Organ::ALL {
            let backend = self.backend_for(*organ).trim();
            if backend.is_empty() {
                anyhow::bail!("organs.{organ} must name a backend");
            }
            if let Some((_, other)) = seen.iter().find(|(b, _)| *b == backend) {
                anyhow::bail!(
                    "organs.{organ} and organs.{other} both map to backend '{backend}'; \
                     each organ needs its own backend"
                );
            }
            seen.push((backend, *organ));
        }
        if self.local.trim().is_empty() {
            anyhow::bail!("organs.local must name a backend");
        }
        Ok(())
    }
}

// ── Routing plan ─────────────────────────────────────────────────

/// Where the primary call of a plan goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "organ")]
pub enum RouteTarget {
    /// A functional organ.
    Organ(Organ),
    /// The local backend. Only the tier-3 override produces this.
    Local,
}

impl std::fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteTarget::Organ(organ) => write!(f, "{organ}"),
            RouteTarget::Local => f.write_str("local"),
        }
    }
}

/// Routing plan for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingPlan {
    /// Task class the plan was built for.
    pub task_class: TaskClass,
    /// Organ (or local boundary) that produces the reply.
    pub primary: RouteTarget,
    /// Validators that must see the reply, in order.
    pub required_validators: Vec<Organ>,
    /// Advisory organs. The pipeline does not invoke them.
    pub optional_organs: Vec<Organ>,
    /// Tier floor imposed by the task class, if any.
    pub privacy_tier_override: Option<PrivacyTier>,
    /// Tier in force after all overrides.
    pub effective_tier: PrivacyTier,
}

impl RoutingPlan {
    /// Whether TT-01 must run before the reply is returned.
    pub fn requires_conscience_check(&self) -> bool {
        self.required_validators.contains(&Organ::Conscience)
    }

    /// Whether the plan keeps the request inside the local boundary.
    pub fn is_local(&self) -> bool {
        self.primary == RouteTarget::Local
    }

    /// Backend identifier of the primary call.
    pub fn primary_backend<'a>(&self, organs: &'a OrganMap) -> &'a str {
        organs.resolve(self.primary)
    }

    /// Backend identifiers of the required validators, in order.
    pub fn validator_backends<'a>(&self, organs: &'a OrganMap) -> Vec<&'a str> {
        self.required_validators
            .iter()
            .map(|organ| organs.backend_for(*organ))
            .collect()
    }
}

// ── Routing table ────────────────────────────────────────────────

/// Static base plan for a task class.
struct BasePlan {
    primary: Organ,
    required_validators: &'static [Organ],
    optional_organs: &'static [Organ],
    tier_floor: Option<PrivacyTier>,
}

/// Table lookup. Total over [`TaskClass`].
fn base_plan(task_class: TaskClass) -> BasePlan {
    match task_class {
        TaskClass::Observation => BasePlan {
            primary: Organ::Senses,
            required_validators: &[],
            optional_organs: &[Organ::Brain],
            tier_floor: None,
        },
        TaskClass::Strategy => BasePlan {
            primary: Organ::Brain,
            required_validators: &[Organ::Conscience],
            optional_organs: &[],
            tier_floor: None,
        },
        TaskClass::Validation => BasePlan {
            primary: Organ::Conscience,
            required_validators: &[],
            optional_organs: &[],
            tier_floor: None,
        },
        TaskClass::Execution => BasePlan {
            primary: Organ::Hands,
            required_validators: &[Organ::Conscience],
            optional_organs: &[Organ::Brain],
            tier_floor: None,
        },
        TaskClass::BuyerFacing => BasePlan {
            primary: Organ::Brain,
            required_validators: &[Organ::Conscience],
            optional_organs: &[],
            tier_floor: Some(PrivacyTier::Sensitive),
        },
        TaskClass::ChangeControl => BasePlan {
            primary: Organ::Brain,
            required_validators: &[Organ::Conscience],
            optional_organs: &[],
            tier_floor: None,
        },
    }
}

/// Build the routing plan for a classified request.
pub fn route(task_class: TaskClass, privacy_tier: PrivacyTier) -> RoutingPlan {
    let base = base_plan(task_class);

    let mut plan = RoutingPlan {
        task_class,
        primary: RouteTarget::Organ(base.primary),
        required_validators: base.required_validators.to_vec(),
        optional_organs: base.optional_organs.to_vec(),
        privacy_tier_override: None,
        effective_tier: privacy_tier,
    };

    // (a) Tier floor: buyer-facing content is never tier 0/1.
    if let Some(floor) = base.tier_floor {
        let floored = privacy_tier.max(floor);
        plan.privacy_tier_override = Some(floored);
        plan.effective_tier = floored;
    }

    // (b) Secrets never leave the local boundary.
    if plan.effective_tier.is_local_only() {
        plan.primary = RouteTarget::Local;
        plan.required_validators.clear();
    }

    plan
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_table_primaries() {
        let expected = [
            (TaskClass::Observation, Organ::Senses),
            (TaskClass::Strategy, Organ::Brain),
            (TaskClass::Validation, Organ::Conscience),
            (TaskClass::Execution, Organ::Hands),
            (TaskClass::BuyerFacing, Organ::Brain),
            (TaskClass::ChangeControl, Organ::Brain),
        ];
        for (class, organ) in expected {
            let plan = route(class, PrivacyTier::Public);
            assert_eq!(plan.primary, RouteTarget::Organ(organ), "{class}");
        }
    }

    #[test]
    fn conscience_check_follows_required_validators() {
        assert!(route(TaskClass::Strategy, PrivacyTier::Public).requires_conscience_check());
        assert!(route(TaskClass::Execution, PrivacyTier::Planning).requires_conscience_check());
        assert!(!route(TaskClass::Observation, PrivacyTier::Public).requires_conscience_check());
        assert!(!route(TaskClass::Validation, PrivacyTier::Sensitive).requires_conscience_check());
    }

    #[test]
    fn tier_three_forces_local_for_every_task_class() {
        for class in TaskClass::ALL {
            let plan = route(*class, PrivacyTier::Secret);
            assert_eq!(plan.primary, RouteTarget::Local, "{class}");
            assert!(plan.required_validators.is_empty(), "{class}");
            assert!(!plan.requires_conscience_check(), "{class}");
            assert_eq!(plan.effective_tier, PrivacyTier::Secret);
        }
    }

    #[test]
    fn buyer_facing_floors_tier_at_two() {
        for tier in [PrivacyTier::Public, PrivacyTier::Planning, PrivacyTier::Sensitive] {
            let plan = route(TaskClass::BuyerFacing, tier);
            assert_eq!(plan.effective_tier, PrivacyTier::Sensitive);
            assert_eq!(plan.privacy_tier_override, Some(PrivacyTier::Sensitive));
            assert!(plan.requires_conscience_check());
        }
    }

    #[test]
    fn buyer_facing_floor_does_not_downgrade_secrets() {
        let plan = route(TaskClass::BuyerFacing, PrivacyTier::Secret);
        assert_eq!(plan.effective_tier, PrivacyTier::Secret);
        assert!(plan.is_local());
        assert!(plan.required_validators.is_empty());
    }

    #[test]
    fn non_buyer_plans_keep_classified_tier() {
        let plan = route(TaskClass::Strategy, PrivacyTier::Planning);
        assert_eq!(plan.effective_tier, PrivacyTier::Planning);
        assert_eq!(plan.privacy_tier_override, None);
    }

    #[test]
    fn optional_organs_survive_overrides() {
        let plan = route(TaskClass::Execution, PrivacyTier::Secret);
        assert_eq!(plan.optional_organs, vec![Organ::Brain]);
    }

    #[test]
    fn organ_map_resolves_backends() {
        let organs = OrganMap::default();
        let plan = route(TaskClass::Execution, PrivacyTier::Public);
        assert_eq!(plan.primary_backend(&organs), "grok");
        assert_eq!(plan.validator_backends(&organs), vec!["claude"]);

        let secret = route(TaskClass::Execution, PrivacyTier::Secret);
        assert_eq!(secret.primary_backend(&organs), "ollama");
        assert!(secret.validator_backends(&organs).is_empty());
    }

    #[test]
    fn organ_map_rejects_shared_backends() {
        let organs = OrganMap {
            hands: "gpt".into(),
            ..OrganMap::default()
        };
        let err = organs.validate().unwrap_err().to_string();
        assert!(err.contains("hands"));
        assert!(err.contains("gpt"));
    }

    #[test]
    fn organ_map_rejects_blank_identifiers() {
        let organs = OrganMap {
            local: "  ".into(),
            ..OrganMap::default()
        };
        assert!(organs.validate().is_err());
        assert!(OrganMap::default().validate().is_ok());
    }
}
