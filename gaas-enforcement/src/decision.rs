//! Enforcement decision types.

use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use gaas_policy::Violation;
use gaas_primitives::{ActionId, AgentId, Severity};
use serde::{Deserialize, Serialize};

use crate::constraints::AdditionalConstraints;

/// Reasoning attached to every fail-closed decision.
pub const FAULT_REASONING: &str = "evaluation error — defaulting to block";

/// Outcome of an enforcement decision, ordered from least to most restrictive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    /// Action may proceed.
    Allow,
    /// Action may proceed; the agent is warned.
    Warn,
    /// Action is rejected.
    Block,
    /// Action is rejected and the agent is suspended.
    Suspend,
}

impl DecisionKind {
    /// All kinds in ascending restrictiveness.
    pub const ALL: [Self; 4] = [Self::Allow, Self::Warn, Self::Block, Self::Suspend];

    /// Returns the wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Warn => "warn",
            Self::Block => "block",
            Self::Suspend => "suspend",
        }
    }

    /// `allow` and `warn` count as compliant outcomes.
    #[must_use]
    pub const fn is_compliant(self) -> bool {
        matches!(self, Self::Allow | Self::Warn)
    }

    /// Lowest outcome implied by a violation severity alone.
    #[must_use]
    pub const fn floor_for(severity: Severity) -> Self {
        match severity {
            Severity::Low | Severity::Medium => Self::Warn,
            Severity::High => Self::Block,
            Severity::Critical => Self::Suspend,
        }
    }
}

impl Display for DecisionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which branch of the decision matrix produced the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionTrigger {
    /// Nothing matched.
    NoViolations,
    /// The worst violation severity set the outcome.
    Severity {
        /// Worst severity among the violations.
        severity: Severity,
    },
    /// Medium-or-worse violations inside the trailing window escalated to block.
    RepeatedViolations {
        /// Prior medium-or-worse violations counted in the window.
        prior: usize,
    },
    /// A prior block or suspend inside the trailing window escalated to block.
    PriorEnforcement {
        /// Prior block/suspend decisions counted in the window.
        prior: usize,
    },
    /// The cumulative block count reached the suspension threshold.
    CumulativeBlocks {
        /// Blocks counted, including this decision when it would have blocked.
        blocks: u32,
    },
    /// The agent was already suspended.
    Suspended,
    /// Rule evaluation failed and the engine failed closed.
    EvaluationFault,
}

/// The ruling on one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnforcementDecision {
    agent_id: AgentId,
    action_id: ActionId,
    proposed_action: String,
    decision: DecisionKind,
    trigger: DecisionTrigger,
    violations: Vec<Violation>,
    reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    additional_constraints: Option<AdditionalConstraints>,
    timestamp: DateTime<Utc>,
}

impl EnforcementDecision {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        agent_id: AgentId,
        action_id: ActionId,
        proposed_action: String,
        decision: DecisionKind,
        trigger: DecisionTrigger,
        violations: Vec<Violation>,
        reasoning: String,
        additional_constraints: Option<AdditionalConstraints>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            agent_id,
            action_id,
            proposed_action,
            decision,
            trigger,
            violations,
            reasoning,
            additional_constraints,
            timestamp,
        }
    }

    /// Returns the agent the decision applies to.
    #[must_use]
    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    /// Returns the action ruled on.
    #[must_use]
    pub const fn action_id(&self) -> ActionId {
        self.action_id
    }

    /// Returns the description of the action ruled on.
    #[must_use]
    pub fn proposed_action(&self) -> &str {
        &self.proposed_action
    }

    /// Returns the outcome.
    #[must_use]
    pub const fn decision(&self) -> DecisionKind {
        self.decision
    }

    /// Returns the matrix branch that produced the outcome.
    #[must_use]
    pub const fn trigger(&self) -> DecisionTrigger {
        self.trigger
    }

    /// Returns the violations justifying the outcome, in evaluation order.
    #[must_use]
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Returns the deterministic reasoning text.
    #[must_use]
    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    /// Returns constraints attached to `block` / `suspend` outcomes.
    #[must_use]
    pub fn additional_constraints(&self) -> Option<&AdditionalConstraints> {
        self.additional_constraints.as_ref()
    }

    /// Returns the decision time (the time of the action ruled on).
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns `true` for `allow` and `warn`, and for a suspended agent's
    /// clean proposal. Fail-closed blocks are never compliant.
    #[must_use]
    pub fn is_compliant(&self) -> bool {
        if self.is_fault() {
            return false;
        }
        self.decision.is_compliant() || self.violations.is_empty()
    }

    /// Worst severity among the violations.
    #[must_use]
    pub fn worst_severity(&self) -> Option<Severity> {
        self.violations.iter().map(Violation::severity).max()
    }

    /// Returns `true` when the decision came from the fail-closed path.
    #[must_use]
    pub fn is_fault(&self) -> bool {
        self.trigger == DecisionTrigger::EvaluationFault
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_order_by_restrictiveness() {
        assert!(DecisionKind::Allow < DecisionKind::Warn);
        assert!(DecisionKind::Block < DecisionKind::Suspend);
        assert!(DecisionKind::Warn.is_compliant());
        assert!(!DecisionKind::Block.is_compliant());
    }

    #[test]
    fn severity_floor_mapping() {
        assert_eq!(DecisionKind::floor_for(Severity::Low), DecisionKind::Warn);
        assert_eq!(DecisionKind::floor_for(Severity::Medium), DecisionKind::Warn);
        assert_eq!(DecisionKind::floor_for(Severity::High), DecisionKind::Block);
        assert_eq!(DecisionKind::floor_for(Severity::Critical), DecisionKind::Suspend);
    }

    #[test]
    fn trigger_serializes_with_kind_tag() {
        let json = serde_json::to_value(DecisionTrigger::RepeatedViolations { prior: 2 }).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "repeated_violations", "prior": 2}));
    }
}
