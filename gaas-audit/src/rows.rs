//! Flat rows consumed by offline analysis tooling.
//!
//! Field names are part of the export contract and must not change.

use chrono::{DateTime, Utc};
use gaas_enforcement::{AgentComplianceState, DecisionKind, EnforcementDecision};
use gaas_policy::{EvaluationFault, Violation};
use gaas_primitives::{ActionRecord, ActionType, AgentId};
use serde::{Deserialize, Serialize};

/// One submitted action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionLogRow {
    /// Action time.
    pub timestamp: DateTime<Utc>,
    /// Submitting agent.
    pub agent_id: AgentId,
    /// Action category.
    pub action_type: ActionType,
    /// Free-text description.
    pub action_description: String,
    /// Resource touched, if any.
    #[serde(default)]
    pub resource_accessed: Option<String>,
    /// Whether the submission was accepted.
    pub success: bool,
    /// Number of violations found.
    pub violations_detected: usize,
    /// Rendered violations.
    pub violations: Vec<String>,
    /// Why evaluation failed, when it did. The violation fields are then
    /// not a clean result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_fault: Option<String>,
}

impl ActionLogRow {
    /// Builds the row for `action` and the violations found for it.
    #[must_use]
    pub fn new(action: &ActionRecord, violations: &[Violation], success: bool) -> Self {
        Self {
            timestamp: action.timestamp(),
            agent_id: action.agent_id().clone(),
            action_type: action.action_type(),
            action_description: action.description().to_owned(),
            resource_accessed: action.resource_accessed().map(str::to_owned),
            success,
            violations_detected: violations.len(),
            violations: violations.iter().map(render).collect(),
            evaluation_fault: None,
        }
    }

    /// Builds the row for an action whose evaluation faulted.
    #[must_use]
    pub fn faulted(action: &ActionRecord, fault: &EvaluationFault) -> Self {
        Self {
            evaluation_fault: Some(fault.to_string()),
            ..Self::new(action, &[], false)
        }
    }
}

/// One enforcement decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRow {
    /// Decision time.
    pub timestamp: DateTime<Utc>,
    /// Agent the decision applies to.
    pub agent_id: AgentId,
    /// Proposed action text.
    pub proposed_action: String,
    /// Outcome.
    pub decision: DecisionKind,
    /// Number of violations behind the outcome.
    pub violation_count: usize,
    /// Rendered violations.
    pub violations: Vec<String>,
}

impl From<&EnforcementDecision> for DecisionRow {
    fn from(decision: &EnforcementDecision) -> Self {
        Self {
            timestamp: decision.timestamp(),
            agent_id: decision.agent_id().clone(),
            proposed_action: decision.proposed_action().to_owned(),
            decision: decision.decision(),
            violation_count: decision.violations().len(),
            violations: decision.violations().iter().map(render).collect(),
        }
    }
}

/// Per-agent totals at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMetricsRow {
    /// Snapshot time.
    pub timestamp: DateTime<Utc>,
    /// Agent.
    pub agent_id: AgentId,
    /// Registered agent type.
    pub agent_type: String,
    /// Decisions recorded.
    pub total_actions: u64,
    /// Compliant decisions.
    pub compliant_actions: u64,
    /// Violations across all decisions.
    pub violations: u64,
    /// `block` decisions.
    pub blocked_actions: u64,
    /// `warn` decisions.
    pub warnings_received: u64,
    /// `compliant_actions / total_actions`.
    pub compliance_rate: f64,
}

impl AgentMetricsRow {
    /// Builds the row from an agent's compliance state.
    #[must_use]
    pub fn new(
        state: &AgentComplianceState,
        agent_type: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            timestamp,
            agent_id: state.agent_id().clone(),
            agent_type: agent_type.into(),
            total_actions: state.total_actions(),
            compliant_actions: state.compliant_actions(),
            violations: state.violations().total(),
            blocked_actions: state.decisions().get(DecisionKind::Block),
            warnings_received: state.decisions().get(DecisionKind::Warn),
            compliance_rate: state.compliance_rate(),
        }
    }
}

fn render(violation: &Violation) -> String {
    format!(
        "{} [{}] {}: {}",
        violation.policy_id(),
        violation.severity().as_str(),
        violation.violation_type(),
        violation.description()
    )
}
