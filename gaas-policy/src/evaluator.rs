//! Rule evaluation against action records.

use std::sync::Arc;

use gaas_primitives::{ActionId, ActionRecord, PolicyId, Severity};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::condition::DEFAULT_MAX_DEPTH;
use crate::error::EvaluationFault;
use crate::model::{Policy, PolicyLimits, Remediation, Rule, RuleAction, DEFAULT_VIOLATION_TYPE};

/// A recorded match of an action against one rule. Immutable.
///
/// Identity is the tuple (action, policy, version, rule index), so evaluating
/// the same inputs twice yields equal violations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    action_id: ActionId,
    policy_id: PolicyId,
    policy_version: u32,
    rule_index: usize,
    violation_type: String,
    severity: Severity,
    description: String,
    rule_action: RuleAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    remediation: Option<Remediation>,
}

impl Violation {
    /// Creates a violation with default rule metadata.
    #[must_use]
    pub fn new(
        action_id: ActionId,
        policy_id: PolicyId,
        policy_version: u32,
        rule_index: usize,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            action_id,
            policy_id,
            policy_version,
            rule_index,
            violation_type: DEFAULT_VIOLATION_TYPE.to_owned(),
            severity,
            description: description.into(),
            rule_action: RuleAction::default(),
            remediation: None,
        }
    }

    /// Creates the violation produced by `rule` of `policy` matching `action`.
    #[must_use]
    pub fn from_rule(action: &ActionRecord, policy: &Policy, rule_index: usize, rule: &Rule) -> Self {
        Self {
            action_id: action.id(),
            policy_id: policy.id().clone(),
            policy_version: policy.version(),
            rule_index,
            violation_type: rule.violation_type().to_owned(),
            severity: rule.severity(),
            description: rule.description().to_owned(),
            rule_action: rule.action(),
            remediation: rule.remediation().cloned(),
        }
    }

    /// Sets the violation label.
    #[must_use]
    pub fn with_violation_type(mut self, violation_type: impl Into<String>) -> Self {
        self.violation_type = violation_type.into();
        self
    }

    /// Sets the action requested by the rule.
    #[must_use]
    pub fn with_rule_action(mut self, rule_action: RuleAction) -> Self {
        self.rule_action = rule_action;
        self
    }

    /// Attaches remediation metadata.
    #[must_use]
    pub fn with_remediation(mut self, remediation: Remediation) -> Self {
        self.remediation = Some(remediation);
        self
    }

    /// Returns the offending action.
    #[must_use]
    pub const fn action_id(&self) -> ActionId {
        self.action_id
    }

    /// Returns the violated policy.
    #[must_use]
    pub fn policy_id(&self) -> &PolicyId {
        &self.policy_id
    }

    /// Returns the version of the violated policy.
    #[must_use]
    pub const fn policy_version(&self) -> u32 {
        self.policy_version
    }

    /// Returns the zero-based rule index within the policy.
    #[must_use]
    pub const fn rule_index(&self) -> usize {
        self.rule_index
    }

    /// Returns the violation label.
    #[must_use]
    pub fn violation_type(&self) -> &str {
        &self.violation_type
    }

    /// Returns the rule severity.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        self.severity
    }

    /// Returns the rule description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the action requested by the rule.
    #[must_use]
    pub const fn rule_action(&self) -> RuleAction {
        self.rule_action
    }

    /// Returns the rule's remediation metadata, if any.
    #[must_use]
    pub fn remediation(&self) -> Option<&Remediation> {
        self.remediation.as_ref()
    }
}

/// Pure evaluator producing violations in policy-then-rule order.
#[derive(Debug, Clone, Copy)]
pub struct RuleEvaluator {
    max_depth: usize,
}

impl Default for RuleEvaluator {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl RuleEvaluator {
    /// Creates an evaluator that refuses conditions deeper than the upload limit.
    #[must_use]
    pub const fn new(limits: &PolicyLimits) -> Self {
        Self {
            max_depth: limits.max_condition_depth,
        }
    }

    /// Evaluates `action` against `policies`.
    ///
    /// Policies are visited in ascending id (then version) order whatever the
    /// order of the slice, and rules in declaration order. Policies whose
    /// scope excludes the action's agent or type are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`EvaluationFault`] when a rule's condition cannot be
    /// interpreted. Callers must treat this as a failure to clear the action.
    pub fn evaluate(
        &self,
        action: &ActionRecord,
        policies: &[Arc<Policy>],
    ) -> Result<Vec<Violation>, EvaluationFault> {
        let mut ordered: Vec<&Policy> = policies.iter().map(AsRef::as_ref).collect();
        ordered.sort_by(|a, b| a.id().cmp(b.id()).then(a.version().cmp(&b.version())));

        let mut violations = Vec::new();
        for policy in ordered {
            if !policy.scope().applies_to(action.agent_id(), action.action_type()) {
                continue;
            }
            for (rule_index, rule) in policy.rules().iter().enumerate() {
                if self.rule_matches(action, policy, rule_index, rule)? {
                    violations.push(Violation::from_rule(action, policy, rule_index, rule));
                }
            }
        }

        debug!(
            action_id = %action.id(),
            agent_id = %action.agent_id(),
            policies = policies.len(),
            violations = violations.len(),
            "action evaluated"
        );
        Ok(violations)
    }

    fn rule_matches(
        &self,
        action: &ActionRecord,
        policy: &Policy,
        rule_index: usize,
        rule: &Rule,
    ) -> Result<bool, EvaluationFault> {
        let fault = |reason: String| EvaluationFault {
            policy_id: policy.id().to_string(),
            policy_version: policy.version(),
            rule_index,
            reason,
        };

        let depth = rule.condition().depth();
        if depth > self.max_depth {
            return Err(fault(format!(
                "condition depth {depth} exceeds limit {}",
                self.max_depth
            )));
        }
        rule.condition()
            .matches(action)
            .map_err(|err| fault(err.reason))
    }
}
