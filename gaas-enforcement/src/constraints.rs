//! Constraints attached to restrictive decisions.

use gaas_policy::{ApprovalLevel, Violation};
use gaas_primitives::Severity;
use serde::{Deserialize, Serialize};

use crate::decision::DecisionKind;

/// Structured follow-up requirements for `block` and `suspend` outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalConstraints {
    /// Who must approve before the agent may retry or resume.
    pub required_approval: ApprovalLevel,
    /// Suggested safer alternatives.
    pub alternative_actions: Vec<String>,
    /// Whether the same action may simply be resubmitted.
    pub retry_allowed: bool,
    /// Whether a human must review the agent before reinstatement.
    pub manual_review_required: bool,
    /// Suggested minimum suspension before review, for `suspend`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspension_duration_hours: Option<u32>,
    /// A critical violation is present.
    pub immediate_notification: bool,
    /// A high violation is present.
    pub supervisor_notification: bool,
}

/// Default remediation for one severity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintEntry {
    /// Approval required.
    pub required_approval: ApprovalLevel,
    /// Suggested alternatives.
    pub alternative_actions: Vec<String>,
}

impl ConstraintEntry {
    fn new(required_approval: ApprovalLevel, alternatives: &[&str]) -> Self {
        Self {
            required_approval,
            alternative_actions: alternatives.iter().map(|alt| (*alt).to_owned()).collect(),
        }
    }
}

/// Fixed severity to remediation mapping.
///
/// A triggering rule's own remediation metadata takes precedence over the
/// table entry for its severity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintTable {
    /// Entry for `low`.
    pub low: ConstraintEntry,
    /// Entry for `medium`.
    pub medium: ConstraintEntry,
    /// Entry for `high`.
    pub high: ConstraintEntry,
    /// Entry for `critical`.
    pub critical: ConstraintEntry,
}

impl Default for ConstraintTable {
    fn default() -> Self {
        Self {
            low: ConstraintEntry::new(
                ApprovalLevel::Supervisor,
                &["retry with a narrower scope", "document the business justification"],
            ),
            medium: ConstraintEntry::new(
                ApprovalLevel::Supervisor,
                &[
                    "request supervisor approval before retrying",
                    "use a less privileged resource",
                ],
            ),
            high: ConstraintEntry::new(
                ApprovalLevel::SecurityOfficer,
                &[
                    "request access through the approval workflow",
                    "use anonymized or aggregated data",
                ],
            ),
            critical: ConstraintEntry::new(
                ApprovalLevel::ComplianceOfficer,
                &["halt the task and escalate to a compliance officer"],
            ),
        }
    }
}

impl ConstraintTable {
    /// Returns the entry for `severity`.
    #[must_use]
    pub const fn entry(&self, severity: Severity) -> &ConstraintEntry {
        match severity {
            Severity::Low => &self.low,
            Severity::Medium => &self.medium,
            Severity::High => &self.high,
            Severity::Critical => &self.critical,
        }
    }

    /// Builds constraints for `kind`, or `None` for compliant outcomes.
    ///
    /// `trigger` is the violation that determined the outcome; when absent
    /// (fail-closed or already suspended) `fallback` selects the table entry.
    #[must_use]
    pub fn constraints_for(
        &self,
        kind: DecisionKind,
        trigger: Option<&Violation>,
        violations: &[Violation],
        fallback: Severity,
        suspension_hours: u32,
    ) -> Option<AdditionalConstraints> {
        if kind.is_compliant() {
            return None;
        }

        let entry = self.entry(trigger.map_or(fallback, Violation::severity));
        let (required_approval, alternative_actions) =
            match trigger.and_then(Violation::remediation) {
                Some(remediation) => {
                    let alternatives = if remediation.alternative_actions.is_empty() {
                        entry.alternative_actions.clone()
                    } else {
                        remediation.alternative_actions.clone()
                    };
                    (remediation.required_approval, alternatives)
                }
                None => (entry.required_approval, entry.alternative_actions.clone()),
            };
        let suspended = kind == DecisionKind::Suspend;

        Some(AdditionalConstraints {
            required_approval,
            alternative_actions,
            retry_allowed: false,
            manual_review_required: suspended,
            suspension_duration_hours: suspended.then_some(suspension_hours),
            immediate_notification: violations
                .iter()
                .any(|v| v.severity() == Severity::Critical),
            supervisor_notification: violations.iter().any(|v| v.severity() == Severity::High),
        })
    }
}
