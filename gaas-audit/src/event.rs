//! Audit events appended to the journal.

use chrono::{DateTime, Utc};
use gaas_primitives::{AgentId, PolicyId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::rows::{ActionLogRow, DecisionRow};

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// An agent registration attempt.
    AgentRegistration {
        /// Agent identifier as submitted.
        agent_id: String,
        /// Whether the registration was stored.
        success: bool,
        /// Outcome message.
        message: String,
    },
    /// An action log submission.
    ActionSubmission(ActionLogRow),
    /// An enforcement decision.
    EnforcementDecision {
        /// Flattened decision row.
        #[serde(flatten)]
        row: DecisionRow,
        /// Reasoning string returned to the agent.
        reasoning: String,
    },
    /// A policy upload attempt.
    PolicyUpload {
        /// Policy identifier as submitted.
        policy_id: String,
        /// Version as submitted, if it parsed.
        #[serde(default)]
        policy_version: Option<u32>,
        /// Whether the version was stored.
        success: bool,
        /// Validation problems, empty on success.
        #[serde(default)]
        validation_errors: Vec<String>,
    },
    /// A compliance report was generated.
    ComplianceReport {
        /// Report identifier.
        report_id: String,
        /// Agent filter, if any.
        #[serde(default)]
        agent_id: Option<AgentId>,
        /// Start of the window.
        period_start: DateTime<Utc>,
        /// End of the window.
        period_end: DateTime<Utc>,
    },
}

impl AuditEvent {
    /// Returns the `event_type` label.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::AgentRegistration { .. } => "agent_registration",
            Self::ActionSubmission(_) => "action_submission",
            Self::EnforcementDecision { .. } => "enforcement_decision",
            Self::PolicyUpload { .. } => "policy_upload",
            Self::ComplianceReport { .. } => "compliance_report",
        }
    }

    /// Returns the agent the event concerns, if any.
    #[must_use]
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            Self::AgentRegistration { agent_id, .. } => Some(agent_id),
            Self::ActionSubmission(row) => Some(row.agent_id.as_str()),
            Self::EnforcementDecision { row, .. } => Some(row.agent_id.as_str()),
            Self::ComplianceReport { agent_id, .. } => agent_id.as_ref().map(AgentId::as_str),
            Self::PolicyUpload { .. } => None,
        }
    }

    /// Convenience constructor for policy uploads.
    #[must_use]
    pub fn policy_upload(
        policy_id: &PolicyId,
        version: u32,
        validation_errors: Vec<String>,
    ) -> Self {
        Self::PolicyUpload {
            policy_id: policy_id.to_string(),
            policy_version: Some(version),
            success: validation_errors.is_empty(),
            validation_errors,
        }
    }
}

/// One journal line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    id: Uuid,
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    event: AuditEvent,
}

impl AuditRecord {
    /// Wraps `event` with a fresh identifier.
    #[must_use]
    pub fn new(event: AuditEvent, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            event,
        }
    }

    /// Returns the unique identifier for this record.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the time the event was recorded.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns the event.
    #[must_use]
    pub const fn event(&self) -> &AuditEvent {
        &self.event
    }
}
