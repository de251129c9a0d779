//! Request and response shapes exchanged with the request-handling layer.

use chrono::{DateTime, Utc};
use gaas_policy::{PolicyStatus, Violation};
use gaas_primitives::{ActionContext, ActionId, ActionType, AgentId, PolicyId};
use serde::{Deserialize, Serialize};

use crate::error::GovernanceResult;

/// Action context as received: already structured, or a raw JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextInput {
    /// Parsed key/value context.
    Structured(ActionContext),
    /// Raw JSON text, parsed on use.
    Raw(String),
}

impl ContextInput {
    /// Resolves the input into a structured context.
    ///
    /// # Errors
    ///
    /// Returns [`crate::GovernanceError::MalformedContext`] when raw text is
    /// not a JSON object.
    pub fn resolve(self) -> GovernanceResult<ActionContext> {
        match self {
            Self::Structured(context) => Ok(context),
            Self::Raw(raw) => Ok(ActionContext::from_json_str(&raw)?),
        }
    }
}

impl Default for ContextInput {
    fn default() -> Self {
        Self::Structured(ActionContext::default())
    }
}

impl From<ActionContext> for ContextInput {
    fn from(context: ActionContext) -> Self {
        Self::Structured(context)
    }
}

/// An action an agent reports having performed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSubmission {
    /// Submitting agent.
    pub agent_id: AgentId,
    /// Action category.
    pub action_type: ActionType,
    /// Free-text description.
    pub action_description: String,
    /// When the action occurred.
    pub timestamp: DateTime<Utc>,
    /// Context fields.
    #[serde(default)]
    pub context: ContextInput,
    /// Resource touched, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_accessed: Option<String>,
}

/// Result of [`crate::GovernanceKernel::submit_action`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionReceipt {
    /// Identifier assigned to the logged action.
    pub log_id: ActionId,
    /// Violations found, in policy-then-rule order.
    pub violations: Vec<Violation>,
}

impl ActionReceipt {
    /// Renders violations as `"<violation_type>: <description>"`.
    #[must_use]
    pub fn violations_detected(&self) -> Vec<String> {
        self.violations
            .iter()
            .map(|v| format!("{}: {}", v.violation_type(), v.description()))
            .collect()
    }
}

/// A request for a ruling on a proposed action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRequest {
    /// Requesting agent.
    pub agent_id: AgentId,
    /// Proposed action text.
    pub proposed_action: String,
    /// Context fields.
    #[serde(default)]
    pub context: ContextInput,
    /// Explicit category; classified from `proposed_action` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_type: Option<ActionType>,
    /// Resource the action would touch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_accessed: Option<String>,
}

impl DecisionRequest {
    /// Creates a request with an empty context.
    #[must_use]
    pub fn new(agent_id: AgentId, proposed_action: impl Into<String>) -> Self {
        Self {
            agent_id,
            proposed_action: proposed_action.into(),
            context: ContextInput::default(),
            action_type: None,
            resource_accessed: None,
        }
    }

    /// Sets the context.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<ContextInput>) -> Self {
        self.context = context.into();
        self
    }

    /// Sets the action category.
    #[must_use]
    pub const fn with_action_type(mut self, action_type: ActionType) -> Self {
        self.action_type = Some(action_type);
        self
    }

    /// Sets the resource.
    #[must_use]
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource_accessed = Some(resource.into());
        self
    }
}

/// Acknowledgement of a stored policy version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyUploadReceipt {
    /// Policy.
    pub policy_id: PolicyId,
    /// Stored version.
    pub version: u32,
    /// Upload time.
    pub upload_timestamp: DateTime<Utc>,
    /// Status at upload time.
    pub status: PolicyStatus,
}

/// Point-in-time health figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthSnapshot {
    /// Registered agents.
    pub registered_agents: usize,
    /// Agents with compliance history.
    pub tracked_agents: usize,
    /// Agents currently suspended.
    pub suspended_agents: usize,
    /// Policy ids with an active version.
    pub active_policies: usize,
    /// Policy store generation.
    pub policy_generation: u64,
    /// Decisions retained for reporting.
    pub retained_decisions: usize,
    /// Snapshot time.
    pub timestamp: DateTime<Utc>,
}
