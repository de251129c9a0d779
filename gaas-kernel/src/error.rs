//! Error taxonomy surfaced to the request-handling layer.

use chrono::{DateTime, Utc};
use gaas_audit::AuditError;
use gaas_compliance::ReportError;
use gaas_policy::{EvaluationFault, IngestError, PolicyValidationError};
use gaas_primitives::AgentId;
use thiserror::Error;

use crate::lifecycle::AgentStatus;
use crate::registry::RegistryError;

/// Result alias for kernel operations.
pub type GovernanceResult<T> = Result<T, GovernanceError>;

/// Errors returned by [`crate::GovernanceKernel`].
///
/// Every variant is recovered at the request boundary; none affects other agents.
#[derive(Debug, Error)]
pub enum GovernanceError {
    /// The agent is not registered.
    #[error("agent {agent_id} is not registered")]
    AgentNotFound {
        /// Requested agent.
        agent_id: AgentId,
    },
    /// The agent is registered but may not perform the request.
    #[error("agent {agent_id} is not active (status: {status})")]
    AgentInactive {
        /// Requested agent.
        agent_id: AgentId,
        /// Current status.
        status: AgentStatus,
    },
    /// The action context is not a JSON object.
    #[error("malformed action context: {reason}")]
    MalformedContext {
        /// Parse failure.
        reason: String,
    },
    /// Report window does not start before it ends.
    #[error("invalid report window: start {start} must be before end {end}")]
    InvalidReportWindow {
        /// Requested start.
        start: DateTime<Utc>,
        /// Requested end.
        end: DateTime<Utc>,
    },
    /// A request field failed validation.
    #[error(transparent)]
    InvalidRequest(gaas_primitives::Error),
    /// A policy payload was rejected.
    #[error(transparent)]
    PolicyValidation(#[from] PolicyValidationError),
    /// A stored rule could not be evaluated, so the action was not cleared.
    #[error(transparent)]
    EvaluationFault(#[from] EvaluationFault),
    /// A policy source could not be read.
    #[error(transparent)]
    Ingest(#[from] IngestError),
    /// Registry failure other than a missing agent.
    #[error(transparent)]
    Registry(RegistryError),
    /// Audit sink could not be prepared.
    #[error(transparent)]
    Audit(#[from] AuditError),
}

impl From<RegistryError> for GovernanceError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(agent_id) => Self::AgentNotFound { agent_id },
            other => Self::Registry(other),
        }
    }
}

impl From<ReportError> for GovernanceError {
    fn from(err: ReportError) -> Self {
        match err {
            ReportError::InvalidWindow { start, end } => Self::InvalidReportWindow { start, end },
        }
    }
}

impl From<gaas_primitives::Error> for GovernanceError {
    fn from(err: gaas_primitives::Error) -> Self {
        match err {
            gaas_primitives::Error::MalformedContext { reason } => Self::MalformedContext { reason },
            other => Self::InvalidRequest(other),
        }
    }
}
