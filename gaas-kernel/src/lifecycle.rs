//! Registration status state machine for governed agents.

use std::fmt;

use gaas_primitives::AgentId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Registry status of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// May submit actions and request decisions.
    Active,
    /// Deactivated by its operator; requests are rejected.
    Inactive,
    /// Suspended by enforcement until reinstated.
    Suspended,
}

impl AgentStatus {
    /// Returns the wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Suspended => "suspended",
        }
    }

    /// Returns `true` for [`AgentStatus::Active`].
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }

    /// Applies `event`, returning the resulting status.
    ///
    /// Allowed: `active ⇄ inactive`, `active → suspended`, `suspended → active`.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidTransition`] for any other pair.
    pub fn transition(self, agent_id: &AgentId, event: StatusEvent) -> LifecycleResult<Self> {
        let next = match (self, event) {
            (Self::Active, StatusEvent::Deactivate) => Self::Inactive,
            (Self::Inactive, StatusEvent::Activate) | (Self::Suspended, StatusEvent::Reinstate) => {
                Self::Active
            }
            (Self::Active, StatusEvent::Suspend) => Self::Suspended,
            _ => {
                return Err(LifecycleError::InvalidTransition {
                    agent_id: agent_id.clone(),
                    from: self,
                    event,
                });
            }
        };

        debug!(
            agent_id = %agent_id,
            from = self.as_str(),
            to = next.as_str(),
            ?event,
            "agent status transition"
        );
        Ok(next)
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events that move an agent between statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusEvent {
    /// Operator re-enables an inactive agent.
    Activate,
    /// Operator disables an active agent.
    Deactivate,
    /// Enforcement suspends an active agent.
    Suspend,
    /// External reinstatement of a suspended agent.
    Reinstate,
}

/// Errors emitted by the status state machine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LifecycleError {
    /// Transition was not permitted from the current status.
    #[error("invalid status transition from {from} via {event:?} for agent {agent_id}")]
    InvalidTransition {
        /// Identifier of the agent whose transition failed.
        agent_id: AgentId,
        /// Status prior to the attempted transition.
        from: AgentStatus,
        /// Event that triggered the failure.
        event: StatusEvent,
    },
}

/// Result alias used for lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> AgentId {
        AgentId::new("lifecycle-agent").unwrap()
    }

    #[test]
    fn deactivate_and_activate() {
        let status = AgentStatus::Active
            .transition(&id(), StatusEvent::Deactivate)
            .unwrap();
        assert_eq!(status, AgentStatus::Inactive);
        let status = status.transition(&id(), StatusEvent::Activate).unwrap();
        assert!(status.is_active());
    }

    #[test]
    fn suspend_and_reinstate() {
        let status = AgentStatus::Active
            .transition(&id(), StatusEvent::Suspend)
            .unwrap();
        assert_eq!(status, AgentStatus::Suspended);
        let status = status.transition(&id(), StatusEvent::Reinstate).unwrap();
        assert_eq!(status, AgentStatus::Active);
    }

    #[test]
    fn invalid_transitions_error() {
        for (from, event) in [
            (AgentStatus::Inactive, StatusEvent::Suspend),
            (AgentStatus::Suspended, StatusEvent::Activate),
            (AgentStatus::Suspended, StatusEvent::Deactivate),
            (AgentStatus::Active, StatusEvent::Reinstate),
            (AgentStatus::Active, StatusEvent::Activate),
        ] {
            let err = from.transition(&id(), event).unwrap_err();
            assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
        }
    }
}
