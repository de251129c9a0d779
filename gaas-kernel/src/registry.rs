//! Agent registry seam and the in-process implementation.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use gaas_primitives::{AgentId, AgentRegistration};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::lifecycle::{AgentStatus, LifecycleError, StatusEvent};

/// Result alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors surfaced by registry backends.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// An agent with the same id is already registered.
    #[error("agent {0} is already registered")]
    Duplicate(AgentId),
    /// No agent with the id is registered.
    #[error("agent {0} is not registered")]
    NotFound(AgentId),
    /// The requested status change is not allowed.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    /// Registry backend failure.
    #[error("registry backend error: {reason}")]
    Backend {
        /// Human-readable context provided by the backend.
        reason: String,
    },
}

impl RegistryError {
    /// Convenience helper to construct backend errors.
    #[must_use]
    pub fn backend(reason: impl Into<String>) -> Self {
        Self::Backend {
            reason: reason.into(),
        }
    }
}

/// A registration plus its current status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredAgent {
    /// Submitted registration.
    pub registration: AgentRegistration,
    /// Current status.
    pub status: AgentStatus,
    /// When the agent was registered.
    pub registered_at: DateTime<Utc>,
    /// When the status last changed.
    pub status_changed_at: DateTime<Utc>,
}

impl RegisteredAgent {
    /// Returns the agent identifier.
    #[must_use]
    pub fn agent_id(&self) -> &AgentId {
        self.registration.agent_id()
    }
}

/// Trait implemented by agent registry backends.
#[async_trait]
pub trait AgentRegistry: Send + Sync {
    /// Stores a new registration with status `active`.
    async fn register(
        &self,
        registration: AgentRegistration,
        at: DateTime<Utc>,
    ) -> RegistryResult<RegisteredAgent>;

    /// Looks up an agent.
    async fn get(&self, agent_id: &AgentId) -> RegistryResult<RegisteredAgent>;

    /// Applies a status event and returns the updated agent.
    async fn transition(
        &self,
        agent_id: &AgentId,
        event: StatusEvent,
        at: DateTime<Utc>,
    ) -> RegistryResult<RegisteredAgent>;

    /// Lists every registered agent, ordered by id.
    async fn list(&self) -> RegistryResult<Vec<RegisteredAgent>>;

    /// Returns whether the agent is currently `active`.
    async fn is_active(&self, agent_id: &AgentId) -> RegistryResult<bool> {
        Ok(self.get(agent_id).await?.status.is_active())
    }
}

/// Registry held in process memory.
#[derive(Default)]
pub struct InMemoryAgentRegistry {
    agents: DashMap<AgentId, RegisteredAgent>,
}

impl InMemoryAgentRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl fmt::Debug for InMemoryAgentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryAgentRegistry")
            .field("agents", &self.agents.len())
            .finish()
    }
}

#[async_trait]
impl AgentRegistry for InMemoryAgentRegistry {
    async fn register(
        &self,
        registration: AgentRegistration,
        at: DateTime<Utc>,
    ) -> RegistryResult<RegisteredAgent> {
        match self.agents.entry(registration.agent_id().clone()) {
            Entry::Occupied(entry) => Err(RegistryError::Duplicate(entry.key().clone())),
            Entry::Vacant(entry) => {
                let agent = RegisteredAgent {
                    registration,
                    status: AgentStatus::Active,
                    registered_at: at,
                    status_changed_at: at,
                };
                info!(
                    agent_id = %agent.agent_id(),
                    agent_type = agent.registration.agent_type(),
                    "agent registered"
                );
                entry.insert(agent.clone());
                Ok(agent)
            }
        }
    }

    async fn get(&self, agent_id: &AgentId) -> RegistryResult<RegisteredAgent> {
        self.agents
            .get(agent_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RegistryError::NotFound(agent_id.clone()))
    }

    async fn transition(
        &self,
        agent_id: &AgentId,
        event: StatusEvent,
        at: DateTime<Utc>,
    ) -> RegistryResult<RegisteredAgent> {
        let mut entry = self
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| RegistryError::NotFound(agent_id.clone()))?;
        entry.status = entry.status.transition(agent_id, event)?;
        entry.status_changed_at = at;
        Ok(entry.clone())
    }

    async fn list(&self) -> RegistryResult<Vec<RegisteredAgent>> {
        let mut agents: Vec<RegisteredAgent> =
            self.agents.iter().map(|entry| entry.value().clone()).collect();
        agents.sort_by(|a, b| a.agent_id().cmp(b.agent_id()));
        Ok(agents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(id: &str) -> AgentRegistration {
        AgentRegistration::builder(AgentId::new(id).unwrap())
            .name("Ledger bot")
            .unwrap()
            .agent_type("data_processor")
            .unwrap()
            .add_capability("read")
            .unwrap()
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn register_and_lookup() {
        let registry = InMemoryAgentRegistry::new();
        let agent = registry.register(registration("agent-a"), Utc::now()).await.unwrap();
        assert_eq!(agent.status, AgentStatus::Active);
        assert!(registry.is_active(agent.agent_id()).await.unwrap());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let registry = InMemoryAgentRegistry::new();
        registry.register(registration("agent-a"), Utc::now()).await.unwrap();
        let err = registry
            .register(registration("agent-a"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Duplicate(_)));
    }

    #[tokio::test]
    async fn transitions_follow_the_lifecycle() {
        let registry = InMemoryAgentRegistry::new();
        let id = AgentId::new("agent-b").unwrap();
        registry.register(registration("agent-b"), Utc::now()).await.unwrap();

        let agent = registry
            .transition(&id, StatusEvent::Suspend, Utc::now())
            .await
            .unwrap();
        assert_eq!(agent.status, AgentStatus::Suspended);

        let err = registry
            .transition(&id, StatusEvent::Deactivate, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Lifecycle(_)));

        let missing = registry
            .get(&AgentId::new("nobody").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(missing, RegistryError::NotFound(_)));
    }
}
