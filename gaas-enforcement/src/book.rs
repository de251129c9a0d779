//! Concurrent map of per-agent compliance state.

use std::sync::Arc;

use dashmap::DashMap;
use gaas_primitives::AgentId;
use parking_lot::Mutex;

use crate::state::AgentComplianceState;

/// Owns every agent's [`AgentComplianceState`].
///
/// Each agent has its own mutex, so decisions for one agent are serialized
/// while different agents proceed in parallel. The map shard lock is released
/// before the agent lock is taken.
#[derive(Debug, Default)]
pub struct AgentStateBook {
    states: DashMap<AgentId, Arc<Mutex<AgentComplianceState>>>,
}

impl AgentStateBook {
    /// Creates an empty book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, agent_id: &AgentId) -> Arc<Mutex<AgentComplianceState>> {
        if let Some(existing) = self.states.get(agent_id) {
            return Arc::clone(existing.value());
        }
        let entry = self
            .states
            .entry(agent_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(AgentComplianceState::new(agent_id.clone()))));
        Arc::clone(entry.value())
    }

    /// Runs `f` with exclusive access to the agent's state, creating it on first use.
    pub(crate) fn with_state<R>(
        &self,
        agent_id: &AgentId,
        f: impl FnOnce(&mut AgentComplianceState) -> R,
    ) -> R {
        let slot = self.slot(agent_id);
        let mut guard = slot.lock();
        f(&mut guard)
    }

    /// Runs `f` on an existing agent's state. Returns `None` for unknown agents.
    pub(crate) fn with_existing<R>(
        &self,
        agent_id: &AgentId,
        f: impl FnOnce(&mut AgentComplianceState) -> R,
    ) -> Option<R> {
        let slot = self.states.get(agent_id).map(|entry| Arc::clone(entry.value()))?;
        let mut guard = slot.lock();
        Some(f(&mut guard))
    }

    /// Copy of the agent's state, if it has any history.
    #[must_use]
    pub fn snapshot(&self, agent_id: &AgentId) -> Option<AgentComplianceState> {
        let slot = self.states.get(agent_id).map(|entry| Arc::clone(entry.value()))?;
        let state = slot.lock().clone();
        Some(state)
    }

    /// Copies of every agent's state, ordered by agent id.
    #[must_use]
    pub fn snapshots(&self) -> Vec<AgentComplianceState> {
        let slots: Vec<_> = self
            .states
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let mut states: Vec<_> = slots.iter().map(|slot| slot.lock().clone()).collect();
        states.sort_by(|a, b| a.agent_id().cmp(b.agent_id()));
        states
    }

    /// Number of agents with history.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Returns `true` when no agent has history.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
