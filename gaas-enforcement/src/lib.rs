//! Enforcement decisions for governed agents.
//!
//! The [`DecisionEngine`] turns the violations found for one action, plus the
//! submitting agent's history, into an [`EnforcementDecision`]. It owns that
//! history: every decision, including `allow`, is recorded in the agent's
//! [`AgentComplianceState`] under a per-agent lock.

#![warn(missing_docs, clippy::pedantic)]

mod book;
mod constraints;
mod decision;
mod engine;
mod state;

pub use book::AgentStateBook;
pub use constraints::{AdditionalConstraints, ConstraintEntry, ConstraintTable};
pub use decision::{DecisionKind, DecisionTrigger, EnforcementDecision, FAULT_REASONING};
pub use engine::{DecisionEngine, EnforcementStatistics, EscalationPolicy};
pub use state::{AgentComplianceState, DecisionCounts, HistoryEntry, SeverityCounts, WindowStats};
