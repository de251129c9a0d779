//! Core shared types for the agent governance runtime.

#![warn(missing_docs, clippy::pedantic)]

mod action;
mod error;
mod ids;
mod registration;
mod severity;

/// Immutable action records and their structured context.
pub use action::{ActionContext, ActionRecord, ActionRecordBuilder};
/// Error type and result alias shared across the runtime.
pub use error::{Error, Result};
/// Identifiers for agents, policies, and actions.
pub use ids::{ActionId, AgentId, PolicyId};
/// Agent registration metadata.
pub use registration::{AgentRegistration, AgentRegistrationBuilder};
/// Ordered severity and action classification vocabularies.
pub use severity::{ActionType, Severity};
