//! Governance kernel: the operations exposed to the request-handling layer.
//!
//! [`GovernanceKernel`] owns the wiring between the agent registry, the
//! versioned policy store, the rule evaluator, the decision engine, and the
//! audit sinks. Every collaborator is injected through
//! [`GovernanceKernelBuilder`]; nothing here is process-global.

#![warn(missing_docs, clippy::pedantic)]

mod contracts;
mod error;
mod kernel;
mod lifecycle;
mod registry;

pub use contracts::{
    ActionReceipt, ActionSubmission, ContextInput, DecisionRequest, HealthSnapshot,
    PolicyUploadReceipt,
};
pub use error::{GovernanceError, GovernanceResult};
pub use kernel::{Clock, GovernanceKernel, GovernanceKernelBuilder, SystemClock};
pub use lifecycle::{AgentStatus, LifecycleError, LifecycleResult, StatusEvent};
pub use registry::{
    AgentRegistry, InMemoryAgentRegistry, RegisteredAgent, RegistryError, RegistryResult,
};
