//! Governance policies and their evaluation.
//!
//! Policies arrive as [`PolicyDraft`]s, are validated once at upload time and
//! stored as immutable versions in a [`PolicyStore`]. The [`RuleEvaluator`]
//! then matches [`gaas_primitives::ActionRecord`]s against the active set.

#![warn(missing_docs, clippy::pedantic)]

pub mod condition;
pub mod error;
pub mod evaluator;
pub mod ingest;
pub mod model;
pub mod store;

pub use condition::{Condition, HourWindow, MatchFault, NumericRange, Operator, Predicate};
pub use error::{EvaluationFault, FieldError, IngestError, PolicyResult, PolicyValidationError};
pub use evaluator::{RuleEvaluator, Violation};
pub use ingest::{
    DirectoryPolicySource, LoadReport, PolicySource, Rejection, SourcedPayload,
    StaticPolicySource, load_into,
};
pub use model::{
    ApprovalLevel, Policy, PolicyContent, PolicyDraft, PolicyLimits, PolicyScope, PolicyStatus,
    PolicyType, Remediation, Rule, RuleAction,
};
pub use store::{PolicySnapshot, PolicyStore};
