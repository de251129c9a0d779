//! Errors surfaced by policy validation and evaluation.

use std::fmt::{self, Display, Formatter};

use thiserror::Error;

/// A single field-level validation problem.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FieldError {
    /// Path of the offending field, e.g. `policy_content.rules[0].condition.value`.
    pub field: String,
    /// Human-readable description of the problem.
    pub message: String,
}

impl FieldError {
    /// Creates a field error.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl Display for FieldError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// A policy payload was rejected at upload time.
///
/// Every problem found is reported, not only the first.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("policy `{policy_id}` failed validation: {}", join_errors(.errors))]
pub struct PolicyValidationError {
    /// Identifier as supplied by the caller (may itself be invalid).
    pub policy_id: String,
    /// Field-level problems.
    pub errors: Vec<FieldError>,
}

impl PolicyValidationError {
    /// Creates a validation error carrying a single field problem.
    #[must_use]
    pub fn single(
        policy_id: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            policy_id: policy_id.into(),
            errors: vec![FieldError::new(field, message)],
        }
    }

    /// Returns the rendered messages, one per field problem.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }
}

fn join_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result alias for policy upload operations.
pub type PolicyResult<T> = Result<T, PolicyValidationError>;

/// An internal invariant was violated while evaluating a rule.
///
/// Rules are validated at upload time, so this only fires when a malformed
/// condition reached the evaluator some other way. Callers must fail closed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("evaluation fault in policy `{policy_id}` v{policy_version} rule #{rule_index}: {reason}")]
pub struct EvaluationFault {
    /// Policy whose rule could not be evaluated.
    pub policy_id: String,
    /// Version of that policy.
    pub policy_version: u32,
    /// Zero-based index of the rule within the policy.
    pub rule_index: usize,
    /// Description of the violated invariant.
    pub reason: String,
}

/// Errors raised while loading policy payloads from a source.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Underlying I/O failure while reading a policy source.
    #[error("i/o error: {source}")]
    Io {
        /// Source [`std::io::Error`].
        #[from]
        source: std::io::Error,
    },
    /// Payload could not be decoded.
    #[error("malformed policy payload: {source}")]
    Decode {
        /// Source [`serde_json::Error`].
        #[from]
        source: serde_json::Error,
    },
    /// Source backend reported an application error.
    #[error("policy source error: {reason}")]
    Backend {
        /// Human-readable reason describing the failure.
        reason: String,
    },
}

impl IngestError {
    /// Helper to construct backend errors from string-like values.
    #[must_use]
    pub fn backend(reason: impl Into<String>) -> Self {
        Self::Backend {
            reason: reason.into(),
        }
    }
}
