//! Shared error definitions for governance primitives.

use thiserror::Error;

/// Result alias used throughout the governance runtime.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while constructing primitive governance types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// The provided agent identifier failed validation.
    #[error("invalid agent id `{id}`: {reason}")]
    InvalidAgentId {
        /// The offending identifier string.
        id: String,
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// The provided policy identifier failed validation.
    #[error("invalid policy id `{id}`: {reason}")]
    InvalidPolicyId {
        /// The offending identifier string.
        id: String,
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Action context could not be interpreted as structured data.
    #[error("malformed action context: {reason}")]
    MalformedContext {
        /// Human-readable reason describing the parse failure.
        reason: String,
    },

    /// Action record failed validation.
    #[error("invalid action record: {reason}")]
    InvalidAction {
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Agent registration failed validation.
    #[error("invalid agent registration: {reason}")]
    InvalidRegistration {
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// A severity or action type label was not recognised.
    #[error("unknown {kind} `{value}`")]
    UnknownLabel {
        /// Which vocabulary the label was parsed against.
        kind: &'static str,
        /// The unrecognised label.
        value: String,
    },
}
