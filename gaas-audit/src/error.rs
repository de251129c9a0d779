//! Error types for the audit subsystem.

use std::path::PathBuf;

use serde_json::Error as SerdeError;
use thiserror::Error;

/// Errors emitted by audit components.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Underlying I/O failure while reading or writing journal files.
    #[error("i/o error: {source}")]
    Io {
        /// Source [`std::io::Error`].
        #[from]
        source: std::io::Error,
    },
    /// Serialization or deserialization error.
    #[error("serialization error: {source}")]
    Serialization {
        /// Source [`serde_json::Error`].
        #[from]
        source: SerdeError,
    },
    /// A journal line could not be decoded.
    #[error("corrupt journal entry at {}:{line}: {source}", path.display())]
    CorruptLine {
        /// Journal file.
        path: PathBuf,
        /// One-based line number.
        line: usize,
        /// Decoder error.
        source: SerdeError,
    },
    /// Ledger configuration was rejected.
    #[error("invalid ledger configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Result type alias for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;
