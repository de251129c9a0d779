//! Errors raised while building compliance reports.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result alias for report operations.
pub type ReportResult<T> = Result<T, ReportError>;

/// Errors raised while building compliance reports.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReportError {
    /// The window does not start before it ends.
    #[error("report window start {start} must be before end {end}")]
    InvalidWindow {
        /// Requested start.
        start: DateTime<Utc>,
        /// Requested end.
        end: DateTime<Utc>,
    },
}
