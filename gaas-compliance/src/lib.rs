//! Compliance reporting over recorded enforcement decisions.
//!
//! Reports are computed on demand from the decision history; nothing here
//! mutates that history.

#![warn(missing_docs, clippy::pedantic)]

mod aggregator;
mod error;
mod report;

pub use aggregator::{ComplianceAggregator, ReportConfig};
pub use error::{ReportError, ReportResult};
pub use report::{
    ComplianceMetrics, ComplianceReport, PolicyViolationRate, Recommendation, RecommendationCode,
    ReportRequest, ReportWindow, ViolationFrequency,
};
