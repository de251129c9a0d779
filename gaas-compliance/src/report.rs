//! Report request and result types.

use chrono::{DateTime, Utc};
use gaas_enforcement::{DecisionCounts, SeverityCounts};
use gaas_policy::Violation;
use gaas_primitives::{AgentId, PolicyId};
use serde::{Deserialize, Serialize};

use crate::error::{ReportError, ReportResult};

/// Half-open reporting window `[start, end)`.
///
/// Deserialization goes through [`ReportWindow::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WindowBounds")]
pub struct ReportWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Deserialize)]
struct WindowBounds {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TryFrom<WindowBounds> for ReportWindow {
    type Error = ReportError;

    fn try_from(bounds: WindowBounds) -> ReportResult<Self> {
        Self::new(bounds.start, bounds.end)
    }
}

impl ReportWindow {
    /// Creates a window.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::InvalidWindow`] unless `start < end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> ReportResult<Self> {
        if start >= end {
            return Err(ReportError::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    /// Inclusive start.
    #[must_use]
    pub const fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Exclusive end.
    #[must_use]
    pub const fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Returns `true` when `at` lies in the window.
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

/// What to report on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRequest {
    /// Reporting window.
    pub window: ReportWindow,
    /// Restrict to one agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    /// Attach every violation in the window to the report.
    #[serde(default)]
    pub include_violations: bool,
}

impl ReportRequest {
    /// Requests a fleet-wide summary over `window`.
    #[must_use]
    pub const fn new(window: ReportWindow) -> Self {
        Self {
            window,
            agent_id: None,
            include_violations: false,
        }
    }

    /// Restricts the report to `agent_id`.
    #[must_use]
    pub fn for_agent(mut self, agent_id: AgentId) -> Self {
        self.agent_id = Some(agent_id);
        self
    }

    /// Attaches violation details.
    #[must_use]
    pub const fn with_violations(mut self) -> Self {
        self.include_violations = true;
        self
    }
}

/// Headline numbers for a window.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ComplianceMetrics {
    /// Decisions in the window.
    pub total_actions: u64,
    /// Decisions that did not block or suspend because of a violation.
    pub compliant_actions: u64,
    /// Violations attached to those decisions.
    pub violations: u64,
    /// `compliant_actions / total_actions`; 0 for an empty window.
    pub compliance_rate: f64,
    /// Decisions by outcome.
    pub decisions: DecisionCounts,
    /// Violations by severity.
    pub violations_by_severity: SeverityCounts,
}

/// How often one violation description occurred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationFrequency {
    /// Rule description.
    pub description: String,
    /// Occurrences in the window.
    pub count: u64,
}

/// Share of actions that violated a given policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyViolationRate {
    /// Policy.
    pub policy_id: PolicyId,
    /// Actions with at least one violation of the policy.
    pub violating_actions: u64,
    /// `violating_actions / total_actions`.
    pub rate: f64,
}

/// Machine-readable category of a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationCode {
    /// Overall compliance fell below the configured floor.
    ReviewPolicies,
    /// Violation volume exceeded the training threshold.
    AdditionalTraining,
    /// One violation type dominates.
    FocusViolationType,
    /// A single policy is violated unusually often.
    ReviewPolicy,
}

/// One deterministic recommendation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Category.
    pub code: RecommendationCode,
    /// Rendered text.
    pub message: String,
}

/// Output of [`crate::ComplianceAggregator::report`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    /// `RPT_<yyyymmddHHMMSS>_<8 hex>`.
    pub report_id: String,
    /// Agent filter, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    /// Start of the window.
    pub period_start: DateTime<Utc>,
    /// End of the window.
    pub period_end: DateTime<Utc>,
    /// Generation time.
    pub generated_at: DateTime<Utc>,
    /// Headline numbers.
    pub metrics: ComplianceMetrics,
    /// Top violation descriptions by frequency.
    pub most_common_violations: Vec<ViolationFrequency>,
    /// Per-policy violation rates, by policy id.
    pub policy_violation_rates: Vec<PolicyViolationRate>,
    /// Deterministic recommendations.
    pub recommendations: Vec<Recommendation>,
    /// Every violation in the window, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detailed_violations: Option<Vec<Violation>>,
}
