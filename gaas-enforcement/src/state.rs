//! Per-agent compliance history.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use gaas_primitives::{AgentId, Severity};
use serde::{Deserialize, Serialize};

use crate::decision::{DecisionKind, EnforcementDecision};
use crate::engine::EscalationPolicy;

/// Violation counts split by severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    /// `low` violations.
    pub low: u64,
    /// `medium` violations.
    pub medium: u64,
    /// `high` violations.
    pub high: u64,
    /// `critical` violations.
    pub critical: u64,
}

impl SeverityCounts {
    /// Adds one violation of `severity`.
    pub fn add(&mut self, severity: Severity) {
        match severity {
            Severity::Low => self.low += 1,
            Severity::Medium => self.medium += 1,
            Severity::High => self.high += 1,
            Severity::Critical => self.critical += 1,
        }
    }

    /// Returns the count for `severity`.
    #[must_use]
    pub const fn get(&self, severity: Severity) -> u64 {
        match severity {
            Severity::Low => self.low,
            Severity::Medium => self.medium,
            Severity::High => self.high,
            Severity::Critical => self.critical,
        }
    }

    /// Total across severities.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.low + self.medium + self.high + self.critical
    }
}

/// Decision counts split by outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionCounts {
    /// `allow` decisions.
    pub allow: u64,
    /// `warn` decisions.
    pub warn: u64,
    /// `block` decisions.
    pub block: u64,
    /// `suspend` decisions.
    pub suspend: u64,
}

impl DecisionCounts {
    /// Adds one decision of `kind`.
    pub fn add(&mut self, kind: DecisionKind) {
        match kind {
            DecisionKind::Allow => self.allow += 1,
            DecisionKind::Warn => self.warn += 1,
            DecisionKind::Block => self.block += 1,
            DecisionKind::Suspend => self.suspend += 1,
        }
    }

    /// Returns the count for `kind`.
    #[must_use]
    pub const fn get(&self, kind: DecisionKind) -> u64 {
        match kind {
            DecisionKind::Allow => self.allow,
            DecisionKind::Warn => self.warn,
            DecisionKind::Block => self.block,
            DecisionKind::Suspend => self.suspend,
        }
    }

    /// Total decisions.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.allow + self.warn + self.block + self.suspend
    }

    /// Merges another set of counts into this one.
    pub fn merge(&mut self, other: &Self) {
        self.allow += other.allow;
        self.warn += other.warn;
        self.block += other.block;
        self.suspend += other.suspend;
    }
}

/// Compact record of one past decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Time of the decision.
    pub timestamp: DateTime<Utc>,
    /// Outcome.
    pub decision: DecisionKind,
    /// Violations behind the decision.
    pub violations: usize,
    /// How many of them were medium or worse.
    pub medium_or_worse: usize,
    /// Whether the decision came from the fail-closed path.
    pub fault: bool,
}

impl HistoryEntry {
    const fn is_enforcement(&self) -> bool {
        !self.fault && matches!(self.decision, DecisionKind::Block | DecisionKind::Suspend)
    }
}

/// History counters observed inside the trailing window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowStats {
    /// Medium-or-worse violations recorded in the window.
    pub medium_or_worse: usize,
    /// Non-fault block/suspend decisions in the window.
    pub enforcements: usize,
}

/// Running compliance history for one agent.
///
/// Mutated only by [`crate::DecisionEngine`]; everything else sees snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentComplianceState {
    agent_id: AgentId,
    total_actions: u64,
    compliant_actions: u64,
    violating_actions: u64,
    violations: SeverityCounts,
    decisions: DecisionCounts,
    escalation_blocks: u32,
    suspended: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    suspended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    review_after: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_decision_at: Option<DateTime<Utc>>,
    reinstatements: u32,
    history: VecDeque<HistoryEntry>,
}

impl AgentComplianceState {
    /// Creates an empty history for `agent_id`.
    #[must_use]
    pub fn new(agent_id: AgentId) -> Self {
        Self {
            agent_id,
            total_actions: 0,
            compliant_actions: 0,
            violating_actions: 0,
            violations: SeverityCounts::default(),
            decisions: DecisionCounts::default(),
            escalation_blocks: 0,
            suspended: false,
            suspended_at: None,
            review_after: None,
            last_decision_at: None,
            reinstatements: 0,
            history: VecDeque::new(),
        }
    }

    /// Returns the agent.
    #[must_use]
    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    /// Actions decided on.
    #[must_use]
    pub const fn total_actions(&self) -> u64 {
        self.total_actions
    }

    /// Actions not blocked or suspended because of a violation or a fault.
    #[must_use]
    pub const fn compliant_actions(&self) -> u64 {
        self.compliant_actions
    }

    /// Actions with at least one violation.
    #[must_use]
    pub const fn violating_actions(&self) -> u64 {
        self.violating_actions
    }

    /// Violation counts by severity.
    #[must_use]
    pub const fn violations(&self) -> &SeverityCounts {
        &self.violations
    }

    /// Decision counts by outcome.
    #[must_use]
    pub const fn decisions(&self) -> &DecisionCounts {
        &self.decisions
    }

    /// Blocks counted toward suspension since the last reinstatement.
    #[must_use]
    pub const fn escalation_blocks(&self) -> u32 {
        self.escalation_blocks
    }

    /// Whether the agent is suspended.
    #[must_use]
    pub const fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// When the current suspension began.
    #[must_use]
    pub const fn suspended_at(&self) -> Option<DateTime<Utc>> {
        self.suspended_at
    }

    /// Earliest time a manual review of the suspension is suggested.
    #[must_use]
    pub const fn review_after(&self) -> Option<DateTime<Utc>> {
        self.review_after
    }

    /// Time of the latest decision.
    #[must_use]
    pub const fn last_decision_at(&self) -> Option<DateTime<Utc>> {
        self.last_decision_at
    }

    /// Times the agent has been reinstated.
    #[must_use]
    pub const fn reinstatements(&self) -> u32 {
        self.reinstatements
    }

    /// Recent decisions, oldest first, capped at the configured history limit.
    #[must_use]
    pub fn history(&self) -> &VecDeque<HistoryEntry> {
        &self.history
    }

    /// Share of compliant actions; 1.0 before the first action.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn compliance_rate(&self) -> f64 {
        if self.total_actions == 0 {
            1.0
        } else {
            self.compliant_actions as f64 / self.total_actions as f64
        }
    }

    /// Counters over history entries in `(as_of - window, as_of]`.
    #[must_use]
    pub fn window(&self, as_of: DateTime<Utc>, window: Duration) -> WindowStats {
        let since = as_of
            .checked_sub_signed(window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.history
            .iter()
            .filter(|entry| entry.timestamp > since && entry.timestamp <= as_of)
            .fold(WindowStats::default(), |mut stats, entry| {
                stats.medium_or_worse += entry.medium_or_worse;
                if entry.is_enforcement() {
                    stats.enforcements += 1;
                }
                stats
            })
    }

    pub(crate) fn record(&mut self, decision: &EnforcementDecision, escalation: &EscalationPolicy) {
        let kind = decision.decision();
        let at = decision.timestamp();
        let violations = decision.violations();

        self.total_actions += 1;
        if decision.is_compliant() {
            self.compliant_actions += 1;
        }
        if !violations.is_empty() {
            self.violating_actions += 1;
        }
        for violation in violations {
            self.violations.add(violation.severity());
        }
        self.decisions.add(kind);
        if kind == DecisionKind::Block && !decision.is_fault() {
            self.escalation_blocks = self.escalation_blocks.saturating_add(1);
        }
        if kind == DecisionKind::Suspend && !self.suspended {
            self.suspended = true;
            self.suspended_at = Some(at);
            self.review_after = Duration::try_hours(i64::from(escalation.suspension_hours))
                .and_then(|hold| at.checked_add_signed(hold));
        }
        self.last_decision_at = Some(at);

        self.history.push_back(HistoryEntry {
            timestamp: at,
            decision: kind,
            violations: violations.len(),
            medium_or_worse: violations
                .iter()
                .filter(|v| v.severity().is_medium_or_worse())
                .count(),
            fault: decision.is_fault(),
        });
        while self.history.len() > escalation.history_limit {
            self.history.pop_front();
        }
    }

    /// Lifts a suspension. Counters and history are kept; the escalation
    /// block count starts over. Returns `false` when not suspended.
    pub(crate) fn reinstate(&mut self) -> bool {
        if !self.suspended {
            return false;
        }
        self.suspended = false;
        self.suspended_at = None;
        self.review_after = None;
        self.escalation_blocks = 0;
        self.reinstatements += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_counts_accumulate() {
        let mut counts = SeverityCounts::default();
        counts.add(Severity::High);
        counts.add(Severity::High);
        counts.add(Severity::Low);
        assert_eq!(counts.get(Severity::High), 2);
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn fresh_state_is_fully_compliant() {
        let state = AgentComplianceState::new(AgentId::new("agent-1").unwrap());
        assert!((state.compliance_rate() - 1.0).abs() < f64::EPSILON);
        assert!(!state.is_suspended());
        assert!(state.history().is_empty());
    }
}
