//! Windowed compliance aggregation.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use gaas_enforcement::{DecisionCounts, EnforcementDecision, SeverityCounts};
use gaas_primitives::PolicyId;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::report::{
    ComplianceMetrics, ComplianceReport, PolicyViolationRate, Recommendation, RecommendationCode,
    ReportRequest, ViolationFrequency,
};

/// Thresholds behind the recommendation rules.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// How many descriptions `most_common_violations` lists.
    pub top_violations: usize,
    /// Per-policy violation rate above which the policy should be reviewed.
    pub policy_review_rate: f64,
    /// Compliance rate below which all policies should be reviewed.
    pub min_compliance_rate: f64,
    /// Violation count above which additional training is recommended.
    pub training_violation_threshold: u64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            top_violations: 5,
            policy_review_rate: 0.2,
            min_compliance_rate: 0.9,
            training_violation_threshold: 10,
        }
    }
}

/// Read-only aggregator over historical decisions.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComplianceAggregator {
    config: ReportConfig,
}

/// Frequency table that remembers first-seen order for tie breaking.
#[derive(Default)]
struct Tally {
    index: HashMap<String, usize>,
    entries: Vec<(String, u64)>,
}

impl Tally {
    fn add(&mut self, key: &str) {
        if let Some(&slot) = self.index.get(key) {
            self.entries[slot].1 += 1;
        } else {
            self.index.insert(key.to_owned(), self.entries.len());
            self.entries.push((key.to_owned(), 1));
        }
    }

    /// Entries by descending count; equal counts keep first-seen order.
    fn ranked(mut self) -> Vec<(String, u64)> {
        self.entries.sort_by(|a, b| b.1.cmp(&a.1));
        self.entries
    }
}

impl ComplianceAggregator {
    /// Creates an aggregator.
    #[must_use]
    pub const fn new(config: ReportConfig) -> Self {
        Self { config }
    }

    /// Returns the thresholds in use.
    #[must_use]
    pub const fn config(&self) -> &ReportConfig {
        &self.config
    }

    /// Computes headline metrics over `decisions` (already filtered).
    ///
    /// A decision counts as compliant unless it blocked or suspended because
    /// of a violation or an evaluation fault. A window without violations or
    /// faults has a rate of exactly 1.0.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn metrics<'a>(
        &self,
        decisions: impl IntoIterator<Item = &'a EnforcementDecision>,
    ) -> ComplianceMetrics {
        let mut metrics = ComplianceMetrics::default();
        let mut by_kind = DecisionCounts::default();
        let mut by_severity = SeverityCounts::default();

        for decision in decisions {
            metrics.total_actions += 1;
            by_kind.add(decision.decision());
            let violations = decision.violations();
            if decision.is_compliant() {
                metrics.compliant_actions += 1;
            }
            metrics.violations += violations.len() as u64;
            for violation in violations {
                by_severity.add(violation.severity());
            }
        }

        metrics.compliance_rate = if metrics.total_actions == 0 {
            0.0
        } else {
            metrics.compliant_actions as f64 / metrics.total_actions as f64
        };
        metrics.decisions = by_kind;
        metrics.violations_by_severity = by_severity;
        metrics
    }

    /// Builds a report for `request` from the full decision history.
    ///
    /// Decisions outside the window, or for other agents when the request is
    /// filtered, are ignored. The input is never modified.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn report(
        &self,
        request: &ReportRequest,
        decisions: &[EnforcementDecision],
        generated_at: DateTime<Utc>,
    ) -> ComplianceReport {
        let selected: Vec<&EnforcementDecision> = decisions
            .iter()
            .filter(|d| request.window.contains(d.timestamp()))
            .filter(|d| request.agent_id.as_ref().is_none_or(|agent| d.agent_id() == agent))
            .collect();

        let metrics = self.metrics(selected.iter().copied());

        let mut descriptions = Tally::default();
        let mut types = Tally::default();
        let mut per_policy: BTreeMap<PolicyId, u64> = BTreeMap::new();
        for decision in &selected {
            let mut touched = BTreeSet::new();
            for violation in decision.violations() {
                descriptions.add(violation.description());
                types.add(violation.violation_type());
                touched.insert(violation.policy_id().clone());
            }
            for policy_id in touched {
                *per_policy.entry(policy_id).or_default() += 1;
            }
        }

        let most_common_violations: Vec<ViolationFrequency> = descriptions
            .ranked()
            .into_iter()
            .take(self.config.top_violations)
            .map(|(description, count)| ViolationFrequency { description, count })
            .collect();

        let policy_violation_rates: Vec<PolicyViolationRate> = per_policy
            .into_iter()
            .map(|(policy_id, violating_actions)| PolicyViolationRate {
                policy_id,
                violating_actions,
                rate: violating_actions as f64 / metrics.total_actions as f64,
            })
            .collect();

        let top_type = types.ranked().into_iter().next().map(|(label, _)| label);
        let recommendations = self.recommendations(&metrics, top_type.as_deref(), &policy_violation_rates);

        let detailed_violations = request.include_violations.then(|| {
            selected
                .iter()
                .flat_map(|d| d.violations().iter().cloned())
                .collect()
        });

        debug!(
            agent_id = ?request.agent_id.as_ref().map(ToString::to_string),
            decisions = metrics.total_actions,
            violations = metrics.violations,
            "compliance report aggregated"
        );

        ComplianceReport {
            report_id: report_id(generated_at),
            agent_id: request.agent_id.clone(),
            period_start: request.window.start(),
            period_end: request.window.end(),
            generated_at,
            metrics,
            most_common_violations,
            policy_violation_rates,
            recommendations,
            detailed_violations,
        }
    }

    fn recommendations(
        &self,
        metrics: &ComplianceMetrics,
        top_type: Option<&str>,
        rates: &[PolicyViolationRate],
    ) -> Vec<Recommendation> {
        let mut out = Vec::new();
        if metrics.total_actions > 0 && metrics.compliance_rate < self.config.min_compliance_rate {
            out.push(Recommendation {
                code: RecommendationCode::ReviewPolicies,
                message: "Consider reviewing and updating policies".to_owned(),
            });
        }
        if metrics.violations > self.config.training_violation_threshold {
            out.push(Recommendation {
                code: RecommendationCode::AdditionalTraining,
                message: "Implement additional agent training".to_owned(),
            });
        }
        if let Some(label) = top_type {
            out.push(Recommendation {
                code: RecommendationCode::FocusViolationType,
                message: format!("Focus on addressing {label} violations"),
            });
        }
        for rate in rates {
            if rate.rate > self.config.policy_review_rate {
                out.push(Recommendation {
                    code: RecommendationCode::ReviewPolicy,
                    message: format!(
                        "Review policy {}: {:.1}% of actions violated it",
                        rate.policy_id,
                        rate.rate * 100.0
                    ),
                });
            }
        }
        out
    }
}

fn report_id(generated_at: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "RPT_{}_{}",
        generated_at.format("%Y%m%d%H%M%S"),
        &suffix[..8]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ReportWindow;
    use chrono::{Duration, TimeZone};
    use gaas_enforcement::{DecisionEngine, DecisionKind};
    use gaas_policy::Violation;
    use gaas_primitives::{ActionRecord, ActionType, AgentId, Severity};
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap()
    }

    fn window() -> ReportWindow {
        ReportWindow::new(t0(), t0() + Duration::days(1)).unwrap()
    }

    /// Produces decisions through a real engine, one per entry, each for its own agent
    /// so history does not escalate unless `same_agent` is set.
    fn decisions(entries: &[(&str, Vec<(&str, &str, Severity)>)], same_agent: bool) -> Vec<EnforcementDecision> {
        let engine = DecisionEngine::default();
        entries
            .iter()
            .enumerate()
            .map(|(i, (agent, violations))| {
                let agent = if same_agent { (*agent).to_owned() } else { format!("{agent}-{i}") };
                let action = ActionRecord::builder(AgentId::new(agent).unwrap(), ActionType::DataAccess, "read")
                    .timestamp(t0() + Duration::minutes(i64::try_from(i).unwrap()))
                    .build()
                    .unwrap();
                let violations = violations
                    .iter()
                    .map(|(policy, description, severity)| {
                        Violation::new(action.id(), PolicyId::new(*policy).unwrap(), 1, 0, *severity, *description)
                    })
                    .collect();
                engine.enforce(&action, Ok(violations))
            })
            .collect()
    }

    #[test]
    fn empty_window_has_zero_rate() {
        let report = ComplianceAggregator::default().report(&ReportRequest::new(window()), &[], t0());
        assert_eq!(report.metrics.total_actions, 0);
        assert!(report.metrics.compliance_rate.abs() < f64::EPSILON);
        assert!(report.recommendations.is_empty());
    }

    #[test]
    fn metrics_and_rankings() {
        let history = decisions(
            &[
                ("agent", vec![]),
                ("agent", vec![("P2", "vault read", Severity::High)]),
                ("agent", vec![("P1", "pii export", Severity::Low), ("P2", "vault read", Severity::Medium)]),
                ("agent", vec![("P1", "pii export", Severity::Low)]),
                ("agent", vec![("P3", "after hours", Severity::Low)]),
            ],
            false,
        );
        let report = ComplianceAggregator::default().report(
            &ReportRequest::new(window()).with_violations(),
            &history,
            t0() + Duration::days(2),
        );

        assert_eq!(report.metrics.total_actions, 5);
        assert_eq!(report.metrics.compliant_actions, 4);
        assert_eq!(report.metrics.violations, 5);
        assert_eq!(report.metrics.decisions.get(DecisionKind::Block), 1);
        assert!((report.metrics.compliance_rate - 0.8).abs() < 1e-9);

        let top: Vec<_> = report
            .most_common_violations
            .iter()
            .map(|f| (f.description.as_str(), f.count))
            .collect();
        assert_eq!(top, vec![("vault read", 2), ("pii export", 2), ("after hours", 1)]);

        let rates: Vec<_> = report
            .policy_violation_rates
            .iter()
            .map(|r| (r.policy_id.to_string(), r.violating_actions))
            .collect();
        assert_eq!(rates, vec![("P1".into(), 2), ("P2".into(), 2), ("P3".into(), 1)]);

        let codes: Vec<_> = report.recommendations.iter().map(|r| r.code).collect();
        assert_eq!(
            codes,
            vec![
                RecommendationCode::ReviewPolicies,
                RecommendationCode::FocusViolationType,
                RecommendationCode::ReviewPolicy,
                RecommendationCode::ReviewPolicy,
            ]
        );
        assert_eq!(report.recommendations[1].message, "Focus on addressing policy_violation violations");
        assert_eq!(report.detailed_violations.as_ref().map(Vec::len), Some(5));
    }

    #[test]
    fn agent_filter_and_window_bounds() {
        let mut history = decisions(&[("alpha", vec![]), ("beta", vec![("P1", "x", Severity::High)])], true);
        let late = decisions(&[("alpha", vec![])], true);
        let shifted = ActionRecord::builder(AgentId::new("alpha").unwrap(), ActionType::DataAccess, "read")
            .timestamp(t0() + Duration::days(3))
            .build()
            .unwrap();
        history.extend(late);
        history.push(DecisionEngine::default().enforce(&shifted, Ok(Vec::new())));

        let request = ReportRequest::new(window()).for_agent(AgentId::new("alpha").unwrap());
        let report = ComplianceAggregator::default().report(&request, &history, t0());
        assert_eq!(report.metrics.total_actions, 2);
        assert!((report.metrics.compliance_rate - 1.0).abs() < f64::EPSILON);
        assert!(report.detailed_violations.is_none());
    }

    #[test]
    fn fault_blocks_count_against_compliance() {
        let engine = DecisionEngine::default();
        let history: Vec<_> = (0..4)
            .map(|step| {
                let action = ActionRecord::builder(AgentId::new("agent-f").unwrap(), ActionType::DataAccess, "read")
                    .timestamp(t0() + Duration::minutes(step))
                    .build()
                    .unwrap();
                let fault = gaas_policy::EvaluationFault {
                    policy_id: "P9".into(),
                    policy_version: 1,
                    rule_index: 0,
                    reason: "`range` bounds must be numbers".into(),
                };
                engine.enforce(&action, Err(fault))
            })
            .collect();
        assert!(history.iter().all(|d| d.decision() == DecisionKind::Block && !d.is_compliant()));

        let report = ComplianceAggregator::default().report(&ReportRequest::new(window()), &history, t0());
        assert_eq!(report.metrics.total_actions, 4);
        assert_eq!(report.metrics.compliant_actions, 0);
        assert_eq!(report.metrics.violations, 0);
        assert!(report.metrics.compliance_rate.abs() < f64::EPSILON);

        let state = engine.state(&AgentId::new("agent-f").unwrap()).unwrap();
        assert_eq!(state.compliant_actions(), 0);
        assert_eq!(state.escalation_blocks(), 0);
    }

    #[test]
    fn report_id_format() {
        let id = report_id(Utc.with_ymd_and_hms(2025, 7, 1, 13, 5, 9).unwrap());
        assert!(id.starts_with("RPT_20250701130509_"));
        let suffix = id.rsplit('_').next().unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    proptest! {
        #[test]
        fn rate_is_bounded_and_exact_without_violations(
            shape in prop::collection::vec(prop::collection::vec(prop::sample::select(Severity::ALL.to_vec()), 0..3), 1..20),
        ) {
            let entries: Vec<(&str, Vec<(&str, &str, Severity)>)> = shape
                .iter()
                .map(|severities| ("agent", severities.iter().map(|s| ("P1", "rule", *s)).collect()))
                .collect();
            let history = decisions(&entries, true);
            let metrics = ComplianceAggregator::default().metrics(&history);

            prop_assert!((0.0..=1.0).contains(&metrics.compliance_rate));
            if metrics.violations == 0 {
                prop_assert!((metrics.compliance_rate - 1.0).abs() < f64::EPSILON);
            }
        }
    }
}
