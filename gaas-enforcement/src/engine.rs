//! The enforcement decision matrix.

use chrono::{DateTime, Duration, Utc};
use gaas_policy::{EvaluationFault, Violation};
use gaas_primitives::{ActionRecord, AgentId, Severity};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::book::AgentStateBook;
use crate::constraints::ConstraintTable;
use crate::decision::{DecisionKind, DecisionTrigger, EnforcementDecision, FAULT_REASONING};
use crate::state::{AgentComplianceState, DecisionCounts};

/// Thresholds that turn history into escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationPolicy {
    /// Length of the trailing window, in seconds.
    pub trailing_window_secs: u64,
    /// Prior medium-or-worse violations in the window that force `block`.
    pub repeated_violation_threshold: usize,
    /// Cumulative blocks that force `suspend`.
    pub suspension_block_threshold: u32,
    /// History entries kept per agent.
    pub history_limit: usize,
    /// Suggested suspension length before review.
    pub suspension_hours: u32,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            trailing_window_secs: 7 * 24 * 60 * 60,
            repeated_violation_threshold: 2,
            suspension_block_threshold: 3,
            history_limit: 100,
            suspension_hours: 24,
        }
    }
}

impl EscalationPolicy {
    /// Trailing window as a duration.
    #[must_use]
    pub fn trailing_window(&self) -> Duration {
        i64::try_from(self.trailing_window_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX)
    }
}

/// Aggregate view over every agent's decisions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnforcementStatistics {
    /// Decisions issued.
    pub total_decisions: u64,
    /// Decisions by outcome.
    pub decisions: DecisionCounts,
    /// Agents with at least one decision.
    pub agents_tracked: usize,
    /// Agents currently suspended.
    pub suspended_agents: usize,
}

/// Turns violations plus history into decisions, and owns that history.
#[derive(Debug, Default)]
pub struct DecisionEngine {
    escalation: EscalationPolicy,
    constraints: ConstraintTable,
    book: AgentStateBook,
}

impl DecisionEngine {
    /// Creates an engine with the default constraint table.
    #[must_use]
    pub fn new(escalation: EscalationPolicy) -> Self {
        Self {
            escalation,
            constraints: ConstraintTable::default(),
            book: AgentStateBook::new(),
        }
    }

    /// Replaces the constraint table.
    #[must_use]
    pub fn with_constraints(mut self, constraints: ConstraintTable) -> Self {
        self.constraints = constraints;
        self
    }

    /// Returns the escalation thresholds.
    #[must_use]
    pub const fn escalation(&self) -> &EscalationPolicy {
        &self.escalation
    }

    /// Applies the decision matrix. Pure: reads `state`, never mutates it.
    ///
    /// The outcome is the most restrictive applicable one:
    /// a suspended agent is always suspended; without violations the action is
    /// allowed; otherwise the worst severity sets a floor (low/medium warn,
    /// high block, critical suspend), which repeated medium-or-worse
    /// violations or prior enforcement in the trailing window raise to block,
    /// and the cumulative block count raises to suspend.
    #[must_use]
    pub fn decide(
        &self,
        action: &ActionRecord,
        violations: Vec<Violation>,
        state: &AgentComplianceState,
    ) -> EnforcementDecision {
        let (kind, trigger) = self.classify(action.timestamp(), &violations, state);
        let cause = worst_violation(&violations);
        let reasoning = reasoning(action, &violations, cause, trigger);
        let constraints = self.constraints.constraints_for(
            kind,
            cause,
            &violations,
            Severity::Critical,
            self.escalation.suspension_hours,
        );

        EnforcementDecision::new(
            action.agent_id().clone(),
            action.id(),
            action.description().to_owned(),
            kind,
            trigger,
            violations,
            reasoning,
            constraints,
            action.timestamp(),
        )
    }

    /// Fail-closed outcome for an action whose evaluation faulted.
    ///
    /// Always `block`, unless the agent is already suspended.
    #[must_use]
    pub fn decide_fault(
        &self,
        action: &ActionRecord,
        state: &AgentComplianceState,
    ) -> EnforcementDecision {
        let (kind, trigger, reasoning) = if state.is_suspended() {
            (
                DecisionKind::Suspend,
                DecisionTrigger::Suspended,
                reasoning(action, &[], None, DecisionTrigger::Suspended),
            )
        } else {
            (
                DecisionKind::Block,
                DecisionTrigger::EvaluationFault,
                FAULT_REASONING.to_owned(),
            )
        };
        let constraints = self.constraints.constraints_for(
            kind,
            None,
            &[],
            Severity::High,
            self.escalation.suspension_hours,
        );

        EnforcementDecision::new(
            action.agent_id().clone(),
            action.id(),
            action.description().to_owned(),
            kind,
            trigger,
            Vec::new(),
            reasoning,
            constraints,
            action.timestamp(),
        )
    }

    /// Decides on `action` and records the decision in the agent's history.
    ///
    /// Concurrent calls for the same agent are serialized; other agents are
    /// unaffected.
    pub fn enforce(
        &self,
        action: &ActionRecord,
        outcome: Result<Vec<Violation>, EvaluationFault>,
    ) -> EnforcementDecision {
        self.book.with_state(action.agent_id(), |state| {
            let was_suspended = state.is_suspended();
            let decision = match outcome {
                Ok(violations) => self.decide(action, violations, state),
                Err(fault) => {
                    warn!(
                        agent_id = %action.agent_id(),
                        action_id = %action.id(),
                        policy_id = %fault.policy_id,
                        rule_index = fault.rule_index,
                        reason = %fault.reason,
                        "rule evaluation faulted; failing closed"
                    );
                    self.decide_fault(action, state)
                }
            };
            state.record(&decision, &self.escalation);

            if state.is_suspended() && !was_suspended {
                warn!(
                    agent_id = %action.agent_id(),
                    trigger = ?decision.trigger(),
                    "agent suspended"
                );
            }
            info!(
                agent_id = %action.agent_id(),
                action_id = %action.id(),
                decision = %decision.decision(),
                violations = decision.violations().len(),
                "enforcement decision issued"
            );
            decision
        })
    }

    /// Lifts an agent's suspension.
    ///
    /// Returns `None` for agents with no history, otherwise whether a
    /// suspension was lifted.
    pub fn reinstate(&self, agent_id: &AgentId) -> Option<bool> {
        let lifted = self.book.with_existing(agent_id, AgentComplianceState::reinstate)?;
        if lifted {
            info!(agent_id = %agent_id, "agent reinstated");
        }
        Some(lifted)
    }

    /// Snapshot of one agent's history.
    #[must_use]
    pub fn state(&self, agent_id: &AgentId) -> Option<AgentComplianceState> {
        self.book.snapshot(agent_id)
    }

    /// Snapshots of every agent's history, ordered by agent id.
    #[must_use]
    pub fn states(&self) -> Vec<AgentComplianceState> {
        self.book.snapshots()
    }

    /// Returns `true` when the agent is currently suspended.
    #[must_use]
    pub fn is_suspended(&self, agent_id: &AgentId) -> bool {
        self.book
            .snapshot(agent_id)
            .is_some_and(|state| state.is_suspended())
    }

    /// Aggregates decision counts across agents.
    #[must_use]
    pub fn statistics(&self) -> EnforcementStatistics {
        let states = self.book.snapshots();
        let mut decisions = DecisionCounts::default();
        for state in &states {
            decisions.merge(state.decisions());
        }
        EnforcementStatistics {
            total_decisions: decisions.total(),
            decisions,
            agents_tracked: states.len(),
            suspended_agents: states.iter().filter(|s| s.is_suspended()).count(),
        }
    }

    fn classify(
        &self,
        as_of: DateTime<Utc>,
        violations: &[Violation],
        state: &AgentComplianceState,
    ) -> (DecisionKind, DecisionTrigger) {
        if state.is_suspended() {
            return (DecisionKind::Suspend, DecisionTrigger::Suspended);
        }
        let Some(worst) = violations.iter().map(Violation::severity).max() else {
            return (DecisionKind::Allow, DecisionTrigger::NoViolations);
        };

        let mut kind = DecisionKind::floor_for(worst);
        let mut trigger = DecisionTrigger::Severity { severity: worst };

        let window = state.window(as_of, self.escalation.trailing_window());
        if kind < DecisionKind::Block {
            if window.medium_or_worse >= self.escalation.repeated_violation_threshold {
                kind = DecisionKind::Block;
                trigger = DecisionTrigger::RepeatedViolations {
                    prior: window.medium_or_worse,
                };
            } else if window.enforcements > 0 {
                kind = DecisionKind::Block;
                trigger = DecisionTrigger::PriorEnforcement {
                    prior: window.enforcements,
                };
            }
        }

        if kind < DecisionKind::Suspend {
            let prior_blocks = state.escalation_blocks();
            let threshold = self.escalation.suspension_block_threshold;
            let counted = if kind == DecisionKind::Block {
                prior_blocks.saturating_add(1)
            } else {
                prior_blocks
            };
            if counted >= threshold {
                kind = DecisionKind::Suspend;
                trigger = DecisionTrigger::CumulativeBlocks { blocks: counted };
            }
        }

        (kind, trigger)
    }
}

/// First violation carrying the highest severity.
fn worst_violation(violations: &[Violation]) -> Option<&Violation> {
    violations
        .iter()
        .reduce(|best, candidate| {
            if candidate.severity() > best.severity() {
                candidate
            } else {
                best
            }
        })
}

fn reasoning(
    action: &ActionRecord,
    violations: &[Violation],
    cause: Option<&Violation>,
    trigger: DecisionTrigger,
) -> String {
    let base = cause.map(|violation| {
        let mut text = format!(
            "{} violates {} policy: {}",
            action.description(),
            violation.policy_id(),
            violation.description()
        );
        if violations.len() > 1 {
            text.push_str(&format!(" (+{} more violations)", violations.len() - 1));
        }
        text
    });
    let with_base = |prefix: String| match &base {
        Some(base) => format!("{prefix}; {base}"),
        None => prefix,
    };

    match trigger {
        DecisionTrigger::NoViolations => "no policy violations detected".to_owned(),
        DecisionTrigger::Severity { .. } => base.clone().unwrap_or_default(),
        DecisionTrigger::RepeatedViolations { prior } => with_base(format!(
            "repeated violations: {prior} prior medium-or-worse violations in the trailing window"
        )),
        DecisionTrigger::PriorEnforcement { prior } => with_base(format!(
            "prior enforcement: {prior} block or suspend decisions in the trailing window"
        )),
        DecisionTrigger::CumulativeBlocks { blocks } => with_base(format!(
            "repeated enforcement: {blocks} cumulative block decisions reached the suspension threshold"
        )),
        DecisionTrigger::Suspended => {
            with_base("agent is suspended pending external reinstatement".to_owned())
        }
        DecisionTrigger::EvaluationFault => FAULT_REASONING.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use gaas_policy::{ApprovalLevel, Remediation};
    use gaas_primitives::{ActionType, PolicyId};
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 5, 10, 0, 0).unwrap()
    }

    fn action_at(at: DateTime<Utc>) -> ActionRecord {
        ActionRecord::builder(
            AgentId::new("agent-1").unwrap(),
            ActionType::DataAccess,
            "Read customer table",
        )
        .timestamp(at)
        .build()
        .unwrap()
    }

    fn violation(action: &ActionRecord, severity: Severity) -> Violation {
        Violation::new(
            action.id(),
            PolicyId::new("P1").unwrap(),
            1,
            0,
            severity,
            "sensitive data access",
        )
    }

    fn run(engine: &DecisionEngine, at: DateTime<Utc>, severities: &[Severity]) -> EnforcementDecision {
        let action = action_at(at);
        let violations = severities.iter().map(|s| violation(&action, *s)).collect();
        engine.enforce(&action, Ok(violations))
    }

    #[test]
    fn clean_action_is_allowed_and_recorded() {
        let engine = DecisionEngine::default();
        let decision = run(&engine, t0(), &[]);
        assert_eq!(decision.decision(), DecisionKind::Allow);
        assert_eq!(decision.reasoning(), "no policy violations detected");
        assert!(decision.additional_constraints().is_none());

        let state = engine.state(&AgentId::new("agent-1").unwrap()).unwrap();
        assert_eq!(state.total_actions(), 1);
        assert_eq!(state.compliant_actions(), 1);
    }

    #[test]
    fn single_cause_reasoning_names_policy_and_rule() {
        let engine = DecisionEngine::default();
        let decision = run(&engine, t0(), &[Severity::High]);
        assert_eq!(decision.decision(), DecisionKind::Block);
        assert_eq!(
            decision.reasoning(),
            "Read customer table violates P1 policy: sensitive data access"
        );
        let constraints = decision.additional_constraints().unwrap();
        assert_eq!(constraints.required_approval, ApprovalLevel::SecurityOfficer);
        assert!(!constraints.retry_allowed);
    }

    #[test]
    fn low_and_medium_warn_until_history_accumulates() {
        let engine = DecisionEngine::default();
        assert_eq!(run(&engine, t0(), &[Severity::Low]).decision(), DecisionKind::Warn);
        assert_eq!(
            run(&engine, t0() + Duration::minutes(1), &[Severity::Medium]).decision(),
            DecisionKind::Warn
        );
        assert_eq!(
            run(&engine, t0() + Duration::minutes(2), &[Severity::Medium]).decision(),
            DecisionKind::Warn
        );

        let escalated = run(&engine, t0() + Duration::minutes(3), &[Severity::Low]);
        assert_eq!(escalated.decision(), DecisionKind::Block);
        assert_eq!(
            escalated.trigger(),
            DecisionTrigger::RepeatedViolations { prior: 2 }
        );
        assert!(escalated.reasoning().starts_with("repeated violations: 2 prior"));
    }

    #[test]
    fn history_outside_window_is_ignored() {
        let engine = DecisionEngine::default();
        run(&engine, t0(), &[Severity::Medium]);
        run(&engine, t0(), &[Severity::Medium]);
        let later = run(&engine, t0() + Duration::days(8), &[Severity::Low]);
        assert_eq!(later.decision(), DecisionKind::Warn);
    }

    #[test]
    fn prior_block_in_window_escalates_low_severity() {
        let engine = DecisionEngine::default();
        run(&engine, t0(), &[Severity::High]);
        let next = run(&engine, t0() + Duration::hours(1), &[Severity::Low]);
        assert_eq!(next.decision(), DecisionKind::Block);
        assert_eq!(next.trigger(), DecisionTrigger::PriorEnforcement { prior: 1 });
    }

    #[test]
    fn third_block_suspends_and_suspension_sticks() {
        let engine = DecisionEngine::default();
        assert_eq!(run(&engine, t0(), &[Severity::High]).decision(), DecisionKind::Block);
        assert_eq!(
            run(&engine, t0() + Duration::minutes(1), &[Severity::High]).decision(),
            DecisionKind::Block
        );
        let third = run(&engine, t0() + Duration::minutes(2), &[Severity::High]);
        assert_eq!(third.decision(), DecisionKind::Suspend);
        assert_eq!(third.trigger(), DecisionTrigger::CumulativeBlocks { blocks: 3 });
        assert_eq!(
            third.additional_constraints().unwrap().suspension_duration_hours,
            Some(24)
        );

        let clean = run(&engine, t0() + Duration::minutes(3), &[]);
        assert_eq!(clean.decision(), DecisionKind::Suspend);
        assert_eq!(clean.trigger(), DecisionTrigger::Suspended);

        let agent = AgentId::new("agent-1").unwrap();
        let state = engine.state(&agent).unwrap();
        assert!(state.is_suspended());
        assert_eq!(state.review_after(), Some(t0() + Duration::minutes(2) + Duration::hours(24)));
        assert_eq!(state.total_actions(), 4);
    }

    #[test]
    fn reinstatement_resets_escalation_but_keeps_counters() {
        let engine = DecisionEngine::default();
        let agent = AgentId::new("agent-1").unwrap();
        assert_eq!(engine.reinstate(&agent), None);

        run(&engine, t0(), &[Severity::Critical]);
        assert!(engine.is_suspended(&agent));
        assert_eq!(engine.reinstate(&agent), Some(true));
        assert_eq!(engine.reinstate(&agent), Some(false));

        let next = run(&engine, t0() + Duration::days(30), &[]);
        assert_eq!(next.decision(), DecisionKind::Allow);
        let state = engine.state(&agent).unwrap();
        assert_eq!(state.total_actions(), 2);
        assert_eq!(state.reinstatements(), 1);
        assert_eq!(state.escalation_blocks(), 0);
    }

    #[test]
    fn fault_fails_closed_without_counting_toward_suspension() {
        let engine = DecisionEngine::default();
        let fault = EvaluationFault {
            policy_id: "P1".into(),
            policy_version: 1,
            rule_index: 0,
            reason: "bad operand".into(),
        };
        for minute in 0..4 {
            let decision = engine.enforce(&action_at(t0() + Duration::minutes(minute)), Err(fault.clone()));
            assert_eq!(decision.decision(), DecisionKind::Block);
            assert_eq!(decision.reasoning(), FAULT_REASONING);
            assert!(decision.is_fault());
        }
        let state = engine.state(&AgentId::new("agent-1").unwrap()).unwrap();
        assert_eq!(state.decisions().block, 4);
        assert_eq!(state.escalation_blocks(), 0);
        assert!(!state.is_suspended());
    }

    #[test]
    fn reasoning_uses_first_worst_violation() {
        let engine = DecisionEngine::default();
        let action = action_at(t0());
        let violations = vec![
            violation(&action, Severity::Low),
            Violation::new(action.id(), PolicyId::new("P2").unwrap(), 1, 0, Severity::High, "vault read")
                .with_remediation(Remediation {
                    required_approval: ApprovalLevel::ComplianceOfficer,
                    alternative_actions: Vec::new(),
                }),
            Violation::new(action.id(), PolicyId::new("P3").unwrap(), 1, 0, Severity::High, "later"),
        ];
        let state = AgentComplianceState::new(action.agent_id().clone());
        let decision = engine.decide(&action, violations, &state);
        assert_eq!(
            decision.reasoning(),
            "Read customer table violates P2 policy: vault read (+2 more violations)"
        );
        let constraints = decision.additional_constraints().unwrap();
        assert_eq!(constraints.required_approval, ApprovalLevel::ComplianceOfficer);
        assert!(!constraints.alternative_actions.is_empty());
    }

    #[test]
    fn statistics_aggregate_across_agents() {
        let engine = DecisionEngine::default();
        run(&engine, t0(), &[]);
        run(&engine, t0(), &[Severity::Critical]);
        let other = ActionRecord::builder(AgentId::new("agent-2").unwrap(), ActionType::DataAccess, "read")
            .timestamp(t0())
            .build()
            .unwrap();
        engine.enforce(&other, Ok(Vec::new()));

        let stats = engine.statistics();
        assert_eq!(stats.total_decisions, 3);
        assert_eq!(stats.decisions.allow, 2);
        assert_eq!(stats.decisions.suspend, 1);
        assert_eq!(stats.agents_tracked, 2);
        assert_eq!(stats.suspended_agents, 1);
    }

    #[test]
    fn history_is_capped() {
        let engine = DecisionEngine::new(EscalationPolicy {
            history_limit: 3,
            ..EscalationPolicy::default()
        });
        for minute in 0..10 {
            run(&engine, t0() + Duration::minutes(minute), &[]);
        }
        let state = engine.state(&AgentId::new("agent-1").unwrap()).unwrap();
        assert_eq!(state.history().len(), 3);
        assert_eq!(state.total_actions(), 10);
    }

    #[test]
    fn unreachable_review_time_is_left_unset() {
        let engine = DecisionEngine::new(EscalationPolicy {
            suspension_hours: u32::MAX,
            ..EscalationPolicy::default()
        });
        let decision = run(&engine, t0(), &[Severity::Critical]);
        assert_eq!(decision.decision(), DecisionKind::Suspend);

        let state = engine.state(&AgentId::new("agent-1").unwrap()).unwrap();
        assert!(state.is_suspended());
        assert_eq!(state.suspended_at(), Some(t0()));
        assert_eq!(state.review_after(), None);
    }

    #[test]
    fn concurrent_decisions_match_sequential_history() {
        const WORKERS: usize = 16;
        const PER_WORKER: usize = 8;
        let total = WORKERS * PER_WORKER;
        let busy = AgentId::new("agent-1").unwrap();
        let quiet = AgentId::new("agent-2").unwrap();

        let sequential = DecisionEngine::default();
        for step in 0..total {
            run(&sequential, t0() + Duration::minutes(i64::try_from(step).unwrap()), &[Severity::High]);
        }

        let engine = DecisionEngine::default();
        std::thread::scope(|scope| {
            for worker in 0..WORKERS {
                let engine = &engine;
                let quiet = &quiet;
                scope.spawn(move || {
                    for step in 0..PER_WORKER {
                        let at = t0() + Duration::minutes(i64::try_from(worker * PER_WORKER + step).unwrap());
                        run(engine, at, &[Severity::High]);
                        let clean = ActionRecord::builder(quiet.clone(), ActionType::DataAccess, "read")
                            .timestamp(at)
                            .build()
                            .unwrap();
                        engine.enforce(&clean, Ok(Vec::new()));
                    }
                });
            }
        });

        let expected = sequential.state(&busy).unwrap();
        let state = engine.state(&busy).unwrap();
        assert_eq!(state.total_actions(), u64::try_from(total).unwrap());
        assert_eq!(state.decisions(), expected.decisions());
        assert_eq!(state.decisions().block, 2);
        assert_eq!(state.escalation_blocks(), expected.escalation_blocks());
        assert!(state.is_suspended());

        let other = engine.state(&quiet).unwrap();
        assert_eq!(other.total_actions(), u64::try_from(total).unwrap());
        assert_eq!(other.decisions().allow, other.total_actions());
        assert_eq!(other.compliant_actions(), other.total_actions());
        assert!(!other.is_suspended());
        assert_eq!(engine.statistics().suspended_agents, 1);
    }

    fn severity() -> impl Strategy<Value = Severity> {
        prop::sample::select(Severity::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn decisions_are_monotonic_in_severity(
            history in prop::collection::vec(prop::collection::vec(severity(), 0..3), 0..6),
            a in prop::collection::vec(severity(), 0..4),
            b in prop::collection::vec(severity(), 0..4),
        ) {
            let engine = DecisionEngine::default();
            for (minute, severities) in history.iter().enumerate() {
                run(&engine, t0() + Duration::minutes(i64::try_from(minute).unwrap()), severities);
            }
            let state = engine
                .state(&AgentId::new("agent-1").unwrap())
                .unwrap_or_else(|| AgentComplianceState::new(AgentId::new("agent-1").unwrap()));

            let at = t0() + Duration::hours(1);
            let action = action_at(at);
            let build = |severities: &[Severity]| -> Vec<Violation> {
                severities.iter().map(|s| violation(&action, *s)).collect()
            };
            let worst_a = a.iter().max();
            let worst_b = b.iter().max();
            let decision_a = engine.decide(&action, build(&a), &state).decision();
            let decision_b = engine.decide(&action, build(&b), &state).decision();

            if worst_a >= worst_b {
                prop_assert!(decision_a >= decision_b);
            }
            if worst_b >= worst_a {
                prop_assert!(decision_b >= decision_a);
            }
            if !a.is_empty() {
                prop_assert!(decision_a >= DecisionKind::floor_for(*worst_a.unwrap()));
            }
        }

        #[test]
        fn suspension_is_absorbing(
            tail in prop::collection::vec(prop::collection::vec(severity(), 0..3), 1..8),
        ) {
            let engine = DecisionEngine::default();
            run(&engine, t0(), &[Severity::Critical]);
            for (minute, severities) in tail.iter().enumerate() {
                let decision = run(&engine, t0() + Duration::minutes(i64::try_from(minute).unwrap() + 1), severities);
                prop_assert_eq!(decision.decision(), DecisionKind::Suspend);
            }
        }
    }
}
