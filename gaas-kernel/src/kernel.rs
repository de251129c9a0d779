//! Request-facing governance operations.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use gaas_audit::{
    ActionLogRow, AgentMetricsRow, AuditEvent, AuditJournal, AuditRecord, DecisionRow,
    HistoryLedger, LedgerConfig,
};
use gaas_compliance::{ComplianceAggregator, ComplianceReport, ReportConfig, ReportRequest};
use gaas_enforcement::{
    AgentComplianceState, DecisionEngine, DecisionKind, EnforcementDecision,
    EnforcementStatistics, EscalationPolicy,
};
use gaas_policy::{
    LoadReport, PolicyDraft, PolicyLimits, PolicySource, PolicyStore, PolicyValidationError,
    RuleEvaluator, load_into,
};
use gaas_primitives::{ActionRecord, ActionType, AgentId, AgentRegistration};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::contracts::{
    ActionReceipt, ActionSubmission, DecisionRequest, HealthSnapshot, PolicyUploadReceipt,
};
use crate::error::{GovernanceError, GovernanceResult};
use crate::lifecycle::{AgentStatus, StatusEvent};
use crate::registry::{AgentRegistry, InMemoryAgentRegistry, RegisteredAgent};

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// [`Clock`] backed by the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wires the registry, policy store, evaluator, decision engine, ledger, and
/// journal behind the operations exposed to callers.
pub struct GovernanceKernel {
    registry: Arc<dyn AgentRegistry>,
    policies: Arc<PolicyStore>,
    evaluator: RuleEvaluator,
    engine: DecisionEngine,
    aggregator: ComplianceAggregator,
    ledger: HistoryLedger,
    journal: Option<Arc<dyn AuditJournal>>,
    clock: Arc<dyn Clock>,
    // Held across one agent's decide, ledger and journal steps so that the
    // ledger and the journal see that agent's decisions in history order.
    decision_gates: DashMap<AgentId, Arc<Mutex<()>>>,
}

impl fmt::Debug for GovernanceKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GovernanceKernel")
            .field("registry", &"dyn AgentRegistry")
            .field("policy_generation", &self.policies.generation())
            .field("engine", &self.engine)
            .field("journal", &self.journal.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`GovernanceKernel`].
#[derive(Default)]
pub struct GovernanceKernelBuilder {
    registry: Option<Arc<dyn AgentRegistry>>,
    policies: Option<Arc<PolicyStore>>,
    limits: PolicyLimits,
    escalation: EscalationPolicy,
    report: ReportConfig,
    ledger: LedgerConfig,
    journal: Option<Arc<dyn AuditJournal>>,
    clock: Option<Arc<dyn Clock>>,
}

impl fmt::Debug for GovernanceKernelBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GovernanceKernelBuilder")
            .field("limits", &self.limits)
            .field("escalation", &self.escalation)
            .field("report", &self.report)
            .field("ledger", &self.ledger)
            .field("journal", &self.journal.is_some())
            .finish_non_exhaustive()
    }
}

impl GovernanceKernelBuilder {
    /// Uses `registry` instead of a fresh in-memory one.
    #[must_use]
    pub fn registry(mut self, registry: Arc<dyn AgentRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Shares an existing policy store; its own limits then apply.
    #[must_use]
    pub fn policy_store(mut self, store: Arc<PolicyStore>) -> Self {
        self.policies = Some(store);
        self
    }

    /// Sets upload limits for a freshly created store.
    #[must_use]
    pub const fn policy_limits(mut self, limits: PolicyLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Sets the escalation thresholds.
    #[must_use]
    pub const fn escalation(mut self, escalation: EscalationPolicy) -> Self {
        self.escalation = escalation;
        self
    }

    /// Sets the report thresholds.
    #[must_use]
    pub const fn report(mut self, report: ReportConfig) -> Self {
        self.report = report;
        self
    }

    /// Sets ledger retention.
    #[must_use]
    pub const fn ledger(mut self, ledger: LedgerConfig) -> Self {
        self.ledger = ledger;
        self
    }

    /// Attaches an audit journal.
    #[must_use]
    pub fn journal(mut self, journal: Arc<dyn AuditJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Replaces the system clock.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the kernel.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError::Audit`] when the ledger configuration is invalid.
    pub fn build(self) -> GovernanceResult<GovernanceKernel> {
        let policies = self
            .policies
            .unwrap_or_else(|| Arc::new(PolicyStore::new(self.limits)));
        let evaluator = RuleEvaluator::new(policies.limits());
        Ok(GovernanceKernel {
            registry: self
                .registry
                .unwrap_or_else(|| Arc::new(InMemoryAgentRegistry::new())),
            policies,
            evaluator,
            engine: DecisionEngine::new(self.escalation),
            aggregator: ComplianceAggregator::new(self.report),
            ledger: HistoryLedger::new(self.ledger)?,
            journal: self.journal,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            decision_gates: DashMap::new(),
        })
    }
}

impl GovernanceKernel {
    /// Starts building a kernel.
    #[must_use]
    pub fn builder() -> GovernanceKernelBuilder {
        GovernanceKernelBuilder::default()
    }

    /// Returns the policy store.
    #[must_use]
    pub fn policies(&self) -> &Arc<PolicyStore> {
        &self.policies
    }

    /// Registers an agent with status `active`.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError::Registry`] when the id is already registered.
    pub async fn register_agent(
        &self,
        registration: AgentRegistration,
    ) -> GovernanceResult<RegisteredAgent> {
        let agent_id = registration.agent_id().to_string();
        let outcome = self.registry.register(registration, self.clock.now()).await;
        let message = match &outcome {
            Ok(_) => "Agent registered successfully".to_owned(),
            Err(err) => err.to_string(),
        };
        self.record(AuditEvent::AgentRegistration {
            agent_id,
            success: outcome.is_ok(),
            message,
        })
        .await;
        Ok(outcome?)
    }

    /// Logs an action the agent performed and returns the violations it caused.
    ///
    /// Logged actions do not move the agent's enforcement history; only
    /// [`Self::enforcement_decision`] does.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError::AgentNotFound`], [`GovernanceError::AgentInactive`]
    /// for any status other than `active`, or
    /// [`GovernanceError::MalformedContext`]. Returns
    /// [`GovernanceError::EvaluationFault`] when a rule cannot be evaluated;
    /// the journal row is then marked with the fault.
    pub async fn submit_action(
        &self,
        submission: ActionSubmission,
    ) -> GovernanceResult<ActionReceipt> {
        let agent = self.registry.get(&submission.agent_id).await?;
        if !agent.status.is_active() {
            return Err(GovernanceError::AgentInactive {
                agent_id: submission.agent_id,
                status: agent.status,
            });
        }

        let action = ActionRecord::builder(
            submission.agent_id,
            submission.action_type,
            submission.action_description,
        )
        .context(submission.context.resolve()?)
        .maybe_resource(submission.resource_accessed)
        .timestamp(submission.timestamp)
        .build()?;

        let policies = self.policies.active_policies(action.timestamp());
        let violations = match self.evaluator.evaluate(&action, &policies) {
            Ok(violations) => violations,
            Err(fault) => {
                warn!(
                    agent_id = %action.agent_id(),
                    action_id = %action.id(),
                    policy_id = %fault.policy_id,
                    rule_index = fault.rule_index,
                    reason = %fault.reason,
                    "evaluation fault while logging action"
                );
                self.record(AuditEvent::ActionSubmission(ActionLogRow::faulted(&action, &fault)))
                    .await;
                return Err(fault.into());
            }
        };

        if violations.is_empty() {
            info!(agent_id = %action.agent_id(), action_id = %action.id(), "action submitted");
        } else {
            warn!(
                agent_id = %action.agent_id(),
                action_id = %action.id(),
                violations = violations.len(),
                "action submitted with violations"
            );
        }

        self.record(AuditEvent::ActionSubmission(ActionLogRow::new(
            &action,
            &violations,
            true,
        )))
        .await;

        Ok(ActionReceipt {
            log_id: action.id(),
            violations,
        })
    }

    /// Rules on a proposed action and records the decision.
    ///
    /// Suspended agents are answered (with `suspend`), inactive ones rejected.
    /// When evaluation faults, the decision fails closed to `block`. Requests
    /// for the same agent are handled one at a time, so the reporting ledger
    /// and the journal keep the order of the agent's history.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError::AgentNotFound`],
    /// [`GovernanceError::AgentInactive`] or [`GovernanceError::MalformedContext`].
    pub async fn enforcement_decision(
        &self,
        request: DecisionRequest,
    ) -> GovernanceResult<EnforcementDecision> {
        let agent = self.registry.get(&request.agent_id).await?;
        if agent.status == AgentStatus::Inactive {
            return Err(GovernanceError::AgentInactive {
                agent_id: request.agent_id,
                status: agent.status,
            });
        }

        let gate = self.decision_gate(&request.agent_id);
        let _ordered = gate.lock().await;

        let now = self.clock.now();
        let action_type = request
            .action_type
            .unwrap_or_else(|| ActionType::classify(&request.proposed_action));
        let action = ActionRecord::builder(request.agent_id, action_type, request.proposed_action)
            .context(request.context.resolve()?)
            .maybe_resource(request.resource_accessed)
            .timestamp(now)
            .build()?;

        let policies = self.policies.active_policies(now);
        let outcome = self.evaluator.evaluate(&action, &policies);
        let decision = self.engine.enforce(&action, outcome);

        if decision.decision() == DecisionKind::Suspend && agent.status.is_active() {
            if let Err(err) = self
                .registry
                .transition(action.agent_id(), StatusEvent::Suspend, now)
                .await
            {
                warn!(agent_id = %action.agent_id(), error = %err, "registry suspension failed");
            }
        }

        self.ledger.push(decision.clone(), now).await;
        self.record(AuditEvent::EnforcementDecision {
            row: DecisionRow::from(&decision),
            reasoning: decision.reasoning().to_owned(),
        })
        .await;
        Ok(decision)
    }

    /// Validates and stores a policy version.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError::PolicyValidation`] with every field problem.
    pub async fn upload_policy(&self, draft: PolicyDraft) -> GovernanceResult<PolicyUploadReceipt> {
        let now = self.clock.now();
        let policy_id = draft.id.clone();
        let version = draft.version;
        match self.policies.upsert(draft, now) {
            Ok(policy) => {
                self.record(AuditEvent::policy_upload(policy.id(), policy.version(), Vec::new()))
                    .await;
                Ok(PolicyUploadReceipt {
                    policy_id: policy.id().clone(),
                    version: policy.version(),
                    upload_timestamp: policy.uploaded_at(),
                    status: policy.status(now),
                })
            }
            Err(err) => {
                self.record(AuditEvent::PolicyUpload {
                    policy_id,
                    policy_version: Some(version),
                    success: false,
                    validation_errors: err.messages(),
                })
                .await;
                Err(err.into())
            }
        }
    }

    /// Decodes a JSON policy payload and uploads it.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError::PolicyValidation`] when the payload does not
    /// decode or fails validation.
    pub async fn upload_policy_json(&self, raw: &str) -> GovernanceResult<PolicyUploadReceipt> {
        let draft = PolicyDraft::from_json_str(raw).map_err(|err| {
            PolicyValidationError::single("<unparsed>", "payload", err.to_string())
        })?;
        self.upload_policy(draft).await
    }

    /// Loads every payload from `source` into the store.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError::Ingest`] when the source cannot be read.
    pub async fn load_policies(&self, source: &dyn PolicySource) -> GovernanceResult<LoadReport> {
        let report = load_into(source, &self.policies, self.clock.now()).await?;
        for (policy_id, version) in &report.accepted {
            self.record(AuditEvent::policy_upload(policy_id, *version, Vec::new()))
                .await;
        }
        for rejection in &report.rejected {
            self.record(AuditEvent::PolicyUpload {
                policy_id: rejection.origin.clone(),
                policy_version: None,
                success: false,
                validation_errors: rejection.errors.clone(),
            })
            .await;
        }
        Ok(report)
    }

    /// Builds a compliance report from retained decisions.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError::AgentNotFound`] when the agent filter names
    /// an unregistered agent.
    pub async fn compliance_report(
        &self,
        request: &ReportRequest,
    ) -> GovernanceResult<ComplianceReport> {
        if let Some(agent_id) = &request.agent_id {
            self.registry.get(agent_id).await?;
        }

        let now = self.clock.now();
        self.ledger.prune(now).await;
        let decisions = self.ledger.decisions().await;
        let report = self.aggregator.report(request, &decisions, now);

        info!(
            report_id = %report.report_id,
            total_actions = report.metrics.total_actions,
            compliance_rate = report.metrics.compliance_rate,
            "compliance report generated"
        );
        self.record(AuditEvent::ComplianceReport {
            report_id: report.report_id.clone(),
            agent_id: report.agent_id.clone(),
            period_start: report.period_start,
            period_end: report.period_end,
        })
        .await;
        Ok(report)
    }

    /// Changes an agent's operator-controlled status (`activate` / `deactivate`).
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError::AgentNotFound`] or [`GovernanceError::Registry`]
    /// for transitions the lifecycle forbids, including suspension events,
    /// which only enforcement and [`Self::reinstate`] may issue.
    pub async fn set_agent_status(
        &self,
        agent_id: &AgentId,
        event: StatusEvent,
    ) -> GovernanceResult<RegisteredAgent> {
        if matches!(event, StatusEvent::Suspend | StatusEvent::Reinstate) {
            let agent = self.registry.get(agent_id).await?;
            return Err(GovernanceError::Registry(
                crate::lifecycle::LifecycleError::InvalidTransition {
                    agent_id: agent_id.clone(),
                    from: agent.status,
                    event,
                }
                .into(),
            ));
        }
        Ok(self
            .registry
            .transition(agent_id, event, self.clock.now())
            .await?)
    }

    /// Lifts a suspension. Counters and history are kept.
    ///
    /// Returns `false` when the agent was not suspended.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError::AgentNotFound`] for unknown agents.
    pub async fn reinstate(&self, agent_id: &AgentId) -> GovernanceResult<bool> {
        let agent = self.registry.get(agent_id).await?;
        let mut changed = false;
        if agent.status == AgentStatus::Suspended {
            self.registry
                .transition(agent_id, StatusEvent::Reinstate, self.clock.now())
                .await?;
            changed = true;
        }
        changed |= self.engine.reinstate(agent_id).unwrap_or(false);
        Ok(changed)
    }

    /// Returns an agent's registry entry.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError::AgentNotFound`] for unknown agents.
    pub async fn agent(&self, agent_id: &AgentId) -> GovernanceResult<RegisteredAgent> {
        Ok(self.registry.get(agent_id).await?)
    }

    /// Returns a snapshot of an agent's compliance history.
    #[must_use]
    pub fn agent_state(&self, agent_id: &AgentId) -> Option<AgentComplianceState> {
        self.engine.state(agent_id)
    }

    /// Returns decision totals across all agents.
    #[must_use]
    pub fn statistics(&self) -> EnforcementStatistics {
        self.engine.statistics()
    }

    /// Returns point-in-time health figures.
    ///
    /// # Errors
    ///
    /// Propagates registry backend failures.
    pub async fn health(&self) -> GovernanceResult<HealthSnapshot> {
        let now = self.clock.now();
        let registered_agents = self.registry.list().await?.len();
        let statistics = self.engine.statistics();
        let snapshot = self.policies.snapshot();
        Ok(HealthSnapshot {
            registered_agents,
            tracked_agents: statistics.agents_tracked,
            suspended_agents: statistics.suspended_agents,
            active_policies: snapshot.active_policies(now).len(),
            policy_generation: snapshot.generation(),
            retained_decisions: self.ledger.stats().await.entries,
            timestamp: now,
        })
    }

    /// Exports retained decisions as analysis rows.
    pub async fn decision_rows(&self) -> Vec<DecisionRow> {
        self.ledger
            .decisions()
            .await
            .iter()
            .map(DecisionRow::from)
            .collect()
    }

    /// Exports per-agent totals as analysis rows, ordered by agent id.
    ///
    /// # Errors
    ///
    /// Propagates registry backend failures.
    pub async fn agent_metrics_rows(&self) -> GovernanceResult<Vec<AgentMetricsRow>> {
        let now = self.clock.now();
        let mut rows = Vec::new();
        for agent in self.registry.list().await? {
            let state = self
                .engine
                .state(agent.agent_id())
                .unwrap_or_else(|| AgentComplianceState::new(agent.agent_id().clone()));
            rows.push(AgentMetricsRow::new(
                &state,
                agent.registration.agent_type(),
                now,
            ));
        }
        Ok(rows)
    }

    /// Exports the most recent logged actions from the journal.
    ///
    /// Returns nothing when no journal is attached.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError::Audit`] when the journal cannot be read.
    pub async fn action_log_rows(&self, limit: usize) -> GovernanceResult<Vec<ActionLogRow>> {
        let Some(journal) = &self.journal else {
            return Ok(Vec::new());
        };
        let records = journal.tail(limit).await?;
        Ok(records
            .into_iter()
            .filter_map(|record| match record.event() {
                AuditEvent::ActionSubmission(row) => Some(row.clone()),
                _ => None,
            })
            .collect())
    }

    fn decision_gate(&self, agent_id: &AgentId) -> Arc<Mutex<()>> {
        Arc::clone(self.decision_gates.entry(agent_id.clone()).or_default().value())
    }

    async fn record(&self, event: AuditEvent) {
        let Some(journal) = &self.journal else {
            return;
        };
        let kind = event.kind();
        let record = AuditRecord::new(event, self.clock.now());
        if let Err(err) = journal.append(&record).await {
            warn!(event_type = kind, error = %err, "audit journal append failed");
        }
    }
}
