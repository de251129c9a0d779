use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use gaas::audit::{AuditJournal, MemoryJournal};
use gaas::compliance::{RecommendationCode, ReportRequest, ReportWindow};
use gaas::config::GovernanceConfig;
use gaas::enforcement::{DecisionKind, DecisionTrigger};
use gaas::kernel::{
    ActionSubmission, AgentStatus, Clock, ContextInput, DecisionRequest, GovernanceError,
    GovernanceKernel,
};
use gaas::policy::{Condition, PolicyDraft, PolicyType, Rule};
use gaas::primitives::{ActionContext, ActionType, AgentId, AgentRegistration, Severity};
use serde_json::json;

struct FixedClock(DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 6, 14, 30, 0).unwrap()
}

fn kernel_with(journal: Arc<MemoryJournal>) -> GovernanceKernel {
    GovernanceKernel::builder()
        .clock(Arc::new(FixedClock(now())))
        .journal(journal)
        .build()
        .unwrap()
}

fn registration(id: &str) -> AgentRegistration {
    AgentRegistration::builder(AgentId::new(id).unwrap())
        .name("Claims processor")
        .unwrap()
        .agent_type("data_processor")
        .unwrap()
        .capabilities(["data_access", "reporting"])
        .unwrap()
        .build()
        .unwrap()
}

fn sensitive_db_policy(version: u32, effective_at: DateTime<Utc>) -> PolicyDraft {
    PolicyDraft::new("P1", "Sensitive data", PolicyType::Security, version, effective_at).with_rule(
        Rule::new(
            Condition::equals("resource_accessed", "sensitive_db"),
            Severity::High,
            "access to sensitive_db requires clearance",
        )
        .with_violation_type("unauthorized_access"),
    )
}

fn report_window() -> ReportWindow {
    ReportWindow::new(now() - Duration::days(1), now() + Duration::hours(1)).unwrap()
}

fn sensitive_request(agent: &AgentId) -> DecisionRequest {
    DecisionRequest::new(agent.clone(), "read customer table").with_resource("sensitive_db")
}

#[tokio::test]
async fn high_severity_violation_blocks() {
    let kernel = kernel_with(Arc::new(MemoryJournal::new()));
    let agent = AgentId::new("agent-1").unwrap();
    kernel.register_agent(registration("agent-1")).await.unwrap();
    kernel
        .upload_policy(sensitive_db_policy(1, now() - Duration::days(1)))
        .await
        .unwrap();

    let receipt = kernel
        .submit_action(ActionSubmission {
            agent_id: agent.clone(),
            action_type: ActionType::DataAccess,
            action_description: "read customer table".into(),
            timestamp: now(),
            context: ContextInput::default(),
            resource_accessed: Some("sensitive_db".into()),
        })
        .await
        .unwrap();
    assert_eq!(receipt.violations.len(), 1);
    assert_eq!(receipt.violations[0].severity(), Severity::High);

    let decision = kernel.enforcement_decision(sensitive_request(&agent)).await.unwrap();
    assert_eq!(decision.decision(), DecisionKind::Block);
    assert_eq!(decision.violations().len(), 1);
    assert!(decision.additional_constraints().is_some());
}

#[tokio::test]
async fn third_cumulative_block_suspends_and_v2_supersedes() {
    let kernel = kernel_with(Arc::new(MemoryJournal::new()));
    let agent = AgentId::new("agent-2").unwrap();
    kernel.register_agent(registration("agent-2")).await.unwrap();
    kernel
        .upload_policy(sensitive_db_policy(1, now() - Duration::days(1)))
        .await
        .unwrap();

    let mut kinds = Vec::new();
    for _ in 0..3 {
        let decision = kernel.enforcement_decision(sensitive_request(&agent)).await.unwrap();
        kinds.push(decision.decision());
    }
    assert_eq!(
        kinds,
        vec![DecisionKind::Block, DecisionKind::Block, DecisionKind::Suspend]
    );
    assert_eq!(kernel.agent(&agent).await.unwrap().status, AgentStatus::Suspended);

    // Suspension holds for compliant proposals too.
    let decision = kernel
        .enforcement_decision(DecisionRequest::new(agent.clone(), "view dashboard"))
        .await
        .unwrap();
    assert_eq!(decision.decision(), DecisionKind::Suspend);
    assert_eq!(decision.trigger(), DecisionTrigger::Suspended);

    assert!(kernel.reinstate(&agent).await.unwrap());

    let v2 = PolicyDraft::new(
        "P1",
        "Sensitive data",
        PolicyType::Security,
        2,
        now() - Duration::hours(1),
    )
    .with_rule(Rule::new(
        Condition::equals("resource_accessed", "payroll_db"),
        Severity::High,
        "payroll access requires clearance",
    ));
    let receipt = kernel.upload_policy(v2).await.unwrap();
    assert_eq!(receipt.version, 2);

    let decision = kernel.enforcement_decision(sensitive_request(&agent)).await.unwrap();
    assert!(decision.violations().is_empty());
    assert_eq!(decision.decision(), DecisionKind::Allow);

    let err = kernel
        .upload_policy(sensitive_db_policy(2, now()))
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::PolicyValidation(_)));
}

#[tokio::test]
async fn report_and_journal_follow_decisions() {
    let journal = Arc::new(MemoryJournal::new());
    let kernel = kernel_with(journal.clone());
    let agent = AgentId::new("agent-3").unwrap();
    kernel.register_agent(registration("agent-3")).await.unwrap();
    kernel
        .upload_policy(sensitive_db_policy(1, now() - Duration::days(1)))
        .await
        .unwrap();

    for _ in 0..3 {
        kernel.enforcement_decision(sensitive_request(&agent)).await.unwrap();
    }

    let report = kernel
        .compliance_report(&ReportRequest::new(report_window()).for_agent(agent.clone()))
        .await
        .unwrap();
    assert!(report.report_id.starts_with("RPT_20251006143000_"));
    assert_eq!(report.metrics.total_actions, 3);
    assert_eq!(report.metrics.violations, 3);
    assert!(report.metrics.compliance_rate.abs() < f64::EPSILON);
    assert_eq!(report.most_common_violations[0].count, 3);
    assert_eq!(report.policy_violation_rates.len(), 1);

    let codes: Vec<RecommendationCode> =
        report.recommendations.iter().map(|r| r.code).collect();
    assert_eq!(
        codes,
        vec![
            RecommendationCode::ReviewPolicies,
            RecommendationCode::FocusViolationType,
            RecommendationCode::ReviewPolicy,
        ]
    );
    assert_eq!(
        report.recommendations[1].message,
        "Focus on addressing unauthorized_access violations"
    );

    let kinds: Vec<&str> = journal
        .tail(usize::MAX)
        .await
        .unwrap()
        .iter()
        .map(|record| record.event().kind())
        .collect();
    assert_eq!(
        kinds,
        vec![
            "agent_registration",
            "policy_upload",
            "enforcement_decision",
            "enforcement_decision",
            "enforcement_decision",
            "compliance_report",
        ]
    );

    let missing = kernel
        .compliance_report(
            &ReportRequest::new(report_window()).for_agent(AgentId::new("ghost").unwrap()),
        )
        .await
        .unwrap_err();
    assert!(matches!(missing, GovernanceError::AgentNotFound { .. }));
}

#[tokio::test]
async fn structured_context_reaches_conditions() {
    let kernel = kernel_with(Arc::new(MemoryJournal::new()));
    let agent = AgentId::new("agent-4").unwrap();
    kernel.register_agent(registration("agent-4")).await.unwrap();
    kernel
        .upload_policy(
            PolicyDraft::new("PRIV-1", "PII", PolicyType::DataGovernance, 1, now() - Duration::days(1))
                .with_rule(Rule::new(
                    Condition::all(vec![
                        Condition::equals("data_type", "personal"),
                        Condition::negate(Condition::equals("consent", true)),
                    ]),
                    Severity::Medium,
                    "personal data without consent",
                )),
        )
        .await
        .unwrap();

    let context = ActionContext::new()
        .with("data_type", json!("personal"))
        .with("consent", json!(false));
    let decision = kernel
        .enforcement_decision(
            DecisionRequest::new(agent.clone(), "export user records").with_context(context),
        )
        .await
        .unwrap();
    assert_eq!(decision.decision(), DecisionKind::Warn);

    let raw = ContextInput::Raw(r#"{"data_type": "personal", "consent": true}"#.into());
    let decision = kernel
        .enforcement_decision(DecisionRequest::new(agent, "export user records").with_context(raw))
        .await
        .unwrap();
    assert_eq!(decision.decision(), DecisionKind::Allow);
}

#[tokio::test]
async fn bootstrap_wires_journal_and_policy_dir() {
    let root = std::env::temp_dir().join(format!("gaas-bootstrap-{}", uuid::Uuid::new_v4()));
    let policy_dir = root.join("policies");
    std::fs::create_dir_all(&policy_dir).unwrap();
    std::fs::write(
        policy_dir.join("p1.json"),
        json!({
            "policy_id": "P1",
            "policy_name": "Sensitive data",
            "policy_type": "security",
            "version": 1,
            "effective_date": "2024-01-01T00:00:00Z",
            "policy_content": {
                "rules": [{
                    "condition": {"field": "resource_accessed", "operator": "eq", "value": "sensitive_db"},
                    "severity": "high",
                    "description": "access to sensitive_db requires clearance"
                }]
            }
        })
        .to_string(),
    )
    .unwrap();
    std::fs::write(policy_dir.join("broken.json"), "{not json").unwrap();

    let config = GovernanceConfig {
        journal_path: Some(root.join("audit.ndjson")),
        policy_dir: Some(policy_dir),
        ..GovernanceConfig::default()
    };
    let kernel = gaas::bootstrap(&config).await.unwrap();
    assert_eq!(kernel.policies().snapshot().len(), 1);

    let agent = AgentId::new("agent-5").unwrap();
    kernel.register_agent(registration("agent-5")).await.unwrap();
    kernel
        .submit_action(ActionSubmission {
            agent_id: agent.clone(),
            action_type: ActionType::DataAccess,
            action_description: "read customer table".into(),
            timestamp: Utc::now(),
            context: ContextInput::default(),
            resource_accessed: Some("sensitive_db".into()),
        })
        .await
        .unwrap();

    let rows = kernel.action_log_rows(50).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].violations_detected, 1);
    assert!(root.join("audit.ndjson").exists());

    std::fs::remove_dir_all(&root).unwrap();
}
