//! Agent simulation - drives scripted agents through the governance kernel
//! and prints the resulting compliance report.

use std::path::PathBuf;

use anyhow::Context;
use chrono::{Duration, Utc};
use clap::{Parser, ValueEnum};
use futures::future::try_join_all;
use gaas::compliance::{ReportRequest, ReportWindow};
use gaas::config::GovernanceConfig;
use gaas::kernel::{ActionSubmission, DecisionRequest, GovernanceKernel};
use gaas::policy::{Condition, PolicyDraft, PolicyType, Rule};
use gaas::primitives::{ActionContext, ActionType, AgentId, AgentRegistration, Severity};
use serde_json::json;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "agent-simulation",
    version,
    about = "Simulate governed agents with different compliance habits"
)]
struct Cli {
    /// JSON config file layered under `GAAS_*` environment variables.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Agents per persona.
    #[arg(long, default_value_t = 2)]
    agents: usize,

    /// Simulation steps; every agent proposes one action per step.
    #[arg(long, default_value_t = 12)]
    steps: usize,

    /// Restrict the simulation to one persona.
    #[arg(long, value_enum)]
    persona: Option<Persona>,

    /// Attach every violation to the printed report.
    #[arg(long)]
    detailed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Persona {
    Compliant,
    NonCompliant,
    Mixed,
}

impl Persona {
    const ALL: [Self; 3] = [Self::Compliant, Self::NonCompliant, Self::Mixed];

    const fn label(self) -> &'static str {
        match self {
            Self::Compliant => "compliant",
            Self::NonCompliant => "non_compliant",
            Self::Mixed => "mixed",
        }
    }

    /// Whether the agent plays by the rules at `step`.
    const fn behaves(self, step: usize, seat: usize) -> bool {
        match self {
            Self::Compliant => true,
            Self::NonCompliant => false,
            Self::Mixed => (step * 7 + seat * 3) % 10 < 6,
        }
    }
}

struct Proposal {
    description: &'static str,
    action_type: ActionType,
    resource: String,
    context: ActionContext,
}

const SAFE_ACTIONS: &[(&str, ActionType)] = &[
    ("read public dataset", ActionType::DataAccess),
    ("notify user of completed job", ActionType::UserInteraction),
    ("update cached summary", ActionType::SystemModification),
];

const RISKY_ACTIONS: &[(&str, ActionType)] = &[
    ("export customer records", ActionType::DataAccess),
    ("delete audit trail", ActionType::SystemModification),
    ("call unapproved external api", ActionType::ExternalApiCall),
];

fn propose(persona: Persona, step: usize, seat: usize) -> Proposal {
    if persona.behaves(step, seat) {
        let (description, action_type) = SAFE_ACTIONS[(step + seat) % SAFE_ACTIONS.len()];
        Proposal {
            description,
            action_type,
            resource: format!("public_resource_{}", step % 10 + 1),
            context: ActionContext::new()
                .with("data_type", json!("aggregate"))
                .with("consent", json!(true)),
        }
    } else {
        let (description, action_type) = RISKY_ACTIONS[(step + seat) % RISKY_ACTIONS.len()];
        Proposal {
            description,
            action_type,
            resource: format!("sensitive_resource_{}", step % 5 + 1),
            context: ActionContext::new()
                .with("data_type", json!("personal"))
                .with("consent", json!(false)),
        }
    }
}

fn seed_policies() -> Vec<PolicyDraft> {
    let effective = Utc::now() - Duration::days(1);
    vec![
        PolicyDraft::new("SEC-001", "Sensitive resources", PolicyType::Security, 1, effective)
            .with_rule(
                Rule::new(
                    Condition::contains("resource_accessed", "sensitive"),
                    Severity::High,
                    "sensitive resources require clearance",
                )
                .with_violation_type("unauthorized_access"),
            ),
        PolicyDraft::new("PRIV-001", "Personal data", PolicyType::DataGovernance, 1, effective).with_rule(
            Rule::new(
                Condition::all(vec![
                    Condition::equals("data_type", "personal"),
                    Condition::negate(Condition::equals("consent", true)),
                ]),
                Severity::Medium,
                "personal data processed without consent",
            )
            .with_violation_type("privacy"),
        ),
        PolicyDraft::new("OPS-001", "Audit integrity", PolicyType::Compliance, 1, effective)
            .with_rule(
                Rule::new(
                    Condition::contains("action_description", "audit trail"),
                    Severity::Critical,
                    "audit trails are immutable",
                )
                .with_violation_type("tampering"),
            ),
    ]
}

async fn register(
    kernel: &GovernanceKernel,
    persona: Persona,
    seat: usize,
) -> anyhow::Result<AgentId> {
    let agent_id = AgentId::new(format!("{}-{seat:02}", persona.label()))?;
    let registration = AgentRegistration::builder(agent_id.clone())
        .name(format!("{} agent {seat}", persona.label()))?
        .agent_type(persona.label())?
        .capabilities(["data_access", "user_interaction"])?
        .build()?;
    kernel.register_agent(registration).await?;
    Ok(agent_id)
}

/// Asks for a ruling and logs the action when it may proceed.
async fn act(kernel: &GovernanceKernel, agent_id: &AgentId, proposal: Proposal) -> anyhow::Result<()> {
    let decision = kernel
        .enforcement_decision(
            DecisionRequest::new(agent_id.clone(), proposal.description)
                .with_action_type(proposal.action_type)
                .with_resource(proposal.resource.clone())
                .with_context(proposal.context.clone()),
        )
        .await?;
    if !decision.decision().is_compliant() {
        return Ok(());
    }

    let submission = ActionSubmission {
        agent_id: agent_id.clone(),
        action_type: proposal.action_type,
        action_description: proposal.description.to_owned(),
        timestamp: Utc::now(),
        context: proposal.context.into(),
        resource_accessed: Some(proposal.resource),
    };
    if let Err(err) = kernel.submit_action(submission).await {
        warn!(agent_id = %agent_id, error = %err, "action not logged");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = GovernanceConfig::load(cli.config.as_deref()).context("loading configuration")?;
    gaas::telemetry::init(&config.telemetry)?;

    let kernel = gaas::bootstrap(&config).await?;
    if kernel.policies().snapshot().is_empty() {
        for draft in seed_policies() {
            let receipt = kernel.upload_policy(draft).await?;
            info!(policy_id = %receipt.policy_id, version = receipt.version, "seed policy uploaded");
        }
    }

    let personas: Vec<Persona> = cli.persona.map_or_else(|| Persona::ALL.to_vec(), |p| vec![p]);
    let mut agents = Vec::new();
    for persona in personas {
        for seat in 0..cli.agents {
            agents.push((persona, seat, register(&kernel, persona, seat).await?));
        }
    }
    info!(agents = agents.len(), steps = cli.steps, "simulation starting");

    let started = Utc::now();
    for step in 0..cli.steps {
        try_join_all(
            agents
                .iter()
                .map(|(persona, seat, agent_id)| act(&kernel, agent_id, propose(*persona, step, *seat))),
        )
        .await?;
    }

    let window = ReportWindow::new(started - Duration::seconds(1), Utc::now() + Duration::seconds(1))?;
    let mut request = ReportRequest::new(window);
    if cli.detailed {
        request = request.with_violations();
    }
    let report = kernel.compliance_report(&request).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    for row in kernel.agent_metrics_rows().await? {
        println!(
            "{:<20} {:<14} actions={:>3} violations={:>3} blocked={:>3} rate={:.2}",
            row.agent_id.as_str(),
            row.agent_type,
            row.total_actions,
            row.violations,
            row.blocked_actions,
            row.compliance_rate
        );
    }
    let health = kernel.health().await?;
    info!(
        suspended = health.suspended_agents,
        retained = health.retained_decisions,
        "simulation finished"
    );
    Ok(())
}
