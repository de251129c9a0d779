use std::sync::Arc;

use gaas_audit::FileJournal;
use gaas_config::GovernanceConfig;
use gaas_kernel::{GovernanceKernel, GovernanceResult};
use gaas_policy::DirectoryPolicySource;
use tracing::{info, warn};

/// Builds a kernel from `config`.
///
/// Opens the audit journal when `journal_path` is set and loads every policy
/// file under `policy_dir`. Policies that fail validation are logged and
/// skipped.
///
/// # Errors
///
/// Returns [`gaas_kernel::GovernanceError::Audit`] when the journal cannot be
/// opened or the ledger settings are invalid, and
/// [`gaas_kernel::GovernanceError::Ingest`] when the policy directory cannot
/// be read.
pub async fn bootstrap(config: &GovernanceConfig) -> GovernanceResult<GovernanceKernel> {
    let mut builder = GovernanceKernel::builder()
        .policy_limits(config.policy)
        .escalation(config.escalation)
        .report(config.report)
        .ledger(config.ledger);

    if let Some(path) = &config.journal_path {
        let journal = FileJournal::open(path.clone()).await?;
        info!(path = %journal.path().display(), "audit journal opened");
        builder = builder.journal(Arc::new(journal));
    }

    let kernel = builder.build()?;

    if let Some(dir) = &config.policy_dir {
        let report = kernel
            .load_policies(&DirectoryPolicySource::new(dir.clone()))
            .await?;
        for rejection in &report.rejected {
            warn!(origin = %rejection.origin, errors = ?rejection.errors, "policy rejected at startup");
        }
        info!(
            dir = %dir.display(),
            accepted = report.accepted.len(),
            rejected = report.rejected.len(),
            "startup policies loaded"
        );
    }

    Ok(kernel)
}
