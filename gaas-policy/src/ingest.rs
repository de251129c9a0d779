//! Policy ingestion from external sources.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gaas_primitives::PolicyId;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::IngestError;
use crate::model::PolicyDraft;
use crate::store::PolicyStore;

/// One payload fetched from a source, decoded or not.
#[derive(Debug)]
pub struct SourcedPayload {
    /// Where the payload came from (file path, key, URL).
    pub origin: String,
    /// The decoded draft, or why decoding failed.
    pub draft: Result<PolicyDraft, IngestError>,
}

/// Supplier of raw policy payloads.
#[async_trait]
pub trait PolicySource: Send + Sync {
    /// Fetches every payload the source currently holds.
    ///
    /// Payloads that fail to decode are returned as errors in place so one bad
    /// document does not hide the others.
    async fn fetch(&self) -> Result<Vec<SourcedPayload>, IngestError>;
}

/// Reads `*.json` policy documents from a directory, in file-name order.
#[derive(Debug, Clone)]
pub struct DirectoryPolicySource {
    dir: PathBuf,
}

impl DirectoryPolicySource {
    /// Creates a source over `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the directory being read.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl PolicySource for DirectoryPolicySource {
    async fn fetch(&self) -> Result<Vec<SourcedPayload>, IngestError> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut payloads = Vec::with_capacity(paths.len());
        for path in paths {
            let draft = match tokio::fs::read_to_string(&path).await {
                Ok(raw) => PolicyDraft::from_json_str(&raw).map_err(IngestError::from),
                Err(err) => Err(IngestError::from(err)),
            };
            payloads.push(SourcedPayload {
                origin: path.display().to_string(),
                draft,
            });
        }
        Ok(payloads)
    }
}

/// Fixed list of drafts, useful for seeding and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticPolicySource {
    drafts: Vec<PolicyDraft>,
}

impl StaticPolicySource {
    /// Creates a source yielding `drafts` in order.
    #[must_use]
    pub fn new(drafts: Vec<PolicyDraft>) -> Self {
        Self { drafts }
    }
}

#[async_trait]
impl PolicySource for StaticPolicySource {
    async fn fetch(&self) -> Result<Vec<SourcedPayload>, IngestError> {
        Ok(self
            .drafts
            .iter()
            .map(|draft| SourcedPayload {
                origin: format!("static:{}", draft.id),
                draft: Ok(draft.clone()),
            })
            .collect())
    }
}

/// A payload that did not make it into the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    /// Where the payload came from.
    pub origin: String,
    /// Rendered problems.
    pub errors: Vec<String>,
}

/// Outcome of [`load_into`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// Stored `(id, version)` pairs, in source order.
    pub accepted: Vec<(PolicyId, u32)>,
    /// Payloads that failed to decode or validate.
    pub rejected: Vec<Rejection>,
}

/// Fetches every payload from `source` and upserts it into `store`.
///
/// Individual failures are collected in the report and do not stop the load.
///
/// # Errors
///
/// Returns [`IngestError`] only when the source itself cannot be read.
pub async fn load_into(
    source: &dyn PolicySource,
    store: &PolicyStore,
    now: DateTime<Utc>,
) -> Result<LoadReport, IngestError> {
    let mut report = LoadReport::default();
    for payload in source.fetch().await? {
        let outcome = payload
            .draft
            .map_err(|err| vec![err.to_string()])
            .and_then(|draft| store.upsert(draft, now).map_err(|err| err.messages()));
        match outcome {
            Ok(policy) => report
                .accepted
                .push((policy.id().clone(), policy.version())),
            Err(errors) => {
                warn!(origin = %payload.origin, errors = errors.len(), "policy payload skipped");
                report.rejected.push(Rejection {
                    origin: payload.origin,
                    errors,
                });
            }
        }
    }

    info!(
        accepted = report.accepted.len(),
        rejected = report.rejected.len(),
        generation = store.generation(),
        "policy source loaded"
    );
    Ok(report)
}
