//! Versioned policy storage with copy-on-write snapshots.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use gaas_primitives::PolicyId;
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::error::PolicyResult;
use crate::model::{Policy, PolicyDraft, PolicyLimits, PolicyType};

/// One immutable generation of the policy set.
///
/// Every stored version is retained, ordered by ascending version within each
/// id, so superseded versions remain available for audit and rollback.
#[derive(Debug, Clone, Default)]
pub struct PolicySnapshot {
    generation: u64,
    lineages: BTreeMap<PolicyId, Vec<Arc<Policy>>>,
}

impl PolicySnapshot {
    /// Monotonic counter bumped by every accepted upload.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// For each id, the highest version active at `as_of`, in ascending id order.
    ///
    /// An id whose versions are all pending or expired contributes nothing.
    #[must_use]
    pub fn active_policies(&self, as_of: DateTime<Utc>) -> Vec<Arc<Policy>> {
        self.lineages
            .values()
            .filter_map(|versions| {
                versions
                    .iter()
                    .rev()
                    .find(|policy| policy.is_active(as_of))
                    .cloned()
            })
            .collect()
    }

    /// All stored versions of `id`, oldest first.
    #[must_use]
    pub fn versions(&self, id: &PolicyId) -> &[Arc<Policy>] {
        self.lineages.get(id).map_or(&[], Vec::as_slice)
    }

    /// Highest stored version of `id`, regardless of its window.
    #[must_use]
    pub fn latest(&self, id: &PolicyId) -> Option<&Arc<Policy>> {
        self.lineages.get(id).and_then(|versions| versions.last())
    }

    /// Latest version of every id whose category is `policy_type`.
    #[must_use]
    pub fn by_type(&self, policy_type: PolicyType) -> Vec<Arc<Policy>> {
        self.lineages
            .values()
            .filter_map(|versions| versions.last())
            .filter(|policy| policy.policy_type() == policy_type)
            .cloned()
            .collect()
    }

    /// Number of distinct policy ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lineages.len()
    }

    /// Returns `true` when no policy has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lineages.is_empty()
    }

    /// Number of stored versions across all ids.
    #[must_use]
    pub fn version_count(&self) -> usize {
        self.lineages.values().map(Vec::len).sum()
    }
}

/// Shared, versioned policy set.
///
/// Readers take a cheap [`Arc`] clone of the current snapshot and never
/// observe a half-applied upload. Writers validate under the write lock,
/// build the next snapshot from a copy and swap it in.
#[derive(Debug, Default)]
pub struct PolicyStore {
    limits: PolicyLimits,
    current: RwLock<Arc<PolicySnapshot>>,
}

impl PolicyStore {
    /// Creates an empty store enforcing `limits` on upload.
    #[must_use]
    pub fn new(limits: PolicyLimits) -> Self {
        Self {
            limits,
            current: RwLock::new(Arc::new(PolicySnapshot::default())),
        }
    }

    /// Returns the upload limits.
    #[must_use]
    pub const fn limits(&self) -> &PolicyLimits {
        &self.limits
    }

    /// Validates `draft` and stores it as a new version.
    ///
    /// Prior versions of the same id are kept.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PolicyValidationError`] when the draft is invalid or
    /// its version does not exceed the stored one.
    pub fn upsert(&self, draft: PolicyDraft, now: DateTime<Utc>) -> PolicyResult<Arc<Policy>> {
        let mut guard = self.current.write();
        let current_version = PolicyId::new(draft.id.clone())
            .ok()
            .and_then(|id| guard.latest(&id).map(|policy| policy.version()));

        let policy = match draft.validate(now, &self.limits, current_version) {
            Ok(policy) => Arc::new(policy),
            Err(err) => {
                warn!(
                    policy_id = %err.policy_id,
                    errors = err.errors.len(),
                    "policy upload rejected"
                );
                return Err(err);
            }
        };

        let mut next = PolicySnapshot::clone(&guard);
        next.generation += 1;
        next.lineages
            .entry(policy.id().clone())
            .or_default()
            .push(Arc::clone(&policy));
        let generation = next.generation;
        *guard = Arc::new(next);
        drop(guard);

        info!(
            policy_id = %policy.id(),
            version = policy.version(),
            generation,
            superseded = current_version.is_some(),
            "policy version stored"
        );
        Ok(policy)
    }

    /// Returns the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<PolicySnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Shorthand for `snapshot().active_policies(as_of)`.
    #[must_use]
    pub fn active_policies(&self, as_of: DateTime<Utc>) -> Vec<Arc<Policy>> {
        self.snapshot().active_policies(as_of)
    }

    /// Current generation counter.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.current.read().generation()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Condition;
    use crate::model::Rule;
    use chrono::{Duration, TimeZone};
    use gaas_primitives::Severity;
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()
    }

    fn draft(id: &str, version: u32, effective_at: DateTime<Utc>) -> PolicyDraft {
        PolicyDraft::new(id, format!("{id} v{version}"), PolicyType::Security, version, effective_at)
            .with_rule(Rule::new(
                Condition::equals("resource_accessed", format!("db-{version}")),
                Severity::Medium,
                "restricted database",
            ))
    }

    fn id(raw: &str) -> PolicyId {
        PolicyId::new(raw).unwrap()
    }

    #[test]
    fn newer_version_supersedes_but_keeps_history() {
        let store = PolicyStore::default();
        store.upsert(draft("P1", 1, now()), now()).unwrap();
        store.upsert(draft("P1", 2, now()), now()).unwrap();

        let active = store.active_policies(now());
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].version(), 2);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.versions(&id("P1")).len(), 2);
        assert_eq!(snapshot.generation(), 2);
        assert_eq!(snapshot.version_count(), 2);
    }

    #[test]
    fn pending_version_does_not_hide_active_one() {
        let store = PolicyStore::default();
        store.upsert(draft("P1", 1, now()), now()).unwrap();
        store
            .upsert(draft("P1", 2, now() + Duration::days(3)), now())
            .unwrap();

        assert_eq!(store.active_policies(now())[0].version(), 1);
        assert_eq!(
            store.active_policies(now() + Duration::days(3))[0].version(),
            2
        );
    }

    #[test]
    fn expired_policy_contributes_nothing() {
        let store = PolicyStore::default();
        store
            .upsert(
                draft("P1", 1, now()).expires_at(now() + Duration::hours(1)),
                now(),
            )
            .unwrap();
        assert!(store.active_policies(now() + Duration::hours(1)).is_empty());
    }

    #[test]
    fn stale_version_is_rejected_without_new_generation() {
        let store = PolicyStore::default();
        store.upsert(draft("P1", 3, now()), now()).unwrap();
        let err = store.upsert(draft("P1", 3, now()), now()).unwrap_err();
        assert_eq!(err.errors[0].field, "version");
        assert_eq!(store.generation(), 1);
    }

    #[test]
    fn snapshots_are_isolated_from_later_uploads() {
        let store = PolicyStore::default();
        store.upsert(draft("P1", 1, now()), now()).unwrap();
        let before = store.snapshot();
        store.upsert(draft("P2", 1, now()), now()).unwrap();

        assert_eq!(before.len(), 1);
        assert_eq!(store.snapshot().len(), 2);
    }

    #[test]
    fn active_policies_are_ordered_by_id() {
        let store = PolicyStore::default();
        for raw in ["P3", "P1", "P2"] {
            store.upsert(draft(raw, 1, now()), now()).unwrap();
        }
        let ids: Vec<_> = store
            .active_policies(now())
            .iter()
            .map(|policy| policy.id().to_string())
            .collect();
        assert_eq!(ids, vec!["P1", "P2", "P3"]);
        assert_eq!(store.snapshot().by_type(PolicyType::Security).len(), 3);
        assert!(store.snapshot().by_type(PolicyType::Compliance).is_empty());
    }

    proptest! {
        #[test]
        fn at_most_one_version_per_id(
            uploads in prop::collection::vec((0usize..3, 0i64..10, prop::option::of(1i64..10)), 1..40),
            offset_hours in 0i64..20,
        ) {
            let store = PolicyStore::default();
            let mut next_version = [1u32; 3];
            for (slot, offset, lifetime) in uploads {
                let effective = now() + Duration::hours(offset);
                let mut candidate = draft(&format!("P{slot}"), next_version[slot], effective);
                if let Some(hours) = lifetime {
                    candidate = candidate.expires_at(effective + Duration::hours(hours));
                }
                if store.upsert(candidate, now()).is_ok() {
                    next_version[slot] += 1;
                }
            }

            let active = store.active_policies(now() + Duration::hours(offset_hours));
            let mut ids: Vec<_> = active.iter().map(|p| p.id().clone()).collect();
            let total = ids.len();
            ids.dedup();
            prop_assert_eq!(ids.len(), total);
            for policy in &active {
                prop_assert!(policy.is_active(now() + Duration::hours(offset_hours)));
            }
        }
    }
}
