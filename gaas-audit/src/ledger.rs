//! In-memory decision history with time and size based retention.

use std::collections::VecDeque;
use std::num::NonZeroUsize;

use chrono::{DateTime, Duration, Utc};
use gaas_enforcement::EnforcementDecision;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::{AuditError, AuditResult};

/// Retention settings for the [`HistoryLedger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Entries older than this many days are evicted.
    pub retention_days: u32,
    /// Hard cap on retained entries; the oldest are evicted first.
    pub max_entries: usize,
}

impl LedgerConfig {
    /// Checks that both limits are non-zero.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::InvalidConfig`] when a limit is zero.
    pub fn validate(&self) -> AuditResult<()> {
        if self.retention_days == 0 {
            return Err(AuditError::InvalidConfig("retention_days must be positive"));
        }
        if self.max_entries == 0 {
            return Err(AuditError::InvalidConfig("max_entries must be positive"));
        }
        Ok(())
    }

    fn retention(self) -> Duration {
        Duration::days(i64::from(self.retention_days))
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            retention_days: 90,
            max_entries: 100_000,
        }
    }
}

/// Append-only decision history, oldest first.
#[derive(Debug)]
pub struct HistoryLedger {
    config: LedgerConfig,
    capacity: NonZeroUsize,
    entries: RwLock<VecDeque<EnforcementDecision>>,
}

impl HistoryLedger {
    /// Creates a ledger.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::InvalidConfig`] when the configuration is rejected.
    pub fn new(config: LedgerConfig) -> AuditResult<Self> {
        config.validate()?;
        let capacity = NonZeroUsize::new(config.max_entries)
            .ok_or(AuditError::InvalidConfig("max_entries must be positive"))?;
        Ok(Self {
            config,
            capacity,
            entries: RwLock::new(VecDeque::new()),
        })
    }

    /// Returns the retention settings.
    #[must_use]
    pub const fn config(&self) -> LedgerConfig {
        self.config
    }

    /// Records `decision`, then evicts entries past retention as of `now`.
    pub async fn push(&self, decision: EnforcementDecision, now: DateTime<Utc>) {
        let mut guard = self.entries.write().await;
        guard.push_back(decision);
        while guard.len() > self.capacity.get() {
            guard.pop_front();
        }
        evict_expired(&mut guard, now, self.config.retention());
    }

    /// Evicts entries past retention as of `now`; returns how many were dropped.
    pub async fn prune(&self, now: DateTime<Utc>) -> usize {
        let mut guard = self.entries.write().await;
        evict_expired(&mut guard, now, self.config.retention())
    }

    /// Clones every retained decision, oldest first.
    #[must_use]
    pub async fn decisions(&self) -> Vec<EnforcementDecision> {
        self.entries.read().await.iter().cloned().collect()
    }

    /// Returns the most recent decisions up to `limit`, oldest first.
    #[must_use]
    pub async fn recent(&self, limit: usize) -> Vec<EnforcementDecision> {
        let guard = self.entries.read().await;
        let skip = guard.len().saturating_sub(limit);
        guard.iter().skip(skip).cloned().collect()
    }

    /// Returns utilisation figures.
    #[must_use]
    pub async fn stats(&self) -> LedgerStats {
        let guard = self.entries.read().await;
        LedgerStats {
            entries: guard.len(),
            capacity: self.capacity.get(),
            oldest: guard.front().map(EnforcementDecision::timestamp),
            newest: guard.back().map(EnforcementDecision::timestamp),
        }
    }
}

fn evict_expired(
    entries: &mut VecDeque<EnforcementDecision>,
    now: DateTime<Utc>,
    retention: Duration,
) -> usize {
    let Some(cutoff) = now.checked_sub_signed(retention) else {
        return 0;
    };
    // Decisions may arrive out of timestamp order, so scan rather than pop.
    let before = entries.len();
    entries.retain(|decision| decision.timestamp() >= cutoff);
    before - entries.len()
}

/// Snapshot describing utilisation of the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerStats {
    /// Entries currently retained.
    pub entries: usize,
    /// Maximum number of entries permitted.
    pub capacity: usize,
    /// Timestamp of the oldest retained entry.
    pub oldest: Option<DateTime<Utc>>,
    /// Timestamp of the newest retained entry.
    pub newest: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use gaas_enforcement::DecisionEngine;
    use gaas_primitives::{ActionRecord, ActionType, AgentId};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
    }

    fn decision(engine: &DecisionEngine, at: DateTime<Utc>) -> EnforcementDecision {
        let action = ActionRecord::builder(AgentId::new("ledger-agent").unwrap(), ActionType::DataAccess, "read")
            .timestamp(at)
            .build()
            .unwrap();
        engine.enforce(&action, Ok(Vec::new()))
    }

    #[test]
    fn zero_limits_are_rejected() {
        let config = LedgerConfig { retention_days: 0, ..LedgerConfig::default() };
        assert!(HistoryLedger::new(config).is_err());
        let config = LedgerConfig { max_entries: 0, ..LedgerConfig::default() };
        assert!(HistoryLedger::new(config).is_err());
    }

    #[tokio::test]
    async fn respects_capacity() {
        let ledger = HistoryLedger::new(LedgerConfig { retention_days: 30, max_entries: 2 }).unwrap();
        let engine = DecisionEngine::default();
        for minutes in 0..3 {
            ledger.push(decision(&engine, t0() + Duration::minutes(minutes)), t0()).await;
        }

        let recent = ledger.recent(10).await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].timestamp(), t0() + Duration::minutes(1));
        assert_eq!(ledger.stats().await.capacity, 2);
    }

    #[tokio::test]
    async fn evicts_past_retention() {
        let ledger = HistoryLedger::new(LedgerConfig { retention_days: 7, max_entries: 100 }).unwrap();
        let engine = DecisionEngine::default();
        ledger.push(decision(&engine, t0()), t0()).await;
        ledger.push(decision(&engine, t0() + Duration::days(5)), t0() + Duration::days(5)).await;

        assert_eq!(ledger.prune(t0() + Duration::days(8)).await, 1);
        let stats = ledger.stats().await;
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.oldest, Some(t0() + Duration::days(5)));
    }
}
