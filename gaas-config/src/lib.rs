//! Runtime configuration for the governance service.
//!
//! [`GovernanceConfig`] composes the settings owned by each crate. Values are
//! resolved in layers, later layers winning:
//!
//! 1. compiled defaults,
//! 2. an optional JSON file,
//! 3. `GAAS_*` environment variables.
//!
//! The result is validated before it is returned.

#![warn(missing_docs, clippy::pedantic)]

mod error;

use std::path::{Path, PathBuf};
use std::str::FromStr;

use gaas_audit::LedgerConfig;
use gaas_compliance::ReportConfig;
use gaas_enforcement::EscalationPolicy;
use gaas_policy::PolicyLimits;
use gaas_telemetry::{LogFormat, TelemetryConfig};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use error::{ConfigError, ConfigResult};

/// Log filter directives.
pub const ENV_LOG: &str = "GAAS_LOG";
/// Log format: `pretty`, `compact` or `json`.
pub const ENV_LOG_FORMAT: &str = "GAAS_LOG_FORMAT";
/// Path of the NDJSON audit journal.
pub const ENV_JOURNAL_PATH: &str = "GAAS_JOURNAL_PATH";
/// Directory of `*.json` policies loaded at startup.
pub const ENV_POLICY_DIR: &str = "GAAS_POLICY_DIR";
/// Trailing escalation window in seconds.
pub const ENV_ESCALATION_WINDOW_SECS: &str = "GAAS_ESCALATION_WINDOW_SECS";
/// Medium-or-worse violations in the window that force `block`.
pub const ENV_REPEATED_VIOLATION_THRESHOLD: &str = "GAAS_REPEATED_VIOLATION_THRESHOLD";
/// Cumulative blocks that force `suspend`.
pub const ENV_SUSPENSION_BLOCK_THRESHOLD: &str = "GAAS_SUSPENSION_BLOCK_THRESHOLD";
/// History entries kept per agent.
pub const ENV_HISTORY_LIMIT: &str = "GAAS_HISTORY_LIMIT";
/// Violation descriptions listed in reports.
pub const ENV_REPORT_TOP_N: &str = "GAAS_REPORT_TOP_N";
/// Days decisions are retained for reporting.
pub const ENV_RETENTION_DAYS: &str = "GAAS_RETENTION_DAYS";

/// Longest accepted `policy.max_effective_lead_days`.
pub const MAX_EFFECTIVE_LEAD_DAYS: u32 = 36_500;
/// Longest accepted `escalation.suspension_hours`.
pub const MAX_SUSPENSION_HOURS: u32 = 87_600;

/// Complete runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    /// Escalation thresholds for the decision engine.
    pub escalation: EscalationPolicy,
    /// Upload validation limits.
    pub policy: PolicyLimits,
    /// Report thresholds.
    pub report: ReportConfig,
    /// Decision retention.
    pub ledger: LedgerConfig,
    /// Log output.
    pub telemetry: TelemetryConfig,
    /// NDJSON audit journal; disabled when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journal_path: Option<PathBuf>,
    /// Policy directory loaded at startup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_dir: Option<PathBuf>,
}

impl GovernanceConfig {
    /// Resolves defaults, then `file` if given, then the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or parsed, an
    /// environment value is malformed, or validation fails.
    pub fn load(file: Option<&Path>) -> ConfigResult<Self> {
        let base = match file {
            Some(path) => Self::from_json_file(path)?,
            None => Self::default(),
        };
        let config = base.with_env_lookup(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON file; missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] or [`ConfigError::Parse`].
    pub fn from_json_file(path: &Path) -> ConfigResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Parses a JSON document; missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`].
    pub fn from_json_str(raw: &str) -> ConfigResult<Self> {
        serde_json::from_str(raw).map_err(|source| ConfigError::Parse {
            path: "<string>".to_owned(),
            source,
        })
    }

    /// Defaults overlaid with variables from `lookup`, then validated.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a value is malformed or out of range.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self::default().with_env_lookup(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with the process environment, then validated.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a value is malformed or out of range.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Applies `GAAS_*` overrides from `lookup` on top of `self`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] when a value does not parse.
    pub fn with_env_lookup<F>(mut self, lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(filter) = lookup(ENV_LOG) {
            self.telemetry.filter = filter;
        }
        if let Some(format) = parsed::<LogFormat>(&lookup, ENV_LOG_FORMAT)? {
            self.telemetry.format = format;
        }
        if let Some(path) = lookup(ENV_JOURNAL_PATH).filter(|v| !v.trim().is_empty()) {
            self.journal_path = Some(PathBuf::from(path));
        }
        if let Some(dir) = lookup(ENV_POLICY_DIR).filter(|v| !v.trim().is_empty()) {
            self.policy_dir = Some(PathBuf::from(dir));
        }
        if let Some(secs) = parsed(&lookup, ENV_ESCALATION_WINDOW_SECS)? {
            self.escalation.trailing_window_secs = secs;
        }
        if let Some(threshold) = parsed(&lookup, ENV_REPEATED_VIOLATION_THRESHOLD)? {
            self.escalation.repeated_violation_threshold = threshold;
        }
        if let Some(threshold) = parsed(&lookup, ENV_SUSPENSION_BLOCK_THRESHOLD)? {
            self.escalation.suspension_block_threshold = threshold;
        }
        if let Some(limit) = parsed(&lookup, ENV_HISTORY_LIMIT)? {
            self.escalation.history_limit = limit;
        }
        if let Some(top) = parsed(&lookup, ENV_REPORT_TOP_N)? {
            self.report.top_violations = top;
        }
        if let Some(days) = parsed(&lookup, ENV_RETENTION_DAYS)? {
            self.ledger.retention_days = days;
        }
        debug!(journal = ?self.journal_path, "environment overrides applied");
        Ok(self)
    }

    /// Rejects zero windows and limits, rates outside `[0, 1]`, and lead or
    /// suspension spans beyond [`MAX_EFFECTIVE_LEAD_DAYS`] and
    /// [`MAX_SUSPENSION_HOURS`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> ConfigResult<()> {
        let checks: [(bool, &'static str, &'static str); 13] = [
            (self.escalation.trailing_window_secs == 0, "escalation.trailing_window_secs", "must be greater than 0"),
            (self.escalation.repeated_violation_threshold == 0, "escalation.repeated_violation_threshold", "must be greater than 0"),
            (self.escalation.suspension_block_threshold == 0, "escalation.suspension_block_threshold", "must be greater than 0"),
            (self.escalation.history_limit == 0, "escalation.history_limit", "must be greater than 0"),
            (self.escalation.suspension_hours > MAX_SUSPENSION_HOURS, "escalation.suspension_hours", "must be at most 87600 (ten years)"),
            (self.policy.max_effective_lead_days > MAX_EFFECTIVE_LEAD_DAYS, "policy.max_effective_lead_days", "must be at most 36500 (one hundred years)"),
            (self.policy.max_condition_depth == 0, "policy.max_condition_depth", "must be greater than 0"),
            (self.policy.max_rules_per_policy == 0, "policy.max_rules_per_policy", "must be greater than 0"),
            (self.report.top_violations == 0, "report.top_violations", "must be greater than 0"),
            (!(0.0..=1.0).contains(&self.report.policy_review_rate), "report.policy_review_rate", "must be between 0.0 and 1.0"),
            (!(0.0..=1.0).contains(&self.report.min_compliance_rate), "report.min_compliance_rate", "must be between 0.0 and 1.0"),
            (self.ledger.retention_days == 0, "ledger.retention_days", "must be greater than 0"),
            (self.ledger.max_entries == 0, "ledger.max_entries", "must be greater than 0"),
        ];
        match checks.into_iter().find(|(failed, _, _)| *failed) {
            Some((_, field, message)) => Err(ConfigError::Invalid { field, message }),
            None => Ok(()),
        }
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, var: &'static str) -> ConfigResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(value) = lookup(var) else {
        return Ok(None);
    };
    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|err: T::Err| ConfigError::InvalidEnv {
            var,
            value,
            message: err.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = GovernanceConfig::default();
        config.validate().unwrap();
        assert_eq!(config.escalation.trailing_window_secs, 604_800);
        assert_eq!(config.report.top_violations, 5);
        assert_eq!(config.ledger.retention_days, 90);
        assert!(config.journal_path.is_none());
    }

    #[test]
    fn environment_overrides_apply() {
        let config = GovernanceConfig::from_lookup(lookup(&[
            (ENV_LOG, "debug"),
            (ENV_LOG_FORMAT, "json"),
            (ENV_JOURNAL_PATH, "/tmp/gaas/audit.ndjson"),
            (ENV_ESCALATION_WINDOW_SECS, "3600"),
            (ENV_SUSPENSION_BLOCK_THRESHOLD, "5"),
            (ENV_REPORT_TOP_N, "3"),
        ]))
        .unwrap();

        assert_eq!(config.telemetry.filter, "debug");
        assert_eq!(config.telemetry.format, LogFormat::Json);
        assert_eq!(config.journal_path, Some(PathBuf::from("/tmp/gaas/audit.ndjson")));
        assert_eq!(config.escalation.trailing_window_secs, 3600);
        assert_eq!(config.escalation.suspension_block_threshold, 5);
        assert_eq!(config.report.top_violations, 3);
    }

    #[test]
    fn malformed_environment_values_are_reported() {
        let err = GovernanceConfig::from_lookup(lookup(&[(ENV_HISTORY_LIMIT, "lots")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { var: ENV_HISTORY_LIMIT, .. }));

        let err = GovernanceConfig::from_lookup(lookup(&[(ENV_LOG_FORMAT, "xml")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { var: ENV_LOG_FORMAT, .. }));
    }

    #[test]
    fn zero_limits_fail_validation() {
        let err = GovernanceConfig::from_lookup(lookup(&[(ENV_RETENTION_DAYS, "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "ledger.retention_days", .. }));
    }

    #[test]
    fn unbounded_spans_fail_validation() {
        let mut config = GovernanceConfig::default();
        config.policy.max_effective_lead_days = u32::MAX;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "policy.max_effective_lead_days", .. })
        ));

        config.policy.max_effective_lead_days = MAX_EFFECTIVE_LEAD_DAYS;
        config.escalation.suspension_hours = MAX_SUSPENSION_HOURS + 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "escalation.suspension_hours", .. })
        ));

        config.escalation.suspension_hours = MAX_SUSPENSION_HOURS;
        config.validate().unwrap();
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = GovernanceConfig::from_json_str(
            r#"{"report": {"min_compliance_rate": 0.95}, "escalation": {"history_limit": 10}}"#,
        )
        .unwrap();
        assert!((config.report.min_compliance_rate - 0.95).abs() < f64::EPSILON);
        assert_eq!(config.report.top_violations, 5);
        assert_eq!(config.escalation.history_limit, 10);
        assert_eq!(config.escalation.suspension_block_threshold, 3);

        let mut config = config;
        config.report.policy_review_rate = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "report.policy_review_rate", .. })
        ));
    }

    #[test]
    fn file_layer_then_environment() {
        let mut path = std::env::temp_dir();
        path.push(format!("gaas-config-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, r#"{"telemetry": {"filter": "warn"}, "ledger": {"max_entries": 50}}"#).unwrap();

        let config = GovernanceConfig::from_json_file(&path)
            .unwrap()
            .with_env_lookup(lookup(&[(ENV_LOG, "trace")]))
            .unwrap();
        assert_eq!(config.telemetry.filter, "trace");
        assert_eq!(config.ledger.max_entries, 50);

        std::fs::remove_file(&path).unwrap();
        assert!(matches!(
            GovernanceConfig::from_json_file(&path),
            Err(ConfigError::Io { .. })
        ));
    }
}
