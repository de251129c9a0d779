//! Policy, rule and upload payload types.

use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use gaas_primitives::{ActionType, AgentId, PolicyId, Severity};
use serde::{Deserialize, Deserializer, Serialize};

use crate::condition::{Condition, DEFAULT_MAX_DEPTH};
use crate::error::{FieldError, PolicyResult, PolicyValidationError};

/// Violation label used when a rule does not name one.
pub const DEFAULT_VIOLATION_TYPE: &str = "policy_violation";

/// Agent scope entry that matches every agent.
pub const WILDCARD_SCOPE: &str = "*";

/// Closed set of policy categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyType {
    /// Who may touch which resources.
    AccessControl,
    /// Handling of data at rest and in motion.
    DataGovernance,
    /// Regulatory and organisational obligations.
    Compliance,
    /// Protection of systems and credentials.
    Security,
}

impl PolicyType {
    /// Returns the wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AccessControl => "access_control",
            Self::DataGovernance => "data_governance",
            Self::Compliance => "compliance",
            Self::Security => "security",
        }
    }
}

impl Display for PolicyType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a matching rule asks of the enforcement layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    /// The action may proceed once approved.
    RequireAuthorization,
    /// The action must not proceed.
    Deny,
    /// Record the match without asking for anything.
    #[default]
    Flag,
}

/// Approval authority, ordered from least to most senior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalLevel {
    /// Direct supervisor of the agent owner.
    Supervisor,
    /// Security officer.
    SecurityOfficer,
    /// Compliance officer.
    ComplianceOfficer,
}

impl ApprovalLevel {
    /// Returns the wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Supervisor => "supervisor",
            Self::SecurityOfficer => "security_officer",
            Self::ComplianceOfficer => "compliance_officer",
        }
    }
}

/// Remediation metadata attached to a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remediation {
    /// Who must approve before the agent may retry.
    pub required_approval: ApprovalLevel,
    /// Suggested safer alternatives.
    #[serde(default)]
    pub alternative_actions: Vec<String>,
}

/// One condition to severity mapping inside a policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    condition: Condition,
    #[serde(default)]
    action: RuleAction,
    severity: Severity,
    description: String,
    #[serde(default = "default_violation_type")]
    violation_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    remediation: Option<Remediation>,
}

fn default_violation_type() -> String {
    DEFAULT_VIOLATION_TYPE.to_owned()
}

impl Rule {
    /// Creates a rule that flags matches with the default violation type.
    #[must_use]
    pub fn new(condition: Condition, severity: Severity, description: impl Into<String>) -> Self {
        Self {
            condition,
            action: RuleAction::default(),
            severity,
            description: description.into(),
            violation_type: default_violation_type(),
            remediation: None,
        }
    }

    /// Sets the action requested on match.
    #[must_use]
    pub fn with_action(mut self, action: RuleAction) -> Self {
        self.action = action;
        self
    }

    /// Sets the violation label.
    #[must_use]
    pub fn with_violation_type(mut self, violation_type: impl Into<String>) -> Self {
        self.violation_type = violation_type.into();
        self
    }

    /// Attaches remediation metadata.
    #[must_use]
    pub fn with_remediation(mut self, remediation: Remediation) -> Self {
        self.remediation = Some(remediation);
        self
    }

    /// Returns the condition.
    #[must_use]
    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    /// Returns the action requested on match.
    #[must_use]
    pub const fn action(&self) -> RuleAction {
        self.action
    }

    /// Returns the severity.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        self.severity
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the violation label.
    #[must_use]
    pub fn violation_type(&self) -> &str {
        &self.violation_type
    }

    /// Returns remediation metadata, if any.
    #[must_use]
    pub fn remediation(&self) -> Option<&Remediation> {
        self.remediation.as_ref()
    }

    fn validate(&self, path: &str, max_depth: usize, errors: &mut Vec<FieldError>) {
        if self.description.trim().is_empty() {
            errors.push(FieldError::new(
                format!("{path}.description"),
                "rule description cannot be empty",
            ));
        }
        if self.violation_type.trim().is_empty() {
            errors.push(FieldError::new(
                format!("{path}.violation_type"),
                "violation type cannot be empty",
            ));
        }
        if let Some(remediation) = &self.remediation
            && remediation
                .alternative_actions
                .iter()
                .any(|alt| alt.trim().is_empty())
        {
            errors.push(FieldError::new(
                format!("{path}.remediation.alternative_actions"),
                "alternative actions cannot be blank",
            ));
        }
        self.condition
            .validate(&format!("{path}.condition"), max_depth, errors);
    }
}

/// Agents and action types a policy applies to. Empty lists match everything.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PolicyScope {
    /// Agent identifiers, or `*` for all agents.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agent_scope: Vec<String>,
    /// Action types the policy governs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub action_types: Vec<ActionType>,
}

impl PolicyScope {
    /// Returns `true` when the policy governs `agent` performing `action_type`.
    #[must_use]
    pub fn applies_to(&self, agent: &AgentId, action_type: ActionType) -> bool {
        let agent_ok = self.agent_scope.is_empty()
            || self
                .agent_scope
                .iter()
                .any(|entry| entry == WILDCARD_SCOPE || entry == agent.as_str());
        let type_ok = self.action_types.is_empty() || self.action_types.contains(&action_type);
        agent_ok && type_ok
    }
}

/// The `policy_content` section of an upload: rules plus scope.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PolicyContent {
    /// Ordered rules.
    #[serde(default)]
    pub rules: Vec<Rule>,
    /// Applicability filter.
    #[serde(flatten)]
    pub scope: PolicyScope,
}

/// Lifecycle status derived from the effective window and a reference time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyStatus {
    /// Not yet effective.
    Pending,
    /// Effective and not expired.
    Active,
    /// Past its expiry.
    Expired,
}

/// Limits applied when validating uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyLimits {
    /// How far in the future an effective date may lie.
    pub max_effective_lead_days: u32,
    /// Deepest accepted condition tree.
    pub max_condition_depth: usize,
    /// Most rules a single policy may carry.
    pub max_rules_per_policy: usize,
}

impl Default for PolicyLimits {
    fn default() -> Self {
        Self {
            max_effective_lead_days: 365,
            max_condition_depth: DEFAULT_MAX_DEPTH,
            max_rules_per_policy: 256,
        }
    }
}

/// Unvalidated policy payload as received from an uploader.
///
/// Field names follow the upload wire format (`policy_id`, `policy_name`,
/// `policy_content`, `effective_date`, `expiry_date`). `version` accepts a
/// JSON integer or a string holding one; timestamps without an offset are
/// read as UTC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDraft {
    /// Policy identifier shared by all versions.
    #[serde(rename = "policy_id")]
    pub id: String,
    /// Display name.
    #[serde(rename = "policy_name")]
    pub name: String,
    /// Category.
    pub policy_type: PolicyType,
    /// Rules and scope.
    #[serde(rename = "policy_content")]
    pub content: PolicyContent,
    /// Positive version number, strictly increasing per id.
    #[serde(deserialize_with = "wire::version")]
    pub version: u32,
    /// Start of the active window.
    #[serde(rename = "effective_date", deserialize_with = "wire::timestamp")]
    pub effective_at: DateTime<Utc>,
    /// End of the active window (exclusive).
    #[serde(
        rename = "expiry_date",
        default,
        deserialize_with = "wire::optional_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_at: Option<DateTime<Utc>>,
}

impl PolicyDraft {
    /// Starts a draft with no rules.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        policy_type: PolicyType,
        version: u32,
        effective_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            policy_type,
            content: PolicyContent::default(),
            version,
            effective_at,
            expires_at: None,
        }
    }

    /// Appends a rule.
    #[must_use]
    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.content.rules.push(rule);
        self
    }

    /// Sets the expiry.
    #[must_use]
    pub fn expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Sets the applicability scope.
    #[must_use]
    pub fn with_scope(mut self, scope: PolicyScope) -> Self {
        self.content.scope = scope;
        self
    }

    /// Parses a draft from a JSON document in the upload wire format.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`serde_json::Error`] when the document does not
    /// have the expected shape.
    pub fn from_json_str(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    /// Validates the draft and freezes it into a [`Policy`].
    ///
    /// `current_version` is the highest version already stored for this id.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyValidationError`] listing every field-level problem.
    pub fn validate(
        self,
        now: DateTime<Utc>,
        limits: &PolicyLimits,
        current_version: Option<u32>,
    ) -> PolicyResult<Policy> {
        let mut errors = Vec::new();

        let id = match PolicyId::new(self.id.clone()) {
            Ok(id) => Some(id),
            Err(err) => {
                errors.push(FieldError::new("policy_id", err.to_string()));
                None
            }
        };
        if self.name.trim().is_empty() {
            errors.push(FieldError::new("policy_name", "policy name cannot be empty"));
        }

        if self.version == 0 {
            errors.push(FieldError::new("version", "version must be at least 1"));
        } else if let Some(current) = current_version
            && self.version <= current
        {
            errors.push(FieldError::new(
                "version",
                format!(
                    "version {} does not supersede stored version {current}",
                    self.version
                ),
            ));
        }

        let horizon = Duration::try_days(i64::from(limits.max_effective_lead_days))
            .and_then(|lead| now.checked_add_signed(lead));
        if horizon.is_some_and(|horizon| self.effective_at > horizon) {
            errors.push(FieldError::new(
                "effective_date",
                format!(
                    "effective date cannot be more than {} days in the future",
                    limits.max_effective_lead_days
                ),
            ));
        }
        if let Some(expires_at) = self.expires_at
            && expires_at <= self.effective_at
        {
            errors.push(FieldError::new(
                "expiry_date",
                "expiry date must be after effective date",
            ));
        }

        let rules = &self.content.rules;
        if rules.is_empty() {
            errors.push(FieldError::new(
                "policy_content.rules",
                "policy must contain at least one rule",
            ));
        } else if rules.len() > limits.max_rules_per_policy {
            errors.push(FieldError::new(
                "policy_content.rules",
                format!(
                    "policy carries {} rules; the limit is {}",
                    rules.len(),
                    limits.max_rules_per_policy
                ),
            ));
        }
        for (index, rule) in rules.iter().enumerate() {
            rule.validate(
                &format!("policy_content.rules[{index}]"),
                limits.max_condition_depth,
                &mut errors,
            );
        }
        if self
            .content
            .scope
            .agent_scope
            .iter()
            .any(|entry| entry.trim().is_empty())
        {
            errors.push(FieldError::new(
                "policy_content.agent_scope",
                "agent scope entries cannot be blank",
            ));
        }

        match id {
            Some(id) if errors.is_empty() => Ok(Policy {
                id,
                name: self.name,
                policy_type: self.policy_type,
                content: self.content,
                version: self.version,
                effective_at: self.effective_at,
                expires_at: self.expires_at,
                uploaded_at: now,
            }),
            _ => Err(PolicyValidationError {
                policy_id: self.id,
                errors,
            }),
        }
    }
}

/// A validated, immutable policy version.
///
/// Only obtainable through [`PolicyDraft::validate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Policy {
    #[serde(rename = "policy_id")]
    id: PolicyId,
    #[serde(rename = "policy_name")]
    name: String,
    policy_type: PolicyType,
    #[serde(rename = "policy_content")]
    content: PolicyContent,
    version: u32,
    #[serde(rename = "effective_date")]
    effective_at: DateTime<Utc>,
    #[serde(rename = "expiry_date", skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
    uploaded_at: DateTime<Utc>,
}

impl Policy {
    /// Returns the identifier.
    #[must_use]
    pub fn id(&self) -> &PolicyId {
        &self.id
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the category.
    #[must_use]
    pub const fn policy_type(&self) -> PolicyType {
        self.policy_type
    }

    /// Returns the ordered rules.
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.content.rules
    }

    /// Returns the applicability scope.
    #[must_use]
    pub fn scope(&self) -> &PolicyScope {
        &self.content.scope
    }

    /// Returns the version number.
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Returns the start of the active window.
    #[must_use]
    pub const fn effective_at(&self) -> DateTime<Utc> {
        self.effective_at
    }

    /// Returns the end of the active window, if any.
    #[must_use]
    pub const fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Returns when this version was accepted.
    #[must_use]
    pub const fn uploaded_at(&self) -> DateTime<Utc> {
        self.uploaded_at
    }

    #[cfg(test)]
    pub(crate) fn unchecked(draft: PolicyDraft, now: DateTime<Utc>) -> Self {
        Self {
            id: PolicyId::new(draft.id).unwrap(),
            name: draft.name,
            policy_type: draft.policy_type,
            content: draft.content,
            version: draft.version,
            effective_at: draft.effective_at,
            expires_at: draft.expires_at,
            uploaded_at: now,
        }
    }

    /// Derives the status at `as_of`.
    #[must_use]
    pub fn status(&self, as_of: DateTime<Utc>) -> PolicyStatus {
        if as_of < self.effective_at {
            PolicyStatus::Pending
        } else if self.expires_at.is_some_and(|expiry| as_of >= expiry) {
            PolicyStatus::Expired
        } else {
            PolicyStatus::Active
        }
    }

    /// Returns `true` when `effective_at <= as_of < expires_at`.
    #[must_use]
    pub fn is_active(&self, as_of: DateTime<Utc>) -> bool {
        self.status(as_of) == PolicyStatus::Active
    }
}

mod wire {
    use super::{DateTime, Deserialize, Deserializer, NaiveDateTime, Utc};
    use serde::de::Error as _;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawVersion {
        Number(u64),
        Text(String),
    }

    pub(super) fn version<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        let parsed = match RawVersion::deserialize(deserializer)? {
            RawVersion::Number(number) => u32::try_from(number).ok(),
            RawVersion::Text(text) => text.trim().parse::<u32>().ok(),
        };
        parsed.ok_or_else(|| D::Error::custom("version must be a positive integer"))
    }

    fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }

    pub(super) fn timestamp<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_timestamp(&raw)
            .ok_or_else(|| D::Error::custom(format!("`{raw}` is not an ISO-8601 timestamp")))
    }

    pub(super) fn optional_timestamp<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(raw) => parse_timestamp(&raw)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("`{raw}` is not an ISO-8601 timestamp"))),
        }
    }
}
