//! Severity and action classification vocabularies.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Ordered severity attached to governance rules and the violations they produce.
///
/// The derived ordering is `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational breach; never escalates on its own.
    Low,
    /// Breach that warrants a warning.
    Medium,
    /// Breach that blocks the action.
    High,
    /// Breach that suspends the agent.
    Critical,
}

impl Severity {
    /// All severities in ascending order.
    pub const ALL: [Self; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    /// Returns the wire label for the severity.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Returns `true` for `Medium` and anything worse.
    #[must_use]
    pub fn is_medium_or_worse(self) -> bool {
        self >= Self::Medium
    }
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|severity| severity.as_str() == s)
            .ok_or_else(|| Error::UnknownLabel {
                kind: "severity",
                value: s.to_owned(),
            })
    }
}

/// Category of action an agent performs or proposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Reading or querying data.
    DataAccess,
    /// Creating, modifying, or deleting system state.
    SystemModification,
    /// Interacting with end users.
    UserInteraction,
    /// Calling a service outside the governed boundary.
    ExternalApiCall,
}

const DATA_ACCESS_KEYWORDS: &[&str] = &["read", "access", "view", "get"];
const MODIFICATION_KEYWORDS: &[&str] = &["modify", "update", "delete", "create", "write"];
const INTERACTION_KEYWORDS: &[&str] = &["user", "interact", "message", "notify"];
const EXTERNAL_KEYWORDS: &[&str] = &["api", "external", "call", "request"];

impl ActionType {
    /// All action types in declaration order.
    pub const ALL: [Self; 4] = [
        Self::DataAccess,
        Self::SystemModification,
        Self::UserInteraction,
        Self::ExternalApiCall,
    ];

    /// Returns the wire label for the action type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DataAccess => "data_access",
            Self::SystemModification => "system_modification",
            Self::UserInteraction => "user_interaction",
            Self::ExternalApiCall => "external_api_call",
        }
    }

    /// Classifies a free-text proposed action by keyword.
    ///
    /// Keyword groups are checked in a fixed order and the first group with a
    /// hit wins; descriptions with no known keyword fall back to
    /// [`ActionType::DataAccess`].
    #[must_use]
    pub fn classify(description: &str) -> Self {
        let lowered = description.to_lowercase();
        let hit = |keywords: &[&str]| keywords.iter().any(|kw| lowered.contains(kw));

        if hit(DATA_ACCESS_KEYWORDS) {
            Self::DataAccess
        } else if hit(MODIFICATION_KEYWORDS) {
            Self::SystemModification
        } else if hit(INTERACTION_KEYWORDS) {
            Self::UserInteraction
        } else if hit(EXTERNAL_KEYWORDS) {
            Self::ExternalApiCall
        } else {
            Self::DataAccess
        }
    }
}

impl Display for ActionType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::UnknownLabel {
                kind: "action type",
                value: s.to_owned(),
            })
    }
}
