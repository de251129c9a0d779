//! Identifier types.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Error;

const MIN_AGENT_ID_LEN: usize = 3;
const MAX_AGENT_ID_LEN: usize = 50;
const MAX_POLICY_ID_LEN: usize = 128;

/// Identifier of an agent known to the governance runtime.
///
/// Agent identifiers are chosen by the agent owner at registration time and
/// must be 3 to 50 characters of ASCII alphanumerics, `-`, `_`, `.` or `:`.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AgentId(String);

impl AgentId {
    /// Creates a new agent identifier after validating its format.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAgentId`] if the identifier is too short, too
    /// long, or contains unsupported characters.
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        let len = id.chars().count();
        if !(MIN_AGENT_ID_LEN..=MAX_AGENT_ID_LEN).contains(&len) {
            return Err(Error::InvalidAgentId {
                id,
                reason: format!(
                    "length must be between {MIN_AGENT_ID_LEN} and {MAX_AGENT_ID_LEN} characters"
                ),
            });
        }
        if !id.chars().all(is_identifier_char) {
            return Err(Error::InvalidAgentId {
                id,
                reason: "identifier must contain alphanumeric, dash, underscore, dot, or colon"
                    .into(),
            });
        }
        Ok(Self(id))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for AgentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AgentId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for AgentId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AgentId> for String {
    fn from(value: AgentId) -> Self {
        value.0
    }
}

/// Identifier shared by every version of a governance policy.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PolicyId(String);

impl PolicyId {
    /// Creates a new policy identifier after validating its format.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPolicyId`] when the identifier is empty, longer
    /// than 128 characters, or contains unsupported characters.
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(Error::InvalidPolicyId {
                id,
                reason: "identifier cannot be empty".into(),
            });
        }
        if id.chars().count() > MAX_POLICY_ID_LEN {
            return Err(Error::InvalidPolicyId {
                id,
                reason: format!("identifier length must be <= {MAX_POLICY_ID_LEN}"),
            });
        }
        if !id.chars().all(is_identifier_char) {
            return Err(Error::InvalidPolicyId {
                id,
                reason: "identifier must contain alphanumeric, dash, underscore, dot, or colon"
                    .into(),
            });
        }
        Ok(Self(id))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PolicyId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PolicyId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for PolicyId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PolicyId> for String {
    fn from(value: PolicyId) -> Self {
        value.0
    }
}

/// Unique identifier assigned to each submitted action record.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(Uuid);

impl ActionId {
    /// Generates a random action identifier.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an identifier from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl Display for ActionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for ActionId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')
}
