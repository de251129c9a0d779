//! Agent registration metadata submitted to the governance runtime.

use serde::{Deserialize, Serialize};

use crate::{AgentId, Error, Result};

const MAX_NAME_LEN: usize = 100;

/// Identity and capability description of an agent being registered.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRegistration {
    agent_id: AgentId,
    name: String,
    agent_type: String,
    capabilities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    contact_info: Option<String>,
}

impl AgentRegistration {
    /// Starts building an [`AgentRegistration`].
    #[must_use]
    pub fn builder(agent_id: AgentId) -> AgentRegistrationBuilder {
        AgentRegistrationBuilder {
            agent_id,
            name: None,
            agent_type: None,
            capabilities: Vec::new(),
            contact_info: None,
        }
    }

    /// Returns the agent identifier.
    #[must_use]
    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    /// Returns the agent display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the agent category label.
    #[must_use]
    pub fn agent_type(&self) -> &str {
        &self.agent_type
    }

    /// Returns the declared capabilities.
    #[must_use]
    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    /// Returns the optional owner contact.
    #[must_use]
    pub fn contact_info(&self) -> Option<&str> {
        self.contact_info.as_deref()
    }
}

/// Builder for [`AgentRegistration`].
#[derive(Debug)]
pub struct AgentRegistrationBuilder {
    agent_id: AgentId,
    name: Option<String>,
    agent_type: Option<String>,
    capabilities: Vec<String>,
    contact_info: Option<String>,
}

impl AgentRegistrationBuilder {
    /// Sets the human-readable name for the agent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRegistration`] when the name is empty or longer
    /// than 100 characters.
    pub fn name(mut self, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::InvalidRegistration {
                reason: "agent name cannot be empty".into(),
            });
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(Error::InvalidRegistration {
                reason: format!("agent name must be at most {MAX_NAME_LEN} characters"),
            });
        }
        self.name = Some(name);
        Ok(self)
    }

    /// Sets the agent category label.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRegistration`] when the label is empty.
    pub fn agent_type(mut self, agent_type: impl Into<String>) -> Result<Self> {
        let agent_type = agent_type.into();
        if agent_type.trim().is_empty() {
            return Err(Error::InvalidRegistration {
                reason: "agent type cannot be empty".into(),
            });
        }
        self.agent_type = Some(agent_type);
        Ok(self)
    }

    /// Adds a capability label.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRegistration`] when the supplied label is empty.
    pub fn add_capability(mut self, capability: impl Into<String>) -> Result<Self> {
        let capability = capability.into();
        if capability.trim().is_empty() {
            return Err(Error::InvalidRegistration {
                reason: "capability cannot be empty".into(),
            });
        }
        if !self.capabilities.contains(&capability) {
            self.capabilities.push(capability);
        }
        Ok(self)
    }

    /// Adds several capability labels.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRegistration`] if any supplied label is empty.
    pub fn capabilities<I, S>(mut self, capabilities: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for capability in capabilities {
            self = self.add_capability(capability)?;
        }
        Ok(self)
    }

    /// Sets the owner contact.
    #[must_use]
    pub fn contact_info(mut self, contact: impl Into<String>) -> Self {
        self.contact_info = Some(contact.into());
        self
    }

    /// Consumes the builder and returns the registration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRegistration`] if the name or type is missing or
    /// no capability was declared.
    pub fn build(self) -> Result<AgentRegistration> {
        let name = self.name.ok_or_else(|| Error::InvalidRegistration {
            reason: "agent name must be provided".into(),
        })?;
        let agent_type = self.agent_type.ok_or_else(|| Error::InvalidRegistration {
            reason: "agent type must be provided".into(),
        })?;
        if self.capabilities.is_empty() {
            return Err(Error::InvalidRegistration {
                reason: "agent must have at least one capability".into(),
            });
        }

        Ok(AgentRegistration {
            agent_id: self.agent_id,
            name,
            agent_type,
            capabilities: self.capabilities,
            contact_info: self.contact_info,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent_id() -> AgentId {
        AgentId::new("analyst-01").unwrap()
    }

    #[test]
    fn builds_registration() {
        let registration = AgentRegistration::builder(agent_id())
            .name("Analyst")
            .unwrap()
            .agent_type("data_analyst")
            .unwrap()
            .capabilities(["data_analysis", "reporting", "data_analysis"])
            .unwrap()
            .contact_info("owner@example.com")
            .build()
            .unwrap();

        assert_eq!(registration.name(), "Analyst");
        assert_eq!(registration.capabilities(), ["data_analysis", "reporting"]);
        assert_eq!(registration.contact_info(), Some("owner@example.com"));
    }

    #[test]
    fn capabilities_are_required() {
        let result = AgentRegistration::builder(agent_id())
            .name("Analyst")
            .unwrap()
            .agent_type("data_analyst")
            .unwrap()
            .build();
        assert!(matches!(result, Err(Error::InvalidRegistration { .. })));
    }

    #[test]
    fn name_is_required() {
        let result = AgentRegistration::builder(agent_id()).build();
        assert!(result.is_err());
    }
}
