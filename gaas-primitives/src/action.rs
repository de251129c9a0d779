//! Immutable action records and their structured context.

use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{ActionId, ActionType, AgentId, Error, Result};

/// Key/value context supplied with an action.
///
/// Values may be primitives or nested objects; nested values are addressed
/// with dotted paths such as `resource_usage.cpu`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionContext(Map<String, Value>);

impl ActionContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a context from a raw JSON document.
    ///
    /// An empty or whitespace-only document yields an empty context.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedContext`] when the document is not valid JSON
    /// or is not a JSON object.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let value: Value = serde_json::from_str(raw).map_err(|err| Error::MalformedContext {
            reason: err.to_string(),
        })?;
        Self::try_from(value)
    }

    /// Inserts a value, replacing any previous value for the key.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Adds a value and returns the updated context.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.insert(key, value);
        self
    }

    /// Resolves a dotted path against the context.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.0.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Returns the underlying map.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Returns `true` when the context holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for ActionContext {
    fn from(value: Map<String, Value>) -> Self {
        Self(value)
    }
}

impl TryFrom<Value> for ActionContext {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::default()),
            other => Err(Error::MalformedContext {
                reason: format!("context must be a JSON object, got {}", json_kind(&other)),
            }),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// An action performed or proposed by an agent. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    id: ActionId,
    agent_id: AgentId,
    action_type: ActionType,
    description: String,
    #[serde(default)]
    context: ActionContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    resource_accessed: Option<String>,
    timestamp: DateTime<Utc>,
}

impl ActionRecord {
    /// Field name resolving to the action type label.
    pub const FIELD_ACTION_TYPE: &'static str = "action_type";
    /// Field name resolving to the accessed resource.
    pub const FIELD_RESOURCE: &'static str = "resource_accessed";
    /// Field name resolving to the free-text description.
    pub const FIELD_DESCRIPTION: &'static str = "action_description";
    /// Field name resolving to the submitting agent.
    pub const FIELD_AGENT_ID: &'static str = "agent_id";
    /// Field name resolving to the RFC 3339 action timestamp.
    pub const FIELD_TIMESTAMP: &'static str = "timestamp";

    /// Starts building an action record.
    #[must_use]
    pub fn builder(
        agent_id: AgentId,
        action_type: ActionType,
        description: impl Into<String>,
    ) -> ActionRecordBuilder {
        ActionRecordBuilder {
            id: ActionId::random(),
            agent_id,
            action_type,
            description: description.into(),
            context: ActionContext::default(),
            resource_accessed: None,
            timestamp: Utc::now(),
        }
    }

    /// Returns the record identifier.
    #[must_use]
    pub const fn id(&self) -> ActionId {
        self.id
    }

    /// Returns the submitting agent.
    #[must_use]
    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    /// Returns the action category.
    #[must_use]
    pub const fn action_type(&self) -> ActionType {
        self.action_type
    }

    /// Returns the free-text description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the structured context.
    #[must_use]
    pub fn context(&self) -> &ActionContext {
        &self.context
    }

    /// Returns the accessed resource, if any.
    #[must_use]
    pub fn resource_accessed(&self) -> Option<&str> {
        self.resource_accessed.as_deref()
    }

    /// Returns the time the action occurred.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Resolves a field referenced by a rule condition.
    ///
    /// The record's own attributes are exposed as implicit keys and take
    /// precedence over context entries with the same name. Any other path is
    /// resolved against the context.
    #[must_use]
    pub fn field(&self, path: &str) -> Option<Cow<'_, Value>> {
        match path {
            Self::FIELD_ACTION_TYPE => Some(Cow::Owned(Value::from(self.action_type.as_str()))),
            Self::FIELD_DESCRIPTION | "description" => {
                Some(Cow::Owned(Value::from(self.description.as_str())))
            }
            Self::FIELD_AGENT_ID => Some(Cow::Owned(Value::from(self.agent_id.as_str()))),
            Self::FIELD_TIMESTAMP => Some(Cow::Owned(Value::from(self.timestamp.to_rfc3339()))),
            Self::FIELD_RESOURCE => match &self.resource_accessed {
                Some(resource) => Some(Cow::Owned(Value::from(resource.as_str()))),
                None => self.context.lookup(path).map(Cow::Borrowed),
            },
            _ => self.context.lookup(path).map(Cow::Borrowed),
        }
    }
}

/// Builder for [`ActionRecord`].
#[derive(Debug)]
pub struct ActionRecordBuilder {
    id: ActionId,
    agent_id: AgentId,
    action_type: ActionType,
    description: String,
    context: ActionContext,
    resource_accessed: Option<String>,
    timestamp: DateTime<Utc>,
}

impl ActionRecordBuilder {
    /// Overrides the generated record identifier.
    #[must_use]
    pub fn id(mut self, id: ActionId) -> Self {
        self.id = id;
        self
    }

    /// Replaces the context.
    #[must_use]
    pub fn context(mut self, context: ActionContext) -> Self {
        self.context = context;
        self
    }

    /// Sets the accessed resource.
    #[must_use]
    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.resource_accessed = Some(resource.into());
        self
    }

    /// Sets the accessed resource when one is supplied.
    #[must_use]
    pub fn maybe_resource(mut self, resource: Option<String>) -> Self {
        self.resource_accessed = resource;
        self
    }

    /// Sets the time the action occurred.
    #[must_use]
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Finalises the builder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAction`] when the description is empty or the
    /// resource is blank.
    pub fn build(self) -> Result<ActionRecord> {
        if self.description.trim().is_empty() {
            return Err(Error::InvalidAction {
                reason: "action description cannot be empty".into(),
            });
        }
        if self
            .resource_accessed
            .as_deref()
            .is_some_and(|resource| resource.trim().is_empty())
        {
            return Err(Error::InvalidAction {
                reason: "resource_accessed cannot be blank".into(),
            });
        }

        Ok(ActionRecord {
            id: self.id,
            agent_id: self.agent_id,
            action_type: self.action_type,
            description: self.description,
            context: self.context,
            resource_accessed: self.resource_accessed,
            timestamp: self.timestamp,
        })
    }
}
