//! Structured rule conditions.
//!
//! A condition is a small predicate tree: leaves compare one action field
//! against a literal, and `and` / `or` / `not` nodes compose them. Leaves use
//! the wire shape `{"field": .., "operator": .., "value": ..}`; composites are
//! `{"and": [..]}`, `{"or": [..]}` and `{"not": {..}}`.

use std::cmp::Ordering;

use chrono::{DateTime, Timelike, Utc};
use gaas_primitives::ActionRecord;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::FieldError;

/// Deepest predicate tree accepted when no explicit limit is configured.
pub const DEFAULT_MAX_DEPTH: usize = 16;

/// Comparison applied by a predicate leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Field equals the literal. Numbers compare by value.
    Eq,
    /// Field is present and differs from the literal.
    Neq,
    /// Field equals one of the literals in a non-empty array.
    In,
    /// Numeric field lies within `{"min": .., "max": ..}` (inclusive).
    Range,
    /// Hour of a timestamp field (UTC) falls inside one of the hour windows.
    TimeOfDayIn,
    /// String field contains the literal, ignoring case; arrays contain it as an element.
    Contains,
    /// Field is present and not null.
    Exists,
}

impl Operator {
    /// Returns the wire label of the operator.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::In => "in",
            Self::Range => "range",
            Self::TimeOfDayIn => "time_of_day_in",
            Self::Contains => "contains",
            Self::Exists => "exists",
        }
    }
}

/// Half-open window of hours `[start, end)` in UTC.
///
/// A window whose `start` is greater than its `end` wraps past midnight, so
/// `{"start": 22, "end": 6}` covers 22:00 to 05:59.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HourWindow {
    /// First hour inside the window (0-23).
    pub start: u8,
    /// First hour after the window (1-24).
    pub end: u8,
}

impl HourWindow {
    /// Creates a window.
    #[must_use]
    pub const fn new(start: u8, end: u8) -> Self {
        Self { start, end }
    }

    /// Returns `true` when `hour` lies inside the window.
    #[must_use]
    pub fn contains(self, hour: u32) -> bool {
        let (start, end) = (u32::from(self.start), u32::from(self.end));
        if start <= end {
            (start..end).contains(&hour)
        } else {
            hour >= start || hour < end
        }
    }

    fn problem(self) -> Option<&'static str> {
        if self.start > 23 {
            Some("window start must be between 0 and 23")
        } else if self.end > 24 {
            Some("window end must be between 0 and 24")
        } else if self.start == self.end {
            Some("window start and end must differ")
        } else {
            None
        }
    }
}

/// Inclusive numeric bounds used by [`Operator::Range`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NumericRange {
    /// Lower bound, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Upper bound, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl NumericRange {
    /// Returns `true` when `value` satisfies both bounds.
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        self.min.is_none_or(|min| value >= min) && self.max.is_none_or(|max| value <= max)
    }

    fn problem(&self) -> Option<&'static str> {
        match (self.min, self.max) {
            (None, None) => Some("range requires `min`, `max`, or both"),
            (Some(min), Some(max)) if min > max => Some("range `min` must not exceed `max`"),
            _ => None,
        }
    }
}

/// Leaf comparison of one action field against a literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Predicate {
    /// Dotted path into the action, e.g. `resource_accessed` or `resource_usage.cpu`.
    pub field: String,
    /// Comparison to apply.
    pub operator: Operator,
    /// Literal operand; absent for [`Operator::Exists`].
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub value: Value,
}

/// A predicate could not be applied because its operand has the wrong shape.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{reason}")]
pub struct MatchFault {
    /// What was wrong with the operand.
    pub reason: String,
}

impl MatchFault {
    fn operand(operator: Operator, expected: &str) -> Self {
        Self {
            reason: format!("`{}` operand must be {expected}", operator.as_str()),
        }
    }
}

impl Predicate {
    fn evaluate(&self, record: &ActionRecord) -> Result<bool, MatchFault> {
        let Some(actual) = record.field(&self.field) else {
            return Ok(false);
        };
        let actual = actual.as_ref();

        match self.operator {
            Operator::Exists => Ok(!actual.is_null()),
            Operator::Eq => Ok(loosely_equal(actual, &self.value)),
            Operator::Neq => Ok(!actual.is_null() && !loosely_equal(actual, &self.value)),
            Operator::In => {
                let options = self
                    .value
                    .as_array()
                    .ok_or_else(|| MatchFault::operand(self.operator, "an array"))?;
                Ok(options.iter().any(|option| loosely_equal(actual, option)))
            }
            Operator::Range => {
                let range = decode_range(&self.value)
                    .ok_or_else(|| MatchFault::operand(self.operator, "a `{min, max}` object"))?;
                Ok(actual.as_f64().is_some_and(|n| range.contains(n)))
            }
            Operator::TimeOfDayIn => {
                let windows = decode_windows(&self.value)
                    .ok_or_else(|| MatchFault::operand(self.operator, "an array of hour windows"))?;
                Ok(hour_of(actual).is_some_and(|hour| windows.iter().any(|w| w.contains(hour))))
            }
            Operator::Contains => {
                let needle = self
                    .value
                    .as_str()
                    .ok_or_else(|| MatchFault::operand(self.operator, "a string"))?;
                Ok(match actual {
                    Value::String(haystack) => {
                        haystack.to_lowercase().contains(&needle.to_lowercase())
                    }
                    Value::Array(items) => items
                        .iter()
                        .filter_map(Value::as_str)
                        .any(|item| item.eq_ignore_ascii_case(needle)),
                    _ => false,
                })
            }
        }
    }

    fn validate(&self, path: &str, errors: &mut Vec<FieldError>) {
        if self.field.trim().is_empty() || self.field.split('.').any(str::is_empty) {
            errors.push(FieldError::new(
                format!("{path}.field"),
                "field must be a non-empty dotted path",
            ));
        }

        let value_path = format!("{path}.value");
        let problem = match self.operator {
            Operator::Eq | Operator::Neq => None,
            Operator::Exists => (!self.value.is_null()).then_some("`exists` takes no value"),
            Operator::In => match self.value.as_array() {
                Some(options) if !options.is_empty() => None,
                Some(_) => Some("`in` requires at least one candidate value"),
                None => Some("`in` requires an array value"),
            },
            Operator::Range => match decode_range(&self.value) {
                Some(range) => range.problem(),
                None => Some("`range` requires an object with numeric `min` and/or `max`"),
            },
            Operator::TimeOfDayIn => match decode_windows(&self.value) {
                Some(windows) if windows.is_empty() => {
                    Some("`time_of_day_in` requires at least one hour window")
                }
                Some(windows) => windows.iter().find_map(|window| window.problem()),
                None => Some("`time_of_day_in` requires an array of {start, end} hour windows"),
            },
            Operator::Contains => match self.value.as_str() {
                Some(needle) if !needle.is_empty() => None,
                _ => Some("`contains` requires a non-empty string value"),
            },
        };
        if let Some(message) = problem {
            errors.push(FieldError::new(value_path, message));
        }
    }
}

/// Predicate tree evaluated against an [`ActionRecord`].
///
/// A node holds exactly one of `and`, `or`, `not`, or the leaf keys; mixed
/// nodes fail to deserialize.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Condition {
    /// Every child must match.
    And {
        /// Children, evaluated in order with short-circuiting.
        and: Vec<Condition>,
    },
    /// At least one child must match.
    Or {
        /// Children, evaluated in order with short-circuiting.
        or: Vec<Condition>,
    },
    /// Inverts the child.
    Not {
        /// Negated child.
        not: Box<Condition>,
    },
    /// Leaf comparison.
    Predicate(Predicate),
}

const COMPOSITE_KEYS: [&str; 3] = ["and", "or", "not"];

impl<'de> Deserialize<'de> for Condition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut node = Map::<String, Value>::deserialize(deserializer)?;

        if node.len() == 1 {
            if let Some(children) = node.remove("and") {
                return serde_json::from_value(children)
                    .map(|and| Self::And { and })
                    .map_err(de::Error::custom);
            }
            if let Some(children) = node.remove("or") {
                return serde_json::from_value(children)
                    .map(|or| Self::Or { or })
                    .map_err(de::Error::custom);
            }
            if let Some(child) = node.remove("not") {
                return serde_json::from_value(child)
                    .map(|not| Self::Not { not })
                    .map_err(de::Error::custom);
            }
        }
        if let Some(key) = COMPOSITE_KEYS.into_iter().find(|key| node.contains_key(*key)) {
            return Err(de::Error::custom(format!(
                "`{key}` node must not carry other keys; use exactly one of `and`, `or`, `not` or a leaf predicate"
            )));
        }
        serde_json::from_value(Value::Object(node))
            .map(Self::Predicate)
            .map_err(de::Error::custom)
    }
}

impl Condition {
    /// Builds a leaf predicate.
    #[must_use]
    pub fn predicate(field: impl Into<String>, operator: Operator, value: Value) -> Self {
        Self::Predicate(Predicate {
            field: field.into(),
            operator,
            value,
        })
    }

    /// `field == value`.
    #[must_use]
    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::predicate(field, Operator::Eq, value.into())
    }

    /// `field != value` (field must be present).
    #[must_use]
    pub fn not_equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::predicate(field, Operator::Neq, value.into())
    }

    /// `field` equals one of `values`.
    #[must_use]
    pub fn one_of<I, V>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = values.into_iter().map(Into::into).collect();
        Self::predicate(field, Operator::In, Value::Array(values))
    }

    /// Numeric `field` within inclusive bounds.
    #[must_use]
    pub fn range(field: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        let value = serde_json::to_value(NumericRange { min, max }).unwrap_or(Value::Null);
        Self::predicate(field, Operator::Range, value)
    }

    /// Hour of the timestamp in `field` within one of `windows`.
    #[must_use]
    pub fn time_of_day_in(
        field: impl Into<String>,
        windows: impl IntoIterator<Item = HourWindow>,
    ) -> Self {
        let windows: Vec<HourWindow> = windows.into_iter().collect();
        let value = serde_json::to_value(windows).unwrap_or(Value::Null);
        Self::predicate(field, Operator::TimeOfDayIn, value)
    }

    /// String `field` contains `needle`, ignoring case.
    #[must_use]
    pub fn contains(field: impl Into<String>, needle: impl Into<String>) -> Self {
        Self::predicate(field, Operator::Contains, Value::String(needle.into()))
    }

    /// `field` is present and not null.
    #[must_use]
    pub fn exists(field: impl Into<String>) -> Self {
        Self::predicate(field, Operator::Exists, Value::Null)
    }

    /// Conjunction of `children`.
    #[must_use]
    pub fn all(children: Vec<Self>) -> Self {
        Self::And { and: children }
    }

    /// Disjunction of `children`.
    #[must_use]
    pub fn any(children: Vec<Self>) -> Self {
        Self::Or { or: children }
    }

    /// Negation of `child`.
    #[must_use]
    pub fn negate(child: Self) -> Self {
        Self::Not {
            not: Box::new(child),
        }
    }

    /// Height of the tree; a single leaf has depth 1.
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Self::Predicate(_) => 1,
            Self::Not { not } => 1 + not.depth(),
            Self::And { and: children } | Self::Or { or: children } => {
                1 + children.iter().map(Self::depth).max().unwrap_or(0)
            }
        }
    }

    /// Collects structural problems under `path`.
    ///
    /// Validation runs once at upload time so that evaluation of an accepted
    /// rule never encounters a malformed operand.
    pub fn validate(&self, path: &str, max_depth: usize, errors: &mut Vec<FieldError>) {
        self.validate_at(path, 1, max_depth, errors);
    }

    fn validate_at(&self, path: &str, depth: usize, max_depth: usize, errors: &mut Vec<FieldError>) {
        if depth > max_depth {
            errors.push(FieldError::new(
                path,
                format!("condition nesting exceeds the maximum depth of {max_depth}"),
            ));
            return;
        }

        match self {
            Self::Predicate(predicate) => predicate.validate(path, errors),
            Self::Not { not } => not.validate_at(&format!("{path}.not"), depth + 1, max_depth, errors),
            Self::And { and: children } | Self::Or { or: children } => {
                let key = if matches!(self, Self::And { .. }) { "and" } else { "or" };
                if children.is_empty() {
                    errors.push(FieldError::new(
                        format!("{path}.{key}"),
                        format!("`{key}` requires at least one sub-condition"),
                    ));
                }
                for (index, child) in children.iter().enumerate() {
                    child.validate_at(&format!("{path}.{key}[{index}]"), depth + 1, max_depth, errors);
                }
            }
        }
    }

    /// Evaluates the tree against `record`.
    ///
    /// Fields the record does not carry make their predicate false.
    ///
    /// # Errors
    ///
    /// Returns [`MatchFault`] when a predicate operand has a shape its
    /// operator cannot interpret, or a composite node has no children.
    pub fn matches(&self, record: &ActionRecord) -> Result<bool, MatchFault> {
        match self {
            Self::Predicate(predicate) => predicate.evaluate(record),
            Self::Not { not } => Ok(!not.matches(record)?),
            Self::And { and: children } => {
                ensure_children(children, "and")?;
                for child in children {
                    if !child.matches(record)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Self::Or { or: children } => {
                ensure_children(children, "or")?;
                for child in children {
                    if child.matches(record)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

fn ensure_children(children: &[Condition], key: &str) -> Result<(), MatchFault> {
    if children.is_empty() {
        Err(MatchFault {
            reason: format!("`{key}` node has no sub-conditions"),
        })
    } else {
        Ok(())
    }
}

fn loosely_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a.total_cmp(&b) == Ordering::Equal,
            _ => a == b,
        },
        _ => actual == expected,
    }
}

fn decode_range(value: &Value) -> Option<NumericRange> {
    if !value.is_object() {
        return None;
    }
    serde_json::from_value(value.clone()).ok()
}

fn decode_windows(value: &Value) -> Option<Vec<HourWindow>> {
    if !value.is_array() {
        return None;
    }
    serde_json::from_value(value.clone()).ok()
}

fn hour_of(value: &Value) -> Option<u32> {
    match value {
        Value::String(raw) => DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|parsed| parsed.with_timezone(&Utc).hour()),
        Value::Number(number) => number
            .as_u64()
            .filter(|hour| *hour < 24)
            .and_then(|hour| u32::try_from(hour).ok()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use gaas_primitives::{ActionContext, ActionType, AgentId};
    use serde_json::json;

    fn record(context: Value) -> ActionRecord {
        ActionRecord::builder(
            AgentId::new("agent-1").unwrap(),
            ActionType::DataAccess,
            "Read customer records",
        )
        .resource("sensitive_db")
        .context(ActionContext::try_from(context).unwrap())
        .timestamp(Utc.with_ymd_and_hms(2025, 3, 4, 23, 15, 0).unwrap())
        .build()
        .unwrap()
    }

    #[test]
    fn parses_wire_shape() {
        let condition: Condition = serde_json::from_value(json!({
            "and": [
                {"field": "resource_accessed", "operator": "eq", "value": "sensitive_db"},
                {"not": {"field": "approved", "operator": "eq", "value": true}}
            ]
        }))
        .unwrap();

        assert_eq!(
            condition,
            Condition::all(vec![
                Condition::equals("resource_accessed", "sensitive_db"),
                Condition::negate(Condition::equals("approved", true)),
            ])
        );
        assert_eq!(condition.depth(), 3);
    }

    #[test]
    fn missing_fields_do_not_match() {
        let rec = record(json!({}));
        assert!(!Condition::equals("approved", true).matches(&rec).unwrap());
        assert!(!Condition::not_equals("approved", true).matches(&rec).unwrap());
        assert!(!Condition::exists("approved").matches(&rec).unwrap());
        assert!(Condition::negate(Condition::equals("approved", true)).matches(&rec).unwrap());
    }

    #[test]
    fn numbers_compare_by_value() {
        let rec = record(json!({"retries": 3, "resource_usage": {"cpu": 91.5}}));
        assert!(Condition::equals("retries", 3.0).matches(&rec).unwrap());
        assert!(Condition::one_of("retries", [1, 2, 3]).matches(&rec).unwrap());
        assert!(Condition::range("resource_usage.cpu", Some(90.0), None).matches(&rec).unwrap());
        assert!(!Condition::range("resource_usage.cpu", None, Some(90.0)).matches(&rec).unwrap());
    }

    #[test]
    fn time_windows_wrap_midnight() {
        let rec = record(json!({"hour": 7}));
        let after_hours = [HourWindow::new(22, 6)];
        assert!(Condition::time_of_day_in("timestamp", after_hours).matches(&rec).unwrap());
        assert!(!Condition::time_of_day_in("hour", after_hours).matches(&rec).unwrap());
        assert!(Condition::time_of_day_in("hour", [HourWindow::new(6, 9)]).matches(&rec).unwrap());
    }

    #[test]
    fn contains_ignores_case() {
        let rec = record(json!({"tags": ["pii", "finance"]}));
        assert!(Condition::contains("action_description", "CUSTOMER").matches(&rec).unwrap());
        assert!(Condition::contains("tags", "PII").matches(&rec).unwrap());
        assert!(!Condition::contains("tags", "pi").matches(&rec).unwrap());
    }

    #[test]
    fn or_short_circuits() {
        let rec = record(json!({}));
        let condition = Condition::any(vec![
            Condition::equals("resource_accessed", "sensitive_db"),
            Condition::predicate("x", Operator::In, json!("not-an-array")),
        ]);
        assert!(condition.matches(&rec).unwrap());
    }

    #[test]
    fn malformed_operand_faults_at_match_time() {
        let rec = record(json!({"x": 1}));
        let err = Condition::predicate("x", Operator::In, json!(1))
            .matches(&rec)
            .unwrap_err();
        assert!(err.reason.contains("`in`"));
        assert!(Condition::all(vec![]).matches(&rec).is_err());
    }

    #[test]
    fn validation_reports_every_problem() {
        let condition = Condition::all(vec![
            Condition::predicate("", Operator::Eq, json!(1)),
            Condition::one_of("x", Vec::<Value>::new()),
            Condition::range("y", Some(5.0), Some(1.0)),
            Condition::time_of_day_in("timestamp", [HourWindow::new(3, 3)]),
            Condition::any(vec![]),
        ]);
        let mut errors = Vec::new();
        condition.validate("condition", DEFAULT_MAX_DEPTH, &mut errors);

        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "condition.and[0].field",
                "condition.and[1].value",
                "condition.and[2].value",
                "condition.and[3].value",
                "condition.and[4].or",
            ]
        );
    }

    #[test]
    fn validation_limits_depth() {
        let mut condition = Condition::exists("x");
        for _ in 0..4 {
            condition = Condition::negate(condition);
        }
        let mut errors = Vec::new();
        condition.validate("condition", 3, &mut errors);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("maximum depth of 3"));

        errors.clear();
        condition.validate("condition", DEFAULT_MAX_DEPTH, &mut errors);
        assert!(errors.is_empty());
    }
}
