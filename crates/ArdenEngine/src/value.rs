//! Runtime values and the per-evaluation value map.
//!
//! [`DataValue`] is the dynamic value type the pipeline operates on: the
//! typed form of whatever the extractor pulled out of the hook context.
//! Scalars, dates and arrays are first-class; anything structural passes
//! through as raw JSON. `Empty` marks an optional data point that resolved
//! to nothing — it holds the label's position without vetoing evaluation.
//!
//! [`ValueMap`] is the label → value store built per document evaluation.
//! It is owned by exactly one evaluation call, threaded mutably through the
//! extractor and the action pipeline, and dropped once the document result
//! is produced.

use arden_spec::Comparator;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;

/// A typed runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    /// An optional data point with no value. Holds the label's position.
    Empty,
    Boolean(bool),
    Number(f64),
    String(String),
    Date(DateTime<Utc>),
    Array(Vec<DataValue>),
    /// Structural passthrough (objects, mixed payloads).
    Json(Value),
}

impl DataValue {
    /// Untyped conversion from JSON. Typing happens in the extractor; this
    /// maps shapes only.
    pub fn from_json(value: &Value) -> DataValue {
        match value {
            Value::Null => DataValue::Empty,
            Value::Bool(b) => DataValue::Boolean(*b),
            Value::Number(n) => DataValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => DataValue::String(s.clone()),
            Value::Array(items) => DataValue::Array(items.iter().map(DataValue::from_json).collect()),
            Value::Object(_) => DataValue::Json(value.clone()),
        }
    }

    /// JSON rendering used for outcome payloads and fallback results.
    pub fn to_json(&self) -> Value {
        match self {
            DataValue::Empty => Value::Null,
            DataValue::Boolean(b) => Value::Bool(*b),
            DataValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            DataValue::String(s) => Value::String(s.clone()),
            DataValue::Date(d) => Value::String(d.to_rfc3339()),
            DataValue::Array(items) => Value::Array(items.iter().map(DataValue::to_json).collect()),
            DataValue::Json(v) => v.clone(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            DataValue::Empty => "empty",
            DataValue::Boolean(_) => "boolean",
            DataValue::Number(_) => "number",
            DataValue::String(_) => "string",
            DataValue::Date(_) => "date",
            DataValue::Array(_) => "array",
            DataValue::Json(_) => "object",
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, DataValue::Empty)
    }

    /// Unwrap a singleton array to its element; everything else unchanged.
    pub fn unwrap_singleton(self) -> DataValue {
        match self {
            DataValue::Array(mut items) if items.len() == 1 => items.remove(0),
            DataValue::Array(items) if items.is_empty() => DataValue::Empty,
            other => other,
        }
    }

    /// Concept codes carried by this value, as strings. A scalar counts as
    /// a one-element list. Returns `None` when an element cannot name a
    /// code at all (booleans, objects).
    pub fn concept_codes(&self) -> Option<Vec<String>> {
        fn code_of(value: &DataValue) -> Option<String> {
            match value {
                DataValue::Number(n) if n.fract() == 0.0 => Some(format!("{}", *n as i64)),
                DataValue::Number(n) => Some(n.to_string()),
                DataValue::String(s) => Some(s.trim().to_string()),
                _ => None,
            }
        }
        match self {
            DataValue::Array(items) => items.iter().map(code_of).collect(),
            other => code_of(other).map(|c| vec![c]),
        }
    }

    /// Ordered comparison against another value of the same runtime type.
    /// Mismatched types are an error (the reference never coerced across
    /// types at comparison time).
    pub fn compare(&self, other: &DataValue, cmp: Comparator) -> Result<bool, String> {
        use std::cmp::Ordering;
        let ordering = match (self, other) {
            (DataValue::Number(a), DataValue::Number(b)) => a
                .partial_cmp(b)
                .ok_or_else(|| "numbers are not comparable".to_string())?,
            (DataValue::String(a), DataValue::String(b)) => a.cmp(b),
            (DataValue::Date(a), DataValue::Date(b)) => a.cmp(b),
            (DataValue::Boolean(a), DataValue::Boolean(b)) => a.cmp(b),
            (a, b) => {
                return Err(format!(
                    "cannot compare `{}` with `{}`",
                    a.type_name(),
                    b.type_name()
                ));
            }
        };
        Ok(match cmp {
            Comparator::Eq => ordering == Ordering::Equal,
            Comparator::Neq => ordering != Ordering::Equal,
            Comparator::Lt => ordering == Ordering::Less,
            Comparator::Lte => ordering != Ordering::Greater,
            Comparator::Gt => ordering == Ordering::Greater,
            Comparator::Gte => ordering != Ordering::Less,
        })
    }

    /// Comparison against an expected JSON value (constraint `queryArgs`).
    /// The JSON side is lifted to this value's runtime type first, so a
    /// stored `"2024-01-01"` compares as a date against a date value.
    pub fn compare_json(&self, expected: &Value, cmp: Comparator) -> Result<bool, String> {
        let rhs = self.lift_json(expected);
        self.compare(&rhs, cmp)
    }

    /// Structural equality against an expected JSON value.
    pub fn json_eq(&self, expected: &Value) -> bool {
        match self.compare_json(expected, Comparator::Eq) {
            Ok(result) => result,
            // Type mismatch means "not equal", not an error, in set
            // membership contexts.
            Err(_) => self.to_json() == *expected,
        }
    }

    fn lift_json(&self, expected: &Value) -> DataValue {
        match (self, expected) {
            (DataValue::Date(_), Value::String(s)) => {
                parse_date(s).map(DataValue::Date).unwrap_or_else(|| DataValue::String(s.clone()))
            }
            (DataValue::Number(_), Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .map(DataValue::Number)
                .unwrap_or_else(|_| DataValue::String(s.clone())),
            _ => DataValue::from_json(expected),
        }
    }
}

/// Parse a date from its common wire shapes: RFC 3339, date-only, and
/// naive datetime.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.and_utc());
    }
    None
}

/// The label → value store for one document evaluation.
#[derive(Debug, Default)]
pub struct ValueMap {
    slots: HashMap<String, DataValue>,
}

impl ValueMap {
    pub fn insert(&mut self, label: impl Into<String>, value: DataValue) {
        self.slots.insert(label.into(), value);
    }

    pub fn get(&self, label: &str) -> Option<&DataValue> {
        self.slots.get(label)
    }

    /// Whether `label` names a slot, empty or not. Action arguments that
    /// match a slot are label references; everything else is a literal.
    pub fn contains(&self, label: &str) -> bool {
        self.slots.contains_key(label)
    }
}
