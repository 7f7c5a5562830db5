//! Context extraction and value typing.
//!
//! For every `pathList` entry the extractor evaluates the primary path
//! against the hook context, falls back to the declared default (itself
//! possibly another path), and coerces whatever it found to the declared
//! type. Optional data points that resolve to nothing store an empty slot;
//! mandatory ones fail the document.

use crate::error::{EngineError, EngineResult};
use crate::path::PathExpr;
use crate::value::{DataValue, ValueMap, parse_date};
use arden_spec::{DataPathSpec, DefaultValue, PathType, SpecificationDocument};
use serde_json::Value;
use tracing::debug;

/// Populate `map` with one typed value (or an empty slot) per `pathList`
/// entry of `doc`.
pub(crate) fn extract_data_points(
    context: &Value,
    doc: &SpecificationDocument,
    map: &mut ValueMap,
) -> EngineResult<()> {
    for path_spec in &doc.path_list {
        let raw = resolve_raw_value(context, path_spec)?;

        match raw {
            None if !path_spec.is_mandatory => {
                map.insert(&path_spec.label, DataValue::Empty);
            }
            None => {
                return Err(EngineError::MissingData {
                    parameter: doc.parameter.clone(),
                    label: path_spec.label.clone(),
                });
            }
            Some(value) => {
                debug!(
                    parameter = %doc.parameter,
                    label = %path_spec.label,
                    value = %value,
                    "extracted context value"
                );
                let typed = coerce(&doc.parameter, &path_spec.label, path_spec.type_of, value)?;
                map.insert(&path_spec.label, typed);
            }
        }
    }
    Ok(())
}

/// Primary path first, then the tagged default.
fn resolve_raw_value(context: &Value, spec: &DataPathSpec) -> EngineResult<Option<Value>> {
    if !spec.path.trim().is_empty() {
        if let Some(found) = PathExpr::parse(&spec.path)?.evaluate(context) {
            return Ok(Some(found));
        }
    }

    match &spec.default {
        None => Ok(None),
        Some(DefaultValue::Path { path }) => Ok(PathExpr::parse(path)?.evaluate(context)),
        Some(DefaultValue::Literal(value)) => Ok(Some(literal_default(value))),
    }
}

/// Literal defaults are used as-is, except that a string shaped like a JSON
/// array is parsed into one (stored templates carry list defaults that
/// way).
fn literal_default(value: &Value) -> Value {
    if let Value::String(s) = value {
        if s.trim_start().starts_with('[') {
            if let Ok(parsed) = serde_json::from_str::<Value>(s) {
                return parsed;
            }
        }
    }
    value.clone()
}

/// Coerce a raw extracted value to the declared type, element-wise. A
/// scalar is wrapped into a one-element sequence for uniform treatment and
/// unwrapped again afterwards.
pub(crate) fn coerce(
    parameter: &str,
    label: &str,
    type_of: PathType,
    raw: Value,
) -> EngineResult<DataValue> {
    let was_array = raw.is_array();
    let elements = match raw {
        Value::Array(items) => items,
        other => vec![other],
    };

    let mut typed = Vec::with_capacity(elements.len());
    for element in elements {
        typed.push(coerce_element(parameter, label, type_of, element)?);
    }

    Ok(if was_array {
        DataValue::Array(typed)
    } else {
        DataValue::Array(typed).unwrap_singleton()
    })
}

fn coerce_element(
    parameter: &str,
    label: &str,
    type_of: PathType,
    element: Value,
) -> EngineResult<DataValue> {
    let fail = |message: String| EngineError::Coercion {
        parameter: parameter.to_string(),
        label: label.to_string(),
        message,
    };

    Ok(match type_of {
        // Structural declarations pass through untouched.
        PathType::Array | PathType::Object => DataValue::from_json(&element),

        PathType::Number => match &element {
            Value::Number(n) => DataValue::Number(
                n.as_f64()
                    .ok_or_else(|| fail(format!("`{}` is not a representable number", n)))?,
            ),
            Value::String(s) => DataValue::Number(
                s.trim()
                    .parse::<f64>()
                    .map_err(|_| fail(format!("`{}` is not a number", s)))?,
            ),
            Value::Bool(b) => DataValue::Number(if *b { 1.0 } else { 0.0 }),
            other => return Err(fail(format!("`{}` is not a number", other))),
        },

        PathType::Date => match &element {
            Value::String(s) => DataValue::Date(
                parse_date(s).ok_or_else(|| fail(format!("`{}` is not a date", s)))?,
            ),
            other => return Err(fail(format!("`{}` is not a date", other))),
        },

        // The stored templates' truthiness rule: a value counts as true
        // when it reads as a number >= 1.
        PathType::Boolean => match &element {
            Value::Bool(b) => DataValue::Boolean(*b),
            Value::Number(n) => DataValue::Boolean(n.as_f64().unwrap_or(0.0) >= 1.0),
            Value::String(s) => {
                DataValue::Boolean(s.trim().parse::<f64>().map(|n| n >= 1.0).unwrap_or(false))
            }
            Value::Null => DataValue::Boolean(false),
            other => return Err(fail(format!("`{}` is not a boolean", other))),
        },

        PathType::String => match &element {
            Value::String(s) => DataValue::String(s.clone()),
            Value::Null => DataValue::String("null".to_string()),
            other => DataValue::String(other.to_string()),
        },
    })
}
