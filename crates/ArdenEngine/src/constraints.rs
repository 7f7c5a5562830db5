//! Constraint evaluation and the no-constraint fallback.
//!
//! Each constraint object pairs expected argument values (`queryArgs`) with
//! an outcome payload. A constraint action compares the value map's current
//! value for `arg1` against the object's expected value for the argument
//! named by `arg2`; an object is satisfied when every constraint action
//! holds, and the result is the duplicate-free union of the outcomes of all
//! satisfied objects. Subsumption-family constraint actions resolve their
//! terminology relations once, against the union of every object's
//! expected codes, and reuse the relation per object.
//!
//! An empty or missing `arg1` value makes an action vacuously true:
//! optional data the context never carried must not veto outcomes.

use crate::error::{EngineError, EngineResult};
use crate::terminology::{self, QueryOptions, SubsumptionMode, TerminologyService};
use crate::value::{DataValue, ValueMap};
use arden_spec::{ActionKind, ActionSpec, Comparator, ConstraintObject, SpecificationDocument};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// Relations pre-resolved for one subsumption constraint action: the union
/// of expected codes across objects, and which lhs code relates to which.
struct ResolvedSubsumption {
    union: Vec<String>,
    /// `matrix[i][j]`: lhs code `i` relates to union code `j`.
    matrix: Vec<Vec<bool>>,
}

/// Evaluate the document's constraint actions against its constraint
/// objects, or fall back when there are none.
pub(crate) async fn evaluate_constraints(
    terminology: &dyn TerminologyService,
    doc: &SpecificationDocument,
    map: &ValueMap,
) -> EngineResult<Option<Value>> {
    let actions: Vec<&ActionSpec> = doc.constraint_actions().collect();
    if actions.is_empty() {
        return fallback_outcome(doc, map);
    }
    // Validated at load time; kept as a guard for documents built in code.
    if doc.constraint_list.is_empty() {
        return Err(EngineError::spec(
            &doc.parameter,
            "constraint actions declared but `constraintList` is empty",
        ));
    }

    let resolved = resolve_subsumptions(terminology, doc, &actions, map).await?;

    let mut any_satisfied = false;
    let mut outcomes: Vec<Value> = Vec::new();
    for object in &doc.constraint_list {
        let mut satisfied = true;
        for (index, action) in actions.iter().enumerate() {
            if !action_holds(doc, map, action, index, object, &resolved)? {
                satisfied = false;
                break;
            }
        }
        if satisfied {
            any_satisfied = true;
            merge_outcomes(&mut outcomes, &object.outcome);
        }
    }

    debug!(
        parameter = %doc.parameter,
        satisfied = any_satisfied,
        outcomes = outcomes.len(),
        "constraint evaluation finished"
    );
    if !any_satisfied {
        return Ok(None);
    }
    Ok(Some(Value::Array(outcomes)))
}

/// Resolve every subsumption constraint action once, against the union of
/// all objects' expected codes for its argument.
async fn resolve_subsumptions(
    terminology: &dyn TerminologyService,
    doc: &SpecificationDocument,
    actions: &[&ActionSpec],
    map: &ValueMap,
) -> EngineResult<HashMap<usize, ResolvedSubsumption>> {
    let mut resolved = HashMap::new();

    for (index, action) in actions.iter().enumerate() {
        if !action.action.is_constraint_subsumption() {
            continue;
        }
        let Some(lhs) = constraint_lhs(map, action) else {
            continue;
        };
        let codes_a = lhs.concept_codes().ok_or_else(|| {
            EngineError::spec(
                &doc.parameter,
                format!(
                    "constraint action `{}` requires concept codes in `{}`",
                    action.action, action.details.arg1
                ),
            )
        })?;

        let key = query_key(action);
        let mut union: Vec<String> = Vec::new();
        for object in &doc.constraint_list {
            if let Some(expected) = object.query_args.get(key) {
                for code in expected_codes(doc, action, expected)? {
                    if !union.contains(&code) {
                        union.push(code);
                    }
                }
            }
        }

        let mode = SubsumptionMode::for_kind(action.action).ok_or_else(|| {
            EngineError::spec(
                &doc.parameter,
                format!("`{}` is not a subsumption action", action.action),
            )
        })?;
        let options = QueryOptions::from_details(&action.details);
        let matrix =
            terminology::relation_matrix(terminology, &codes_a, &union, &options, mode).await?;
        resolved.insert(index, ResolvedSubsumption { union, matrix });
    }

    Ok(resolved)
}

fn action_holds(
    doc: &SpecificationDocument,
    map: &ValueMap,
    action: &ActionSpec,
    index: usize,
    object: &ConstraintObject,
    resolved: &HashMap<usize, ResolvedSubsumption>,
) -> EngineResult<bool> {
    let Some(lhs) = constraint_lhs(map, action) else {
        return Ok(true);
    };
    let key = query_key(action);
    let Some(expected) = object.query_args.get(key) else {
        return Ok(false);
    };

    Ok(match action.action {
        ActionKind::Qomparison => {
            let comparator = action
                .details
                .symbol
                .as_deref()
                .and_then(Comparator::from_symbol)
                .ok_or_else(|| {
                    EngineError::spec(&doc.parameter, "Qomparison without a valid comparator")
                })?;
            lhs.compare_json(expected, comparator)
                .map_err(|message| EngineError::spec(&doc.parameter, message))?
        }

        // Membership, value-map side into expected side.
        ActionKind::In | ActionKind::IsIncluded => membership(&lhs, expected),

        // Membership, expected side into value-map side.
        ActionKind::Includes => includes(&lhs, expected),

        ActionKind::IsSubsetOf => expected_elems(expected)
            .is_some_and(|rhs| lhs_elems(&lhs).iter().all(|i| rhs.iter().any(|e| i.json_eq(e)))),

        ActionKind::IsSupersetOf => expected_elems(expected)
            .is_some_and(|rhs| rhs.iter().all(|e| lhs_elems(&lhs).iter().any(|i| i.json_eq(e)))),

        // Disjunctive membership over an array lhs.
        ActionKind::AnyElemIn => expected_elems(expected)
            .is_some_and(|rhs| lhs_elems(&lhs).iter().any(|i| rhs.iter().any(|e| i.json_eq(e)))),

        kind if kind.is_constraint_subsumption() => {
            let Some(resolution) = resolved.get(&index) else {
                // No resolution means the lhs was empty: vacuously true.
                return Ok(true);
            };
            let object_codes = expected_codes(doc, action, expected)?;
            object_codes.iter().any(|code| {
                resolution
                    .union
                    .iter()
                    .position(|u| u == code)
                    .is_some_and(|j| resolution.matrix.iter().any(|row| row[j]))
            })
        }

        kind => {
            return Err(EngineError::spec(
                &doc.parameter,
                format!("processing action `{}` cannot run as a constraint", kind),
            ));
        }
    })
}

/// The value-map side of a constraint action, unwrapped from singletons.
/// `None` when the label is unknown or holds an empty slot.
fn constraint_lhs(map: &ValueMap, action: &ActionSpec) -> Option<DataValue> {
    match map.get(&action.details.arg1) {
        None | Some(DataValue::Empty) => None,
        Some(value) => match value.clone().unwrap_singleton() {
            DataValue::Empty => None,
            unwrapped => Some(unwrapped),
        },
    }
}

/// The `queryArgs` entry a constraint action compares against: named by
/// `arg2`, with the `arg1` label doubling as the key when absent.
fn query_key(action: &ActionSpec) -> &str {
    action.arg2_as_str().unwrap_or(&action.details.arg1)
}

/// Expected codes carried by a constraint object for a subsumption action.
fn expected_codes(
    doc: &SpecificationDocument,
    action: &ActionSpec,
    expected: &Value,
) -> EngineResult<Vec<String>> {
    DataValue::from_json(expected).concept_codes().ok_or_else(|| {
        EngineError::spec(
            &doc.parameter,
            format!(
                "constraint action `{}` expects numeric codes in queryArgs `{}`",
                action.action,
                query_key(action)
            ),
        )
    })
}

fn lhs_elems(lhs: &DataValue) -> Vec<&DataValue> {
    match lhs {
        DataValue::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

fn expected_elems(expected: &Value) -> Option<Vec<&Value>> {
    match expected {
        Value::Array(items) => Some(items.iter().collect()),
        Value::Null => None,
        other => Some(vec![other]),
    }
}

/// `in`/`isIncluded`: scalar lhs is a member of an array rhs; two scalars
/// degrade to equality; an array lhs must be a subset of an array rhs.
fn membership(lhs: &DataValue, expected: &Value) -> bool {
    match (lhs, expected) {
        (DataValue::Array(items), Value::Array(rhs)) => items
            .iter()
            .all(|item| rhs.iter().any(|e| item.json_eq(e))),
        (DataValue::Array(_), _) => false,
        (scalar, Value::Array(rhs)) => rhs.iter().any(|e| scalar.json_eq(e)),
        (scalar, other) => scalar.json_eq(other),
    }
}

/// `includes`: the mirror of [`membership`].
fn includes(lhs: &DataValue, expected: &Value) -> bool {
    match (lhs, expected) {
        (DataValue::Array(items), Value::Array(rhs)) => rhs
            .iter()
            .all(|e| items.iter().any(|item| item.json_eq(e))),
        (DataValue::Array(items), scalar) => items.iter().any(|item| item.json_eq(scalar)),
        (_, Value::Array(_)) => false,
        (scalar, other) => scalar.json_eq(other),
    }
}

/// Union the outcome payload into the result: one level of flattening,
/// duplicates dropped.
fn merge_outcomes(into: &mut Vec<Value>, outcome: &[Value]) {
    let mut push_unique = |value: &Value| {
        if !into.contains(value) {
            into.push(value.clone());
        }
    };
    for value in outcome {
        match value {
            Value::Array(items) => items.iter().for_each(&mut push_unique),
            other => push_unique(other),
        }
    }
}

/// The result of a document with no constraint actions: the last thing the
/// pipeline computed.
pub(crate) fn fallback_outcome(
    doc: &SpecificationDocument,
    map: &ValueMap,
) -> EngineResult<Option<Value>> {
    if !doc.constraint_list.is_empty() {
        // Constraint objects with nothing to test them against: a
        // configuration error for guideline-bearing documents, a constant
        // outcome for the rest.
        if !doc.cig_involved.is_empty() {
            return Err(EngineError::spec(
                &doc.parameter,
                "document declares constraint objects but no constraint actions",
            ));
        }
        let mut outcomes = Vec::new();
        merge_outcomes(&mut outcomes, &doc.constraint_list[0].outcome);
        return Ok(Some(Value::Array(outcomes)));
    }

    let mut label: Option<&str> = None;
    if let Some(last) = doc.processing_actions().last() {
        if map.contains(&last.details.arg1) {
            label = Some(&last.details.arg1);
        } else if let Some(arg2) = last.arg2_as_str() {
            if map.contains(arg2) {
                label = Some(arg2);
            }
        }
    }
    let label = label.unwrap_or(&doc.path_list[0].label);

    Ok(match map.get(label) {
        None | Some(DataValue::Empty) => None,
        Some(value) => Some(value.to_json()),
    })
}
