//! The ordered action pipeline.
//!
//! Processing actions run strictly in document order, each one reading its
//! arguments from the value map (a string argument that names a known label
//! is a reference; anything else is a literal) and writing its result back
//! under the referenced label. Later actions observe earlier writes; that
//! ordering is the whole programming model of a stored document.

use crate::error::{EngineError, EngineResult};
use crate::extract;
use crate::functions::FunctionRegistry;
use crate::path::PathExpr;
use crate::terminology::{
    self, EclOperator, QueryOptions, SubsumptionMode, TerminologyService,
};
use crate::value::{DataValue, ValueMap};
use arden_spec::{ActionKind, ActionSpec, Comparator, PathType, SpecificationDocument};
use serde_json::Value;
use tracing::debug;

/// A resolved action argument: its current value, and the label it
/// references when it is a reference rather than a literal.
struct Binding {
    label: Option<String>,
    value: DataValue,
}

fn bind_string(map: &ValueMap, raw: &str) -> Binding {
    match map.get(raw) {
        Some(value) => Binding {
            label: Some(raw.to_string()),
            value: value.clone(),
        },
        None => Binding {
            label: None,
            value: DataValue::String(raw.to_string()),
        },
    }
}

fn bind_json(map: &ValueMap, raw: &Value) -> Binding {
    if let Value::String(s) = raw {
        return bind_string(map, s);
    }
    Binding {
        label: None,
        value: DataValue::from_json(raw),
    }
}

/// Apply every processing action of `doc` to `map`, in document order.
pub(crate) async fn apply_actions(
    terminology: &dyn TerminologyService,
    functions: &FunctionRegistry,
    context: &Value,
    doc: &SpecificationDocument,
    map: &mut ValueMap,
) -> EngineResult<()> {
    for action in doc.processing_actions() {
        let details = &action.details;
        let arg1 = bind_string(map, &details.arg1);
        let arg2 = details.arg2.as_ref().map(|raw| bind_json(map, raw));

        // The result lands under whichever argument is a genuine label
        // reference; an action touching no label has nowhere to write.
        let target = arg1
            .label
            .clone()
            .or_else(|| arg2.as_ref().and_then(|b| b.label.clone()))
            .ok_or_else(|| {
                EngineError::spec(
                    &doc.parameter,
                    format!(
                        "action `{}` references no known label (arg1 `{}`)",
                        action.action, details.arg1
                    ),
                )
            })?;

        let result = match action.action {
            ActionKind::Function => {
                let name = details.symbol.as_deref().unwrap_or_default();
                let mut args = vec![arg1.value.clone()];
                if let Some(binding) = &arg2 {
                    args.push(binding.value.clone());
                }
                functions.call(name, &args)?
            }
            ActionKind::FindRef => find_references(context, doc, action, &arg1.value)?,
            ActionKind::Comparison => compare(doc, action, &arg1, arg2.as_ref())?,
            kind if kind.is_hierarchy() => {
                expand_hierarchy(terminology, doc, action, kind, &arg1.value).await?
            }
            ActionKind::Subsumes | ActionKind::SubsumesOrEq | ActionKind::FilterByClass => {
                subsumption(terminology, doc, action, &arg1.value, arg2.as_ref()).await?
            }
            kind => {
                return Err(EngineError::spec(
                    &doc.parameter,
                    format!("constraint action `{}` cannot run in the processing pipeline", kind),
                ));
            }
        };

        debug!(
            parameter = %doc.parameter,
            action = %action.action,
            target = %target,
            "applied processing action"
        );
        map.insert(target, result);
    }
    Ok(())
}

/// `findRef`: each `"ResourceType/id"` reference is substituted into the
/// template path and re-queried against the hook context. Any reference the
/// context cannot resolve fails the action.
fn find_references(
    context: &Value,
    doc: &SpecificationDocument,
    action: &ActionSpec,
    arg1_value: &DataValue,
) -> EngineResult<DataValue> {
    let details = &action.details;
    let template = details.path.as_deref().unwrap_or_default();

    let references: Vec<String> = match arg1_value {
        DataValue::Array(items) => items
            .iter()
            .map(|item| match item {
                DataValue::String(s) => Ok(s.clone()),
                other => Err(EngineError::spec(
                    &doc.parameter,
                    format!(
                        "findRef expects reference strings, found `{}`",
                        other.type_name()
                    ),
                )),
            })
            .collect::<EngineResult<_>>()?,
        DataValue::String(s) => vec![s.clone()],
        other => {
            return Err(EngineError::spec(
                &doc.parameter,
                format!(
                    "findRef expects a list of references in `{}`, found `{}`",
                    details.arg1,
                    other.type_name()
                ),
            ));
        }
    };

    let mut collected: Vec<Value> = Vec::new();
    for reference in &references {
        let Some((resource_type, id)) = reference.split_once('/') else {
            return Err(EngineError::spec(
                &doc.parameter,
                format!("malformed reference `{}`", reference),
            ));
        };
        let resolved = template.replace("var1", resource_type).replace("var2", id);
        debug!(path = %resolved, "resolving reference");
        let found = PathExpr::parse(&resolved)?
            .evaluate(context)
            .ok_or_else(|| {
                EngineError::spec(
                    &doc.parameter,
                    format!("reference `{}` could not be resolved in the hook context", reference),
                )
            })?;
        match found {
            Value::Array(items) => collected.extend(items),
            other => collected.push(other),
        }
    }

    extract::coerce(
        &doc.parameter,
        &details.arg1,
        details.type_of.unwrap_or(PathType::Array),
        Value::Array(collected),
    )
}

/// `comparison`: both operands unwrapped from singletons, identical runtime
/// types, declared comparator, boolean result.
fn compare(
    doc: &SpecificationDocument,
    action: &ActionSpec,
    arg1: &Binding,
    arg2: Option<&Binding>,
) -> EngineResult<DataValue> {
    let details = &action.details;
    let comparator = details
        .symbol
        .as_deref()
        .and_then(Comparator::from_symbol)
        .ok_or_else(|| {
            EngineError::spec(&doc.parameter, "comparison action without a valid comparator")
        })?;
    let rhs = arg2.ok_or_else(|| {
        EngineError::spec(&doc.parameter, "comparison action requires two arguments")
    })?;

    let lhs_value = unwrap_operand(doc, &arg1.value, "LHS")?;
    let rhs_value = unwrap_operand(doc, &rhs.value, "RHS")?;
    if lhs_value.is_empty() || rhs_value.is_empty() {
        return Err(EngineError::spec(
            &doc.parameter,
            "comparison action requires both arguments to carry a value",
        ));
    }

    let outcome = lhs_value
        .compare(&rhs_value, comparator)
        .map_err(|message| EngineError::spec(&doc.parameter, message))?;
    Ok(DataValue::Boolean(outcome))
}

/// A comparison operand must be a primitive or a singleton sequence;
/// longer sequences are ill-formed input.
fn unwrap_operand(
    doc: &SpecificationDocument,
    value: &DataValue,
    side: &str,
) -> EngineResult<DataValue> {
    match value {
        DataValue::Array(items) if items.len() > 1 => Err(EngineError::spec(
            &doc.parameter,
            format!(
                "comparison action found more than one argument on its {} parameter",
                side
            ),
        )),
        other => Ok(other.clone().unwrap_singleton()),
    }
}

/// Hierarchy kinds: ECL expansion of every code in `arg1`, flattened; a
/// singleton result is stored as the bare code.
async fn expand_hierarchy(
    terminology: &dyn TerminologyService,
    doc: &SpecificationDocument,
    action: &ActionSpec,
    kind: ActionKind,
    arg1_value: &DataValue,
) -> EngineResult<DataValue> {
    let operator = EclOperator::from_kind(kind).ok_or_else(|| {
        EngineError::spec(&doc.parameter, format!("`{}` is not a hierarchy action", kind))
    })?;
    let codes = arg1_value.concept_codes().ok_or_else(|| {
        EngineError::spec(
            &doc.parameter,
            format!("action `{}` requires concept codes in `{}`", kind, action.details.arg1),
        )
    })?;
    let options = QueryOptions::from_details(&action.details);

    let expanded = terminology::expand_all(terminology, operator, &codes, &options).await?;
    let mut values: Vec<DataValue> = expanded.into_iter().map(DataValue::String).collect();
    Ok(if values.len() == 1 {
        values.remove(0)
    } else {
        DataValue::Array(values)
    })
}

/// `subsumes`/`subsumesOrEq` reduce the cross product as a universal
/// quantifier over `arg1`; `filterByClass` keeps the related `arg1`
/// elements (possibly none).
async fn subsumption(
    terminology: &dyn TerminologyService,
    doc: &SpecificationDocument,
    action: &ActionSpec,
    arg1_value: &DataValue,
    arg2: Option<&Binding>,
) -> EngineResult<DataValue> {
    let kind = action.action;
    let rhs = arg2.ok_or_else(|| {
        EngineError::spec(&doc.parameter, format!("action `{}` requires two arguments", kind))
    })?;
    let codes_error = |arg: &str| {
        EngineError::spec(
            &doc.parameter,
            format!("action `{}` requires a numeric concept-code array in `{}`", kind, arg),
        )
    };
    let codes_a = arg1_value
        .concept_codes()
        .ok_or_else(|| codes_error(&action.details.arg1))?;
    let codes_b = rhs.value.concept_codes().ok_or_else(|| codes_error("arg2"))?;
    let mode = SubsumptionMode::for_kind(kind).ok_or_else(|| {
        EngineError::spec(&doc.parameter, format!("`{}` is not a subsumption action", kind))
    })?;
    let options = QueryOptions::from_details(&action.details);

    let matrix =
        terminology::relation_matrix(terminology, &codes_a, &codes_b, &options, mode).await?;

    Ok(match kind {
        ActionKind::FilterByClass => {
            let elements: Vec<DataValue> = match arg1_value {
                DataValue::Array(items) => items.clone(),
                other => vec![other.clone()],
            };
            DataValue::Array(
                elements
                    .into_iter()
                    .zip(matrix)
                    .filter_map(|(element, row)| row.into_iter().any(|b| b).then_some(element))
                    .collect(),
            )
        }
        _ => DataValue::Boolean(matrix.iter().all(|row| row.iter().any(|&related| related))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminology::{SubsumptionOutcome, TermResult};
    use async_trait::async_trait;
    use serde_json::json;

    struct StubTerminology;

    #[async_trait]
    impl TerminologyService for StubTerminology {
        async fn expand(
            &self,
            _operator: EclOperator,
            code: &str,
            _options: &QueryOptions,
        ) -> TermResult<Vec<String>> {
            Ok(vec![code.to_string(), format!("{}9", code)])
        }

        async fn subsumes(
            &self,
            code_a: &str,
            _code_b: &str,
            _options: &QueryOptions,
        ) -> TermResult<SubsumptionOutcome> {
            // Codes starting with '1' are in the class, everything else out.
            Ok(if code_a.starts_with('1') {
                SubsumptionOutcome::SubsumedBy
            } else {
                SubsumptionOutcome::NotSubsumed
            })
        }
    }

    fn doc(value: Value) -> SpecificationDocument {
        serde_json::from_value(value).unwrap()
    }

    async fn run(document: &SpecificationDocument, map: &mut ValueMap) -> EngineResult<()> {
        let functions = FunctionRegistry::with_builtins();
        apply_actions(&StubTerminology, &functions, &json!({}), document, map).await
    }

    #[test]
    fn arguments_bind_labels_before_literals() {
        let mut map = ValueMap::default();
        map.insert("age", DataValue::Number(45.0));
        let binding = bind_string(&map, "age");
        assert_eq!(binding.label.as_deref(), Some("age"));
        let literal = bind_string(&map, "weight");
        assert!(literal.label.is_none());
    }

    #[tokio::test]
    async fn comparison_stores_boolean_under_arg1() {
        let document = doc(json!({
            "parameter": "p",
            "pathList": [{"label": "age", "path": "$.age", "typeOf": "number"}],
            "actionList": [
                {"action": "comparison", "details": {"arg1": "age", "arg2": 40, "symbol": "gte"}}
            ]
        }));
        let mut map = ValueMap::default();
        map.insert("age", DataValue::Number(45.0));
        run(&document, &mut map).await.unwrap();
        assert_eq!(map.get("age"), Some(&DataValue::Boolean(true)));
    }

    #[tokio::test]
    async fn comparison_rejects_wide_arrays() {
        let document = doc(json!({
            "parameter": "p",
            "pathList": [{"label": "xs", "path": "$.xs", "typeOf": "array"}],
            "actionList": [
                {"action": "comparison", "details": {"arg1": "xs", "arg2": 1, "symbol": "eq"}}
            ]
        }));
        let mut map = ValueMap::default();
        map.insert(
            "xs",
            DataValue::Array(vec![DataValue::Number(1.0), DataValue::Number(2.0)]),
        );
        let err = run(&document, &mut map).await.unwrap_err();
        assert!(matches!(err, EngineError::Specification { .. }));
    }

    #[tokio::test]
    async fn comparison_rejects_mixed_types() {
        let document = doc(json!({
            "parameter": "p",
            "pathList": [{"label": "age", "path": "$.age", "typeOf": "number"}],
            "actionList": [
                {"action": "comparison", "details": {"arg1": "age", "arg2": "forty", "symbol": "eq"}}
            ]
        }));
        let mut map = ValueMap::default();
        map.insert("age", DataValue::Number(45.0));
        assert!(run(&document, &mut map).await.is_err());
    }

    #[tokio::test]
    async fn hierarchy_expansion_flattens_codes() {
        let document = doc(json!({
            "parameter": "p",
            "pathList": [{"label": "codes", "path": "$.c", "typeOf": "array"}],
            "actionList": [
                {"action": "descendantOf", "details": {"arg1": "codes"}}
            ]
        }));
        let mut map = ValueMap::default();
        map.insert(
            "codes",
            DataValue::Array(vec![DataValue::Number(11.0), DataValue::Number(22.0)]),
        );
        run(&document, &mut map).await.unwrap();
        assert_eq!(
            map.get("codes"),
            Some(&DataValue::Array(vec![
                DataValue::String("11".into()),
                DataValue::String("119".into()),
                DataValue::String("22".into()),
                DataValue::String("229".into()),
            ]))
        );
    }

    #[tokio::test]
    async fn filter_by_class_keeps_a_subsequence_of_arg1() {
        let document = doc(json!({
            "parameter": "p",
            "pathList": [{"label": "codes", "path": "$.c", "typeOf": "array"}],
            "actionList": [
                {"action": "filterByClass", "details": {"arg1": "codes", "arg2": [99]}}
            ]
        }));
        let mut map = ValueMap::default();
        map.insert(
            "codes",
            DataValue::Array(vec![
                DataValue::Number(12.0),
                DataValue::Number(34.0),
                DataValue::Number(15.0),
            ]),
        );
        run(&document, &mut map).await.unwrap();
        assert_eq!(
            map.get("codes"),
            Some(&DataValue::Array(vec![
                DataValue::Number(12.0),
                DataValue::Number(15.0),
            ]))
        );
    }

    #[tokio::test]
    async fn subsumes_is_a_universal_quantifier() {
        let document = doc(json!({
            "parameter": "p",
            "pathList": [{"label": "codes", "path": "$.c", "typeOf": "array"}],
            "actionList": [
                {"action": "subsumes", "details": {"arg1": "codes", "arg2": [99]}}
            ]
        }));

        // Every arg1 code related: true.
        let mut map = ValueMap::default();
        map.insert(
            "codes",
            DataValue::Array(vec![DataValue::Number(12.0), DataValue::Number(15.0)]),
        );
        run(&document, &mut map).await.unwrap();
        assert_eq!(map.get("codes"), Some(&DataValue::Boolean(false)));

        // The stub only reports SubsumedBy, never Subsumes, so the strict
        // quantifier is false even though every code is in the class.
        let strict_doc = doc(json!({
            "parameter": "p",
            "pathList": [{"label": "codes", "path": "$.c", "typeOf": "array"}],
            "actionList": [
                {"action": "subsumesOrEq", "details": {"arg1": "codes", "arg2": [12, 15]}}
            ]
        }));
        let mut map = ValueMap::default();
        map.insert(
            "codes",
            DataValue::Array(vec![DataValue::Number(12.0), DataValue::Number(15.0)]),
        );
        run(&strict_doc, &mut map).await.unwrap();
        // Both codes short-circuit on equality under subsumesOrEq.
        assert_eq!(map.get("codes"), Some(&DataValue::Boolean(true)));
    }

    #[tokio::test]
    async fn function_action_dispatches_by_symbol() {
        let document = doc(json!({
            "parameter": "p",
            "pathList": [{"label": "meds", "path": "$.m", "typeOf": "array"}],
            "actionList": [
                {"action": "function",
                 "details": {"arg1": "meds", "arg2": ["b"], "symbol": "arr_diff_nonSymm"}}
            ]
        }));
        let mut map = ValueMap::default();
        map.insert(
            "meds",
            DataValue::Array(vec![
                DataValue::String("a".into()),
                DataValue::String("b".into()),
            ]),
        );
        run(&document, &mut map).await.unwrap();
        assert_eq!(
            map.get("meds"),
            Some(&DataValue::Array(vec![DataValue::String("a".into())]))
        );
    }

    #[tokio::test]
    async fn find_ref_resolves_and_retypes() {
        let document = doc(json!({
            "parameter": "p",
            "pathList": [{"label": "refs", "path": "$.refs", "typeOf": "array"}],
            "actionList": [
                {"action": "findRef",
                 "details": {"arg1": "refs", "path": "$.prefetch.var1.var2.code", "typeOf": "number"}}
            ]
        }));
        let mut map = ValueMap::default();
        map.insert(
            "refs",
            DataValue::Array(vec![DataValue::String("Condition/c1".into())]),
        );
        let context = json!({"prefetch": {"Condition": {"c1": {"code": "44"}}}});
        let functions = FunctionRegistry::with_builtins();
        apply_actions(&StubTerminology, &functions, &context, &document, &mut map)
            .await
            .unwrap();
        assert_eq!(
            map.get("refs"),
            Some(&DataValue::Array(vec![DataValue::Number(44.0)]))
        );
    }

    #[tokio::test]
    async fn unresolved_reference_fails_the_action() {
        let document = doc(json!({
            "parameter": "p",
            "pathList": [{"label": "refs", "path": "$.refs", "typeOf": "array"}],
            "actionList": [
                {"action": "findRef",
                 "details": {"arg1": "refs", "path": "$.prefetch.var1.var2"}}
            ]
        }));
        let mut map = ValueMap::default();
        map.insert(
            "refs",
            DataValue::Array(vec![DataValue::String("Condition/missing".into())]),
        );
        let functions = FunctionRegistry::with_builtins();
        let err = apply_actions(&StubTerminology, &functions, &json!({}), &document, &mut map)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Specification { .. }));
    }

    #[tokio::test]
    async fn literal_only_action_is_an_error() {
        let document = doc(json!({
            "parameter": "p",
            "pathList": [{"label": "x", "path": "$.x", "typeOf": "number"}],
            "actionList": [
                {"action": "comparison", "details": {"arg1": "unknown", "arg2": 4, "symbol": "eq"}}
            ]
        }));
        let mut map = ValueMap::default();
        map.insert("x", DataValue::Number(1.0));
        let err = run(&document, &mut map).await.unwrap_err();
        assert!(matches!(err, EngineError::Specification { .. }));
    }
}
