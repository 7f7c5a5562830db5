//! # Arden specification documents
//!
//! This crate defines the stored, declarative documents that drive the Arden
//! rule engine. A *specification document* describes, for one named
//! parameter, where to find data in a CDS hook context (`pathList`), which
//! operators to apply to the extracted values (`actionList`), and which
//! constraint/outcome pairs select the final result (`constraintList`).
//!
//! The document format is JSON. Field names follow the stored form the
//! service has always used (`parameter`, `pathList`, `typeOf`,
//! `isMandatory`, ...), so existing document collections load unchanged.
//!
//! Documents are validated eagerly at load time ([`SpecificationDocument::validate`]):
//! structural problems are configuration errors and must never surface as
//! late evaluation failures.
//!
//! The [`store`] module provides the in-process document collection used by
//! the server: one JSON file of documents per CDS service, plus a
//! `services.json` discovery catalogue.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

pub mod store;

pub use store::SpecStore;

/// Result type alias for specification handling.
pub type SpecResult<T> = Result<T, SpecError>;

/// Errors raised while loading or validating specification documents.
#[derive(Debug, Error)]
pub enum SpecError {
    /// A document failed structural validation. The message names the
    /// offending parameter so operators can locate it in the store.
    #[error("invalid specification document `{parameter}`: {message}")]
    InvalidDocument { parameter: String, message: String },

    /// Reading the store directory failed.
    #[error("failed to read specification store: {0}")]
    Io(#[from] std::io::Error),

    /// A store file did not parse as the expected JSON shape.
    #[error("failed to parse specification file `{file}`: {source}")]
    Parse {
        file: String,
        #[source]
        source: serde_json::Error,
    },

    /// A service id with no document collection behind it.
    #[error("unknown CDS service: {0}")]
    UnknownService(String),
}

impl SpecError {
    fn invalid(parameter: &str, message: impl Into<String>) -> Self {
        SpecError::InvalidDocument {
            parameter: parameter.to_string(),
            message: message.into(),
        }
    }
}

/// Declared type of an extracted data point.
///
/// `Array` and `Object` pass values through unchanged; the scalar types
/// coerce element-wise (see the engine's extractor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathType {
    #[default]
    String,
    Number,
    Boolean,
    Date,
    Array,
    Object,
}

/// Default value of a [`DataPathSpec`], applied when the primary path
/// resolves to nothing.
///
/// The tagged form replaces the legacy prefix sniffing on strings: a
/// default is either an explicit `{ "path": "..." }` object (evaluated
/// against the hook context like the primary path) or any other JSON
/// literal, used as-is.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DefaultValue {
    /// Another path expression into the hook context.
    Path {
        path: String,
    },
    /// A literal JSON value.
    Literal(Value),
}

fn default_true() -> bool {
    true
}

/// One data point to extract from the hook context.
#[derive(Debug, Clone, Deserialize)]
pub struct DataPathSpec {
    /// Name the extracted value is stored under. Unique per document.
    pub label: String,

    /// Path expression into the hook context. May be empty when the value
    /// comes entirely from `defaultVal`.
    #[serde(default)]
    pub path: String,

    /// Declared type the raw value is coerced to.
    #[serde(rename = "typeOf", default)]
    pub type_of: PathType,

    /// Fallback when the primary path resolves to nothing.
    #[serde(rename = "defaultVal", default)]
    pub default: Option<DefaultValue>,

    /// Mandatory data points fail the document when neither path nor
    /// default produces a value; optional ones store an empty slot.
    #[serde(rename = "isMandatory", default = "default_true")]
    pub is_mandatory: bool,
}

/// The closed set of operators a document can apply.
///
/// Kinds split into *processing* operators (applied in order by the action
/// pipeline, mutating the value map) and *constraint* operators (evaluated
/// per constraint object to select outcomes). [`ActionKind::is_processing`]
/// encodes the partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum ActionKind {
    #[serde(rename = "function")]
    Function,
    #[serde(rename = "findRef")]
    FindRef,
    #[serde(rename = "comparison")]
    Comparison,
    #[serde(rename = "parentOf")]
    ParentOf,
    #[serde(rename = "parentOrSelfOf")]
    ParentOrSelfOf,
    #[serde(rename = "childOf")]
    ChildOf,
    #[serde(rename = "childOrSelfOf")]
    ChildOrSelfOf,
    #[serde(rename = "ancestorOf")]
    AncestorOf,
    #[serde(rename = "ancestorOrSelfOf")]
    AncestorOrSelfOf,
    #[serde(rename = "descendantOf")]
    DescendantOf,
    #[serde(rename = "descendantOrSelfOf")]
    DescendantOrSelfOf,
    #[serde(rename = "subsumes")]
    Subsumes,
    #[serde(rename = "subsumesOrEq")]
    SubsumesOrEq,
    #[serde(rename = "filterByClass")]
    FilterByClass,
    #[serde(rename = "isA")]
    IsA,
    #[serde(rename = "hasA")]
    HasA,
    #[serde(rename = "isAOrEq")]
    IsAOrEq,
    #[serde(rename = "hasAOrEq")]
    HasAOrEq,
    #[serde(rename = "Qomparison")]
    Qomparison,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "includes")]
    Includes,
    #[serde(rename = "isIncluded")]
    IsIncluded,
    #[serde(rename = "isSubsetOf")]
    IsSubsetOf,
    #[serde(rename = "isSupersetOf")]
    IsSupersetOf,
    #[serde(rename = "anyElemIn")]
    AnyElemIn,
}

impl ActionKind {
    /// Processing operators run in the action pipeline before constraint
    /// evaluation; everything else is a constraint operator.
    pub fn is_processing(self) -> bool {
        matches!(
            self,
            ActionKind::Function
                | ActionKind::FindRef
                | ActionKind::Comparison
                | ActionKind::Subsumes
                | ActionKind::SubsumesOrEq
                | ActionKind::FilterByClass
        ) || self.is_hierarchy()
    }

    /// Operators answered by an ECL hierarchy expansion.
    pub fn is_hierarchy(self) -> bool {
        matches!(
            self,
            ActionKind::ParentOf
                | ActionKind::ParentOrSelfOf
                | ActionKind::ChildOf
                | ActionKind::ChildOrSelfOf
                | ActionKind::AncestorOf
                | ActionKind::AncestorOrSelfOf
                | ActionKind::DescendantOf
                | ActionKind::DescendantOrSelfOf
        )
    }

    /// Constraint-side operators answered by pairwise subsumption.
    pub fn is_constraint_subsumption(self) -> bool {
        matches!(
            self,
            ActionKind::IsA | ActionKind::HasA | ActionKind::IsAOrEq | ActionKind::HasAOrEq
        )
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionKind::Function => "function",
            ActionKind::FindRef => "findRef",
            ActionKind::Comparison => "comparison",
            ActionKind::ParentOf => "parentOf",
            ActionKind::ParentOrSelfOf => "parentOrSelfOf",
            ActionKind::ChildOf => "childOf",
            ActionKind::ChildOrSelfOf => "childOrSelfOf",
            ActionKind::AncestorOf => "ancestorOf",
            ActionKind::AncestorOrSelfOf => "ancestorOrSelfOf",
            ActionKind::DescendantOf => "descendantOf",
            ActionKind::DescendantOrSelfOf => "descendantOrSelfOf",
            ActionKind::Subsumes => "subsumes",
            ActionKind::SubsumesOrEq => "subsumesOrEq",
            ActionKind::FilterByClass => "filterByClass",
            ActionKind::IsA => "isA",
            ActionKind::HasA => "hasA",
            ActionKind::IsAOrEq => "isAOrEq",
            ActionKind::HasAOrEq => "hasAOrEq",
            ActionKind::Qomparison => "Qomparison",
            ActionKind::In => "in",
            ActionKind::Includes => "includes",
            ActionKind::IsIncluded => "isIncluded",
            ActionKind::IsSubsetOf => "isSubsetOf",
            ActionKind::IsSupersetOf => "isSupersetOf",
            ActionKind::AnyElemIn => "anyElemIn",
        };
        f.write_str(name)
    }
}

/// Comparator symbols carried in `details.symbol` for `comparison` and
/// `Qomparison` actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
    Neq,
}

impl Comparator {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "eq" => Some(Comparator::Eq),
            "lt" => Some(Comparator::Lt),
            "lte" => Some(Comparator::Lte),
            "gt" => Some(Comparator::Gt),
            "gte" => Some(Comparator::Gte),
            "neq" => Some(Comparator::Neq),
            _ => None,
        }
    }
}

/// Operator arguments and modifiers.
///
/// `arg1` is the primary argument and usually a label reference; `arg2` may
/// be a label reference, a literal, or (for constraint actions) the name of
/// the `queryArgs` entry to compare against. The terminology fields
/// (`termSystem`, `codeSystem`, `version`, `filter`, `count`) shape the
/// query sent to the concept-hierarchy service.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionDetails {
    pub arg1: String,

    #[serde(default)]
    pub arg2: Option<Value>,

    /// Comparator for `comparison`/`Qomparison`, function name for
    /// `function`.
    #[serde(default)]
    pub symbol: Option<String>,

    #[serde(rename = "termSystem", default)]
    pub term_system: Option<String>,

    #[serde(rename = "codeSystem", default)]
    pub code_system: Option<String>,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub filter: Option<String>,

    #[serde(default)]
    pub count: Option<u32>,

    /// Template path for `findRef`, with `var1`/`var2` placeholders.
    #[serde(default)]
    pub path: Option<String>,

    /// Re-typing applied to `findRef` results.
    #[serde(rename = "typeOf", default)]
    pub type_of: Option<PathType>,
}

/// One operator application from a document's `actionList`.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionSpec {
    pub action: ActionKind,
    pub details: ActionDetails,
}

impl ActionSpec {
    /// `arg2` rendered as a plain string when it is one (label references
    /// and `queryArgs` keys are strings; anything else is a literal).
    pub fn arg2_as_str(&self) -> Option<&str> {
        self.details.arg2.as_ref().and_then(Value::as_str)
    }
}

/// A stored pairing of expected argument values with an outcome payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ConstraintObject {
    /// Expected value per argument name, compared against the value map by
    /// the constraint actions.
    #[serde(rename = "queryArgs")]
    pub query_args: serde_json::Map<String, Value>,

    /// Payload returned when every constraint action holds for this object.
    #[serde(default)]
    pub outcome: Vec<Value>,
}

/// A stored declarative record describing what to extract, which actions to
/// apply, and which constraint/outcome pairs exist for one named parameter.
#[derive(Debug, Clone, Deserialize)]
pub struct SpecificationDocument {
    /// Unique key of this document within its service collection.
    pub parameter: String,

    /// Identifiers of the clinical guidelines this parameter feeds.
    #[serde(rename = "cigInvolved", default)]
    pub cig_involved: Vec<String>,

    #[serde(rename = "pathList")]
    pub path_list: Vec<DataPathSpec>,

    #[serde(rename = "actionList", default)]
    pub action_list: Vec<ActionSpec>,

    #[serde(rename = "constraintList", default)]
    pub constraint_list: Vec<ConstraintObject>,
}

impl SpecificationDocument {
    /// Actions applied by the pipeline, in document order.
    pub fn processing_actions(&self) -> impl Iterator<Item = &ActionSpec> {
        self.action_list.iter().filter(|a| a.action.is_processing())
    }

    /// Actions evaluated against the constraint objects, in document order.
    pub fn constraint_actions(&self) -> impl Iterator<Item = &ActionSpec> {
        self.action_list
            .iter()
            .filter(|a| !a.action.is_processing())
    }

    /// Structural validation, run once at load time.
    ///
    /// Anything caught here is a configuration error in the store; the
    /// engine can assume a validated document.
    pub fn validate(&self) -> SpecResult<()> {
        if self.parameter.trim().is_empty() {
            return Err(SpecError::invalid(
                &self.parameter,
                "property `parameter` must be a non-empty string",
            ));
        }
        if self.path_list.is_empty() {
            return Err(SpecError::invalid(
                &self.parameter,
                "property `pathList` must contain at least one entry",
            ));
        }

        let mut labels = HashSet::new();
        for path in &self.path_list {
            if path.label.trim().is_empty() {
                return Err(SpecError::invalid(
                    &self.parameter,
                    "a pathList entry is missing its `label`",
                ));
            }
            if !labels.insert(path.label.as_str()) {
                return Err(SpecError::invalid(
                    &self.parameter,
                    format!("duplicate pathList label `{}`", path.label),
                ));
            }
        }

        for spec in &self.action_list {
            self.validate_action(spec)?;
        }

        // Constraint actions with nothing to constrain is a setup error,
        // caught here rather than at evaluation time.
        if self.constraint_actions().next().is_some() && self.constraint_list.is_empty() {
            return Err(SpecError::invalid(
                &self.parameter,
                "document declares constraint actions but `constraintList` is empty",
            ));
        }

        Ok(())
    }

    fn validate_action(&self, spec: &ActionSpec) -> SpecResult<()> {
        let details = &spec.details;
        if details.arg1.trim().is_empty() {
            return Err(SpecError::invalid(
                &self.parameter,
                format!("action `{}` is missing `details.arg1`", spec.action),
            ));
        }
        match spec.action {
            ActionKind::Function => {
                if details.symbol.as_deref().unwrap_or("").trim().is_empty() {
                    return Err(SpecError::invalid(
                        &self.parameter,
                        "a `function` action is missing its function name in `details.symbol`",
                    ));
                }
            }
            ActionKind::Comparison | ActionKind::Qomparison => {
                let symbol = details.symbol.as_deref().unwrap_or("");
                if Comparator::from_symbol(symbol).is_none() {
                    return Err(SpecError::invalid(
                        &self.parameter,
                        format!(
                            "action `{}` carries unknown comparator symbol `{}`",
                            spec.action, symbol
                        ),
                    ));
                }
                if spec.action == ActionKind::Comparison && details.arg2.is_none() {
                    return Err(SpecError::invalid(
                        &self.parameter,
                        "a `comparison` action requires `details.arg2`",
                    ));
                }
            }
            ActionKind::FindRef => {
                if details.path.as_deref().unwrap_or("").trim().is_empty() {
                    return Err(SpecError::invalid(
                        &self.parameter,
                        "a `findRef` action is missing its template `details.path`",
                    ));
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// A CDS service descriptor, served verbatim by the discovery endpoint.
#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct CdsService {
    pub id: String,
    pub hook: String,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefetch: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document(value: Value) -> SpecificationDocument {
        serde_json::from_value(value).expect("document should deserialize")
    }

    fn minimal() -> Value {
        json!({
            "parameter": "age",
            "pathList": [
                {"label": "age", "path": "$.patient.age", "typeOf": "number"}
            ]
        })
    }

    #[test]
    fn parses_minimal_document() {
        let doc = document(minimal());
        assert_eq!(doc.parameter, "age");
        assert_eq!(doc.path_list.len(), 1);
        assert!(doc.path_list[0].is_mandatory);
        assert_eq!(doc.path_list[0].type_of, PathType::Number);
        assert!(doc.validate().is_ok());
    }

    #[test]
    fn default_value_tagging() {
        let doc = document(json!({
            "parameter": "meds",
            "pathList": [
                {
                    "label": "meds",
                    "path": "$.context.medications",
                    "typeOf": "array",
                    "defaultVal": {"path": "$.prefetch.medications"},
                    "isMandatory": false
                },
                {
                    "label": "threshold",
                    "path": "",
                    "typeOf": "number",
                    "defaultVal": 40
                }
            ]
        }));
        assert!(matches!(
            doc.path_list[0].default,
            Some(DefaultValue::Path { .. })
        ));
        assert!(matches!(
            doc.path_list[1].default,
            Some(DefaultValue::Literal(_))
        ));
    }

    #[test]
    fn action_partition_follows_kind() {
        let doc = document(json!({
            "parameter": "copd",
            "pathList": [{"label": "codes", "path": "$.x", "typeOf": "array"}],
            "actionList": [
                {"action": "descendantOf", "details": {"arg1": "codes"}},
                {"action": "isA", "details": {"arg1": "codes", "arg2": "arg2"}},
                {"action": "Qomparison", "details": {"arg1": "codes", "arg2": "arg2", "symbol": "eq"}}
            ],
            "constraintList": [
                {"queryArgs": {"arg2": [1]}, "outcome": ["a"]}
            ]
        }));
        let processing: Vec<_> = doc.processing_actions().map(|a| a.action).collect();
        let constraint: Vec<_> = doc.constraint_actions().map(|a| a.action).collect();
        assert_eq!(processing, vec![ActionKind::DescendantOf]);
        assert_eq!(constraint, vec![ActionKind::IsA, ActionKind::Qomparison]);
        assert!(doc.validate().is_ok());
    }

    #[test]
    fn constraint_actions_require_constraints() {
        let doc = document(json!({
            "parameter": "broken",
            "pathList": [{"label": "x", "path": "$.x"}],
            "actionList": [
                {"action": "in", "details": {"arg1": "x", "arg2": "arg2"}}
            ]
        }));
        let err = doc.validate().unwrap_err();
        assert!(err.to_string().contains("constraintList"));
    }

    #[test]
    fn duplicate_labels_rejected() {
        let doc = document(json!({
            "parameter": "dup",
            "pathList": [
                {"label": "x", "path": "$.a"},
                {"label": "x", "path": "$.b"}
            ]
        }));
        assert!(doc.validate().is_err());
    }

    #[test]
    fn unknown_comparator_rejected() {
        let doc = document(json!({
            "parameter": "cmp",
            "pathList": [{"label": "x", "path": "$.a", "typeOf": "number"}],
            "actionList": [
                {"action": "comparison", "details": {"arg1": "x", "arg2": 1, "symbol": "=="}}
            ]
        }));
        assert!(doc.validate().is_err());
    }
}
