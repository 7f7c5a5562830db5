//! Path expressions over the hook context.
//!
//! Documents locate data with a small JSONPath dialect:
//!
//! ```text
//! $.context.patientId
//! $.prefetch.conditions.entry[*].resource.code.coding[*].code
//! $..birthDate
//! $.entry[0].resource
//! $['quoted name'].value
//! ```
//!
//! Supported segments are member access (`.name`, `['name']`), recursive
//! descent (`..name`), indexing (`[n]`, negative from the end) and the
//! wildcard (`[*]`). Member access applied to an array maps over its
//! elements, which is what makes prefetch bundles ergonomic to query.
//!
//! Result shaping follows the extractor's contract: no match is `None`, a
//! single match is the value itself, several matches become an array with
//! one level of flattening.

mod eval;
mod parser;

use crate::error::EngineError;
use chumsky::Parser;
use serde_json::Value;

/// One step of a parsed path expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// `.name` or `['name']`
    Field(String),
    /// `..name`
    Recursive(String),
    /// `[n]`
    Index(i64),
    /// `[*]`
    Wildcard,
}

/// A parsed path expression.
#[derive(Debug, Clone, PartialEq)]
pub struct PathExpr {
    segments: Vec<Segment>,
}

impl PathExpr {
    /// Parse a path expression. The grammar is anchored: expressions start
    /// at `$` and must consume their whole input.
    pub fn parse(input: &str) -> Result<PathExpr, EngineError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(EngineError::Path("empty path expression".to_string()));
        }
        parser::parser()
            .parse(trimmed)
            .into_result()
            .map(|segments| PathExpr { segments })
            .map_err(|errors| {
                let rendered = errors
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; ");
                EngineError::Path(format!("`{}`: {}", trimmed, rendered))
            })
    }

    /// Evaluate against a hook context. `None` means the path matched
    /// nothing at all.
    pub fn evaluate(&self, context: &Value) -> Option<Value> {
        eval::evaluate(&self.segments, context)
    }
}
