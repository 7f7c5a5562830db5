//! # Arden rule-evaluation engine
//!
//! The engine interprets stored specification documents against a CDS hook
//! context: it extracts and types the declared data points, applies the
//! document's processing actions in order (reference resolution,
//! comparisons, terminology hierarchy and subsumption operators, user
//! functions), and selects the outcome payloads whose constraints the
//! resulting values satisfy.
//!
//! ## Evaluation of one document
//!
//! ```text
//! hook context ──▶ extract (pathList)  ──▶ ValueMap
//!                  actions (actionList) ──▶ ValueMap mutated in order
//!                  constraints          ──▶ Some(outcomes) | None
//! ```
//!
//! The [`Engine`] owns the injected collaborators: a
//! [`terminology::TerminologyService`] for hierarchy/subsumption operators
//! (HTTP-backed in production, stubbed in tests) and a
//! [`functions::FunctionRegistry`] for `function` actions.
//!
//! ## Example
//!
//! ```no_run
//! use arden_engine::{Engine, terminology::{HttpTerminology, InMemoryCache}};
//! use arden_spec::SpecificationDocument;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example(document: &SpecificationDocument) -> Result<(), Box<dyn std::error::Error>> {
//! let cache = Arc::new(InMemoryCache::new(Duration::from_secs(3600)));
//! let terminology = Arc::new(HttpTerminology::new("snowstorm.example.org", cache));
//! let engine = Engine::new(terminology);
//!
//! let context = serde_json::json!({"patient": {"age": "45"}});
//! let outcome = engine.evaluate(document, &context).await?;
//! # Ok(())
//! # }
//! ```
//!
//! Evaluation is fail-fast: the pipeline and the constraint evaluator never
//! swallow an error, and a failed document leaks no partial value map into
//! its result.

mod actions;
mod constraints;
pub mod error;
mod extract;
pub mod functions;
pub mod path;
pub mod terminology;
pub mod value;

pub use error::{EngineError, EngineResult};
pub use functions::FunctionRegistry;
pub use value::{DataValue, ValueMap};

use arden_spec::SpecificationDocument;
use serde_json::Value;
use std::sync::Arc;
use terminology::TerminologyService;
use tracing::debug;

/// The rule-evaluation engine. Cheap to clone via `Arc` collaborators; one
/// instance serves the whole process.
pub struct Engine {
    terminology: Arc<dyn TerminologyService>,
    functions: FunctionRegistry,
}

impl Engine {
    /// An engine with the built-in user functions.
    pub fn new(terminology: Arc<dyn TerminologyService>) -> Self {
        Engine {
            terminology,
            functions: FunctionRegistry::with_builtins(),
        }
    }

    /// Replace the function registry (adds to or restricts the built-ins).
    pub fn with_functions(mut self, functions: FunctionRegistry) -> Self {
        self.functions = functions;
        self
    }

    /// Evaluate one specification document against a hook context.
    ///
    /// Returns the selected outcome payload, `Ok(None)` when no constraint
    /// object was satisfied (or the fallback value was empty), or the error
    /// that aborted evaluation. The value map lives and dies inside this
    /// call.
    pub async fn evaluate(
        &self,
        document: &SpecificationDocument,
        hook_context: &Value,
    ) -> EngineResult<Option<Value>> {
        document.validate()?;
        debug!(parameter = %document.parameter, "evaluating document");

        let mut map = ValueMap::default();
        extract::extract_data_points(hook_context, document, &mut map)?;
        actions::apply_actions(
            self.terminology.as_ref(),
            &self.functions,
            hook_context,
            document,
            &mut map,
        )
        .await?;
        constraints::evaluate_constraints(self.terminology.as_ref(), document, &map).await
    }
}
