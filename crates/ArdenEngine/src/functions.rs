//! User-defined function registry.
//!
//! `function` actions dispatch by name to externally supplied functions.
//! The registry ships the built-ins the stored templates already refer to
//! (`calculate_age`, `getYearsFromNow`, `arr_diff_nonSymm`, `arr_union`);
//! integrations may register more through [`FunctionRegistry::register`].
//!
//! Contract: a function receives the action's resolved arguments
//! positionally and returns a single value, which the pipeline writes back
//! under the referenced label.

use crate::error::{EngineError, EngineResult};
use crate::value::{DataValue, parse_date};
use chrono::{Datelike, Utc};
use std::collections::HashMap;

/// A registered user function.
pub type UserFunction =
    Box<dyn Fn(&[DataValue]) -> Result<DataValue, String> + Send + Sync + 'static>;

/// Name → function table, injected into the engine.
pub struct FunctionRegistry {
    functions: HashMap<String, UserFunction>,
}

impl FunctionRegistry {
    /// An empty registry, for callers that want full control.
    pub fn empty() -> Self {
        FunctionRegistry {
            functions: HashMap::new(),
        }
    }

    /// The registry with the reference built-ins.
    pub fn with_builtins() -> Self {
        let mut registry = FunctionRegistry::empty();
        registry.register("calculate_age", |args| {
            let dob = date_arg(args, 0)?;
            let today = Utc::now().date_naive();
            let mut age = today.year() - dob.year();
            if (today.month(), today.day()) < (dob.month(), dob.day()) {
                age -= 1;
            }
            Ok(DataValue::Number(age as f64))
        });
        registry.register("getYearsFromNow", |args| {
            let then = date_arg(args, 0)?;
            let now = Utc::now().date_naive();
            let days = (now - then).num_days() as f64;
            Ok(DataValue::Number(days / 365.25))
        });
        registry.register("arr_diff_nonSymm", |args| {
            let keep = array_arg(args, 0)?;
            let remove = array_arg(args, 1)?;
            Ok(DataValue::Array(
                keep.into_iter().filter(|v| !remove.contains(v)).collect(),
            ))
        });
        registry.register("arr_union", |args| {
            let mut union = array_arg(args, 0)?;
            for value in array_arg(args, 1)? {
                if !union.contains(&value) {
                    union.push(value);
                }
            }
            Ok(DataValue::Array(union))
        });
        registry
    }

    /// Register (or replace) a function under `name`.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        function: impl Fn(&[DataValue]) -> Result<DataValue, String> + Send + Sync + 'static,
    ) {
        self.functions.insert(name.into(), Box::new(function));
    }

    /// Dispatch by name. Unknown names and function failures both surface
    /// as [`EngineError::Function`].
    pub fn call(&self, name: &str, args: &[DataValue]) -> EngineResult<DataValue> {
        let function = self.functions.get(name).ok_or_else(|| EngineError::Function {
            name: name.to_string(),
            message: "no such function is registered".to_string(),
        })?;
        function(args).map_err(|message| EngineError::Function {
            name: name.to_string(),
            message,
        })
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        FunctionRegistry::with_builtins()
    }
}

fn date_arg(args: &[DataValue], index: usize) -> Result<chrono::NaiveDate, String> {
    match args.get(index).map(|v| v.clone().unwrap_singleton()) {
        Some(DataValue::Date(d)) => Ok(d.date_naive()),
        Some(DataValue::String(s)) => parse_date(&s)
            .map(|d| d.date_naive())
            .ok_or_else(|| format!("argument {} is not a date: `{}`", index + 1, s)),
        other => Err(format!(
            "argument {} must be a date, got {}",
            index + 1,
            other.map(|v| v.type_name()).unwrap_or("nothing")
        )),
    }
}

fn array_arg(args: &[DataValue], index: usize) -> Result<Vec<DataValue>, String> {
    match args.get(index) {
        Some(DataValue::Array(items)) => Ok(items.clone()),
        Some(DataValue::Empty) | None => {
            Err(format!("argument {} must be present", index + 1))
        }
        // A scalar counts as a one-element list, like everywhere else in
        // the pipeline.
        Some(other) => Ok(vec![other.clone()]),
    }
}
