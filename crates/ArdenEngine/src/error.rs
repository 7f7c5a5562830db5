//! Error types for document evaluation.
//!
//! The taxonomy follows the three failure domains of the service:
//! *specification errors* (malformed stored documents — always a
//! configuration problem), *data errors* (the hook context lacks a
//! mandatory value or carries one that cannot be coerced), and
//! *external-service errors* (the terminology server failed or answered
//! with an error payload). Every variant maps to a numeric status code via
//! [`EngineError::status_code`]; the calling layer turns that into the HTTP
//! response.

use crate::terminology::TerminologyError;
use arden_spec::SpecError;
use thiserror::Error;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised while evaluating one specification document.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The document asked for something it is not allowed to ask for.
    /// Always names the offending parameter.
    #[error("specification error in parameter `{parameter}`: {message}")]
    Specification { parameter: String, message: String },

    /// A mandatory data point resolved to nothing, neither through its
    /// path nor through its default.
    #[error(
        "in parameter `{parameter}`, data object `{label}` is required yet its value could not \
         be extracted from the request and no default value is specified"
    )]
    MissingData { parameter: String, label: String },

    /// An extracted value refused the declared type.
    #[error("in parameter `{parameter}`, value for `{label}` could not be typed: {message}")]
    Coercion {
        parameter: String,
        label: String,
        message: String,
    },

    /// A path expression failed to parse.
    #[error("path expression error: {0}")]
    Path(String),

    /// A user-defined function was missing or rejected its arguments.
    #[error("user function `{name}`: {message}")]
    Function { name: String, message: String },

    /// The terminology service failed; wrapped, never retried.
    #[error(transparent)]
    Terminology(#[from] TerminologyError),
}

impl EngineError {
    pub(crate) fn spec(parameter: &str, message: impl Into<String>) -> Self {
        EngineError::Specification {
            parameter: parameter.to_string(),
            message: message.into(),
        }
    }

    /// Numeric status code surfaced to the caller.
    pub fn status_code(&self) -> u16 {
        match self {
            EngineError::Specification { .. } => 500,
            EngineError::MissingData { .. } => 422,
            EngineError::Coercion { .. } => 422,
            EngineError::Path(_) => 500,
            EngineError::Function { .. } => 500,
            // A non-numeric code is a malformed document, not a failure of
            // the terminology service.
            EngineError::Terminology(TerminologyError::InvalidCode(_)) => 500,
            EngineError::Terminology(_) => 502,
        }
    }
}

impl From<SpecError> for EngineError {
    fn from(err: SpecError) -> Self {
        match err {
            SpecError::InvalidDocument { parameter, message } => {
                EngineError::Specification { parameter, message }
            }
            other => EngineError::Specification {
                parameter: "<store>".to_string(),
                message: other.to_string(),
            },
        }
    }
}
