//! Server error type and its HTTP rendering.
//!
//! Engine errors carry their own numeric status codes; the server maps
//! everything into the caller-visible JSON body
//! `{"status": "error", "statusCode": N, "message": ...}`.

use arden_engine::EngineError;
use arden_spec::SpecError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::fmt;

/// Result type alias for handler operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors surfaced by the HTTP layer.
#[derive(Debug)]
pub enum ServerError {
    /// The request body is not a usable hook request.
    BadRequest(String),

    /// No such CDS service.
    NotFound(String),

    /// Document evaluation failed; carries the engine's status code.
    Engine(EngineError),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::BadRequest(msg) => write!(f, "bad request: {}", msg),
            ServerError::NotFound(msg) => write!(f, "not found: {}", msg),
            ServerError::Engine(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<EngineError> for ServerError {
    fn from(err: EngineError) -> Self {
        ServerError::Engine(err)
    }
}

impl From<SpecError> for ServerError {
    fn from(err: SpecError) -> Self {
        match err {
            SpecError::UnknownService(id) => ServerError::NotFound(format!(
                "no CDS service with id `{}` is registered on this server",
                id
            )),
            other => ServerError::Engine(other.into()),
        }
    }
}

impl ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Engine(err) => StatusCode::from_u16(err.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = serde_json::json!({
            "status": "error",
            "statusCode": status.as_u16(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}
