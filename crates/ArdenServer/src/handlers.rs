//! Request handlers for the CDS-Hooks endpoints.

use crate::AppState;
use crate::error::{ServerError, ServerResult};
use crate::models::{DiscoveryResponse, InvokeResponse, ParameterResult};
use axum::Json;
use axum::extract::{Path, State};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::info;

/// `GET /_health` — liveness probe.
pub async fn health() -> &'static str {
    "ok"
}

/// `GET /cds-services` — the discovery catalogue.
pub async fn discovery(State(state): State<AppState>) -> Json<DiscoveryResponse> {
    Json(DiscoveryResponse {
        services: state.store.services().to_vec(),
    })
}

/// `POST /cds-services/{service_id}` — evaluate every specification
/// document stored for the service against the hook request body.
///
/// Documents run sequentially in stored order. Any document error aborts
/// the request; no partial parameter map is returned.
pub async fn invoke(
    State(state): State<AppState>,
    Path(service_id): Path<String>,
    Json(body): Json<Value>,
) -> ServerResult<Json<InvokeResponse>> {
    validate_hook_request(&body)?;
    let documents = state.store.documents_for(&service_id)?;
    info!(%service_id, documents = documents.len(), "invoking CDS service");

    let mut parameters = BTreeMap::new();
    let mut required_cigs: Vec<String> = Vec::new();

    for document in documents {
        let outcome = state.engine.evaluate(document, &body).await?;
        for cig in &document.cig_involved {
            if !required_cigs.contains(cig) {
                required_cigs.push(cig.clone());
            }
        }
        parameters.insert(
            document.parameter.clone(),
            ParameterResult {
                data: outcome.unwrap_or(Value::Null),
                cigs: document.cig_involved.clone(),
            },
        );
    }

    Ok(Json(InvokeResponse {
        service_id,
        parameters,
        required_cigs,
    }))
}

/// A hook request must at least be an object naming its hook.
fn validate_hook_request(body: &Value) -> ServerResult<()> {
    let hook = body.get("hook").and_then(Value::as_str).unwrap_or_default();
    if hook.is_empty() {
        return Err(ServerError::BadRequest(
            "request body must be a CDS hook request with a non-empty `hook` field".to_string(),
        ));
    }
    Ok(())
}
