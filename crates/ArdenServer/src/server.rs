//! Router construction.

use crate::AppState;
use crate::handlers;
use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the application router over shared state.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/cds-services", get(handlers::discovery))
        .route("/cds-services/{service_id}", post(handlers::invoke))
        .route("/_health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
