//! # Arden CDS-Hooks service
//!
//! The HTTP boundary around the rule engine: CDS-Hooks discovery plus
//! per-service invocation.
//!
//! ## API Endpoints
//!
//! ```text
//! GET /cds-services
//!   Returns: the discovery catalogue {"services": [...]}
//!
//! GET /_health
//!   Returns: 200 "ok"
//!
//! POST /cds-services/{service_id}
//!   Body: the hook request (hook, hookInstance, context, prefetch, ...)
//!   Returns: {"serviceId": ..., "parameters": {<parameter>: {"data": ..., "cigs": [...]}},
//!             "requiredCigs": [...]}
//!   Errors:  {"status": "error", "statusCode": N, "message": ...}
//! ```
//!
//! Every specification document stored for the service is evaluated
//! sequentially against the request body; the assembled parameter map is
//! the payload a downstream guideline-dispatch component consumes. A
//! document error fails the whole request — no partial results.

pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod server;

use arden_engine::Engine;
use arden_spec::SpecStore;
use std::sync::Arc;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SpecStore>,
    pub engine: Arc<Engine>,
}

impl AppState {
    pub fn new(store: Arc<SpecStore>, engine: Arc<Engine>) -> Self {
        AppState { store, engine }
    }
}

pub use server::create_app;
