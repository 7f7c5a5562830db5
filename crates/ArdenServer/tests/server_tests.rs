//! Route-level tests over the full app, with a stubbed terminology
//! service.

use arden_engine::Engine;
use arden_engine::terminology::{
    EclOperator, QueryOptions, SubsumptionOutcome, TermResult, TerminologyService,
};
use arden_server::{AppState, create_app};
use arden_spec::{CdsService, SpecStore, SpecificationDocument};
use async_trait::async_trait;
use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;

struct StubTerminology;

#[async_trait]
impl TerminologyService for StubTerminology {
    async fn expand(
        &self,
        _operator: EclOperator,
        code: &str,
        _options: &QueryOptions,
    ) -> TermResult<Vec<String>> {
        Ok(vec![code.to_string()])
    }

    async fn subsumes(
        &self,
        _code_a: &str,
        _code_b: &str,
        _options: &QueryOptions,
    ) -> TermResult<SubsumptionOutcome> {
        Ok(SubsumptionOutcome::Equivalent)
    }
}

fn test_server() -> TestServer {
    let services = vec![CdsService {
        id: "copd-assess".to_string(),
        hook: "patient-view".to_string(),
        title: "COPD assessment".to_string(),
        description: "Assign the assessed COPD group".to_string(),
        prefetch: None,
    }];

    let documents: Vec<SpecificationDocument> = serde_json::from_value(json!([
        {
            "parameter": "patient-age",
            "cigInvolved": ["copd-cig"],
            "pathList": [
                {"label": "age", "path": "$.context.age", "typeOf": "number"}
            ],
            "actionList": [
                {"action": "comparison", "details": {"arg1": "age", "arg2": 40, "symbol": "gte"}}
            ]
        },
        {
            "parameter": "copd-group",
            "cigInvolved": ["copd-cig"],
            "pathList": [
                {"label": "severity", "path": "$.context.severity", "typeOf": "string", "isMandatory": false}
            ],
            "actionList": [
                {"action": "Qomparison", "details": {"arg1": "severity", "arg2": "severity", "symbol": "eq"}}
            ],
            "constraintList": [
                {"queryArgs": {"severity": "high"}, "outcome": ["group-d"]},
                {"queryArgs": {"severity": "low"}, "outcome": ["group-a"]}
            ]
        }
    ]))
    .unwrap();

    let mut by_service = HashMap::new();
    by_service.insert("copd-assess".to_string(), documents);
    let store = SpecStore::from_parts(services, by_service).unwrap();

    let engine = Engine::new(Arc::new(StubTerminology));
    let state = AppState::new(Arc::new(store), Arc::new(engine));
    TestServer::new(create_app(state)).unwrap()
}

#[tokio::test]
async fn discovery_lists_services() {
    let server = test_server();
    let response = server.get("/cds-services").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["services"][0]["id"], json!("copd-assess"));
    assert_eq!(body["services"][0]["hook"], json!("patient-view"));
}

#[tokio::test]
async fn health_route_answers() {
    let server = test_server();
    let response = server.get("/_health").await;
    response.assert_status_ok();
    assert_eq!(response.text(), "ok");
}

#[tokio::test]
async fn invoke_assembles_the_parameter_map() {
    let server = test_server();
    let response = server
        .post("/cds-services/copd-assess")
        .json(&json!({
            "hook": "patient-view",
            "hookInstance": "e2e-1",
            "context": {"age": 63, "severity": "high"}
        }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["serviceId"], json!("copd-assess"));
    assert_eq!(body["parameters"]["patient-age"]["data"], json!(true));
    assert_eq!(
        body["parameters"]["copd-group"]["data"],
        json!(["group-d"])
    );
    assert_eq!(body["requiredCigs"], json!(["copd-cig"]));
}

#[tokio::test]
async fn unknown_service_is_not_found() {
    let server = test_server();
    let response = server
        .post("/cds-services/nope")
        .json(&json!({"hook": "patient-view", "context": {}}))
        .await;
    response.assert_status_not_found();
    let body: Value = response.json();
    assert_eq!(body["status"], json!("error"));
    assert_eq!(body["statusCode"], json!(404));
}

#[tokio::test]
async fn missing_hook_field_is_a_bad_request() {
    let server = test_server();
    let response = server
        .post("/cds-services/copd-assess")
        .json(&json!({"context": {}}))
        .await;
    response.assert_status_bad_request();
}

#[tokio::test]
async fn document_error_fails_the_whole_request() {
    let server = test_server();
    // `age` is mandatory and absent: the engine reports a data error and
    // the response carries its status code.
    let response = server
        .post("/cds-services/copd-assess")
        .json(&json!({"hook": "patient-view", "context": {"severity": "low"}}))
        .await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json();
    assert_eq!(body["status"], json!("error"));
    assert_eq!(body["statusCode"], json!(422));
}
