//! HTTP client for the FHIR terminology server.
//!
//! Every request is first looked up in the injected cache under its fully
//! resolved URL. On a miss the GET is issued, the JSON body discriminated —
//! a `ValueSet` or `Parameters` resource is a success, an
//! `OperationOutcome` is a server-reported error — and successful responses
//! are cached before being returned. Cache store failures are logged and
//! never fail the action.

use super::cache::TerminologyCache;
use super::ecl::{self, EclOperator};
use super::{QueryOptions, SubsumptionOutcome, TermResult, TerminologyError, TerminologyService};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// reqwest-backed [`TerminologyService`] with response caching.
pub struct HttpTerminology {
    http: Client,
    base_url: String,
    cache: Arc<dyn TerminologyCache>,
}

impl HttpTerminology {
    /// `base_url` is normalized the way the service has always accepted it:
    /// scheme added when missing, `/fhir` appended when absent.
    pub fn new(base_url: &str, cache: Arc<dyn TerminologyCache>) -> Self {
        HttpTerminology {
            http: Client::new(),
            base_url: ecl::normalize_base_url(base_url),
            cache,
        }
    }

    /// Custom reqwest client (timeouts, auth headers).
    pub fn with_client(http: Client, base_url: &str, cache: Arc<dyn TerminologyCache>) -> Self {
        HttpTerminology {
            http,
            base_url: ecl::normalize_base_url(base_url),
            cache,
        }
    }

    /// Cached GET: cache hit short-circuits, a fetched body is cached only
    /// after `parse` accepted it.
    async fn fetch<T>(&self, url: &str, parse: fn(&Value) -> TermResult<T>) -> TermResult<T> {
        if let Some(cached) = self.cache.get(url) {
            debug!(url, "terminology cache hit");
            return parse(&cached);
        }

        debug!(url, "terminology request");
        let response = self
            .http
            .get(url)
            .header("Accept", "application/fhir+json")
            .send()
            .await
            .map_err(|e| TerminologyError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TerminologyError::Server(format!(
                "status {}: {}",
                status, body
            )));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| TerminologyError::Malformed(e.to_string()))?;

        let parsed = parse(&json)?;
        if let Err(e) = self.cache.put(url, &json) {
            warn!(url, error = %e, "failed to cache terminology response");
        }
        Ok(parsed)
    }
}

#[async_trait]
impl TerminologyService for HttpTerminology {
    async fn expand(
        &self,
        operator: EclOperator,
        code: &str,
        options: &QueryOptions,
    ) -> TermResult<Vec<String>> {
        let url = ecl::expand_url(&self.base_url, operator, code, options);
        self.fetch(&url, parse_expansion).await
    }

    async fn subsumes(
        &self,
        code_a: &str,
        code_b: &str,
        options: &QueryOptions,
    ) -> TermResult<SubsumptionOutcome> {
        let url = ecl::subsumes_url(&self.base_url, code_a, code_b, options);
        self.fetch(&url, parse_subsumption).await
    }
}

fn operation_outcome_diagnostics(json: &Value) -> String {
    json.pointer("/issue/0/diagnostics")
        .and_then(Value::as_str)
        .unwrap_or("no diagnostics provided")
        .to_string()
}

/// Extract the expansion's codes from a `ValueSet`, or surface the server's
/// error payload.
pub fn parse_expansion(json: &Value) -> TermResult<Vec<String>> {
    match json.get("resourceType").and_then(Value::as_str) {
        Some("ValueSet") => {
            let total = json
                .pointer("/expansion/total")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            if total == 0 {
                return Ok(Vec::new());
            }
            let contains = json
                .pointer("/expansion/contains")
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    TerminologyError::Malformed(
                        "ValueSet expansion reports matches but carries no contains list"
                            .to_string(),
                    )
                })?;
            contains
                .iter()
                .map(|entry| {
                    entry
                        .get("code")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .ok_or_else(|| {
                            TerminologyError::Malformed(
                                "expansion entry without a code".to_string(),
                            )
                        })
                })
                .collect()
        }
        Some("OperationOutcome") => {
            Err(TerminologyError::Server(operation_outcome_diagnostics(json)))
        }
        other => Err(TerminologyError::Malformed(format!(
            "unexpected resourceType {:?}",
            other
        ))),
    }
}

/// Extract the `outcome` parameter from a `$subsumes` `Parameters`
/// response, or surface the server's error payload.
pub fn parse_subsumption(json: &Value) -> TermResult<SubsumptionOutcome> {
    match json.get("resourceType").and_then(Value::as_str) {
        Some("Parameters") => {
            let parameters = json
                .get("parameter")
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    TerminologyError::Malformed("Parameters without parameter list".to_string())
                })?;
            let outcome = parameters
                .iter()
                .find(|p| p.get("name").and_then(Value::as_str) == Some("outcome"))
                .and_then(|p| {
                    p.get("valueCode")
                        .or_else(|| p.get("valueString"))
                        .and_then(Value::as_str)
                })
                .ok_or_else(|| {
                    TerminologyError::Malformed("no outcome parameter in response".to_string())
                })?;
            SubsumptionOutcome::from_code(outcome).ok_or_else(|| {
                TerminologyError::Malformed(format!("unknown subsumption outcome `{}`", outcome))
            })
        }
        Some("OperationOutcome") => {
            Err(TerminologyError::Server(operation_outcome_diagnostics(json)))
        }
        other => Err(TerminologyError::Malformed(format!(
            "unexpected resourceType {:?}",
            other
        ))),
    }
}
