//! Response models for the CDS-Hooks endpoints.

use arden_spec::CdsService;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Body of `GET /cds-services`.
#[derive(Debug, Serialize)]
pub struct DiscoveryResponse {
    pub services: Vec<CdsService>,
}

/// One evaluated parameter: its outcome data and the guidelines it feeds.
#[derive(Debug, Serialize)]
pub struct ParameterResult {
    pub data: Value,
    pub cigs: Vec<String>,
}

/// Body of `POST /cds-services/{service_id}`: the assembled payload handed
/// to the guideline-dispatch collaborator.
#[derive(Debug, Serialize)]
pub struct InvokeResponse {
    #[serde(rename = "serviceId")]
    pub service_id: String,

    /// Parameter name → evaluated result, in stable (sorted) order.
    pub parameters: BTreeMap<String, ParameterResult>,

    /// Distinct guideline identifiers involved across all parameters.
    #[serde(rename = "requiredCigs")]
    pub required_cigs: Vec<String>,
}
