//! Terminology resolution.
//!
//! Hierarchical and subsumption operators are answered by an external
//! FHIR-style terminology server. The engine talks to it through the
//! [`TerminologyService`] trait so tests (and embedded deployments) can
//! substitute an in-process implementation; [`client::HttpTerminology`] is
//! the reqwest-backed production implementation with URL-keyed response
//! caching.
//!
//! Requests for a code cross product fan out concurrently and are joined
//! together; one failed or malformed response fails the whole action with a
//! causal error. Codes are validated to be numeric before any request is
//! issued.

pub mod cache;
pub mod client;
pub mod ecl;

use arden_spec::{ActionDetails, ActionKind};
use async_trait::async_trait;
use futures::future::try_join_all;
use thiserror::Error;

pub use cache::{CacheError, InMemoryCache, TerminologyCache};
pub use client::HttpTerminology;
pub use ecl::EclOperator;

/// Result type alias for terminology operations.
pub type TermResult<T> = Result<T, TerminologyError>;

/// Errors raised against the external concept-hierarchy service.
#[derive(Debug, Error)]
pub enum TerminologyError {
    /// The HTTP call itself failed.
    #[error("terminology request failed: {0}")]
    Network(String),

    /// The server answered with an error payload (`OperationOutcome`
    /// diagnostics or a non-success status).
    #[error("terminology server error: {0}")]
    Server(String),

    /// The response did not have a recognizable shape.
    #[error("malformed terminology response: {0}")]
    Malformed(String),

    /// A concept code that is not a number; rejected before any request.
    #[error("concept code `{0}` is not a valid number")]
    InvalidCode(String),
}

/// Outcome of a pairwise `$subsumes` check, as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubsumptionOutcome {
    Subsumes,
    SubsumedBy,
    Equivalent,
    NotSubsumed,
}

impl SubsumptionOutcome {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "subsumes" => Some(SubsumptionOutcome::Subsumes),
            "subsumed-by" => Some(SubsumptionOutcome::SubsumedBy),
            "equivalent" => Some(SubsumptionOutcome::Equivalent),
            "not-subsumed" => Some(SubsumptionOutcome::NotSubsumed),
            _ => None,
        }
    }
}

/// Query modifiers carried by the action's `details`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    pub code_system: Option<String>,
    pub version: Option<String>,
    pub filter: Option<String>,
    pub count: Option<u32>,
}

impl QueryOptions {
    pub fn from_details(details: &ActionDetails) -> Self {
        QueryOptions {
            code_system: details.code_system.clone(),
            version: details.version.clone(),
            filter: details.filter.clone(),
            count: details.count,
        }
    }
}

/// The injected boundary to the concept-hierarchy service.
#[async_trait]
pub trait TerminologyService: Send + Sync {
    /// Expand `code` through the ECL operator, returning matching concept
    /// codes (active concepts only).
    async fn expand(
        &self,
        operator: EclOperator,
        code: &str,
        options: &QueryOptions,
    ) -> TermResult<Vec<String>>;

    /// Pairwise subsumption: how does `code_a` relate to `code_b`?
    async fn subsumes(
        &self,
        code_a: &str,
        code_b: &str,
        options: &QueryOptions,
    ) -> TermResult<SubsumptionOutcome>;
}

/// How an [`ActionKind`] maps onto pairwise `$subsumes` checks.
///
/// `swap` reverses the query direction (`hasA` asks the mirror question of
/// `isA`); `include_equal` short-circuits textually equal code pairs
/// locally, without a request; `accept` decides which server outcomes count
/// as related.
#[derive(Clone, Copy)]
pub struct SubsumptionMode {
    pub swap: bool,
    pub include_equal: bool,
    pub accept: fn(SubsumptionOutcome) -> bool,
}

fn is_a_outcome(outcome: SubsumptionOutcome) -> bool {
    matches!(
        outcome,
        SubsumptionOutcome::SubsumedBy | SubsumptionOutcome::Equivalent
    )
}

fn subsumes_strict(outcome: SubsumptionOutcome) -> bool {
    outcome == SubsumptionOutcome::Subsumes
}

fn subsumes_or_eq(outcome: SubsumptionOutcome) -> bool {
    matches!(
        outcome,
        SubsumptionOutcome::Subsumes | SubsumptionOutcome::Equivalent
    )
}

impl SubsumptionMode {
    pub fn for_kind(kind: ActionKind) -> Option<Self> {
        let mode = match kind {
            ActionKind::IsA => SubsumptionMode {
                swap: false,
                include_equal: false,
                accept: is_a_outcome,
            },
            ActionKind::IsAOrEq => SubsumptionMode {
                swap: false,
                include_equal: true,
                accept: is_a_outcome,
            },
            ActionKind::HasA => SubsumptionMode {
                swap: true,
                include_equal: false,
                accept: is_a_outcome,
            },
            ActionKind::HasAOrEq => SubsumptionMode {
                swap: true,
                include_equal: true,
                accept: is_a_outcome,
            },
            ActionKind::Subsumes => SubsumptionMode {
                swap: false,
                include_equal: false,
                accept: subsumes_strict,
            },
            ActionKind::SubsumesOrEq => SubsumptionMode {
                swap: false,
                include_equal: true,
                accept: subsumes_or_eq,
            },
            ActionKind::FilterByClass => SubsumptionMode {
                swap: false,
                include_equal: true,
                accept: is_a_outcome,
            },
            _ => return None,
        };
        Some(mode)
    }
}

/// Reject non-numeric concept codes before any request goes out.
pub fn require_numeric(codes: &[String]) -> TermResult<()> {
    for code in codes {
        if code.is_empty() || !code.chars().all(|c| c.is_ascii_digit()) {
            return Err(TerminologyError::InvalidCode(code.clone()));
        }
    }
    Ok(())
}

/// Expand every code through `operator` concurrently, flattening the
/// results in input order.
pub async fn expand_all(
    service: &dyn TerminologyService,
    operator: EclOperator,
    codes: &[String],
    options: &QueryOptions,
) -> TermResult<Vec<String>> {
    require_numeric(codes)?;
    let expansions = try_join_all(
        codes
            .iter()
            .map(|code| service.expand(operator, code, options)),
    )
    .await?;
    Ok(expansions.into_iter().flatten().collect())
}

/// Resolve the full `codes_a × codes_b` relation under `mode`, issuing all
/// required requests concurrently. `matrix[i][j]` answers whether
/// `codes_a[i]` relates to `codes_b[j]`.
pub async fn relation_matrix(
    service: &dyn TerminologyService,
    codes_a: &[String],
    codes_b: &[String],
    options: &QueryOptions,
    mode: SubsumptionMode,
) -> TermResult<Vec<Vec<bool>>> {
    require_numeric(codes_a)?;
    require_numeric(codes_b)?;

    let rows = codes_a.iter().map(|a| async move {
        try_join_all(codes_b.iter().map(|b| async move {
            if mode.include_equal && a == b {
                return Ok(true);
            }
            let (x, y) = if mode.swap { (b, a) } else { (a, b) };
            Ok((mode.accept)(service.subsumes(x, y, options).await?))
        }))
        .await
    });
    try_join_all(rows).await
}
