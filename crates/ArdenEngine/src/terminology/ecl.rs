//! Request grammar for the FHIR terminology endpoints.
//!
//! Two request shapes exist: `CodeSystem/$subsumes` for pairwise relations
//! and `ValueSet/$expand` with an Expression Constraint Language prefix
//! operator for hierarchy expansion. Both are restricted to active
//! concepts. The fully resolved URL doubles as the cache key.

use super::QueryOptions;
use arden_spec::ActionKind;

/// SNOMED CT system URI, the default concept scheme.
pub const SNOMED_URI: &str = "http://snomed.info/sct";

/// Restrict results to active concepts.
const ACTIVE_CODES_PARAMS: &str = "&activeFilter=true&termActive=true";

/// ECL prefix operators for hierarchy expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EclOperator {
    ParentOf,
    ParentOrSelfOf,
    ChildOf,
    ChildOrSelfOf,
    AncestorOf,
    AncestorOrSelfOf,
    DescendantOf,
    DescendantOrSelfOf,
}

impl EclOperator {
    /// The operator for a hierarchy action kind.
    pub fn from_kind(kind: ActionKind) -> Option<Self> {
        match kind {
            ActionKind::ParentOf => Some(EclOperator::ParentOf),
            ActionKind::ParentOrSelfOf => Some(EclOperator::ParentOrSelfOf),
            ActionKind::ChildOf => Some(EclOperator::ChildOf),
            ActionKind::ChildOrSelfOf => Some(EclOperator::ChildOrSelfOf),
            ActionKind::AncestorOf => Some(EclOperator::AncestorOf),
            ActionKind::AncestorOrSelfOf => Some(EclOperator::AncestorOrSelfOf),
            ActionKind::DescendantOf => Some(EclOperator::DescendantOf),
            ActionKind::DescendantOrSelfOf => Some(EclOperator::DescendantOrSelfOf),
            _ => None,
        }
    }

    /// The ECL prefix symbol.
    pub fn symbol(self) -> &'static str {
        match self {
            EclOperator::ParentOf => ">!",
            EclOperator::ParentOrSelfOf => ">>!",
            EclOperator::ChildOf => "<!",
            EclOperator::ChildOrSelfOf => "<<!",
            EclOperator::AncestorOf => ">",
            EclOperator::AncestorOrSelfOf => ">>",
            EclOperator::DescendantOf => "<",
            EclOperator::DescendantOrSelfOf => "<<",
        }
    }
}

/// Normalize a configured base URL: add a scheme when missing and the
/// `/fhir` root when absent, trim any trailing slash.
pub fn normalize_base_url(raw: &str) -> String {
    let mut base = raw.trim().trim_end_matches('/').to_string();
    if !base.starts_with("http://") && !base.starts_with("https://") {
        base = format!("https://{}", base);
    }
    if !base.ends_with("/fhir") {
        base.push_str("/fhir");
    }
    base
}

/// `system-version` / `version` rendering shared by both request shapes:
/// `http://snomed.info/sct/<codeSystem>[/version/<version>]`.
fn versioned_system(options: &QueryOptions) -> Option<String> {
    let code_system = options.code_system.as_deref()?;
    let mut rendered = format!("{}/{}", SNOMED_URI, code_system);
    if let Some(version) = options.version.as_deref() {
        rendered.push_str("/version/");
        rendered.push_str(version);
    }
    Some(rendered)
}

/// Build the `ValueSet/$expand` URL for one ECL expansion.
pub fn expand_url(base: &str, operator: EclOperator, code: &str, options: &QueryOptions) -> String {
    let mut url = format!(
        "{}/ValueSet/$expand?url={}?fhir_vs=ecl/{}{}",
        base,
        SNOMED_URI,
        operator.symbol(),
        code
    );
    if let Some(count) = options.count {
        url.push_str(&format!("&count={}", count));
    }
    if let Some(system) = versioned_system(options) {
        url.push_str(&format!("&system-version={}", system));
    }
    if let Some(filter) = options.filter.as_deref() {
        url.push_str(&format!("&filter={}", filter));
    }
    url.push_str(ACTIVE_CODES_PARAMS);
    url
}

/// Build the `CodeSystem/$subsumes` URL for one pairwise check.
pub fn subsumes_url(base: &str, code_a: &str, code_b: &str, options: &QueryOptions) -> String {
    let mut url = format!(
        "{}/CodeSystem/$subsumes?system={}&codeA={}&codeB={}",
        base, SNOMED_URI, code_a, code_b
    );
    url.push_str(ACTIVE_CODES_PARAMS);
    if let Some(system) = versioned_system(options) {
        url.push_str(&format!("&version={}", system));
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_normalization() {
        assert_eq!(
            normalize_base_url("snowstorm.example.org"),
            "https://snowstorm.example.org/fhir"
        );
        assert_eq!(
            normalize_base_url("http://localhost:8080/fhir/"),
            "http://localhost:8080/fhir"
        );
    }

    #[test]
    fn expand_url_shape() {
        let url = expand_url(
            "https://tx.example.org/fhir",
            EclOperator::ParentOf,
            "73211009",
            &QueryOptions::default(),
        );
        assert_eq!(
            url,
            "https://tx.example.org/fhir/ValueSet/$expand?url=http://snomed.info/sct?fhir_vs=ecl/>!73211009&activeFilter=true&termActive=true"
        );
    }

    #[test]
    fn expand_url_with_options() {
        let url = expand_url(
            "https://tx.example.org/fhir",
            EclOperator::DescendantOrSelfOf,
            "73211009",
            &QueryOptions {
                code_system: Some("900000000000207008".to_string()),
                version: Some("20240131".to_string()),
                filter: Some("diabetes".to_string()),
                count: Some(50),
            },
        );
        assert!(url.contains("ecl/<<73211009"));
        assert!(url.contains("&count=50"));
        assert!(url.contains(
            "&system-version=http://snomed.info/sct/900000000000207008/version/20240131"
        ));
        assert!(url.contains("&filter=diabetes"));
        assert!(url.ends_with("&activeFilter=true&termActive=true"));
    }

    #[test]
    fn subsumes_url_shape() {
        let url = subsumes_url(
            "https://tx.example.org/fhir",
            "44054006",
            "73211009",
            &QueryOptions::default(),
        );
        assert_eq!(
            url,
            "https://tx.example.org/fhir/CodeSystem/$subsumes?system=http://snomed.info/sct&codeA=44054006&codeB=73211009&activeFilter=true&termActive=true"
        );
    }

    #[test]
    fn operator_symbols() {
        assert_eq!(EclOperator::AncestorOrSelfOf.symbol(), ">>");
        assert_eq!(EclOperator::ChildOf.symbol(), "<!");
        assert_eq!(
            EclOperator::from_kind(ActionKind::DescendantOf),
            Some(EclOperator::DescendantOf)
        );
        assert_eq!(EclOperator::from_kind(ActionKind::IsA), None);
    }
}
