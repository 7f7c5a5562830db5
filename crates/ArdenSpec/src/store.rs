//! In-process specification store.
//!
//! The store is a directory of JSON files loaded once at startup:
//!
//! ```text
//! specs/
//!   services.json        catalogue of CdsService descriptors (discovery)
//!   copd-assess.json     document array for service id "copd-assess"
//!   careplan-select.json document array for service id "careplan-select"
//! ```
//!
//! Each non-catalogue file holds the ordered `SpecificationDocument` array
//! for the service named by the file stem. Every document is validated at
//! load; a malformed document fails startup rather than the first request
//! that happens to hit it.

use crate::{CdsService, SpecError, SpecResult, SpecificationDocument};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const SERVICES_FILE: &str = "services.json";

/// Loaded specification documents, keyed by CDS service id.
#[derive(Debug, Default)]
pub struct SpecStore {
    services: Vec<CdsService>,
    documents: HashMap<String, Vec<SpecificationDocument>>,
}

impl SpecStore {
    /// Load every `*.json` file under `dir`.
    pub fn load_dir(dir: &Path) -> SpecResult<Self> {
        let mut store = SpecStore::default();

        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            let raw = fs::read_to_string(&path)?;

            if file_name == SERVICES_FILE {
                store.services =
                    serde_json::from_str(&raw).map_err(|source| SpecError::Parse {
                        file: file_name.clone(),
                        source,
                    })?;
                continue;
            }

            let documents: Vec<SpecificationDocument> =
                serde_json::from_str(&raw).map_err(|source| SpecError::Parse {
                    file: file_name.clone(),
                    source,
                })?;
            for document in &documents {
                document.validate()?;
            }

            let service_id = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            store.documents.insert(service_id, documents);
        }

        Ok(store)
    }

    /// Build a store from already-parsed parts. Documents are validated the
    /// same way [`SpecStore::load_dir`] validates them.
    pub fn from_parts(
        services: Vec<CdsService>,
        documents: HashMap<String, Vec<SpecificationDocument>>,
    ) -> SpecResult<Self> {
        for docs in documents.values() {
            for document in docs {
                document.validate()?;
            }
        }
        Ok(SpecStore {
            services,
            documents,
        })
    }

    /// The discovery catalogue.
    pub fn services(&self) -> &[CdsService] {
        &self.services
    }

    /// All documents for a service, in stored order.
    pub fn documents_for(&self, service_id: &str) -> SpecResult<&[SpecificationDocument]> {
        self.documents
            .get(service_id)
            .map(Vec::as_slice)
            .ok_or_else(|| SpecError::UnknownService(service_id.to_string()))
    }
}
