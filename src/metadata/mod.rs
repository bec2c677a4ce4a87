//! Metadata enrichment against the authoritative relational store.
//!
//! Retrieval hits carry the flat metadata snapshot the vector index stores;
//! the enricher joins them against the canonical records and attaches
//! display-ready collection/hierarchy paths and a citation string. One
//! batched `id = ANY(...)` query per call; a failed lookup leaves
//! candidates untouched, never dropped.

mod error;
mod model;
mod store;

pub use error::MetadataError;
pub use model::DocumentRecord;
#[cfg(any(test, feature = "mock"))]
pub use store::MockMetadataStore;
pub use store::{HierarchyQuery, MetadataStore, PostgresMetadataStore};

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::model::{RetrievalCandidate, passage_id_of};

/// Best-effort candidate enrichment.
pub struct MetadataEnricher {
    store: Option<Arc<dyn MetadataStore>>,
}

impl MetadataEnricher {
    /// Creates an enricher over a store.
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store: Some(store) }
    }

    /// An enricher that passes candidates through unchanged.
    pub fn disabled() -> Self {
        Self { store: None }
    }

    /// Returns `true` when a store is configured.
    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Enriches candidates in place. Candidates whose ids have no canonical
    /// record (or do not parse as passage UUIDs) are left as-is.
    #[instrument(skip(self, candidates), fields(candidates = candidates.len()))]
    pub async fn enrich(&self, candidates: &mut [RetrievalCandidate]) {
        let Some(store) = &self.store else {
            return;
        };
        if candidates.is_empty() {
            return;
        }

        let mut ids: Vec<Uuid> = candidates
            .iter()
            .filter_map(|c| Uuid::parse_str(passage_id_of(&c.document_id)).ok())
            .collect();
        ids.sort_unstable();
        ids.dedup();

        if ids.is_empty() {
            debug!("no candidate ids parse as passage UUIDs, skipping enrichment");
            return;
        }

        let records = match store.fetch_by_ids(&ids).await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "metadata enrichment failed, returning candidates unchanged");
                return;
            }
        };

        let by_id: HashMap<Uuid, &DocumentRecord> =
            records.iter().map(|record| (record.id, record)).collect();

        let mut enriched = 0usize;
        for candidate in candidates.iter_mut() {
            let Ok(passage_id) = Uuid::parse_str(passage_id_of(&candidate.document_id)) else {
                continue;
            };
            let Some(record) = by_id.get(&passage_id) else {
                continue;
            };

            apply_record(candidate, record);
            enriched += 1;
        }

        debug!(enriched, "metadata enrichment complete");
    }
}

impl std::fmt::Debug for MetadataEnricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataEnricher")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

fn apply_record(candidate: &mut RetrievalCandidate, record: &DocumentRecord) {
    let metadata = &mut candidate.metadata;

    let mut set = |key: &str, value: serde_json::Value| {
        if !value.is_null() {
            metadata.insert(key.to_string(), value);
        }
    };

    set("document_id", serde_json::json!(record.id.to_string()));
    set("title", serde_json::json!(record.title));
    set("document_type", serde_json::json!(record.document_type));
    set("collection", serde_json::json!(record.collection));
    set("sub_collection", serde_json::json!(record.sub_collection));
    set("acte_uniforme", serde_json::json!(record.acte_uniforme));
    set("livre", serde_json::json!(record.livre));
    set("titre", serde_json::json!(record.titre));
    set("partie", serde_json::json!(record.partie));
    set("chapitre", serde_json::json!(record.chapitre));
    set("section", serde_json::json!(record.section));
    set("sous_section", serde_json::json!(record.sous_section));
    set("article", serde_json::json!(record.article));
    set("alinea", serde_json::json!(record.alinea));
    set("tags", serde_json::json!(record.tags));
    set("status", serde_json::json!(record.status));
    set("version", serde_json::json!(record.version));
    set(
        "date_publication",
        serde_json::json!(record.date_publication.map(|d| d.to_string())),
    );
    set(
        "date_revision",
        serde_json::json!(record.date_revision.map(|d| d.to_string())),
    );

    set(
        "collection_display",
        serde_json::json!(record.collection_display()),
    );
    set(
        "hierarchy_display",
        serde_json::json!(record.hierarchy_display()),
    );
    set(
        "full_hierarchy_display",
        serde_json::json!(record.full_hierarchy_display()),
    );
    set("citation", serde_json::json!(record.citation()));
}
