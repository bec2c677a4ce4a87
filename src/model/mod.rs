//! Core data model shared across the retrieval pipeline.
//!
//! - [`RetrievalCandidate`] is the transient per-query unit flowing through
//!   lexical search, vector search, merging, reranking and enrichment.
//! - [`ScoredAnswer`] is the terminal response shape, emitted once per
//!   request (or incrementally assembled for streaming).
//! - [`SearchFilters`] is a sorted key/value filter set with exact-match
//!   AND semantics; its canonical JSON form feeds cache-key derivation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Flat metadata dictionary attached to passages and chunks.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Suffix separating a passage id from its chunk index.
pub const CHUNK_SEPARATOR: &str = "_chunk_";

/// Returns the parent passage id of a chunk id.
///
/// Chunk ids are `<passage_id>_chunk_<index>`; a plain passage id is
/// returned unchanged.
pub fn passage_id_of(chunk_id: &str) -> &str {
    match chunk_id.find(CHUNK_SEPARATOR) {
        Some(pos) => &chunk_id[..pos],
        None => chunk_id,
    }
}

/// A single filter value: hierarchy levels are integers, names are strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Int(i64),
    Text(String),
}

impl FilterValue {
    fn matches(&self, value: &serde_json::Value) -> bool {
        match self {
            FilterValue::Int(n) => value.as_i64() == Some(*n),
            FilterValue::Text(s) => value.as_str() == Some(s.as_str()),
        }
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        FilterValue::Int(v)
    }
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        FilterValue::Text(v.to_string())
    }
}

/// Exact-match metadata filters with AND semantics across keys.
///
/// Backed by an ordered map, so iteration and serialization are always in
/// sorted key order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters(BTreeMap<String, FilterValue>);

impl SearchFilters {
    /// Creates an empty filter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a filter, replacing any previous value for the key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FilterValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Returns `true` if no filters are set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the filter value for a key.
    pub fn get(&self, key: &str) -> Option<&FilterValue> {
        self.0.get(key)
    }

    /// Iterates filters in sorted key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FilterValue)> {
        self.0.iter()
    }

    /// Returns `true` if the metadata satisfies every filter.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.0.iter().all(|(key, expected)| {
            metadata
                .get(key)
                .is_some_and(|value| expected.matches(value))
        })
    }

    /// Canonical JSON rendering in sorted key order, used for cache keys.
    pub fn canonical_json(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_default()
    }
}

/// Which index produced a candidate before merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateOrigin {
    Lexical,
    Vector,
    Merged,
}

/// A scored retrieval hit, created per query and discarded after response
/// assembly.
///
/// The three sub-scores are normalized to `[0, 1]` within the current query
/// batch. A candidate seen by only one index keeps `0.0` for the absent
/// score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalCandidate {
    pub document_id: String,
    pub text: String,
    pub metadata: Metadata,
    pub lexical_score: f32,
    pub vector_score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cross_score: Option<f32>,
    pub combined_score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_score: Option<f32>,
    pub relevance_score: f32,
    pub origin: CandidateOrigin,
}

impl RetrievalCandidate {
    /// Creates a candidate from a lexical search hit.
    pub fn from_lexical(
        document_id: String,
        text: String,
        metadata: Metadata,
        lexical_score: f32,
    ) -> Self {
        Self {
            document_id,
            text,
            metadata,
            lexical_score,
            vector_score: 0.0,
            cross_score: None,
            combined_score: lexical_score * crate::constants::MERGE_LEXICAL_WEIGHT,
            final_score: None,
            relevance_score: 0.0,
            origin: CandidateOrigin::Lexical,
        }
    }

    /// Creates a candidate from a vector search hit.
    pub fn from_vector(
        document_id: String,
        text: String,
        metadata: Metadata,
        vector_score: f32,
    ) -> Self {
        Self {
            document_id,
            text,
            metadata,
            lexical_score: 0.0,
            vector_score,
            cross_score: None,
            combined_score: vector_score * crate::constants::MERGE_VECTOR_WEIGHT,
            final_score: None,
            relevance_score: 0.0,
            origin: CandidateOrigin::Vector,
        }
    }

    /// The score exposed to callers: the reranked score when present,
    /// the merged score otherwise.
    pub fn effective_score(&self) -> f32 {
        self.final_score.unwrap_or(self.combined_score)
    }
}

/// Projection of a candidate included alongside an answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceView {
    pub document_id: String,
    pub metadata: Metadata,
    pub relevance_score: f32,
    pub preview: String,
}

/// Per-phase timing breakdown, populated even on degraded paths.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Performance {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent_time_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reformulation_time_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_time_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_time_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_time_seconds: Option<f64>,
    pub total_time_seconds: f64,
}

/// Terminal response for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredAnswer {
    pub id: Uuid,
    pub query: String,
    pub answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<SourceView>>,
    pub performance: Performance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    pub timestamp: f64,
}

impl ScoredAnswer {
    /// Creates an answer shell for a query, stamped with a fresh id.
    pub fn new(query: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            query: query.to_string(),
            answer: String::new(),
            sources: None,
            performance: Performance::default(),
            intent: None,
            timestamp: chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
        }
    }
}
