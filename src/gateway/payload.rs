//! Request and response bodies of the HTTP surface.

use serde::{Deserialize, Serialize};

use crate::cache::Namespace;
use crate::constants::DEFAULT_RESULTS;
use crate::model::{RetrievalCandidate, SearchFilters};
use crate::pipeline::SearchRequest;

fn default_n_results() -> usize {
    DEFAULT_RESULTS
}

fn default_true() -> bool {
    true
}

/// Body of `POST /query`.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryBody {
    pub query: String,
    pub partie: Option<i64>,
    pub chapitre: Option<i64>,
    #[serde(default = "default_n_results")]
    pub n_results: usize,
    #[serde(default = "default_true")]
    pub include_sources: bool,
    #[serde(default)]
    pub stream: bool,
    #[serde(default = "default_true")]
    pub cache: bool,
}

impl QueryBody {
    /// Lowers the body into the pipeline request contract.
    pub fn into_search_request(self) -> SearchRequest {
        let mut filters = SearchFilters::new();
        if let Some(partie) = self.partie {
            filters.insert("partie", partie);
        }
        if let Some(chapitre) = self.chapitre {
            filters.insert("chapitre", chapitre);
        }

        SearchRequest {
            query: self.query,
            filters,
            k: self.n_results,
            include_sources: self.include_sources,
            cache_ok: self.cache,
        }
    }
}

/// Body of `POST /search` (retrieval only).
#[derive(Debug, Clone, Deserialize)]
pub struct SearchBody {
    pub query: String,
    pub partie: Option<i64>,
    pub chapitre: Option<i64>,
    #[serde(default = "default_n_results")]
    pub n_results: usize,
}

impl SearchBody {
    pub fn filters(&self) -> SearchFilters {
        let mut filters = SearchFilters::new();
        if let Some(partie) = self.partie {
            filters.insert("partie", partie);
        }
        if let Some(chapitre) = self.chapitre {
            filters.insert("chapitre", chapitre);
        }
        filters
    }
}

/// Response of `POST /search`.
#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub count: usize,
    pub results: Vec<RetrievalCandidate>,
}

/// Body of `POST /documents/search` (exact hierarchy lookup).
#[derive(Debug, Clone, Deserialize)]
pub struct HierarchySearchBody {
    pub acte_uniforme: Option<String>,
    pub partie: Option<i32>,
    pub chapitre: Option<i32>,
    pub section: Option<i32>,
    pub article: Option<String>,
    #[serde(default)]
    pub limit: usize,
}

/// One entry of a hierarchy lookup response.
#[derive(Debug, Serialize)]
pub struct DocumentView {
    pub id: String,
    pub title: Option<String>,
    pub document_type: Option<String>,
    pub hierarchy_display: String,
    pub citation: String,
}

/// Body of `POST /cache/clear`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClearCacheBody {
    pub namespace: Namespace,
}

/// Response of `POST /cache/clear`.
#[derive(Debug, Serialize)]
pub struct ClearCacheResponse {
    pub cleared_shared_keys: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_body_defaults() {
        let body: QueryBody =
            serde_json::from_str(r#"{"query": "Comment amortir ?"}"#).expect("parse");

        assert_eq!(body.n_results, DEFAULT_RESULTS);
        assert!(body.include_sources);
        assert!(!body.stream);
        assert!(body.cache);
    }

    #[test]
    fn test_query_body_filters() {
        let body: QueryBody = serde_json::from_str(
            r#"{"query": "q", "partie": 2, "chapitre": 5, "n_results": 3}"#,
        )
        .expect("parse");

        let request = body.into_search_request();
        assert_eq!(request.k, 3);
        assert_eq!(
            request.filters.canonical_json(),
            r#"{"chapitre":5,"partie":2}"#
        );
    }

    #[test]
    fn test_clear_cache_body() {
        let body: ClearCacheBody =
            serde_json::from_str(r#"{"namespace": "answers"}"#).expect("parse");
        assert_eq!(body.namespace, Namespace::Answers);
    }
}
