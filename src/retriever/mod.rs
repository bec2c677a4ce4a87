//! Hybrid retrieval: parallel lexical + vector fan-out, merge, boost,
//! rerank, enrich.
//!
//! Sub-search failures are logged and contribute zero candidates; the
//! query succeeds as long as one sub-search returns results, and an empty
//! result list signals the pipeline to fall back to LLM-only answering.
//! Given identical index and cache state the result ordering is
//! deterministic: merging keeps per-score maxima and every sort breaks
//! ties on document id.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tracing::{debug, info, instrument, warn};

use crate::cache::TieredCache;
use crate::config::{BoostRule, RetrieverConfig};
use crate::constants::{MERGE_LEXICAL_WEIGHT, MERGE_VECTOR_WEIGHT};
use crate::embedding::EmbeddingProvider;
use crate::lexical::LexicalIndex;
use crate::metadata::MetadataEnricher;
use crate::model::{CandidateOrigin, FilterValue, RetrievalCandidate, SearchFilters};
use crate::rerank::Reranker;
use crate::vectordb::{VectorDocumentProvider, VectorIndexClient, response_to_candidates};

/// Filter key selecting an explicit corpus.
pub const COLLECTION_FILTER_KEY: &str = "collection";

/// Hybrid retrieval orchestrator.
pub struct HybridRetriever {
    lexical: Arc<LexicalIndex>,
    vector: Arc<dyn VectorIndexClient>,
    embeddings: Arc<EmbeddingProvider>,
    cache: Arc<TieredCache>,
    reranker: Arc<Reranker>,
    enricher: Arc<MetadataEnricher>,
    config: RetrieverConfig,
    embedding_ttl: Duration,
}

impl HybridRetriever {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        lexical: Arc<LexicalIndex>,
        vector: Arc<dyn VectorIndexClient>,
        embeddings: Arc<EmbeddingProvider>,
        cache: Arc<TieredCache>,
        reranker: Arc<Reranker>,
        enricher: Arc<MetadataEnricher>,
        config: RetrieverConfig,
        embedding_ttl: Duration,
    ) -> Self {
        Self {
            lexical,
            vector,
            embeddings,
            cache,
            reranker,
            enricher,
            config,
            embedding_ttl,
        }
    }

    /// Splits the corpus selection out of the metadata filters.
    fn target_corpora(&self, filters: &SearchFilters) -> (Vec<String>, SearchFilters) {
        let mut effective = SearchFilters::new();
        let mut corpora = vec![self.config.default_corpus.clone()];

        for (key, value) in filters.iter() {
            if key == COLLECTION_FILTER_KEY {
                if let FilterValue::Text(name) = value {
                    corpora = vec![name.clone()];
                }
            } else {
                effective.insert(key.clone(), value.clone());
            }
        }

        (corpora, effective)
    }

    /// Resolves the query embedding through the cache cascade.
    async fn query_embedding(&self, query: &str) -> Vec<f32> {
        if let Some((vector, _tier)) = self.cache.get_embedding(query).await {
            return vector;
        }

        let vector = self.embeddings.embed(query).await;
        self.cache
            .put_embedding(query, &vector, self.embedding_ttl)
            .await;
        vector
    }

    /// Full hybrid search over the target corpora.
    #[instrument(skip(self, query, filters), fields(query_len = query.len(), k))]
    pub async fn search_hybrid(
        &self,
        query: &str,
        filters: &SearchFilters,
        k: usize,
        rerank: bool,
    ) -> Vec<RetrievalCandidate> {
        let (corpora, filters) = self.target_corpora(filters);
        let provider = VectorDocumentProvider::new(Arc::clone(&self.vector));

        // Query embedding and lexical searches run concurrently; vector
        // searches start once the embedding resolves.
        let lexical_searches = join_all(corpora.iter().map(|corpus| {
            let filters = &filters;
            let provider = &provider;
            async move {
                self.lexical
                    .search(corpus, query, filters, k, provider)
                    .await
            }
        }));

        let (embedding, lexical_results) =
            tokio::join!(self.query_embedding(query), lexical_searches);

        let vector_results = join_all(corpora.iter().map(|corpus| {
            let embedding = &embedding;
            let filters = &filters;
            async move {
                self.vector
                    .query(corpus, embedding, filters, 2 * k)
                    .await
            }
        }))
        .await;

        let mut all_candidates: Vec<RetrievalCandidate> = Vec::new();

        for (corpus, result) in corpora.iter().zip(lexical_results) {
            match result {
                Ok(candidates) => all_candidates.extend(candidates),
                Err(e) => warn!(corpus, error = %e, "lexical search failed"),
            }
        }

        for (corpus, result) in corpora.iter().zip(vector_results) {
            match result {
                Ok(response) => all_candidates.extend(response_to_candidates(response)),
                Err(e) => warn!(corpus, error = %e, "vector search failed"),
            }
        }

        if all_candidates.is_empty() {
            info!("no candidates from any sub-search");
            return Vec::new();
        }

        let mut candidates = merge_candidates(all_candidates);
        apply_boosts(query, &mut candidates, &self.config.boost_rules);
        sort_candidates(&mut candidates);

        if rerank && !candidates.is_empty() {
            let limit = (2 * k).min(candidates.len());
            candidates.truncate(limit);
            candidates = self.reranker.rerank(query, candidates, None).await;
        }

        candidates.truncate(k);
        for candidate in &mut candidates {
            candidate.relevance_score = candidate.effective_score();
        }

        self.enricher.enrich(&mut candidates).await;

        debug!(results = candidates.len(), "hybrid search complete");
        candidates
    }
}

impl std::fmt::Debug for HybridRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridRetriever")
            .field("default_corpus", &self.config.default_corpus)
            .finish()
    }
}

/// Deduplicates candidates by document id, keeping the MAX of each
/// sub-score and recomputing the merged combined score.
pub fn merge_candidates(candidates: Vec<RetrievalCandidate>) -> Vec<RetrievalCandidate> {
    let mut merged: Vec<RetrievalCandidate> = Vec::with_capacity(candidates.len());
    let mut index_by_id: std::collections::HashMap<String, usize> = std::collections::HashMap::new();

    for candidate in candidates {
        match index_by_id.get(&candidate.document_id) {
            Some(&slot) => {
                let existing = &mut merged[slot];
                existing.lexical_score = existing.lexical_score.max(candidate.lexical_score);
                existing.vector_score = existing.vector_score.max(candidate.vector_score);
                existing.origin = CandidateOrigin::Merged;
                if existing.metadata.is_empty() && !candidate.metadata.is_empty() {
                    existing.metadata = candidate.metadata;
                }
            }
            None => {
                index_by_id.insert(candidate.document_id.clone(), merged.len());
                merged.push(candidate);
            }
        }
    }

    for candidate in &mut merged {
        candidate.combined_score = candidate.lexical_score * MERGE_LEXICAL_WEIGHT
            + candidate.vector_score * MERGE_VECTOR_WEIGHT;
    }

    merged
}

/// Applies configured score boosts, clamping back into `[0, 1]`.
pub fn apply_boosts(query: &str, candidates: &mut [RetrievalCandidate], rules: &[BoostRule]) {
    let query_lower = query.to_lowercase();

    for rule in rules {
        if !rule
            .keywords
            .iter()
            .any(|keyword| query_lower.contains(keyword.as_str()))
        {
            continue;
        }

        for candidate in candidates.iter_mut() {
            let document_type = candidate
                .metadata
                .get("document_type")
                .and_then(|v| v.as_str());

            if document_type == Some(rule.document_type.as_str()) {
                candidate.combined_score =
                    (candidate.combined_score * rule.multiplier).clamp(0.0, 1.0);
            }
        }
    }
}

fn sort_candidates(candidates: &mut [RetrievalCandidate]) {
    candidates.sort_by(|a, b| {
        b.combined_score
            .partial_cmp(&a.combined_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.document_id.cmp(&b.document_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TieredCache;
    use crate::constants::{DEFAULT_ANSWER_TTL, DEFAULT_EMBEDDING_TTL};
    use crate::embedding::{EmbeddingBackend, MockEmbeddingBackend};
    use crate::metadata::MetadataEnricher;
    use crate::model::Metadata;
    use crate::vectordb::{MockChunk, MockVectorIndex};

    fn lexical_candidate(id: &str, score: f32) -> RetrievalCandidate {
        RetrievalCandidate::from_lexical(id.to_string(), format!("texte {id}"), Metadata::new(), score)
    }

    fn vector_candidate(id: &str, score: f32) -> RetrievalCandidate {
        RetrievalCandidate::from_vector(id.to_string(), format!("texte {id}"), Metadata::new(), score)
    }

    #[test]
    fn test_merge_keeps_max_scores() {
        let merged = merge_candidates(vec![
            lexical_candidate("doc", 0.8),
            vector_candidate("doc", 0.6),
        ]);

        assert_eq!(merged.len(), 1);
        let c = &merged[0];
        assert_eq!(c.lexical_score, 0.8);
        assert_eq!(c.vector_score, 0.6);
        assert!((c.combined_score - 0.7).abs() < 1e-6);
        assert_eq!(c.origin, CandidateOrigin::Merged);
    }

    #[test]
    fn test_merge_duplicate_from_both_indexes_keeps_per_index_max() {
        let merged = merge_candidates(vec![
            lexical_candidate("doc", 0.5),
            lexical_candidate("doc", 0.9),
            vector_candidate("doc", 0.4),
        ]);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].lexical_score, 0.9);
        assert_eq!(merged[0].vector_score, 0.4);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let input = vec![
            lexical_candidate("a", 0.8),
            vector_candidate("a", 0.6),
            vector_candidate("b", 0.3),
        ];

        let once = merge_candidates(input.clone());
        let twice = merge_candidates(once.clone());

        assert_eq!(once.len(), twice.len());
        for (x, y) in once.iter().zip(&twice) {
            assert_eq!(x.document_id, y.document_id);
            assert_eq!(x.lexical_score, y.lexical_score);
            assert_eq!(x.vector_score, y.vector_score);
            assert_eq!(x.combined_score, y.combined_score);
        }
    }

    #[test]
    fn test_combined_score_monotone_in_sub_scores() {
        let low = merge_candidates(vec![lexical_candidate("a", 0.2)]);
        let high = merge_candidates(vec![lexical_candidate("a", 0.9)]);
        assert!(high[0].combined_score > low[0].combined_score);
    }

    #[test]
    fn test_boost_applies_to_matching_type_only() {
        let rules = vec![BoostRule {
            keywords: vec!["traité".to_string()],
            document_type: "presentation_ohada".to_string(),
            multiplier: 1.5,
        }];

        let mut boosted = lexical_candidate("a", 0.8);
        boosted.combined_score = 0.4;
        boosted
            .metadata
            .insert("document_type".to_string(), serde_json::json!("presentation_ohada"));

        let mut untouched = lexical_candidate("b", 0.8);
        untouched.combined_score = 0.4;
        untouched
            .metadata
            .insert("document_type".to_string(), serde_json::json!("chapitre"));

        let mut candidates = vec![boosted, untouched];
        apply_boosts("que dit le traité ohada ?", &mut candidates, &rules);

        assert!((candidates[0].combined_score - 0.6).abs() < 1e-6);
        assert!((candidates[1].combined_score - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_boost_requires_keyword_in_query() {
        let rules = vec![BoostRule {
            keywords: vec!["traité".to_string()],
            document_type: "presentation_ohada".to_string(),
            multiplier: 1.5,
        }];

        let mut candidate = lexical_candidate("a", 0.8);
        candidate.combined_score = 0.4;
        candidate
            .metadata
            .insert("document_type".to_string(), serde_json::json!("presentation_ohada"));

        let mut candidates = vec![candidate];
        apply_boosts("amortissement des immobilisations", &mut candidates, &rules);
        assert!((candidates[0].combined_score - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_boost_clamped_to_one() {
        let rules = vec![BoostRule {
            keywords: vec!["traité".to_string()],
            document_type: "presentation_ohada".to_string(),
            multiplier: 1.5,
        }];

        let mut candidate = lexical_candidate("a", 1.0);
        candidate.combined_score = 0.9;
        candidate
            .metadata
            .insert("document_type".to_string(), serde_json::json!("presentation_ohada"));

        let mut candidates = vec![candidate];
        apply_boosts("le traité", &mut candidates, &rules);
        assert!(candidates[0].combined_score <= 1.0);
    }

    fn chunk(id: &str, text: &str, vector: Vec<f32>) -> MockChunk {
        let mut metadata = Metadata::new();
        metadata.insert("document_type".to_string(), serde_json::json!("article"));
        MockChunk {
            id: id.to_string(),
            text: text.to_string(),
            metadata,
            vector,
        }
    }

    fn retriever_with(
        vector: Arc<MockVectorIndex>,
        embedding_backend: Arc<MockEmbeddingBackend>,
    ) -> (HybridRetriever, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = Arc::new(TieredCache::new(
            16,
            DEFAULT_ANSWER_TTL,
            DEFAULT_EMBEDDING_TTL,
            None,
            None,
        ));
        let embeddings = Arc::new(EmbeddingProvider::new(
            vec![embedding_backend as Arc<dyn EmbeddingBackend>],
            8,
        ));

        let retriever = HybridRetriever::new(
            Arc::new(LexicalIndex::new(dir.path())),
            vector,
            embeddings,
            cache,
            Arc::new(Reranker::disabled()),
            Arc::new(MetadataEnricher::disabled()),
            RetrieverConfig {
                default_corpus: "corpus".to_string(),
                boost_rules: Vec::new(),
            },
            DEFAULT_EMBEDDING_TTL,
        );
        (retriever, dir)
    }

    #[tokio::test]
    async fn test_hybrid_search_returns_k_results() {
        let backend = Arc::new(MockEmbeddingBackend::new(8));
        let query_vector = backend.vector_for("amortissement");

        let index = Arc::new(MockVectorIndex::new(vec![
            chunk("doc-1", "l'amortissement des immobilisations", query_vector.clone()),
            chunk("doc-2", "le bilan comptable annuel", vec![0.0; 8]),
            chunk("doc-3", "les stocks et la trésorerie", vec![0.0; 8]),
        ]));

        let (retriever, _dir) = retriever_with(index, backend);
        let results = retriever
            .search_hybrid("amortissement", &SearchFilters::new(), 1, false)
            .await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document_id, "doc-1");
        assert!(results[0].relevance_score > 0.0);
        assert!(results[0].relevance_score <= 1.0);
    }

    #[tokio::test]
    async fn test_duplicate_hit_merges_to_single_record() {
        let backend = Arc::new(MockEmbeddingBackend::new(8));
        let query_vector = backend.vector_for("amortissement");

        let index = Arc::new(MockVectorIndex::new(vec![chunk(
            "doc-1",
            "l'amortissement des immobilisations",
            query_vector,
        )]));

        let (retriever, _dir) = retriever_with(index, backend);
        let results = retriever
            .search_hybrid("amortissement", &SearchFilters::new(), 5, false)
            .await;

        assert_eq!(results.len(), 1);
        let c = &results[0];
        assert_eq!(c.origin, CandidateOrigin::Merged);
        assert!(c.lexical_score > 0.0);
        assert!(c.vector_score > 0.0);
    }

    #[tokio::test]
    async fn test_vector_failure_degrades_to_lexical_only() {
        // Lexical bootstrap needs the document scroll, so seed the snapshot
        // through a healthy index first, then fail the vector side.
        let backend = Arc::new(MockEmbeddingBackend::new(8));
        let healthy = Arc::new(MockVectorIndex::new(vec![chunk(
            "doc-1",
            "l'amortissement des immobilisations",
            vec![0.0; 8],
        )]));

        let (retriever, dir) = retriever_with(healthy, backend.clone());
        retriever
            .search_hybrid("amortissement", &SearchFilters::new(), 5, false)
            .await;

        let failing = Arc::new(MockVectorIndex::failing());
        let cache = Arc::new(TieredCache::new(
            16,
            DEFAULT_ANSWER_TTL,
            DEFAULT_EMBEDDING_TTL,
            None,
            None,
        ));
        let retriever = HybridRetriever::new(
            Arc::new(LexicalIndex::new(dir.path())),
            failing,
            Arc::new(EmbeddingProvider::new(
                vec![backend as Arc<dyn EmbeddingBackend>],
                8,
            )),
            cache,
            Arc::new(Reranker::disabled()),
            Arc::new(MetadataEnricher::disabled()),
            RetrieverConfig {
                default_corpus: "corpus".to_string(),
                boost_rules: Vec::new(),
            },
            DEFAULT_EMBEDDING_TTL,
        );

        let results = retriever
            .search_hybrid("amortissement", &SearchFilters::new(), 5, false)
            .await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document_id, "doc-1");
        assert_eq!(results[0].vector_score, 0.0);
    }

    #[tokio::test]
    async fn test_all_sub_searches_failing_returns_empty() {
        let backend = Arc::new(MockEmbeddingBackend::new(8));
        let failing = Arc::new(MockVectorIndex::failing());

        let (retriever, _dir) = retriever_with(failing, backend);
        let results = retriever
            .search_hybrid("amortissement", &SearchFilters::new(), 5, false)
            .await;

        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_embedding_cached_across_searches() {
        let backend = Arc::new(MockEmbeddingBackend::new(8));
        let index = Arc::new(MockVectorIndex::new(vec![chunk(
            "doc-1",
            "l'amortissement des immobilisations",
            vec![1.0; 8],
        )]));

        let (retriever, _dir) = retriever_with(index, backend.clone());
        retriever
            .search_hybrid("amortissement", &SearchFilters::new(), 5, false)
            .await;
        retriever
            .search_hybrid("amortissement", &SearchFilters::new(), 5, false)
            .await;

        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_deterministic_ordering() {
        let backend = Arc::new(MockEmbeddingBackend::new(8));
        let index = Arc::new(MockVectorIndex::new(vec![
            chunk("doc-b", "le bilan comptable", vec![1.0; 8]),
            chunk("doc-a", "le bilan comptable", vec![1.0; 8]),
        ]));

        let (retriever, _dir) = retriever_with(index, backend);

        let first = retriever
            .search_hybrid("bilan", &SearchFilters::new(), 5, false)
            .await;
        let second = retriever
            .search_hybrid("bilan", &SearchFilters::new(), 5, false)
            .await;

        let ids: Vec<&str> = first.iter().map(|c| c.document_id.as_str()).collect();
        let ids2: Vec<&str> = second.iter().map(|c| c.document_id.as_str()).collect();
        assert_eq!(ids, ids2);
        // Equal scores break ties lexicographically.
        assert_eq!(ids, vec!["doc-a", "doc-b"]);
    }
}
