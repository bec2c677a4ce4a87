//! Cross-encoder reranking over merged retrieval candidates.
//!
//! The model is loaded lazily on first use behind a one-shot initializer;
//! a failed load permanently degrades the reranker to a pass-through so
//! retrieval keeps working on the merged scores alone. Only the `top_k`
//! prefix of the candidate list is scored, the remainder keeps its
//! pre-rerank order appended after the reranked prefix.

mod config;
mod error;
mod model;

pub use config::{MAX_SEQ_LEN, RerankerConfig};
pub use error::RerankerError;
pub use model::CrossEncoderModel;

use std::cmp::Ordering;
use std::sync::{Arc, OnceLock};

use tracing::{debug, info, instrument, warn};

use crate::constants::{RERANK_CROSS_WEIGHT, RERANK_LEXICAL_WEIGHT, RERANK_VECTOR_WEIGHT};
use crate::model::RetrievalCandidate;

#[cfg(any(test, feature = "mock"))]
type StubScorer = Box<dyn Fn(&str, &str) -> f32 + Send + Sync>;

enum RerankBackend {
    /// No model available; reranking is a pass-through.
    Noop,
    Model(CrossEncoderModel),
    #[cfg(any(test, feature = "mock"))]
    Stub(StubScorer),
}

impl RerankBackend {
    fn load(config: &RerankerConfig) -> Self {
        let Some(path) = &config.model_path else {
            info!("no cross-encoder model configured, reranking disabled");
            return RerankBackend::Noop;
        };

        match CrossEncoderModel::load(path) {
            Ok(model) => RerankBackend::Model(model),
            Err(e) => {
                warn!(error = %e, "cross-encoder load failed, reranking disabled");
                RerankBackend::Noop
            }
        }
    }

    fn score_pairs(&self, pairs: &[(String, String)]) -> Option<Vec<f32>> {
        match self {
            RerankBackend::Noop => None,
            RerankBackend::Model(model) => Some(
                pairs
                    .iter()
                    .map(|(query, passage)| {
                        model.score(query, passage).unwrap_or_else(|e| {
                            warn!(error = %e, "cross-encoder scoring failed for a pair");
                            0.0
                        })
                    })
                    .collect(),
            ),
            #[cfg(any(test, feature = "mock"))]
            RerankBackend::Stub(scorer) => Some(
                pairs
                    .iter()
                    .map(|(query, passage)| scorer(query, passage))
                    .collect(),
            ),
        }
    }
}

/// Lazy cross-encoder reranker.
pub struct Reranker {
    config: RerankerConfig,
    backend: Arc<OnceLock<RerankBackend>>,
}

impl Reranker {
    /// Creates a reranker; the model is not loaded until the first call.
    pub fn new(config: RerankerConfig) -> Self {
        Self {
            config,
            backend: Arc::new(OnceLock::new()),
        }
    }

    /// A reranker that never loads a model.
    pub fn disabled() -> Self {
        Self::new(RerankerConfig::disabled())
    }

    /// A reranker scoring pairs with a fixed function instead of a model.
    #[cfg(any(test, feature = "mock"))]
    pub fn with_stub_scorer(scorer: impl Fn(&str, &str) -> f32 + Send + Sync + 'static) -> Self {
        let backend = Arc::new(OnceLock::new());
        let _ = backend.set(RerankBackend::Stub(Box::new(scorer)));
        Self {
            config: RerankerConfig::disabled(),
            backend,
        }
    }

    /// Returns `true` once the backend has been initialized (model loaded,
    /// stubbed, or degraded to no-op).
    pub fn is_initialized(&self) -> bool {
        self.backend.get().is_some()
    }

    /// Reranks the first `top_k` candidates (whole list by default),
    /// blending the cross-encoder score into a final score. The remainder
    /// is appended unchanged.
    #[instrument(skip(self, query, candidates), fields(candidates = candidates.len()))]
    pub async fn rerank(
        &self,
        query: &str,
        mut candidates: Vec<RetrievalCandidate>,
        top_k: Option<usize>,
    ) -> Vec<RetrievalCandidate> {
        if candidates.is_empty() {
            return candidates;
        }

        let limit = top_k.unwrap_or(candidates.len()).min(candidates.len());
        let rest = candidates.split_off(limit);
        let mut prefix = candidates;

        let pairs: Vec<(String, String)> = prefix
            .iter()
            .map(|c| (query.to_string(), c.text.clone()))
            .collect();

        let backend = Arc::clone(&self.backend);
        let config = self.config.clone();
        let scores = tokio::task::spawn_blocking(move || {
            backend
                .get_or_init(|| RerankBackend::load(&config))
                .score_pairs(&pairs)
        })
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "rerank task failed");
            None
        });

        let Some(scores) = scores else {
            debug!("reranker unavailable, keeping merged order");
            prefix.extend(rest);
            return prefix;
        };

        for (candidate, score) in prefix.iter_mut().zip(scores) {
            let final_score = candidate.lexical_score * RERANK_LEXICAL_WEIGHT
                + candidate.vector_score * RERANK_VECTOR_WEIGHT
                + score * RERANK_CROSS_WEIGHT;

            candidate.cross_score = Some(score);
            candidate.final_score = Some(final_score);
            candidate.combined_score = final_score;
            candidate.relevance_score = final_score;
        }

        prefix.sort_by(|a, b| {
            b.effective_score()
                .partial_cmp(&a.effective_score())
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.document_id.cmp(&b.document_id))
        });

        prefix.extend(rest);
        prefix
    }
}

impl std::fmt::Debug for Reranker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reranker")
            .field("initialized", &self.is_initialized())
            .field("model_path", &self.config.model_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Metadata;

    fn candidate(id: &str, text: &str, lexical: f32, vector: f32) -> RetrievalCandidate {
        let mut c = RetrievalCandidate::from_lexical(
            id.to_string(),
            text.to_string(),
            Metadata::new(),
            lexical,
        );
        c.vector_score = vector;
        c.combined_score = lexical * 0.5 + vector * 0.5;
        c
    }

    #[tokio::test]
    async fn test_disabled_reranker_is_passthrough() {
        let reranker = Reranker::disabled();
        let candidates = vec![candidate("a", "texte a", 0.2, 0.2), candidate("b", "texte b", 0.9, 0.9)];

        let out = reranker.rerank("question", candidates.clone(), None).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].document_id, "a");
        assert!(out[0].cross_score.is_none());
        assert!(out[0].final_score.is_none());
    }

    #[tokio::test]
    async fn test_perfect_candidate_ranks_first_with_full_score() {
        // Ten candidates; item 7 has every sub-score at 1.0 and must come
        // out first with a final score of exactly 1.0.
        let mut candidates: Vec<RetrievalCandidate> = (0..10)
            .map(|i| candidate(&format!("doc-{i}"), &format!("texte {i}"), 0.4, 0.4))
            .collect();
        candidates[7] = candidate("doc-7", "texte parfait", 1.0, 1.0);

        let reranker = Reranker::with_stub_scorer(|_, passage| {
            if passage == "texte parfait" { 1.0 } else { 0.2 }
        });

        let out = reranker.rerank("question", candidates, None).await;
        assert_eq!(out[0].document_id, "doc-7");
        let final_score = out[0].final_score.expect("scored");
        assert!((final_score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_blend_weights() {
        let reranker = Reranker::with_stub_scorer(|_, _| 0.5);
        let out = reranker
            .rerank("q", vec![candidate("a", "t", 1.0, 0.0)], None)
            .await;

        // 1.0*0.3 + 0.0*0.3 + 0.5*0.4
        let expected = 0.5;
        assert!((out[0].final_score.unwrap() - expected).abs() < 1e-6);
        assert_eq!(out[0].cross_score, Some(0.5));
    }

    #[tokio::test]
    async fn test_top_k_prefix_only_scored() {
        let candidates = vec![
            candidate("a", "ta", 0.9, 0.9),
            candidate("b", "tb", 0.8, 0.8),
            candidate("c", "tc", 0.1, 0.1),
        ];

        let reranker = Reranker::with_stub_scorer(|_, passage| {
            // Reverse the prefix order.
            if passage == "tb" { 1.0 } else { 0.0 }
        });

        let out = reranker.rerank("q", candidates, Some(2)).await;
        assert_eq!(out[0].document_id, "b");
        assert_eq!(out[1].document_id, "a");
        // The unscored tail keeps its position and no cross score.
        assert_eq!(out[2].document_id, "c");
        assert!(out[2].cross_score.is_none());
    }

    #[tokio::test]
    async fn test_empty_candidates() {
        let reranker = Reranker::with_stub_scorer(|_, _| 1.0);
        let out = reranker.rerank("q", Vec::new(), None).await;
        assert!(out.is_empty());
    }
}
