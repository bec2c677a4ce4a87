//! Dense-vector nearest-neighbor retrieval.
//!
//! [`VectorIndexClient`] is the contract the retriever depends on: a
//! column-oriented query response with cosine distances in `[0, 2]`, plus a
//! document scroll used to bootstrap the lexical index from the same
//! corpus. [`QdrantIndex`] is the production implementation.

mod client;
mod error;
#[cfg(any(test, feature = "mock"))]
mod mock;
mod model;

pub use client::QdrantIndex;
pub use error::VectorDbError;
#[cfg(any(test, feature = "mock"))]
pub use mock::{MockChunk, MockVectorIndex};
pub use model::VectorQueryResponse;

use async_trait::async_trait;

use crate::lexical::{CorpusDocument, DocumentProvider, LexicalError};
use crate::model::{RetrievalCandidate, SearchFilters};

/// Bound on documents pulled when bootstrapping a lexical index.
pub const DOCUMENT_SCROLL_LIMIT: usize = 10_000;

/// Minimal async interface used by the retriever.
#[async_trait]
pub trait VectorIndexClient: Send + Sync {
    /// Nearest-neighbor query over one corpus.
    async fn query(
        &self,
        corpus: &str,
        embedding: &[f32],
        filters: &SearchFilters,
        n_results: usize,
    ) -> Result<VectorQueryResponse, VectorDbError>;

    /// Fetches corpus documents for index bootstrap.
    async fn fetch_documents(
        &self,
        corpus: &str,
        limit: usize,
    ) -> Result<Vec<CorpusDocument>, VectorDbError>;

    /// Liveness of the backing service.
    async fn health(&self) -> bool {
        true
    }
}

#[async_trait]
impl VectorIndexClient for QdrantIndex {
    async fn query(
        &self,
        corpus: &str,
        embedding: &[f32],
        filters: &SearchFilters,
        n_results: usize,
    ) -> Result<VectorQueryResponse, VectorDbError> {
        self.search(corpus, embedding.to_vec(), filters, n_results)
            .await
    }

    async fn fetch_documents(
        &self,
        corpus: &str,
        limit: usize,
    ) -> Result<Vec<CorpusDocument>, VectorDbError> {
        self.fetch_documents(corpus, limit).await
    }

    async fn health(&self) -> bool {
        self.health_check().await.is_ok()
    }
}

/// Translates a cosine distance in `[0, 2]` to a similarity score in
/// `[0, 1]`.
pub fn distance_to_score(distance: f32) -> f32 {
    (1.0 - distance / 2.0).clamp(0.0, 1.0)
}

/// True cosine distance between two vectors (`1 − cos θ`, in `[0, 2]`).
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    (1.0 - dot / (norm_a * norm_b)).clamp(0.0, 2.0)
}

/// Maps a query response into vector-origin retrieval candidates.
pub fn response_to_candidates(response: VectorQueryResponse) -> Vec<RetrievalCandidate> {
    response
        .ids
        .into_iter()
        .zip(response.documents)
        .zip(response.metadatas)
        .zip(response.distances)
        .map(|(((id, text), metadata), distance)| {
            RetrievalCandidate::from_vector(id, text, metadata, distance_to_score(distance))
        })
        .collect()
}

/// [`DocumentProvider`] over a vector index's scroll endpoint, feeding the
/// lexical index from the same chunk corpus.
pub struct VectorDocumentProvider<C: VectorIndexClient + ?Sized> {
    client: std::sync::Arc<C>,
}

impl<C: VectorIndexClient + ?Sized> VectorDocumentProvider<C> {
    pub fn new(client: std::sync::Arc<C>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C: VectorIndexClient + ?Sized> DocumentProvider for VectorDocumentProvider<C> {
    async fn fetch_documents(&self, corpus: &str) -> Result<Vec<CorpusDocument>, LexicalError> {
        self.client
            .fetch_documents(corpus, DOCUMENT_SCROLL_LIMIT)
            .await
            .map_err(|e| LexicalError::FetchFailed {
                corpus: corpus.to_string(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Metadata;

    #[test]
    fn test_distance_to_score_mapping() {
        assert!((distance_to_score(0.0) - 1.0).abs() < f32::EPSILON);
        assert!((distance_to_score(1.0) - 0.5).abs() < f32::EPSILON);
        assert!((distance_to_score(2.0) - 0.0).abs() < f32::EPSILON);
        // Out-of-range distances clamp instead of escaping [0, 1].
        assert_eq!(distance_to_score(3.0), 0.0);
        assert_eq!(distance_to_score(-0.5), 1.0);
    }

    #[test]
    fn test_cosine_distance() {
        assert!(cosine_distance(&[1.0, 0.0], &[1.0, 0.0]) < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-6);
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }

    #[test]
    fn test_response_to_candidates() {
        let response = VectorQueryResponse {
            ids: vec!["doc-1".to_string(), "doc-2".to_string()],
            documents: vec!["près".to_string(), "loin".to_string()],
            metadatas: vec![Metadata::new(), Metadata::new()],
            distances: vec![0.2, 1.6],
        };

        let candidates = response_to_candidates(response);
        assert_eq!(candidates.len(), 2);
        assert!((candidates[0].vector_score - 0.9).abs() < 1e-6);
        assert!((candidates[1].vector_score - 0.2).abs() < 1e-6);
        assert_eq!(candidates[0].lexical_score, 0.0);
    }

    #[tokio::test]
    async fn test_mock_index_ranks_by_distance() {
        let query = vec![1.0, 0.0];
        let index = MockVectorIndex::new(vec![
            MockChunk {
                id: "far".to_string(),
                text: "loin".to_string(),
                metadata: Metadata::new(),
                vector: vec![0.0, 1.0],
            },
            MockChunk {
                id: "near".to_string(),
                text: "près".to_string(),
                metadata: Metadata::new(),
                vector: vec![1.0, 0.1],
            },
        ]);

        let response = index
            .query("corpus", &query, &SearchFilters::new(), 2)
            .await
            .expect("query");

        assert_eq!(response.ids, vec!["near".to_string(), "far".to_string()]);
        assert_eq!(index.query_call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_index_post_filters() {
        let mut metadata = Metadata::new();
        metadata.insert("partie".to_string(), serde_json::json!(1));

        let index = MockVectorIndex::new(vec![
            MockChunk {
                id: "keep".to_string(),
                text: "t".to_string(),
                metadata,
                vector: vec![1.0],
            },
            MockChunk {
                id: "drop".to_string(),
                text: "t".to_string(),
                metadata: Metadata::new(),
                vector: vec![1.0],
            },
        ]);

        let mut filters = SearchFilters::new();
        filters.insert("partie", 1i64);

        let response = index
            .query("corpus", &[1.0], &filters, 10)
            .await
            .expect("query");
        assert_eq!(response.ids, vec!["keep".to_string()]);
    }
}
