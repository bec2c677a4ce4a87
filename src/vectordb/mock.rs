//! In-memory vector index for tests.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::lexical::CorpusDocument;
use crate::model::{Metadata, SearchFilters};

use super::error::VectorDbError;
use super::model::VectorQueryResponse;
use super::{VectorIndexClient, cosine_distance};

/// One stored mock chunk.
#[derive(Debug, Clone)]
pub struct MockChunk {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
    pub vector: Vec<f32>,
}

/// Deterministic in-memory nearest-neighbor index.
///
/// Stores chunks with vectors and ranks by true cosine distance; filters
/// are applied post-hoc, mirroring a backend without filter push-down.
pub struct MockVectorIndex {
    chunks: Mutex<Vec<MockChunk>>,
    fail: bool,
    pub query_calls: AtomicU64,
}

impl MockVectorIndex {
    pub fn new(chunks: Vec<MockChunk>) -> Self {
        Self {
            chunks: Mutex::new(chunks),
            fail: false,
            query_calls: AtomicU64::new(0),
        }
    }

    /// An index whose every query fails.
    pub fn failing() -> Self {
        Self {
            chunks: Mutex::new(Vec::new()),
            fail: true,
            query_calls: AtomicU64::new(0),
        }
    }

    pub fn push(&self, chunk: MockChunk) {
        self.chunks.lock().push(chunk);
    }

    pub fn query_call_count(&self) -> u64 {
        self.query_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl VectorIndexClient for MockVectorIndex {
    async fn query(
        &self,
        corpus: &str,
        embedding: &[f32],
        filters: &SearchFilters,
        n_results: usize,
    ) -> Result<VectorQueryResponse, VectorDbError> {
        self.query_calls.fetch_add(1, Ordering::Relaxed);

        if self.fail {
            return Err(VectorDbError::SearchFailed {
                collection: corpus.to_string(),
                message: "mock failure".to_string(),
            });
        }

        let mut scored: Vec<(MockChunk, f32)> = self
            .chunks
            .lock()
            .iter()
            .filter(|chunk| filters.matches(&chunk.metadata))
            .map(|chunk| {
                let distance = cosine_distance(embedding, &chunk.vector);
                (chunk.clone(), distance)
            })
            .collect();

        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(n_results);

        let mut response = VectorQueryResponse::default();
        for (chunk, distance) in scored {
            response.ids.push(chunk.id);
            response.documents.push(chunk.text);
            response.metadatas.push(chunk.metadata);
            response.distances.push(distance);
        }
        Ok(response)
    }

    async fn fetch_documents(
        &self,
        corpus: &str,
        limit: usize,
    ) -> Result<Vec<CorpusDocument>, VectorDbError> {
        if self.fail {
            return Err(VectorDbError::ScrollFailed {
                collection: corpus.to_string(),
                message: "mock failure".to_string(),
            });
        }

        Ok(self
            .chunks
            .lock()
            .iter()
            .take(limit)
            .map(|chunk| CorpusDocument {
                id: chunk.id.clone(),
                text: chunk.text.clone(),
                metadata: chunk.metadata.clone(),
            })
            .collect())
    }

    async fn health(&self) -> bool {
        !self.fail
    }
}

impl std::fmt::Debug for MockVectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockVectorIndex")
            .field("chunks", &self.chunks.lock().len())
            .finish()
    }
}
