//! Per-corpus BM25 lexical search.
//!
//! Indexes are built lazily on the first search of a corpus and cached in
//! memory for the process lifetime, with a disk snapshot so later processes
//! skip the document fetch. A per-corpus build mutex keeps a first-search
//! race from doing more than duplicate work.

pub mod bm25;
mod error;
pub mod snapshot;

pub use bm25::{Bm25Index, tokenize};
pub use error::LexicalError;

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::model::{Metadata, RetrievalCandidate, SearchFilters};

/// One indexed document as provided by the backing store.
#[derive(Debug, Clone)]
pub struct CorpusDocument {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
}

/// Source of corpus documents for index builds.
#[async_trait]
pub trait DocumentProvider: Send + Sync {
    /// Fetches every document of a corpus.
    async fn fetch_documents(&self, corpus: &str) -> Result<Vec<CorpusDocument>, LexicalError>;
}

struct CorpusIndex {
    bm25: Bm25Index,
    documents: Vec<CorpusDocument>,
}

/// Lazily-built, cached BM25 index per logical corpus.
pub struct LexicalIndex {
    cache_dir: PathBuf,
    indexes: RwLock<HashMap<String, Arc<CorpusIndex>>>,
    build_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl LexicalIndex {
    /// Creates an index manager persisting snapshots under `cache_dir`.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            indexes: RwLock::new(HashMap::new()),
            build_locks: Mutex::new(HashMap::new()),
        }
    }

    fn snapshot_path(&self, corpus: &str) -> PathBuf {
        self.cache_dir.join(format!("{corpus}_bm25.snapshot"))
    }

    /// Returns `true` if the corpus index is already resident.
    pub fn is_built(&self, corpus: &str) -> bool {
        self.indexes.read().contains_key(corpus)
    }

    /// BM25 search over one corpus.
    ///
    /// Scores are normalized by the maximum positive score of the batch,
    /// filters are exact-match AND, and at most `2k` candidates with a
    /// positive score are returned. Ties break on raw score, then on
    /// document id.
    #[instrument(skip(self, query, filters, provider), fields(corpus, query_len = query.len()))]
    pub async fn search(
        &self,
        corpus: &str,
        query: &str,
        filters: &SearchFilters,
        k: usize,
        provider: &dyn DocumentProvider,
    ) -> Result<Vec<RetrievalCandidate>, LexicalError> {
        let index = self.corpus_index(corpus, provider).await?;

        let query_tokens = tokenize(query);
        if query_tokens.is_empty() {
            return Ok(Vec::new());
        }

        let scores = index.bm25.scores(&query_tokens);
        let max_score = scores.iter().copied().fold(0.0_f32, f32::max);
        if max_score <= 0.0 {
            debug!(corpus, "no lexical matches");
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = scores
            .iter()
            .copied()
            .enumerate()
            .filter(|&(_, score)| score > 0.0)
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| index.documents[a.0].id.cmp(&index.documents[b.0].id))
        });

        let candidates: Vec<RetrievalCandidate> = scored
            .into_iter()
            .filter(|&(doc_idx, _)| filters.matches(&index.documents[doc_idx].metadata))
            .take(2 * k)
            .map(|(doc_idx, raw)| {
                let doc = &index.documents[doc_idx];
                RetrievalCandidate::from_lexical(
                    doc.id.clone(),
                    doc.text.clone(),
                    doc.metadata.clone(),
                    raw / max_score,
                )
            })
            .collect();

        debug!(corpus, results = candidates.len(), "lexical search complete");
        Ok(candidates)
    }

    async fn corpus_index(
        &self,
        corpus: &str,
        provider: &dyn DocumentProvider,
    ) -> Result<Arc<CorpusIndex>, LexicalError> {
        if let Some(index) = self.indexes.read().get(corpus) {
            return Ok(Arc::clone(index));
        }

        let build_lock = {
            let mut locks = self.build_locks.lock();
            Arc::clone(
                locks
                    .entry(corpus.to_string())
                    .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
            )
        };
        let _guard = build_lock.lock().await;

        // Another task may have finished the build while we waited.
        if let Some(index) = self.indexes.read().get(corpus) {
            return Ok(Arc::clone(index));
        }

        let documents = match self.load_snapshot(corpus).await {
            Some(documents) => {
                info!(corpus, docs = documents.len(), "lexical index loaded from snapshot");
                documents
            }
            None => {
                let documents = provider.fetch_documents(corpus).await?;
                if documents.is_empty() {
                    return Err(LexicalError::EmptyCorpus {
                        corpus: corpus.to_string(),
                    });
                }
                info!(corpus, docs = documents.len(), "building lexical index");
                self.write_snapshot(corpus, &documents).await;
                documents
            }
        };

        let index = build_index(documents)
            .await
            .map_err(|reason| LexicalError::BuildFailed { reason })?;

        let index = Arc::new(index);
        self.indexes
            .write()
            .insert(corpus.to_string(), Arc::clone(&index));
        Ok(index)
    }

    async fn load_snapshot(&self, corpus: &str) -> Option<Vec<CorpusDocument>> {
        let path = self.snapshot_path(corpus);
        tokio::task::spawn_blocking(move || snapshot::load(&path))
            .await
            .ok()?
            .unwrap_or_else(|e| {
                warn!(error = %e, "snapshot load failed, rebuilding");
                None
            })
    }

    async fn write_snapshot(&self, corpus: &str, documents: &[CorpusDocument]) {
        let path = self.snapshot_path(corpus);
        let documents = documents.to_vec();
        let result = tokio::task::spawn_blocking(move || snapshot::save(&path, &documents)).await;

        match result {
            Ok(Err(e)) => warn!(corpus, error = %e, "snapshot write failed"),
            Err(e) => warn!(corpus, error = %e, "snapshot write task failed"),
            Ok(Ok(())) => {}
        }
    }
}

impl std::fmt::Debug for LexicalIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LexicalIndex")
            .field("cache_dir", &self.cache_dir)
            .field("resident_corpora", &self.indexes.read().len())
            .finish()
    }
}

async fn build_index(documents: Vec<CorpusDocument>) -> Result<CorpusIndex, String> {
    tokio::task::spawn_blocking(move || {
        let tokenized: Vec<Vec<String>> = documents.iter().map(|doc| tokenize(&doc.text)).collect();
        CorpusIndex {
            bm25: Bm25Index::build(&tokenized),
            documents,
        }
    })
    .await
    .map_err(|e| e.to_string())
}

/// Fixed in-memory document provider.
#[cfg(any(test, feature = "mock"))]
pub struct StaticDocumentProvider {
    documents: Vec<CorpusDocument>,
    pub fetch_calls: std::sync::atomic::AtomicU64,
}

#[cfg(any(test, feature = "mock"))]
impl StaticDocumentProvider {
    pub fn new(documents: Vec<CorpusDocument>) -> Self {
        Self {
            documents,
            fetch_calls: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn fetch_call_count(&self) -> u64 {
        self.fetch_calls.load(std::sync::atomic::Ordering::Relaxed)
    }
}

#[cfg(any(test, feature = "mock"))]
#[async_trait]
impl DocumentProvider for StaticDocumentProvider {
    async fn fetch_documents(&self, _corpus: &str) -> Result<Vec<CorpusDocument>, LexicalError> {
        self.fetch_calls
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Ok(self.documents.clone())
    }
}

/// Returns the snapshot path used for a corpus under a cache directory.
pub fn snapshot_path_for(cache_dir: &Path, corpus: &str) -> PathBuf {
    cache_dir.join(format!("{corpus}_bm25.snapshot"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, text: &str, partie: Option<i64>) -> CorpusDocument {
        let mut metadata = Metadata::new();
        if let Some(p) = partie {
            metadata.insert("partie".to_string(), serde_json::json!(p));
        }
        CorpusDocument {
            id: id.to_string(),
            text: text.to_string(),
            metadata,
        }
    }

    fn provider() -> StaticDocumentProvider {
        StaticDocumentProvider::new(vec![
            doc("doc-1", "l'amortissement des immobilisations corporelles", Some(1)),
            doc("doc-2", "le bilan présente l'actif et le passif", Some(1)),
            doc("doc-3", "amortissement dégressif et amortissement linéaire", Some(2)),
            doc("doc-4", "les stocks sont évalués au coût d'acquisition", Some(2)),
        ])
    }

    fn index(dir: &Path) -> LexicalIndex {
        LexicalIndex::new(dir)
    }

    #[tokio::test]
    async fn test_scores_normalized_to_unit_interval() {
        let dir = tempfile::tempdir().expect("tempdir");
        let lexical = index(dir.path());
        let provider = provider();

        let results = lexical
            .search("corpus", "amortissement", &SearchFilters::new(), 5, &provider)
            .await
            .expect("search");

        assert!(!results.is_empty());
        assert!((results[0].lexical_score - 1.0).abs() < 1e-6);
        for candidate in &results {
            assert!(candidate.lexical_score > 0.0 && candidate.lexical_score <= 1.0);
            assert_eq!(candidate.vector_score, 0.0);
        }
    }

    #[tokio::test]
    async fn test_filters_drop_non_matching() {
        let dir = tempfile::tempdir().expect("tempdir");
        let lexical = index(dir.path());
        let provider = provider();

        let mut filters = SearchFilters::new();
        filters.insert("partie", 2i64);

        let results = lexical
            .search("corpus", "amortissement", &filters, 5, &provider)
            .await
            .expect("search");

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document_id, "doc-3");
    }

    #[tokio::test]
    async fn test_result_count_capped_at_twice_k() {
        let dir = tempfile::tempdir().expect("tempdir");
        let lexical = index(dir.path());
        let provider = StaticDocumentProvider::new(
            (0..10)
                .map(|i| doc(&format!("doc-{i}"), "amortissement des immobilisations", None))
                .collect(),
        );

        let results = lexical
            .search("corpus", "amortissement", &SearchFilters::new(), 2, &provider)
            .await
            .expect("search");

        assert_eq!(results.len(), 4);
    }

    #[tokio::test]
    async fn test_no_match_returns_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let lexical = index(dir.path());
        let provider = provider();

        let results = lexical
            .search("corpus", "xylophone", &SearchFilters::new(), 5, &provider)
            .await
            .expect("search");

        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_index_built_once_and_snapshotted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let provider = provider();

        {
            let lexical = index(dir.path());
            lexical
                .search("corpus", "bilan", &SearchFilters::new(), 5, &provider)
                .await
                .expect("search");
            lexical
                .search("corpus", "stocks", &SearchFilters::new(), 5, &provider)
                .await
                .expect("search");
        }
        assert_eq!(provider.fetch_call_count(), 1);
        assert!(snapshot_path_for(dir.path(), "corpus").exists());

        // A fresh manager bootstraps from the snapshot, not the provider.
        let lexical = index(dir.path());
        let results = lexical
            .search("corpus", "bilan", &SearchFilters::new(), 5, &provider)
            .await
            .expect("search");
        assert!(!results.is_empty());
        assert_eq!(provider.fetch_call_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_corpus_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let lexical = index(dir.path());
        let provider = StaticDocumentProvider::new(Vec::new());

        let result = lexical
            .search("corpus", "bilan", &SearchFilters::new(), 5, &provider)
            .await;

        assert!(matches!(result, Err(LexicalError::EmptyCorpus { .. })));
    }

    #[tokio::test]
    async fn test_concurrent_first_search_builds_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let lexical = Arc::new(index(dir.path()));
        let provider = Arc::new(provider());

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let lexical = Arc::clone(&lexical);
                let provider = Arc::clone(&provider);
                tokio::spawn(async move {
                    lexical
                        .search("corpus", "amortissement", &SearchFilters::new(), 5, &*provider)
                        .await
                })
            })
            .collect();

        for task in tasks {
            task.await.expect("join").expect("search");
        }

        assert_eq!(provider.fetch_call_count(), 1);
    }
}
