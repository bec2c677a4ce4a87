//! Shared pipeline fixture wired entirely from mock backends.

use std::sync::Arc;
use std::time::Duration;

use ohadex::cache::TieredCache;
use ohadex::config::{AssistantPersonality, RetrieverConfig};
use ohadex::constants::{DEFAULT_ANSWER_TTL, DEFAULT_EMBEDDING_TTL};
use ohadex::context::ContextBuilder;
use ohadex::embedding::{EmbeddingBackend, EmbeddingProvider};
use ohadex::intent::IntentClassifier;
use ohadex::lexical::LexicalIndex;
use ohadex::llm::{ChatBackend, LlmProvider};
use ohadex::metadata::{MetadataEnricher, MetadataStore};
use ohadex::pipeline::{AnswerPipeline, PipelineConfig};
use ohadex::reformulate::QueryReformulator;
use ohadex::rerank::Reranker;
use ohadex::retriever::HybridRetriever;
use ohadex::vectordb::VectorIndexClient;
use ohadex::{
    DocumentRecord, MockChatBackend, MockChunk, MockEmbeddingBackend, MockMetadataStore,
    MockVectorIndex,
};

pub const EMBEDDING_DIM: usize = 8;

/// A fully-mocked pipeline plus handles to every counter-bearing mock.
pub struct PipelineFixture {
    pub pipeline: Arc<AnswerPipeline>,
    pub llm: Arc<LlmProvider>,
    pub embedding: Arc<MockEmbeddingBackend>,
    pub vector: Arc<MockVectorIndex>,
    pub cache: Arc<TieredCache>,
    _dir: tempfile::TempDir,
}

/// Builds a pipeline over the given chat backends, indexed chunks and
/// canonical metadata records.
pub fn build_pipeline(
    chat_backends: Vec<Arc<MockChatBackend>>,
    chunks: Vec<MockChunk>,
    records: Vec<DocumentRecord>,
) -> PipelineFixture {
    let dir = tempfile::tempdir().expect("tempdir");

    let embedding = Arc::new(MockEmbeddingBackend::new(EMBEDDING_DIM));
    let vector = Arc::new(MockVectorIndex::new(chunks));
    let cache = Arc::new(TieredCache::new(
        16,
        DEFAULT_ANSWER_TTL,
        DEFAULT_EMBEDDING_TTL,
        None,
        None,
    ));

    let llm = Arc::new(LlmProvider::new(
        chat_backends
            .iter()
            .map(|b| Arc::clone(b) as Arc<dyn ChatBackend>)
            .collect(),
    ));

    let enricher = if records.is_empty() {
        MetadataEnricher::disabled()
    } else {
        MetadataEnricher::new(Arc::new(MockMetadataStore::new(records)) as Arc<dyn MetadataStore>)
    };

    let retriever = Arc::new(HybridRetriever::new(
        Arc::new(LexicalIndex::new(dir.path())),
        Arc::clone(&vector) as Arc<dyn VectorIndexClient>,
        Arc::new(EmbeddingProvider::new(
            vec![Arc::clone(&embedding) as Arc<dyn EmbeddingBackend>],
            EMBEDDING_DIM,
        )),
        Arc::clone(&cache),
        Arc::new(Reranker::disabled()),
        Arc::new(enricher),
        RetrieverConfig {
            default_corpus: "ohada_documents".to_string(),
            boost_rules: RetrieverConfig::default().boost_rules,
        },
        DEFAULT_EMBEDDING_TTL,
    ));

    let pipeline = Arc::new(AnswerPipeline::new(
        retriever,
        Arc::clone(&llm),
        Arc::clone(&cache),
        IntentClassifier::new(Arc::clone(&llm), AssistantPersonality::default()),
        QueryReformulator::new(Arc::clone(&llm)),
        ContextBuilder::default(),
        PipelineConfig {
            direct_reply_chunk_delay: Duration::ZERO,
            ..PipelineConfig::default()
        },
    ));

    PipelineFixture {
        pipeline,
        llm,
        embedding,
        vector,
        cache,
        _dir: dir,
    }
}

/// A chunk whose vector matches what the mock embedder produces for
/// `query`, so it ranks first for that query.
pub fn chunk_for_query(
    id: &str,
    text: &str,
    query: &str,
    metadata: ohadex::Metadata,
) -> MockChunk {
    let embedder = MockEmbeddingBackend::new(EMBEDDING_DIM);
    MockChunk {
        id: id.to_string(),
        text: text.to_string(),
        metadata,
        vector: embedder.vector_for(query),
    }
}
