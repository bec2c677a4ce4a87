//! # Ohadex
//!
//! Hybrid retrieval and grounded answer generation for the OHADA/SYSCOHADA
//! knowledge base.
//!
//! A request enters as a free-text question, is classified by intent,
//! optionally reformulated, fanned out over a BM25 index and a dense-vector
//! index in parallel, merged and deduplicated, reranked by a cross-encoder,
//! enriched with canonical metadata, packed into a bounded context window
//! and answered by an LLM provider chain — as a single response or an
//! incremental event stream.
//!
//! ```text
//! Query → intent → reformulate? → { BM25 ∥ vectors } → merge → rerank
//!       → enrich → context → LLM → Answer (JSON or SSE)
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use ohadex::Config;
//!
//! # fn run() -> anyhow::Result<()> {
//! let config = Config::from_env()?;
//! println!("Listening on {}", config.socket_addr());
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature flags
//!
//! | Feature | Purpose |
//! |---------|---------|
//! | `cpu` | CPU-only inference (docs.rs default) |
//! | `metal` | Apple Silicon GPU acceleration |
//! | `cuda` | NVIDIA GPU acceleration |
//! | `mock` | Mock backends for tests/examples |
//!
//! ## Modules
//!
//! - [`cache`] - Tiered cache (FIFO memory + shared + disk)
//! - [`config`] - Environment-backed configuration
//! - [`embedding`] - Embedding provider chain (remote + local)
//! - [`llm`] - Chat-completion provider chain
//! - [`lexical`] - Per-corpus BM25 index with disk snapshots
//! - [`vectordb`] - Dense-vector index client (Qdrant)
//! - [`rerank`] - Cross-encoder reranking
//! - [`metadata`] - Relational metadata enrichment
//! - [`intent`] / [`reformulate`] - Query understanding
//! - [`context`] - Bounded context packing
//! - [`retriever`] / [`pipeline`] - Orchestration
//! - [`gateway`] - HTTP/SSE transport adapter

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod cache;
pub mod config;
pub mod constants;
pub mod context;
pub mod embedding;
pub mod gateway;
pub mod hashing;
pub mod intent;
pub mod lexical;
pub mod llm;
pub mod metadata;
pub mod model;
pub mod pipeline;
pub mod reformulate;
pub mod rerank;
pub mod retriever;
pub mod vectordb;

pub use cache::{CacheStats, CacheTier, DiskCache, FifoCache, Namespace, SharedCache, TieredCache};
pub use config::{
    AssistantPersonality, BoostRule, CacheConfig, Config, ConfigError, Environment, ProviderConfig,
    ProvidersConfig, RetrieverConfig,
};
pub use context::ContextBuilder;
pub use embedding::{
    BertEncoder, EmbeddingBackend, EmbeddingError, EmbeddingProvider, LocalEmbeddingBackend,
    RemoteEmbeddingBackend,
};
#[cfg(any(test, feature = "mock"))]
pub use embedding::MockEmbeddingBackend;
pub use gateway::{AppState, create_router};
pub use intent::{Intent, IntentAnalysis, IntentClassifier};
pub use lexical::{CorpusDocument, DocumentProvider, LexicalError, LexicalIndex};
pub use llm::{APOLOGY, ChatBackend, ChatRequest, ChunkStream, LlmError, LlmProvider};
#[cfg(any(test, feature = "mock"))]
pub use llm::MockChatBackend;
pub use metadata::{
    DocumentRecord, HierarchyQuery, MetadataEnricher, MetadataError, MetadataStore,
    PostgresMetadataStore,
};
#[cfg(any(test, feature = "mock"))]
pub use metadata::MockMetadataStore;
pub use model::{
    CandidateOrigin, FilterValue, Metadata, Performance, RetrievalCandidate, ScoredAnswer,
    SearchFilters, SourceView,
};
pub use pipeline::{
    AnswerPipeline, EventSink, PipelineConfig, PipelineError, ProgressStatus, SearchRequest,
    StreamEvent,
};
pub use reformulate::QueryReformulator;
pub use rerank::{Reranker, RerankerConfig, RerankerError};
pub use retriever::HybridRetriever;
pub use vectordb::{QdrantIndex, VectorDbError, VectorIndexClient, VectorQueryResponse};
#[cfg(any(test, feature = "mock"))]
pub use vectordb::{MockChunk, MockVectorIndex};
#[cfg(any(test, feature = "mock"))]
pub use lexical::StaticDocumentProvider;
