//! Cross-cutting, shared constants.
//!
//! Prefer deriving secondary constants from primary ones to avoid drift.
//! Score weights are duplicated in [`crate::config`] as configurable values;
//! the constants here are the defaults those configs start from.

use std::time::Duration;

/// Default embedding dimension for remote (API) embedding models.
pub const DEFAULT_EMBEDDING_DIM: usize = 1536;

/// Embedding dimension of the local BGE-family embedder.
pub const LOCAL_EMBEDDING_DIM: usize = 1024;

/// Whitespace-word ceiling applied to text before it is sent to an
/// embedding backend.
pub const DEFAULT_TRUNCATE_WORDS: usize = 8192;

/// Result-count bounds accepted by the pipeline.
pub const MIN_RESULTS: usize = 1;
pub const MAX_RESULTS: usize = 20;
pub const DEFAULT_RESULTS: usize = 5;

/// Default TTLs for the two cache namespaces.
pub const DEFAULT_ANSWER_TTL: Duration = Duration::from_secs(3600);
pub const DEFAULT_EMBEDDING_TTL: Duration = Duration::from_secs(86_400);

/// Capacity of the in-process embedding cache tier.
pub const DEFAULT_EMBEDDING_CACHE_CAPACITY: usize = 100;

/// Per-request deadline.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(180);

/// Merge weights applied when deduplicating lexical and vector candidates.
pub const MERGE_LEXICAL_WEIGHT: f32 = 0.5;
pub const MERGE_VECTOR_WEIGHT: f32 = 0.5;

/// Blend weights applied by the cross-encoder reranker.
pub const RERANK_LEXICAL_WEIGHT: f32 = 0.3;
pub const RERANK_VECTOR_WEIGHT: f32 = 0.3;
pub const RERANK_CROSS_WEIGHT: f32 = 0.4;

/// Context packing budget, expressed in tokens and converted to characters
/// with the 4-chars-per-token heuristic.
pub const DEFAULT_CONTEXT_TOKENS: usize = 1800;
pub const CHARS_PER_TOKEN: usize = 4;

/// Preview length used when projecting candidates into source views.
pub const SOURCE_PREVIEW_CHARS: usize = 150;

/// Name of the combined document corpus queried when no explicit
/// collection filter is present.
pub const DEFAULT_CORPUS: &str = "ohada_documents";
