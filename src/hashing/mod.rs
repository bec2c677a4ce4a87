//! Deterministic cache-key derivation.
//!
//! Keys follow the `ohadex:<namespace>:<md5-hex>` shape. The hashed material
//! for answers is `query` alone, or `query:<canonical-filters>` when filters
//! are present; filters are canonicalized by sorted key order so that two
//! requests with the same filter set always produce the same key regardless
//! of insertion order.

use crate::model::SearchFilters;

const KEY_PREFIX: &str = "ohadex";

/// Namespace for full-answer cache entries.
pub const ANSWER_NAMESPACE: &str = "query";

/// Namespace for embedding cache entries.
pub const EMBEDDING_NAMESPACE: &str = "embedding";

/// Computes the cache key for a full answer.
pub fn answer_key(query: &str, filters: &SearchFilters) -> String {
    let key_data = if filters.is_empty() {
        query.to_string()
    } else {
        format!("{}:{}", query, filters.canonical_json())
    };
    namespaced_key(ANSWER_NAMESPACE, &key_data)
}

/// Computes the cache key for a text embedding.
pub fn embedding_key(text: &str) -> String {
    namespaced_key(EMBEDDING_NAMESPACE, text)
}

/// Returns the wildcard pattern matching every key in a namespace.
pub fn namespace_pattern(namespace: &str) -> String {
    format!("{}:{}:*", KEY_PREFIX, namespace)
}

fn namespaced_key(namespace: &str, data: &str) -> String {
    let digest = md5::compute(data.as_bytes());
    format!("{}:{}:{:x}", KEY_PREFIX, namespace, digest)
}
