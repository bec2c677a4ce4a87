//! Tiered cache cascade for embeddings and full answers.
//!
//! Embeddings probe memory (FIFO) → shared → disk; answers probe memory
//! (TTL) → shared. A hit at a lower tier is promoted to every tier above
//! it. Writes go disk → shared → memory. Every tier operation is
//! best-effort; only the in-process tiers are guaranteed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, instrument};

use crate::hashing;
use crate::model::{ScoredAnswer, SearchFilters};

use super::disk::DiskCache;
use super::fifo::FifoCache;
use super::shared::SharedCache;

/// Which tier served a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    Memory,
    Shared,
    Disk,
}

/// Cache namespaces exposed for bulk clearing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    Answers,
    Embeddings,
}

impl Namespace {
    fn key_namespace(self) -> &'static str {
        match self {
            Namespace::Answers => hashing::ANSWER_NAMESPACE,
            Namespace::Embeddings => hashing::EMBEDDING_NAMESPACE,
        }
    }
}

#[derive(Default)]
struct Counters {
    hits_memory: AtomicU64,
    hits_shared: AtomicU64,
    hits_disk: AtomicU64,
    misses: AtomicU64,
}

/// Aggregated cache statistics.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub hits_memory: u64,
    pub hits_shared: u64,
    pub hits_disk: u64,
    pub memory_embeddings: usize,
    pub memory_answers: u64,
    pub disk_embeddings: usize,
    pub shared_enabled: bool,
    pub disk_enabled: bool,
}

/// The three-tier cache cascade.
pub struct TieredCache {
    embeddings: FifoCache<String, Vec<f32>>,
    answers: moka::sync::Cache<String, ScoredAnswer>,
    shared: Option<SharedCache>,
    disk: Option<DiskCache>,
    embedding_ttl: Duration,
    counters: Counters,
}

impl TieredCache {
    /// Builds a cascade from the available tiers.
    pub fn new(
        embedding_capacity: usize,
        answer_ttl: Duration,
        embedding_ttl: Duration,
        shared: Option<SharedCache>,
        disk: Option<DiskCache>,
    ) -> Self {
        Self {
            embeddings: FifoCache::new(embedding_capacity),
            answers: moka::sync::Cache::builder()
                .max_capacity(10_000)
                .time_to_live(answer_ttl)
                .build(),
            shared,
            disk,
            embedding_ttl,
            counters: Counters::default(),
        }
    }

    /// Looks up an embedding, promoting hits to higher tiers.
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    pub async fn get_embedding(&self, text: &str) -> Option<(Vec<f32>, CacheTier)> {
        let key = hashing::embedding_key(text);

        if let Some(vector) = self.embeddings.get(&key) {
            debug!("embedding cache hit (memory)");
            self.counters.hits_memory.fetch_add(1, Ordering::Relaxed);
            return Some((vector, CacheTier::Memory));
        }

        if let Some(shared) = &self.shared
            && let Some(vector) = shared.get_json::<Vec<f32>>(&key).await
        {
            debug!("embedding cache hit (shared)");
            self.counters.hits_shared.fetch_add(1, Ordering::Relaxed);
            self.embeddings.insert(key, vector.clone());
            return Some((vector, CacheTier::Shared));
        }

        if let Some(disk) = &self.disk
            && let Some(vector) = disk.get(&key, self.embedding_ttl)
        {
            debug!("embedding cache hit (disk)");
            self.counters.hits_disk.fetch_add(1, Ordering::Relaxed);
            if let Some(shared) = &self.shared {
                shared.set_json(&key, &vector, self.embedding_ttl).await;
            }
            self.embeddings.insert(key, vector.clone());
            return Some((vector, CacheTier::Disk));
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Writes an embedding through every tier, lowest first.
    pub async fn put_embedding(&self, text: &str, vector: &[f32], ttl: Duration) {
        let key = hashing::embedding_key(text);

        if let Some(disk) = &self.disk {
            disk.put(&key, vector);
        }
        if let Some(shared) = &self.shared {
            shared.set_json(&key, &vector.to_vec(), ttl).await;
        }
        self.embeddings.insert(key, vector.to_vec());
    }

    /// Looks up a cached answer for a (query, filter-set) pair.
    #[instrument(skip(self, query, filters), fields(query_len = query.len()))]
    pub async fn get_answer(&self, query: &str, filters: &SearchFilters) -> Option<ScoredAnswer> {
        let key = hashing::answer_key(query, filters);

        if let Some(answer) = self.answers.get(&key) {
            debug!("answer cache hit (memory)");
            self.counters.hits_memory.fetch_add(1, Ordering::Relaxed);
            return Some(answer);
        }

        if let Some(shared) = &self.shared
            && let Some(answer) = shared.get_json::<ScoredAnswer>(&key).await
        {
            debug!("answer cache hit (shared)");
            self.counters.hits_shared.fetch_add(1, Ordering::Relaxed);
            self.answers.insert(key, answer.clone());
            return Some(answer);
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Stores an answer in the memory and shared tiers.
    pub async fn put_answer(
        &self,
        query: &str,
        filters: &SearchFilters,
        answer: &ScoredAnswer,
        ttl: Duration,
    ) {
        let key = hashing::answer_key(query, filters);

        if let Some(shared) = &self.shared {
            shared.set_json(&key, answer, ttl).await;
        }
        self.answers.insert(key, answer.clone());
    }

    /// Clears every tier of a namespace. Returns the number of shared-tier
    /// keys removed (in-process tiers do not report counts).
    pub async fn clear_namespace(&self, namespace: Namespace) -> usize {
        match namespace {
            Namespace::Answers => self.answers.invalidate_all(),
            Namespace::Embeddings => {
                self.embeddings.clear();
                if let Some(disk) = &self.disk {
                    disk.clear();
                }
            }
        }

        match &self.shared {
            Some(shared) => {
                let pattern = hashing::namespace_pattern(namespace.key_namespace());
                shared.delete_pattern(&pattern).await
            }
            None => 0,
        }
    }

    /// Aggregated statistics across tiers.
    pub fn stats(&self) -> CacheStats {
        let hits_memory = self.counters.hits_memory.load(Ordering::Relaxed);
        let hits_shared = self.counters.hits_shared.load(Ordering::Relaxed);
        let hits_disk = self.counters.hits_disk.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let hits = hits_memory + hits_shared + hits_disk;
        let total = hits + misses;

        self.answers.run_pending_tasks();

        CacheStats {
            hits,
            misses,
            hit_rate: if total == 0 {
                0.0
            } else {
                (hits as f64 / total as f64 * 100.0 * 100.0).round() / 100.0
            },
            hits_memory,
            hits_shared,
            hits_disk,
            memory_embeddings: self.embeddings.len(),
            memory_answers: self.answers.entry_count(),
            disk_embeddings: self.disk.as_ref().map(DiskCache::len).unwrap_or(0),
            shared_enabled: self.shared.is_some(),
            disk_enabled: self.disk.is_some(),
        }
    }
}

impl std::fmt::Debug for TieredCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredCache")
            .field("shared_enabled", &self.shared.is_some())
            .field("disk_enabled", &self.disk.is_some())
            .finish()
    }
}
