//! Embedding generation with a priority fallback chain.
//!
//! Backends implement [`EmbeddingBackend`] and are attempted in configured
//! order; the first backend returning a vector of the expected dimension
//! wins. Input text is truncated on whitespace at the configured word
//! ceiling before any backend sees it. When every backend fails, a zero
//! vector of the configured dimension is returned — the pipeline treats
//! zero vectors as legitimate but low-signal.

pub mod bert;
pub mod device;
mod error;
pub mod utils;

pub use bert::BertEncoder;
pub use device::select_device;
pub use error::EmbeddingError;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::embeddings::{CreateEmbeddingRequest, CreateEmbeddingResponse};
use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::config::ProviderConfig;
use crate::constants::DEFAULT_TRUNCATE_WORDS;

/// Capability interface implemented by every embedding backend.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Stable backend name used in logs.
    fn name(&self) -> &str;

    /// The dimension this backend produces.
    fn dimension(&self) -> usize;

    /// Embeds one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Remote OpenAI-compatible embedding backend.
pub struct RemoteEmbeddingBackend {
    name: String,
    client: Client<OpenAIConfig>,
    model: String,
    dimension: usize,
}

impl RemoteEmbeddingBackend {
    /// Builds a backend from one provider-table entry. Returns `None` when
    /// the entry has no embedding model or no API key in the environment.
    pub fn from_provider(name: &str, provider: &ProviderConfig) -> Option<Self> {
        let model = provider.models.embedding_model()?.to_string();
        let dimension = provider.parameters.dimensions?;

        let api_key_env = provider.api_key_env.as_deref()?;
        let api_key = match std::env::var(api_key_env) {
            Ok(key) if !key.trim().is_empty() => key,
            _ => {
                warn!(provider = name, api_key_env, "API key not set, embedding backend disabled");
                return None;
            }
        };

        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base_url) = &provider.base_url {
            config = config.with_api_base(base_url);
        }

        Some(Self {
            name: name.to_string(),
            client: Client::with_config(config),
            model,
            dimension,
        })
    }
}

#[async_trait]
impl EmbeddingBackend for RemoteEmbeddingBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    #[instrument(skip(self, text), fields(backend = %self.name, model = %self.model, text_len = text.len()))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let request: CreateEmbeddingRequest = serde_json::from_value(serde_json::json!({
            "model": self.model,
            "input": [text],
            "dimensions": self.dimension,
        }))
        .map_err(|e| EmbeddingError::NotConfigured {
            backend: self.name.clone(),
            reason: format!("request construction failed: {e}"),
        })?;

        let response: CreateEmbeddingResponse = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| EmbeddingError::RequestFailed {
                backend: self.name.clone(),
                reason: e.to_string(),
            })?;

        response
            .data
            .into_iter()
            .next()
            .map(|item| item.embedding)
            .ok_or_else(|| EmbeddingError::RequestFailed {
                backend: self.name.clone(),
                reason: "empty embedding response".to_string(),
            })
    }
}

/// In-process embedding backend over [`BertEncoder`].
pub struct LocalEmbeddingBackend {
    encoder: Arc<BertEncoder>,
    dimension: usize,
}

impl LocalEmbeddingBackend {
    /// Loads the local model eagerly so the first query pays no load cost.
    pub fn load(model_dir: &Path, dimension: usize) -> Result<Self, EmbeddingError> {
        let device = select_device()?;
        let encoder = BertEncoder::load(model_dir, device)?;

        if encoder.dimension() != dimension {
            return Err(EmbeddingError::DimensionMismatch {
                backend: "local_embedding".to_string(),
                expected: dimension,
                actual: encoder.dimension(),
            });
        }

        Ok(Self {
            encoder: Arc::new(encoder),
            dimension,
        })
    }
}

#[async_trait]
impl EmbeddingBackend for LocalEmbeddingBackend {
    fn name(&self) -> &str {
        "local_embedding"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let encoder = Arc::clone(&self.encoder);
        let text = text.to_string();

        tokio::task::spawn_blocking(move || encoder.encode(&text))
            .await
            .map_err(|e| EmbeddingError::InferenceFailed {
                reason: format!("encoder task failed: {e}"),
            })?
    }
}

/// Truncates text to at most `max_words` whitespace-separated words.
///
/// No semantic re-tokenization happens here; the ceiling only protects
/// backends from oversized inputs.
pub fn truncate_words(text: &str, max_words: usize) -> String {
    let mut words = text.split_whitespace();
    let truncated: Vec<&str> = words.by_ref().take(max_words).collect();
    if words.next().is_some() {
        truncated.join(" ")
    } else {
        text.to_string()
    }
}

/// Priority-ordered embedding provider.
pub struct EmbeddingProvider {
    backends: Vec<Arc<dyn EmbeddingBackend>>,
    dimension: usize,
    truncate_words: usize,
    all_failed: AtomicU64,
}

impl EmbeddingProvider {
    /// Registers backends in priority order for a fixed output dimension.
    pub fn new(backends: Vec<Arc<dyn EmbeddingBackend>>, dimension: usize) -> Self {
        Self {
            backends,
            dimension,
            truncate_words: DEFAULT_TRUNCATE_WORDS,
            all_failed: AtomicU64::new(0),
        }
    }

    /// Overrides the truncation ceiling.
    pub fn with_truncate_words(mut self, max_words: usize) -> Self {
        self.truncate_words = max_words;
        self
    }

    /// The configured output dimension.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of requests that exhausted every backend.
    pub fn all_failed_count(&self) -> u64 {
        self.all_failed.load(Ordering::Relaxed)
    }

    /// Embeds a text, degrading to a zero vector when every backend fails
    /// or returns a mismatched dimension.
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    pub async fn embed(&self, text: &str) -> Vec<f32> {
        let text = truncate_words(text, self.truncate_words);

        for backend in &self.backends {
            debug!(backend = backend.name(), "attempting embedding");
            match backend.embed(&text).await {
                Ok(vector) if vector.len() == self.dimension => {
                    info!(backend = backend.name(), "embedding generated");
                    return vector;
                }
                Ok(vector) => {
                    warn!(
                        backend = backend.name(),
                        expected = self.dimension,
                        actual = vector.len(),
                        "embedding dimension mismatch, trying next backend"
                    );
                }
                Err(e) => {
                    warn!(backend = backend.name(), error = %e, "embedding backend failed, trying next");
                }
            }
        }

        self.all_failed.fetch_add(1, Ordering::Relaxed);
        warn!("all embedding backends failed, returning zero vector");
        vec![0.0; self.dimension]
    }
}

impl std::fmt::Debug for EmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingProvider")
            .field("backends", &self.backends.len())
            .field("dimension", &self.dimension)
            .finish()
    }
}

#[cfg(any(test, feature = "mock"))]
pub use mock::MockEmbeddingBackend;

#[cfg(any(test, feature = "mock"))]
mod mock {
    use super::*;

    /// Deterministic, hash-seeded embedding backend for tests.
    pub struct MockEmbeddingBackend {
        dimension: usize,
        fail: bool,
        pub calls: AtomicU64,
    }

    impl MockEmbeddingBackend {
        pub fn new(dimension: usize) -> Self {
            Self {
                dimension,
                fail: false,
                calls: AtomicU64::new(0),
            }
        }

        pub fn failing(dimension: usize) -> Self {
            Self {
                dimension,
                fail: true,
                calls: AtomicU64::new(0),
            }
        }

        pub fn call_count(&self) -> u64 {
            self.calls.load(Ordering::Relaxed)
        }

        /// The vector this backend produces for a text.
        pub fn vector_for(&self, text: &str) -> Vec<f32> {
            use std::hash::{DefaultHasher, Hash, Hasher};

            let mut hasher = DefaultHasher::new();
            text.hash(&mut hasher);
            let mut state = hasher.finish();

            let mut embedding = Vec::with_capacity(self.dimension);
            for _ in 0..self.dimension {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
                let value = ((state >> 32) as f32 / u32::MAX as f32) * 2.0 - 1.0;
                embedding.push(value);
            }

            let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                for x in &mut embedding {
                    *x /= norm;
                }
            }
            embedding
        }
    }

    #[async_trait]
    impl EmbeddingBackend for MockEmbeddingBackend {
        fn name(&self) -> &str {
            "mock_embedding"
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if self.fail {
                return Err(EmbeddingError::RequestFailed {
                    backend: "mock_embedding".to_string(),
                    reason: "mock failure".to_string(),
                });
            }
            Ok(self.vector_for(text))
        }
    }
}
