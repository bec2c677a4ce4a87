//! Chat-completion provider with priority fallback.
//!
//! Backends implement [`ChatBackend`] and are registered at startup in
//! priority order; each call walks the list and the first success wins.
//! When every backend fails, [`LlmProvider::complete`] degrades to a fixed
//! apology string and [`LlmProvider::complete_stream`] to a single apology
//! chunk, so callers on the happy path never observe an error.

mod error;

pub use error::LlmError;

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{CreateChatCompletionRequest, CreateChatCompletionStreamResponse};
use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::{debug, info, instrument, warn};

use crate::config::ProviderConfig;

/// User-facing degradation string when every provider is down.
pub const APOLOGY: &str = "Désolé, une erreur est survenue lors de la génération de la réponse. \
     Veuillez vérifier vos clés API et réessayer ultérieurement.";

/// A lazy, finite, non-restartable sequence of completion text chunks.
pub type ChunkStream = Pin<Box<dyn futures_util::Stream<Item = Result<String, LlmError>> + Send>>;

/// One chat-completion call.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl ChatRequest {
    /// Builds a request with explicit generation parameters.
    pub fn new(
        system: impl Into<String>,
        user: impl Into<String>,
        max_tokens: u32,
        temperature: f32,
    ) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            max_tokens,
            temperature,
        }
    }
}

/// Capability interface implemented by every chat backend.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Stable backend name used in logs and failure counters.
    fn name(&self) -> &str;

    /// Synchronous completion.
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError>;

    /// Streaming completion. Dropping the returned stream closes the
    /// underlying connection.
    async fn complete_stream(&self, request: &ChatRequest) -> Result<ChunkStream, LlmError>;
}

/// OpenAI-compatible HTTP backend (OpenAI, DeepSeek, any `base_url`
/// override speaking the same API).
pub struct OpenAiChatBackend {
    name: String,
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiChatBackend {
    /// Builds a backend from one provider-table entry. Returns `None` when
    /// the entry has no chat model or no API key in the environment.
    pub fn from_provider(name: &str, provider: &ProviderConfig) -> Option<Self> {
        let model = provider.models.response_model()?.to_string();

        let api_key_env = provider.api_key_env.as_deref()?;
        let api_key = match std::env::var(api_key_env) {
            Ok(key) if !key.trim().is_empty() => key,
            _ => {
                warn!(provider = name, api_key_env, "API key not set, backend disabled");
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
        })
    }

    fn build_request(&self, request: &ChatRequest) -> Result<CreateChatCompletionRequest, LlmError> {
        serde_json::from_value(serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        }))
        .map_err(|e| LlmError::NotConfigured {
            backend: self.name.clone(),
            reason: format!("request construction failed: {e}"),
        })
    }
}

#[async_trait]
impl ChatBackend for OpenAiChatBackend {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, request), fields(backend = %self.name, model = %self.model))]
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let api_request = self.build_request(request)?;

        let response = self.client.chat().create(api_request).await.map_err(|e| {
            LlmError::RequestFailed {
                backend: self.name.clone(),
                reason: e.to_string(),
            }
        })?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| LlmError::EmptyCompletion {
                backend: self.name.clone(),
            })
    }

    #[instrument(skip(self, request), fields(backend = %self.name, model = %self.model))]
    async fn complete_stream(&self, request: &ChatRequest) -> Result<ChunkStream, LlmError> {
        let mut api_request = self.build_request(request)?;
        api_request.stream = Some(true);

        let backend = self.name.clone();
        let stream = self
            .client
            .chat()
            .create_stream(api_request)
            .await
            .map_err(|e| LlmError::RequestFailed {
                backend: self.name.clone(),
                reason: e.to_string(),
            })?;

        let chunks = stream.filter_map(move |item| {
            let backend = backend.clone();
            async move {
                match item {
                    Ok(response) => delta_text(&response).map(Ok),
                    Err(e) => Some(Err(LlmError::RequestFailed {
                        backend,
                        reason: e.to_string(),
                    })),
                }
            }
        });

        Ok(Box::pin(chunks))
    }
}

fn delta_text(response: &CreateChatCompletionStreamResponse) -> Option<String> {
    response
        .choices
        .first()
        .and_then(|choice| choice.delta.content.clone())
        .filter(|content| !content.is_empty())
}

struct BackendSlot {
    backend: Arc<dyn ChatBackend>,
    failures: AtomicU64,
}

/// Priority-ordered chat provider.
pub struct LlmProvider {
    slots: Vec<BackendSlot>,
}

impl LlmProvider {
    /// Registers backends in priority order.
    pub fn new(backends: Vec<Arc<dyn ChatBackend>>) -> Self {
        Self {
            slots: backends
                .into_iter()
                .map(|backend| BackendSlot {
                    backend,
                    failures: AtomicU64::new(0),
                })
                .collect(),
        }
    }

    /// Number of registered backends.
    pub fn backend_count(&self) -> usize {
        self.slots.len()
    }

    /// Recorded failure count for a backend name.
    pub fn failure_count(&self, name: &str) -> u64 {
        self.slots
            .iter()
            .find(|slot| slot.backend.name() == name)
            .map(|slot| slot.failures.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// First-success completion; surfaces the error when every backend
    /// fails.
    pub async fn try_complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        for slot in &self.slots {
            debug!(backend = slot.backend.name(), "attempting completion");
            match slot.backend.complete(request).await {
                Ok(text) => {
                    info!(backend = slot.backend.name(), "completion served");
                    return Ok(text);
                }
                Err(e) => {
                    slot.failures.fetch_add(1, Ordering::Relaxed);
                    warn!(backend = slot.backend.name(), error = %e, "backend failed, trying next");
                }
            }
        }
        Err(LlmError::AllBackendsFailed)
    }

    /// Completion that degrades to [`APOLOGY`] instead of failing.
    pub async fn complete(&self, request: &ChatRequest) -> String {
        match self.try_complete(request).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "all chat backends failed, returning apology");
                APOLOGY.to_string()
            }
        }
    }

    /// First-success streaming completion. When every backend fails to
    /// open a stream, yields a single apology chunk and ends.
    pub async fn complete_stream(&self, request: &ChatRequest) -> ChunkStream {
        for slot in &self.slots {
            debug!(backend = slot.backend.name(), "attempting streaming completion");
            match slot.backend.complete_stream(request).await {
                Ok(stream) => {
                    info!(backend = slot.backend.name(), "streaming completion opened");
                    return stream;
                }
                Err(e) => {
                    slot.failures.fetch_add(1, Ordering::Relaxed);
                    warn!(backend = slot.backend.name(), error = %e, "backend stream failed, trying next");
                }
            }
        }

        warn!("all chat backends failed, streaming apology");
        Box::pin(tokio_stream::once(Ok(APOLOGY.to_string())))
    }
}

impl std::fmt::Debug for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmProvider")
            .field("backends", &self.slots.len())
            .finish()
    }
}

#[cfg(any(test, feature = "mock"))]
pub use mock::MockChatBackend;

#[cfg(any(test, feature = "mock"))]
mod mock {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    /// Scripted chat backend for tests.
    ///
    /// Counts calls, optionally always fails, and exposes a flag that flips
    /// when a previously opened stream is dropped so cancellation can be
    /// asserted.
    pub struct MockChatBackend {
        name: String,
        reply: String,
        chunks: Vec<String>,
        chunk_delay: Duration,
        complete_delay: Duration,
        fail: bool,
        pub complete_calls: AtomicU64,
        pub stream_calls: AtomicU64,
        stream_open: Arc<AtomicBool>,
    }

    impl MockChatBackend {
        pub fn new(name: &str, reply: &str) -> Self {
            Self {
                name: name.to_string(),
                reply: reply.to_string(),
                chunks: reply
                    .split_inclusive(' ')
                    .map(|part| part.to_string())
                    .collect(),
                chunk_delay: Duration::ZERO,
                complete_delay: Duration::ZERO,
                fail: false,
                complete_calls: AtomicU64::new(0),
                stream_calls: AtomicU64::new(0),
                stream_open: Arc::new(AtomicBool::new(false)),
            }
        }

        /// A backend whose every call fails.
        pub fn failing(name: &str) -> Self {
            let mut backend = Self::new(name, "");
            backend.fail = true;
            backend
        }

        /// Overrides the streamed chunk sequence.
        pub fn with_chunks(mut self, chunks: Vec<String>) -> Self {
            self.chunks = chunks;
            self
        }

        /// Inserts a delay before each streamed chunk.
        pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
            self.chunk_delay = delay;
            self
        }

        /// Inserts a delay before each synchronous completion.
        pub fn with_complete_delay(mut self, delay: Duration) -> Self {
            self.complete_delay = delay;
            self
        }

        pub fn complete_call_count(&self) -> u64 {
            self.complete_calls.load(Ordering::Relaxed)
        }

        pub fn stream_call_count(&self) -> u64 {
            self.stream_calls.load(Ordering::Relaxed)
        }

        /// `true` while a stream handed out by this backend is alive.
        pub fn stream_is_open(&self) -> bool {
            self.stream_open.load(Ordering::Relaxed)
        }
    }

    struct StreamGuard(Arc<AtomicBool>);

    impl Drop for StreamGuard {
        fn drop(&mut self) {
            self.0.store(false, Ordering::Relaxed);
        }
    }

    #[async_trait]
    impl ChatBackend for MockChatBackend {
        fn name(&self) -> &str {
            &self.name
        }

        async fn complete(&self, _request: &ChatRequest) -> Result<String, LlmError> {
            self.complete_calls.fetch_add(1, Ordering::Relaxed);
            if !self.complete_delay.is_zero() {
                tokio::time::sleep(self.complete_delay).await;
            }
            if self.fail {
                return Err(LlmError::RequestFailed {
                    backend: self.name.clone(),
                    reason: "mock failure".to_string(),
                });
            }
            Ok(self.reply.clone())
        }

        async fn complete_stream(&self, _request: &ChatRequest) -> Result<ChunkStream, LlmError> {
            self.stream_calls.fetch_add(1, Ordering::Relaxed);
            if self.fail {
                return Err(LlmError::RequestFailed {
                    backend: self.name.clone(),
                    reason: "mock failure".to_string(),
                });
            }

            self.stream_open.store(true, Ordering::Relaxed);
            let guard = StreamGuard(Arc::clone(&self.stream_open));
            let chunks = self.chunks.clone();
            let delay = self.chunk_delay;

            let stream = futures_util::stream::unfold(
                (chunks.into_iter(), guard),
                move |(mut iter, guard)| async move {
                    let chunk = iter.next()?;
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    Some((Ok(chunk), (iter, guard)))
                },
            );

            Ok(Box::pin(stream))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ChatRequest {
        ChatRequest::new("system", "user", 100, 0.3)
    }

    #[tokio::test]
    async fn test_first_backend_wins() {
        let p1 = Arc::new(MockChatBackend::new("p1", "réponse p1"));
        let p2 = Arc::new(MockChatBackend::new("p2", "réponse p2"));
        let provider =
            LlmProvider::new(vec![p1.clone() as Arc<dyn ChatBackend>, p2.clone()]);

        let answer = provider.complete(&request()).await;
        assert_eq!(answer, "réponse p1");
        assert_eq!(p1.complete_call_count(), 1);
        assert_eq!(p2.complete_call_count(), 0);
    }

    #[tokio::test]
    async fn test_failover_to_second_backend() {
        let p1 = Arc::new(MockChatBackend::failing("p1"));
        let p2 = Arc::new(MockChatBackend::new("p2", "réponse p2"));
        let provider =
            LlmProvider::new(vec![p1.clone() as Arc<dyn ChatBackend>, p2.clone()]);

        let answer = provider.complete(&request()).await;
        assert_eq!(answer, "réponse p2");
        assert_eq!(provider.failure_count("p1"), 1);
        assert_eq!(provider.failure_count("p2"), 0);
    }

    #[tokio::test]
    async fn test_all_fail_yields_apology() {
        let p1 = Arc::new(MockChatBackend::failing("p1"));
        let provider = LlmProvider::new(vec![p1 as Arc<dyn ChatBackend>]);

        let answer = provider.complete(&request()).await;
        assert_eq!(answer, APOLOGY);

        assert!(matches!(
            provider.try_complete(&request()).await,
            Err(LlmError::AllBackendsFailed)
        ));
    }

    #[tokio::test]
    async fn test_stream_chunks_concatenate_to_reply() {
        let p1 = Arc::new(MockChatBackend::new("p1", "une réponse en plusieurs morceaux"));
        let provider = LlmProvider::new(vec![p1 as Arc<dyn ChatBackend>]);

        let mut stream = provider.complete_stream(&request()).await;
        let mut assembled = String::new();
        while let Some(chunk) = stream.next().await {
            assembled.push_str(&chunk.expect("chunk"));
        }
        assert_eq!(assembled, "une réponse en plusieurs morceaux");
    }

    #[tokio::test]
    async fn test_stream_all_fail_yields_single_apology_chunk() {
        let p1 = Arc::new(MockChatBackend::failing("p1"));
        let provider = LlmProvider::new(vec![p1 as Arc<dyn ChatBackend>]);

        let mut stream = provider.complete_stream(&request()).await;
        let first = stream.next().await.expect("one chunk").expect("ok");
        assert_eq!(first, APOLOGY);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_dropping_stream_closes_it() {
        let p1 = Arc::new(
            MockChatBackend::new("p1", "a b c")
                .with_chunk_delay(std::time::Duration::from_millis(5)),
        );
        let provider = LlmProvider::new(vec![p1.clone() as Arc<dyn ChatBackend>]);

        let mut stream = provider.complete_stream(&request()).await;
        let _ = stream.next().await;
        assert!(p1.stream_is_open());

        drop(stream);
        assert!(!p1.stream_is_open());
    }
}
