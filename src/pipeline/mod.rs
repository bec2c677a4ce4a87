//! Top-level answer pipeline.
//!
//! One request moves through a fixed phase sequence: cache check, intent
//! classification, optional direct reply, optional reformulation, hybrid
//! retrieval, context building, generation, source preparation, cache
//! write. Phase failures degrade (original query, empty context,
//! LLM-only answering, apology text) rather than abort; only invalid
//! input and deadline expiry surface as errors. Phase timings are recorded
//! into the response on every path.

mod error;
mod events;

pub use error::PipelineError;
pub use events::{EventSink, ProgressStatus, StreamEvent};

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tracing::{debug, info, instrument, warn};

use crate::cache::TieredCache;
use crate::constants;
use crate::context::ContextBuilder;
use crate::intent::{Intent, IntentClassifier};
use crate::llm::{APOLOGY, ChatRequest, LlmProvider};
use crate::model::{RetrievalCandidate, ScoredAnswer, SearchFilters};
use crate::reformulate::QueryReformulator;
use crate::retriever::HybridRetriever;

const GENERATION_SYSTEM_PROMPT: &str =
    "Vous êtes un expert-comptable OHADA. Analysez et répondez en une seule étape.";

const GENERAL_KNOWLEDGE_SYSTEM_PROMPT: &str =
    "Vous êtes un expert-comptable OHADA. Répondez de façon claire et structurée.";

/// Context shorter than this is treated as empty and answering falls back
/// to general knowledge.
const MIN_CONTEXT_CHARS: usize = 500;

/// Pipeline tuning knobs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub deadline: Duration,
    pub answer_ttl: Duration,
    pub generation_max_tokens: u32,
    pub generation_temperature: f32,
    /// Pacing between re-streamed slices of a direct reply.
    pub direct_reply_chunk_delay: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            deadline: constants::DEFAULT_DEADLINE,
            answer_ttl: constants::DEFAULT_ANSWER_TTL,
            generation_max_tokens: 1500,
            generation_temperature: 0.4,
            direct_reply_chunk_delay: Duration::from_millis(20),
        }
    }
}

/// One search request.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub filters: SearchFilters,
    pub k: usize,
    pub include_sources: bool,
    pub cache_ok: bool,
}

impl SearchRequest {
    /// A request with default parameters.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            filters: SearchFilters::new(),
            k: constants::DEFAULT_RESULTS,
            include_sources: true,
            cache_ok: true,
        }
    }

    fn validate(&self) -> Result<(), PipelineError> {
        if self.query.trim().is_empty() {
            return Err(PipelineError::InputInvalid {
                reason: "query must not be empty".to_string(),
            });
        }
        if self.k < constants::MIN_RESULTS || self.k > constants::MAX_RESULTS {
            return Err(PipelineError::InputInvalid {
                reason: format!(
                    "k must be between {} and {}, got {}",
                    constants::MIN_RESULTS,
                    constants::MAX_RESULTS,
                    self.k
                ),
            });
        }
        Ok(())
    }
}

/// The top-level orchestrator.
pub struct AnswerPipeline {
    retriever: Arc<HybridRetriever>,
    llm: Arc<LlmProvider>,
    cache: Arc<TieredCache>,
    classifier: IntentClassifier,
    reformulator: QueryReformulator,
    context: ContextBuilder,
    config: PipelineConfig,
}

impl AnswerPipeline {
    pub fn new(
        retriever: Arc<HybridRetriever>,
        llm: Arc<LlmProvider>,
        cache: Arc<TieredCache>,
        classifier: IntentClassifier,
        reformulator: QueryReformulator,
        context: ContextBuilder,
        config: PipelineConfig,
    ) -> Self {
        Self {
            retriever,
            llm,
            cache,
            classifier,
            reformulator,
            context,
            config,
        }
    }

    /// Access to the cache cascade (statistics, namespace clearing).
    pub fn cache(&self) -> &Arc<TieredCache> {
        &self.cache
    }

    /// Full search: retrieval, generation and sources in one response.
    #[instrument(skip(self, request), fields(query_len = request.query.len(), k = request.k))]
    pub async fn search(&self, request: SearchRequest) -> Result<ScoredAnswer, PipelineError> {
        request.validate()?;

        let deadline = self.config.deadline;
        match tokio::time::timeout(deadline, self.run_search(request)).await {
            Ok(answer) => Ok(answer),
            Err(_) => Err(PipelineError::DeadlineExceeded {
                seconds: deadline.as_secs_f64(),
            }),
        }
    }

    /// Retrieval without generation.
    #[instrument(skip(self, query, filters), fields(query_len = query.len(), k))]
    pub async fn search_only(
        &self,
        query: &str,
        filters: &SearchFilters,
        k: usize,
    ) -> Result<Vec<RetrievalCandidate>, PipelineError> {
        let request = SearchRequest {
            query: query.to_string(),
            filters: filters.clone(),
            k,
            include_sources: false,
            cache_ok: false,
        };
        request.validate()?;

        let reformulated = self.reformulator.reformulate(query).await;
        Ok(self
            .retriever
            .search_hybrid(&reformulated, filters, k, true)
            .await)
    }

    /// Streaming search: typed events to `sink`, final answer returned.
    ///
    /// When `sink` disconnects, the underlying LLM stream is dropped
    /// (closing the connection) and no `complete` event is emitted.
    #[instrument(skip(self, request, sink), fields(query_len = request.query.len(), k = request.k))]
    pub async fn search_stream(
        &self,
        request: SearchRequest,
        sink: EventSink,
    ) -> Result<ScoredAnswer, PipelineError> {
        request.validate()?;

        let deadline = self.config.deadline;
        match tokio::time::timeout(deadline, self.run_stream(request, sink.clone())).await {
            Ok(result) => result,
            Err(_) => {
                let _ = sink
                    .try_send(StreamEvent::Error {
                        message: "délai de traitement dépassé".to_string(),
                    })
                    .ok();
                Err(PipelineError::DeadlineExceeded {
                    seconds: deadline.as_secs_f64(),
                })
            }
        }
    }

    async fn run_search(&self, request: SearchRequest) -> ScoredAnswer {
        let start = Instant::now();

        if request.cache_ok
            && let Some(mut cached) = self.cache.get_answer(&request.query, &request.filters).await
        {
            info!("answer served from cache");
            cached.performance.total_time_seconds = start.elapsed().as_secs_f64();
            return cached;
        }

        let mut answer = ScoredAnswer::new(&request.query);

        let intent_start = Instant::now();
        let analysis = self.classifier.classify(&request.query).await;
        answer.performance.intent_time_seconds = Some(intent_start.elapsed().as_secs_f64());
        answer.intent = Some(analysis.intent.as_str().to_string());

        if analysis.intent != Intent::Technical && !analysis.needs_knowledge_base {
            if let Some(reply) = self.classifier.direct_reply(&analysis, &request.query).await {
                info!(intent = analysis.intent.as_str(), "direct reply served");
                answer.answer = reply;
                answer.performance.total_time_seconds = start.elapsed().as_secs_f64();
                return answer;
            }
            debug!("direct reply unavailable, continuing with retrieval");
        }

        let reformulation_start = Instant::now();
        let reformulated = self.reformulator.reformulate(&request.query).await;
        answer.performance.reformulation_time_seconds =
            Some(reformulation_start.elapsed().as_secs_f64());

        let search_start = Instant::now();
        let results = self
            .retriever
            .search_hybrid(&reformulated, &request.filters, request.k, true)
            .await;
        answer.performance.search_time_seconds = Some(search_start.elapsed().as_secs_f64());

        let context_start = Instant::now();
        let context = self.context.build_context(&results);
        answer.performance.context_time_seconds = Some(context_start.elapsed().as_secs_f64());

        let generation_start = Instant::now();
        answer.answer = self
            .llm
            .complete(&self.generation_request(&request.query, &context))
            .await;
        answer.performance.generation_time_seconds = Some(generation_start.elapsed().as_secs_f64());

        if request.include_sources {
            answer.sources = Some(self.context.prepare_sources(&results));
        }

        answer.performance.total_time_seconds = start.elapsed().as_secs_f64();
        self.write_answer_cache(&request, &answer).await;
        answer
    }

    async fn run_stream(
        &self,
        request: SearchRequest,
        sink: EventSink,
    ) -> Result<ScoredAnswer, PipelineError> {
        let start = Instant::now();
        let mut answer = ScoredAnswer::new(&request.query);

        send(
            &sink,
            StreamEvent::Start {
                id: answer.id,
                query: answer.query.clone(),
                timestamp: answer.timestamp,
            },
        )
        .await?;

        if request.cache_ok
            && let Some(mut cached) = self.cache.get_answer(&request.query, &request.filters).await
        {
            info!("streamed answer served from cache");
            cached.performance.total_time_seconds = start.elapsed().as_secs_f64();
            send(&sink, StreamEvent::Complete(Box::new(cached.clone()))).await?;
            return Ok(cached);
        }

        send(
            &sink,
            StreamEvent::Progress {
                status: ProgressStatus::AnalyzingIntent,
                completion: 0.05,
            },
        )
        .await?;

        let intent_start = Instant::now();
        let analysis = self.classifier.classify(&request.query).await;
        answer.performance.intent_time_seconds = Some(intent_start.elapsed().as_secs_f64());
        answer.intent = Some(analysis.intent.as_str().to_string());

        if analysis.intent != Intent::Technical && !analysis.needs_knowledge_base {
            if let Some(reply) = self.classifier.direct_reply(&analysis, &request.query).await {
                self.stream_direct_reply(&sink, &reply).await?;
                answer.answer = reply;
                answer.performance.total_time_seconds = start.elapsed().as_secs_f64();
                send(&sink, StreamEvent::Complete(Box::new(answer.clone()))).await?;
                return Ok(answer);
            }
        }

        let reformulation_start = Instant::now();
        let reformulated = self.reformulator.reformulate(&request.query).await;
        answer.performance.reformulation_time_seconds =
            Some(reformulation_start.elapsed().as_secs_f64());

        send(
            &sink,
            StreamEvent::Progress {
                status: ProgressStatus::Retrieving,
                completion: 0.1,
            },
        )
        .await?;

        let search_start = Instant::now();
        let results = self
            .retriever
            .search_hybrid(&reformulated, &request.filters, request.k, true)
            .await;
        answer.performance.search_time_seconds = Some(search_start.elapsed().as_secs_f64());

        send(
            &sink,
            StreamEvent::Progress {
                status: ProgressStatus::Analyzing,
                completion: 0.3,
            },
        )
        .await?;

        let context_start = Instant::now();
        let context = self.context.build_context(&results);
        answer.performance.context_time_seconds = Some(context_start.elapsed().as_secs_f64());

        send(
            &sink,
            StreamEvent::Progress {
                status: ProgressStatus::Generating,
                completion: 0.4,
            },
        )
        .await?;

        let generation_start = Instant::now();
        let mut stream = self
            .llm
            .complete_stream(&self.generation_request(&request.query, &context))
            .await;

        let mut assembled = String::new();
        let mut completion = 0.4_f32;
        while let Some(chunk) = stream.next().await {
            let text = match chunk {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "stream interrupted mid-generation");
                    break;
                }
            };

            assembled.push_str(&text);
            completion = (completion + 0.01).min(0.9);
            send(&sink, StreamEvent::Chunk { text, completion }).await?;
        }
        drop(stream);
        answer.performance.generation_time_seconds = Some(generation_start.elapsed().as_secs_f64());

        answer.answer = assembled;
        if request.include_sources {
            answer.sources = Some(self.context.prepare_sources(&results));
        }
        answer.performance.total_time_seconds = start.elapsed().as_secs_f64();

        self.write_answer_cache(&request, &answer).await;
        send(&sink, StreamEvent::Complete(Box::new(answer.clone()))).await?;
        Ok(answer)
    }

    /// Re-streams an already-complete direct reply in ~20 slices so the
    /// client experience matches generated answers.
    async fn stream_direct_reply(&self, sink: &EventSink, reply: &str) -> Result<(), PipelineError> {
        send(
            sink,
            StreamEvent::Progress {
                status: ProgressStatus::DirectResponse,
                completion: 0.5,
            },
        )
        .await?;

        let chars: Vec<char> = reply.chars().collect();
        if chars.is_empty() {
            return Ok(());
        }

        let chunk_size = (chars.len() / 20).max(10);
        let mut emitted = 0usize;

        for slice in chars.chunks(chunk_size) {
            emitted += slice.len();
            let completion = 0.5 + 0.4 * (emitted as f32 / chars.len() as f32);
            send(
                sink,
                StreamEvent::Chunk {
                    text: slice.iter().collect(),
                    completion,
                },
            )
            .await?;

            if !self.config.direct_reply_chunk_delay.is_zero() {
                tokio::time::sleep(self.config.direct_reply_chunk_delay).await;
            }
        }

        Ok(())
    }

    fn generation_request(&self, query: &str, context: &str) -> ChatRequest {
        if context.len() < MIN_CONTEXT_CHARS {
            debug!(context_len = context.len(), "context too thin, answering from general knowledge");
            return ChatRequest::new(
                GENERAL_KNOWLEDGE_SYSTEM_PROMPT,
                general_knowledge_prompt(query),
                self.config.generation_max_tokens,
                self.config.generation_temperature,
            );
        }

        ChatRequest::new(
            GENERATION_SYSTEM_PROMPT,
            grounded_prompt(query, context),
            self.config.generation_max_tokens,
            self.config.generation_temperature,
        )
    }

    async fn write_answer_cache(&self, request: &SearchRequest, answer: &ScoredAnswer) {
        // Degraded answers would poison the cache for the TTL window.
        if answer.answer == APOLOGY || answer.answer.is_empty() {
            return;
        }

        self.cache
            .put_answer(&request.query, &request.filters, answer, self.config.answer_ttl)
            .await;
    }
}

impl std::fmt::Debug for AnswerPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnswerPipeline")
            .field("deadline", &self.config.deadline)
            .finish()
    }
}

async fn send(sink: &EventSink, event: StreamEvent) -> Result<(), PipelineError> {
    sink.send(event).await.map_err(|_| PipelineError::Cancelled)
}

fn grounded_prompt(query: &str, context: &str) -> String {
    format!(
        "Vous êtes un expert-comptable OHADA. Analysez le contexte fourni et répondez à la \
         question de manière structurée.\n\n\
         CONTEXTE DISPONIBLE:\n{context}\n\n\
         QUESTION:\n{query}\n\n\
         INSTRUCTIONS:\n\
         1. Analysez le contexte pour identifier les informations pertinentes\n\
         2. Repérez les concepts clés, règles et procédures comptables applicables\n\
         3. Structurez votre réponse de façon claire et pédagogique\n\
         4. Citez les articles/comptes/sections pertinents si présents dans le contexte\n\
         5. Soyez précis et concis\n\n\
         CONTRAINTES DE FORMATAGE:\n\
         - N'utilisez PAS de notation mathématique LaTeX\n\
         - N'utilisez PAS de formules entre crochets\n\
         - Écrivez les formules en texte simple: \"Montant = Base × Taux\"\n\
         - Utilisez des listes à puces si nécessaire pour la clarté\n\n\
         Réponse:"
    )
}

fn general_knowledge_prompt(query: &str) -> String {
    format!(
        "Question: {query}\n\n\
         En tant qu'expert-comptable OHADA, répondez à cette question de manière structurée:\n\n\
         Instructions:\n\
         1. Identifiez le sujet principal de la question\n\
         2. Fournissez une réponse claire et pédagogique\n\
         3. Utilisez votre expertise du plan comptable OHADA\n\
         4. Structurez votre réponse avec des paragraphes clairs\n\n\
         IMPORTANT:\n\
         - N'utilisez PAS de notation mathématique LaTeX ou formules entre crochets\n\
         - Écrivez les formules en texte simple: \"Montant = Base × Taux\" ou \"A / B\"\n\n\
         Réponse:"
    )
}
