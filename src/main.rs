//! Ohadex HTTP server entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mimalloc::MiMalloc;
use tokio::net::TcpListener;
use tokio::signal;

use ohadex::cache::{DiskCache, SharedCache, TieredCache};
use ohadex::config::Config;
use ohadex::context::ContextBuilder;
use ohadex::embedding::{
    EmbeddingBackend, EmbeddingProvider, LocalEmbeddingBackend, RemoteEmbeddingBackend,
};
use ohadex::gateway::{AppState, create_router};
use ohadex::intent::IntentClassifier;
use ohadex::llm::{ChatBackend, LlmProvider, OpenAiChatBackend};
use ohadex::metadata::{MetadataEnricher, PostgresMetadataStore};
use ohadex::pipeline::{AnswerPipeline, PipelineConfig};
use ohadex::reformulate::QueryReformulator;
use ohadex::rerank::{Reranker, RerankerConfig};
use ohadex::retriever::HybridRetriever;
use ohadex::vectordb::{QdrantIndex, VectorIndexClient};
use ohadex::{LexicalIndex, MetadataStore};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::args().any(|arg| arg == "--health-check") {
        std::process::exit(run_health_check());
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    config.validate()?;
    let addr: SocketAddr = config.socket_addr().parse()?;

    tracing::info!(
        environment = ?config.environment,
        bind_addr = %config.bind_addr,
        port = config.port,
        "Ohadex starting"
    );

    // Cache tiers. Both outer tiers are optional; their absence only costs
    // hit rate.
    let shared = match &config.cache.redis_url {
        Some(url) => match SharedCache::connect(url).await {
            Ok(shared) => Some(shared),
            Err(e) => {
                tracing::warn!(error = %e, "shared cache unavailable, running without it");
                None
            }
        },
        None => None,
    };

    let disk = match &config.cache.embedding_cache_dir {
        Some(dir) => match DiskCache::open(dir) {
            Ok(disk) => Some(disk),
            Err(e) => {
                tracing::warn!(error = %e, "disk cache unavailable, running without it");
                None
            }
        },
        None => None,
    };

    let cache = Arc::new(TieredCache::new(
        config.cache.embedding_capacity,
        config.cache.answer_ttl,
        config.cache.embedding_ttl,
        shared,
        disk,
    ));

    // Chat backends in priority order.
    let mut chat_backends: Vec<Arc<dyn ChatBackend>> = Vec::new();
    for name in &config.providers.priority {
        if let Some(provider) = config.providers.get(name)
            && let Some(backend) = OpenAiChatBackend::from_provider(name, provider)
        {
            chat_backends.push(Arc::new(backend));
        }
    }
    if chat_backends.is_empty() {
        tracing::warn!("no usable chat backend configured, answers will degrade");
    }
    let llm = Arc::new(LlmProvider::new(chat_backends));

    // Embedding backends in priority order; the local model loads eagerly.
    let dimension = config.embedding_dimension();
    let mut embedding_backends: Vec<Arc<dyn EmbeddingBackend>> = Vec::new();
    for name in &config.providers.embedding_priority {
        let Some(provider) = config.providers.get(name) else {
            continue;
        };

        if provider.local {
            match &config.local_model_path {
                Some(path) => match LocalEmbeddingBackend::load(path, dimension) {
                    Ok(backend) => embedding_backends.push(Arc::new(backend)),
                    Err(e) => {
                        tracing::warn!(error = %e, "local embedder unavailable, skipping")
                    }
                },
                None => {
                    tracing::warn!("no OHADEX_LOCAL_MODEL_PATH configured, skipping local embedder")
                }
            }
        } else if let Some(backend) = RemoteEmbeddingBackend::from_provider(name, provider) {
            embedding_backends.push(Arc::new(backend));
        }
    }
    let embeddings = Arc::new(EmbeddingProvider::new(embedding_backends, dimension));

    let vector: Arc<dyn VectorIndexClient> = Arc::new(QdrantIndex::new(&config.qdrant_url)?);

    let metadata_store: Option<Arc<dyn MetadataStore>> = match &config.database_url {
        Some(url) => match PostgresMetadataStore::connect(url).await {
            Ok(store) => {
                tracing::info!("metadata enrichment enabled");
                Some(Arc::new(store) as Arc<dyn MetadataStore>)
            }
            Err(e) => {
                tracing::warn!(error = %e, "metadata store unavailable, enrichment disabled");
                None
            }
        },
        None => None,
    };

    let enricher = match &metadata_store {
        Some(store) => MetadataEnricher::new(Arc::clone(store)),
        None => MetadataEnricher::disabled(),
    };

    let reranker = Arc::new(Reranker::new(RerankerConfig {
        model_path: config.reranker_path.clone(),
    }));

    let retriever = Arc::new(HybridRetriever::new(
        Arc::new(LexicalIndex::new(config.bm25_cache_dir.clone())),
        Arc::clone(&vector),
        embeddings,
        Arc::clone(&cache),
        reranker,
        Arc::new(enricher),
        config.retriever.clone(),
        config.cache.embedding_ttl,
    ));

    let pipeline = Arc::new(AnswerPipeline::new(
        retriever,
        Arc::clone(&llm),
        cache,
        IntentClassifier::new(Arc::clone(&llm), config.personality.clone()),
        QueryReformulator::new(llm),
        ContextBuilder::default(),
        PipelineConfig {
            deadline: config.deadline,
            answer_ttl: config.cache.answer_ttl,
            ..PipelineConfig::default()
        },
    ));

    let app = create_router(AppState::new(pipeline, vector, metadata_store));

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Ohadex shutdown complete");
    Ok(())
}

fn run_health_check() -> i32 {
    let port = std::env::var("OHADEX_PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(8080);

    let url = format!("http://127.0.0.1:{}/healthz", port);

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build runtime");

    rt.block_on(async {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(1))
            .build()
            .expect("failed to build client");

        match client.get(&url).send().await {
            Ok(res) if res.status().is_success() => 0,
            _ => 1,
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
