use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use tower::ServiceExt;

use crate::cache::TieredCache;
use crate::config::{AssistantPersonality, RetrieverConfig};
use crate::constants::{DEFAULT_ANSWER_TTL, DEFAULT_EMBEDDING_TTL};
use crate::context::ContextBuilder;
use crate::embedding::{EmbeddingBackend, EmbeddingProvider, MockEmbeddingBackend};
use crate::intent::IntentClassifier;
use crate::lexical::LexicalIndex;
use crate::llm::{ChatBackend, LlmProvider, MockChatBackend};
use crate::metadata::{DocumentRecord, MetadataEnricher, MetadataStore, MockMetadataStore};
use crate::model::Metadata;
use crate::pipeline::{AnswerPipeline, PipelineConfig};
use crate::reformulate::QueryReformulator;
use crate::rerank::Reranker;
use crate::retriever::HybridRetriever;
use crate::vectordb::{MockChunk, MockVectorIndex, VectorIndexClient};

use super::{AppState, create_router};

fn test_router() -> (axum::Router, tempfile::TempDir) {
    test_router_with_metadata(None)
}

fn test_router_with_metadata(
    metadata: Option<Arc<dyn MetadataStore>>,
) -> (axum::Router, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");

    let chat = Arc::new(MockChatBackend::new("mock", "La réponse comptable."));
    let embedding = Arc::new(MockEmbeddingBackend::new(8));
    let query_vector = embedding.vector_for("amortissement");

    let mut chunk_metadata = Metadata::new();
    chunk_metadata.insert("document_type".to_string(), serde_json::json!("chapitre"));

    let vector: Arc<MockVectorIndex> = Arc::new(MockVectorIndex::new(vec![MockChunk {
        id: "doc-1".to_string(),
        text: "L'amortissement des immobilisations se pratique par annuités constantes. "
            .repeat(12),
        metadata: chunk_metadata,
        vector: query_vector,
    }]));

    let cache = Arc::new(TieredCache::new(
        16,
        DEFAULT_ANSWER_TTL,
        DEFAULT_EMBEDDING_TTL,
        None,
        None,
    ));
    let llm = Arc::new(LlmProvider::new(vec![chat as Arc<dyn ChatBackend>]));

    let retriever = Arc::new(HybridRetriever::new(
        Arc::new(LexicalIndex::new(dir.path())),
        vector.clone(),
        Arc::new(EmbeddingProvider::new(
            vec![embedding as Arc<dyn EmbeddingBackend>],
            8,
        )),
        Arc::clone(&cache),
        Arc::new(Reranker::disabled()),
        Arc::new(MetadataEnricher::disabled()),
        RetrieverConfig {
            default_corpus: "corpus".to_string(),
            boost_rules: Vec::new(),
        },
        DEFAULT_EMBEDDING_TTL,
    ));

    let pipeline = Arc::new(AnswerPipeline::new(
        retriever,
        Arc::clone(&llm),
        cache,
        IntentClassifier::new(Arc::clone(&llm), AssistantPersonality::default()),
        QueryReformulator::new(llm),
        ContextBuilder::default(),
        PipelineConfig {
            direct_reply_chunk_delay: std::time::Duration::ZERO,
            ..PipelineConfig::default()
        },
    ));

    let state = AppState::new(pipeline, vector as Arc<dyn VectorIndexClient>, metadata);
    (create_router(state), dir)
}

fn json_request(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.expect("body").to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn test_healthz() {
    let (router, _dir) = test_router();

    let response = router
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).expect("request"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_ready_reports_components() {
    let (router, _dir) = test_router();

    let response = router
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).expect("request"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["components"]["vectordb"], "ready");
    assert_eq!(body["components"]["shared_cache"], "disabled");
}

#[tokio::test]
async fn test_query_returns_answer() {
    let (router, _dir) = test_router();

    let response = router
        .oneshot(json_request(
            "/query",
            serde_json::json!({ "query": "comment amortir une immobilisation au bilan" }),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["answer"], "La réponse comptable.");
    assert_eq!(body["intent"], "technical");
    assert!(body["sources"].is_array());
    assert!(body["performance"]["total_time_seconds"].is_number());
}

#[tokio::test]
async fn test_empty_query_rejected() {
    let (router, _dir) = test_router();

    let response = router
        .oneshot(json_request("/query", serde_json::json!({ "query": "  " })))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_k_out_of_range_rejected() {
    let (router, _dir) = test_router();

    let response = router
        .oneshot(json_request(
            "/query",
            serde_json::json!({ "query": "le bilan", "n_results": 21 }),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_search_endpoint_returns_candidates() {
    let (router, _dir) = test_router();

    let response = router
        .oneshot(json_request(
            "/search",
            serde_json::json!({ "query": "amortissement des immobilisations", "n_results": 3 }),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["results"][0]["document_id"], "doc-1");
}

#[tokio::test]
async fn test_streamed_query_emits_sse_events() {
    let (router, _dir) = test_router();

    let response = router
        .oneshot(json_request(
            "/query",
            serde_json::json!({
                "query": "comment amortir une immobilisation au bilan",
                "stream": true
            }),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/event-stream"));

    let bytes = response.into_body().collect().await.expect("body").to_bytes();
    let body = String::from_utf8_lossy(&bytes);

    assert!(body.contains("event: start"));
    assert!(body.contains("event: progress"));
    assert!(body.contains("event: chunk"));
    assert!(body.contains("event: complete"));
    assert_eq!(body.matches("event: complete").count(), 1);
    assert!(!body.contains("event: error"));
}

#[tokio::test]
async fn test_documents_search_without_store_rejected() {
    let (router, _dir) = test_router();

    let response = router
        .oneshot(json_request(
            "/documents/search",
            serde_json::json!({ "article": "25" }),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_documents_search_by_hierarchy() {
    let record = DocumentRecord {
        id: uuid::Uuid::new_v4(),
        title: Some("Article 25".to_string()),
        document_type: Some("article".to_string()),
        collection: None,
        sub_collection: None,
        acte_uniforme: Some("AUDCIF".to_string()),
        livre: None,
        titre: None,
        partie: Some(2),
        chapitre: Some(5),
        section: None,
        sous_section: None,
        article: Some("25".to_string()),
        alinea: None,
        tags: None,
        status: Some("published".to_string()),
        version: Some(1),
        date_publication: None,
        date_revision: None,
        is_latest: true,
    };
    let store = Arc::new(MockMetadataStore::new(vec![record]));
    let (router, _dir) = test_router_with_metadata(Some(store as Arc<dyn MetadataStore>));

    let response = router
        .oneshot(json_request(
            "/documents/search",
            serde_json::json!({ "partie": 2, "article": "25" }),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body[0]["title"], "Article 25");
    assert_eq!(
        body[0]["hierarchy_display"],
        "AUDCIF > Partie 2 > Chapitre 5 > Article 25"
    );
}

#[tokio::test]
async fn test_cache_stats_endpoint() {
    let (router, _dir) = test_router();

    let response = router
        .oneshot(
            Request::builder()
                .uri("/cache/stats")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["hits"], 0);
    assert_eq!(body["shared_enabled"], false);
}

#[tokio::test]
async fn test_cache_clear_endpoint() {
    let (router, _dir) = test_router();

    let response = router
        .oneshot(json_request(
            "/cache/clear",
            serde_json::json!({ "namespace": "answers" }),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["cleared_shared_keys"], 0);
}
