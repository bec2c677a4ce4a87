use std::convert::Infallible;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, instrument, warn};

use crate::metadata::HierarchyQuery;
use crate::pipeline::{PipelineError, StreamEvent};

use super::error::GatewayError;
use super::payload::{
    ClearCacheBody, ClearCacheResponse, DocumentView, HierarchySearchBody, QueryBody, SearchBody,
    SearchResponse,
};
use super::state::AppState;

const STREAM_CHANNEL_CAPACITY: usize = 32;

/// `POST /query`: grounded answer, JSON or SSE depending on `stream`.
#[instrument(skip(state, body), fields(stream = body.stream, query_len = body.query.len()))]
pub async fn query_handler(
    State(state): State<AppState>,
    Json(body): Json<QueryBody>,
) -> Result<Response, GatewayError> {
    let stream_requested = body.stream;
    let request = body.into_search_request();

    if stream_requested {
        return Ok(stream_response(state, request).into_response());
    }

    let answer = state.pipeline.search(request).await?;
    Ok(Json(answer).into_response())
}

fn stream_response(
    state: AppState,
    request: crate::pipeline::SearchRequest,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send + 'static> {
    let (tx, rx) = tokio::sync::mpsc::channel(STREAM_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        match state.pipeline.search_stream(request, tx).await {
            Ok(_) => debug!("streamed response complete"),
            Err(PipelineError::Cancelled) => debug!("client disconnected mid-stream"),
            Err(e) => warn!(error = %e, "streamed response failed"),
        }
    });

    let events = ReceiverStream::new(rx).map(|event| Ok(to_sse_event(&event)));
    Sse::new(events)
}

fn to_sse_event(event: &StreamEvent) -> Event {
    match Event::default().event(event.name()).json_data(event.data()) {
        Ok(sse_event) => sse_event,
        Err(e) => {
            warn!(error = %e, "failed to serialize stream event");
            Event::default().comment("serialization-error")
        }
    }
}

/// `POST /search`: retrieval without generation.
#[instrument(skip(state, body), fields(query_len = body.query.len()))]
pub async fn search_handler(
    State(state): State<AppState>,
    Json(body): Json<SearchBody>,
) -> Result<Json<SearchResponse>, GatewayError> {
    let filters = body.filters();
    let results = state
        .pipeline
        .search_only(&body.query, &filters, body.n_results)
        .await?;

    Ok(Json(SearchResponse {
        query: body.query,
        count: results.len(),
        results,
    }))
}

/// `POST /documents/search`: exact-coordinate lookup against the
/// authoritative metadata store.
#[instrument(skip(state, body))]
pub async fn documents_search_handler(
    State(state): State<AppState>,
    Json(body): Json<HierarchySearchBody>,
) -> Result<Json<Vec<DocumentView>>, GatewayError> {
    let Some(store) = &state.metadata else {
        return Err(GatewayError::InvalidRequest {
            reason: "le référentiel de métadonnées n'est pas configuré".to_string(),
        });
    };

    let query = HierarchyQuery {
        acte_uniforme: body.acte_uniforme,
        partie: body.partie,
        chapitre: body.chapitre,
        section: body.section,
        article: body.article,
        limit: body.limit,
    };

    let records = store
        .search_by_hierarchy(&query)
        .await
        .map_err(|e| GatewayError::Internal {
            reason: e.to_string(),
        })?;

    Ok(Json(
        records
            .into_iter()
            .map(|record| DocumentView {
                id: record.id.to_string(),
                title: record.title.clone(),
                document_type: record.document_type.clone(),
                hierarchy_display: record.hierarchy_display(),
                citation: record.citation(),
            })
            .collect(),
    ))
}

/// `GET /cache/stats`.
pub async fn cache_stats_handler(State(state): State<AppState>) -> Response {
    Json(state.pipeline.cache().stats()).into_response()
}

/// `POST /cache/clear`.
#[instrument(skip(state))]
pub async fn cache_clear_handler(
    State(state): State<AppState>,
    Json(body): Json<ClearCacheBody>,
) -> Json<ClearCacheResponse> {
    let cleared = state.pipeline.cache().clear_namespace(body.namespace).await;
    Json(ClearCacheResponse {
        cleared_shared_keys: cleared,
    })
}

#[derive(serde::Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(serde::Serialize)]
pub struct ComponentStatus {
    pub http: &'static str,
    pub vectordb: &'static str,
    pub shared_cache: &'static str,
}

#[derive(serde::Serialize)]
pub struct ReadyResponse {
    pub status: &'static str,
    pub components: ComponentStatus,
}

/// `GET /healthz`: process liveness.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// `GET /ready`: dependency readiness.
#[instrument(skip(state))]
pub async fn ready_handler(State(state): State<AppState>) -> Response {
    let vectordb_ready = state.vector.health().await;
    let shared_enabled = state.pipeline.cache().stats().shared_enabled;

    let components = ComponentStatus {
        http: "ready",
        vectordb: if vectordb_ready { "ready" } else { "error" },
        shared_cache: if shared_enabled { "ready" } else { "disabled" },
    };

    let (status_code, status) = if vectordb_ready {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "pending")
    };

    (status_code, Json(ReadyResponse { status, components })).into_response()
}
