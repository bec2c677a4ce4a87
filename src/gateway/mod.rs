//! HTTP/SSE gateway (Axum).
//!
//! A thin adapter over the pipeline contract: `POST /query` serves JSON or
//! `text/event-stream` responses, `POST /search` exposes retrieval-only
//! results, plus health, readiness and cache maintenance endpoints.

mod error;
mod handler;
mod payload;
mod state;

#[cfg(test)]
mod handler_tests;

pub use error::GatewayError;
pub use payload::{ClearCacheBody, HierarchySearchBody, QueryBody, SearchBody, SearchResponse};
pub use state::AppState;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Builds the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(handler::health_handler))
        .route("/ready", get(handler::ready_handler))
        .route("/query", post(handler::query_handler))
        .route("/search", post(handler::search_handler))
        .route("/documents/search", post(handler::documents_search_handler))
        .route("/cache/stats", get(handler::cache_stats_handler))
        .route("/cache/clear", post(handler::cache_clear_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
