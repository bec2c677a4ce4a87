//! Qdrant-backed vector index client.

use qdrant_client::Qdrant;
use qdrant_client::qdrant::{Condition, Filter, ScrollPointsBuilder, SearchPointsBuilder};

use crate::lexical::CorpusDocument;
use crate::model::{FilterValue, Metadata, SearchFilters};

use super::error::VectorDbError;
use super::model::{VectorQueryResponse, payload_value_to_json};

/// Direct Qdrant client wrapper.
#[derive(Clone)]
pub struct QdrantIndex {
    client: std::sync::Arc<Qdrant>,
    url: String,
}

impl QdrantIndex {
    /// Creates a client for `url`.
    pub fn new(url: &str) -> Result<Self, VectorDbError> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| VectorDbError::ConnectionFailed {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client: std::sync::Arc::new(client),
            url: url.to_string(),
        })
    }

    /// Returns the configured URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Performs a basic health check request.
    pub async fn health_check(&self) -> Result<(), VectorDbError> {
        self.client
            .health_check()
            .await
            .map_err(|e| VectorDbError::ConnectionFailed {
                url: self.url.clone(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    /// Nearest-neighbor search, translated to the column-oriented contract.
    ///
    /// Qdrant reports cosine similarity; the contract speaks cosine
    /// distance, so scores are mapped through `d = 1 − s` and clamped to
    /// `[0, 2]`.
    pub async fn search(
        &self,
        collection: &str,
        query: Vec<f32>,
        filters: &SearchFilters,
        limit: usize,
    ) -> Result<VectorQueryResponse, VectorDbError> {
        let mut builder =
            SearchPointsBuilder::new(collection, query, limit as u64).with_payload(true);

        if let Some(filter) = build_filter(filters) {
            builder = builder.filter(filter);
        }

        let result = self.client.search_points(builder).await.map_err(|e| {
            VectorDbError::SearchFailed {
                collection: collection.to_string(),
                message: e.to_string(),
            }
        })?;

        let mut response = VectorQueryResponse::default();
        for point in result.result {
            let mut metadata: Metadata = point
                .payload
                .into_iter()
                .map(|(key, value)| (key, payload_value_to_json(value)))
                .collect();

            let Some(text) = metadata
                .remove("text")
                .and_then(|v| v.as_str().map(str::to_string))
            else {
                continue;
            };
            let Some(id) = metadata
                .get("document_id")
                .and_then(|v| v.as_str().map(str::to_string))
            else {
                continue;
            };

            response.ids.push(id);
            response.documents.push(text);
            response.metadatas.push(metadata);
            response
                .distances
                .push((1.0 - point.score).clamp(0.0, 2.0));
        }

        Ok(response)
    }

    /// Scrolls every document of a collection (bounded by `limit`), used to
    /// bootstrap the lexical index.
    pub async fn fetch_documents(
        &self,
        collection: &str,
        limit: usize,
    ) -> Result<Vec<CorpusDocument>, VectorDbError> {
        let builder = ScrollPointsBuilder::new(collection)
            .limit(limit as u32)
            .with_payload(true);

        let result = self.client.scroll(builder).await.map_err(|e| {
            VectorDbError::ScrollFailed {
                collection: collection.to_string(),
                message: e.to_string(),
            }
        })?;

        let documents = result
            .result
            .into_iter()
            .filter_map(|point| {
                let mut metadata: Metadata = point
                    .payload
                    .into_iter()
                    .map(|(key, value)| (key, payload_value_to_json(value)))
                    .collect();

                let text = metadata
                    .remove("text")
                    .and_then(|v| v.as_str().map(str::to_string))?;
                let id = metadata
                    .get("document_id")
                    .and_then(|v| v.as_str().map(str::to_string))?;

                Some(CorpusDocument { id, text, metadata })
            })
            .collect();

        Ok(documents)
    }
}

impl std::fmt::Debug for QdrantIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantIndex").field("url", &self.url).finish()
    }
}

fn build_filter(filters: &SearchFilters) -> Option<Filter> {
    if filters.is_empty() {
        return None;
    }

    let conditions: Vec<Condition> = filters
        .iter()
        .map(|(key, value)| match value {
            FilterValue::Int(n) => Condition::matches(key.clone(), *n),
            FilterValue::Text(s) => Condition::matches(key.clone(), s.clone()),
        })
        .collect();

    Some(Filter::must(conditions))
}
