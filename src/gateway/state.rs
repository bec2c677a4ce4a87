use std::sync::Arc;

use crate::metadata::MetadataStore;
use crate::pipeline::AnswerPipeline;
use crate::vectordb::VectorIndexClient;

/// Shared handler state: the pipeline plus the collaborators some
/// endpoints talk to directly.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AnswerPipeline>,
    pub vector: Arc<dyn VectorIndexClient>,
    pub metadata: Option<Arc<dyn MetadataStore>>,
}

impl AppState {
    pub fn new(
        pipeline: Arc<AnswerPipeline>,
        vector: Arc<dyn VectorIndexClient>,
        metadata: Option<Arc<dyn MetadataStore>>,
    ) -> Self {
        Self {
            pipeline,
            vector,
            metadata,
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("metadata_enabled", &self.metadata.is_some())
            .finish()
    }
}
