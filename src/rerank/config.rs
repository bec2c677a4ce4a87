use std::path::PathBuf;

pub const MAX_SEQ_LEN: usize = 512;

#[derive(Debug, Clone, Default)]
pub struct RerankerConfig {
    /// Directory holding the cross-encoder checkpoint; `None` makes the
    /// reranker a no-op.
    pub model_path: Option<PathBuf>,
}

impl RerankerConfig {
    pub fn new<P: Into<PathBuf>>(model_path: P) -> Self {
        Self {
            model_path: Some(model_path.into()),
        }
    }

    /// A configuration with no model: reranking passes candidates through.
    pub fn disabled() -> Self {
        Self { model_path: None }
    }

    pub fn from_env() -> Self {
        let model_path = std::env::var("OHADEX_RERANKER_PATH")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        Self { model_path }
    }
}
