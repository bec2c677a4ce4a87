use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
/// Errors returned by embedding generation and model loading.
pub enum EmbeddingError {
    /// Model files were not found.
    #[error("embedding model not found at path: {path}")]
    ModelNotFound {
        /// Missing model path.
        path: PathBuf,
    },

    /// Model load failed.
    #[error("failed to load embedding model: {reason}")]
    ModelLoadFailed {
        /// Error message.
        reason: String,
    },

    /// Requested compute device is unavailable.
    #[error("{device} device unavailable: {reason}")]
    DeviceUnavailable {
        /// Device name (e.g. "cuda", "metal").
        device: String,
        /// Error message.
        reason: String,
    },

    /// Inference failed.
    #[error("embedding inference failed: {reason}")]
    InferenceFailed {
        /// Error message.
        reason: String,
    },

    /// Tokenization failed.
    #[error("tokenization failed: {reason}")]
    TokenizationFailed {
        /// Error message.
        reason: String,
    },

    /// Remote backend call failed.
    #[error("embedding backend '{backend}' request failed: {reason}")]
    RequestFailed {
        /// Backend name.
        backend: String,
        /// Error message.
        reason: String,
    },

    /// The backend returned a vector of the wrong dimension.
    #[error("embedding dimension mismatch from '{backend}': expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Backend name.
        backend: String,
        /// Expected dimension.
        expected: usize,
        /// Actual dimension.
        actual: usize,
    },

    /// The backend is missing its API key or model configuration.
    #[error("embedding backend '{backend}' not usable: {reason}")]
    NotConfigured {
        /// Backend name.
        backend: String,
        /// Error message.
        reason: String,
    },
}

impl From<candle_core::Error> for EmbeddingError {
    fn from(err: candle_core::Error) -> Self {
        EmbeddingError::InferenceFailed {
            reason: err.to_string(),
        }
    }
}

impl From<std::io::Error> for EmbeddingError {
    fn from(err: std::io::Error) -> Self {
        EmbeddingError::ModelLoadFailed {
            reason: err.to_string(),
        }
    }
}
