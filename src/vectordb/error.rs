use thiserror::Error;

#[derive(Debug, Error)]
/// Errors returned by vector index operations.
pub enum VectorDbError {
    /// Could not connect to the index endpoint.
    #[error("failed to connect to vector index at '{url}': {message}")]
    ConnectionFailed {
        /// Endpoint URL.
        url: String,
        /// Error message.
        message: String,
    },

    /// Search failed.
    #[error("failed to search in '{collection}': {message}")]
    SearchFailed {
        /// Collection name.
        collection: String,
        /// Error message.
        message: String,
    },

    /// Document scroll failed.
    #[error("failed to scroll documents from '{collection}': {message}")]
    ScrollFailed {
        /// Collection name.
        collection: String,
        /// Error message.
        message: String,
    },

    /// Query vector had the wrong dimension.
    #[error("invalid query vector dimension: expected {expected}, got {actual}")]
    InvalidDimension {
        /// Expected dimension.
        expected: usize,
        /// Actual dimension.
        actual: usize,
    },
}
