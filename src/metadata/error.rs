use thiserror::Error;

#[derive(Debug, Error)]
/// Errors returned by the metadata store.
pub enum MetadataError {
    /// Could not connect to the store.
    #[error("metadata store unavailable: {message}")]
    Unavailable {
        /// Error message.
        message: String,
    },

    /// A query failed.
    #[error("metadata query failed: {0}")]
    Query(#[from] sqlx::Error),
}
