use thiserror::Error;

/// Errors returned by a single chat backend.
///
/// The provider chain treats every variant as "roll to the next backend";
/// the distinction only matters for logging.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The backend is missing its API key or model configuration.
    #[error("backend '{backend}' not usable: {reason}")]
    NotConfigured {
        /// Backend name.
        backend: String,
        /// Error message.
        reason: String,
    },

    /// The remote call failed (transport, auth, rate limit, timeout).
    #[error("backend '{backend}' request failed: {reason}")]
    RequestFailed {
        /// Backend name.
        backend: String,
        /// Error message.
        reason: String,
    },

    /// The backend answered but the payload carried no usable text.
    #[error("backend '{backend}' returned an empty completion")]
    EmptyCompletion {
        /// Backend name.
        backend: String,
    },

    /// Every backend in the priority list failed.
    #[error("all chat backends failed")]
    AllBackendsFailed,
}
