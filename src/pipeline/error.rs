use thiserror::Error;

/// Request-level failures surfaced to the caller.
///
/// Backend trouble (providers, caches, indexes) is absorbed inside the
/// pipeline by fallback and degradation; only invalid input, deadline
/// expiry, client cancellation and genuine bugs escape.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The request was rejected before any work started.
    #[error("invalid input: {reason}")]
    InputInvalid {
        /// Error message.
        reason: String,
    },

    /// The per-request deadline expired.
    #[error("deadline exceeded after {seconds:.1}s")]
    DeadlineExceeded {
        /// Configured deadline, in seconds.
        seconds: f64,
    },

    /// The streaming sink disconnected; already-emitted chunks remain
    /// valid, no `complete` event follows.
    #[error("client disconnected, request cancelled")]
    Cancelled,

    /// A bug: an invariant the pipeline relies on was violated.
    #[error("internal invariant violated: {reason}")]
    Internal {
        /// Error message.
        reason: String,
    },
}
