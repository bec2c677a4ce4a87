use thiserror::Error;

/// Errors returned by individual cache tiers.
///
/// Tier errors never escape [`crate::cache::TieredCache`]: they are logged
/// and the next tier is consulted. The type exists so tier constructors can
/// report connection problems at startup.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Could not reach the shared cache endpoint.
    #[error("shared cache unavailable at '{url}': {message}")]
    SharedUnavailable {
        /// Endpoint URL.
        url: String,
        /// Error message.
        message: String,
    },

    /// A shared cache command failed.
    #[error("shared cache command failed: {0}")]
    Command(#[from] redis::RedisError),

    /// Disk tier I/O failed.
    #[error("disk cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// A cached value could not be decoded.
    #[error("cached value could not be decoded: {reason}")]
    Decode {
        /// Error message.
        reason: String,
    },
}
