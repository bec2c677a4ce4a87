//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A port value could not be parsed.
    #[error("invalid port value '{value}': {source}")]
    PortParseError {
        /// Offending value.
        value: String,
        /// Parse error.
        source: std::num::ParseIntError,
    },

    /// Port zero is not usable.
    #[error("port must be non-zero, got '{value}'")]
    InvalidPort {
        /// Offending value.
        value: String,
    },

    /// A bind address could not be parsed.
    #[error("invalid bind address '{value}': {source}")]
    InvalidBindAddr {
        /// Offending value.
        value: String,
        /// Parse error.
        source: std::net::AddrParseError,
    },

    /// An environment name was not recognized.
    #[error("unknown environment '{value}' (expected 'test' or 'production')")]
    UnknownEnvironment {
        /// Offending value.
        value: String,
    },

    /// A configured path does not exist.
    #[error("configured path not found: {path}")]
    PathNotFound {
        /// Missing path.
        path: PathBuf,
    },

    /// A configured path should be a directory.
    #[error("configured path is not a directory: {path}")]
    NotADirectory {
        /// Offending path.
        path: PathBuf,
    },

    /// A provider named in a priority list has no configuration block.
    #[error("provider '{provider}' appears in a priority list but is not configured")]
    UnknownProvider {
        /// Offending provider name.
        provider: String,
    },
}
