use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
/// Errors returned by the lexical index.
pub enum LexicalError {
    /// The corpus has no documents to index.
    #[error("no documents available for corpus '{corpus}'")]
    EmptyCorpus {
        /// Corpus name.
        corpus: String,
    },

    /// Fetching corpus documents from the backing store failed.
    #[error("failed to fetch documents for corpus '{corpus}': {reason}")]
    FetchFailed {
        /// Corpus name.
        corpus: String,
        /// Error message.
        reason: String,
    },

    /// Snapshot I/O failed.
    #[error("snapshot I/O failed for '{path}': {source}")]
    SnapshotIo {
        /// Snapshot path.
        path: PathBuf,
        /// I/O error.
        source: std::io::Error,
    },

    /// Snapshot bytes could not be decoded.
    #[error("snapshot at '{path}' could not be decoded: {reason}")]
    SnapshotCorrupt {
        /// Snapshot path.
        path: PathBuf,
        /// Error message.
        reason: String,
    },

    /// A background build task failed.
    #[error("index build task failed: {reason}")]
    BuildFailed {
        /// Error message.
        reason: String,
    },
}
