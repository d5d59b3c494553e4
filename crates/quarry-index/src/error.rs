//! Error types for the indexing core.

use quarry_embed::EmbedError;
use quarry_store::StoreError;

/// Errors that can occur during indexing and retrieval operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// IO error reading source files or the snapshot.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration; aborts the call.
    #[error("configuration error: {0}")]
    Config(String),

    /// Embedding provider failure.
    #[error("embedding error: {0}")]
    Embed(#[from] EmbedError),

    /// Vector store failure.
    #[error("vector store error: {0}")]
    Store(#[from] StoreError),

    /// Tree-sitter parsing error.
    #[error("parse failed: {0}")]
    Parse(String),

    /// Snapshot persistence failure.
    #[error("snapshot error: {0}")]
    Snapshot(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Outbound call exceeded its deadline.
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: &'static str, secs: u64 },

    /// Another delta is running against the same codebase.
    #[error("snapshot locked: {0}")]
    Locked(String),

    /// Caller-requested abort.
    #[error("aborted by caller")]
    Aborted,
}

impl IndexError {
    /// Whether a retry with backoff is worthwhile.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Embed(e) => e.is_transient(),
            Self::Store(e) => e.is_transient(),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification_follows_source() {
        assert!(IndexError::Embed(EmbedError::Transport("t".into())).is_transient());
        assert!(IndexError::Store(StoreError::Connection("c".into())).is_transient());
        assert!(
            IndexError::Timeout {
                operation: "embed",
                secs: 60
            }
            .is_transient()
        );
        assert!(!IndexError::Config("bad".into()).is_transient());
        assert!(!IndexError::Aborted.is_transient());
    }
}
