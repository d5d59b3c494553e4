//! Error types for embedding providers.

/// Errors that can occur while producing embeddings.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// Network-level failure talking to the provider.
    #[error("transport error: {0}")]
    Transport(String),

    /// Provider rejected the credentials.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Provider returned a response the client could not decode.
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    /// A returned vector did not match the provider's declared dimension.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Batch output length did not match input length.
    #[error("batch length mismatch: sent {sent}, received {received}")]
    BatchLengthMismatch { sent: usize, received: usize },

    /// Generic catch-all error.
    #[error("{0}")]
    Other(String),
}

impl EmbedError {
    /// Whether a retry with backoff is worthwhile.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Result type alias using `EmbedError`.
pub type Result<T> = std::result::Result<T, EmbedError>;
