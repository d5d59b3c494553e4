//! Error types for vector store backends.

/// Errors that can occur during vector store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Backend unreachable or connection-level failure.
    #[error("connection error: {0}")]
    Connection(String),

    /// Collection create/drop/describe failure.
    #[error("collection error: {0}")]
    Collection(String),

    /// The named collection does not exist.
    #[error("collection not found: {0}")]
    MissingCollection(String),

    /// A document's vector length does not match the collection dimension.
    #[error("dimension mismatch in {collection}: expected {expected}, got {got}")]
    DimensionMismatch {
        collection: String,
        expected: usize,
        got: usize,
    },

    /// Bulk insert failure.
    #[error("insert error: {0}")]
    Insert(String),

    /// Delete failure.
    #[error("delete error: {0}")]
    Delete(String),

    /// Filter query failure.
    #[error("query error: {0}")]
    Query(String),

    /// Similarity search failure.
    #[error("search error: {0}")]
    Search(String),

    /// Payload (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Operation not supported by this backend.
    #[error("operation not supported by this backend: {0}")]
    Unsupported(&'static str),
}

impl StoreError {
    /// Whether a retry with backoff is worthwhile.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

/// Result type alias using `StoreError`.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_is_transient() {
        assert!(StoreError::Connection("refused".into()).is_transient());
    }

    #[test]
    fn unsupported_is_permanent() {
        assert!(!StoreError::Unsupported("hybrid_search").is_transient());
    }
}
