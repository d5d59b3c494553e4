//! Vector database interface and backends.
//!
//! The indexing core talks to any vector database through the
//! [`VectorStore`] trait. [`InMemoryVectorStore`] is the reference
//! implementation (and the test backend); a Qdrant adapter is available
//! behind the `qdrant` cargo feature.

pub mod error;
pub mod fusion;
pub mod memory;
#[cfg(feature = "qdrant")]
pub mod qdrant;
pub mod store;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryVectorStore;
#[cfg(feature = "qdrant")]
pub use qdrant::QdrantVectorStore;
pub use store::{BoxFuture, Row, VectorStore};
pub use types::{
    CollectionSchema, ConsistencyLevel, FieldFilter, HybridOptions, Ranker, ScoredDocument,
    SearchOptions, SparseVector, VectorDocument,
};
