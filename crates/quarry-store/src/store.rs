//! The dyn-compatible [`VectorStore`] trait.

use std::collections::HashMap;
use std::pin::Pin;

use crate::error::StoreError;
use crate::types::{
    CollectionSchema, FieldFilter, HybridOptions, ScoredDocument, SearchOptions, SparseVector,
    VectorDocument,
};

/// Boxed future used to keep the trait object-safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One row returned by [`VectorStore::query`]: requested field → value.
pub type Row = HashMap<String, serde_json::Value>;

/// Capability interface over a vector database.
///
/// All operations take the collection name so a single client can serve
/// many codebases. `hybrid_search` has a default refusal; only backends
/// with a sparse field override it.
pub trait VectorStore: Send + Sync {
    /// Create a collection with the given schema.
    ///
    /// Creating a collection that already exists is a no-op.
    fn create_collection(&self, schema: CollectionSchema) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Drop a collection. Idempotent: dropping a missing collection
    /// returns cleanly.
    fn drop_collection(&self, name: &str) -> BoxFuture<'_, Result<(), StoreError>>;

    fn has_collection(&self, name: &str) -> BoxFuture<'_, Result<bool, StoreError>>;

    fn describe_collection(
        &self,
        name: &str,
    ) -> BoxFuture<'_, Result<CollectionSchema, StoreError>>;

    /// Bulk upsert. Documents with an existing id are replaced.
    fn insert(
        &self,
        collection: &str,
        documents: Vec<VectorDocument>,
    ) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Bulk delete by document id. Unknown ids are ignored.
    fn delete(&self, collection: &str, ids: Vec<String>) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Fetch `output_fields` of every document matching `filter`.
    fn query(
        &self,
        collection: &str,
        filter: FieldFilter,
        output_fields: Vec<String>,
    ) -> BoxFuture<'_, Result<Vec<Row>, StoreError>>;

    /// Dense cosine search.
    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        options: SearchOptions,
    ) -> BoxFuture<'_, Result<Vec<ScoredDocument>, StoreError>>;

    /// Dense + sparse search fused by the configured ranker.
    ///
    /// The default implementation refuses; backends whose collections
    /// carry a sparse field override it.
    fn hybrid_search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        sparse: SparseVector,
        options: HybridOptions,
    ) -> BoxFuture<'_, Result<Vec<ScoredDocument>, StoreError>> {
        let _ = (collection, vector, sparse, options);
        Box::pin(async { Err(StoreError::Unsupported("hybrid_search")) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConsistencyLevel, Ranker};

    struct DenseOnlyStore;

    impl VectorStore for DenseOnlyStore {
        fn create_collection(
            &self,
            _schema: CollectionSchema,
        ) -> BoxFuture<'_, Result<(), StoreError>> {
            Box::pin(async { Ok(()) })
        }

        fn drop_collection(&self, _name: &str) -> BoxFuture<'_, Result<(), StoreError>> {
            Box::pin(async { Ok(()) })
        }

        fn has_collection(&self, _name: &str) -> BoxFuture<'_, Result<bool, StoreError>> {
            Box::pin(async { Ok(false) })
        }

        fn describe_collection(
            &self,
            name: &str,
        ) -> BoxFuture<'_, Result<CollectionSchema, StoreError>> {
            let name = name.to_owned();
            Box::pin(async move { Err(StoreError::MissingCollection(name)) })
        }

        fn insert(
            &self,
            _collection: &str,
            _documents: Vec<VectorDocument>,
        ) -> BoxFuture<'_, Result<(), StoreError>> {
            Box::pin(async { Ok(()) })
        }

        fn delete(
            &self,
            _collection: &str,
            _ids: Vec<String>,
        ) -> BoxFuture<'_, Result<(), StoreError>> {
            Box::pin(async { Ok(()) })
        }

        fn query(
            &self,
            _collection: &str,
            _filter: FieldFilter,
            _output_fields: Vec<String>,
        ) -> BoxFuture<'_, Result<Vec<Row>, StoreError>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn search(
            &self,
            _collection: &str,
            _vector: Vec<f32>,
            _options: SearchOptions,
        ) -> BoxFuture<'_, Result<Vec<ScoredDocument>, StoreError>> {
            Box::pin(async { Ok(Vec::new()) })
        }
    }

    #[tokio::test]
    async fn hybrid_search_defaults_to_unsupported() {
        let store: Box<dyn VectorStore> = Box::new(DenseOnlyStore);
        let result = store
            .hybrid_search(
                "c",
                vec![0.0],
                SparseVector::default(),
                HybridOptions {
                    top_k: 5,
                    threshold: 0.0,
                    ranker: Ranker::default(),
                    consistency: ConsistencyLevel::default(),
                },
            )
            .await;
        assert!(matches!(result, Err(StoreError::Unsupported(_))));
    }
}
