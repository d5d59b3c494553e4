//! Collection naming and lifecycle.

use std::path::Path;
use std::sync::Arc;

use quarry_embed::Embedder;
use quarry_store::{CollectionSchema, VectorStore};

use crate::error::Result;

/// Collection name for a canonical codebase path:
/// `code_chunks_` + first 8 hex of md5(path).
///
/// Truncating md5 to 32 bits means two distinct codebases collide with
/// probability around n²/2³³ over n indexed paths (birthday bound),
/// roughly one in eight million at a thousand codebases. Accepted for a
/// per-user index.
#[must_use]
pub fn collection_name(canonical_path: &Path) -> String {
    let digest = md5::compute(canonical_path.to_string_lossy().as_bytes());
    let hex = format!("{digest:x}");
    format!("code_chunks_{}", &hex[..8])
}

/// Canonicalize `path` and derive its collection name.
///
/// # Errors
///
/// Returns an IO error if the path does not resolve.
pub fn canonical_collection_name(path: &Path) -> Result<String> {
    let canonical = std::fs::canonicalize(path)?;
    Ok(collection_name(&canonical))
}

/// Creates, drops, and describes per-codebase collections.
pub struct CollectionManager {
    store: Arc<dyn VectorStore>,
}

impl CollectionManager {
    #[must_use]
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }

    /// Ensure the collection exists, resolving the embedding dimension
    /// first for providers that probe lazily.
    ///
    /// # Errors
    ///
    /// Returns an error if the dimension probe or creation fails.
    pub async fn prepare<E: Embedder>(
        &self,
        name: &str,
        embedder: &E,
        has_sparse: bool,
    ) -> Result<CollectionSchema> {
        if self.store.has_collection(name).await? {
            return Ok(self.store.describe_collection(name).await?);
        }

        let dimension = embedder.ensure_dimension().await?;
        let schema = CollectionSchema {
            name: name.to_owned(),
            dimension,
            has_sparse,
            description: Some("quarry code chunks".to_owned()),
        };
        self.store.create_collection(schema.clone()).await?;
        tracing::info!(collection = name, dimension, has_sparse, "collection created");
        Ok(schema)
    }

    /// Drop the collection. Dropping a missing collection is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn drop(&self, name: &str) -> Result<()> {
        self.store.drop_collection(name).await?;
        Ok(())
    }

    /// Current schema of the collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection does not exist.
    pub async fn describe(&self, name: &str) -> Result<CollectionSchema> {
        Ok(self.store.describe_collection(name).await?)
    }
}

#[cfg(test)]
mod tests {
    use quarry_embed::MockEmbedder;
    use quarry_store::InMemoryVectorStore;

    use super::*;

    #[test]
    fn name_is_deterministic() {
        let a = collection_name(Path::new("/home/user/project"));
        let b = collection_name(Path::new("/home/user/project"));
        assert_eq!(a, b);
        assert!(a.starts_with("code_chunks_"));
        assert_eq!(a.len(), "code_chunks_".len() + 8);
    }

    #[test]
    fn different_paths_differ() {
        assert_ne!(
            collection_name(Path::new("/a/project")),
            collection_name(Path::new("/b/project"))
        );
    }

    #[test]
    fn canonicalization_makes_aliases_agree() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let direct = canonical_collection_name(dir.path()).unwrap();
        let via_dots = canonical_collection_name(&dir.path().join("sub").join("..")).unwrap();
        assert_eq!(direct, via_dots);
    }

    #[tokio::test]
    async fn prepare_probes_dimension_and_creates() {
        let store = Arc::new(InMemoryVectorStore::new());
        let manager = CollectionManager::new(store.clone());
        let embedder = MockEmbedder::new(48);

        let schema = manager.prepare("code_chunks_abc", &embedder, true).await.unwrap();
        assert_eq!(schema.dimension, 48);
        assert!(schema.has_sparse);

        // Second prepare reuses the existing collection.
        let again = manager.prepare("code_chunks_abc", &embedder, true).await.unwrap();
        assert_eq!(again, schema);
    }

    #[tokio::test]
    async fn drop_is_idempotent() {
        let store = Arc::new(InMemoryVectorStore::new());
        let manager = CollectionManager::new(store);
        manager.drop("code_chunks_missing").await.unwrap();
    }
}
