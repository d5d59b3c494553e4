//! In-memory reference implementation of [`VectorStore`].
//!
//! Backs the test suite and small offline runs. Implements the full
//! interface including hybrid search, so planner semantics can be
//! exercised without a running database. The requested
//! [`ConsistencyLevel`](crate::types::ConsistencyLevel) is accepted but
//! has no effect: a process-local store has a single replica, so every
//! level reads the same state.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::StoreError;
use crate::fusion;
use crate::store::{BoxFuture, Row, VectorStore};
use crate::types::{
    CollectionSchema, FieldFilter, HybridOptions, Ranker, ScoredDocument, SearchOptions,
    SparseVector, VectorDocument,
};

struct MemoryCollection {
    schema: CollectionSchema,
    documents: HashMap<String, VectorDocument>,
}

/// Process-local vector store.
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, MemoryCollection>>,
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Number of documents in a collection, for assertions in tests.
    #[must_use]
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .map(|cols| cols.get(collection).map_or(0, |c| c.documents.len()))
            .unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryVectorStore").finish_non_exhaustive()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Value of a string-typed payload field, if the field is string-typed.
fn string_field<'a>(doc: &'a VectorDocument, field: &str) -> Option<&'a str> {
    match field {
        "id" => Some(&doc.id),
        "content" => Some(&doc.content),
        "relative_path" => Some(&doc.relative_path),
        "file_extension" => Some(&doc.file_extension),
        "metadata" => Some(&doc.metadata),
        _ => None,
    }
}

fn output_value(doc: &VectorDocument, field: &str) -> Option<serde_json::Value> {
    if let Some(s) = string_field(doc, field) {
        return Some(serde_json::Value::String(s.to_owned()));
    }
    match field {
        "start_line" => Some(serde_json::json!(doc.start_line)),
        "end_line" => Some(serde_json::json!(doc.end_line)),
        _ => None,
    }
}

fn to_scored(doc: &VectorDocument, score: f32) -> ScoredDocument {
    ScoredDocument {
        id: doc.id.clone(),
        score,
        content: doc.content.clone(),
        relative_path: doc.relative_path.clone(),
        start_line: doc.start_line,
        end_line: doc.end_line,
        file_extension: doc.file_extension.clone(),
        metadata: doc.metadata.clone(),
    }
}

fn sort_hits(hits: &mut [ScoredDocument]) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.relative_path.cmp(&b.relative_path))
            .then_with(|| a.start_line.cmp(&b.start_line))
    });
}

impl InMemoryVectorStore {
    fn with_collection<T>(
        &self,
        name: &str,
        f: impl FnOnce(&MemoryCollection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let cols = self
            .collections
            .read()
            .map_err(|e| StoreError::Collection(e.to_string()))?;
        let col = cols
            .get(name)
            .ok_or_else(|| StoreError::MissingCollection(name.to_owned()))?;
        f(col)
    }

    /// Rank all documents by cosine similarity, descending.
    fn dense_ranked(col: &MemoryCollection, vector: &[f32]) -> Vec<(String, f32)> {
        let mut ranked: Vec<(String, f32)> = col
            .documents
            .values()
            .map(|doc| (doc.id.clone(), cosine_similarity(&doc.vector, vector)))
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked
    }

    /// Rank documents by sparse inner product, descending, dropping zeros.
    fn sparse_ranked(col: &MemoryCollection, query: &SparseVector) -> Vec<(String, f32)> {
        let mut ranked: Vec<(String, f32)> = col
            .documents
            .values()
            .filter_map(|doc| {
                let weights = doc.sparse.as_ref()?;
                let score = weights.dot(query);
                (score > 0.0).then(|| (doc.id.clone(), score))
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked
    }
}

impl VectorStore for InMemoryVectorStore {
    fn create_collection(&self, schema: CollectionSchema) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| StoreError::Collection(e.to_string()))?;
            cols.entry(schema.name.clone())
                .or_insert_with(|| MemoryCollection {
                    schema,
                    documents: HashMap::new(),
                });
            Ok(())
        })
    }

    fn drop_collection(&self, name: &str) -> BoxFuture<'_, Result<(), StoreError>> {
        let name = name.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| StoreError::Collection(e.to_string()))?;
            cols.remove(&name);
            Ok(())
        })
    }

    fn has_collection(&self, name: &str) -> BoxFuture<'_, Result<bool, StoreError>> {
        let name = name.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(|e| StoreError::Collection(e.to_string()))?;
            Ok(cols.contains_key(&name))
        })
    }

    fn describe_collection(
        &self,
        name: &str,
    ) -> BoxFuture<'_, Result<CollectionSchema, StoreError>> {
        let name = name.to_owned();
        Box::pin(async move { self.with_collection(&name, |col| Ok(col.schema.clone())) })
    }

    fn insert(
        &self,
        collection: &str,
        documents: Vec<VectorDocument>,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| StoreError::Collection(e.to_string()))?;
            let col = cols
                .get_mut(&collection)
                .ok_or_else(|| StoreError::MissingCollection(collection.clone()))?;
            for doc in documents {
                if doc.vector.len() != col.schema.dimension {
                    return Err(StoreError::DimensionMismatch {
                        collection,
                        expected: col.schema.dimension,
                        got: doc.vector.len(),
                    });
                }
                if doc.sparse.is_some() && !col.schema.has_sparse {
                    return Err(StoreError::Insert(format!(
                        "collection {collection} has no sparse field"
                    )));
                }
                col.documents.insert(doc.id.clone(), doc);
            }
            Ok(())
        })
    }

    fn delete(&self, collection: &str, ids: Vec<String>) -> BoxFuture<'_, Result<(), StoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| StoreError::Collection(e.to_string()))?;
            let col = cols
                .get_mut(&collection)
                .ok_or_else(|| StoreError::MissingCollection(collection))?;
            for id in &ids {
                col.documents.remove(id);
            }
            Ok(())
        })
    }

    fn query(
        &self,
        collection: &str,
        filter: FieldFilter,
        output_fields: Vec<String>,
    ) -> BoxFuture<'_, Result<Vec<Row>, StoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.with_collection(&collection, |col| {
                let mut rows = Vec::new();
                for doc in col.documents.values() {
                    let Some(value) = string_field(doc, &filter.field) else {
                        return Err(StoreError::Query(format!(
                            "filter field is not string-typed: {}",
                            filter.field
                        )));
                    };
                    if !filter.matches(value) {
                        continue;
                    }
                    let mut row = Row::new();
                    for field in &output_fields {
                        if let Some(v) = output_value(doc, field) {
                            row.insert(field.clone(), v);
                        }
                    }
                    rows.push(row);
                }
                Ok(rows)
            })
        })
    }

    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        options: SearchOptions,
    ) -> BoxFuture<'_, Result<Vec<ScoredDocument>, StoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.with_collection(&collection, |col| {
                let mut hits: Vec<ScoredDocument> = col
                    .documents
                    .values()
                    .map(|doc| to_scored(doc, cosine_similarity(&doc.vector, &vector)))
                    .filter(|hit| hit.score >= options.threshold)
                    .collect();
                sort_hits(&mut hits);
                hits.truncate(options.top_k);
                Ok(hits)
            })
        })
    }

    fn hybrid_search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        sparse: SparseVector,
        options: HybridOptions,
    ) -> BoxFuture<'_, Result<Vec<ScoredDocument>, StoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.with_collection(&collection, |col| {
                if !col.schema.has_sparse {
                    return Err(StoreError::Unsupported("hybrid_search"));
                }

                let mut dense = Self::dense_ranked(col, &vector);
                dense.truncate(options.top_k);
                let mut lexical = Self::sparse_ranked(col, &sparse);
                lexical.truncate(options.top_k);

                let fused = match options.ranker {
                    Ranker::Rrf { k } => fusion::reciprocal_rank_fusion(&dense, &lexical, k),
                    Ranker::Weighted {
                        dense: dw,
                        sparse: sw,
                    } => fusion::weighted_sum(&dense, &lexical, dw, sw),
                };

                let mut hits: Vec<ScoredDocument> = fused
                    .into_iter()
                    .filter(|(_, score)| *score >= options.threshold)
                    .filter_map(|(id, score)| {
                        col.documents.get(&id).map(|doc| to_scored(doc, score))
                    })
                    .collect();
                sort_hits(&mut hits);
                hits.truncate(options.top_k);
                Ok(hits)
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConsistencyLevel;

    fn schema(name: &str, dimension: usize, has_sparse: bool) -> CollectionSchema {
        CollectionSchema {
            name: name.into(),
            dimension,
            has_sparse,
            description: None,
        }
    }

    fn doc(id: &str, path: &str, vector: Vec<f32>) -> VectorDocument {
        VectorDocument {
            id: id.into(),
            vector,
            content: format!("content of {id}"),
            relative_path: path.into(),
            start_line: 1,
            end_line: 3,
            file_extension: "rs".into(),
            metadata: "{}".into(),
            sparse: None,
        }
    }

    #[tokio::test]
    async fn create_is_idempotent_and_keeps_documents() {
        let store = InMemoryVectorStore::new();
        store.create_collection(schema("c", 2, false)).await.unwrap();
        store
            .insert("c", vec![doc("a", "a.rs", vec![1.0, 0.0])])
            .await
            .unwrap();
        store.create_collection(schema("c", 2, false)).await.unwrap();
        assert_eq!(store.len("c"), 1);
    }

    #[tokio::test]
    async fn drop_missing_collection_is_clean() {
        let store = InMemoryVectorStore::new();
        store.drop_collection("absent").await.unwrap();
    }

    #[tokio::test]
    async fn insert_rejects_wrong_dimension() {
        let store = InMemoryVectorStore::new();
        store.create_collection(schema("c", 3, false)).await.unwrap();
        let result = store.insert("c", vec![doc("a", "a.rs", vec![1.0])]).await;
        assert!(matches!(result, Err(StoreError::DimensionMismatch { .. })));
    }

    #[tokio::test]
    async fn insert_same_id_replaces() {
        let store = InMemoryVectorStore::new();
        store.create_collection(schema("c", 2, false)).await.unwrap();
        store
            .insert("c", vec![doc("a", "a.rs", vec![1.0, 0.0])])
            .await
            .unwrap();
        store
            .insert("c", vec![doc("a", "a.rs", vec![0.0, 1.0])])
            .await
            .unwrap();
        assert_eq!(store.len("c"), 1);
    }

    #[tokio::test]
    async fn search_applies_threshold_and_order() {
        let store = InMemoryVectorStore::new();
        store.create_collection(schema("c", 2, false)).await.unwrap();
        store
            .insert(
                "c",
                vec![
                    doc("a", "a.rs", vec![1.0, 0.0]),
                    doc("b", "b.rs", vec![0.7, 0.7]),
                    doc("d", "d.rs", vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let hits = store
            .search(
                "c",
                vec![1.0, 0.0],
                SearchOptions {
                    top_k: 10,
                    threshold: 0.5,
                    consistency: ConsistencyLevel::default(),
                },
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "a");
        assert!(hits.iter().all(|h| h.score >= 0.5));
    }

    #[tokio::test]
    async fn query_filters_by_membership() {
        let store = InMemoryVectorStore::new();
        store.create_collection(schema("c", 2, false)).await.unwrap();
        store
            .insert(
                "c",
                vec![
                    doc("a", "src/a.rs", vec![1.0, 0.0]),
                    doc("b", "src/b.rs", vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let rows = store
            .query(
                "c",
                FieldFilter::equals("relative_path", "src/a.rs"),
                vec!["id".into(), "start_line".into()],
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], serde_json::json!("a"));
        assert_eq!(rows[0]["start_line"], serde_json::json!(1));
    }

    #[tokio::test]
    async fn query_rejects_numeric_filter_field() {
        let store = InMemoryVectorStore::new();
        store.create_collection(schema("c", 2, false)).await.unwrap();
        let result = store
            .query("c", FieldFilter::equals("start_line", "1"), vec!["id".into()])
            .await;
        assert!(matches!(result, Err(StoreError::Query(_))));
    }

    #[tokio::test]
    async fn hybrid_requires_sparse_schema() {
        let store = InMemoryVectorStore::new();
        store.create_collection(schema("c", 2, false)).await.unwrap();
        let result = store
            .hybrid_search(
                "c",
                vec![1.0, 0.0],
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

    #[tokio::test]
    async fn hybrid_boosts_sparse_matches() {
        let store = InMemoryVectorStore::new();
        store.create_collection(schema("c", 2, true)).await.unwrap();

        let mut with_terms = doc("a", "a.rs", vec![0.6, 0.8]);
        with_terms.sparse = Some([("connect".to_string(), 2.0)].into_iter().collect());
        let mut without_terms = doc("b", "b.rs", vec![0.7, 0.7]);
        without_terms.sparse = Some([("parse".to_string(), 1.0)].into_iter().collect());
        store
            .insert("c", vec![with_terms, without_terms])
            .await
            .unwrap();

        let query_sparse: SparseVector = [("connect".to_string(), 1.0)].into_iter().collect();
        let hits = store
            .hybrid_search(
                "c",
                vec![1.0, 0.0],
                query_sparse,
                HybridOptions {
                    top_k: 5,
                    threshold: 0.0,
                    ranker: Ranker::default(),
                    consistency: ConsistencyLevel::default(),
                },
            )
            .await
            .unwrap();
        assert_eq!(hits[0].id, "a");
    }

    #[tokio::test]
    async fn consistency_level_does_not_change_process_local_reads() {
        let store = InMemoryVectorStore::new();
        store.create_collection(schema("c", 2, false)).await.unwrap();
        store
            .insert(
                "c",
                vec![
                    doc("a", "a.rs", vec![1.0, 0.0]),
                    doc("b", "b.rs", vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let mut seen: Vec<Vec<String>> = Vec::new();
        for consistency in [
            ConsistencyLevel::Strong,
            ConsistencyLevel::Session,
            ConsistencyLevel::Bounded,
            ConsistencyLevel::Eventually,
        ] {
            let hits = store
                .search(
                    "c",
                    vec![1.0, 0.0],
                    SearchOptions {
                        top_k: 10,
                        threshold: -1.0,
                        consistency,
                    },
                )
                .await
                .unwrap();
            seen.push(hits.into_iter().map(|h| h.id).collect());
        }
        assert!(seen.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn missing_collection_errors() {
        let store = InMemoryVectorStore::new();
        let result = store
            .search(
                "absent",
                vec![1.0],
                SearchOptions {
                    top_k: 1,
                    threshold: 0.0,
                    consistency: ConsistencyLevel::default(),
                },
            )
            .await;
        assert!(matches!(result, Err(StoreError::MissingCollection(_))));
    }
}
