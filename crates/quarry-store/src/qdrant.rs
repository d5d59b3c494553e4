//! Qdrant adapter for [`VectorStore`].
//!
//! Document ids are strings (`chunk_<hex>`), but Qdrant point ids must
//! be UUIDs or integers; the adapter derives a UUIDv5 from each
//! document id so upserts stay idempotent. Sparse weights are persisted
//! in the payload and hybrid search re-scores dense candidates
//! client-side before fusion.

use std::collections::HashMap;
use std::sync::RwLock;

use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder, DeletePointsBuilder,
    Distance, FieldType, Filter, PointId, PointStruct, ReadConsistency, ReadConsistencyType,
    ScoredPoint, ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder,
    VectorParamsBuilder, read_consistency, value::Kind, vectors_config::Config as VectorsKind,
};
use uuid::Uuid;

use crate::error::StoreError;
use crate::fusion;
use crate::store::{BoxFuture, Row, VectorStore};
use crate::types::{
    CollectionSchema, ConsistencyLevel, FieldFilter, HybridOptions, Ranker, ScoredDocument,
    SearchOptions, SparseVector, VectorDocument,
};

/// How many dense candidates are pulled per requested hit when
/// re-scoring for hybrid search.
const HYBRID_CANDIDATE_FACTOR: usize = 4;

/// Translate the requested consistency level into Qdrant's read
/// consistency. Qdrant has no session reads, so `Session` keeps the
/// client default; `Eventually` reads a single replica.
fn read_consistency_for(level: ConsistencyLevel) -> Option<ReadConsistency> {
    let value = match level {
        ConsistencyLevel::Strong => {
            read_consistency::Value::Type(ReadConsistencyType::All as i32)
        }
        ConsistencyLevel::Bounded => {
            read_consistency::Value::Type(ReadConsistencyType::Quorum as i32)
        }
        ConsistencyLevel::Eventually => read_consistency::Value::Factor(1),
        ConsistencyLevel::Session => return None,
    };
    Some(ReadConsistency { value: Some(value) })
}

/// Qdrant-backed vector store.
pub struct QdrantVectorStore {
    client: Qdrant,
    /// Schemas seen by this process. `describe_collection` falls back to
    /// the server when a name is missing here.
    schemas: RwLock<HashMap<String, CollectionSchema>>,
}

impl std::fmt::Debug for QdrantVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantVectorStore").finish_non_exhaustive()
    }
}

impl QdrantVectorStore {
    /// Connect to a Qdrant instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be created.
    pub fn new(url: &str) -> Result<Self, StoreError> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            schemas: RwLock::new(HashMap::new()),
        })
    }

    fn point_id(document_id: &str) -> String {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, document_id.as_bytes()).to_string()
    }

    fn cache_schema(&self, schema: CollectionSchema) {
        if let Ok(mut schemas) = self.schemas.write() {
            schemas.insert(schema.name.clone(), schema);
        }
    }

    fn cached_schema(&self, name: &str) -> Option<CollectionSchema> {
        self.schemas.read().ok()?.get(name).cloned()
    }

    fn filter_for(filter: &FieldFilter) -> Filter {
        if filter.any_of.len() == 1 {
            Filter::must(vec![Condition::matches(
                filter.field.clone(),
                filter.any_of[0].clone(),
            )])
        } else {
            Filter::should(
                filter
                    .any_of
                    .iter()
                    .map(|value| Condition::matches(filter.field.clone(), value.clone()))
                    .collect::<Vec<_>>(),
            )
        }
    }

    async fn server_dimension(&self, name: &str) -> Result<usize, StoreError> {
        let info = self
            .client
            .collection_info(name)
            .await
            .map_err(|e| StoreError::Collection(e.to_string()))?;
        let size = info
            .result
            .and_then(|i| i.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config)
            .and_then(|cfg| match cfg {
                VectorsKind::Params(params) => Some(params.size),
                VectorsKind::ParamsMap(_) => None,
            })
            .ok_or_else(|| StoreError::Collection(format!("no vector params for {name}")))?;
        usize::try_from(size).map_err(|e| StoreError::Collection(e.to_string()))
    }

    async fn dense_candidates(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
        threshold: Option<f32>,
        consistency: ConsistencyLevel,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        let mut builder = SearchPointsBuilder::new(collection, vector, limit).with_payload(true);
        if let Some(t) = threshold {
            builder = builder.score_threshold(t);
        }
        if let Some(rc) = read_consistency_for(consistency) {
            builder = builder.read_consistency(rc);
        }
        let response = self
            .client
            .search_points(builder)
            .await
            .map_err(|e| StoreError::Search(e.to_string()))?;
        Ok(response.result)
    }
}

fn payload_str(payload: &HashMap<String, qdrant_client::qdrant::Value>, key: &str) -> String {
    match payload.get(key).and_then(|v| v.kind.as_ref()) {
        Some(Kind::StringValue(s)) => s.clone(),
        _ => String::new(),
    }
}

fn payload_usize(payload: &HashMap<String, qdrant_client::qdrant::Value>, key: &str) -> usize {
    match payload.get(key).and_then(|v| v.kind.as_ref()) {
        Some(Kind::IntegerValue(i)) => usize::try_from(*i).unwrap_or(0),
        _ => 0,
    }
}

fn decode_point(
    payload: &HashMap<String, qdrant_client::qdrant::Value>,
    score: f32,
) -> ScoredDocument {
    ScoredDocument {
        id: payload_str(payload, "id"),
        score,
        content: payload_str(payload, "content"),
        relative_path: payload_str(payload, "relative_path"),
        start_line: payload_usize(payload, "start_line"),
        end_line: payload_usize(payload, "end_line"),
        file_extension: payload_str(payload, "file_extension"),
        metadata: payload_str(payload, "metadata"),
    }
}

fn decode_sparse(payload: &HashMap<String, qdrant_client::qdrant::Value>) -> Option<SparseVector> {
    let raw = payload.get("sparse").and_then(|v| v.kind.as_ref())?;
    let Kind::StringValue(json) = raw else {
        return None;
    };
    serde_json::from_str(json).ok()
}

fn encode_document(doc: &VectorDocument) -> Result<PointStruct, StoreError> {
    let mut value = serde_json::json!({
        "id": doc.id,
        "content": doc.content,
        "relative_path": doc.relative_path,
        "start_line": doc.start_line,
        "end_line": doc.end_line,
        "file_extension": doc.file_extension,
        "metadata": doc.metadata,
    });
    if let Some(sparse) = &doc.sparse {
        let encoded = serde_json::to_string(sparse)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        value["sparse"] = serde_json::Value::String(encoded);
    }
    let payload: HashMap<String, qdrant_client::qdrant::Value> =
        serde_json::from_value(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(PointStruct::new(
        QdrantVectorStore::point_id(&doc.id),
        doc.vector.clone(),
        payload,
    ))
}

impl VectorStore for QdrantVectorStore {
    fn create_collection(&self, schema: CollectionSchema) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let exists = self
                .client
                .collection_exists(&schema.name)
                .await
                .map_err(|e| StoreError::Connection(e.to_string()))?;
            if exists {
                self.cache_schema(schema);
                return Ok(());
            }

            let dimension = u64::try_from(schema.dimension)
                .map_err(|e| StoreError::Collection(e.to_string()))?;
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&schema.name)
                        .vectors_config(VectorParamsBuilder::new(dimension, Distance::Cosine)),
                )
                .await
                .map_err(|e| StoreError::Collection(e.to_string()))?;

            self.client
                .create_field_index(CreateFieldIndexCollectionBuilder::new(
                    &schema.name,
                    "relative_path",
                    FieldType::Keyword,
                ))
                .await
                .map_err(|e| StoreError::Collection(e.to_string()))?;

            self.cache_schema(schema);
            Ok(())
        })
    }

    fn drop_collection(&self, name: &str) -> BoxFuture<'_, Result<(), StoreError>> {
        let name = name.to_owned();
        Box::pin(async move {
            let exists = self
                .client
                .collection_exists(&name)
                .await
                .map_err(|e| StoreError::Connection(e.to_string()))?;
            if exists {
                self.client
                    .delete_collection(&name)
                    .await
                    .map_err(|e| StoreError::Collection(e.to_string()))?;
            }
            if let Ok(mut schemas) = self.schemas.write() {
                schemas.remove(&name);
            }
            Ok(())
        })
    }

    fn has_collection(&self, name: &str) -> BoxFuture<'_, Result<bool, StoreError>> {
        let name = name.to_owned();
        Box::pin(async move {
            self.client
                .collection_exists(&name)
                .await
                .map_err(|e| StoreError::Connection(e.to_string()))
        })
    }

    fn describe_collection(
        &self,
        name: &str,
    ) -> BoxFuture<'_, Result<CollectionSchema, StoreError>> {
        let name = name.to_owned();
        Box::pin(async move {
            if let Some(schema) = self.cached_schema(&name) {
                return Ok(schema);
            }
            let exists = self
                .client
                .collection_exists(&name)
                .await
                .map_err(|e| StoreError::Connection(e.to_string()))?;
            if !exists {
                return Err(StoreError::MissingCollection(name));
            }
            let dimension = self.server_dimension(&name).await?;
            // Sparse weights live in payloads, not the server schema, so
            // a fresh process cannot recover has_sparse from the server.
            let schema = CollectionSchema {
                name: name.clone(),
                dimension,
                has_sparse: false,
                description: None,
            };
            self.cache_schema(schema.clone());
            Ok(schema)
        })
    }

    fn insert(
        &self,
        collection: &str,
        documents: Vec<VectorDocument>,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let points = documents
                .iter()
                .map(encode_document)
                .collect::<Result<Vec<_>, _>>()?;
            self.client
                .upsert_points(UpsertPointsBuilder::new(&collection, points))
                .await
                .map_err(|e| StoreError::Insert(e.to_string()))?;
            Ok(())
        })
    }

    fn delete(&self, collection: &str, ids: Vec<String>) -> BoxFuture<'_, Result<(), StoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            if ids.is_empty() {
                return Ok(());
            }
            let point_ids: Vec<PointId> = ids
                .iter()
                .map(|id| Self::point_id(id).into())
                .collect();
            self.client
                .delete_points(
                    DeletePointsBuilder::new(&collection)
                        .points(qdrant_client::qdrant::PointsIdsList { ids: point_ids }),
                )
                .await
                .map_err(|e| StoreError::Delete(e.to_string()))?;
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
            let qdrant_filter = Self::filter_for(&filter);
            let mut rows = Vec::new();
            let mut offset: Option<PointId> = None;

            loop {
                let mut builder = ScrollPointsBuilder::new(&collection)
                    .filter(qdrant_filter.clone())
                    .with_payload(true)
                    .with_vectors(false)
                    .limit(256);
                if let Some(ref off) = offset {
                    builder = builder.offset(off.clone());
                }

                let response = self
                    .client
                    .scroll(builder)
                    .await
                    .map_err(|e| StoreError::Query(e.to_string()))?;

                for point in &response.result {
                    let mut row = Row::new();
                    for field in &output_fields {
                        if let Some(value) = point.payload.get(field) {
                            match value.kind.as_ref() {
                                Some(Kind::StringValue(s)) => {
                                    row.insert(field.clone(), serde_json::json!(s));
                                }
                                Some(Kind::IntegerValue(i)) => {
                                    row.insert(field.clone(), serde_json::json!(i));
                                }
                                _ => {}
                            }
                        }
                    }
                    rows.push(row);
                }

                match response.next_page_offset {
                    Some(next) => offset = Some(next),
                    None => break,
                }
            }

            Ok(rows)
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
            let limit = u64::try_from(options.top_k.max(1))
                .map_err(|e| StoreError::Search(e.to_string()))?;
            let points = self
                .dense_candidates(
                    &collection,
                    vector,
                    limit,
                    Some(options.threshold),
                    options.consistency,
                )
                .await?;
            let mut hits: Vec<ScoredDocument> = points
                .iter()
                .map(|p| decode_point(&p.payload, p.score))
                .collect();
            hits.retain(|h| h.score >= options.threshold);
            Ok(hits)
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
            let candidate_count = options.top_k.max(1) * HYBRID_CANDIDATE_FACTOR;
            let limit = u64::try_from(candidate_count)
                .map_err(|e| StoreError::Search(e.to_string()))?;
            let points = self
                .dense_candidates(&collection, vector, limit, None, options.consistency)
                .await?;

            let mut by_id: HashMap<String, ScoredDocument> = HashMap::new();
            let mut dense_list: Vec<(String, f32)> = Vec::new();
            let mut sparse_list: Vec<(String, f32)> = Vec::new();

            for point in &points {
                let doc = decode_point(&point.payload, point.score);
                dense_list.push((doc.id.clone(), point.score));
                if let Some(weights) = decode_sparse(&point.payload) {
                    let score = weights.dot(&sparse);
                    if score > 0.0 {
                        sparse_list.push((doc.id.clone(), score));
                    }
                }
                by_id.insert(doc.id.clone(), doc);
            }
            sparse_list.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.0.cmp(&b.0))
            });

            let fused = match options.ranker {
                Ranker::Rrf { k } => fusion::reciprocal_rank_fusion(&dense_list, &sparse_list, k),
                Ranker::Weighted {
                    dense: dw,
                    sparse: sw,
                } => fusion::weighted_sum(&dense_list, &sparse_list, dw, sw),
            };

            let mut hits: Vec<ScoredDocument> = fused
                .into_iter()
                .filter(|(_, score)| *score >= options.threshold)
                .filter_map(|(id, score)| {
                    by_id.remove(&id).map(|mut doc| {
                        doc.score = score;
                        doc
                    })
                })
                .take(options.top_k)
                .collect();
            hits.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.relative_path.cmp(&b.relative_path))
                    .then_with(|| a.start_line.cmp(&b.start_line))
            });
            Ok(hits)
        })
    }
}
