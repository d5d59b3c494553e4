//! Query planner: dense cosine search, optional hybrid fusion, and
//! dense-only fallback when the hybrid path degrades.

use std::sync::Arc;
use std::time::Duration;

use quarry_embed::Embedder;
use quarry_store::{
    ConsistencyLevel, HybridOptions, Ranker, ScoredDocument, SearchOptions, VectorStore,
};

use crate::error::{IndexError, Result};
use crate::sparse::SparseEncoder;

/// Scale applied to dense scores when hybrid search fell back, so
/// callers can see the degradation.
const HYBRID_FALLBACK_SCALE: f32 = 0.9;

/// Default deadline for outbound calls when none is configured.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// One search hit, ready for display.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub content: String,
    pub relative_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub language: String,
    pub score: f32,
}

/// Plans and executes searches against one collection.
pub struct QueryPlanner<E: Embedder> {
    store: Arc<dyn VectorStore>,
    embedder: Arc<E>,
    sparse_encoder: Arc<dyn SparseEncoder>,
    ranker: Ranker,
    consistency: ConsistencyLevel,
    timeout: Duration,
}

impl<E: Embedder> QueryPlanner<E> {
    #[must_use]
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<E>,
        sparse_encoder: Arc<dyn SparseEncoder>,
        ranker: Ranker,
        consistency: ConsistencyLevel,
    ) -> Self {
        Self {
            store,
            embedder,
            sparse_encoder,
            ranker,
            consistency,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the deadline applied to each outbound call.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn deadline<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(outcome) => outcome,
            Err(_) => Err(IndexError::Timeout {
                operation,
                secs: self.timeout.as_secs(),
            }),
        }
    }

    /// Search `collection` for `query`.
    ///
    /// Hybrid search runs when the collection carries a sparse field;
    /// if it fails or comes back empty, the planner falls back to
    /// dense-only with scores scaled by 0.9. Every returned hit scores
    /// at least `threshold`, ordered by descending score with ties
    /// broken by path and start line.
    ///
    /// # Errors
    ///
    /// Returns an error if the query cannot be embedded, the collection
    /// does not exist, or the dense search itself fails.
    pub async fn search(
        &self,
        collection: &str,
        query: &str,
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<SearchResult>> {
        let vector = self
            .deadline("embed_query", async {
                Ok(self.embedder.embed(query).await?)
            })
            .await?;
        let schema = self
            .deadline("describe_collection", async {
                Ok(self.store.describe_collection(collection).await?)
            })
            .await?;

        let hits = if schema.has_sparse {
            let sparse = self.sparse_encoder.encode(query);
            tracing::debug!(collection, ranker = self.ranker.label(), "hybrid search");
            let options = HybridOptions {
                top_k,
                threshold,
                ranker: self.ranker,
                consistency: self.consistency,
            };
            match self
                .deadline("hybrid_search", async {
                    Ok(self
                        .store
                        .hybrid_search(collection, vector.clone(), sparse, options)
                        .await?)
                })
                .await
            {
                Ok(hits) if !hits.is_empty() => hits,
                Ok(_) => {
                    tracing::warn!(collection, "hybrid search empty, degrading to dense");
                    self.dense_degraded(collection, vector, top_k, threshold)
                        .await?
                }
                Err(e) => {
                    tracing::warn!(collection, "hybrid search failed, degrading to dense: {e}");
                    self.dense_degraded(collection, vector, top_k, threshold)
                        .await?
                }
            }
        } else {
            self.deadline("search", async {
                Ok(self
                    .store
                    .search(
                        collection,
                        vector,
                        SearchOptions {
                            top_k,
                            threshold,
                            consistency: self.consistency,
                        },
                    )
                    .await?)
            })
            .await?
        };

        let mut results: Vec<SearchResult> = hits.into_iter().map(to_result).collect();
        results.retain(|r| r.score >= threshold);
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.relative_path.cmp(&b.relative_path))
                .then_with(|| a.start_line.cmp(&b.start_line))
        });
        Ok(results)
    }

    async fn dense_degraded(
        &self,
        collection: &str,
        vector: Vec<f32>,
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<ScoredDocument>> {
        let mut hits = self
            .deadline("search", async {
                Ok(self
                    .store
                    .search(
                        collection,
                        vector,
                        SearchOptions {
                            top_k,
                            threshold,
                            consistency: self.consistency,
                        },
                    )
                    .await?)
            })
            .await?;
        for hit in &mut hits {
            hit.score *= HYBRID_FALLBACK_SCALE;
        }
        Ok(hits)
    }
}

fn to_result(hit: ScoredDocument) -> SearchResult {
    let language = serde_json::from_str::<serde_json::Value>(&hit.metadata)
        .ok()
        .and_then(|meta| {
            meta.get("language")
                .and_then(|l| l.as_str().map(String::from))
        })
        .unwrap_or_else(|| hit.file_extension.clone());
    SearchResult {
        content: hit.content,
        relative_path: hit.relative_path,
        start_line: hit.start_line,
        end_line: hit.end_line,
        language,
        score: hit.score,
    }
}
