//! Pipeline orchestrator: walk → split → batch-embed → bulk-insert.
//!
//! A single buffer holds pending chunks; whenever it reaches the
//! configured batch size the orchestrator flushes it through the
//! embedder and into the store. The buffer is drained on every flush
//! attempt, including failed ones, so peak memory stays proportional to
//! the batch size rather than the repository. Deterministic document
//! ids make any partial run safe to repeat.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use quarry_embed::Embedder;
use quarry_store::{FieldFilter, VectorDocument, VectorStore};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use crate::collection::{CollectionManager, collection_name};
use crate::config::IndexConfig;
use crate::enrich::{ChunkTransform, transform_batch};
use crate::error::{IndexError, Result};
use crate::ignore::{IgnoreEngine, enumerate_files};
use crate::languages::detect_language;
use crate::progress::{ProgressReporter, ProgressTracker};
use crate::search::{QueryPlanner, SearchResult};
use crate::sparse::{Bm25Encoder, SparseEncoder};
use crate::splitter::{AstSplitter, CodeChunk};
use crate::sync::{FileSynchronizer, Snapshot};

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_SECS: u64 = 1;

/// Terminal status of a pipeline call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    /// Cancellation was observed; the snapshot was not updated.
    Aborted,
}

/// Summary of an `index_codebase` run. Counts reflect successes only.
#[derive(Debug)]
pub struct IndexStats {
    pub indexed_files: usize,
    pub total_chunks: usize,
    pub status: RunStatus,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

/// Summary of a `reindex_by_change` run.
#[derive(Debug)]
pub struct ChangeStats {
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
    pub status: RunStatus,
    pub errors: Vec<String>,
}

/// Deterministic document id:
/// `chunk_` + first 16 hex of sha256(`path:start:end:content`).
///
/// A pure function of the chunk's identity, so re-emitting the same
/// chunk upserts in place and partial runs are restartable.
#[must_use]
pub fn chunk_id(relative_path: &str, start_line: usize, end_line: usize, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(relative_path.as_bytes());
    hasher.update(format!(":{start_line}:{end_line}:"));
    hasher.update(content.as_bytes());
    let digest = hasher.finalize();
    format!("chunk_{}", hex::encode(&digest[..8]))
}

fn is_cancelled(cancel: Option<&CancellationToken>) -> bool {
    cancel.is_some_and(CancellationToken::is_cancelled)
}

/// Retry transient failures with bounded exponential backoff. Each
/// attempt runs under `deadline`; expiry counts as a transient failure.
async fn with_retry<T, F, Fut>(operation: &'static str, deadline: Duration, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        let outcome = match tokio::time::timeout(deadline, call()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(IndexError::Timeout {
                operation,
                secs: deadline.as_secs(),
            }),
        };
        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < MAX_RETRIES => {
                let delay = Duration::from_secs(BASE_BACKOFF_SECS << attempt);
                tracing::warn!(
                    operation,
                    attempt = attempt + 1,
                    "transient failure, retrying in {}s: {e}",
                    delay.as_secs()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

struct PendingChunk {
    chunk: CodeChunk,
    relative_path: String,
}

#[derive(Default)]
struct FileRun {
    indexed_files: usize,
    total_chunks: usize,
    errors: Vec<String>,
    hashes: BTreeMap<String, String>,
    aborted: bool,
}

/// Orchestrates indexing, incremental re-indexing, and search over one
/// store and embedder.
pub struct Indexer<E: Embedder> {
    store: Arc<dyn VectorStore>,
    embedder: Arc<E>,
    config: IndexConfig,
    transform: Option<Arc<dyn ChunkTransform>>,
    sparse_encoder: Arc<dyn SparseEncoder>,
}

impl<E: Embedder> Indexer<E> {
    /// Create an orchestrator.
    ///
    /// # Errors
    ///
    /// Returns a config error if `config` is invalid.
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<E>, config: IndexConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            embedder,
            config,
            transform: None,
            sparse_encoder: Arc::new(Bm25Encoder::default()),
        })
    }

    /// Install a pre-embedding transform. The persisted document
    /// content is never affected.
    #[must_use]
    pub fn with_transform(mut self, transform: Arc<dyn ChunkTransform>) -> Self {
        self.transform = Some(transform);
        self
    }

    #[must_use]
    pub fn with_sparse_encoder(mut self, encoder: Arc<dyn SparseEncoder>) -> Self {
        self.sparse_encoder = encoder;
        self
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.config.request_timeout_secs)
    }

    /// Index every eligible file under `path` into its collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the path does not resolve, configuration is
    /// unusable, or collection preparation fails. Per-file and
    /// per-batch failures are recorded in the stats instead.
    pub async fn index_codebase(
        &self,
        path: &Path,
        progress: Option<&dyn ProgressReporter>,
        cancel: Option<&CancellationToken>,
    ) -> Result<IndexStats> {
        let start = std::time::Instant::now();
        let root = std::fs::canonicalize(path)?;
        let collection = collection_name(&root);

        let manager = CollectionManager::new(self.store.clone());
        let schema = manager
            .prepare(&collection, self.embedder.as_ref(), self.config.enable_sparse)
            .await?;

        let engine = IgnoreEngine::new(&root, &self.config.ignore_patterns)?;
        let files = enumerate_files(&root, &engine, &self.config.supported_extensions);
        tracing::info!(collection = %collection, total = files.len(), "indexing started");

        let mut tracker = ProgressTracker::new(progress);
        tracker.emit("prepare", 0, files.len());

        let run = self
            .index_files(
                &root,
                &collection,
                schema.dimension,
                &files,
                &mut tracker,
                cancel,
                files.len(),
                0,
            )
            .await;

        let status = if run.aborted {
            RunStatus::Aborted
        } else {
            let sync = FileSynchronizer::new(
                &root,
                &self.config.snapshot_dir,
                engine,
                self.config.supported_extensions.clone(),
            )?;
            let snapshot = Snapshot {
                paths: run.hashes,
                ..Snapshot::default()
            };
            sync.commit(&snapshot).await?;
            RunStatus::Completed
        };

        let stats = IndexStats {
            indexed_files: run.indexed_files,
            total_chunks: run.total_chunks,
            status,
            errors: run.errors,
            duration_ms: start.elapsed().as_millis().try_into().unwrap_or(u64::MAX),
        };
        tracing::info!(
            collection = %collection,
            indexed_files = stats.indexed_files,
            total_chunks = stats.total_chunks,
            errors = stats.errors.len(),
            "indexing finished"
        );
        Ok(stats)
    }

    /// Delete vectors for removed and modified files, then re-index
    /// added and modified files through the same pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the delta cannot be computed (including a
    /// concurrent delta holding the lock) or the collection cannot be
    /// prepared.
    pub async fn reindex_by_change(
        &self,
        path: &Path,
        progress: Option<&dyn ProgressReporter>,
        cancel: Option<&CancellationToken>,
    ) -> Result<ChangeStats> {
        let root = std::fs::canonicalize(path)?;
        let collection = collection_name(&root);
        let engine = IgnoreEngine::new(&root, &self.config.ignore_patterns)?;
        let sync = FileSynchronizer::new(
            &root,
            &self.config.snapshot_dir,
            engine,
            self.config.supported_extensions.clone(),
        )?;

        let (delta, snapshot) = sync.compute_delta().await?;
        tracing::info!(
            added = delta.added.len(),
            removed = delta.removed.len(),
            modified = delta.modified.len(),
            "delta computed"
        );

        let manager = CollectionManager::new(self.store.clone());
        let schema = manager
            .prepare(&collection, self.embedder.as_ref(), self.config.enable_sparse)
            .await?;

        let stale: Vec<String> = delta
            .removed
            .iter()
            .chain(delta.modified.iter())
            .cloned()
            .collect();
        let to_index: Vec<PathBuf> = delta
            .added
            .iter()
            .chain(delta.modified.iter())
            .map(|rel| root.join(rel))
            .collect();

        let total_work = stale.len() + to_index.len();
        let mut tracker = ProgressTracker::new(progress);
        let mut errors = Vec::new();
        let mut done = 0usize;
        let mut aborted = false;

        for relative in &stale {
            if is_cancelled(cancel) {
                aborted = true;
                break;
            }
            if let Err(e) = self.delete_file_documents(&collection, relative).await {
                errors.push(format!("delete {relative}: {e}"));
            }
            done += 1;
            tracker.emit("delete", done, total_work);
        }

        if !aborted {
            let run = self
                .index_files(
                    &root,
                    &collection,
                    schema.dimension,
                    &to_index,
                    &mut tracker,
                    cancel,
                    total_work,
                    done,
                )
                .await;
            errors.extend(run.errors);
            aborted = run.aborted;
        }

        let status = if aborted {
            RunStatus::Aborted
        } else {
            sync.commit(&snapshot).await?;
            RunStatus::Completed
        };

        Ok(ChangeStats {
            added: delta.added.len(),
            removed: delta.removed.len(),
            modified: delta.modified.len(),
            status,
            errors,
        })
    }

    /// Drop the codebase's collection and delete its snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the path does not resolve or the backend
    /// fails; clearing an unindexed codebase is a no-op.
    pub async fn clear_index(&self, path: &Path) -> Result<()> {
        let root = std::fs::canonicalize(path)?;
        let collection = collection_name(&root);
        self.store.drop_collection(&collection).await?;

        let engine = IgnoreEngine::new(&root, &self.config.ignore_patterns)?;
        let sync = FileSynchronizer::new(
            &root,
            &self.config.snapshot_dir,
            engine,
            self.config.supported_extensions.clone(),
        )?;
        sync.remove_snapshot().await?;
        tracing::info!(collection = %collection, "index cleared");
        Ok(())
    }

    /// Search the codebase's collection. See [`QueryPlanner::search`].
    ///
    /// # Errors
    ///
    /// Returns an error if the path does not resolve, the codebase was
    /// never indexed, or embedding the query fails.
    pub async fn search(
        &self,
        path: &Path,
        query: &str,
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<SearchResult>> {
        let root = std::fs::canonicalize(path)?;
        let collection = collection_name(&root);
        let planner = QueryPlanner::new(
            self.store.clone(),
            self.embedder.clone(),
            self.sparse_encoder.clone(),
            self.config.ranker.to_ranker(),
            self.config.consistency_level,
        )
        .with_timeout(self.request_timeout());
        planner.search(&collection, query, top_k, threshold).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn index_files(
        &self,
        root: &Path,
        collection: &str,
        dimension: usize,
        files: &[PathBuf],
        tracker: &mut ProgressTracker<'_>,
        cancel: Option<&CancellationToken>,
        work_total: usize,
        work_offset: usize,
    ) -> FileRun {
        let splitter = AstSplitter::new(self.config.chunk_size, self.config.chunk_overlap);
        let batch_size = match self.embedder.max_batch_size() {
            Some(max) => self.config.embed_batch.min(max.max(1)),
            None => self.config.embed_batch,
        };

        let mut run = FileRun::default();
        let mut buffer: Vec<PendingChunk> = Vec::new();

        'files: for (i, path) in files.iter().enumerate() {
            if is_cancelled(cancel) {
                run.aborted = true;
                break;
            }

            let relative = path
                .strip_prefix(root)
                .unwrap_or(path)
                .to_string_lossy()
                .replace('\\', "/");

            let source = match tokio::fs::read_to_string(path).await {
                Ok(source) => source,
                Err(e) => {
                    tracing::warn!(file = %relative, "skipping unreadable file: {e}");
                    run.errors.push(format!("{relative}: {e}"));
                    continue;
                }
            };
            run.hashes.insert(
                relative.clone(),
                blake3::hash(source.as_bytes()).to_hex().to_string(),
            );

            let language = detect_language(path);
            let chunks = splitter.split(&source, language, &path.to_string_lossy());
            if !chunks.is_empty() {
                run.indexed_files += 1;
            }
            buffer.extend(chunks.into_iter().map(|chunk| PendingChunk {
                relative_path: relative.clone(),
                chunk,
            }));

            while buffer.len() >= batch_size {
                let batch: Vec<PendingChunk> = buffer.drain(..batch_size).collect();
                run.total_chunks += self
                    .flush(collection, dimension, batch, &mut run.errors)
                    .await;
                if is_cancelled(cancel) {
                    run.aborted = true;
                    break 'files;
                }
            }

            tracker.emit("index", work_offset + i + 1, work_total);
        }

        if !run.aborted {
            while !buffer.is_empty() {
                let take = buffer.len().min(batch_size);
                let batch: Vec<PendingChunk> = buffer.drain(..take).collect();
                run.total_chunks += self
                    .flush(collection, dimension, batch, &mut run.errors)
                    .await;
            }
        }

        run
    }

    /// Embed one batch and insert the resulting documents. Failures are
    /// recorded and the batch is skipped; the buffer was already
    /// drained by the caller.
    async fn flush(
        &self,
        collection: &str,
        dimension: usize,
        batch: Vec<PendingChunk>,
        errors: &mut Vec<String>,
    ) -> usize {
        if batch.is_empty() {
            return 0;
        }

        let texts: Vec<String> = match &self.transform {
            Some(transform) => {
                let chunks: Vec<CodeChunk> = batch.iter().map(|p| p.chunk.clone()).collect();
                transform_batch(
                    transform.as_ref(),
                    &chunks,
                    self.config.max_parallel_batches,
                )
                .await
            }
            None => batch.iter().map(|p| p.chunk.content.clone()).collect(),
        };

        let embedder = self.embedder.clone();
        let vectors = match with_retry("embed_batch", self.request_timeout(), || {
            let embedder = embedder.clone();
            let texts = texts.clone();
            async move { embedder.embed_batch(&texts).await.map_err(IndexError::from) }
        })
        .await
        {
            Ok(vectors) => vectors,
            Err(e) => {
                tracing::error!(batch = batch.len(), "embedding batch failed: {e}");
                errors.push(format!("embed batch of {}: {e}", batch.len()));
                return 0;
            }
        };

        if vectors.len() != batch.len() {
            errors.push(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                batch.len()
            ));
            return 0;
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            errors.push(format!(
                "embedder returned dimension {}, collection expects {dimension}",
                bad.len()
            ));
            return 0;
        }

        let documents: Vec<VectorDocument> = batch
            .iter()
            .zip(vectors)
            .map(|(pending, vector)| self.document_for(pending, vector))
            .collect();
        let count = documents.len();

        let store = self.store.clone();
        let name = collection.to_owned();
        match with_retry("insert", self.request_timeout(), || {
            let store = store.clone();
            let name = name.clone();
            let documents = documents.clone();
            async move {
                store
                    .insert(&name, documents)
                    .await
                    .map_err(IndexError::from)
            }
        })
        .await
        {
            Ok(()) => {
                tracing::debug!(collection = %name, count, "batch inserted");
                count
            }
            Err(e) => {
                tracing::error!(batch = count, "insert batch failed: {e}");
                errors.push(format!("insert batch of {count}: {e}"));
                0
            }
        }
    }

    fn document_for(&self, pending: &PendingChunk, vector: Vec<f32>) -> VectorDocument {
        let chunk = &pending.chunk;
        let metadata = serde_json::json!({
            "language": chunk.language_tag(),
            "node_kind": chunk.node_kind.label(),
            "node_name": chunk.node_name,
        })
        .to_string();
        let file_extension = Path::new(&pending.relative_path)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        VectorDocument {
            id: chunk_id(
                &pending.relative_path,
                chunk.start_line,
                chunk.end_line,
                &chunk.content,
            ),
            vector,
            content: chunk.content.clone(),
            relative_path: pending.relative_path.clone(),
            start_line: chunk.start_line,
            end_line: chunk.end_line,
            file_extension,
            metadata,
            sparse: self
                .config
                .enable_sparse
                .then(|| self.sparse_encoder.encode(&chunk.content)),
        }
    }

    /// Query-then-delete every document of one file.
    async fn delete_file_documents(&self, collection: &str, relative_path: &str) -> Result<usize> {
        let store = self.store.clone();
        let rows = with_retry("query", self.request_timeout(), || {
            let store = store.clone();
            let name = collection.to_owned();
            let filter = FieldFilter::equals("relative_path", relative_path);
            async move {
                store
                    .query(&name, filter, vec!["id".into()])
                    .await
                    .map_err(IndexError::from)
            }
        })
        .await?;

        let ids: Vec<String> = rows
            .into_iter()
            .filter_map(|row| row.get("id").and_then(|v| v.as_str().map(String::from)))
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }

        let count = ids.len();
        let store = self.store.clone();
        with_retry("delete", self.request_timeout(), || {
            let store = store.clone();
            let name = collection.to_owned();
            let ids = ids.clone();
            async move { store.delete(&name, ids).await.map_err(IndexError::from) }
        })
        .await?;
        tracing::debug!(file = relative_path, count, "stale chunks deleted");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn chunk_id_is_deterministic_and_shaped() {
        let a = chunk_id("src/lib.rs", 1, 5, "fn a() {}");
        let b = chunk_id("src/lib.rs", 1, 5, "fn a() {}");
        assert_eq!(a, b);
        assert!(a.starts_with("chunk_"));
        assert_eq!(a.len(), "chunk_".len() + 16);
    }

    #[test]
    fn chunk_id_depends_on_every_component() {
        let base = chunk_id("src/lib.rs", 1, 5, "fn a() {}");
        assert_ne!(base, chunk_id("src/other.rs", 1, 5, "fn a() {}"));
        assert_ne!(base, chunk_id("src/lib.rs", 2, 5, "fn a() {}"));
        assert_ne!(base, chunk_id("src/lib.rs", 1, 6, "fn a() {}"));
        assert_ne!(base, chunk_id("src/lib.rs", 1, 5, "fn b() {}"));
    }

    #[tokio::test]
    async fn retry_recovers_from_transient_failures() {
        let attempts = Mutex::new(0u32);
        let result = with_retry("test", Duration::from_secs(30), || {
            let n = {
                let mut guard = attempts.lock().unwrap();
                *guard += 1;
                *guard
            };
            async move {
                if n == 1 {
                    Err(IndexError::Embed(quarry_embed::EmbedError::Transport(
                        "flaky".into(),
                    )))
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 2);
    }

    #[tokio::test]
    async fn retry_gives_up_on_permanent_errors() {
        let attempts = Mutex::new(0u32);
        let result: Result<()> = with_retry("test", Duration::from_secs(30), || {
            *attempts.lock().unwrap() += 1;
            async { Err(IndexError::Config("bad".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(*attempts.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expiry_retries_then_fails() {
        let attempts = Mutex::new(0u32);
        let result: Result<()> = with_retry("test", Duration::from_secs(1), || {
            *attempts.lock().unwrap() += 1;
            futures::future::pending()
        })
        .await;
        assert!(matches!(result, Err(IndexError::Timeout { .. })));
        assert_eq!(*attempts.lock().unwrap(), 1 + MAX_RETRIES);
    }
}
