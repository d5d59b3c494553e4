//! Optional pre-embedding chunk transforms.
//!
//! A transform rewrites the text handed to the embedder; the persisted
//! document content is always the original chunk text. Transforms may
//! call out to an LLM, so batch application runs with bounded
//! concurrency while preserving input order.

use std::pin::Pin;

use futures::stream::{self, StreamExt};

use crate::error::Result;
use crate::splitter::CodeChunk;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Rewrites chunk text before embedding.
pub trait ChunkTransform: Send + Sync {
    fn transform(&self, chunk: &CodeChunk) -> BoxFuture<'_, Result<String>>;
}

/// Prepends file path and language so conceptual queries match better.
pub struct ContextualTransform;

impl ChunkTransform for ContextualTransform {
    fn transform(&self, chunk: &CodeChunk) -> BoxFuture<'_, Result<String>> {
        let mut text = String::with_capacity(chunk.content.len() + 128);
        text.push_str("# ");
        text.push_str(&chunk.file_path);
        text.push('\n');
        text.push_str("# Language: ");
        text.push_str(chunk.language_tag());
        text.push('\n');
        text.push_str(&chunk.content);
        Box::pin(async move { Ok(text) })
    }
}

/// Apply `transform` to every chunk with at most `max_parallel`
/// in-flight calls. Output order equals input order regardless of
/// completion order. A failed transform falls back to the original
/// content; enrichment is auxiliary and never fails the batch.
pub async fn transform_batch(
    transform: &dyn ChunkTransform,
    chunks: &[CodeChunk],
    max_parallel: usize,
) -> Vec<String> {
    stream::iter(chunks.iter().map(|chunk| async move {
        match transform.transform(chunk).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(file = %chunk.file_path, "chunk transform failed: {e}");
                chunk.content.clone()
            }
        }
    }))
    .buffered(max_parallel.max(1))
    .collect()
    .await
}
