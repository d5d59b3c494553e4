//! Test-only deterministic embedding provider.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{Arc, Mutex};

use crate::error::{EmbedError, Result};
use crate::provider::Embedder;

/// Deterministic embedder for tests and offline runs.
///
/// Texts are tokenized on non-alphanumeric boundaries and each token is
/// hashed into one of `dimension` buckets; the bucket counts are
/// L2-normalized. Identical texts therefore produce identical vectors
/// and texts sharing tokens land near each other under cosine
/// similarity, which is enough to exercise thresholds and ranking.
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    pub dimension: usize,
    pub max_batch: Option<usize>,
    /// Fail the next N embedding calls with a transport error.
    failures_remaining: Arc<Mutex<u32>>,
    batch_sizes: Arc<Mutex<Vec<usize>>>,
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self {
            dimension: 64,
            max_batch: None,
            failures_remaining: Arc::new(Mutex::new(0)),
            batch_sizes: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl MockEmbedder {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_batch(mut self, max: usize) -> Self {
        self.max_batch = Some(max);
        self
    }

    /// Make the next `n` embedding calls fail with a transport error.
    pub fn fail_next(&self, n: u32) {
        *self.failures_remaining.lock().unwrap() = n;
    }

    /// Sizes of every batch embedded so far, in call order.
    #[must_use]
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().unwrap().clone()
    }

    fn take_failure(&self) -> bool {
        let mut remaining = self.failures_remaining.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            return true;
        }
        false
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let bucket = (hasher.finish() as usize) % self.dimension;
            vector[bucket] += 1.0;
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.take_failure() {
            return Err(EmbedError::Transport("mock transport failure".into()));
        }
        Ok(self.vectorize(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.batch_sizes.lock().unwrap().push(texts.len());
        if self.take_failure() {
            return Err(EmbedError::Transport("mock transport failure".into()));
        }
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_batch_size(&self) -> Option<usize> {
        self.max_batch
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn identical_texts_produce_identical_vectors() {
        let embedder = MockEmbedder::new(32);
        let a = embedder.embed("fn parse(input: &str)").await.unwrap();
        let b = embedder.embed("fn parse(input: &str)").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn vectors_are_unit_length() {
        let embedder = MockEmbedder::new(32);
        let v = embedder.embed("hello world").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn overlapping_tokens_score_higher_than_disjoint() {
        let embedder = MockEmbedder::new(64);
        let doc = embedder.embed("parse config file").await.unwrap();
        let near = embedder.embed("parse the config").await.unwrap();
        let far = embedder.embed("zzqq xkcd wombat").await.unwrap();
        assert!(cosine(&doc, &near) > cosine(&doc, &far));
    }

    #[tokio::test]
    async fn empty_text_is_zero_vector() {
        let embedder = MockEmbedder::new(8);
        let v = embedder.embed("").await.unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn fail_next_exhausts() {
        let embedder = MockEmbedder::new(8);
        embedder.fail_next(1);
        assert!(embedder.embed("x").await.is_err());
        assert!(embedder.embed("x").await.is_ok());
    }

    #[tokio::test]
    async fn batch_sizes_are_recorded() {
        let embedder = MockEmbedder::new(8);
        let texts: Vec<String> = (0..3).map(|i| format!("t{i}")).collect();
        embedder.embed_batch(&texts).await.unwrap();
        embedder.embed_batch(&texts[..1]).await.unwrap();
        assert_eq!(embedder.batch_sizes(), vec![3, 1]);
    }
}
