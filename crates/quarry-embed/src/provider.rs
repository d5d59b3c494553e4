//! The [`Embedder`] trait consumed by the indexing pipeline.

use crate::error::Result;

/// A dense-vector embedding provider.
///
/// Implementations wrap whatever transport the provider speaks; the
/// pipeline only relies on the contract below.
pub trait Embedder: Send + Sync {
    /// Embed a single text into a dense vector of [`dimension`](Embedder::dimension) floats.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider fails to communicate or the response is invalid.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>>> + Send;

    /// Embed a batch of texts. Output order matches input order and the
    /// output length equals the input length.
    ///
    /// The default implementation embeds sequentially; providers with a
    /// native batch endpoint should override it.
    ///
    /// # Errors
    ///
    /// Returns an error if any embedding in the batch fails.
    fn embed_batch(&self, texts: &[String]) -> impl Future<Output = Result<Vec<Vec<f32>>>> + Send {
        async move {
            let mut vectors = Vec::with_capacity(texts.len());
            for text in texts {
                vectors.push(self.embed(text).await?);
            }
            Ok(vectors)
        }
    }

    /// Length of the vectors this provider produces.
    fn dimension(&self) -> usize;

    /// Resolve the dimension for providers that probe lazily.
    ///
    /// The default returns [`dimension`](Embedder::dimension) without touching the network.
    ///
    /// # Errors
    ///
    /// Returns an error if the probe request fails.
    fn ensure_dimension(&self) -> impl Future<Output = Result<usize>> + Send {
        async move { Ok(self.dimension()) }
    }

    /// Largest batch the provider accepts, if it advertises a limit.
    fn max_batch_size(&self) -> Option<usize> {
        None
    }

    /// Provider name for logging and identification.
    fn name(&self) -> &'static str;
}
