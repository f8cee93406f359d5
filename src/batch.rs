//! Batched, paced embedding of many texts.
//!
//! [`BatchEmbedder`] turns an ordered list of texts into an ordered list of
//! vectors. Texts are processed in fixed-size batches; calls inside a batch
//! run concurrently, and a [`Pacer`] is consulted before and after each
//! batch so that external rate limits are respected.
//!
//! The request fails as a whole if any single embedding fails or comes back
//! unusable. Callers that need partial progress must retry at chunk
//! granularity themselves.

use std::sync::Arc;

use futures::future::try_join_all;

use crate::config::EmbeddingConfig;
use crate::embedding::{validate_vector, Embedder};
use crate::error::{Error, Result};
use crate::rate_limit::{pacer_from_config, FixedDelay, Pacer};

pub struct BatchEmbedder {
    embedder: Arc<dyn Embedder>,
    pacer: Arc<dyn Pacer>,
    batch_size: usize,
}

impl BatchEmbedder {
    pub fn new(embedder: Arc<dyn Embedder>, pacer: Arc<dyn Pacer>, batch_size: usize) -> Self {
        Self {
            embedder,
            pacer,
            batch_size: batch_size.max(1),
        }
    }

    /// Batch size and pacing taken from `[embedding]`.
    pub fn from_config(embedder: Arc<dyn Embedder>, config: &EmbeddingConfig) -> Self {
        Self::new(embedder, pacer_from_config(config), config.batch_size)
    }

    /// Batches of `batch_size`, each started at least `delay` after the
    /// previous one finished.
    pub fn with_fixed_delay(
        embedder: Arc<dyn Embedder>,
        batch_size: usize,
        delay: std::time::Duration,
    ) -> Self {
        Self::new(embedder, Arc::new(FixedDelay::new(delay)), batch_size)
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Embed every text, preserving input order.
    ///
    /// All vectors share one dimensionality: the embedder's declared `dims`
    /// when known, otherwise that of the first vector returned.
    pub async fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(texts.len());
        let mut dims = self.embedder.dims();
        let total_batches = texts.len().div_ceil(self.batch_size);

        for (batch_no, batch) in texts.chunks(self.batch_size).enumerate() {
            self.pacer.ready().await;
            tracing::debug!(
                batch = batch_no + 1,
                total_batches,
                size = batch.len(),
                "embedding batch"
            );

            let results = try_join_all(batch.iter().map(|text| self.embedder.embed(text))).await;
            self.pacer.done().await;
            let results = results.map_err(|e| match e {
                Error::Embedding { .. } => e,
                other => Error::embedding(other.to_string()),
            })?;

            for vector in results {
                validate_vector(&vector, dims)?;
                if dims == 0 {
                    dims = vector.len();
                }
                vectors.push(vector);
            }
        }

        Ok(vectors)
    }

    /// Embed a single query text with the same validation as [`embed_all`](Self::embed_all).
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let vector = self.embedder.embed(text).await?;
        validate_vector(&vector, self.embedder.dims())?;
        Ok(vector)
    }
}
