use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::types::{ChunkId, IndexInfo, Metric, SearchHit};

/// Maps text to a vector of fixed dimensionality.
///
/// Failures surface as `Error::Provider`; implementations never return a
/// partial batch.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Stable identifier for the provider/model (e.g. `hashing:d384`).
    fn embedder_id(&self) -> &str;
    fn dim(&self) -> usize;
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// Stores one vector per chunk and answers nearest-neighbour queries.
///
/// Dimensionality and metric are fixed when the index is built. Writes are
/// visible to every query issued after they return.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn dimensionality(&self) -> usize;
    fn metric(&self) -> Metric;

    async fn upsert(&self, id: &ChunkId, vector: &[f32]) -> Result<()>;
    /// Removing an unknown id is a no-op.
    async fn remove(&self, id: &ChunkId) -> Result<()>;
    /// At most `k` hits, descending by similarity, ties by ascending chunk id.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>>;
    async fn count(&self) -> Result<usize>;

    async fn info(&self) -> Result<IndexInfo> {
        Ok(IndexInfo { count: self.count().await?, dimensionality: self.dimensionality(), metric: self.metric() })
    }

    /// Persist pending state on shutdown. In-memory backends have nothing to do.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Shared input guard for vector backends: the vector must have the index's
/// dimensionality and only finite components.
pub fn check_vector(expected: usize, vector: &[f32]) -> Result<()> {
    if vector.len() != expected {
        return Err(Error::DimensionMismatch { expected, actual: vector.len() });
    }
    match vector.iter().position(|x| !x.is_finite()) {
        Some(i) => Err(Error::InvalidVector(format!("component {i} is {}", vector[i]))),
        None => Ok(()),
    }
}
