use async_trait::async_trait;
use std::hash::Hasher;
use twox_hash::XxHash64;

use ragdb_core::error::{Error, Result};
use ragdb_core::traits::EmbeddingProvider;

/// Deterministic feature-hashing embedder.
///
/// Each lower-cased alphanumeric word is hashed with xxHash64 into one of
/// `dim` buckets with a hash-derived sign; the result is L2-normalized.
/// Texts sharing words get correlated vectors, which is enough for offline
/// runs and tests without model files.
pub struct HashingEmbedder {
    dim: usize,
    id: String,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(Error::invalid_config("hashing embedder dimension must be greater than 0"));
        }
        Ok(Self { dim, id: format!("hashing:xxh64:d{dim}") })
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for token in text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let mut hasher = XxHash64::with_seed(0);
            hasher.write(token.to_lowercase().as_bytes());
            let h = hasher.finish();
            #[allow(clippy::cast_possible_truncation)]
            let idx = (h % self.dim as u64) as usize;
            let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
            v[idx] += sign;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v {
            *x /= norm;
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    fn embedder_id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }
}
