//! ragdb-embed
//!
//! Embedding providers behind `ragdb_core::traits::EmbeddingProvider`: a
//! deterministic hashing embedder and a local BGE-M3 model run with candle.

pub mod device;
pub mod hashing;
pub mod model;
pub mod pool;
pub mod tokenize;

use std::sync::Arc;

use ragdb_core::config::{EmbedderConfig, EmbedderKind};
use ragdb_core::error::{Error, Result};
use ragdb_core::traits::EmbeddingProvider;

pub use hashing::HashingEmbedder;
pub use model::BgeM3Embedder;
pub use pool::masked_mean_l2;

/// Build the provider named by configuration.
pub fn build_embedder(config: &EmbedderConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    config.validate()?;
    match config.kind {
        EmbedderKind::Hashing => {
            tracing::info!(dim = config.dim, "using hashing embedder");
            Ok(Arc::new(HashingEmbedder::new(config.dim)?))
        }
        EmbedderKind::BgeM3 => {
            let model = BgeM3Embedder::new(config).map_err(|e| Error::provider(format!("{e:#}")))?;
            Ok(Arc::new(model))
        }
    }
}
