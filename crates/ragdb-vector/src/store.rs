use async_trait::async_trait;

use ragdb_core::config::{expand_path, VectorBackendKind, VectorConfig};
use ragdb_core::error::Result;
use ragdb_core::traits::VectorIndex;
use ragdb_core::types::{ChunkId, Metric, SearchHit};

use crate::flat::FlatIndex;
use crate::lance::LanceIndex;

/// The configured vector backend. Chosen once at construction; every
/// variant honours the same `VectorIndex` contract.
pub enum VectorStore {
	Flat(FlatIndex),
	Lance(LanceIndex),
}

impl VectorStore {
	pub async fn from_config(config: &VectorConfig, dim: usize) -> Result<Self> {
		match config.backend {
			VectorBackendKind::Flat => {
				tracing::info!(dim, metric = %config.metric, "using flat in-memory vector index");
				Ok(Self::Flat(FlatIndex::new(dim, config.metric)?))
			}
			VectorBackendKind::Lance => {
				let uri = expand_path(&config.uri);
				let index = LanceIndex::open(&uri.to_string_lossy(), &config.table, dim, config.metric).await?;
				Ok(Self::Lance(index))
			}
		}
	}

	fn inner(&self) -> &dyn VectorIndex {
		match self {
			Self::Flat(index) => index,
			Self::Lance(index) => index,
		}
	}
}

#[async_trait]
impl VectorIndex for VectorStore {
	fn dimensionality(&self) -> usize {
		self.inner().dimensionality()
	}

	fn metric(&self) -> Metric {
		self.inner().metric()
	}

	async fn upsert(&self, id: &ChunkId, vector: &[f32]) -> Result<()> {
		self.inner().upsert(id, vector).await
	}

	async fn remove(&self, id: &ChunkId) -> Result<()> {
		self.inner().remove(id).await
	}

	async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>> {
		self.inner().query(vector, k).await
	}

	async fn count(&self) -> Result<usize> {
		self.inner().count().await
	}

	async fn flush(&self) -> Result<()> {
		self.inner().flush().await
	}
}
