use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use ragdb_core::error::{Error, Result};
use ragdb_core::traits::{check_vector, VectorIndex};
use ragdb_core::types::{sort_hits, ChunkId, Metric, SearchHit, SourceKind};

struct Record {
	vector: Vec<f32>,
	norm: f64,
}

/// Exact nearest-neighbour search over vectors held in memory.
///
/// Every query scans all records, so results are exact and reproducible.
pub struct FlatIndex {
	dim: usize,
	metric: Metric,
	records: RwLock<HashMap<ChunkId, Record>>,
}

impl FlatIndex {
	pub fn new(dim: usize, metric: Metric) -> Result<Self> {
		if dim == 0 {
			return Err(Error::invalid_config("vector dimensionality must be greater than 0"));
		}
		Ok(Self { dim, metric, records: RwLock::new(HashMap::new()) })
	}

	// Accumulated in f64; a product that overflows f32 saturates to +-f32::MAX.
	#[allow(clippy::cast_possible_truncation)]
	fn similarity(&self, query: &[f32], query_norm: f64, record: &Record) -> f32 {
		let dot: f64 = query.iter().zip(&record.vector).map(|(&a, &b)| f64::from(a) * f64::from(b)).sum();
		let score = match self.metric {
			Metric::InnerProduct => dot,
			Metric::Cosine => {
				let denom = query_norm * record.norm;
				if denom > 0.0 { dot / denom } else { 0.0 }
			}
		};
		(score as f32).clamp(f32::MIN, f32::MAX)
	}
}

fn l2_norm(v: &[f32]) -> f64 {
	v.iter().map(|&x| f64::from(x) * f64::from(x)).sum::<f64>().sqrt()
}

#[async_trait]
impl VectorIndex for FlatIndex {
	fn dimensionality(&self) -> usize {
		self.dim
	}

	fn metric(&self) -> Metric {
		self.metric
	}

	async fn upsert(&self, id: &ChunkId, vector: &[f32]) -> Result<()> {
		check_vector(self.dim, vector)?;
		let record = Record { vector: vector.to_vec(), norm: l2_norm(vector) };
		self.records.write().insert(id.clone(), record);
		Ok(())
	}

	async fn remove(&self, id: &ChunkId) -> Result<()> {
		self.records.write().remove(id);
		Ok(())
	}

	async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>> {
		check_vector(self.dim, vector)?;
		if k == 0 {
			return Ok(Vec::new());
		}
		let query_norm = l2_norm(vector);
		let records = self.records.read();
		let mut hits: Vec<SearchHit> = records
			.iter()
			.map(|(id, record)| SearchHit::new(id.clone(), self.similarity(vector, query_norm, record), SourceKind::Vector))
			.collect();
		drop(records);
		sort_hits(&mut hits);
		hits.truncate(k);
		Ok(hits)
	}

	async fn count(&self) -> Result<usize> {
		Ok(self.records.read().len())
	}
}
