//! LanceDB-backed vector index.
//!
//! One table of `(id, vector)` rows. Upserts go through `merge_insert` keyed
//! on `id`, so a chunk never has more than one row. Queries run an exact
//! (unindexed) scan with the table's distance type and report
//! `1 - distance` as similarity.

use anyhow::{anyhow, Context};
use arrow_array::{Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection, DistanceType, Table};
use std::sync::Arc;

use ragdb_core::error::{Error, Result};
use ragdb_core::traits::{check_vector, VectorIndex};
use ragdb_core::types::{sort_hits, ChunkId, Metric, SearchHit, SourceKind};

use crate::schema::{build_arrow_schema, vector_width, ID_COLUMN, VECTOR_COLUMN};

pub struct LanceIndex {
	table: Table,
	dim: usize,
	metric: Metric,
}

fn backend(e: anyhow::Error) -> Error {
	Error::operation(format!("lancedb: {e:#}"))
}

fn distance_type(metric: Metric) -> DistanceType {
	match metric {
		Metric::Cosine => DistanceType::Cosine,
		Metric::InnerProduct => DistanceType::Dot,
	}
}

fn escape(id: &ChunkId) -> String {
	id.to_string().replace('\'', "''")
}

impl LanceIndex {
	/// Open `table_name` under `uri`, creating it when missing. An existing
	/// table whose vector width differs from `dim` is rejected.
	pub async fn open(uri: &str, table_name: &str, dim: usize, metric: Metric) -> Result<Self> {
		let width = i32::try_from(dim).map_err(|_| Error::invalid_config(format!("vector dimensionality {dim} is too large")))?;
		if dim == 0 {
			return Err(Error::invalid_config("vector dimensionality must be greater than 0"));
		}
		let conn = connect(uri).execute().await.map_err(|e| backend(e.into()))?;
		let table = Self::ensure_table(&conn, table_name, width).await.map_err(backend)?;
		let schema = table.schema().await.map_err(|e| backend(e.into()))?;
		match vector_width(&schema) {
			Some(existing) if existing == dim => {}
			Some(existing) => return Err(Error::DimensionMismatch { expected: existing, actual: dim }),
			None => return Err(Error::operation(format!("table '{table_name}' has no '{VECTOR_COLUMN}' column"))),
		}
		tracing::info!(uri, table = table_name, dim, %metric, "opened lance vector index");
		Ok(Self { table, dim, metric })
	}

	async fn ensure_table(conn: &Connection, name: &str, width: i32) -> anyhow::Result<Table> {
		let names = conn.table_names().execute().await?;
		if names.iter().any(|n| n == name) {
			return Ok(conn.open_table(name).execute().await?);
		}
		let schema = build_arrow_schema(width);
		let iter = RecordBatchIterator::new(vec![].into_iter(), schema.clone());
		Ok(conn.create_table(name, Box::new(iter)).execute().await?)
	}

	fn record_batch(&self, id: &ChunkId, vector: &[f32]) -> anyhow::Result<RecordBatch> {
		let width = i32::try_from(self.dim)?;
		let vectors = vec![Some(vector.iter().map(|&x| Some(x)).collect::<Vec<_>>())];
		Ok(RecordBatch::try_new(
			build_arrow_schema(width),
			vec![
				Arc::new(StringArray::from(vec![id.to_string()])),
				Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors, width)),
			],
		)?)
	}

	async fn upsert_inner(&self, id: &ChunkId, vector: &[f32]) -> anyhow::Result<()> {
		let rb = self.record_batch(id, vector)?;
		let schema = rb.schema();
		let reader = Box::new(RecordBatchIterator::new(vec![Ok(rb)].into_iter(), schema));
		let mut mi = self.table.merge_insert(&[ID_COLUMN]);
		mi.when_matched_update_all(None).when_not_matched_insert_all();
		let _ = mi.execute(reader).await?;
		Ok(())
	}

	async fn search(&self, vector: &[f32], limit: usize) -> anyhow::Result<Vec<SearchHit>> {
		let mut stream = self
			.table
			.vector_search(vector.to_vec())?
			.distance_type(distance_type(self.metric))
			.limit(limit)
			.execute()
			.await?;
		let mut hits = Vec::new();
		while let Some(batch) = stream.try_next().await? {
			let ids = batch
				.column_by_name(ID_COLUMN)
				.and_then(|c| c.as_any().downcast_ref::<StringArray>())
				.ok_or_else(|| anyhow!("result batch has no '{ID_COLUMN}' column"))?;
			let distances = batch
				.column_by_name("_distance")
				.and_then(|c| c.as_any().downcast_ref::<Float32Array>())
				.ok_or_else(|| anyhow!("result batch has no '_distance' column"))?;
			for i in 0..batch.num_rows() {
				if distances.is_null(i) {
					continue;
				}
				let id: ChunkId = ids.value(i).parse().with_context(|| format!("row {i}"))?;
				hits.push(SearchHit::new(id, 1.0 - distances.value(i), SourceKind::Vector));
			}
		}
		sort_hits(&mut hits);
		Ok(hits)
	}

	/// LanceDB picks arbitrarily among rows tied at its limit, so the limit
	/// grows while the group tied with the k-th score may extend past it
	/// (until the table is exhausted). The final cut then follows `sort_hits`.
	async fn query_inner(&self, vector: &[f32], k: usize) -> anyhow::Result<Vec<SearchHit>> {
		let total = self.table.count_rows(None).await?;
		if total == 0 {
			return Ok(Vec::new());
		}
		let mut limit = k.saturating_add(1).min(total);
		loop {
			let mut hits = self.search(vector, limit).await?;
			let tie_may_continue = hits.len() > k
				&& hits.len() == limit
				&& hits.last().is_some_and(|last| last.score == hits[k - 1].score);
			if !tie_may_continue || limit >= total {
				hits.truncate(k);
				return Ok(hits);
			}
			limit = limit.saturating_mul(2).min(total);
		}
	}
}

#[async_trait]
impl VectorIndex for LanceIndex {
	fn dimensionality(&self) -> usize {
		self.dim
	}

	fn metric(&self) -> Metric {
		self.metric
	}

	async fn upsert(&self, id: &ChunkId, vector: &[f32]) -> Result<()> {
		check_vector(self.dim, vector)?;
		self.upsert_inner(id, vector).await.map_err(backend)
	}

	async fn remove(&self, id: &ChunkId) -> Result<()> {
		let predicate = format!("{ID_COLUMN} = '{}'", escape(id));
		self.table.delete(&predicate).await.map_err(|e| backend(e.into()))?;
		Ok(())
	}

	async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>> {
		check_vector(self.dim, vector)?;
		if k == 0 {
			return Ok(Vec::new());
		}
		self.query_inner(vector, k).await.map_err(backend)
	}

	async fn count(&self) -> Result<usize> {
		self.table.count_rows(None).await.map_err(|e| backend(e.into()))
	}
}
