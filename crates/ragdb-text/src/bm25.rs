//! In-memory BM25 index over chunk text.
//!
//! Postings are kept exact under replacement and removal: every chunk
//! remembers the term frequencies it contributed, so `upsert` and `remove`
//! subtract precisely that contribution and prune terms whose posting list
//! becomes empty. A single chunk's update happens under one write lock, so
//! readers never see half of it.

use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};

use ragdb_core::config::Bm25Config;
use ragdb_core::error::Result;
use ragdb_core::types::{sort_hits, ChunkId, SearchHit, SourceKind};

use crate::analyzer::Analyzer;

#[derive(Debug, Default)]
struct ChunkTerms {
	freqs: HashMap<String, u32>,
	len: u32,
}

#[derive(Debug, Default)]
struct Postings {
	chunks: HashMap<ChunkId, ChunkTerms>,
	/// term -> (chunk -> tf); document frequency is the inner map's length.
	terms: HashMap<String, HashMap<ChunkId, u32>>,
	total_len: u64,
}

impl Postings {
	fn subtract(&mut self, id: &ChunkId) -> bool {
		let Some(entry) = self.chunks.remove(id) else { return false };
		self.total_len -= u64::from(entry.len);
		for term in entry.freqs.keys() {
			if let Some(list) = self.terms.get_mut(term) {
				list.remove(id);
				if list.is_empty() {
					self.terms.remove(term);
				}
			}
		}
		true
	}

	fn add(&mut self, id: &ChunkId, tokens: Vec<String>) {
		let len = u32::try_from(tokens.len()).unwrap_or(u32::MAX);
		let mut freqs: HashMap<String, u32> = HashMap::new();
		for token in tokens {
			*freqs.entry(token).or_default() += 1;
		}
		for (term, tf) in &freqs {
			self.terms.entry(term.clone()).or_default().insert(id.clone(), *tf);
		}
		self.total_len += u64::from(len);
		self.chunks.insert(id.clone(), ChunkTerms { freqs, len });
	}

	fn avg_len(&self) -> f64 {
		if self.chunks.is_empty() {
			0.0
		} else {
			self.total_len as f64 / self.chunks.len() as f64
		}
	}
}

/// `ln(1 + (N - df + 0.5) / (df + 0.5))`; always positive.
pub fn idf(total_chunks: usize, doc_freq: usize) -> f64 {
	let n = total_chunks as f64;
	let df = doc_freq as f64;
	(1.0 + (n - df + 0.5) / (df + 0.5)).ln()
}

/// Contribution of one term to one chunk's score.
pub fn term_score(idf: f64, tf: u32, chunk_len: u32, avg_len: f64, params: &Bm25Config) -> f64 {
	let k1 = f64::from(params.k1);
	let b = f64::from(params.b);
	let tf = f64::from(tf);
	let length_ratio = if avg_len > 0.0 { f64::from(chunk_len) / avg_len } else { 0.0 };
	idf * (tf * (k1 + 1.0)) / (tf + k1 * (1.0 - b + b * length_ratio))
}

#[derive(Debug)]
pub struct Bm25Index {
	params: Bm25Config,
	analyzer: Analyzer,
	state: RwLock<Postings>,
}

impl Bm25Index {
	pub fn new(params: Bm25Config) -> Result<Self> {
		params.validate()?;
		Ok(Self { params, analyzer: Analyzer::new(params.stop_words), state: RwLock::new(Postings::default()) })
	}

	pub fn params(&self) -> &Bm25Config {
		&self.params
	}

	pub fn analyzer(&self) -> &Analyzer {
		&self.analyzer
	}

	/// Index `text` under `id`, replacing any earlier contribution of `id`.
	pub fn upsert(&self, id: &ChunkId, text: &str) {
		let tokens = self.analyzer.analyze(text);
		let mut state = self.state.write();
		let replaced = state.subtract(id);
		state.add(id, tokens);
		tracing::trace!(chunk = %id, replaced, "bm25 upsert");
	}

	/// Returns whether the chunk was present. Unknown ids are a no-op.
	pub fn remove(&self, id: &ChunkId) -> bool {
		self.state.write().subtract(id)
	}

	/// Top `k` chunks by BM25 score, descending, ties by ascending chunk id.
	/// Chunks matching no query term are never returned.
	pub fn query(&self, text: &str, k: usize) -> Vec<SearchHit> {
		if k == 0 {
			return Vec::new();
		}
		// Sorted distinct terms keep float summation order reproducible.
		let terms: BTreeSet<String> = self.analyzer.analyze(text).into_iter().collect();
		if terms.is_empty() {
			return Vec::new();
		}

		let state = self.state.read();
		let n = state.chunks.len();
		if n == 0 {
			return Vec::new();
		}
		let avg_len = state.avg_len();

		let mut scores: HashMap<&ChunkId, f64> = HashMap::new();
		for term in &terms {
			let Some(list) = state.terms.get(term) else { continue };
			let term_idf = idf(n, list.len());
			for (id, tf) in list {
				let chunk_len = state.chunks.get(id).map_or(0, |c| c.len);
				*scores.entry(id).or_default() += term_score(term_idf, *tf, chunk_len, avg_len, &self.params);
			}
		}

		#[allow(clippy::cast_possible_truncation)]
		let mut hits: Vec<SearchHit> = scores
			.into_iter()
			.map(|(id, score)| SearchHit::new(id.clone(), score as f32, SourceKind::Lexical))
			.collect();
		sort_hits(&mut hits);
		hits.truncate(k);
		tracing::debug!(terms = terms.len(), hits = hits.len(), "bm25 query");
		hits
	}

	pub fn len(&self) -> usize {
		self.state.read().chunks.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn contains(&self, id: &ChunkId) -> bool {
		self.state.read().chunks.contains_key(id)
	}

	/// Number of chunks containing the (already normalized) term.
	pub fn doc_freq(&self, term: &str) -> usize {
		self.state.read().terms.get(term).map_or(0, HashMap::len)
	}

	pub fn term_freq(&self, id: &ChunkId, term: &str) -> u32 {
		self.state.read().chunks.get(id).and_then(|c| c.freqs.get(term).copied()).unwrap_or(0)
	}

	pub fn vocabulary_len(&self) -> usize {
		self.state.read().terms.len()
	}

	pub fn avg_chunk_len(&self) -> f64 {
		self.state.read().avg_len()
	}
}
