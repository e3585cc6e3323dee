//! Retrieval coordinator: owns both indexes and the document registry.
//!
//! Ingestion runs `Pending -> Chunking -> Indexing -> Committed` per
//! document. Chunking and embedding happen outside any index lock; the
//! resulting writes are then published under the exclusive side of
//! `publish`, which queries hold in shared mode for the whole of both
//! sub-queries. A query therefore sees each document either fully committed
//! or not at all.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{Mutex as AsyncMutex, RwLock as AsyncRwLock};
use tracing::instrument;

use ragdb_core::chunker::chunk;
use ragdb_core::config::{RagConfig, RetrievalConfig};
use ragdb_core::error::{Error, Result};
use ragdb_core::traits::{check_vector, EmbeddingProvider, VectorIndex};
use ragdb_core::types::{Chunk, ChunkId, Document, DocumentId, IngestState, Passage, RankedResult, SearchHit, SourceDocument};
use ragdb_embed::build_embedder;
use ragdb_text::Bm25Index;
use ragdb_vector::VectorStore;

use crate::fusion::fuse;

/// One question plus optional per-request overrides of the configured
/// retrieval settings.
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub question: String,
    pub top_k: Option<usize>,
    pub alpha: Option<f32>,
    pub similarity_threshold: Option<f32>,
    pub timeout: Option<Duration>,
}

impl QueryRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self { question: question.into(), ..Self::default() }
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn alpha(mut self, alpha: f32) -> Self {
        self.alpha = Some(alpha);
        self
    }

    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = Some(threshold);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

struct Entry {
    document: Document,
    chunks: Vec<Chunk>,
    // Kept so a failed replacement can restore this version.
    vectors: Vec<Vec<f32>>,
}

#[derive(Default)]
struct Registry {
    committed: HashMap<DocumentId, Entry>,
    states: HashMap<DocumentId, IngestState>,
}

pub struct RetrievalCoordinator {
    config: RagConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    vector: Arc<dyn VectorIndex>,
    lexical: Bm25Index,
    publish: AsyncRwLock<()>,
    ingest_locks: Mutex<HashMap<DocumentId, Arc<AsyncMutex<()>>>>,
    registry: RwLock<Registry>,
}

impl RetrievalCoordinator {
    /// Validate `config` and take ownership of the collaborators. The
    /// embedder and the vector index must agree on dimensionality.
    pub fn init(config: RagConfig, embedder: Arc<dyn EmbeddingProvider>, vector: Arc<dyn VectorIndex>) -> Result<Self> {
        config.validate()?;
        if embedder.dim() != vector.dimensionality() {
            return Err(Error::DimensionMismatch { expected: vector.dimensionality(), actual: embedder.dim() });
        }
        let lexical = Bm25Index::new(config.bm25)?;
        tracing::info!(
            embedder = embedder.embedder_id(),
            dim = vector.dimensionality(),
            metric = %vector.metric(),
            "retrieval coordinator ready"
        );
        Ok(Self {
            config,
            embedder,
            vector,
            lexical,
            publish: AsyncRwLock::new(()),
            ingest_locks: Mutex::new(HashMap::new()),
            registry: RwLock::new(Registry::default()),
        })
    }

    /// Build the embedder and vector backend named by `config`.
    pub async fn from_config(config: RagConfig) -> Result<Self> {
        config.validate()?;
        let embedder = build_embedder(&config.embedder)?;
        let vector = VectorStore::from_config(&config.vector, embedder.dim()).await?;
        Self::init(config, embedder, Arc::new(vector))
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn vector_index(&self) -> &Arc<dyn VectorIndex> {
        &self.vector
    }

    pub fn lexical_index(&self) -> &Bm25Index {
        &self.lexical
    }

    fn ingest_lock(&self, id: &DocumentId) -> Arc<AsyncMutex<()>> {
        self.ingest_locks.lock().entry(id.clone()).or_default().clone()
    }

    /// Drop the per-document lock once no other task holds or awaits it.
    fn release_ingest_lock(&self, id: &DocumentId, lock: Arc<AsyncMutex<()>>) {
        let mut locks = self.ingest_locks.lock();
        // One reference in the map, one in `lock`.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(id);
        }
    }

    fn set_state(&self, id: &DocumentId, next: IngestState) {
        let mut registry = self.registry.write();
        let prev = registry.states.insert(id.clone(), next);
        if let Some(prev) = prev {
            debug_assert!(next == IngestState::Pending || prev.can_advance_to(next), "{prev:?} -> {next:?}");
        }
        tracing::debug!(doc = %id, ?prev, ?next, "ingest state");
    }

    /// After a failed attempt the document is `Committed` if its previous
    /// version is still served, `Failed` otherwise.
    fn settle_failure(&self, id: &DocumentId) -> IngestState {
        let mut registry = self.registry.write();
        let state = if registry.committed.contains_key(id) { IngestState::Committed } else { IngestState::Failed };
        registry.states.insert(id.clone(), state);
        state
    }

    /// Chunk, embed and index one document, replacing any earlier version
    /// with the same id. Re-ingesting identical text is a no-op. On failure
    /// the indexes are left as they were before the call.
    #[instrument(skip(self, source), fields(doc = %source.id))]
    pub async fn ingest(&self, source: SourceDocument) -> Result<Document> {
        let id = source.id.clone();
        let lock = self.ingest_lock(&id);
        let result = {
            let _doc_guard = lock.lock().await;
            self.ingest_locked(source).await
        };
        self.release_ingest_lock(&id, lock);
        result
    }

    async fn ingest_locked(&self, source: SourceDocument) -> Result<Document> {
        let content_hash = Document::hash_text(&source.text);
        {
            let registry = self.registry.read();
            if let Some(entry) = registry.committed.get(&source.id) {
                if entry.document.content_hash == content_hash {
                    tracing::debug!("content unchanged, skipping");
                    return Ok(entry.document.clone());
                }
            }
        }

        let id = source.id.clone();
        self.set_state(&id, IngestState::Pending);
        match self.ingest_inner(source, content_hash).await {
            Ok(document) => Ok(document),
            Err(e) => {
                let state = self.settle_failure(&id);
                tracing::warn!(error = %e, ?state, "ingestion failed");
                Err(e)
            }
        }
    }

    async fn ingest_inner(&self, source: SourceDocument, content_hash: String) -> Result<Document> {
        let start = Instant::now();
        self.set_state(&source.id, IngestState::Chunking);
        if source.text.trim().is_empty() {
            return Err(Error::EmptyDocument(source.id));
        }
        let chunking = self.config.chunking;
        let chunks = chunk(&source.id, &source.text, chunking.size, chunking.overlap)?;

        self.set_state(&source.id, IngestState::Indexing);
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        if vectors.len() != chunks.len() {
            return Err(Error::provider(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }
        let dim = self.vector.dimensionality();
        for vector in &vectors {
            check_vector(dim, vector)?;
        }

        let _publish = self.publish.write().await;
        let previous: Option<(Vec<Chunk>, Vec<Vec<f32>>)> = self
            .registry
            .read()
            .committed
            .get(&source.id)
            .map(|entry| (entry.chunks.clone(), entry.vectors.clone()));
        let stale: Vec<ChunkId> = previous
            .iter()
            .flat_map(|(old, _)| old.iter().skip(chunks.len()).map(|c| c.id.clone()))
            .collect();

        if let Err(e) = self.publish_chunks(&chunks, &vectors, &stale).await {
            self.rollback(&source.id, &chunks, previous).await;
            return Err(e);
        }

        let document = Document {
            id: source.id.clone(),
            filename: source.filename,
            uploaded_at: Utc::now(),
            chunk_count: chunks.len(),
            content_hash,
        };
        {
            let mut registry = self.registry.write();
            registry.committed.insert(source.id.clone(), Entry { document: document.clone(), chunks, vectors });
        }
        self.set_state(&source.id, IngestState::Committed);
        tracing::info!(
            chunks = document.chunk_count,
            replaced = stale.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "document committed"
        );
        Ok(document)
    }

    /// Write the new chunks to both indexes, then drop chunks of the
    /// previous version that the new one no longer covers.
    async fn publish_chunks(&self, chunks: &[Chunk], vectors: &[Vec<f32>], stale: &[ChunkId]) -> Result<()> {
        for (chunk, vector) in chunks.iter().zip(vectors) {
            self.vector.upsert(&chunk.id, vector).await?;
            self.lexical.upsert(&chunk.id, &chunk.text);
        }
        for id in stale {
            self.lexical.remove(id);
            self.vector.remove(id).await?;
        }
        Ok(())
    }

    /// Undo a partial publish and restore the previous version, if any.
    /// Failures here are logged; the caller returns the error that triggered
    /// the rollback. If the previous version cannot be restored it is
    /// withdrawn from the registry, so its leftover vector rows are never
    /// served.
    async fn rollback(&self, id: &DocumentId, written: &[Chunk], previous: Option<(Vec<Chunk>, Vec<Vec<f32>>)>) {
        for chunk in written {
            self.lexical.remove(&chunk.id);
            if let Err(e) = self.vector.remove(&chunk.id).await {
                tracing::error!(chunk = %chunk.id, error = %e, "rollback failed to remove chunk from vector index");
            }
        }
        let Some((old_chunks, old_vectors)) = previous else {
            tracing::warn!(chunks = written.len(), "rolled back partial ingestion");
            return;
        };

        let mut restored = true;
        for (chunk, vector) in old_chunks.iter().zip(&old_vectors) {
            self.lexical.upsert(&chunk.id, &chunk.text);
            if let Err(e) = self.vector.upsert(&chunk.id, vector).await {
                tracing::error!(chunk = %chunk.id, error = %e, "rollback failed to restore previous chunk");
                restored = false;
            }
        }
        if restored {
            tracing::warn!(chunks = written.len(), "rolled back partial ingestion, previous version restored");
        } else {
            for chunk in &old_chunks {
                self.lexical.remove(&chunk.id);
            }
            self.registry.write().committed.remove(id);
            tracing::error!("previous version could not be restored and was withdrawn");
        }
    }

    async fn remove_chunks(&self, ids: &[ChunkId]) -> Result<()> {
        let mut first_err = None;
        for id in ids {
            self.lexical.remove(id);
            if let Err(e) = self.vector.remove(id).await {
                tracing::error!(chunk = %id, error = %e, "failed to remove chunk from vector index");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Remove every chunk of a document from both indexes. Unknown ids are
    /// a successful no-op.
    #[instrument(skip(self))]
    pub async fn delete_document(&self, id: &DocumentId) -> Result<()> {
        let lock = self.ingest_lock(id);
        let result = {
            let _doc_guard = lock.lock().await;
            self.delete_locked(id).await
        };
        self.release_ingest_lock(id, lock);
        result
    }

    async fn delete_locked(&self, id: &DocumentId) -> Result<()> {
        let _publish = self.publish.write().await;
        let entry = {
            let mut registry = self.registry.write();
            registry.states.remove(id);
            registry.committed.remove(id)
        };
        let Some(entry) = entry else {
            tracing::debug!("document not present");
            return Ok(());
        };
        let ids: Vec<ChunkId> = entry.chunks.iter().map(|c| c.id.clone()).collect();
        self.remove_chunks(&ids).await?;
        tracing::info!(chunks = ids.len(), "document deleted");
        Ok(())
    }

    fn resolve(&self, request: &QueryRequest) -> Result<RetrievalConfig> {
        let defaults = &self.config.retrieval;
        let params = RetrievalConfig {
            top_k: request.top_k.unwrap_or(defaults.top_k),
            alpha: request.alpha.unwrap_or(defaults.alpha),
            similarity_threshold: request.similarity_threshold.unwrap_or(defaults.similarity_threshold),
            candidate_multiplier: defaults.candidate_multiplier,
            query_timeout_ms: request
                .timeout
                .map(|t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX))
                .or(defaults.query_timeout_ms),
        };
        params.validate()?;
        Ok(params)
    }

    /// Ranked chunks for a question, fused from both indexes.
    #[instrument(skip(self, request), fields(question = %request.question))]
    pub async fn query(&self, request: &QueryRequest) -> Result<Vec<RankedResult>> {
        let params = self.resolve(request)?;
        with_deadline(params.query_timeout_ms.map(Duration::from_millis), async {
            let _publish = self.publish.read().await;
            self.ranked(&request.question, &params).await
        })
        .await
    }

    /// Like [`query`](Self::query), joined with chunk text and attribution.
    #[instrument(skip(self, request), fields(question = %request.question))]
    pub async fn retrieve(&self, request: &QueryRequest) -> Result<Vec<Passage>> {
        let params = self.resolve(request)?;
        with_deadline(params.query_timeout_ms.map(Duration::from_millis), async {
            let _publish = self.publish.read().await;
            let results = self.ranked(&request.question, &params).await?;
            Ok(self.passages(results))
        })
        .await
    }

    // Callers hold the shared publish guard.
    async fn ranked(&self, question: &str, params: &RetrievalConfig) -> Result<Vec<RankedResult>> {
        if self.registry.read().committed.is_empty() {
            return Err(Error::IndexEmpty);
        }
        let start = Instant::now();
        let pool = params.top_k.saturating_mul(params.candidate_multiplier);

        let vector_side = async {
            let embedding = self.embedder.embed(question).await?;
            self.vector.query(&embedding, pool).await
        };
        let lexical_side = async { Ok::<_, Error>(self.lexical.query(question, pool)) };
        let (vector_hits, lexical_hits) = tokio::join!(vector_side, lexical_side);
        let vector_hits = self.committed_only(vector_hits?);
        let lexical_hits = self.committed_only(lexical_hits?);

        let mut results = fuse(&vector_hits, &lexical_hits, params.alpha, params.top_k)?;
        results.retain(|r| r.fused_score >= params.similarity_threshold);
        tracing::debug!(
            vector = vector_hits.len(),
            lexical = lexical_hits.len(),
            results = results.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "query fused"
        );
        Ok(results)
    }

    /// Drop hits for chunks no committed document owns, e.g. rows left in a
    /// persistent backend by an earlier process.
    fn committed_only(&self, mut hits: Vec<SearchHit>) -> Vec<SearchHit> {
        let registry = self.registry.read();
        hits.retain(|hit| {
            registry
                .committed
                .get(&hit.id.document)
                .is_some_and(|entry| (hit.id.seq as usize) < entry.chunks.len())
        });
        hits
    }

    fn passages(&self, results: Vec<RankedResult>) -> Vec<Passage> {
        let registry = self.registry.read();
        results
            .into_iter()
            .filter_map(|result| {
                let entry = registry.committed.get(&result.chunk_id.document)?;
                let chunk = entry.chunks.get(result.chunk_id.seq as usize)?;
                Some((entry, chunk.clone(), result))
            })
            .enumerate()
            .map(|(i, (entry, chunk, result))| Passage {
                rank: i + 1,
                text: chunk.text,
                document_id: entry.document.id.clone(),
                filename: entry.document.filename.clone(),
                start: chunk.start,
                end: chunk.end,
                result,
            })
            .collect()
    }

    pub fn document(&self, id: &DocumentId) -> Result<Document> {
        self.registry
            .read()
            .committed
            .get(id)
            .map(|entry| entry.document.clone())
            .ok_or_else(|| Error::NotFound(format!("document '{id}'")))
    }

    /// Committed documents ordered by id.
    pub fn documents(&self) -> Vec<Document> {
        let mut docs: Vec<Document> = self.registry.read().committed.values().map(|e| e.document.clone()).collect();
        docs.sort_by(|a, b| a.id.cmp(&b.id));
        docs
    }

    pub fn chunks(&self, id: &DocumentId) -> Result<Vec<Chunk>> {
        self.registry
            .read()
            .committed
            .get(id)
            .map(|entry| entry.chunks.clone())
            .ok_or_else(|| Error::NotFound(format!("document '{id}'")))
    }

    pub fn state(&self, id: &DocumentId) -> Option<IngestState> {
        self.registry.read().states.get(id).copied()
    }

    /// Flush the vector backend and release both indexes.
    pub async fn shutdown(self) -> Result<()> {
        let _publish = self.publish.write().await;
        self.vector.flush().await?;
        tracing::info!(documents = self.registry.read().committed.len(), "retrieval coordinator shut down");
        Ok(())
    }
}

async fn with_deadline<T>(deadline: Option<Duration>, fut: impl Future<Output = Result<T>>) -> Result<T> {
    match deadline {
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| Error::Timeout(limit))?,
        None => fut.await,
    }
}
