//! Domain types shared by the lexical and vector engines and the coordinator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Stable identity of an ingested document (file stem or external id).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of a chunk: owning document plus sequence index.
///
/// Ordering is by document id, then numerically by sequence, which is the
/// tie-break order for every ranked list in the engine. The textual form is
/// `<document_id>#<seq>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkId {
    pub document: DocumentId,
    pub seq: u32,
}

impl ChunkId {
    pub fn new(document: DocumentId, seq: u32) -> Self {
        Self { document, seq }
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.document, self.seq)
    }
}

impl FromStr for ChunkId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (doc, seq) = s
            .rsplit_once('#')
            .ok_or_else(|| Error::NotFound(format!("malformed chunk id '{s}'")))?;
        let seq = seq
            .parse::<u32>()
            .map_err(|_| Error::NotFound(format!("malformed chunk id '{s}'")))?;
        Ok(Self::new(DocumentId::from(doc), seq))
    }
}

/// Raw extracted text of one source document, as handed over by extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    pub id: DocumentId,
    pub filename: String,
    pub text: String,
}

impl SourceDocument {
    pub fn new(id: impl Into<DocumentId>, filename: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), filename: filename.into(), text: text.into() }
    }
}

/// A committed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub filename: String,
    pub uploaded_at: DateTime<Utc>,
    pub chunk_count: usize,
    /// BLAKE3 hex digest of the extracted text.
    pub content_hash: String,
}

impl Document {
    pub fn hash_text(text: &str) -> String {
        blake3::hash(text.as_bytes()).to_hex().to_string()
    }
}

/// A chunk of a source document that is independently indexed.
///
/// `start`/`end` are character (not byte) offsets into the source text,
/// `end` exclusive. `position` is the ordinal within the parent document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub position: usize,
}

impl Chunk {
    pub fn document_id(&self) -> &DocumentId {
        &self.id.document
    }

    pub fn char_len(&self) -> usize {
        self.end - self.start
    }
}

/// Indicates which engine produced a result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SourceKind {
    Vector,
    Lexical,
}

/// The minimal surface returned by both sub-indexes.
///
/// `score` is engine-specific but higher is always better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: ChunkId,
    pub score: f32,
    pub source: SourceKind,
}

impl SearchHit {
    pub fn new(id: ChunkId, score: f32, source: SourceKind) -> Self {
        Self { id, score, source }
    }
}

/// Sort hits descending by score, ties by ascending chunk id.
pub fn sort_hits(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
}

/// Similarity metric of a vector index, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    #[default]
    Cosine,
    InnerProduct,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Cosine => f.write_str("cosine"),
            Metric::InnerProduct => f.write_str("inner_product"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub count: usize,
    pub dimensionality: usize,
    pub metric: Metric,
}

/// One entry of a fused ranking. Component scores are the min-max
/// normalized values that entered the blend, 0 when the side did not
/// return the chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub chunk_id: ChunkId,
    pub fused_score: f32,
    pub vector_score: f32,
    pub lexical_score: f32,
}

/// A ranked chunk joined with its text and source attribution, ready for
/// the generation step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passage {
    pub rank: usize,
    pub result: RankedResult,
    pub text: String,
    pub document_id: DocumentId,
    pub filename: String,
    pub start: usize,
    pub end: usize,
}

/// Ingestion lifecycle of one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IngestState {
    Pending,
    Chunking,
    Indexing,
    Committed,
    Failed,
}

impl IngestState {
    /// Legal forward transitions; every non-terminal state may fail.
    pub fn can_advance_to(self, next: IngestState) -> bool {
        use IngestState::{Chunking, Committed, Failed, Indexing, Pending};
        matches!(
            (self, next),
            (Pending, Chunking)
                | (Chunking, Indexing)
                | (Indexing, Committed)
                | (Pending | Chunking | Indexing, Failed)
        )
    }
}
