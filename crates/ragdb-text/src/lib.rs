//! ragdb-text
//!
//! Lexical side of the hybrid engine: a tantivy-based analyzer and an
//! in-memory BM25 index with exact replacement and removal of chunks.

pub mod analyzer;
pub mod bm25;

pub use analyzer::Analyzer;
pub use bm25::Bm25Index;
