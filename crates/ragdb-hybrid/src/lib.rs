//! ragdb-hybrid
//!
//! Weighted fusion of vector and BM25 rankings, and the coordinator that
//! ingests documents into both indexes and answers questions over them.

pub mod coordinator;
pub mod fusion;

pub use coordinator::{QueryRequest, RetrievalCoordinator};
pub use fusion::{fuse, normalize};
