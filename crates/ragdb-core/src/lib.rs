//! ragdb-core
//!
//! Shared vocabulary of the hybrid retrieval engine: identifiers and records
//! (`types`), the error taxonomy (`error`), configuration (`config`), the
//! chunker (`chunker`), collaborator traits (`traits`) and a directory loader
//! for extracted text (`data_processor`).

pub mod chunker;
pub mod config;
pub mod data_processor;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
