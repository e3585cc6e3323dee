//! ragdb-vector
//!
//! Vector index backends: `FlatIndex` (exact, in memory) and `LanceIndex`
//! (LanceDB table on disk), unified by `VectorStore` for configuration-time
//! selection.

pub mod flat;
pub mod lance;
pub mod schema;
pub mod store;

pub use flat::FlatIndex;
pub use lance::LanceIndex;
pub use store::VectorStore;
