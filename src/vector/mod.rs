//! Vector side of the engine: fixed-dimension embeddings keyed by chunk
//! id, cosine kNN search, and file + sidecar persistence.

pub mod flat;
pub mod hnsw;

pub use flat::{FlatVectorIndex, VectorIndexMeta};
pub use hnsw::{HnswConfig, HnswGraph};

use crate::error::Result;
use crate::types::CancelToken;
use std::path::Path;

/// One embedding ready for insertion.
#[derive(Debug, Clone)]
pub struct ChunkEmbedding {
    pub chunk_id: String,
    pub vector: Vec<f32>,
}

/// Options accepted by a vector search.
#[derive(Debug, Clone, Copy, Default)]
pub struct VectorSearchOptions {
    /// Results scoring below this are dropped.
    pub min_score: f32,
}

/// One nearest-neighbor result.
#[derive(Debug, Clone)]
pub struct VectorSearchResult {
    pub chunk_id: String,
    /// Cosine similarity in [-1, 1].
    pub score: f32,
    /// Euclidean distance between the stored and query vectors.
    pub distance: f32,
}

/// Point-in-time statistics surfaced by `stats()`.
#[derive(Debug, Clone)]
pub struct VectorStats {
    pub total_vectors: usize,
    pub dimension: usize,
    pub metric: &'static str,
}

/// Contract of the vector indexer.
pub trait VectorIndex: Send + Sync {
    fn add_vectors(&self, embeddings: &[ChunkEmbedding], token: &CancelToken) -> Result<()>;
    fn search(
        &self,
        query: &[f32],
        k: usize,
        options: &VectorSearchOptions,
    ) -> Result<Vec<VectorSearchResult>>;
    fn delete(&self, chunk_ids: &[String]) -> Result<()>;
    /// Removes every chunk whose id starts with `prefix` (used for file
    /// deletes, where the prefix is `"<path>:"`). Returns the number
    /// removed.
    fn delete_prefix(&self, prefix: &str) -> Result<usize>;
    fn save(&self, path: &Path) -> Result<()>;
    fn load(&self, path: &Path) -> Result<()>;
    fn stats(&self) -> Result<VectorStats>;
    fn close(&self) -> Result<()>;
}
