use crate::{ChunkRecord, ScoredChunk, SearchError};
use std::path::Path;

pub trait VectorIndex {
    fn index_chunks(
        &mut self,
        chunks: &[ChunkRecord],
        embeddings: &[Vec<f32>],
    ) -> Result<(), SearchError>;

    /// Up to `top_k` stored chunks, most similar first.
    fn search_vector(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, SearchError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A vector index that lives in a directory between runs.
pub trait PersistentIndex: VectorIndex + Sized {
    fn create(model_id: &str) -> Self;

    fn open(dir: &Path) -> Result<Self, SearchError>;

    fn persist(&self, dir: &Path) -> Result<(), SearchError>;

    /// Embedding model the stored vectors came from.
    fn model_id(&self) -> &str;
}
