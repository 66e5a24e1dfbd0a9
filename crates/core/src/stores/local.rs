use crate::models::{ChunkRecord, ScoredChunk};
use crate::traits::{PersistentIndex, VectorIndex};
use crate::SearchError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

pub const INDEX_FILE: &str = "index.json";
const FORMAT_VERSION: u32 = 1;

/// `true` when `dir` exists and holds at least one entry.
pub fn is_persisted(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChunk {
    pub id: String,
    pub chunk: ChunkRecord,
    pub embedding: Vec<f32>,
}

#[derive(Serialize, Deserialize)]
struct PersistedIndex {
    format_version: u32,
    model_id: String,
    dimensions: Option<usize>,
    built_at: DateTime<Utc>,
    entries: Vec<StoredChunk>,
}

/// Exact cosine-similarity index kept in memory and saved as one JSON file.
/// Chunks are stored verbatim next to their vectors.
#[derive(Debug, Clone)]
pub struct LocalVectorStore {
    model_id: String,
    dimensions: Option<usize>,
    built_at: DateTime<Utc>,
    entries: Vec<StoredChunk>,
}

impl LocalVectorStore {
    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn entries(&self) -> &[StoredChunk] {
        &self.entries
    }
}

impl VectorIndex for LocalVectorStore {
    fn index_chunks(
        &mut self,
        chunks: &[ChunkRecord],
        embeddings: &[Vec<f32>],
    ) -> Result<(), SearchError> {
        if chunks.len() != embeddings.len() {
            return Err(SearchError::Embedding(format!(
                "embedding count {} doesn't match chunk count {}",
                embeddings.len(),
                chunks.len()
            )));
        }

        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            let expected = *self.dimensions.get_or_insert(embedding.len());
            if embedding.len() != expected {
                return Err(SearchError::DimensionMismatch {
                    expected,
                    actual: embedding.len(),
                });
            }

            self.entries.push(StoredChunk {
                id: make_chunk_id(chunk, self.entries.len()),
                chunk: chunk.clone(),
                embedding: embedding.clone(),
            });
        }

        Ok(())
    }

    fn search_vector(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, SearchError> {
        if top_k == 0 {
            return Err(SearchError::InvalidTopK);
        }

        let Some(dimensions) = self.dimensions else {
            return Ok(Vec::new());
        };
        if query_vector.len() != dimensions {
            return Err(SearchError::DimensionMismatch {
                expected: dimensions,
                actual: query_vector.len(),
            });
        }

        let query_norm = norm(query_vector);
        let mut scored = self
            .entries
            .iter()
            .map(|entry| (cosine(query_vector, query_norm, &entry.embedding), entry))
            .collect::<Vec<_>>();

        // Stable sort: equal scores keep insertion order.
        scored.sort_by(|left, right| right.0.total_cmp(&left.0));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(score, entry)| ScoredChunk {
                chunk: entry.chunk.clone(),
                score,
            })
            .collect())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

impl PersistentIndex for LocalVectorStore {
    fn create(model_id: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            dimensions: None,
            built_at: Utc::now(),
            entries: Vec::new(),
        }
    }

    fn open(dir: &Path) -> Result<Self, SearchError> {
        let path = dir.join(INDEX_FILE);
        let corrupt = |details: String| SearchError::IndexCorrupt {
            path: path.clone(),
            details,
        };

        let bytes = fs::read(&path).map_err(|error| corrupt(error.to_string()))?;
        let state: PersistedIndex =
            serde_json::from_slice(&bytes).map_err(|error| corrupt(error.to_string()))?;

        if state.format_version != FORMAT_VERSION {
            return Err(corrupt(format!(
                "unsupported format version {} (expected {FORMAT_VERSION})",
                state.format_version
            )));
        }

        Ok(Self {
            model_id: state.model_id,
            dimensions: state.dimensions,
            built_at: state.built_at,
            entries: state.entries,
        })
    }

    /// Writes to a temporary file first so a crash never leaves a
    /// half-written `index.json` behind.
    fn persist(&self, dir: &Path) -> Result<(), SearchError> {
        fs::create_dir_all(dir)?;

        let state = PersistedIndex {
            format_version: FORMAT_VERSION,
            model_id: self.model_id.clone(),
            dimensions: self.dimensions,
            built_at: self.built_at,
            entries: self.entries.clone(),
        };

        let staging = dir.join(format!("{INDEX_FILE}.tmp"));
        fs::write(&staging, serde_json::to_vec(&state)?)?;
        fs::rename(&staging, dir.join(INDEX_FILE))?;
        Ok(())
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

fn make_chunk_id(chunk: &ChunkRecord, position: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(chunk.source().unwrap_or_default().as_bytes());
    hasher.update(chunk.page().unwrap_or(-1).to_le_bytes());
    hasher.update(chunk.start_index().unwrap_or(-1).to_le_bytes());
    hasher.update((position as u64).to_le_bytes());
    hasher.update(chunk.text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn norm(vector: &[f32]) -> f32 {
    vector.iter().map(|value| value * value).sum::<f32>().sqrt()
}

fn cosine(query: &[f32], query_norm: f32, candidate: &[f32]) -> f32 {
    let denominator = query_norm * norm(candidate);
    if denominator == 0.0 {
        return 0.0;
    }
    let dot = query
        .iter()
        .zip(candidate)
        .map(|(left, right)| left * right)
        .sum::<f32>();
    dot / denominator
}
