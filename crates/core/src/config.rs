use crate::error::IngestError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CORPUS_DIR: &str = "corpus";
pub const DEFAULT_VECTOR_STORE_DIR: &str = "vector_store";
pub const DEFAULT_CHUNK_SIZE: usize = 1_000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;
pub const DEFAULT_K_RESULTS: usize = 4;

/// Everything the pipeline reads from its environment. Each component
/// receives this value (or the parts it needs) at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrieverConfig {
    pub corpus_dir: PathBuf,
    pub vector_store_dir: PathBuf,
    /// Maximum chunk length, in characters.
    pub chunk_size: usize,
    /// Characters shared between adjacent chunks of the same page.
    pub chunk_overlap: usize,
    /// Result count used when a search does not name one.
    pub default_k: usize,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            corpus_dir: PathBuf::from(DEFAULT_CORPUS_DIR),
            vector_store_dir: PathBuf::from(DEFAULT_VECTOR_STORE_DIR),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            default_k: DEFAULT_K_RESULTS,
        }
    }
}

impl RetrieverConfig {
    pub fn with_corpus_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.corpus_dir = path.as_ref().to_path_buf();
        self
    }

    pub fn with_vector_store_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.vector_store_dir = path.as_ref().to_path_buf();
        self
    }

    pub fn with_chunking(mut self, chunk_size: usize, chunk_overlap: usize) -> Self {
        self.chunk_size = chunk_size;
        self.chunk_overlap = chunk_overlap;
        self
    }

    pub fn with_default_k(mut self, default_k: usize) -> Self {
        self.default_k = default_k;
        self
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "chunk_overlap {} must be smaller than chunk_size {}",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.default_k == 0 {
            return Err(IngestError::InvalidConfig(
                "default_k must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(RetrieverConfig::default().validate().is_ok());
    }

    #[test]
    fn overlap_must_be_smaller_than_size() {
        let config = RetrieverConfig::default().with_chunking(100, 100);
        assert!(matches!(
            config.validate(),
            Err(IngestError::InvalidChunkConfig(_))
        ));
    }

    #[test]
    fn zero_default_k_is_rejected() {
        let config = RetrieverConfig::default().with_default_k(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_config_falls_back_to_defaults() -> Result<(), Box<dyn std::error::Error>> {
        let config: RetrieverConfig = serde_json::from_str(r#"{"chunk_size": 500}"#)?;
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.chunk_overlap, DEFAULT_CHUNK_OVERLAP);
        assert_eq!(config.corpus_dir, PathBuf::from(DEFAULT_CORPUS_DIR));
        Ok(())
    }
}
