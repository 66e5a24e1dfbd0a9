use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("corpus directory does not exist: {}", path.display())]
    CorpusNotFound { path: PathBuf },

    #[error("corpus path is not a directory: {}", path.display())]
    NotADirectory { path: PathBuf },

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("cannot build index from {}: {reason}", path.display())]
    EmptyCorpus { path: PathBuf, reason: String },

    #[error("top_k must be at least 1")]
    InvalidTopK,

    #[error("query is empty")]
    EmptyQuery,

    #[error("embedding dimension {actual} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("missing embedding provider credentials: set {0}")]
    MissingCredentials(&'static str),

    #[error("embedding request failed: {0}")]
    Embedding(String),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("persisted index at {} is unreadable: {details}", path.display())]
    IndexCorrupt { path: PathBuf, details: String },
}
