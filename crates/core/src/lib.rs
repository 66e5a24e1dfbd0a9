pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod gemini;
pub mod loader;
pub mod manager;
pub mod metadata;
pub mod models;
pub mod postprocess;
pub mod retriever;
pub mod stores;
pub mod traits;

pub use chunking::{ChunkingConfig, RecursiveTextSplitter, TextSpan};
pub use config::RetrieverConfig;
pub use embeddings::{CharacterNgramEmbedder, Embedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{IngestError, SearchError};
pub use extractor::{ExtractedPage, LopdfExtractor, PdfExtractor};
pub use gemini::{GeminiConfig, GeminiEmbedder};
pub use loader::{
    discover_pdf_files, load_corpus, load_corpus_with_report, CorpusReport, SkippedDocument,
};
pub use manager::{BuildSummary, IndexOrigin, VectorIndexManager};
pub use metadata::load_sidecar_metadata;
pub use models::{
    ChunkRecord, Metadata, MetadataValue, PageRecord, ScoredChunk, SourceDocument, PAGE_KEY,
    SOURCE_KEY, START_INDEX_KEY,
};
pub use postprocess::{extract_metadata_field, format_with_citations, reorder, AsChunk};
pub use retriever::CorpusRetriever;
pub use stores::LocalVectorStore;
pub use traits::{PersistentIndex, VectorIndex};
