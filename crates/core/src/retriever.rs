use crate::config::RetrieverConfig;
use crate::embeddings::Embedder;
use crate::gemini::GeminiEmbedder;
use crate::manager::VectorIndexManager;
use crate::models::{ChunkRecord, ScoredChunk};
use crate::postprocess::{format_with_citations, reorder};
use crate::SearchError;

/// Entry point for callers that only want to ask questions of the corpus.
pub struct CorpusRetriever<E> {
    manager: VectorIndexManager<E>,
}

impl CorpusRetriever<GeminiEmbedder> {
    /// Uses the Gemini embedder configured from the environment. Fails
    /// before touching the index when `GOOGLE_API_KEY` is unset.
    pub fn from_env(config: RetrieverConfig, rebuild: bool) -> Result<Self, SearchError> {
        Self::new(config, GeminiEmbedder::from_env()?, rebuild)
    }
}

impl<E: Embedder> CorpusRetriever<E> {
    pub fn new(config: RetrieverConfig, embedder: E, rebuild: bool) -> Result<Self, SearchError> {
        Ok(Self::from_manager(VectorIndexManager::open(
            config, embedder, rebuild,
        )?))
    }

    pub fn from_manager(manager: VectorIndexManager<E>) -> Self {
        Self { manager }
    }

    pub fn search(&self, query: &str, k: Option<usize>) -> Result<Vec<ChunkRecord>, SearchError> {
        self.manager.search(query, k)
    }

    pub fn search_with_scores(
        &self,
        query: &str,
        k: Option<usize>,
    ) -> Result<Vec<ScoredChunk>, SearchError> {
        self.manager.search_with_scores(query, k)
    }

    /// Search, reorder for long-context use, and render with citations.
    pub fn retrieve_context(&self, query: &str, k: Option<usize>) -> Result<String, SearchError> {
        let results = self.search(query, k)?;
        Ok(format_with_citations(&reorder(&results)))
    }

    pub fn manager(&self) -> &VectorIndexManager<E> {
        &self.manager
    }
}
