use crate::chunking::{ChunkingConfig, RecursiveTextSplitter};
use crate::config::RetrieverConfig;
use crate::embeddings::Embedder;
use crate::extractor::{LopdfExtractor, PdfExtractor};
use crate::loader::load_corpus_with_report;
use crate::models::{ChunkRecord, ScoredChunk};
use crate::stores::{is_persisted, LocalVectorStore};
use crate::traits::{PersistentIndex, VectorIndex};
use crate::SearchError;
use std::fs;
use tracing::{info, warn};

/// How the manager came by its index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOrigin {
    Built(BuildSummary),
    Loaded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSummary {
    pub documents: usize,
    pub skipped_documents: usize,
    pub pages: usize,
    pub chunks: usize,
}

/// Owns the embedder and the persisted index.
///
/// Construction decides once between loading and building: an existing,
/// non-empty `vector_store_dir` is loaded as-is, anything else triggers a
/// full build from `corpus_dir`. `rebuild` deletes the directory first.
/// The index is only written after every chunk has been embedded, so a
/// failed build never leaves a partial index behind.
///
/// Queries must use the embedder the index was built with. A different
/// model id is logged as a warning; a different dimensionality fails the
/// query.
pub struct VectorIndexManager<E, I = LocalVectorStore> {
    config: RetrieverConfig,
    embedder: E,
    index: I,
    origin: IndexOrigin,
}

impl<E, I> VectorIndexManager<E, I>
where
    E: Embedder,
    I: PersistentIndex,
{
    pub fn open(config: RetrieverConfig, embedder: E, rebuild: bool) -> Result<Self, SearchError> {
        Self::open_with_extractor(config, embedder, &LopdfExtractor, rebuild)
    }

    pub fn open_with_extractor<X: PdfExtractor>(
        config: RetrieverConfig,
        embedder: E,
        extractor: &X,
        rebuild: bool,
    ) -> Result<Self, SearchError> {
        config.validate()?;
        let location = config.vector_store_dir.clone();

        if rebuild && location.exists() {
            info!(path = %location.display(), "rebuild requested, deleting persisted index");
            fs::remove_dir_all(&location)?;
        }

        if is_persisted(&location) {
            let index = I::open(&location)?;
            let model_id = embedder.model_id();
            if index.model_id() != model_id {
                warn!(
                    persisted = index.model_id(),
                    current = %model_id,
                    "index was built with a different embedding model; results may be meaningless"
                );
            }
            info!(path = %location.display(), chunks = index.len(), "loaded persisted vector index");
            return Ok(Self {
                config,
                embedder,
                index,
                origin: IndexOrigin::Loaded,
            });
        }

        info!(path = %location.display(), "no persisted index, building a new one");
        let (index, summary) = build_index::<E, I, X>(&config, &embedder, extractor)?;

        if let Err(error) = index.persist(&location) {
            // A half-written directory would be loaded on the next open.
            let _ = fs::remove_dir_all(&location);
            return Err(error);
        }

        info!(
            path = %location.display(),
            documents = summary.documents,
            pages = summary.pages,
            chunks = summary.chunks,
            "vector index built and persisted"
        );

        Ok(Self {
            config,
            embedder,
            index,
            origin: IndexOrigin::Built(summary),
        })
    }

    /// The `k` nearest chunks (default `config.default_k`), most similar
    /// first. `k == 0` is rejected.
    pub fn search(&self, query: &str, k: Option<usize>) -> Result<Vec<ChunkRecord>, SearchError> {
        Ok(self
            .search_with_scores(query, k)?
            .into_iter()
            .map(|hit| hit.chunk)
            .collect())
    }

    pub fn search_with_scores(
        &self,
        query: &str,
        k: Option<usize>,
    ) -> Result<Vec<ScoredChunk>, SearchError> {
        if query.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        let top_k = k.unwrap_or(self.config.default_k);
        if top_k == 0 {
            return Err(SearchError::InvalidTopK);
        }

        let query_vector = self.embedder.embed_query(query)?;
        self.index.search_vector(&query_vector, top_k)
    }

    pub fn origin(&self) -> &IndexOrigin {
        &self.origin
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    pub fn index(&self) -> &I {
        &self.index
    }
}

fn build_index<E, I, X>(
    config: &RetrieverConfig,
    embedder: &E,
    extractor: &X,
) -> Result<(I, BuildSummary), SearchError>
where
    E: Embedder,
    I: PersistentIndex,
    X: PdfExtractor,
{
    let report = load_corpus_with_report(&config.corpus_dir, extractor)?;

    if report.pages.is_empty() {
        let reason = if report.skipped_documents.is_empty() {
            "no pdf files found".to_string()
        } else {
            format!(
                "all {} pdf files failed to load",
                report.skipped_documents.len()
            )
        };
        return Err(SearchError::EmptyCorpus {
            path: config.corpus_dir.clone(),
            reason,
        });
    }

    let splitter = RecursiveTextSplitter::new(ChunkingConfig::try_from(config)?);
    let chunks = splitter.split_pages(&report.pages);
    info!(pages = report.pages.len(), chunks = chunks.len(), "chunked corpus");

    if chunks.is_empty() {
        return Err(SearchError::EmptyCorpus {
            path: config.corpus_dir.clone(),
            reason: format!("{} pages contained no extractable text", report.pages.len()),
        });
    }

    let texts = chunks
        .iter()
        .map(|chunk| chunk.text.clone())
        .collect::<Vec<_>>();
    let embeddings = embedder.embed_documents(&texts)?;

    let mut index = I::create(&embedder.model_id());
    index.index_chunks(&chunks, &embeddings)?;

    let summary = BuildSummary {
        documents: report.loaded_documents,
        skipped_documents: report.skipped_documents.len(),
        pages: report.pages.len(),
        chunks: chunks.len(),
    };

    Ok((index, summary))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::loader::tests::FakeExtractor;
    use crate::models::{MetadataValue, SOURCE_KEY, START_INDEX_KEY};
    use crate::postprocess::reorder;
    use crate::stores::INDEX_FILE;
    use crate::IngestError;
    use std::cell::Cell;
    use std::path::Path;
    use std::rc::Rc;
    use tempfile::{tempdir, TempDir};

    /// Trigram embedder that counts how many texts it was asked to embed.
    #[derive(Clone, Default)]
    pub(crate) struct CountingEmbedder {
        inner: CharacterNgramEmbedder,
        pub(crate) documents: Rc<Cell<usize>>,
        pub(crate) queries: Rc<Cell<usize>>,
    }

    impl Embedder for CountingEmbedder {
        fn model_id(&self) -> String {
            self.inner.model_id()
        }

        fn embed_query(&self, text: &str) -> Result<Vec<f32>, SearchError> {
            self.queries.set(self.queries.get() + 1);
            self.inner.embed_query(text)
        }

        fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
            self.documents.set(self.documents.get() + texts.len());
            Ok(texts.iter().map(|text| self.inner.embed(text)).collect())
        }
    }

    /// Fails every document batch, as a provider outage would.
    struct FailingEmbedder;

    impl Embedder for FailingEmbedder {
        fn model_id(&self) -> String {
            "failing".to_string()
        }

        fn embed_query(&self, _text: &str) -> Result<Vec<f32>, SearchError> {
            Err(SearchError::Embedding("provider unavailable".to_string()))
        }
    }

    /// Local store whose writes land on disk and then report failure.
    struct UnwritableStore(LocalVectorStore);

    impl VectorIndex for UnwritableStore {
        fn index_chunks(
            &mut self,
            chunks: &[ChunkRecord],
            embeddings: &[Vec<f32>],
        ) -> Result<(), SearchError> {
            self.0.index_chunks(chunks, embeddings)
        }

        fn search_vector(
            &self,
            query_vector: &[f32],
            top_k: usize,
        ) -> Result<Vec<ScoredChunk>, SearchError> {
            self.0.search_vector(query_vector, top_k)
        }

        fn len(&self) -> usize {
            self.0.len()
        }
    }

    impl PersistentIndex for UnwritableStore {
        fn create(model_id: &str) -> Self {
            Self(LocalVectorStore::create(model_id))
        }

        fn open(dir: &Path) -> Result<Self, SearchError> {
            LocalVectorStore::open(dir).map(Self)
        }

        fn persist(&self, dir: &Path) -> Result<(), SearchError> {
            self.0.persist(dir)?;
            Err(std::io::Error::other("disk full").into())
        }

        fn model_id(&self) -> &str {
            self.0.model_id()
        }
    }

    pub(crate) fn medical_corpus(dir: &Path) -> Result<FakeExtractor, std::io::Error> {
        fs::write(dir.join("asthma.pdf"), b"%PDF")?;
        fs::write(
            dir.join("asthma.yaml"),
            "title: Asthma Care\ncategory: respiratory\ntags: [inhaler, wheezing]\n",
        )?;
        fs::write(dir.join("cardio.pdf"), b"%PDF")?;
        fs::write(dir.join("corrupt.pdf"), b"%PDF")?;

        Ok(FakeExtractor::default()
            .with_document(
                "asthma.pdf",
                &[
                    "Asthma causes wheezing and shortness of breath.\n\nUse a rescue inhaler during an attack.",
                    "Avoid triggers such as smoke, dust and cold air.",
                ],
            )
            .with_document(
                "cardio.pdf",
                &["Chest pain radiating to the left arm may indicate a heart attack. Call emergency services."],
            ))
    }

    fn config(root: &TempDir) -> RetrieverConfig {
        RetrieverConfig::default()
            .with_corpus_dir(root.path().join("corpus"))
            .with_vector_store_dir(root.path().join("vector_store"))
            .with_chunking(60, 10)
            .with_default_k(2)
    }

    fn corpus(root: &TempDir) -> Result<FakeExtractor, std::io::Error> {
        let dir = root.path().join("corpus");
        fs::create_dir_all(&dir)?;
        medical_corpus(&dir)
    }

    #[test]
    fn first_open_builds_and_persists() -> Result<(), Box<dyn std::error::Error>> {
        let root = tempdir()?;
        let extractor = corpus(&root)?;
        let embedder = CountingEmbedder::default();

        let manager: VectorIndexManager<_> = VectorIndexManager::open_with_extractor(
            config(&root),
            embedder.clone(),
            &extractor,
            false,
        )?;

        let IndexOrigin::Built(summary) = manager.origin() else {
            return Err("expected a fresh build".into());
        };
        assert_eq!(summary.documents, 2);
        assert_eq!(summary.skipped_documents, 1);
        assert_eq!(summary.pages, 3);
        assert_eq!(summary.chunks, manager.index().len());
        assert_eq!(embedder.documents.get(), summary.chunks);
        assert!(root.path().join("vector_store").join(INDEX_FILE).is_file());
        Ok(())
    }

    #[test]
    fn reopening_loads_without_embedding_again() -> Result<(), Box<dyn std::error::Error>> {
        let root = tempdir()?;
        let extractor = corpus(&root)?;
        let first: VectorIndexManager<_> = VectorIndexManager::open_with_extractor(
            config(&root),
            CountingEmbedder::default(),
            &extractor,
            false,
        )?;

        let embedder = CountingEmbedder::default();
        let second: VectorIndexManager<_> = VectorIndexManager::open_with_extractor(
            config(&root),
            embedder.clone(),
            &extractor,
            false,
        )?;

        assert_eq!(second.origin(), &IndexOrigin::Loaded);
        assert_eq!(embedder.documents.get(), 0);
        assert_eq!(second.index().entries(), first.index().entries());

        second.search("inhaler", None)?;
        assert_eq!(embedder.documents.get(), 0);
        assert_eq!(embedder.queries.get(), 1);
        Ok(())
    }

    #[test]
    fn rebuild_discards_persisted_state() -> Result<(), Box<dyn std::error::Error>> {
        let root = tempdir()?;
        let extractor = corpus(&root)?;
        let _first: VectorIndexManager<_> = VectorIndexManager::open_with_extractor(
            config(&root),
            CountingEmbedder::default(),
            &extractor,
            false,
        )?;
        let stale = root.path().join("vector_store").join("stale.bin");
        fs::write(&stale, b"left over")?;

        let embedder = CountingEmbedder::default();
        let rebuilt: VectorIndexManager<_> = VectorIndexManager::open_with_extractor(
            config(&root),
            embedder.clone(),
            &extractor,
            true,
        )?;

        assert!(matches!(rebuilt.origin(), IndexOrigin::Built(_)));
        assert!(!stale.exists());
        assert_eq!(embedder.documents.get(), rebuilt.index().len());
        Ok(())
    }

    #[test]
    fn rebuild_without_persisted_state_just_builds() -> Result<(), Box<dyn std::error::Error>> {
        let root = tempdir()?;
        let extractor = corpus(&root)?;

        let manager: VectorIndexManager<_> = VectorIndexManager::open_with_extractor(
            config(&root),
            CountingEmbedder::default(),
            &extractor,
            true,
        )?;

        assert!(matches!(manager.origin(), IndexOrigin::Built(_)));
        Ok(())
    }

    #[test]
    fn empty_corpus_fails_without_persisting() -> Result<(), Box<dyn std::error::Error>> {
        let root = tempdir()?;
        fs::create_dir_all(root.path().join("corpus"))?;

        let result: Result<VectorIndexManager<_>, _> = VectorIndexManager::open_with_extractor(
            config(&root),
            CountingEmbedder::default(),
            &FakeExtractor::default(),
            false,
        );

        match result {
            Err(SearchError::EmptyCorpus { path, reason }) => {
                assert_eq!(path, root.path().join("corpus"));
                assert_eq!(reason, "no pdf files found");
            }
            Err(other) => return Err(other.into()),
            Ok(_) => return Err("expected an empty corpus error".into()),
        }
        assert!(!root.path().join("vector_store").exists());
        Ok(())
    }

    #[test]
    fn embedding_failure_leaves_no_index() -> Result<(), Box<dyn std::error::Error>> {
        let root = tempdir()?;
        let extractor = corpus(&root)?;

        let result: Result<VectorIndexManager<_>, _> =
            VectorIndexManager::open_with_extractor(config(&root), FailingEmbedder, &extractor, false);

        assert!(matches!(result, Err(SearchError::Embedding(_))));
        assert!(!root.path().join("vector_store").exists());
        Ok(())
    }

    #[test]
    fn failed_rebuild_does_not_keep_the_old_index() -> Result<(), Box<dyn std::error::Error>> {
        let root = tempdir()?;
        let extractor = corpus(&root)?;
        let _first: VectorIndexManager<_> = VectorIndexManager::open_with_extractor(
            config(&root),
            CountingEmbedder::default(),
            &extractor,
            false,
        )?;
        assert!(is_persisted(&root.path().join("vector_store")));

        let result: Result<VectorIndexManager<_>, _> =
            VectorIndexManager::open_with_extractor(config(&root), FailingEmbedder, &extractor, true);

        assert!(matches!(result, Err(SearchError::Embedding(_))));
        assert!(!root.path().join("vector_store").exists());
        Ok(())
    }

    #[test]
    fn failed_persist_removes_the_written_directory() -> Result<(), Box<dyn std::error::Error>> {
        let root = tempdir()?;
        let extractor = corpus(&root)?;

        let result: Result<VectorIndexManager<_, UnwritableStore>, _> =
            VectorIndexManager::open_with_extractor(
                config(&root),
                CountingEmbedder::default(),
                &extractor,
                false,
            );

        assert!(matches!(result, Err(SearchError::Io(_))));
        assert!(!root.path().join("vector_store").exists());
        Ok(())
    }

    #[test]
    fn corpus_of_unreadable_files_is_empty() -> Result<(), Box<dyn std::error::Error>> {
        let root = tempdir()?;
        let dir = root.path().join("corpus");
        fs::create_dir_all(&dir)?;
        fs::write(dir.join("scan.pdf"), b"%PDF")?;

        let result: Result<VectorIndexManager<_>, _> = VectorIndexManager::open_with_extractor(
            config(&root),
            CountingEmbedder::default(),
            &FakeExtractor::default(),
            false,
        );

        assert!(matches!(result, Err(SearchError::EmptyCorpus { .. })));
        Ok(())
    }

    #[test]
    fn missing_corpus_names_the_directory() -> Result<(), Box<dyn std::error::Error>> {
        let root = tempdir()?;

        let result: Result<VectorIndexManager<_>, _> = VectorIndexManager::open_with_extractor(
            config(&root),
            CountingEmbedder::default(),
            &FakeExtractor::default(),
            false,
        );

        match result {
            Err(SearchError::Ingest(IngestError::CorpusNotFound { path })) => {
                assert_eq!(path, root.path().join("corpus"));
            }
            Err(other) => return Err(other.into()),
            Ok(_) => return Err("expected a missing corpus error".into()),
        }
        Ok(())
    }

    #[test]
    fn search_respects_k_and_returns_stored_chunks() -> Result<(), Box<dyn std::error::Error>> {
        let root = tempdir()?;
        let extractor = corpus(&root)?;
        let manager: VectorIndexManager<_> = VectorIndexManager::open_with_extractor(
            config(&root),
            CountingEmbedder::default(),
            &extractor,
            false,
        )?;

        let results = manager.search("rescue inhaler for an asthma attack", Some(3))?;
        assert!(results.len() <= 3);
        assert!(!results.is_empty());
        for result in &results {
            assert!(manager
                .index()
                .entries()
                .iter()
                .any(|entry| &entry.chunk == result));
        }

        assert_eq!(manager.search("chest pain", None)?.len(), 2);
        Ok(())
    }

    #[test]
    fn zero_k_and_blank_queries_fail_fast() -> Result<(), Box<dyn std::error::Error>> {
        let root = tempdir()?;
        let extractor = corpus(&root)?;
        let embedder = CountingEmbedder::default();
        let manager: VectorIndexManager<_> = VectorIndexManager::open_with_extractor(
            config(&root),
            embedder.clone(),
            &extractor,
            false,
        )?;

        assert!(matches!(
            manager.search("asthma", Some(0)),
            Err(SearchError::InvalidTopK)
        ));
        assert!(matches!(
            manager.search("   ", None),
            Err(SearchError::EmptyQuery)
        ));
        assert_eq!(embedder.queries.get(), 0);
        Ok(())
    }

    #[test]
    fn chunks_carry_source_start_index_and_sidecar_keys() -> Result<(), Box<dyn std::error::Error>> {
        let root = tempdir()?;
        let extractor = corpus(&root)?;
        let manager: VectorIndexManager<_> = VectorIndexManager::open_with_extractor(
            config(&root),
            CountingEmbedder::default(),
            &extractor,
            false,
        )?;

        for entry in manager.index().entries() {
            let metadata = &entry.chunk.metadata;
            assert!(metadata
                .get(SOURCE_KEY)
                .and_then(MetadataValue::as_str)
                .is_some_and(|source| !source.is_empty()));
            assert!(metadata.contains_key(START_INDEX_KEY));

            if entry.chunk.source().is_some_and(|source| source.ends_with("asthma.pdf")) {
                assert_eq!(metadata["title"], MetadataValue::from("Asthma Care"));
                assert_eq!(metadata["category"], MetadataValue::from("respiratory"));
            } else {
                assert_eq!(metadata["title"], MetadataValue::from("Parser Title"));
            }
        }
        Ok(())
    }

    #[test]
    fn search_order_is_what_reorder_assumes() -> Result<(), Box<dyn std::error::Error>> {
        let root = tempdir()?;
        let extractor = corpus(&root)?;
        let manager: VectorIndexManager<_> = VectorIndexManager::open_with_extractor(
            config(&root),
            CountingEmbedder::default(),
            &extractor,
            false,
        )?;

        let hits = manager.search_with_scores("asthma wheezing inhaler", Some(4))?;
        assert!(hits.windows(2).all(|pair| pair[0].score >= pair[1].score));

        let reordered = reorder(&hits);
        if hits.len() >= 2 {
            assert_eq!(reordered.first(), hits.first());
            assert_eq!(reordered.last(), hits.get(1));
        }
        Ok(())
    }
}
