use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use corpus_retrieval_core::postprocess::citation;
use corpus_retrieval_core::{
    extract_metadata_field, format_with_citations, reorder, CharacterNgramEmbedder,
    CorpusRetriever, Embedder, GeminiEmbedder, IndexOrigin, RetrieverConfig, VectorIndex,
};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "corpus-retrieval", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory of PDFs with optional same-named .yaml metadata
    #[arg(long, env = "RAG_CORPUS_DIR", default_value = "corpus")]
    corpus_dir: PathBuf,

    /// Directory holding the persisted vector index
    #[arg(long, env = "RAG_VECTOR_STORE_DIR", default_value = "vector_store")]
    vector_store_dir: PathBuf,

    /// Maximum chunk length in characters
    #[arg(long, env = "RAG_CHUNK_SIZE", default_value = "1000")]
    chunk_size: usize,

    /// Characters shared by adjacent chunks
    #[arg(long, env = "RAG_CHUNK_OVERLAP", default_value = "200")]
    chunk_overlap: usize,

    /// Results returned when --k is not given
    #[arg(long, env = "RAG_DEFAULT_K", default_value = "4")]
    default_k: usize,

    /// Embedding provider; the index must be queried with the one it was built with
    #[arg(long, value_enum, env = "RAG_EMBEDDER", default_value = "gemini")]
    embedder: EmbedderKind,
}

#[derive(Clone, Copy, ValueEnum)]
enum EmbedderKind {
    /// Google Gemini embeddings (needs GOOGLE_API_KEY)
    Gemini,
    /// Offline hashed character trigrams
    Ngram,
}

#[derive(Subcommand)]
enum Command {
    /// Load the persisted index, or build it from the corpus if there is none.
    Build {
        /// Delete the persisted index and rebuild it from scratch.
        #[arg(long, default_value_t = false)]
        rebuild: bool,
    },
    /// Search the index and print citation-annotated context.
    Search {
        /// Search query
        #[arg(long)]
        query: String,
        /// Number of chunks to return.
        #[arg(long)]
        k: Option<usize>,
        /// Keep similarity order instead of moving top hits to both ends.
        #[arg(long, default_value_t = false)]
        no_reorder: bool,
        /// Print one line per hit with its score instead of prompt context.
        #[arg(long, default_value_t = false)]
        raw: bool,
    },
    /// List the distinct values of a metadata field across search results.
    Fields {
        /// Search query
        #[arg(long)]
        query: String,
        /// Metadata field to collect, e.g. `tags`.
        #[arg(long)]
        field: String,
        /// Number of chunks to inspect.
        #[arg(long)]
        k: Option<usize>,
    },
}

fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = RetrieverConfig::default()
        .with_corpus_dir(&cli.corpus_dir)
        .with_vector_store_dir(&cli.vector_store_dir)
        .with_chunking(cli.chunk_size, cli.chunk_overlap)
        .with_default_k(cli.default_k);
    config.validate()?;

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        corpus = %config.corpus_dir.display(),
        store = %config.vector_store_dir.display(),
        "corpus-retrieval boot"
    );

    let embedder: Box<dyn Embedder> = match cli.embedder {
        EmbedderKind::Gemini => Box::new(GeminiEmbedder::from_env()?),
        EmbedderKind::Ngram => Box::new(CharacterNgramEmbedder::default()),
    };

    let rebuild = matches!(cli.command, Command::Build { rebuild: true });
    let retriever = CorpusRetriever::new(config, embedder, rebuild)?;

    match cli.command {
        Command::Build { .. } => match retriever.manager().origin() {
            IndexOrigin::Built(summary) => {
                if summary.skipped_documents > 0 {
                    warn!(
                        skipped = summary.skipped_documents,
                        "some pdf files could not be read"
                    );
                }
                println!(
                    "built index: {} documents, {} pages, {} chunks at {}",
                    summary.documents,
                    summary.pages,
                    summary.chunks,
                    Utc::now().to_rfc3339()
                );
            }
            IndexOrigin::Loaded => {
                let index = retriever.manager().index();
                println!(
                    "index already present at {}: {} chunks built {} (use --rebuild to recreate it)",
                    retriever.manager().config().vector_store_dir.display(),
                    index.len(),
                    index.built_at().to_rfc3339()
                );
            }
        },
        Command::Search {
            query,
            k,
            no_reorder,
            raw,
        } => {
            if raw {
                for (rank, hit) in retriever.search_with_scores(&query, k)?.iter().enumerate() {
                    println!(
                        "{}. score={:.4} {}\n{}\n",
                        rank + 1,
                        hit.score,
                        citation(&hit.chunk),
                        hit.chunk.text
                    );
                }
            } else {
                let results = retriever.search(&query, k)?;
                let ordered = if no_reorder {
                    results
                } else {
                    reorder(&results)
                };
                println!("{}", format_with_citations(&ordered));
            }
        }
        Command::Fields { query, field, k } => {
            let results = retriever.search(&query, k)?;
            for value in extract_metadata_field(&results, &field) {
                println!("{value}");
            }
        }
    }

    Ok(())
}
