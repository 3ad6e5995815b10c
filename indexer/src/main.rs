use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use reelsearch_core::embedding::embed_text;
use reelsearch_core::{
    Bm25Params, Bm25Ranker, DocId, EmbeddingProvider, FusionStrategy, HashingEmbedder, HybridSearch, IndexPaths,
    InvertedIndex, Normalizer, RankedResult, SearchConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

mod loader;

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and query the hybrid BM25 + semantic movie index", long_about = None)]
struct Cli {
    /// Cache directory holding the persisted indexes
    #[arg(long, env = "REELSEARCH_CACHE", default_value = "./cache", global = true)]
    cache: PathBuf,
    /// Optional JSON file overriding search defaults
    #[arg(long, env = "REELSEARCH_CONFIG", global = true)]
    config: Option<PathBuf>,
    /// Dimension of the built-in hashing embedder
    #[arg(long, default_value_t = reelsearch_core::embedding::DEFAULT_HASHING_DIM, global = true)]
    dim: usize,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Strategy {
    Weighted,
    Rrf,
}

#[derive(Subcommand)]
enum Commands {
    /// Build both indexes from a movies JSON file or directory
    Build {
        #[arg(long)]
        input: PathBuf,
    },
    /// BM25 keyword search
    Search {
        query: String,
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
    /// Chunked embedding search
    Semantic {
        query: String,
        #[arg(long, default_value_t = 5)]
        limit: usize,
        /// Movies file or directory; rebuilds the cache if it is stale
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Fused keyword + semantic search
    Hybrid {
        query: String,
        #[arg(long, default_value_t = 5)]
        limit: usize,
        #[arg(long, value_enum, default_value_t = Strategy::Rrf)]
        strategy: Strategy,
        /// Lexical weight for the weighted strategy
        #[arg(long)]
        alpha: Option<f64>,
        /// Smoothing constant for RRF
        #[arg(long)]
        rrf_k: Option<f64>,
        /// Movies file or directory; rebuilds the cache if it is stale
        #[arg(long)]
        input: Option<PathBuf>,
        /// Fall back to keyword results if embedding fails
        #[arg(long, default_value_t = false)]
        degrade: bool,
    },
    /// Documents containing a single term
    Postings { term: String },
    /// Raw term frequency of a term in a document
    Tf { doc_id: DocId, term: String },
    /// Smoothed IDF of a term
    Idf { term: String },
    /// BM25 IDF of a term
    Bm25idf { term: String },
    /// BM25 saturated TF of a term in a document
    Bm25tf {
        doc_id: DocId,
        term: String,
        #[arg(long)]
        k1: Option<f64>,
        #[arg(long)]
        b: Option<f64>,
    },
    /// Embed text and print a preview of the vector
    Embed { text: String },
    /// Report the configured embedding provider
    Verify,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => SearchConfig::from_json_file(path)?,
        None => SearchConfig::default(),
    };
    let paths = IndexPaths::new(&cli.cache);
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbedder::new(cli.dim));

    match cli.command {
        Commands::Build { input } => {
            let docs = loader::load_documents(&input)?;
            let search = HybridSearch::build(&docs, provider, config)?;
            search.save(&paths)?;
            tracing::info!(cache = %paths.root.display(), "index build complete");
            println!(
                "Indexed {} documents ({} terms, {} chunks) into {}",
                search.index().num_docs(),
                search.index().num_terms(),
                search.chunks().len(),
                paths.root.display()
            );
        }
        Commands::Search { query, limit } => {
            let index = InvertedIndex::load(&paths)?;
            let normalizer = Normalizer::default();
            let results = Bm25Ranker::new(&index, &normalizer).with_params(config.bm25).search(&query, limit)?;
            print_results(&index, &results);
        }
        Commands::Semantic { query, limit, input } => {
            let search = open_search(&paths, input, provider, config)?;
            let results = search.semantic(&query, limit)?;
            print_results(search.index(), &results);
        }
        Commands::Hybrid { query, limit, strategy, alpha, rrf_k, input, degrade } => {
            let strategy = match strategy {
                Strategy::Weighted => FusionStrategy::weighted(alpha.unwrap_or(config.alpha))?,
                Strategy::Rrf => FusionStrategy::rrf(rrf_k.unwrap_or(config.rrf_k))?,
            };
            let search = open_search(&paths, input, provider, config)?;
            if degrade {
                let outcome = search.hybrid_or_lexical(&query, limit, strategy)?;
                if outcome.degraded {
                    println!("(semantic search unavailable, showing keyword results)");
                }
                print_results(search.index(), &outcome.results);
            } else {
                let results = search.hybrid(&query, limit, strategy)?;
                print_results(search.index(), &results);
            }
        }
        Commands::Postings { term } => {
            let index = InvertedIndex::load(&paths)?;
            let ids = index.documents_for_term(&term, &Normalizer::default())?;
            for id in ids {
                if let Some(doc) = index.document(id) {
                    println!("{id}\t{}", doc.title);
                }
            }
        }
        Commands::Tf { doc_id, term } => {
            let index = InvertedIndex::load(&paths)?;
            let normalizer = Normalizer::default();
            let tf = Bm25Ranker::new(&index, &normalizer).term_tf(doc_id, &term)?;
            println!("Term frequency of '{term}' in document {doc_id}: {tf}");
        }
        Commands::Idf { term } => {
            let index = InvertedIndex::load(&paths)?;
            let normalizer = Normalizer::default();
            let idf = Bm25Ranker::new(&index, &normalizer).term_idf(&term)?;
            println!("Inverse document frequency of '{term}': {idf:.2}");
        }
        Commands::Bm25idf { term } => {
            let index = InvertedIndex::load(&paths)?;
            let normalizer = Normalizer::default();
            let idf = Bm25Ranker::new(&index, &normalizer).term_bm25_idf(&term)?;
            println!("BM25 IDF score of '{term}': {idf:.2}");
        }
        Commands::Bm25tf { doc_id, term, k1, b } => {
            let index = InvertedIndex::load(&paths)?;
            let normalizer = Normalizer::default();
            let params = Bm25Params { k1: k1.unwrap_or(config.bm25.k1), b: b.unwrap_or(config.bm25.b) };
            let tf = Bm25Ranker::new(&index, &normalizer).term_bm25_tf(doc_id, &term, params)?;
            println!("BM25 TF score of '{term}' in document {doc_id}: {tf:.2}");
        }
        Commands::Embed { text } => {
            let vector = embed_text(provider.as_ref(), &text)?;
            println!("Text: {text}");
            println!("First 3 dimensions: {:?}", &vector[..vector.len().min(3)]);
            println!("Dimensions: {}", vector.len());
        }
        Commands::Verify => {
            println!("Embedding provider: {}", provider.name());
            println!("Dimensions: {}", provider.dimension());
        }
    }
    Ok(())
}

/// Reuse the cached indexes, refreshing them from `input` when it is given.
fn open_search(
    paths: &IndexPaths,
    input: Option<PathBuf>,
    provider: Arc<dyn EmbeddingProvider>,
    config: SearchConfig,
) -> Result<HybridSearch> {
    let search = match input {
        Some(input) => {
            let docs = loader::load_documents(&input)?;
            HybridSearch::load_or_build(paths, &docs, provider, config)?
        }
        None => HybridSearch::open(paths, provider, config)?,
    };
    Ok(search)
}

fn print_results(index: &InvertedIndex, results: &[RankedResult]) {
    if results.is_empty() {
        println!("No results.");
        return;
    }
    for r in results {
        let title = index.document(r.doc_id).map(|d| d.title.as_str()).unwrap_or("<unknown>");
        println!("{}. {} (id {}, score {:.4})", r.rank, title, r.doc_id, r.score);
    }
}
