use crate::bm25::Bm25Ranker;
use crate::chunk_index::ChunkIndex;
use crate::config::SearchConfig;
use crate::embedding::{EmbeddingProvider, TimeoutEmbedder};
use crate::error::Result;
use crate::fusion::{fuse, FusionStrategy};
use crate::index::{Document, InvertedIndex};
use crate::persist::IndexPaths;
use crate::ranking::RankedResult;
use crate::tokenizer::Normalizer;
use serde::Serialize;
use std::sync::Arc;

/// Result of a hybrid query that may have fallen back to lexical ranking.
#[derive(Debug, Clone, Serialize)]
pub struct HybridOutcome {
    pub results: Vec<RankedResult>,
    /// Set when the semantic path failed and only BM25 contributed.
    pub degraded: bool,
}

/// Both indexes plus the capabilities needed to query them. Read-only once
/// constructed; share it behind an `Arc` for concurrent queries.
pub struct HybridSearch {
    index: InvertedIndex,
    chunks: ChunkIndex,
    normalizer: Normalizer,
    provider: Arc<dyn EmbeddingProvider>,
    config: SearchConfig,
}

impl std::fmt::Debug for HybridSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridSearch").field("index", &self.index).field("chunks", &self.chunks).field("config", &self.config).finish_non_exhaustive()
    }
}

fn bounded(provider: Arc<dyn EmbeddingProvider>, config: &SearchConfig) -> Arc<dyn EmbeddingProvider> {
    Arc::new(TimeoutEmbedder::with_max_in_flight(provider, config.embed_timeout(), config.embed_max_in_flight))
}

impl HybridSearch {
    pub fn new(
        index: InvertedIndex,
        chunks: ChunkIndex,
        provider: Arc<dyn EmbeddingProvider>,
        config: SearchConfig,
    ) -> Self {
        let provider = bounded(provider, &config);
        Self { index, chunks, normalizer: Normalizer::default(), provider, config }
    }

    pub fn build(documents: &[Document], provider: Arc<dyn EmbeddingProvider>, config: SearchConfig) -> Result<Self> {
        let normalizer = Normalizer::default();
        let index = InvertedIndex::build(documents, &normalizer)?;
        let provider = bounded(provider, &config);
        let chunks = ChunkIndex::build(documents, config.chunking, provider.as_ref(), config.embed_batch_size)?;
        Ok(Self { index, chunks, normalizer, provider, config })
    }

    /// Restore both indexes from `paths`. Fails with `CacheMissing` if either
    /// snapshot is absent.
    pub fn open(paths: &IndexPaths, provider: Arc<dyn EmbeddingProvider>, config: SearchConfig) -> Result<Self> {
        let index = InvertedIndex::load(paths)?;
        let chunks = ChunkIndex::load(paths)?;
        Ok(Self::new(index, chunks, provider, config))
    }

    pub fn load_or_build(
        paths: &IndexPaths,
        documents: &[Document],
        provider: Arc<dyn EmbeddingProvider>,
        config: SearchConfig,
    ) -> Result<Self> {
        let normalizer = Normalizer::default();
        let provider = bounded(provider, &config);
        let index = InvertedIndex::load_or_build(paths, documents, &normalizer)?;
        let chunks = ChunkIndex::load_or_build(
            paths,
            documents,
            config.chunking,
            provider.as_ref(),
            config.embed_batch_size,
        )?;
        Ok(Self { index, chunks, normalizer, provider, config })
    }

    pub fn save(&self, paths: &IndexPaths) -> Result<()> {
        self.index.save(paths)?;
        self.chunks.save(paths)
    }

    pub fn index(&self) -> &InvertedIndex { &self.index }

    pub fn chunks(&self) -> &ChunkIndex { &self.chunks }

    pub fn config(&self) -> &SearchConfig { &self.config }

    pub fn ranker(&self) -> Bm25Ranker<'_> {
        Bm25Ranker::new(&self.index, &self.normalizer).with_params(self.config.bm25)
    }

    pub fn keyword(&self, query: &str, limit: usize) -> Result<Vec<RankedResult>> {
        self.ranker().search(query, limit)
    }

    pub fn semantic(&self, query: &str, limit: usize) -> Result<Vec<RankedResult>> {
        self.chunks.search_with(query, limit, self.provider.as_ref(), self.config.aggregation)
    }

    /// Fuse both rankings. A semantic failure is returned as an error so the
    /// caller can decide whether to fall back.
    pub fn hybrid(&self, query: &str, limit: usize, strategy: FusionStrategy) -> Result<Vec<RankedResult>> {
        strategy.validate()?;
        let candidates = self.config.candidate_limit(limit);
        let lexical = self.keyword(query, candidates)?;
        let semantic = self.semantic(query, candidates)?;
        tracing::debug!(query, lexical = lexical.len(), semantic = semantic.len(), ?strategy, "fusing rankings");
        fuse(&lexical, &semantic, strategy, limit)
    }

    /// Like [`HybridSearch::hybrid`], but answers with BM25 alone when the
    /// embedding capability is unavailable.
    pub fn hybrid_or_lexical(&self, query: &str, limit: usize, strategy: FusionStrategy) -> Result<HybridOutcome> {
        match self.hybrid(query, limit, strategy) {
            Ok(results) => Ok(HybridOutcome { results, degraded: false }),
            Err(e) if e.is_embedding_failure() => {
                tracing::warn!(query, error = %e, "semantic path unavailable, degrading to lexical ranking");
                Ok(HybridOutcome { results: self.keyword(query, limit)?, degraded: true })
            }
            Err(e) => Err(e),
        }
    }
}
