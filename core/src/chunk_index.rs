//! Passage-level semantic retrieval: chunk vectors with per-document
//! aggregation of similarity scores.

use crate::chunker::{chunk_document, ChunkConfig};
use crate::embedding::{embed_batched, embed_text, EmbeddingProvider};
use crate::error::{Result, SearchError};
use crate::index::{DocId, Document};
use crate::persist::{check_header, load_snapshot, save_snapshot, IndexPaths, SnapshotHeader};
use crate::ranking::{rank_scores, RankedResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub doc_id: DocId,
    pub chunk_index: usize,
    pub total_chunks: usize,
}

/// How chunk similarities collapse into one document score.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    /// Best matching chunk wins.
    #[default]
    Max,
    Mean,
}

impl std::str::FromStr for Aggregation {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "max" => Ok(Aggregation::Max),
            "mean" => Ok(Aggregation::Mean),
            other => Err(SearchError::InvalidQuery(format!("unknown aggregation {other:?}"))),
        }
    }
}

/// `dot(a, b) / (|a| * |b|)`, or 0 when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut na = 0.0f64;
    let mut nb = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

/// Row `i` of `vectors` belongs to `metadata[i]`.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkIndex {
    dimension: usize,
    source_docs: usize,
    config: ChunkConfig,
    vectors: Vec<Vec<f32>>,
    metadata: Vec<ChunkMetadata>,
}

impl ChunkIndex {
    pub fn build(
        documents: &[Document],
        config: ChunkConfig,
        provider: &dyn EmbeddingProvider,
        batch_size: usize,
    ) -> Result<Self> {
        config.validate()?;
        let mut texts = Vec::new();
        let mut metadata = Vec::new();
        for doc in documents {
            if doc.description.trim().is_empty() {
                continue;
            }
            for chunk in chunk_document(doc, config)? {
                metadata.push(ChunkMetadata {
                    doc_id: chunk.doc_id,
                    chunk_index: chunk.chunk_index,
                    total_chunks: chunk.total_chunks,
                });
                texts.push(chunk.text);
            }
        }
        let vectors = embed_batched(provider, &texts, batch_size)?;
        tracing::info!(
            num_docs = documents.len(),
            num_chunks = metadata.len(),
            dimension = provider.dimension(),
            provider = provider.name(),
            "built chunk index"
        );
        Ok(Self { dimension: provider.dimension(), source_docs: documents.len(), config, vectors, metadata })
    }

    pub fn len(&self) -> usize { self.metadata.len() }

    pub fn is_empty(&self) -> bool { self.metadata.is_empty() }

    pub fn dimension(&self) -> usize { self.dimension }

    /// Chunking parameters the stored vectors were produced with.
    pub fn config(&self) -> ChunkConfig { self.config }

    pub fn chunk(&self, position: usize) -> Option<(&ChunkMetadata, &[f32])> {
        Some((self.metadata.get(position)?, self.vectors.get(position)?.as_slice()))
    }

    pub fn search(&self, query: &str, limit: usize, provider: &dyn EmbeddingProvider) -> Result<Vec<RankedResult>> {
        self.search_with(query, limit, provider, Aggregation::Max)
    }

    pub fn search_with(
        &self,
        query: &str,
        limit: usize,
        provider: &dyn EmbeddingProvider,
        aggregation: Aggregation,
    ) -> Result<Vec<RankedResult>> {
        let query_vector = embed_text(provider, query)?;
        if !self.is_empty() && query_vector.len() != self.dimension {
            return Err(SearchError::EmbeddingUnavailable(format!(
                "query vector has {} dimensions, index was built with {}",
                query_vector.len(),
                self.dimension
            )));
        }
        let scores = self.document_scores(&query_vector, aggregation);
        tracing::debug!(query, num_docs = scores.len(), ?aggregation, "semantic search");
        Ok(rank_scores(scores, limit))
    }

    /// Aggregated similarity per document that has at least one chunk.
    pub fn document_scores(&self, query_vector: &[f32], aggregation: Aggregation) -> BTreeMap<DocId, f64> {
        // (max, sum, count) per document
        let mut per_doc: BTreeMap<DocId, (f64, f64, usize)> = BTreeMap::new();
        for (meta, vector) in self.metadata.iter().zip(&self.vectors) {
            let sim = cosine_similarity(query_vector, vector);
            let entry = per_doc.entry(meta.doc_id).or_insert((f64::NEG_INFINITY, 0.0, 0));
            entry.0 = entry.0.max(sim);
            entry.1 += sim;
            entry.2 += 1;
        }
        per_doc
            .into_iter()
            .map(|(doc_id, (max, sum, count))| match aggregation {
                Aggregation::Max => (doc_id, max),
                Aggregation::Mean => (doc_id, sum / count as f64),
            })
            .collect()
    }

    /// Vectors and metadata are written together in one snapshot.
    pub fn save(&self, paths: &IndexPaths) -> Result<()> {
        let header = SnapshotHeader::new(self.source_docs as u32);
        save_snapshot(&paths.chunks(), &(&header, self))?;
        tracing::info!(path = %paths.chunks().display(), num_chunks = self.len(), "saved chunk index");
        Ok(())
    }

    pub fn load(paths: &IndexPaths) -> Result<Self> {
        let path = paths.chunks();
        let (header, index): (SnapshotHeader, ChunkIndex) = load_snapshot(&path)?;
        check_header(&path, &header)?;
        if index.vectors.len() != index.metadata.len() {
            return Err(SearchError::CacheMissing(format!(
                "{} has {} vectors but {} metadata rows",
                path.display(),
                index.vectors.len(),
                index.metadata.len()
            )));
        }
        if index.vectors.iter().any(|v| v.len() != index.dimension) {
            return Err(SearchError::CacheMissing(format!("{} has vectors of mixed dimension", path.display())));
        }
        tracing::info!(path = %path.display(), num_chunks = index.len(), created_at = %header.created_at, "loaded chunk index");
        Ok(index)
    }

    /// Reuse cached chunk embeddings when they were built from a snapshot of
    /// the same size, with the same chunking and provider dimension; otherwise
    /// rebuild.
    pub fn load_or_build(
        paths: &IndexPaths,
        documents: &[Document],
        config: ChunkConfig,
        provider: &dyn EmbeddingProvider,
        batch_size: usize,
    ) -> Result<Self> {
        match Self::load(paths) {
            Ok(index)
                if index.source_docs == documents.len()
                    && index.config == config
                    && index.dimension == provider.dimension() =>
            {
                return Ok(index)
            }
            Ok(index) => tracing::info!(
                cached_docs = index.source_docs,
                current_docs = documents.len(),
                cached_chunking = ?index.config,
                chunking = ?config,
                "chunk cache stale, rebuilding"
            ),
            Err(SearchError::CacheMissing(reason)) => tracing::info!(%reason, "no usable chunk cache, building"),
            Err(e) => return Err(e),
        }
        let index = Self::build(documents, config, provider, batch_size)?;
        index.save(paths)?;
        Ok(index)
    }
}
