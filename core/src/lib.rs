//! Hybrid lexical + semantic retrieval over movie records.
//!
//! BM25 over an inverted index and max-pooled chunk embeddings produce two
//! independent rankings, which [`fusion`] merges into one list.

pub mod bm25;
pub mod chunk_index;
pub mod chunker;
pub mod config;
pub mod embedding;
pub mod error;
pub mod fusion;
pub mod hybrid;
pub mod index;
pub mod persist;
pub mod ranking;
pub mod tokenizer;

pub use bm25::{Bm25Params, Bm25Ranker};
pub use chunk_index::{Aggregation, ChunkIndex, ChunkMetadata};
pub use chunker::{Chunk, ChunkConfig};
pub use config::SearchConfig;
pub use embedding::{EmbeddingProvider, HashingEmbedder, TimeoutEmbedder};
pub use error::{Result, SearchError};
pub use fusion::FusionStrategy;
pub use hybrid::{HybridOutcome, HybridSearch};
pub use index::{DocId, Document, InvertedIndex};
pub use persist::IndexPaths;
pub use ranking::RankedResult;
pub use tokenizer::Normalizer;
