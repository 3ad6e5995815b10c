use thiserror::Error;

use crate::DocId;

/// Errors raised by index construction, persistence and querying.
#[derive(Debug, Error)]
pub enum SearchError {
    /// A single-term lookup did not normalise to exactly one token, or a query
    /// parameter was out of range.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Chunking parameters that would never terminate.
    #[error("invalid chunk config: overlap {overlap} must be smaller than max_chunk_size {max_chunk_size}")]
    InvalidChunkConfig { max_chunk_size: usize, overlap: usize },

    #[error("duplicate document id {0}")]
    DuplicateDocumentId(DocId),

    /// The persisted cache is absent, partial or unreadable.
    #[error("cache missing: {0}")]
    CacheMissing(String),

    /// The embedding capability failed or timed out.
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

impl SearchError {
    /// True when the semantic path failed, as opposed to returning no results.
    pub fn is_embedding_failure(&self) -> bool {
        matches!(self, SearchError::EmbeddingUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;
