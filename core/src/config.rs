use crate::bm25::Bm25Params;
use crate::chunk_index::Aggregation;
use crate::chunker::ChunkConfig;
use crate::error::{Result, SearchError};
use crate::fusion::DEFAULT_RRF_K;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Tunables shared by the indexer and the server. Every field has a default,
/// so a JSON overlay only needs the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub bm25: Bm25Params,
    pub chunking: ChunkConfig,
    pub aggregation: Aggregation,
    pub rrf_k: f64,
    pub alpha: f64,
    /// Candidates each ranking contributes to fusion per requested result.
    pub candidate_multiplier: usize,
    pub embed_batch_size: usize,
    pub embed_timeout_ms: u64,
    /// Embedding calls allowed to run at once, counting ones that timed out.
    pub embed_max_in_flight: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            bm25: Bm25Params::default(),
            chunking: ChunkConfig::default(),
            aggregation: Aggregation::Max,
            rrf_k: DEFAULT_RRF_K,
            alpha: 0.5,
            candidate_multiplier: 500,
            embed_batch_size: 32,
            embed_timeout_ms: 30_000,
            embed_max_in_flight: crate::embedding::DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

impl SearchConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: SearchConfig = serde_json::from_str(&text)
            .map_err(|e| SearchError::InvalidQuery(format!("{}: {e}", path.as_ref().display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.bm25.validate()?;
        self.chunking.validate()
    }

    pub fn embed_timeout(&self) -> Duration {
        Duration::from_millis(self.embed_timeout_ms)
    }

    /// How many results each path should return to feed a fused list of `limit`.
    pub fn candidate_limit(&self, limit: usize) -> usize {
        limit.saturating_mul(self.candidate_multiplier.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn partial_overlay_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("search.json");
        std::fs::write(&path, r#"{"bm25": {"k1": 1.2}, "aggregation": "mean"}"#).unwrap();
        let config = SearchConfig::from_json_file(&path).unwrap();
        assert_eq!(config.bm25.k1, 1.2);
        assert_eq!(config.bm25.b, 0.75);
        assert_eq!(config.aggregation, Aggregation::Mean);
        assert_eq!(config.rrf_k, 60.0);
        assert_eq!(config.candidate_limit(5), 2500);
    }

    #[test]
    fn bad_bm25_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("search.json");
        std::fs::write(&path, r#"{"bm25": {"k1": -1.0}}"#).unwrap();
        assert!(matches!(SearchConfig::from_json_file(&path), Err(SearchError::InvalidQuery(_))));
        std::fs::write(&path, r#"{"bm25": {"b": 2.0}}"#).unwrap();
        assert!(matches!(SearchConfig::from_json_file(&path), Err(SearchError::InvalidQuery(_))));
    }

    #[test]
    fn bad_chunking_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("search.json");
        std::fs::write(&path, r#"{"chunking": {"max_chunk_size": 2, "overlap": 3}}"#).unwrap();
        assert!(matches!(
            SearchConfig::from_json_file(&path),
            Err(SearchError::InvalidChunkConfig { .. })
        ));
    }
}
