//! Merging a lexical and a semantic ranking into one list.
//!
//! - **Weighted**: min-max normalise each ranking, then
//!   `alpha * lexical + (1 - alpha) * semantic`.
//! - **RRF**: `sum(1 / (k + rank))` over the rankings containing the document.

use crate::error::{Result, SearchError};
use crate::index::DocId;
use crate::ranking::{rank_scores, RankedResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_RRF_K: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum FusionStrategy {
    Weighted { alpha: f64 },
    Rrf { k: f64 },
}

impl FusionStrategy {
    pub fn weighted(alpha: f64) -> Result<Self> {
        let s = FusionStrategy::Weighted { alpha };
        s.validate()?;
        Ok(s)
    }

    pub fn rrf(k: f64) -> Result<Self> {
        let s = FusionStrategy::Rrf { k };
        s.validate()?;
        Ok(s)
    }

    pub fn validate(&self) -> Result<()> {
        match *self {
            FusionStrategy::Weighted { alpha } if !(0.0..=1.0).contains(&alpha) => {
                Err(SearchError::InvalidQuery(format!("alpha {alpha} is outside [0, 1]")))
            }
            FusionStrategy::Rrf { k } if !k.is_finite() || k < 0.0 => {
                Err(SearchError::InvalidQuery(format!("rrf k {k} must be a non-negative number")))
            }
            _ => Ok(()),
        }
    }
}

pub fn fuse(
    lexical: &[RankedResult],
    semantic: &[RankedResult],
    strategy: FusionStrategy,
    limit: usize,
) -> Result<Vec<RankedResult>> {
    strategy.validate()?;
    Ok(match strategy {
        FusionStrategy::Weighted { alpha } => weighted_fusion(lexical, semantic, alpha, limit),
        FusionStrategy::Rrf { k } => rrf_fusion(lexical, semantic, k, limit),
    })
}

pub fn weighted_fusion(
    lexical: &[RankedResult],
    semantic: &[RankedResult],
    alpha: f64,
    limit: usize,
) -> Vec<RankedResult> {
    let mut scores: HashMap<DocId, f64> = HashMap::with_capacity(lexical.len() + semantic.len());
    for (doc_id, norm) in min_max_normalize(lexical) {
        *scores.entry(doc_id).or_insert(0.0) += alpha * norm;
    }
    for (doc_id, norm) in min_max_normalize(semantic) {
        *scores.entry(doc_id).or_insert(0.0) += (1.0 - alpha) * norm;
    }
    rank_scores(scores, limit)
}

pub fn rrf_fusion(lexical: &[RankedResult], semantic: &[RankedResult], k: f64, limit: usize) -> Vec<RankedResult> {
    let mut scores: HashMap<DocId, f64> = HashMap::with_capacity(lexical.len() + semantic.len());
    for list in [lexical, semantic] {
        for (pos, r) in list.iter().enumerate() {
            *scores.entry(r.doc_id).or_insert(0.0) += 1.0 / (k + pos as f64 + 1.0);
        }
    }
    rank_scores(scores, limit)
}

/// Scale scores into `[0, 1]`. A ranking whose scores are all equal
/// (including a single entry) maps every document to 1.
pub fn min_max_normalize(results: &[RankedResult]) -> Vec<(DocId, f64)> {
    let Some((min, max)) = min_max(results) else {
        return Vec::new();
    };
    let range = max - min;
    results
        .iter()
        .map(|r| {
            let norm = if range <= f64::EPSILON { 1.0 } else { (r.score - min) / range };
            (r.doc_id, norm)
        })
        .collect()
}

fn min_max(results: &[RankedResult]) -> Option<(f64, f64)> {
    if results.is_empty() {
        return None;
    }
    let mut min = f64::MAX;
    let mut max = f64::MIN;
    for r in results {
        min = min.min(r.score);
        max = max.max(r.score);
    }
    Some((min, max))
}
