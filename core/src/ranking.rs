use crate::DocId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub doc_id: DocId,
    pub score: f64,
    /// 1-based position in the result list.
    pub rank: usize,
}

/// Order by descending score, ascending doc id on ties, keep the first `limit`
/// and number them from 1.
pub fn rank_scores<I>(scores: I, limit: usize) -> Vec<RankedResult>
where
    I: IntoIterator<Item = (DocId, f64)>,
{
    let mut scored: Vec<(DocId, f64)> = scores.into_iter().collect();
    scored.sort_by(|a, b| compare_desc(a.1, b.1).then(a.0.cmp(&b.0)));
    scored.truncate(limit);
    scored
        .into_iter()
        .enumerate()
        .map(|(i, (doc_id, score))| RankedResult { doc_id, score, rank: i + 1 })
        .collect()
}

fn compare_desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ties_break_on_doc_id() {
        let ranked = rank_scores(vec![(7, 1.0), (3, 2.0), (5, 1.0), (1, 1.0)], 10);
        let ids: Vec<DocId> = ranked.iter().map(|r| r.doc_id).collect();
        assert_eq!(ids, vec![3, 1, 5, 7]);
        let ranks: Vec<usize> = ranked.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
    }

    #[test]
    fn truncates() {
        let ranked = rank_scores((1..=20).map(|i| (i, i as f64)), 3);
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].doc_id, 20);
        assert!(rank_scores(vec![(1, 1.0)], 0).is_empty());
    }
}
