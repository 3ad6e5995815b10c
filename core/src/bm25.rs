//! Okapi BM25 over an [`InvertedIndex`].

use crate::error::{Result, SearchError};
use crate::index::{DocId, InvertedIndex};
use crate::ranking::{rank_scores, RankedResult};
use crate::tokenizer::Normalizer;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bm25Params {
    /// Term frequency saturation.
    pub k1: f64,
    /// Length normalisation strength.
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self { Self { k1: 1.5, b: 0.75 } }
}

impl Bm25Params {
    /// `k1` must be finite and non-negative, `b` within `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        if !self.k1.is_finite() || self.k1 < 0.0 {
            return Err(SearchError::InvalidQuery(format!("bm25 k1 {} must be a non-negative number", self.k1)));
        }
        if !(0.0..=1.0).contains(&self.b) {
            return Err(SearchError::InvalidQuery(format!("bm25 b {} is outside [0, 1]", self.b)));
        }
        Ok(())
    }
}

pub struct Bm25Ranker<'a> {
    index: &'a InvertedIndex,
    normalizer: &'a Normalizer,
    params: Bm25Params,
}

impl<'a> Bm25Ranker<'a> {
    pub fn new(index: &'a InvertedIndex, normalizer: &'a Normalizer) -> Self {
        Self { index, normalizer, params: Bm25Params::default() }
    }

    pub fn with_params(mut self, params: Bm25Params) -> Self {
        self.params = params;
        self
    }

    /// `ln((N - df + 0.5) / (df + 0.5) + 1)`. Unseen tokens get the largest
    /// value in the corpus.
    pub fn idf(&self, token: &str) -> f64 {
        let n = self.index.num_docs() as f64;
        let df = self.index.document_frequency(token) as f64;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    pub fn tf_score(&self, doc_id: DocId, token: &str, params: Bm25Params) -> f64 {
        let tf = self.index.term_frequency(doc_id, token) as f64;
        if tf == 0.0 {
            return 0.0;
        }
        let avg_len = self.index.average_document_length();
        let length_norm = if avg_len == 0.0 {
            1.0
        } else {
            1.0 - params.b + params.b * (self.index.doc_length(doc_id) as f64 / avg_len)
        };
        tf * (params.k1 + 1.0) / (tf + params.k1 * length_norm)
    }

    /// Sum of per-token contributions; repeated query tokens count each time.
    pub fn score(&self, doc_id: DocId, query_tokens: &[String], params: Bm25Params) -> f64 {
        query_tokens
            .iter()
            .map(|t| self.tf_score(doc_id, t, params) * self.idf(t))
            .sum()
    }

    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<RankedResult>> {
        self.search_with(query, limit, self.params)
    }

    /// Score every indexed document against `query`.
    pub fn search_with(&self, query: &str, limit: usize, params: Bm25Params) -> Result<Vec<RankedResult>> {
        params.validate()?;
        let tokens = self.normalizer.normalize(query);
        tracing::debug!(query, tokens = tokens.len(), num_docs = self.index.num_docs(), "bm25 search");
        Ok(rank_scores(
            self.index.doc_ids().map(|id| (id, self.score(id, &tokens, params))),
            limit,
        ))
    }

    /// Raw occurrence count of a single term in a document.
    pub fn term_tf(&self, doc_id: DocId, term: &str) -> Result<u32> {
        let token = self.normalizer.normalize_single(term)?;
        Ok(self.index.term_frequency(doc_id, &token))
    }

    /// Classic smoothed IDF, `ln((N + 1) / (df + 1))`.
    pub fn term_idf(&self, term: &str) -> Result<f64> {
        let token = self.normalizer.normalize_single(term)?;
        let n = self.index.num_docs() as f64;
        let df = self.index.document_frequency(&token) as f64;
        Ok(((n + 1.0) / (df + 1.0)).ln())
    }

    pub fn term_bm25_idf(&self, term: &str) -> Result<f64> {
        let token = self.normalizer.normalize_single(term)?;
        Ok(self.idf(&token))
    }

    pub fn term_bm25_tf(&self, doc_id: DocId, term: &str, params: Bm25Params) -> Result<f64> {
        params.validate()?;
        let token = self.normalizer.normalize_single(term)?;
        Ok(self.tf_score(doc_id, &token, params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Document;

    fn corpus() -> InvertedIndex {
        let docs = vec![
            Document::new(1, "", "apple banana"),
            Document::new(2, "", "apple apple banana"),
            Document::new(3, "", "banana"),
        ];
        InvertedIndex::build(&docs, &Normalizer::default()).unwrap()
    }

    #[test]
    fn idf_matches_formula() {
        let idx = corpus();
        let n = Normalizer::default();
        let r = Bm25Ranker::new(&idx, &n);
        assert_eq!(idx.document_frequency("appl"), 2);
        assert!((r.idf("appl") - 1.6f64.ln()).abs() < 1e-9);
        assert!((r.idf("appl") - 0.470).abs() < 1e-3);
        assert_eq!(idx.term_frequency(2, "appl"), 2);
    }

    #[test]
    fn unseen_token_has_max_idf_and_zero_contribution() {
        let idx = corpus();
        let n = Normalizer::default();
        let r = Bm25Ranker::new(&idx, &n);
        assert!(r.idf("zzz") > r.idf("appl"));
        assert!(r.idf("zzz") > r.idf("banana"));
        let tokens = vec!["zzz".to_string(), "appl".to_string()];
        let only_known = vec!["appl".to_string()];
        let p = Bm25Params::default();
        assert_eq!(r.score(2, &tokens, p), r.score(2, &only_known, p));
    }

    #[test]
    fn tf_score_saturates_and_normalizes_length() {
        let idx = corpus();
        let n = Normalizer::default();
        let r = Bm25Ranker::new(&idx, &n);
        let p = Bm25Params::default();
        assert_eq!(r.tf_score(3, "appl", p), 0.0);
        assert!(r.tf_score(2, "appl", p) > r.tf_score(1, "appl", p));
        let no_len = Bm25Params { k1: 1.5, b: 0.0 };
        // with b = 0, tf = 1 gives exactly 1
        assert!((r.tf_score(1, "appl", no_len) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn duplicate_query_tokens_count_twice() {
        let idx = corpus();
        let n = Normalizer::default();
        let r = Bm25Ranker::new(&idx, &n);
        let p = Bm25Params::default();
        let once = r.score(1, &["appl".to_string()], p);
        let twice = r.score(1, &["appl".to_string(), "appl".to_string()], p);
        assert!((twice - 2.0 * once).abs() < 1e-12);
    }

    #[test]
    fn search_orders_by_score_then_id() {
        let idx = corpus();
        let n = Normalizer::default();
        let r = Bm25Ranker::new(&idx, &n);
        let results = r.search("apple", 10).unwrap();
        let ids: Vec<DocId> = results.iter().map(|x| x.doc_id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
        assert_eq!(results[2].score, 0.0);
        assert_eq!(r.search("apple", 1).unwrap().len(), 1);
    }

    #[test]
    fn zero_k1_keeps_matching_document_first() {
        let docs = vec![
            Document::new(1, "", "apple banana"),
            Document::new(2, "", "cherry cherry banana"),
            Document::new(3, "", "banana"),
        ];
        let idx = InvertedIndex::build(&docs, &Normalizer::default()).unwrap();
        let n = Normalizer::default();
        let r = Bm25Ranker::new(&idx, &n);
        let results = r.search_with("cherry", 3, Bm25Params { k1: 0.0, b: 0.75 }).unwrap();
        assert_eq!(results[0].doc_id, 2);
        assert!(results.iter().all(|x| !x.score.is_nan()));
        assert_eq!(results[1].score, 0.0);
        assert_eq!(results[2].score, 0.0);
    }

    #[test]
    fn out_of_range_params_rejected() {
        let idx = corpus();
        let n = Normalizer::default();
        let r = Bm25Ranker::new(&idx, &n);
        for params in [
            Bm25Params { k1: -1.0, b: 0.75 },
            Bm25Params { k1: f64::NAN, b: 0.75 },
            Bm25Params { k1: 1.5, b: -0.5 },
            Bm25Params { k1: 1.5, b: 1.5 },
        ] {
            assert!(matches!(r.search_with("apple", 3, params), Err(SearchError::InvalidQuery(_))));
            assert!(r.term_bm25_tf(1, "apple", params).is_err());
        }
        let bad = Bm25Ranker::new(&idx, &n).with_params(Bm25Params { k1: -2.0, b: 0.5 });
        assert!(bad.search("apple", 3).is_err());
    }

    #[test]
    fn diagnostics_require_single_term() {
        let idx = corpus();
        let n = Normalizer::default();
        let r = Bm25Ranker::new(&idx, &n);
        assert_eq!(r.term_tf(2, "Apples").unwrap(), 2);
        assert!(r.term_tf(2, "apple banana").is_err());
        assert!((r.term_idf("banana").unwrap() - (4.0f64 / 4.0).ln()).abs() < 1e-12);
        assert!((r.term_bm25_idf("apple").unwrap() - r.idf("appl")).abs() < 1e-12);
    }
}
