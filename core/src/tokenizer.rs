use crate::error::{Result, SearchError};
use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

/// English stopwords. Contractions are omitted because punctuation is stripped
/// before stopword filtering, which would turn e.g. "we'll" into "well".
pub const ENGLISH_STOPWORDS: &[&str] = &[
    "a","about","above","after","again","against","all","am","an","and","any","are","as","at",
    "be","because","been","before","being","below","between","both","but","by",
    "can","cannot","could",
    "did","do","does","doing","down","during",
    "each","few","for","from","further",
    "had","has","have","having","he","her","here","hers","herself","him","himself","his","how",
    "i","if","in","into","is","it","its","itself",
    "me","more","most","my","myself",
    "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
    "same","she","should","so","some","such",
    "than","that","the","their","theirs","them","themselves","then","there","these","they","this","those","through","to","too",
    "under","until","up","very",
    "was","we","were","what","when","where","which","while","who","whom","why","with","would",
    "you","your","yours","yourself","yourselves",
];

lazy_static! {
    static ref PUNCT: Regex = Regex::new(r"[\p{P}\p{S}]").expect("valid regex");
    static ref DEFAULT: Normalizer = Normalizer::default();
}

/// Turns raw text into index tokens: lowercase, strip punctuation, split on
/// whitespace, drop stopwords, stem.
///
/// The stopword set and stemming algorithm are supplied at construction so the
/// same pipeline can be reused with a different vocabulary policy.
pub struct Normalizer {
    stopwords: HashSet<String>,
    stemmer: Stemmer,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(ENGLISH_STOPWORDS.iter().map(|w| w.to_string()), Algorithm::English)
    }
}

impl Normalizer {
    pub fn new<I: IntoIterator<Item = String>>(stopwords: I, algorithm: Algorithm) -> Self {
        Self { stopwords: stopwords.into_iter().collect(), stemmer: Stemmer::create(algorithm) }
    }

    pub fn is_stopword(&self, token: &str) -> bool { self.stopwords.contains(token) }

    pub fn normalize(&self, text: &str) -> Vec<String> {
        let lowered = text.nfkc().collect::<String>().to_lowercase();
        let stripped = PUNCT.replace_all(&lowered, "");
        stripped
            .split_whitespace()
            .filter(|t| !self.is_stopword(t))
            .map(|t| self.stemmer.stem(t).into_owned())
            .collect()
    }

    /// Normalize text that must reduce to exactly one token.
    pub fn normalize_single(&self, text: &str) -> Result<String> {
        let mut tokens = self.normalize(text);
        match tokens.len() {
            1 => Ok(tokens.remove(0)),
            0 => Err(SearchError::InvalidQuery(format!("{text:?} has no indexable token"))),
            n => Err(SearchError::InvalidQuery(format!("{text:?} normalizes to {n} tokens, expected one"))),
        }
    }
}

/// Tokenize with the default English pipeline.
pub fn tokenize(text: &str) -> Vec<String> {
    DEFAULT.normalize(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_tokenize() {
        let t = tokenize("Running, runner's run!");
        assert!(t.iter().any(|w| w == "run"));
    }

    #[test]
    fn punctuation_is_stripped_not_split() {
        assert_eq!(tokenize("sci-fi"), vec!["scifi".to_string()]);
    }

    #[test]
    fn empty_text_yields_nothing() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("  ... !!! ").is_empty());
        assert!(tokenize("the and of").is_empty());
    }

    #[test]
    fn single_term() {
        let n = Normalizer::default();
        assert_eq!(n.normalize_single("Bears").unwrap(), "bear");
        assert!(matches!(n.normalize_single("the"), Err(SearchError::InvalidQuery(_))));
        assert!(matches!(n.normalize_single("grizzly bears"), Err(SearchError::InvalidQuery(_))));
    }

    #[test]
    fn custom_stopwords() {
        let n = Normalizer::new(vec!["movie".to_string()], Algorithm::English);
        assert_eq!(n.normalize("the movie"), vec!["the".to_string()]);
    }
}
