use crate::error::{Result, SearchError};
use crate::persist::{check_header, load_snapshot, save_snapshot, IndexPaths, SnapshotHeader};
use crate::tokenizer::Normalizer;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub type DocId = u32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub title: String,
    pub description: String,
}

impl Document {
    pub fn new(id: DocId, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self { id, title: title.into(), description: description.into() }
    }

    /// Text that the lexical index sees.
    pub fn indexed_text(&self) -> String {
        format!("{} {}", self.title, self.description)
    }
}

static EMPTY_POSTINGS: BTreeSet<DocId> = BTreeSet::new();

/// Token → documents, plus the per-document counts BM25 needs.
///
/// Built in one pass from a document snapshot and read-only afterwards.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvertedIndex {
    postings: HashMap<String, BTreeSet<DocId>>,
    term_frequencies: HashMap<DocId, HashMap<String, u32>>,
    doc_lengths: BTreeMap<DocId, u32>,
    docmap: BTreeMap<DocId, Document>,
}

impl InvertedIndex {
    pub fn new() -> Self { Self::default() }

    pub fn build(documents: &[Document], normalizer: &Normalizer) -> Result<Self> {
        let mut index = Self::new();
        for doc in documents {
            if index.docmap.contains_key(&doc.id) {
                return Err(SearchError::DuplicateDocumentId(doc.id));
            }
            let tokens = normalizer.normalize(&doc.indexed_text());
            index.doc_lengths.insert(doc.id, tokens.len() as u32);
            let tf = index.term_frequencies.entry(doc.id).or_default();
            for token in tokens {
                index.postings.entry(token.clone()).or_default().insert(doc.id);
                *tf.entry(token).or_insert(0) += 1;
            }
            index.docmap.insert(doc.id, doc.clone());
        }
        tracing::info!(num_docs = index.num_docs(), num_terms = index.postings.len(), "built inverted index");
        Ok(index)
    }

    pub fn postings(&self, token: &str) -> &BTreeSet<DocId> {
        self.postings.get(token).unwrap_or(&EMPTY_POSTINGS)
    }

    /// Sorted ids of documents containing a single raw term.
    pub fn documents_for_term(&self, term: &str, normalizer: &Normalizer) -> Result<Vec<DocId>> {
        let token = normalizer.normalize_single(term)?;
        Ok(self.postings(&token).iter().copied().collect())
    }

    pub fn term_frequency(&self, doc_id: DocId, token: &str) -> u32 {
        self.term_frequencies
            .get(&doc_id)
            .and_then(|tf| tf.get(token))
            .copied()
            .unwrap_or(0)
    }

    pub fn document_frequency(&self, token: &str) -> usize {
        self.postings(token).len()
    }

    pub fn doc_length(&self, doc_id: DocId) -> u32 {
        self.doc_lengths.get(&doc_id).copied().unwrap_or(0)
    }

    pub fn average_document_length(&self) -> f64 {
        if self.doc_lengths.is_empty() {
            return 0.0;
        }
        let total: u64 = self.doc_lengths.values().map(|&l| l as u64).sum();
        total as f64 / self.doc_lengths.len() as f64
    }

    pub fn num_docs(&self) -> usize { self.docmap.len() }

    pub fn num_terms(&self) -> usize { self.postings.len() }

    pub fn document(&self, doc_id: DocId) -> Option<&Document> { self.docmap.get(&doc_id) }

    /// Document ids in ascending order.
    pub fn doc_ids(&self) -> impl Iterator<Item = DocId> + '_ {
        self.docmap.keys().copied()
    }

    pub fn is_empty(&self) -> bool { self.docmap.is_empty() }

    /// Persist all tables as a single snapshot.
    pub fn save(&self, paths: &IndexPaths) -> Result<()> {
        let header = SnapshotHeader::new(self.num_docs() as u32);
        save_snapshot(&paths.index(), &(&header, self))?;
        tracing::info!(path = %paths.index().display(), num_docs = header.num_docs, "saved inverted index");
        Ok(())
    }

    pub fn load(paths: &IndexPaths) -> Result<Self> {
        let path = paths.index();
        let (header, index): (SnapshotHeader, InvertedIndex) = load_snapshot(&path)?;
        check_header(&path, &header)?;
        index.check_consistent()?;
        tracing::info!(path = %path.display(), num_docs = index.num_docs(), created_at = %header.created_at, "loaded inverted index");
        Ok(index)
    }

    /// Load the cached index when it covers the same number of documents,
    /// otherwise rebuild from `documents` and persist.
    pub fn load_or_build(paths: &IndexPaths, documents: &[Document], normalizer: &Normalizer) -> Result<Self> {
        match Self::load(paths) {
            Ok(index) if index.num_docs() == documents.len() => return Ok(index),
            Ok(index) => tracing::info!(cached = index.num_docs(), current = documents.len(), "index cache stale, rebuilding"),
            Err(SearchError::CacheMissing(reason)) => tracing::info!(%reason, "no usable index cache, building"),
            Err(e) => return Err(e),
        }
        let index = Self::build(documents, normalizer)?;
        index.save(paths)?;
        Ok(index)
    }

    fn check_consistent(&self) -> Result<()> {
        let ids_match = self.docmap.keys().eq(self.doc_lengths.keys())
            && self.docmap.keys().all(|id| self.term_frequencies.contains_key(id));
        if !ids_match {
            return Err(SearchError::CacheMissing("index tables disagree on document ids".into()));
        }
        Ok(())
    }
}
