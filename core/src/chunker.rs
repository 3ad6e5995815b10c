use crate::error::{Result, SearchError};
use crate::index::{DocId, Document};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref SENTENCE_END: Regex = Regex::new(r"[.!?]\s+").expect("valid regex");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    /// Sentences per chunk.
    pub max_chunk_size: usize,
    /// Trailing sentences repeated at the start of the next chunk.
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self { Self { max_chunk_size: 4, overlap: 1 } }
}

impl ChunkConfig {
    pub fn new(max_chunk_size: usize, overlap: usize) -> Result<Self> {
        let config = Self { max_chunk_size, overlap };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.overlap >= self.max_chunk_size {
            return Err(SearchError::InvalidChunkConfig {
                max_chunk_size: self.max_chunk_size,
                overlap: self.overlap,
            });
        }
        Ok(())
    }
}

/// A window of one document's sentences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub doc_id: DocId,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub text: String,
}

/// Split on `.`, `!` or `?` followed by whitespace. The punctuation stays with
/// its sentence.
pub fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    for m in SENTENCE_END.find_iter(text) {
        out.push(&text[start..m.start() + 1]);
        start = m.end();
    }
    out.push(&text[start..]);
    out.into_iter().map(str::trim).filter(|s| !s.is_empty()).collect()
}

pub fn split(text: &str, max_chunk_size: usize, overlap: usize) -> Result<Vec<String>> {
    ChunkConfig::new(max_chunk_size, overlap)?;
    let units = sentences(text);
    let step = max_chunk_size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < units.len() {
        let end = (start + max_chunk_size).min(units.len());
        let window = &units[start..end];
        // A tail made only of already-emitted overlap sentences adds nothing.
        if !chunks.is_empty() && window.len() <= overlap {
            break;
        }
        chunks.push(window.join(" "));
        start += step;
    }
    Ok(chunks)
}

/// Chunk a document's description. Documents without one produce no chunks.
pub fn chunk_document(doc: &Document, config: ChunkConfig) -> Result<Vec<Chunk>> {
    let texts = split(&doc.description, config.max_chunk_size, config.overlap)?;
    let total_chunks = texts.len();
    Ok(texts
        .into_iter()
        .enumerate()
        .map(|(chunk_index, text)| Chunk { doc_id: doc.id, chunk_index, total_chunks, text })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "One fish. Two fish! Red fish? Blue fish. Old fish.";

    #[test]
    fn sentence_boundaries() {
        assert_eq!(sentences(TEXT), vec!["One fish.", "Two fish!", "Red fish?", "Blue fish.", "Old fish."]);
        assert_eq!(sentences("No terminator here"), vec!["No terminator here"]);
        assert_eq!(sentences("v1.2 is out. Yes."), vec!["v1.2 is out.", "Yes."]);
    }

    #[test]
    fn zero_overlap_partitions() {
        let chunks = split(TEXT, 2, 0).unwrap();
        assert_eq!(chunks, vec!["One fish. Two fish!", "Red fish? Blue fish.", "Old fish."]);
        assert_eq!(chunks.join(" "), sentences(TEXT).join(" "));
    }

    #[test]
    fn overlap_repeats_trailing_sentences() {
        let chunks = split(TEXT, 3, 1).unwrap();
        assert_eq!(chunks, vec!["One fish. Two fish! Red fish?", "Red fish? Blue fish. Old fish."]);
    }

    #[test]
    fn rejects_non_terminating_config() {
        assert!(matches!(split(TEXT, 2, 2), Err(SearchError::InvalidChunkConfig { .. })));
        assert!(matches!(split(TEXT, 2, 5), Err(SearchError::InvalidChunkConfig { .. })));
        assert!(split(TEXT, 0, 0).is_err());
    }

    #[test]
    fn blank_input_has_no_chunks() {
        assert!(split("", 3, 1).unwrap().is_empty());
        assert!(split("   \n\t ", 3, 1).unwrap().is_empty());
    }

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(split("Just one.", 4, 1).unwrap(), vec!["Just one."]);
    }

    #[test]
    fn document_chunks_are_numbered() {
        let doc = Document::new(9, "Fish", TEXT);
        let chunks = chunk_document(&doc, ChunkConfig::new(2, 0).unwrap()).unwrap();
        assert_eq!(chunks.len(), 3);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.doc_id, 9);
            assert_eq!(c.chunk_index, i);
            assert_eq!(c.total_chunks, 3);
        }
        let empty = Document::new(10, "Nothing", "");
        assert!(chunk_document(&empty, ChunkConfig::default()).unwrap().is_empty());
    }
}
