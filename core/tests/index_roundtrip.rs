use reelsearch_core::{
    Bm25Ranker, ChunkConfig, ChunkIndex, Document, HashingEmbedder, IndexPaths, InvertedIndex, Normalizer,
    SearchError,
};
use tempfile::tempdir;

fn movies() -> Vec<Document> {
    vec![
        Document::new(1, "The Bear", "A chef returns home to run the family sandwich shop."),
        Document::new(2, "Alien", "The crew of a space freighter meets a deadly creature. Nobody hears them scream."),
        Document::new(3, "Cars", "A race car learns that life is about the journey. He finds friends in a small town."),
    ]
}

#[test]
fn save_then_load_reproduces_every_table() {
    let dir = tempdir().unwrap();
    let paths = IndexPaths::new(dir.path());
    let normalizer = Normalizer::default();
    let built = InvertedIndex::build(&movies(), &normalizer).unwrap();
    built.save(&paths).unwrap();

    let loaded = InvertedIndex::load(&paths).unwrap();
    assert_eq!(loaded, built);
    assert_eq!(loaded.document(2).unwrap().title, "Alien");
    assert_eq!(loaded.postings("crew"), built.postings("crew"));
}

#[test]
fn load_before_build_is_cache_missing() {
    let dir = tempdir().unwrap();
    let err = InvertedIndex::load(&IndexPaths::new(dir.path().join("never-built"))).unwrap_err();
    assert!(matches!(err, SearchError::CacheMissing(_)));
}

#[test]
fn rebuild_replaces_previous_snapshot() {
    let dir = tempdir().unwrap();
    let paths = IndexPaths::new(dir.path());
    let normalizer = Normalizer::default();
    InvertedIndex::build(&movies(), &normalizer).unwrap().save(&paths).unwrap();
    let smaller = InvertedIndex::build(&movies()[..1], &normalizer).unwrap();
    smaller.save(&paths).unwrap();
    let loaded = InvertedIndex::load(&paths).unwrap();
    assert_eq!(loaded.num_docs(), 1);
    assert!(loaded.postings("crew").is_empty());
}

#[test]
fn single_document_term_ranks_first_and_others_score_zero() {
    let normalizer = Normalizer::default();
    let index = InvertedIndex::build(&movies(), &normalizer).unwrap();
    let ranker = Bm25Ranker::new(&index, &normalizer);
    let results = ranker.search("freighter", 10).unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].doc_id, 2);
    assert!(results[0].score > 0.0);
    assert_eq!(results[1].score, 0.0);
    assert_eq!(results[2].score, 0.0);
    assert_eq!((results[1].doc_id, results[2].doc_id), (1, 3));
}

#[test]
fn unseen_terms_do_not_abort_multi_term_queries() {
    let normalizer = Normalizer::default();
    let index = InvertedIndex::build(&movies(), &normalizer).unwrap();
    let ranker = Bm25Ranker::new(&index, &normalizer);
    let with_noise = ranker.search("xylophone freighter", 3).unwrap();
    let plain = ranker.search("freighter", 3).unwrap();
    assert_eq!(with_noise, plain);
}

#[test]
fn chunk_index_round_trip() {
    let dir = tempdir().unwrap();
    let paths = IndexPaths::new(dir.path());
    let embedder = HashingEmbedder::new(64);
    let built = ChunkIndex::build(&movies(), ChunkConfig::new(1, 0).unwrap(), &embedder, 2).unwrap();
    assert_eq!(built.len(), 5);
    built.save(&paths).unwrap();
    let loaded = ChunkIndex::load(&paths).unwrap();
    assert_eq!(loaded, built);
    let results = loaded.search("space creature", 1, &embedder).unwrap();
    assert_eq!(results[0].doc_id, 2);
}
