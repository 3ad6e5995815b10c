use reelsearch_core::tokenizer::{tokenize, Normalizer};

#[test]
fn it_normalizes_and_stems() {
    let words = tokenize("Running Runners RUN! The hero's journey.");
    assert!(words.contains(&"run".to_string()));
    assert!(words.contains(&"hero".to_string()));
    assert!(words.contains(&"journey".to_string()));
}

#[test]
fn it_filters_stopwords() {
    let words = tokenize("The quick brown fox and the lazy dog");
    assert!(!words.contains(&"the".to_string()));
    assert!(!words.contains(&"and".to_string()));
    assert_eq!(words.len(), 5);
}

#[test]
fn it_preserves_token_order() {
    let words = Normalizer::default().normalize("zombies attack london");
    assert_eq!(words, vec!["zombi", "attack", "london"]);
}
