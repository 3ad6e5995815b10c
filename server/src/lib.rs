use anyhow::Result;
use axum::{extract::{Path, Query, State}, http::StatusCode, routing::get, Json, Router};
use reelsearch_core::{
    DocId, EmbeddingProvider, FusionStrategy, HashingEmbedder, HybridSearch, IndexPaths, RankedResult,
    SearchConfig, SearchError,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

type ApiError = (StatusCode, String);

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
}
fn default_k() -> usize { 10 }

#[derive(Deserialize)]
pub struct HybridParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default)]
    pub strategy: Option<String>,
    pub alpha: Option<f64>,
    pub rrf_k: Option<f64>,
    #[serde(default)]
    pub degrade: bool,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    /// True when a hybrid request fell back to keyword ranking.
    pub degraded: bool,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub rank: usize,
    pub score: f64,
    pub title: String,
    pub snippet: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub search: Arc<HybridSearch>,
}

/// Load both indexes from `index_dir` and query them with the hashing embedder.
pub fn build_app(index_dir: &str, config: SearchConfig, dim: usize) -> Result<Router> {
    let paths = IndexPaths::new(index_dir);
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbedder::new(dim));
    let search = HybridSearch::open(&paths, provider, config)?;
    tracing::info!(num_docs = search.index().num_docs(), num_chunks = search.chunks().len(), "indexes loaded");
    Ok(router(Arc::new(search)))
}

pub fn router(search: Arc<HybridSearch>) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(keyword_handler))
        .route("/search/semantic", get(semantic_handler))
        .route("/search/hybrid", get(hybrid_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .with_state(AppState { search })
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn clamp_k(k: usize) -> usize { k.clamp(1, 100) }

fn status_for(err: &SearchError) -> StatusCode {
    match err {
        SearchError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
        SearchError::EmbeddingUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(err: SearchError) -> ApiError {
    (status_for(&err), err.to_string())
}

/// Embedding calls block, so semantic work runs off the async workers.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> reelsearch_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("search task failed: {e}")))?
        .map_err(api_error)
}

pub async fn keyword_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let start = Instant::now();
    let results = state.search.keyword(&params.q, clamp_k(params.k)).map_err(api_error)?;
    Ok(Json(respond(&state, params.q, start, results, false)))
}

pub async fn semantic_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let start = Instant::now();
    let search = Arc::clone(&state.search);
    let q = params.q.clone();
    let k = clamp_k(params.k);
    let results = blocking(move || search.semantic(&q, k)).await?;
    Ok(Json(respond(&state, params.q, start, results, false)))
}

pub async fn hybrid_handler(
    State(state): State<AppState>,
    Query(params): Query<HybridParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let start = Instant::now();
    let config = state.search.config();
    let strategy = match params.strategy.as_deref().unwrap_or("rrf") {
        "rrf" => FusionStrategy::rrf(params.rrf_k.unwrap_or(config.rrf_k)),
        "weighted" => FusionStrategy::weighted(params.alpha.unwrap_or(config.alpha)),
        other => Err(SearchError::InvalidQuery(format!("unknown strategy {other:?}"))),
    }
    .map_err(api_error)?;

    let search = Arc::clone(&state.search);
    let q = params.q.clone();
    let k = clamp_k(params.k);
    let (results, degraded) = if params.degrade {
        let outcome = blocking(move || search.hybrid_or_lexical(&q, k, strategy)).await?;
        (outcome.results, outcome.degraded)
    } else {
        (blocking(move || search.hybrid(&q, k, strategy)).await?, false)
    };
    Ok(Json(respond(&state, params.q, start, results, degraded)))
}

pub async fn doc_handler(
    State(state): State<AppState>,
    Path(doc_id): Path<DocId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let doc = state
        .search
        .index()
        .document(doc_id)
        .ok_or((StatusCode::NOT_FOUND, format!("document {doc_id} not found")))?;
    Ok(Json(serde_json::json!({
        "doc_id": doc.id,
        "title": doc.title,
        "description": doc.description,
    })))
}

fn respond(state: &AppState, query: String, start: Instant, results: Vec<RankedResult>, degraded: bool) -> SearchResponse {
    let raw_terms: Vec<String> = query.split_whitespace().map(|s| s.to_string()).collect();
    let index = state.search.index();
    let hits: Vec<SearchHit> = results
        .into_iter()
        .filter_map(|r| {
            let doc = index.document(r.doc_id)?;
            Some(SearchHit {
                doc_id: r.doc_id,
                rank: r.rank,
                score: r.score,
                title: doc.title.clone(),
                snippet: snippet(&doc.description, &raw_terms),
            })
        })
        .collect();
    SearchResponse { query, took_s: start.elapsed().as_secs_f64(), total_hits: hits.len(), degraded, results: hits }
}

/// Up to 200 characters around the first query term found, terms wrapped in `<em>`.
fn snippet(text: &str, raw_terms: &[String]) -> Option<String> {
    if text.is_empty() {
        return None;
    }
    let lower = text.to_lowercase();
    let first_byte = raw_terms
        .iter()
        .filter(|t| !t.trim().is_empty())
        .find_map(|t| lower.find(&t.to_lowercase()));
    // lowercasing can shift byte offsets for some scripts; fall back to the start
    let start_char = match first_byte {
        Some(idx) if lower.len() == text.len() && text.is_char_boundary(idx) => text[..idx].chars().count().saturating_sub(100),
        _ => 0,
    };
    let window: String = text.chars().skip(start_char).take(200).collect();
    Some(highlight_terms(&window, raw_terms))
}

fn highlight_terms(snippet: &str, terms: &[String]) -> String {
    let mut s = snippet.to_string();
    for t in terms {
        if t.trim().is_empty() {
            continue;
        }
        let Ok(pat) = regex::RegexBuilder::new(&regex::escape(t)).case_insensitive(true).build() else {
            continue;
        };
        s = pat.replace_all(&s, |caps: &regex::Captures| format!("<em>{}</em>", &caps[0])).to_string();
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_highlights_terms() {
        let s = snippet("A shark hunts near the Beach.", &["beach".to_string()]).unwrap();
        assert_eq!(s, "A shark hunts near the <em>Beach</em>.");
        assert!(snippet("", &["x".to_string()]).is_none());
    }

    #[test]
    fn snippet_windows_long_text() {
        let text = format!("{}needle{}", "x".repeat(500), "y".repeat(500));
        let s = snippet(&text, &["needle".to_string()]).unwrap();
        assert!(s.starts_with(&"x".repeat(100)));
        assert!(s.contains("<em>needle</em>"));
    }

    #[test]
    fn errors_map_to_status() {
        assert_eq!(status_for(&SearchError::InvalidQuery("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&SearchError::EmbeddingUnavailable("x".into())), StatusCode::SERVICE_UNAVAILABLE);
    }
}
