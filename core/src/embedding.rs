//! The text → vector capability used by semantic retrieval.
//!
//! Models are injected as [`EmbeddingProvider`] trait objects rather than held
//! in a global, so indexes can be built and queried with any backend or a stub.

use crate::error::{Result, SearchError};
use crate::tokenizer::tokenize;
use sha1::{Digest, Sha1};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Length of every vector this provider returns.
    fn dimension(&self) -> usize;

    /// One vector per input text, in input order.
    fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_many(&[text.to_string()])?
            .pop()
            .ok_or_else(|| SearchError::EmbeddingUnavailable(format!("{} returned no vector", self.name())))
    }
}

/// Embed user-supplied text, rejecting blank input.
pub fn embed_text(provider: &dyn EmbeddingProvider, text: &str) -> Result<Vec<f32>> {
    if text.trim().is_empty() {
        return Err(SearchError::InvalidQuery("text to embed is empty or whitespace".into()));
    }
    let vector = provider.embed(text)?;
    check_dimension(provider, &vector)?;
    Ok(vector)
}

/// Embed `texts` in batches of `batch_size`, checking count and dimension of
/// every batch.
pub fn embed_batched(provider: &dyn EmbeddingProvider, texts: &[String], batch_size: usize) -> Result<Vec<Vec<f32>>> {
    let mut out = Vec::with_capacity(texts.len());
    for batch in texts.chunks(batch_size.max(1)) {
        let vectors = provider.embed_many(batch)?;
        if vectors.len() != batch.len() {
            return Err(SearchError::EmbeddingUnavailable(format!(
                "{} returned {} vectors for {} texts",
                provider.name(),
                vectors.len(),
                batch.len()
            )));
        }
        for v in &vectors {
            check_dimension(provider, v)?;
        }
        tracing::debug!(provider = provider.name(), batch = batch.len(), done = out.len() + batch.len(), "embedded batch");
        out.extend(vectors);
    }
    Ok(out)
}

fn check_dimension(provider: &dyn EmbeddingProvider, vector: &[f32]) -> Result<()> {
    if vector.len() != provider.dimension() {
        return Err(SearchError::EmbeddingUnavailable(format!(
            "{} returned a {}-dimensional vector, expected {}",
            provider.name(),
            vector.len(),
            provider.dimension()
        )));
    }
    Ok(())
}

/// Signed feature hashing of normalised tokens. Deterministic and model-free;
/// related texts score by shared vocabulary only.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

pub const DEFAULT_HASHING_DIM: usize = 384;

impl Default for HashingEmbedder {
    fn default() -> Self { Self::new(DEFAULT_HASHING_DIM) }
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension: dimension.max(1) }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimension];
        for token in tokenize(text) {
            let digest = Sha1::digest(token.as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let slot = (u64::from_le_bytes(bucket) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            v[slot] += sign;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

impl EmbeddingProvider for HashingEmbedder {
    fn name(&self) -> &str { "hashing" }

    fn dimension(&self) -> usize { self.dimension }

    fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;

/// Bounds every call to the wrapped provider. A call that overruns is reported
/// as [`SearchError::EmbeddingUnavailable`] and is not retried.
///
/// Each call runs on its own worker thread. A worker whose caller timed out
/// keeps running until the provider returns, so at most `max_in_flight`
/// workers may exist at once; further calls fail immediately instead of
/// spawning more threads behind a stuck provider.
pub struct TimeoutEmbedder {
    inner: Arc<dyn EmbeddingProvider>,
    timeout: Duration,
    max_in_flight: usize,
    in_flight: Arc<AtomicUsize>,
}

/// Releases a worker slot when the worker finishes, even if it panics.
struct Slot(Arc<AtomicUsize>);

impl Drop for Slot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl TimeoutEmbedder {
    pub fn new(inner: Arc<dyn EmbeddingProvider>, timeout: Duration) -> Self {
        Self::with_max_in_flight(inner, timeout, DEFAULT_MAX_IN_FLIGHT)
    }

    pub fn with_max_in_flight(inner: Arc<dyn EmbeddingProvider>, timeout: Duration, max_in_flight: usize) -> Self {
        Self { inner, timeout, max_in_flight: max_in_flight.max(1), in_flight: Arc::new(AtomicUsize::new(0)) }
    }

    /// Workers currently running, including ones abandoned after a timeout.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    fn acquire(&self) -> Result<Slot> {
        self.in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < self.max_in_flight).then_some(n + 1))
            .map_err(|n| {
                tracing::warn!(provider = self.inner.name(), in_flight = n, "embedding workers exhausted");
                SearchError::EmbeddingUnavailable(format!(
                    "{} has {n} calls in flight, limit {}",
                    self.inner.name(),
                    self.max_in_flight
                ))
            })?;
        Ok(Slot(Arc::clone(&self.in_flight)))
    }
}

impl EmbeddingProvider for TimeoutEmbedder {
    fn name(&self) -> &str { self.inner.name() }

    fn dimension(&self) -> usize { self.inner.dimension() }

    fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let slot = self.acquire()?;
        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&self.inner);
        let texts = texts.to_vec();
        thread::Builder::new()
            .name("embed".into())
            .spawn(move || {
                let _slot = slot;
                let _ = tx.send(inner.embed_many(&texts));
            })
            .map_err(|e| SearchError::EmbeddingUnavailable(format!("cannot start embedding worker: {e}")))?;
        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                tracing::warn!(provider = self.inner.name(), timeout_ms = self.timeout.as_millis() as u64, "embedding call timed out");
                Err(SearchError::EmbeddingUnavailable(format!(
                    "{} timed out after {:?}",
                    self.inner.name(),
                    self.timeout
                )))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(SearchError::EmbeddingUnavailable(format!(
                "{} worker exited without a result",
                self.inner.name()
            ))),
        }
    }
}
