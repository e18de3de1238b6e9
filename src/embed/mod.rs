//! Embedder abstraction: deterministic text → vector behind one trait.
//!
//! Two swappable implementations: the lexical-statistics encoder
//! ([`hashed::HashedEmbedder`]) and the neural encoder
//! ([`onnx::OnnxEmbedder`], behind the `onnx` feature). The rest of the
//! engine never assumes which is in use.

pub mod hashed;
#[cfg(feature = "onnx")]
pub mod onnx;

use crate::config::{AppConfig, EmbedderKind};
use crate::error::{Error, Result};
use log::{debug, warn};
use lru::LruCache;
use sha1::{Digest, Sha1};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Capability set of an embedding backend.
///
/// Implementations must be deterministic: for a fixed configuration, the
/// same text always yields the same vector.
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;
    fn name(&self) -> &'static str;
    fn encode(&self, text: &str) -> Result<Vec<f32>>;

    fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.encode(t)).collect()
    }

    /// May block while a model loads; the default backend has nothing to
    /// warm.
    fn warmup(&self) -> Result<()> {
        Ok(())
    }
}

/// Fixed pseudo-embeddings for wiring checks and tests
/// (`EMBEDDER_USE_STUB`). Deterministic but meaningless.
#[derive(Debug)]
pub struct StubEmbedder {
    dimension: usize,
}

impl StubEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Embedder for StubEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &'static str {
        "stub"
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimension];
        for (i, byte) in text.bytes().enumerate() {
            vector[i % self.dimension] += byte as f32;
        }
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in vector.iter_mut() {
                *x /= norm;
            }
        }
        Ok(vector)
    }
}

/// SHA-1 of the input text, the cache key.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(text.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Wraps any backend with a content-hash LRU cache, a per-call deadline,
/// and a retry budget.
pub struct CachingEmbedder {
    inner: Arc<dyn Embedder>,
    cache: Mutex<LruCache<String, Vec<f32>>>,
    timeout: Duration,
    max_retries: u32,
}

impl CachingEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, cache_size: usize, timeout: Duration, max_retries: u32) -> Self {
        let capacity = NonZeroUsize::new(cache_size.max(1)).expect("max(1) is non-zero");
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
            timeout,
            max_retries,
        }
    }

    pub fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    pub fn backend_name(&self) -> &'static str {
        self.inner.name()
    }

    pub fn warmup(&self) -> Result<()> {
        self.inner.warmup()
    }

    /// Encodes with cache lookup first, then deadline + retry around the
    /// backend call.
    pub fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let key = content_hash(text);
        if let Some(cached) = self
            .cache
            .lock()
            .map_err(|e| Error::Lock(e.to_string()))?
            .get(&key)
        {
            return Ok(cached.clone());
        }

        let vector = self.encode_with_retries(text)?;
        self.cache
            .lock()
            .map_err(|e| Error::Lock(e.to_string()))?
            .put(key, vector.clone());
        Ok(vector)
    }

    pub fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        // Serve what the cache has, batch-encode only the misses.
        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut misses: Vec<usize> = Vec::new();
        {
            let mut cache = self.cache.lock().map_err(|e| Error::Lock(e.to_string()))?;
            for (i, text) in texts.iter().enumerate() {
                match cache.get(&content_hash(text)) {
                    Some(vector) => results[i] = Some(vector.clone()),
                    None => misses.push(i),
                }
            }
        }
        if !misses.is_empty() {
            let miss_texts: Vec<&str> = misses.iter().map(|&i| texts[i]).collect();
            let encoded = self.batch_with_retries(&miss_texts)?;
            if encoded.len() != misses.len() {
                return Err(Error::EmbedderUnavailable(format!(
                    "backend returned {} vectors for {} inputs",
                    encoded.len(),
                    misses.len()
                )));
            }
            let mut cache = self.cache.lock().map_err(|e| Error::Lock(e.to_string()))?;
            for (&i, vector) in misses.iter().zip(encoded) {
                cache.put(content_hash(texts[i]), vector.clone());
                results[i] = Some(vector);
            }
        }
        Ok(results.into_iter().flatten().collect())
    }

    fn encode_with_retries(&self, text: &str) -> Result<Vec<f32>> {
        self.retry_loop(|| {
            let owned = text.to_string();
            self.call_with_deadline(move |inner| inner.encode(&owned))
        })
    }

    fn batch_with_retries(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.retry_loop(|| {
            let owned: Vec<String> = texts.iter().map(|t| t.to_string()).collect();
            self.call_with_deadline(move |inner| {
                let refs: Vec<&str> = owned.iter().map(|s| s.as_str()).collect();
                inner.encode_batch(&refs)
            })
        })
    }

    /// Retries availability failures with exponential backoff; other
    /// errors pass straight through.
    fn retry_loop<T>(&self, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let mut last_err: Option<Error> = None;
        for attempt in 0..self.max_retries.max(1) {
            if attempt > 0 {
                let backoff = Duration::from_millis(100 * (1 << attempt.min(6)));
                debug!("Embedder retry {} after {:?}", attempt, backoff);
                std::thread::sleep(backoff);
            }
            match op() {
                Ok(value) => return Ok(value),
                Err(e @ Error::EmbedderUnavailable(_)) => {
                    warn!("Embedder attempt {} failed: {}", attempt + 1, e);
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| Error::EmbedderUnavailable("retries exhausted".into())))
    }

    /// Runs a backend call on a helper thread and waits up to the
    /// configured timeout. A timed-out call is left to finish in the
    /// background; its result is discarded.
    fn call_with_deadline<T, F>(&self, call: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn Embedder) -> Result<T> + Send + 'static,
    {
        if self.timeout.is_zero() {
            return call(self.inner.as_ref());
        }
        let (tx, rx) = crossbeam_channel::bounded(1);
        let inner = Arc::clone(&self.inner);
        std::thread::spawn(move || {
            let _ = tx.send(call(inner.as_ref()));
        });
        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(_) => Err(Error::EmbedderUnavailable(format!(
                "call exceeded {:?}",
                self.timeout
            ))),
        }
    }
}

/// Builds the configured backend, honoring the `EMBEDDER_USE_*`
/// environment overrides, and wraps it in the caching layer.
pub fn build_embedder(config: &AppConfig) -> Result<Arc<CachingEmbedder>> {
    let kind = config.embedder_kind();
    let embedding = &config.embedding;
    let backend: Arc<dyn Embedder> = match kind {
        EmbedderKind::Hashed => Arc::new(hashed::HashedEmbedder::new(embedding.dimension)),
        EmbedderKind::Stub => Arc::new(StubEmbedder::new(embedding.dimension)),
        EmbedderKind::Onnx => build_onnx_embedder(embedding)?,
    };
    debug!(
        "Embedder backend: {} (dimension {})",
        backend.name(),
        backend.dimension()
    );
    Ok(Arc::new(CachingEmbedder::new(
        backend,
        embedding.cache_size,
        Duration::from_secs(embedding.timeout_secs),
        embedding.max_retries,
    )))
}

#[cfg(feature = "onnx")]
fn build_onnx_embedder(embedding: &crate::config::EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    let model_path = embedding.onnx_model_path.as_deref().ok_or_else(|| {
        Error::Config("embedding.onnx_model_path is required for the onnx backend".into())
    })?;
    let tokenizer_path = embedding.onnx_tokenizer_path.as_deref().ok_or_else(|| {
        Error::Config("embedding.onnx_tokenizer_path is required for the onnx backend".into())
    })?;
    Ok(Arc::new(onnx::OnnxEmbedder::new(
        model_path,
        tokenizer_path,
        embedding.dimension,
    )?))
}

#[cfg(not(feature = "onnx"))]
fn build_onnx_embedder(_embedding: &crate::config::EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    Err(Error::EmbedderUnavailable(
        "this build does not include the onnx backend (enable the `onnx` feature)".into(),
    ))
}
