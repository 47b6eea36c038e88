//! Embedding service.
//!
//! Produces fixed-dimension semantic vectors for short texts. Backends sit
//! behind the [`EmbeddingBackend`] trait; [`EmbeddingService`] adds text
//! normalisation and a bounded LRU cache keyed by model id and content hash.
//! Caching is purely a performance concern: the backend always sees the same
//! normalised text, so results are identical with and without the cache.

mod cache;
mod hashing;
mod http;

pub use cache::{CacheKey, CacheStats, EmbeddingCache, WriterSlot};
pub use hashing::HashingEmbedder;
pub use http::HttpEmbedder;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{EmbeddingBackendKind, EmbeddingConfig, RequestConfig};
use crate::error::{EmbeddingError, EmbeddingResult};
use crate::text::normalize_whitespace;

/// A model that turns texts into vectors of a fixed dimension.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Identifier of the model; part of every cache key.
    fn model_id(&self) -> &str;
    /// Dimension of every produced vector.
    fn dimension(&self) -> usize;
    /// Encode a batch of texts, one vector per input, in input order.
    async fn encode(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>>;
}

/// Cosine similarity. Zero-norm inputs, length mismatches and non-finite
/// results all yield 0.
pub fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut na = 0.0f64;
    let mut nb = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    let sim = dot / (na.sqrt() * nb.sqrt());
    if sim.is_finite() {
        sim
    } else {
        0.0
    }
}

/// Embedding front-end with caching.
#[derive(Clone)]
pub struct EmbeddingService {
    backend: Arc<dyn EmbeddingBackend>,
    cache: Option<Arc<EmbeddingCache>>,
    zero_vector_fallback: bool,
}

impl EmbeddingService {
    /// Wrap a backend with an LRU cache of the given capacity.
    pub fn new(backend: Arc<dyn EmbeddingBackend>, cache_capacity: usize) -> Self {
        Self {
            backend,
            cache: Some(Arc::new(EmbeddingCache::new(cache_capacity))),
            zero_vector_fallback: false,
        }
    }

    /// Wrap a backend without any cache.
    pub fn uncached(backend: Arc<dyn EmbeddingBackend>) -> Self {
        Self {
            backend,
            cache: None,
            zero_vector_fallback: false,
        }
    }

    /// Build the configured backend and cache.
    pub fn from_config(config: &EmbeddingConfig, request: RequestConfig) -> EmbeddingResult<Self> {
        let backend: Arc<dyn EmbeddingBackend> = match config.backend {
            EmbeddingBackendKind::Hashing => {
                Arc::new(HashingEmbedder::new(&config.model_id, config.dimension))
            }
            EmbeddingBackendKind::Http => Arc::new(HttpEmbedder::new(config, request)?),
        };
        Ok(Self::new(backend, config.cache_capacity)
            .with_zero_vector_fallback(config.zero_vector_fallback))
    }

    /// Permit lenient batch calls to return `None` for failing texts.
    pub fn with_zero_vector_fallback(mut self, enabled: bool) -> Self {
        self.zero_vector_fallback = enabled;
        self
    }

    /// Model identifier of the backend.
    pub fn model_id(&self) -> &str {
        self.backend.model_id()
    }

    /// Vector dimension of the backend.
    pub fn dimension(&self) -> usize {
        self.backend.dimension()
    }

    /// Cache counters, if a cache is configured.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|c| c.stats())
    }

    /// Embed a single text.
    pub async fn embed(&self, text: &str) -> EmbeddingResult<Arc<Vec<f32>>> {
        let normalized = normalize_whitespace(text);
        let Some(cache) = &self.cache else {
            return self.encode_one(normalized).await.map(Arc::new);
        };

        let key = CacheKey::new(self.backend.model_id(), &normalized);
        if let Some(hit) = cache.get(&key) {
            return Ok(hit);
        }

        let slot = cache.writer_slot(&key);
        let _guard = slot.acquire().await;
        // Another task may have filled the entry while we waited.
        if let Some(hit) = cache.get(&key) {
            return Ok(hit);
        }
        let vector = Arc::new(self.encode_one(normalized).await?);
        cache.insert(key, vector.clone());
        Ok(vector)
    }

    /// Embed many texts, failing as a whole if the backend fails.
    pub async fn embed_many(&self, texts: &[String]) -> EmbeddingResult<Vec<Arc<Vec<f32>>>> {
        let normalized: Vec<String> = texts.iter().map(|t| normalize_whitespace(t)).collect();

        let Some(cache) = &self.cache else {
            let vectors = self.encode_checked(&normalized).await?;
            return Ok(vectors.into_iter().map(Arc::new).collect());
        };

        let keys: Vec<CacheKey> = normalized
            .iter()
            .map(|t| CacheKey::new(self.backend.model_id(), t))
            .collect();
        let mut results: Vec<Option<Arc<Vec<f32>>>> = keys.iter().map(|k| cache.get(k)).collect();

        // Deduplicate misses so each distinct text is encoded once.
        let mut missing_texts: Vec<String> = Vec::new();
        let mut missing_keys: Vec<CacheKey> = Vec::new();
        for (i, slot) in results.iter().enumerate() {
            if slot.is_none() && !missing_keys.contains(&keys[i]) {
                missing_keys.push(keys[i].clone());
                missing_texts.push(normalized[i].clone());
            }
        }

        if !missing_texts.is_empty() {
            debug!(
                requested = texts.len(),
                missing = missing_texts.len(),
                "Encoding embedding cache misses"
            );
            let vectors = self.encode_checked(&missing_texts).await?;
            let fresh: Vec<(CacheKey, Arc<Vec<f32>>)> = missing_keys
                .into_iter()
                .zip(vectors)
                .map(|(key, vector)| (key, Arc::new(vector)))
                .collect();
            for (key, vector) in &fresh {
                cache.insert(key.clone(), vector.clone());
            }
            for (i, slot) in results.iter_mut().enumerate() {
                if slot.is_none() {
                    *slot = fresh
                        .iter()
                        .find(|(key, _)| *key == keys[i])
                        .map(|(_, vector)| vector.clone());
                }
            }
        }

        results
            .into_iter()
            .map(|slot| {
                slot.ok_or_else(|| EmbeddingError::InvalidResponse {
                    message: "no vector produced for input".to_string(),
                })
            })
            .collect()
    }

    /// Batch embedding for offline builds: when the batch fails and
    /// zero-vector fallback is enabled, texts are retried one by one and the
    /// ones that still fail come back as `None`.
    pub async fn embed_many_lenient(
        &self,
        texts: &[String],
    ) -> EmbeddingResult<Vec<Option<Arc<Vec<f32>>>>> {
        match self.embed_many(texts).await {
            Ok(vectors) => Ok(vectors.into_iter().map(Some).collect()),
            Err(e) if self.zero_vector_fallback => {
                warn!(error = %e, texts = texts.len(), "Batch embedding failed, retrying per text");
                let mut out = Vec::with_capacity(texts.len());
                for (index, text) in texts.iter().enumerate() {
                    match self.embed(text).await {
                        Ok(v) => out.push(Some(v)),
                        Err(e) => {
                            warn!(index, error = %e, "Embedding unavailable for move, omitting its links");
                            out.push(None);
                        }
                    }
                }
                Ok(out)
            }
            Err(e) => Err(e),
        }
    }

    async fn encode_one(&self, text: String) -> EmbeddingResult<Vec<f32>> {
        let mut vectors = self.encode_checked(std::slice::from_ref(&text)).await?;
        vectors.pop().ok_or_else(|| EmbeddingError::InvalidResponse {
            message: "backend returned no vector".to_string(),
        })
    }

    async fn encode_checked(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>> {
        let vectors = self.backend.encode(texts).await?;
        if vectors.len() != texts.len() {
            return Err(EmbeddingError::InvalidResponse {
                message: format!("expected {} vectors, got {}", texts.len(), vectors.len()),
            });
        }
        let dimension = self.backend.dimension();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(EmbeddingError::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }
        Ok(vectors)
    }
}
