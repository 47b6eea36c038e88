use std::num::NonZeroUsize;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

/// Cache key: the embedding model plus the SHA-256 of the normalised text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub model_id: String,
    pub digest: String,
}

impl CacheKey {
    /// Build a key from a model id and already-normalised text.
    pub fn new(model_id: &str, normalized_text: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(normalized_text.as_bytes());
        Self {
            model_id: model_id.to_string(),
            digest: format!("{:x}", hasher.finalize()),
        }
    }
}

/// Hit/miss counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

/// Bounded LRU of embedding vectors.
///
/// Reads take the LRU mutex only long enough to clone an `Arc`. Writers for
/// the same key serialise on a per-key async lock so a vector is computed
/// once even when several tasks ask for it at the same time.
pub struct EmbeddingCache {
    inner: Mutex<lru::LruCache<CacheKey, Arc<Vec<f32>>>>,
    stats: Mutex<CacheStats>,
    writers: DashMap<CacheKey, Arc<tokio::sync::Mutex<()>>>,
}

impl EmbeddingCache {
    /// Create a cache holding at most `capacity` vectors (minimum one).
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(lru::LruCache::new(cap)),
            stats: Mutex::new(CacheStats::default()),
            writers: DashMap::new(),
        }
    }

    /// Look up a vector, refreshing its recency.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<Vec<f32>>> {
        let found = self.inner.lock().get(key).cloned();
        let mut stats = self.stats.lock();
        if found.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        found
    }

    /// Insert a vector, evicting the least recently used entry when full.
    pub fn insert(&self, key: CacheKey, vector: Arc<Vec<f32>>) {
        let mut inner = self.inner.lock();
        let evicted = inner.push(key.clone(), vector);
        if let Some((old_key, _)) = evicted {
            if old_key != key {
                self.stats.lock().evictions += 1;
            }
        }
    }

    /// Claim the writer slot of one key. Slots for the same key share one
    /// async lock.
    pub fn writer_slot(&self, key: &CacheKey) -> WriterSlot<'_> {
        let lock = self
            .writers
            .entry(key.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        WriterSlot {
            cache: self,
            key: key.clone(),
            lock,
        }
    }

    /// Current counters.
    pub fn stats(&self) -> CacheStats {
        let mut stats = *self.stats.lock();
        stats.entries = self.inner.lock().len();
        stats
    }

    /// Number of cached vectors.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Claim on the per-key writer lock.
///
/// Dropping the slot removes the key's lock from the cache once no other slot
/// shares it, including when the owning future is cancelled mid-await.
pub struct WriterSlot<'a> {
    cache: &'a EmbeddingCache,
    key: CacheKey,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl WriterSlot<'_> {
    /// Wait for exclusive access to the key.
    pub async fn acquire(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.lock.lock().await
    }
}

impl Drop for WriterSlot<'_> {
    fn drop(&mut self) {
        // The map and this slot hold the last two references.
        self.cache
            .writers
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) <= 2);
    }
}
