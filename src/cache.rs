//! Response and Classification Caches
//!
//! Process-wide TTL caches keyed on a normalized SHA256 fingerprint of
//! (message, module, history length). Two logical caches share the same
//! wrapper: a short-lived full-response cache and a longer-lived
//! classification cache. Entries are never served past their TTL and the
//! stores are bounded, so adversarial load cannot grow them without limit.

use moka::future::Cache;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::classifier::ClassificationResult;

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub entries: u64,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate_percent: f64,
}

/// A cached, fully-relayed response
#[derive(Debug, Clone)]
pub struct CachedReply {
    pub text: String,
    pub provider: String,
    pub model: String,
}

/// Bounded TTL cache, safe for concurrent access without external locking.
#[derive(Clone)]
pub struct TtlCache<V: Clone + Send + Sync + 'static> {
    cache: Cache<String, V>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl<V: Clone + Send + Sync + 'static> TtlCache<V> {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self {
            cache,
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        if let Some(value) = self.cache.get(key).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!("cache hit: {}", &key[..16.min(key.len())]);
            Some(value)
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    pub async fn insert(&self, key: String, value: V) {
        self.cache.insert(key, value).await;
    }

    pub async fn invalidate(&self, key: &str) {
        self.cache.invalidate(key).await;
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        CacheStats {
            entries: self.cache.entry_count(),
            hits,
            misses,
            hit_rate_percent: if total > 0 {
                (hits as f64 / total as f64) * 100.0
            } else {
                0.0
            },
        }
    }
}

/// The two gateway caches, constructed once at startup and shared by all
/// request handlers.
#[derive(Clone)]
pub struct GatewayCaches {
    /// Full streamed responses, short TTL (~5 min)
    pub responses: TtlCache<CachedReply>,
    /// Classification results, longer TTL (~30 min)
    pub classifications: TtlCache<ClassificationResult>,
}

impl GatewayCaches {
    pub fn new(
        response_capacity: u64,
        response_ttl: Duration,
        classify_capacity: u64,
        classify_ttl: Duration,
    ) -> Self {
        Self {
            responses: TtlCache::new(response_capacity, response_ttl),
            classifications: TtlCache::new(classify_capacity, classify_ttl),
        }
    }
}

/// Compute the cache fingerprint for a request.
///
/// Key = SHA256(lowercased trimmed message + module tag + prior-turn count).
/// Two conversations with different prior content but the same turn count
/// collide on purpose; the equivalence is deliberately coarse.
pub fn fingerprint(message: &str, module: &str, history_len: usize) -> String {
    let mut hasher = Sha256::new();

    let normalized = message.trim().to_lowercase();
    hasher.update(normalized.as_bytes());
    hasher.update(module.as_bytes());
    hasher.update(history_len.to_le_bytes());

    hex::encode(hasher.finalize())
}
