/// Rank cache module
///
/// Stores the last ranked room list per locality with a TTL, behind a
/// `CacheStore` backend (Redis in production, in-memory for tests and local
/// runs). Every store call is bounded by a timeout and guarded by a circuit
/// breaker so a slow or dead store degrades to a miss at the caller.

mod circuit_breaker;
mod memory;
mod redis_client;


use crate::config::RedisConfig;
use crate::error::{RankError, RankResult};
use crate::types::{CacheStats, RankedRoom};
use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState};
pub use memory::MemoryStore;
pub use redis_client::{RedisStore, INDEX_KEY};

/// Prefix of every rank entry key
pub const KEY_PREFIX: &str = "rank:locality:";

/// Longest TTL written to a store, longer requests are clamped
pub const MAX_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// String key-value store with per-key expiry
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Value for a live key
    async fn get(&self, key: &str) -> RankResult<Option<String>>;

    /// Write a value expiring after `ttl` (always non-zero)
    async fn set(&self, key: &str, value: String, ttl: Duration) -> RankResult<()>;

    /// Remove a key, returning whether it held a live value
    async fn delete(&self, key: &str) -> RankResult<bool>;

    /// Remove every entry this store has written
    async fn clear(&self) -> RankResult<u64>;

    /// Check connectivity
    async fn ping(&self) -> RankResult<()>;

    fn backend_name(&self) -> &'static str;
}

/// Trim, lowercase and collapse inner whitespace so equivalent localities share one entry.
/// Room storage matches locations in the same form.
pub fn normalize_locality(locality: &str) -> String {
    locality
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Store key for a locality
pub fn cache_key(locality: &str) -> String {
    format!("{}{}", KEY_PREFIX, normalize_locality(locality))
}

#[derive(Debug, Default)]
struct CacheStatsInternal {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    invalidations: AtomicU64,
    errors: AtomicU64,
}

impl CacheStatsInternal {
    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Locality-keyed cache of ranked room lists
pub struct RankCache {
    store: Arc<dyn CacheStore>,
    default_ttl: Duration,
    op_timeout: Duration,
    breaker: CircuitBreaker,
    stats: CacheStatsInternal,
}

impl RankCache {
    /// Create a rank cache using TTL and timeout from configuration
    pub fn new(store: Arc<dyn CacheStore>, config: &RedisConfig) -> Self {
        Self::with_settings(
            store,
            Duration::from_secs(config.default_ttl_secs),
            Duration::from_millis(config.command_timeout_ms),
            CircuitBreaker::new(),
        )
    }

    pub fn with_settings(
        store: Arc<dyn CacheStore>,
        default_ttl: Duration,
        op_timeout: Duration,
        breaker: CircuitBreaker,
    ) -> Self {
        Self {
            store,
            default_ttl,
            op_timeout,
            breaker,
            stats: CacheStatsInternal::default(),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    /// Run a store call under the timeout and circuit breaker
    async fn guarded<T, F>(&self, op: &str, call: F) -> RankResult<T>
    where
        F: Future<Output = RankResult<T>>,
    {
        if self.breaker.is_open().await {
            debug!("Cache circuit open, skipping {}", op);
            self.stats.errors.fetch_add(1, Ordering::Relaxed);
            return Err(RankError::CacheUnavailable);
        }

        let result = match timeout(self.op_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RankError::Timeout),
        };

        match &result {
            Ok(_) => self.breaker.record_success().await,
            Err(e) => {
                warn!("Cache {} failed: {}", op, e);
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                self.breaker.record_failure().await;
            }
        }
        result
    }

    /// Cached ranking for a locality. Absent and expired entries are both a miss.
    pub async fn get(&self, locality: &str) -> RankResult<Option<Vec<RankedRoom>>> {
        let key = cache_key(locality);
        let raw = self.guarded("get", self.store.get(&key)).await?;

        let Some(serialized) = raw else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            debug!("No cached ranking for {} - CACHE MISS", key);
            return Ok(None);
        };

        match serde_json::from_str::<Vec<RankedRoom>>(&serialized) {
            Ok(rooms) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Retrieved {} cached rooms for {} - CACHE HIT", rooms.len(), key);
                Ok(Some(rooms))
            }
            Err(e) => {
                warn!("Dropping undecodable cache entry {}: {}", key, e);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                // Best effort, a failure here only means the bad entry lives until its TTL
                let _ = self.guarded("delete", self.store.delete(&key)).await;
                Ok(None)
            }
        }
    }

    /// Write a ranking with the default TTL
    pub async fn set(&self, locality: &str, rooms: &[RankedRoom]) -> RankResult<()> {
        self.set_with_ttl(locality, rooms, self.default_ttl).await
    }

    /// Write a ranking expiring after `ttl`. A zero TTL leaves no entry behind.
    pub async fn set_with_ttl(&self, locality: &str, rooms: &[RankedRoom], ttl: Duration) -> RankResult<()> {
        let key = cache_key(locality);

        if ttl.is_zero() {
            debug!("Zero TTL for {}, removing instead of writing", key);
            self.guarded("delete", self.store.delete(&key)).await?;
            return Ok(());
        }

        let ttl = ttl.min(MAX_TTL);
        let serialized = serde_json::to_string(rooms)
            .map_err(|e| RankError::CacheError(format!("Failed to serialize ranking: {}", e)))?;

        debug!("Caching {} ranked rooms under {} (ttl {:?})", rooms.len(), key, ttl);
        self.guarded("set", self.store.set(&key, serialized, ttl)).await?;
        self.stats.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Remove a locality's entry. Returns whether a live entry was removed.
    pub async fn invalidate(&self, locality: &str) -> RankResult<bool> {
        let key = cache_key(locality);
        let removed = self.guarded("delete", self.store.delete(&key)).await?;
        self.stats.invalidations.fetch_add(1, Ordering::Relaxed);
        Ok(removed)
    }

    /// Remove every cached ranking
    pub async fn invalidate_all(&self) -> RankResult<u64> {
        let cleared = self.guarded("clear", self.store.clear()).await?;
        self.stats.invalidations.fetch_add(cleared, Ordering::Relaxed);
        Ok(cleared)
    }

    /// Check store connectivity. Bypasses the breaker so health reflects the store itself.
    pub async fn health_check(&self) -> RankResult<()> {
        match timeout(self.op_timeout, self.store.ping()).await {
            Ok(result) => result,
            Err(_) => Err(RankError::Timeout),
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    pub async fn breaker_stats(&self) -> CircuitBreakerStats {
        self.breaker.stats().await
    }
}
