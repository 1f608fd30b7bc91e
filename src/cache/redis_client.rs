use super::CacheStore;
use crate::config::RedisConfig;
use crate::error::{RankError, RankResult};
use crate::observability::sanitize_url;
use async_trait::async_trait;
use fred::{
    clients::RedisPool,
    interfaces::{ClientLike, KeysInterface, SetsInterface},
    types::{Builder, Expiration, ReconnectPolicy, RedisConfig as FredRedisConfig},
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Redis set holding every rank key written, so entries can be cleared without KEYS
pub const INDEX_KEY: &str = "rank:index";

/// Writes between prunes of index members whose entry has expired
const PRUNE_EVERY: u64 = 32;

/// Index members checked per prune
const PRUNE_SAMPLE: usize = 64;

/// Redis-backed cache store with connection pooling
pub struct RedisStore {
    /// Fred Redis client with connection pooling
    client: RedisPool,
    writes: AtomicU64,
}

impl RedisStore {
    /// Create a pooled Redis client.
    ///
    /// An unreachable server is not fatal: the client keeps reconnecting in the
    /// background and cache calls fail (and trip the circuit breaker) until it is back.
    pub async fn new(config: &RedisConfig) -> RankResult<Self> {
        info!("Initializing Redis client with URL: {}", sanitize_url(&config.url));

        let redis_config = FredRedisConfig::from_url(&config.url)
            .map_err(|e| RankError::RedisError(format!("Invalid Redis URL: {}", e)))?;

        let connect_timeout = Duration::from_secs(config.connection_timeout_secs);
        let command_timeout = Duration::from_millis(config.command_timeout_ms);
        let client = Builder::from_config(redis_config)
            .with_connection_config(|conn_config| {
                conn_config.connection_timeout = connect_timeout;
            })
            .with_performance_config(|perf_config| {
                perf_config.auto_pipeline = true;
                perf_config.default_command_timeout = command_timeout;
            })
            .set_policy(ReconnectPolicy::new_exponential(0, 100, 30_000, 2))
            .build_pool(config.max_connections as usize)
            .map_err(|e| RankError::RedisError(format!("Failed to create Redis pool: {}", e)))?;

        // Connection tasks run in the background and reconnect on their own
        let _connection_tasks = client.connect();

        match timeout(connect_timeout, client.wait_for_connect()).await {
            Ok(Ok(())) => info!("Redis client connected successfully"),
            Ok(Err(e)) => warn!("Redis not reachable yet, serving without cache until it is: {}", e),
            Err(_) => warn!("Redis connection timed out after {:?}, serving without cache until it is reachable", connect_timeout),
        }

        Ok(RedisStore {
            client,
            writes: AtomicU64::new(0),
        })
    }

    /// Drop a random sample of index members whose entry no longer exists,
    /// returning how many were removed. Entries expire by TTL without touching the index.
    pub async fn prune_index(&self, sample: usize) -> RankResult<u64> {
        let members: Vec<String> = self
            .client
            .srandmember(INDEX_KEY, Some(sample))
            .await
            .map_err(|e| RankError::RedisError(format!("Failed to sample rank index: {}", e)))?;

        let mut stale = Vec::new();
        for member in members {
            let exists: i64 = self
                .client
                .exists(vec![member.clone()])
                .await
                .map_err(|e| RankError::RedisError(format!("Failed to check {}: {}", member, e)))?;
            if exists == 0 {
                stale.push(member);
            }
        }

        if stale.is_empty() {
            return Ok(0);
        }

        let removed: i64 = self
            .client
            .srem(INDEX_KEY, stale)
            .await
            .map_err(|e| RankError::RedisError(format!("Failed to prune rank index: {}", e)))?;

        debug!("Pruned {} expired keys from {}", removed, INDEX_KEY);
        Ok(removed.max(0) as u64)
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> RankResult<Option<String>> {
        debug!("Redis GET {}", key);
        self.client
            .get::<Option<String>, _>(key)
            .await
            .map_err(|e| RankError::RedisError(format!("Failed to get {}: {}", key, e)))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> RankResult<()> {
        let ttl_ms = ttl.as_millis().clamp(1, i64::MAX as u128) as i64;
        debug!("Redis SET {} ({} bytes, ttl {}ms)", key, value.len(), ttl_ms);

        let _: () = self
            .client
            .set(key, value, Some(Expiration::PX(ttl_ms)), None, false)
            .await
            .map_err(|e| RankError::RedisError(format!("Failed to set {}: {}", key, e)))?;

        let _: () = self
            .client
            .sadd(INDEX_KEY, key.to_string())
            .await
            .map_err(|e| RankError::RedisError(format!("Failed to index {}: {}", key, e)))?;

        if self.writes.fetch_add(1, Ordering::Relaxed) % PRUNE_EVERY == PRUNE_EVERY - 1 {
            if let Err(e) = self.prune_index(PRUNE_SAMPLE).await {
                warn!("Rank index prune failed: {}", e);
            }
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> RankResult<bool> {
        // Use UNLINK for non-blocking deletion
        let deleted: i64 = self
            .client
            .unlink(vec![key.to_string()])
            .await
            .map_err(|e| RankError::RedisError(format!("Failed to delete {}: {}", key, e)))?;

        let _: () = self
            .client
            .srem(INDEX_KEY, key.to_string())
            .await
            .map_err(|e| RankError::RedisError(format!("Failed to unindex {}: {}", key, e)))?;

        Ok(deleted > 0)
    }

    async fn clear(&self) -> RankResult<u64> {
        let keys: Vec<String> = self
            .client
            .smembers(INDEX_KEY)
            .await
            .map_err(|e| RankError::RedisError(format!("Failed to read rank index: {}", e)))?;

        let deleted: i64 = if keys.is_empty() {
            0
        } else {
            self.client
                .unlink(keys)
                .await
                .map_err(|e| RankError::RedisError(format!("Failed to clear rank entries: {}", e)))?
        };

        let _: i64 = self
            .client
            .del(vec![INDEX_KEY.to_string()])
            .await
            .map_err(|e| RankError::RedisError(format!("Failed to drop rank index: {}", e)))?;

        info!("Cleared {} rank entries from Redis", deleted);
        Ok(deleted.max(0) as u64)
    }

    async fn ping(&self) -> RankResult<()> {
        let start = std::time::Instant::now();

        // Use timeout to prevent hanging
        match timeout(Duration::from_secs(2), self.client.ping::<String>()).await {
            Ok(Ok(_)) => {
                debug!("Redis health check passed in {:?}", start.elapsed());
                Ok(())
            }
            Ok(Err(e)) => {
                error!("Redis health check failed: {}", e);
                Err(RankError::RedisError(format!("Health check failed: {}", e)))
            }
            Err(_) => {
                error!("Redis health check timed out");
                Err(RankError::RedisError("Health check timed out".to_string()))
            }
        }
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
