use super::{CacheStore, MAX_TTL};
use crate::error::RankResult;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

/// Writes between sweeps of expired entries
const PURGE_EVERY: u64 = 64;

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

impl MemoryEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-process cache store with per-entry expiry.
///
/// Uses tokio's clock so paused-time tests can advance past a TTL. Expired
/// entries are dropped when read and swept every `PURGE_EVERY` writes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, MemoryEntry>>,
    writes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop expired entries, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        before - entries.len()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> RankResult<Option<String>> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        // Expired: drop it so the map does not grow without bound
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|e| !e.is_live(now)) {
            entries.remove(key);
            debug!("Evicted expired entry {}", key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> RankResult<()> {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl.min(MAX_TTL))
            .or_else(|| now.checked_add(MAX_TTL))
            .unwrap_or(now);

        let mut entries = self.entries.write().await;
        if self.writes.fetch_add(1, Ordering::Relaxed) % PURGE_EVERY == PURGE_EVERY - 1 {
            let before = entries.len();
            entries.retain(|_, e| e.is_live(now));
            debug!("Swept {} expired entries", before - entries.len());
        }
        entries.insert(key.to_string(), MemoryEntry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> RankResult<bool> {
        let now = Instant::now();
        let removed = self.entries.write().await.remove(key);
        Ok(removed.is_some_and(|e| e.is_live(now)))
    }

    async fn clear(&self) -> RankResult<u64> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let live = entries.values().filter(|e| e.is_live(now)).count();
        entries.clear();
        Ok(live as u64)
    }

    async fn ping(&self) -> RankResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let store = MemoryStore::new();
        store.set("k", "v".to_string(), Duration::from_secs(10)).await.unwrap();

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let store = MemoryStore::new();
        store.set("short", "a".to_string(), Duration::from_secs(1)).await.unwrap();
        store.set("long", "b".to_string(), Duration::from_secs(100)).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.purge_expired().await, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_writes_sweep_expired_entries() {
        let store = MemoryStore::new();
        for i in 0..PURGE_EVERY - 1 {
            store.set(&format!("stale:{}", i), "x".to_string(), Duration::from_secs(1)).await.unwrap();
        }
        assert_eq!(store.entries.read().await.len(), (PURGE_EVERY - 1) as usize);

        tokio::time::advance(Duration::from_secs(2)).await;
        store.set("fresh", "y".to_string(), Duration::from_secs(60)).await.unwrap();

        // Never-read expired entries are gone, only the new one is stored
        assert_eq!(store.entries.read().await.len(), 1);
        assert_eq!(store.get("fresh").await.unwrap(), Some("y".to_string()));
    }

    #[tokio::test]
    async fn test_huge_ttl_does_not_overflow() {
        let store = MemoryStore::new();
        store.set("k", "v".to_string(), Duration::from_secs(u64::MAX)).await.unwrap();
        store.set("k", "w".to_string(), Duration::MAX).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("w".to_string()));
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let store = MemoryStore::new();
        store.set("a", "1".to_string(), Duration::from_secs(60)).await.unwrap();
        store.set("b", "2".to_string(), Duration::from_secs(60)).await.unwrap();

        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
        assert_eq!(store.clear().await.unwrap(), 1);
        assert_eq!(store.get("b").await.unwrap(), None);
    }
}
