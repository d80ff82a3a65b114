//! In-process cache store.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use super::{CacheStore, StoreError};

/// Default capacity.
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

struct Entry {
    value: Vec<u8>,
    /// `None` when the TTL runs past what `Instant` can represent.
    expires_at: Option<Instant>,
    /// Position in the set order; lower is older.
    seq: u64,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    /// seq -> key, oldest first.
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl Inner {
    fn remove(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                self.order.remove(&entry.seq);
                true
            }
            None => false,
        }
    }

    fn evict_oldest(&mut self, max_entries: usize) -> usize {
        let mut evicted = 0;
        while self.entries.len() > max_entries {
            let Some((_, key)) = self.order.pop_first() else {
                break;
            };
            self.entries.remove(&key);
            evicted += 1;
        }
        evicted
    }
}

/// Bounded TTL map behind a single mutex.
///
/// Expired entries are dropped lazily on read and by [`purge_expired`].
/// When a set pushes the entry count over `max_entries`, the entries set
/// longest ago are evicted first.
///
/// [`purge_expired`]: MemoryStore::purge_expired
pub struct MemoryStore {
    inner: Mutex<Inner>,
    max_entries: usize,
}

impl MemoryStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_entries: max_entries.max(1),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }

    /// Number of live (possibly expired but not yet purged) entries.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|i| i.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let Ok(mut inner) = self.inner.lock() else {
            return 0;
        };
        let now = Instant::now();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            inner.remove(key);
        }
        expired.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut inner = self.lock()?;
        let expired = match inner.entries.get(key) {
            None => return Ok(None),
            Some(entry) if !entry.is_expired(Instant::now()) => {
                return Ok(Some(entry.value.clone()));
            }
            Some(_) => true,
        };
        if expired {
            inner.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.remove(key);

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.order.insert(seq, key.to_string());
        inner.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now().checked_add(ttl),
                seq,
            },
        );

        let evicted = inner.evict_oldest(self.max_entries);
        if evicted > 0 {
            tracing::debug!(evicted, "cache capacity reached, evicted oldest entries");
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.lock()?.remove(key))
    }

    async fn clear_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        let mut inner = self.lock()?;
        let keys: Vec<String> = inner
            .entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        for key in &keys {
            inner.remove(key);
        }
        Ok(keys.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryStore::new(10);
        store.set("a", b"1".to_vec(), HOUR).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(b"1".to_vec()));
        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
        assert_eq!(store.get("a").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_are_removed_on_read() {
        let store = MemoryStore::new(10);
        store.set("k", b"v".to_vec(), Duration::from_secs(1)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_huge_ttl_never_expires() {
        let store = MemoryStore::new(10);
        store.set("k", b"v".to_vec(), Duration::MAX).await.unwrap();
        store
            .set("secs", b"w".to_vec(), Duration::from_secs(u64::MAX))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(store.purge_expired(), 0);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_oldest_evicted_first() {
        let store = MemoryStore::new(3);
        for key in ["a", "b", "c"] {
            store.set(key, key.as_bytes().to_vec(), HOUR).await.unwrap();
        }
        // Re-setting "a" makes it the newest
        store.set("a", b"a2".to_vec(), HOUR).await.unwrap();
        store.set("d", b"d".to_vec(), HOUR).await.unwrap();

        assert_eq!(store.len(), 3);
        assert_eq!(store.get("b").await.unwrap(), None);
        assert_eq!(store.get("a").await.unwrap(), Some(b"a2".to_vec()));
        assert!(store.get("c").await.unwrap().is_some());
        assert!(store.get("d").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_clear_prefix() {
        let store = MemoryStore::new(10);
        for key in ["file:digest:a", "file:digest:b", "image:probe:c"] {
            store.set(key, vec![1], HOUR).await.unwrap();
        }
        assert_eq!(store.clear_prefix("file:").await.unwrap(), 2);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let store = MemoryStore::new(10);
        store.set("short", vec![1], Duration::from_secs(1)).await.unwrap();
        store.set("long", vec![1], HOUR).await.unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
    }
}
