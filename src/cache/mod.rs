//! # Cache
//!
//! A TTL key/value cache shared by fill and image workers, and across
//! concurrent generation requests, to avoid repeating expensive I/O: file
//! hashing, template inspection, image probing.
//!
//! ## Layers
//!
//! ```text
//! ┌──────────────┐     ┌───────────────┐     ┌──────────────────────┐
//! │    Cache     │ ──► │  compression  │ ──► │  dyn CacheStore      │
//! │ (hits/misses)│     │ (large values)│     │ memory | unavailable │
//! └──────────────┘     └───────────────┘     └──────────────────────┘
//! ```
//!
//! The [`Cache`] front never fails a caller. Any [`StoreError`] is logged and
//! reported as a miss, so an unavailable backing store degrades the engine to
//! "always recompute".
//!
//! ## Example
//!
//! ```
//! use cellfill::cache::{Cache, MemoryStore};
//! use std::time::Duration;
//!
//! # tokio_test_block_on(async {
//! let cache = Cache::new(MemoryStore::new(100));
//! cache.set("k", b"v".to_vec(), Duration::from_secs(60)).await;
//! assert_eq!(cache.get("k").await, Some(b"v".to_vec()));
//! assert_eq!(cache.stats().hits, 1);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Runtime::new().unwrap().block_on(f)
//! # }
//! ```

pub mod compress;
mod digest;
mod memory;

pub use digest::{DIGEST_PREFIX, digest_file};
pub use memory::{DEFAULT_MAX_ENTRIES, MemoryStore};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Default time-to-live for entries set without an explicit TTL.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Values at or above this size are stored compressed.
pub const DEFAULT_COMPRESS_THRESHOLD: usize = 4096;

/// Backing store failure. Never surfaced past [`Cache`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),
}

/// A key/value backend. Entries are opaque blobs.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Fetch a live entry. Expired entries are reported absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError>;

    /// Returns whether an entry was removed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Returns how many entries were removed.
    async fn clear_prefix(&self, prefix: &str) -> Result<usize, StoreError>;
}

/// Stand-in for an external store that cannot be reached.
///
/// Every operation fails, which the [`Cache`] front turns into misses.
pub struct UnavailableStore {
    reason: String,
}

impl UnavailableStore {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl CacheStore for UnavailableStore {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Err(StoreError::Unavailable(self.reason.clone()))
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<(), StoreError> {
        Err(StoreError::Unavailable(self.reason.clone()))
    }

    async fn delete(&self, _key: &str) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable(self.reason.clone()))
    }

    async fn clear_prefix(&self, _prefix: &str) -> Result<usize, StoreError> {
        Err(StoreError::Unavailable(self.reason.clone()))
    }
}

/// Cumulative lookup counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    /// Fraction of lookups served from cache (0.0 when nothing was looked up).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct CacheInner {
    store: Arc<dyn CacheStore>,
    default_ttl: Duration,
    compress_threshold: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Infallible cache front with hit/miss accounting. Cheap to clone.
#[derive(Clone)]
pub struct Cache {
    inner: Arc<CacheInner>,
}

impl Cache {
    pub fn new(store: impl CacheStore + 'static) -> Self {
        Self::with_store(Arc::new(store))
    }

    pub fn with_store(store: Arc<dyn CacheStore>) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                store,
                default_ttl: DEFAULT_TTL,
                compress_threshold: DEFAULT_COMPRESS_THRESHOLD,
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
            }),
        }
    }

    /// Cache backed by an in-process [`MemoryStore`].
    pub fn in_memory(max_entries: usize) -> Self {
        Self::new(MemoryStore::new(max_entries))
    }

    /// Cache that always misses.
    pub fn disabled() -> Self {
        Self::new(UnavailableStore::new("cache disabled"))
    }

    /// Replace TTL and compression settings. Counters start from zero.
    pub fn configured(self, default_ttl: Duration, compress_threshold: usize) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                store: self.inner.store.clone(),
                default_ttl,
                compress_threshold,
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
            }),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.inner.default_ttl
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
        }
    }

    fn miss(&self) -> Option<Vec<u8>> {
        self.inner.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Look up a key. `None` on absence, expiry, corruption or store failure.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        match self.inner.store.get(key).await {
            Ok(Some(stored)) => match compress::unpack(&stored) {
                Some(value) => {
                    self.inner.hits.fetch_add(1, Ordering::Relaxed);
                    Some(value)
                }
                None => {
                    warn!(key, "discarding unreadable cache entry");
                    let _ = self.inner.store.delete(key).await;
                    self.miss()
                }
            },
            Ok(None) => self.miss(),
            Err(e) => {
                warn!(key, store = self.inner.store.name(), error = %e, "cache get failed");
                self.miss()
            }
        }
    }

    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        let packed = compress::pack(&value, self.inner.compress_threshold);
        if let Err(e) = self.inner.store.set(key, packed, ttl).await {
            warn!(key, store = self.inner.store.name(), error = %e, "cache set failed");
        }
    }

    pub async fn delete(&self, key: &str) -> bool {
        self.inner.store.delete(key).await.unwrap_or_else(|e| {
            warn!(key, error = %e, "cache delete failed");
            false
        })
    }

    pub async fn clear_prefix(&self, prefix: &str) -> usize {
        self.inner
            .store
            .clear_prefix(prefix)
            .await
            .unwrap_or_else(|e| {
                warn!(prefix, error = %e, "cache clear failed");
                0
            })
    }

    /// Typed lookup. Entries that fail to decode count as misses.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = self.get(key).await?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "cache entry has unexpected shape");
                None
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.set(key, bytes, ttl).await,
            Err(e) => warn!(key, error = %e, "cache value not serializable"),
        }
    }

    /// Return the cached value for `key`, or run `compute`, cache its
    /// success with the default TTL, and return it. Errors are not cached.
    pub async fn get_or_compute<T, E, F, Fut>(&self, key: &str, compute: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get_json(key).await {
            return Ok(value);
        }
        let value = compute().await?;
        self.set_json(key, &value, self.inner.default_ttl).await;
        Ok(value)
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("store", &self.inner.store.name())
            .field("stats", &self.stats())
            .finish()
    }
}
