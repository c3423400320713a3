//! In memory caches

use std::{
    collections::HashMap,
    hash::Hash,
    time::{Duration, Instant},
};

use parking_lot::RwLock;

/// Time after which the Groupie dataset and the suggestion index are fetched again
pub(crate) const DATASET_TTL: Duration = Duration::from_mins(10);

/// Cached value and its fetch time
struct CacheEntry<T> {
    value: T,
    fetched_at: Instant,
}

/// Single value read-through cache, serving the stale value if a refresh fails
pub(crate) struct TtlCache<T> {
    /// Name, for logs
    name: &'static str,
    /// Time during which a fetched value is served without refetching
    ttl: Duration,
    /// Held during the whole check, fetch and store sequence
    entry: tokio::sync::Mutex<Option<CacheEntry<T>>>,
}

impl<T: Clone> TtlCache<T> {
    /// Create an empty cache
    pub(crate) fn new(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            ttl,
            entry: tokio::sync::Mutex::new(None),
        }
    }

    /// Get the cached value if fresh, or fetch it.
    ///
    /// Concurrent callers wait for a single fetch. If the fetch fails and a value was fetched
    /// before, that value is returned instead of the error.
    pub(crate) async fn get_or_fetch<F, Fut, E>(&self, fetch: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut entry = self.entry.lock().await;
        if let Some(cached) = entry.as_ref()
            && cached.fetched_at.elapsed() < self.ttl
        {
            log::trace!("{} cache hit", self.name);
            return Ok(cached.value.clone());
        }

        log::debug!("Fetching {}", self.name);
        match fetch().await {
            Ok(value) => {
                *entry = Some(CacheEntry {
                    value: value.clone(),
                    fetched_at: Instant::now(),
                });
                Ok(value)
            }
            Err(err) => match entry.as_ref() {
                Some(stale) => {
                    log::warn!("Failed to refresh {}, serving stale value: {err}", self.name);
                    Ok(stale.value.clone())
                }
                None => {
                    log::error!("Failed to fetch {}: {err}", self.name);
                    Err(err)
                }
            },
        }
    }

    /// Return true if a value was ever fetched
    #[cfg(test)]
    pub(crate) async fn is_populated(&self) -> bool {
        self.entry.lock().await.is_some()
    }
}

/// Map whose entries expire after a fixed duration
pub(crate) struct KeyedTtlCache<K, V> {
    ttl: Duration,
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
}

impl<K, V> KeyedTtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Create an empty cache
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Get value if present and not expired
    pub(crate) fn get(&self, key: &K) -> Option<V> {
        self.entries
            .read()
            .get(key)
            .filter(|e| e.fetched_at.elapsed() < self.ttl)
            .map(|e| e.value.clone())
    }

    /// Store value
    pub(crate) fn insert(&self, key: K, value: V) {
        self.entries.write().insert(
            key,
            CacheEntry {
                value,
                fetched_at: Instant::now(),
            },
        );
    }
}
