//! Time-bounded cache for discovery results

use super::types::EntityRef;
use crate::error::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::debug;

/// Holds the last unfiltered entity list
///
/// Readers share the lock. Concurrent misses queue on `refill`, so only one
/// of them calls the listing endpoint and the rest read its result.
#[derive(Debug)]
pub struct DiscoveryCache {
    ttl: Option<Duration>,
    entry: RwLock<Option<CacheEntry>>,
    refill: Mutex<()>,
}

#[derive(Debug)]
struct CacheEntry {
    stored_at: Instant,
    entities: Arc<Vec<EntityRef>>,
}

impl DiscoveryCache {
    /// Create an empty cache; `None` means entries never expire
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            ttl,
            entry: RwLock::new(None),
            refill: Mutex::new(()),
        }
    }

    /// Configured time-to-live
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Fresh cached entities, if any
    pub async fn get(&self) -> Option<Arc<Vec<EntityRef>>> {
        let guard = self.entry.read().await;
        guard
            .as_ref()
            .filter(|entry| self.is_fresh(entry))
            .map(|entry| Arc::clone(&entry.entities))
    }

    /// Fresh cached entities, or the list produced by `fill`
    ///
    /// A failed `fill` leaves the cache empty for the next caller to retry.
    pub async fn get_or_fill<F, Fut>(&self, fill: F) -> Result<Arc<Vec<EntityRef>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<EntityRef>>>,
    {
        if let Some(cached) = self.get().await {
            debug!("Using cached discovery ({} entities)", cached.len());
            return Ok(cached);
        }

        let _refill = self.refill.lock().await;
        // Another caller may have refilled while we waited
        if let Some(cached) = self.get().await {
            return Ok(cached);
        }

        let entities = fill().await?;
        Ok(self.put(entities).await)
    }

    /// Store a freshly discovered list
    pub async fn put(&self, entities: Vec<EntityRef>) -> Arc<Vec<EntityRef>> {
        let entities = Arc::new(entities);
        *self.entry.write().await = Some(CacheEntry {
            stored_at: Instant::now(),
            entities: Arc::clone(&entities),
        });
        entities
    }

    /// Drop the cached list
    pub async fn invalidate(&self) {
        *self.entry.write().await = None;
    }

    fn is_fresh(&self, entry: &CacheEntry) -> bool {
        match self.ttl {
            Some(ttl) => entry.stored_at.elapsed() < ttl,
            None => true,
        }
    }
}

#[cfg(test)]
mod cache_tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample() -> Vec<EntityRef> {
        vec![EntityRef::new("item", "/item/", "/item/describe/")]
    }

    #[tokio::test]
    async fn test_empty_cache_misses() {
        let cache = DiscoveryCache::new(None);
        assert!(cache.get().await.is_none());
    }

    #[tokio::test]
    async fn test_without_ttl_never_expires() {
        let cache = DiscoveryCache::new(None);
        cache.put(sample()).await;
        assert_eq!(cache.get().await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let cache = DiscoveryCache::new(Some(Duration::from_secs(60)));
        cache.put(sample()).await;

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(cache.get().await.is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get().await.is_none());
    }

    #[tokio::test]
    async fn test_get_or_fill_fills_once() {
        let cache = DiscoveryCache::new(None);
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let fill = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Error>(sample())
        };

        let first = cache.get_or_fill(fill).await.unwrap();
        let second = cache.get_or_fill(fill).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_fill_leaves_cache_empty() {
        let cache = DiscoveryCache::new(None);
        let err = cache
            .get_or_fill(|| async { Err::<Vec<EntityRef>, _>(Error::discovery("down")) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Discovery { .. }));
        assert!(cache.get().await.is_none());
    }

    #[tokio::test]
    async fn test_invalidate() {
        let cache = DiscoveryCache::new(None);
        cache.put(sample()).await;
        cache.invalidate().await;
        assert!(cache.get().await.is_none());
    }
}
