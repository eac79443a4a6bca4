// ── Query cache ──
//
// Keyed result cache sitting between the sync engine and the REST client.
// Each key owns an async lock, so concurrent fetches for the same key
// collapse into one request. Invalidation marks entries stale without
// dropping them; `peek` keeps serving the last value until a refetch
// lands.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

pub const ALERTS_RESOURCE: &str = "system-alerts";
pub const NOTIFICATIONS_RESOURCE: &str = "notifications";

// ── QueryKey ────────────────────────────────────────────────────────

/// `[resource, ...filterValues]`. Any filter change yields a new key.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new(resource: &str) -> Self {
        Self(vec![resource.to_owned()])
    }

    /// Build a key from rendered query params (`name=value` parts).
    pub fn from_params(resource: &str, params: &[(&str, String)]) -> Self {
        let mut parts = Vec::with_capacity(params.len() + 1);
        parts.push(resource.to_owned());
        parts.extend(params.iter().map(|(k, v)| format!("{k}={v}")));
        Self(parts)
    }

    pub fn resource(&self) -> &str {
        self.0.first().map_or("", String::as_str)
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Debug for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.0).finish()
    }
}

// ── Freshness ───────────────────────────────────────────────────────

/// Where a `fetch` result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Served from a fresh cache entry; no request was made.
    Cached,
    /// A request was issued for this call.
    Fetched,
}

// ── QueryCache ──────────────────────────────────────────────────────

struct Entry<V> {
    /// Held for the duration of a fetch; stores when the value was fetched.
    fetched_at: Mutex<Option<Instant>>,
    value: ArcSwapOption<V>,
    /// Bumped by every `invalidate`.
    generation: AtomicU64,
    /// Generation the current value was fetched under. The entry is stale
    /// while this trails `generation`.
    settled: AtomicU64,
}

impl<V> Entry<V> {
    fn new() -> Self {
        Self {
            fetched_at: Mutex::new(None),
            value: ArcSwapOption::empty(),
            generation: AtomicU64::new(0),
            settled: AtomicU64::new(0),
        }
    }

    fn is_stale(&self) -> bool {
        self.settled.load(Ordering::Acquire) != self.generation.load(Ordering::Acquire)
    }
}

pub struct QueryCache<V> {
    entries: DashMap<QueryKey, Arc<Entry<V>>>,
    invalidations: DashMap<String, u64>,
    requests: AtomicU64,
}

impl<V: Send + Sync + 'static> QueryCache<V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            invalidations: DashMap::new(),
            requests: AtomicU64::new(0),
        }
    }

    /// Return the cached value for `key` if it is younger than `stale_time`
    /// and not invalidated; otherwise run `fetcher` once and cache the result.
    ///
    /// Callers racing on the same key wait for the in-flight fetch and then
    /// see its result as `Cached`. A failed fetch leaves the previous value
    /// in place.
    pub async fn fetch<F, Fut, E>(
        &self,
        key: &QueryKey,
        stale_time: Duration,
        fetcher: F,
    ) -> Result<(Arc<V>, Freshness), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let entry = self.entry(key);
        let mut fetched_at = entry.fetched_at.lock().await;

        if let (Some(at), Some(value)) = (*fetched_at, entry.value.load_full()) {
            if !entry.is_stale() && at.elapsed() < stale_time {
                return Ok((value, Freshness::Cached));
            }
        }

        // Sampled before the request: an invalidation that lands mid-flight
        // leaves the incoming value stale. A failed fetch settles nothing.
        let generation = entry.generation.load(Ordering::Acquire);
        self.requests.fetch_add(1, Ordering::Relaxed);
        debug!(key = ?key, "query cache miss, fetching");

        let value = Arc::new(fetcher().await?);
        entry.value.store(Some(Arc::clone(&value)));
        entry.settled.store(generation, Ordering::Release);
        *fetched_at = Some(Instant::now());
        Ok((value, Freshness::Fetched))
    }

    /// Last value for `key`, fresh or stale. Never fetches.
    pub fn peek(&self, key: &QueryKey) -> Option<Arc<V>> {
        self.entries.get(key).and_then(|e| e.value.load_full())
    }

    /// Mark every entry of `resource` stale. Counts as one invalidation.
    pub fn invalidate(&self, resource: &str) {
        for entry in self.entries.iter() {
            if entry.key().resource() == resource {
                entry.value().generation.fetch_add(1, Ordering::AcqRel);
            }
        }
        *self.invalidations.entry(resource.to_owned()).or_insert(0) += 1;
        debug!(resource, "query cache invalidated");
    }

    /// How many times `invalidate(resource)` has been called.
    pub fn invalidations(&self, resource: &str) -> u64 {
        self.invalidations.get(resource).map_or(0, |c| *c)
    }

    /// Total number of fetcher invocations.
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn is_stale(&self, key: &QueryKey) -> bool {
        self.entries
            .get(key)
            .is_none_or(|e| e.is_stale())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, key: &QueryKey) -> Arc<Entry<V>> {
        Arc::clone(
            self.entries
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Entry::new()))
                .value(),
        )
    }
}

impl<V: Send + Sync + 'static> Default for QueryCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn key(filter: &str) -> QueryKey {
        QueryKey::from_params(ALERTS_RESOURCE, &[("status", filter.to_owned())])
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_entries_are_served_from_cache() {
        let cache: QueryCache<Vec<u32>> = QueryCache::new();
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let fetch = || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ()>(vec![1, 2, 3])
        };

        let (v, f) = cache.fetch(&key("active"), Duration::from_secs(10), fetch).await.unwrap();
        assert_eq!(f, Freshness::Fetched);
        assert_eq!(*v, vec![1, 2, 3]);

        let (_, f) = cache.fetch(&key("active"), Duration::from_secs(10), fetch).await.unwrap();
        assert_eq!(f, Freshness::Cached);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(11)).await;
        let (_, f) = cache.fetch(&key("active"), Duration::from_secs(10), fetch).await.unwrap();
        assert_eq!(f, Freshness::Fetched);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_fetches_for_one_key_are_deduplicated() {
        let cache: Arc<QueryCache<u32>> = Arc::new(QueryCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                let calls = &*calls;
                cache
                    .fetch(&key("active"), Duration::from_secs(10), || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok::<_, ()>(7)
                    })
                    .await
                    .unwrap()
            }));
        }
        for h in handles {
            assert_eq!(*h.await.unwrap().0, 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.requests(), 1);
    }

    #[tokio::test]
    async fn distinct_keys_fetch_independently() {
        let cache: QueryCache<&'static str> = QueryCache::new();
        cache
            .fetch(&key("active"), Duration::from_secs(60), || async { Ok::<_, ()>("a") })
            .await
            .unwrap();
        let (v, f) = cache
            .fetch(&key("resolved"), Duration::from_secs(60), || async { Ok::<_, ()>("r") })
            .await
            .unwrap();
        assert_eq!((*v, f), ("r", Freshness::Fetched));
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn invalidate_marks_resource_stale_and_counts_once() {
        let cache: QueryCache<u32> = QueryCache::new();
        let other = QueryKey::new(NOTIFICATIONS_RESOURCE);
        for k in [key("active"), key("resolved"), other.clone()] {
            cache
                .fetch(&k, Duration::from_secs(60), || async { Ok::<_, ()>(1) })
                .await
                .unwrap();
        }

        cache.invalidate(ALERTS_RESOURCE);
        assert_eq!(cache.invalidations(ALERTS_RESOURCE), 1);
        assert_eq!(cache.invalidations(NOTIFICATIONS_RESOURCE), 0);
        assert!(cache.is_stale(&key("active")));
        assert!(cache.is_stale(&key("resolved")));
        assert!(!cache.is_stale(&other));

        // Stale data stays visible until the refetch lands.
        assert_eq!(cache.peek(&key("active")).as_deref(), Some(&1));

        let (v, f) = cache
            .fetch(&key("active"), Duration::from_secs(60), || async { Ok::<_, ()>(2) })
            .await
            .unwrap();
        assert_eq!((*v, f), (2, Freshness::Fetched));
        assert!(!cache.is_stale(&key("active")));
    }

    #[tokio::test]
    async fn failed_fetch_keeps_previous_value() {
        let cache: QueryCache<u32> = QueryCache::new();
        cache
            .fetch(&key("active"), Duration::ZERO, || async { Ok::<_, &str>(1) })
            .await
            .unwrap();
        let err = cache
            .fetch(&key("active"), Duration::ZERO, || async { Err::<u32, _>("offline") })
            .await
            .unwrap_err();
        assert_eq!(err, "offline");
        assert_eq!(cache.peek(&key("active")).as_deref(), Some(&1));
    }

    #[tokio::test]
    async fn failed_refetch_keeps_entry_invalidated() {
        let cache: QueryCache<u32> = QueryCache::new();
        let stale_time = Duration::from_secs(60);
        cache
            .fetch(&key("active"), stale_time, || async { Ok::<_, &str>(1) })
            .await
            .unwrap();

        cache.invalidate(ALERTS_RESOURCE);
        cache
            .fetch(&key("active"), stale_time, || async { Err::<u32, _>("offline") })
            .await
            .unwrap_err();
        assert!(cache.is_stale(&key("active")));

        let (v, f) = cache
            .fetch(&key("active"), stale_time, || async { Ok::<_, &str>(2) })
            .await
            .unwrap();
        assert_eq!((*v, f), (2, Freshness::Fetched));
        assert!(!cache.is_stale(&key("active")));
    }

    #[tokio::test]
    async fn invalidation_during_fetch_leaves_result_stale() {
        let cache: QueryCache<u32> = QueryCache::new();
        let stale_time = Duration::from_secs(60);
        let cache_ref = &cache;
        cache
            .fetch(&key("active"), stale_time, || async move {
                cache_ref.invalidate(ALERTS_RESOURCE);
                Ok::<_, ()>(1)
            })
            .await
            .unwrap();
        assert!(cache.is_stale(&key("active")));

        let (v, f) = cache
            .fetch(&key("active"), stale_time, || async { Ok::<_, ()>(2) })
            .await
            .unwrap();
        assert_eq!((*v, f), (2, Freshness::Fetched));
    }
}
