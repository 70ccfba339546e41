//! TTL response cache with single-flight de-duplication and
//! stale-while-revalidate background refresh.
//!
//! Keys map to cached [`Response`]s. Concurrent fetches for one key share a
//! single in-flight future, so at most one underlying call runs per key at
//! any time, background refreshes included. Entries past half their TTL are
//! still served immediately but may trigger a non-blocking refresh; entries
//! past their TTL are fetched anew. Failed fetches are never cached.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::ApiError;
use crate::transport::Response;

type FetchResult = Result<Response, ApiError>;
type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

struct CacheEntry {
    value: Response,
    created_at: Instant,
    expires_at: Instant,
}

impl CacheEntry {
    fn new(value: Response, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            value,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }

    /// Refresh becomes worthwhile once half the TTL has elapsed.
    fn refresh_due(&self, now: Instant) -> bool {
        now >= self.created_at + (self.expires_at - self.created_at) / 2
    }
}

/// Cache occupancy counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub size: usize,
    pub valid: usize,
    pub expired: usize,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    in_flight: HashMap<String, SharedFetch>,
}

/// The cache. Cheap to clone; clones share one store.
#[derive(Clone, Default)]
pub struct RequestCache {
    inner: Arc<Mutex<CacheInner>>,
    sweeper: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl RequestCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `key` from cache when fresh, joining or starting a
    /// de-duplicated fetch otherwise.
    ///
    /// `fetcher` is a factory so the cache can invoke it again for
    /// background refreshes; its argument is true for those refresh
    /// invocations, letting the caller mute side effects for work no one
    /// is waiting on. Refresh failures are swallowed (logged at debug),
    /// never surfaced to the caller that got the cached value.
    pub async fn with_cache<F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        background_refresh: bool,
        fetcher: F,
    ) -> FetchResult
    where
        F: Fn(bool) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FetchResult> + Send + 'static,
    {
        enum Plan {
            Hit(Response),
            HitWithRefresh(Response, SharedFetch),
            Fetch(SharedFetch),
        }

        let now = Instant::now();
        let plan = {
            let mut inner = self.inner.lock().unwrap();

            let fresh = match inner.entries.get(key) {
                Some(entry) if entry.is_fresh(now) => Some((
                    entry.value.clone(),
                    background_refresh && entry.refresh_due(now),
                )),
                _ => None,
            };
            // Lazy expiry: a stale entry is a miss and gets removed here.
            if fresh.is_none() {
                inner.entries.remove(key);
            }

            match fresh {
                Some((value, false)) => Plan::Hit(value),
                Some((value, true)) => {
                    if inner.in_flight.contains_key(key) {
                        Plan::Hit(value)
                    } else {
                        let shared = self.make_fetch(key.to_string(), ttl, fetcher(true));
                        inner.in_flight.insert(key.to_string(), shared.clone());
                        Plan::HitWithRefresh(value, shared)
                    }
                }
                None => match inner.in_flight.get(key) {
                    Some(shared) => Plan::Fetch(shared.clone()),
                    None => {
                        let shared = self.make_fetch(key.to_string(), ttl, fetcher(false));
                        inner.in_flight.insert(key.to_string(), shared.clone());
                        Plan::Fetch(shared)
                    }
                },
            }
        };

        match plan {
            Plan::Hit(value) => Ok(value),
            Plan::HitWithRefresh(value, refresh) => {
                let key = key.to_string();
                tokio::spawn(async move {
                    if let Err(err) = refresh.await {
                        tracing::debug!(key = %key, error = %err, "background refresh failed");
                    }
                });
                Ok(value)
            }
            Plan::Fetch(shared) => shared.await,
        }
    }

    /// Wraps a fetch so that completion updates the store exactly once,
    /// no matter how many callers share the future.
    fn make_fetch(
        &self,
        key: String,
        ttl: Duration,
        fut: impl Future<Output = FetchResult> + Send + 'static,
    ) -> SharedFetch {
        let inner = Arc::clone(&self.inner);
        async move {
            let result = fut.await;
            let mut inner = inner.lock().unwrap();
            inner.in_flight.remove(&key);
            if let Ok(value) = &result {
                inner.entries.insert(key, CacheEntry::new(value.clone(), ttl));
            }
            result
        }
        .boxed()
        .shared()
    }

    /// Looks up `key` without fetching. Fresh entries only.
    pub fn peek(&self, key: &str) -> Option<Response> {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();
        let hit = match inner.entries.get(key) {
            Some(entry) if entry.is_fresh(now) => Some(entry.value.clone()),
            _ => None,
        };
        if hit.is_none() {
            inner.entries.remove(key);
        }
        hit
    }

    pub fn invalidate(&self, key: &str) {
        self.inner.lock().unwrap().entries.remove(key);
    }

    pub fn invalidate_prefix(&self, prefix: &str) {
        self.inner
            .lock()
            .unwrap()
            .entries
            .retain(|key, _| !key.starts_with(prefix));
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let inner = self.inner.lock().unwrap();
        let valid = inner
            .entries
            .values()
            .filter(|entry| entry.is_fresh(now))
            .count();
        CacheStats {
            size: inner.entries.len(),
            valid,
            expired: inner.entries.len() - valid,
        }
    }

    /// Drops every expired entry. Runs lazily on access too; the periodic
    /// sweep bounds memory for keys nobody reads again.
    pub fn sweep(&self) {
        let now = Instant::now();
        self.inner
            .lock()
            .unwrap()
            .entries
            .retain(|_, entry| entry.is_fresh(now));
    }

    /// Starts the periodic sweeper. Restarting replaces the old task.
    pub fn start_sweeper(&self, interval: Duration) {
        let cache = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick fires immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                cache.sweep();
            }
        });
        if let Some(old) = self.sweeper.lock().unwrap().replace(handle) {
            old.abort();
        }
    }

    pub fn stop_sweeper(&self) {
        if let Some(handle) = self.sweeper.lock().unwrap().take() {
            handle.abort();
        }
    }
}
