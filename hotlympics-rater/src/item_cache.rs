//! Item media cache
//!
//! Maps a media reference to fetched image bytes with bounded memory (entry
//! count and total bytes, least-recently-used eviction).
//!
//! Invariants:
//! - At most one fetch per reference is in flight; concurrent callers share it
//! - A failed fetch resolves waiters to `None` and leaves no entry behind, so
//!   the next `request` starts a fresh fetch
//! - `clear()` aborts every in-flight fetch; their handles resolve to `None`

use futures::future::{BoxFuture, FutureExt, Shared};
use hotlympics_common::config::CacheConfig;
use hotlympics_common::Item;
use lru::LruCache;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::api::MediaFetcher;
use crate::error::{FetchError, FetchResult};

/// Fetched, validated image bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedMedia {
    pub bytes: Arc<[u8]>,
    /// MIME type sniffed from the bytes (e.g. `image/jpeg`)
    pub mime_type: &'static str,
}

impl CachedMedia {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

type SharedFetch = Shared<BoxFuture<'static, Option<CachedMedia>>>;

/// Result of [`ItemCache::request`]: either already resolved or a shared fetch
pub struct MediaHandle {
    state: HandleState,
}

enum HandleState {
    Ready(Option<CachedMedia>),
    Pending(SharedFetch),
}

impl MediaHandle {
    /// True when the media was served from cache without a fetch
    pub fn is_ready(&self) -> bool {
        matches!(self.state, HandleState::Ready(_))
    }

    /// Wait for the media; `None` if the fetch failed or was cancelled
    pub async fn resolve(self) -> Option<CachedMedia> {
        match self.state {
            HandleState::Ready(media) => media,
            HandleState::Pending(fetch) => fetch.await,
        }
    }
}

/// Cache bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheLimits {
    pub max_entries: usize,
    pub max_bytes: usize,
}

impl From<&CacheConfig> for CacheLimits {
    fn from(config: &CacheConfig) -> Self {
        Self {
            max_entries: config.max_entries,
            max_bytes: config.max_bytes,
        }
    }
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

/// Counters for diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub bytes: usize,
    pub in_flight: usize,
    pub hits: u64,
    pub misses: u64,
    /// Requests that joined an existing in-flight fetch
    pub joined: u64,
    pub fetches_started: u64,
    pub failures: u64,
}

struct InFlight {
    fetch_id: u64,
    shared: SharedFetch,
    abort: AbortHandle,
}

struct CacheInner {
    entries: LruCache<String, CachedMedia>,
    bytes: usize,
    in_flight: HashMap<String, InFlight>,
    next_fetch_id: u64,
    stats: CacheStats,
}

impl CacheInner {
    fn store(&mut self, reference: String, media: CachedMedia, limits: CacheLimits) {
        if media.len() > limits.max_bytes {
            debug!(
                reference = %reference,
                size = media.len(),
                "Media larger than cache budget, not retained"
            );
            return;
        }

        self.bytes += media.len();
        if let Some(replaced) = self.entries.put(reference, media) {
            self.bytes -= replaced.len();
        }

        while self.entries.len() > limits.max_entries || self.bytes > limits.max_bytes {
            match self.entries.pop_lru() {
                Some((evicted, media)) => {
                    self.bytes -= media.len();
                    debug!(reference = %evicted, "Evicted least recently used media");
                }
                None => break,
            }
        }
    }

    fn remove(&mut self, reference: &str) -> bool {
        match self.entries.pop(reference) {
            Some(media) => {
                self.bytes -= media.len();
                true
            }
            None => false,
        }
    }
}

/// Shared media cache
///
/// Cheap to share behind an `Arc`: the queue preloads into it and renderers
/// read from it.
pub struct ItemCache {
    fetcher: Arc<dyn MediaFetcher>,
    limits: CacheLimits,
    inner: Arc<Mutex<CacheInner>>,
}

fn lock_inner(inner: &Mutex<CacheInner>) -> MutexGuard<'_, CacheInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ItemCache {
    pub fn new(fetcher: Arc<dyn MediaFetcher>, limits: CacheLimits) -> Self {
        Self {
            fetcher,
            limits,
            inner: Arc::new(Mutex::new(CacheInner {
                entries: LruCache::unbounded(),
                bytes: 0,
                in_flight: HashMap::new(),
                next_fetch_id: 0,
                stats: CacheStats::default(),
            })),
        }
    }

    pub fn limits(&self) -> CacheLimits {
        self.limits
    }

    /// Cached media, a join on the in-flight fetch, or a newly started fetch
    ///
    /// Must be called from within a tokio runtime.
    pub fn request(&self, reference: &str) -> MediaHandle {
        let mut inner = lock_inner(&self.inner);

        if let Some(media) = inner.entries.get(reference).cloned() {
            inner.stats.hits += 1;
            return MediaHandle {
                state: HandleState::Ready(Some(media)),
            };
        }

        if let Some(existing) = inner.in_flight.get(reference) {
            let shared = existing.shared.clone();
            inner.stats.joined += 1;
            return MediaHandle {
                state: HandleState::Pending(shared),
            };
        }

        inner.stats.misses += 1;
        inner.stats.fetches_started += 1;
        let fetch_id = inner.next_fetch_id;
        inner.next_fetch_id += 1;

        let task = tokio::spawn(run_fetch(
            Arc::clone(&self.fetcher),
            Arc::clone(&self.inner),
            self.limits,
            reference.to_string(),
            fetch_id,
        ));
        let abort = task.abort_handle();
        let shared = async move { task.await.ok().flatten() }.boxed().shared();

        inner.in_flight.insert(
            reference.to_string(),
            InFlight {
                fetch_id,
                shared: shared.clone(),
                abort,
            },
        );

        MediaHandle {
            state: HandleState::Pending(shared),
        }
    }

    /// Start fetches for every item's media without waiting
    pub fn preload(&self, items: &[Item]) {
        for item in items {
            let _ = self.request(&item.media_ref);
        }
    }

    /// Non-blocking lookup; does not touch recency
    pub fn peek(&self, reference: &str) -> Option<CachedMedia> {
        lock_inner(&self.inner).entries.peek(reference).cloned()
    }

    pub fn contains(&self, reference: &str) -> bool {
        lock_inner(&self.inner).entries.contains(reference)
    }

    /// Drop one entry and cancel its in-flight fetch, if any
    pub fn evict(&self, reference: &str) -> bool {
        let mut inner = lock_inner(&self.inner);
        let removed = inner.remove(reference);
        let cancelled = match inner.in_flight.remove(reference) {
            Some(fetch) => {
                fetch.abort.abort();
                true
            }
            None => false,
        };
        removed || cancelled
    }

    /// Drop everything and cancel all in-flight fetches
    pub fn clear(&self) {
        let mut inner = lock_inner(&self.inner);
        inner.entries.clear();
        inner.bytes = 0;
        for (_, fetch) in inner.in_flight.drain() {
            fetch.abort.abort();
        }
        debug!("Media cache cleared");
    }

    pub fn stats(&self) -> CacheStats {
        let inner = lock_inner(&self.inner);
        CacheStats {
            entries: inner.entries.len(),
            bytes: inner.bytes,
            in_flight: inner.in_flight.len(),
            ..inner.stats.clone()
        }
    }
}

/// Check the bytes are an image and record their MIME type
fn sniff(reference: &str, bytes: Vec<u8>) -> FetchResult<CachedMedia> {
    match infer::get(&bytes) {
        Some(kind) if kind.matcher_type() == infer::MatcherType::Image => Ok(CachedMedia {
            mime_type: kind.mime_type(),
            bytes: Arc::from(bytes),
        }),
        _ => Err(FetchError::NotAnImage(reference.to_string())),
    }
}

async fn run_fetch(
    fetcher: Arc<dyn MediaFetcher>,
    inner: Arc<Mutex<CacheInner>>,
    limits: CacheLimits,
    reference: String,
    fetch_id: u64,
) -> Option<CachedMedia> {
    let result = fetcher
        .fetch_media(&reference)
        .await
        .and_then(|bytes| sniff(&reference, bytes));

    let mut inner = lock_inner(&inner);
    let still_registered = inner
        .in_flight
        .get(&reference)
        .is_some_and(|fetch| fetch.fetch_id == fetch_id);
    if still_registered {
        inner.in_flight.remove(&reference);
    }

    match result {
        Ok(media) => {
            if still_registered {
                inner.store(reference, media.clone(), limits);
            }
            Some(media)
        }
        Err(error) => {
            inner.stats.failures += 1;
            if error.is_decode() {
                warn!(reference = %reference, error = %error, "Media decode failed");
            } else {
                warn!(reference = %reference, error = %error, "Media fetch failed");
            }
            None
        }
    }
}
