//! Double-buffered block queue
//!
//! Serves comparison pairs from an *active* block while a *buffer* block is
//! prefetched in the background. When the active block runs out the buffer is
//! swapped in (a `mem::take`, no I/O) and a new buffer fetch is dispatched, so
//! moving to the next pair never waits on the network. The only synchronous
//! network wait is `initialize`.
//!
//! Concurrency model: all queue state sits behind one mutex that is never
//! held across an `.await`. The consumer calls the public methods; background
//! fetch tasks lock the same mutex to apply their result. Each
//! `initialize`/`reset` bumps a generation id, and a fetch result is applied
//! only if the generation it captured is still current.
//!
//! Pairs are `{cursor, cursor + 1}` of the active block. A trailing unpaired
//! item in an odd-length block is skipped at swap time; pairs never mix
//! active and buffer items.

use hotlympics_common::events::{EventBus, RaterEvent};
use hotlympics_common::{Cohort, Item, Pair};
use futures::future::{BoxFuture, FutureExt};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

use super::types::{QueueFailure, QueueSnapshot, QueueStats, QueueStatus, RefillOutcome};
use crate::api::PairSource;
use crate::error::{FetchError, FetchResult};
use crate::item_cache::ItemCache;

struct QueueState {
    status: QueueStatus,
    cohort: Option<Cohort>,
    generation: u64,
    active: Vec<Item>,
    buffer: Vec<Item>,
    cursor: usize,
    /// Abort handle of the single in-flight buffer fetch
    refill: Option<AbortHandle>,
    last_refill: Option<RefillOutcome>,
    last_error: Option<QueueFailure>,
    stats: QueueStats,
}

impl QueueState {
    fn new() -> Self {
        Self {
            status: QueueStatus::Uninitialized,
            cohort: None,
            generation: 0,
            active: Vec::new(),
            buffer: Vec::new(),
            cursor: 0,
            refill: None,
            last_refill: None,
            last_error: None,
            stats: QueueStats::default(),
        }
    }

    /// Buffer becomes the active block; O(1), no copying
    fn promote_buffer(&mut self) {
        self.active = std::mem::take(&mut self.buffer);
        self.cursor = 0;
    }
}

fn pair_at(block: &[Item], index: usize) -> Option<Pair> {
    match (block.get(index), block.get(index + 1)) {
        (Some(left), Some(right)) => Some(Pair::new(left.clone(), right.clone())),
        _ => None,
    }
}

struct QueueCore {
    source: Arc<dyn PairSource>,
    block_size: usize,
    events: EventBus,
    cache: Option<Arc<ItemCache>>,
    state: Mutex<QueueState>,
    refill_done: Notify,
}

impl QueueCore {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn preload(&self, items: &[Item]) {
        if let Some(cache) = &self.cache {
            cache.preload(items);
        }
    }

    fn transition(&self, state: &mut QueueState, next: QueueStatus) {
        let old_phase = state.status.phase();
        let new_phase = next.phase();
        let detail = match &next {
            QueueStatus::Errored(failure) => Some(failure.to_string()),
            _ => None,
        };
        state.status = next;

        debug!(
            generation = state.generation,
            "Queue {:?} -> {:?}", old_phase, new_phase
        );
        self.events.emit_lossy(RaterEvent::QueuePhaseChanged {
            generation: state.generation,
            cohort: state.cohort,
            old_phase,
            new_phase,
            detail,
            timestamp: chrono::Utc::now(),
        });
    }

    /// Cancel the in-flight fetch, invalidate its generation and drop both blocks
    fn end_lifetime(&self, state: &mut QueueState) {
        if let Some(refill) = state.refill.take() {
            refill.abort();
            self.refill_done.notify_waiters();
        }
        state.generation += 1;
        state.stats.generation = state.generation;
        state.active.clear();
        state.buffer.clear();
        state.cursor = 0;
    }

    /// Start a background buffer fetch unless one is already pending
    fn dispatch_refill(self: &Arc<Self>, state: &mut QueueState) -> Option<JoinHandle<()>> {
        if state.refill.is_some() {
            return None;
        }
        let cohort = state.cohort?;

        let generation = state.generation;
        let core = Arc::clone(self);
        let task = tokio::spawn(async move {
            let result = core.source.fetch_block(cohort, core.block_size).await;
            core.apply_refill(generation, result);
        });

        state.refill = Some(task.abort_handle());
        state.stats.refills_dispatched += 1;
        debug!(generation, cohort = %cohort, "Buffer refill dispatched");
        Some(task)
    }

    /// Block fetch that owns its source handle, so it can outlive the caller
    fn fetch(&self, cohort: Cohort) -> BoxFuture<'static, FetchResult<Vec<Item>>> {
        let source = Arc::clone(&self.source);
        let block_size = self.block_size;
        async move { source.fetch_block(cohort, block_size).await }.boxed()
    }

    /// Keep a still-running first-block fetch as the buffer refill
    fn adopt_refill(
        self: &Arc<Self>,
        state: &mut QueueState,
        fetch: BoxFuture<'static, FetchResult<Vec<Item>>>,
    ) {
        let generation = state.generation;
        let core = Arc::clone(self);
        let task = tokio::spawn(async move {
            let result = fetch.await;
            core.apply_refill(generation, result);
        });
        state.refill = Some(task.abort_handle());
        debug!(generation, "First block fetch continues as buffer refill");
    }

    /// Store a finished buffer fetch if its generation is still current
    fn apply_refill(&self, generation: u64, result: FetchResult<Vec<Item>>) {
        let mut state = self.lock();

        if state.generation != generation {
            state.stats.refills_discarded += 1;
            debug!(
                stale_generation = generation,
                current_generation = state.generation,
                "Discarding stale refill result"
            );
            self.events.emit_lossy(RaterEvent::RefillDiscarded {
                stale_generation: generation,
                current_generation: state.generation,
                timestamp: chrono::Utc::now(),
            });
            return;
        }

        state.refill = None;
        match result {
            Ok(items) if !items.is_empty() => {
                let item_count = items.len();
                self.preload(&items);
                state.buffer = items;
                state.last_refill = Some(RefillOutcome::Filled(item_count));
                debug!(generation, item_count, "Buffer block stored");
                self.events.emit_lossy(RaterEvent::RefillCompleted {
                    generation,
                    item_count,
                    timestamp: chrono::Utc::now(),
                });
            }
            Ok(_) => {
                state.last_refill = Some(RefillOutcome::Empty);
                info!(generation, "Buffer refill returned no items");
                self.events.emit_lossy(RaterEvent::RefillEmpty {
                    generation,
                    timestamp: chrono::Utc::now(),
                });
            }
            Err(error) => {
                if error.is_decode() {
                    warn!(generation, error = %error, "Buffer refill response malformed");
                } else {
                    warn!(generation, error = %error, "Buffer refill failed");
                }
                state.last_refill = Some(RefillOutcome::Failed(error.clone()));
                state.last_error = Some(QueueFailure::Fetch(error.clone()));
                self.events.emit_lossy(RaterEvent::RefillFailed {
                    generation,
                    message: error.to_string(),
                    timestamp: chrono::Utc::now(),
                });
            }
        }
        self.refill_done.notify_waiters();
    }
}

/// Prefetching pair queue
///
/// Public methods are meant to be driven by one consumer task; they only
/// lock briefly and never wait on the network except in `initialize`.
/// `advance` and `initialize` spawn background work and must be called from
/// within a tokio runtime.
pub struct BlockQueue {
    core: Arc<QueueCore>,
}

impl BlockQueue {
    pub fn new(source: Arc<dyn PairSource>, block_size: usize, events: EventBus) -> Self {
        Self::build(source, block_size, events, None)
    }

    /// Queue that preloads the media of every fetched block into `cache`
    pub fn with_cache(
        source: Arc<dyn PairSource>,
        block_size: usize,
        events: EventBus,
        cache: Arc<ItemCache>,
    ) -> Self {
        Self::build(source, block_size, events, Some(cache))
    }

    fn build(
        source: Arc<dyn PairSource>,
        block_size: usize,
        events: EventBus,
        cache: Option<Arc<ItemCache>>,
    ) -> Self {
        Self {
            core: Arc::new(QueueCore {
                source,
                block_size,
                events,
                cache,
                state: Mutex::new(QueueState::new()),
                refill_done: Notify::new(),
            }),
        }
    }

    pub fn block_size(&self) -> usize {
        self.core.block_size
    }

    pub fn status(&self) -> QueueStatus {
        self.core.lock().status.clone()
    }

    pub fn cohort(&self) -> Option<Cohort> {
        self.core.lock().cohort
    }

    /// Most recent fetch failure (initial or background), if any
    pub fn last_error(&self) -> Option<QueueFailure> {
        self.core.lock().last_error.clone()
    }

    pub fn last_refill(&self) -> Option<RefillOutcome> {
        self.core.lock().last_refill.clone()
    }

    pub fn stats(&self) -> QueueStats {
        self.core.lock().stats
    }

    pub fn is_refill_pending(&self) -> bool {
        self.core.lock().refill.is_some()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let state = self.core.lock();
        QueueSnapshot {
            status: state.status.clone(),
            cohort: state.cohort,
            generation: state.generation,
            cursor: state.cursor,
            active_ids: state.active.iter().map(|item| item.id.clone()).collect(),
            buffer_ids: state.buffer.iter().map(|item| item.id.clone()).collect(),
            refill_pending: state.refill.is_some(),
        }
    }

    /// Load two blocks for `cohort`, replacing any previous queue contents
    ///
    /// Both fetches start together and this returns as soon as one of them
    /// yields a block; the other one keeps running as the buffer refill. With
    /// both in at once the first request's block is served first. An empty
    /// first block ends in `NoContent`; a failed one waits for the second.
    pub async fn initialize(&self, cohort: Cohort) -> QueueStatus {
        let (generation, mut first, mut second) = {
            let mut state = self.core.lock();
            self.core.end_lifetime(&mut state);
            state.cohort = Some(cohort);
            state.last_error = None;
            state.last_refill = None;
            self.core.transition(&mut state, QueueStatus::Initializing);

            let first = self.core.fetch(cohort);
            let second = self.core.dispatch_refill(&mut state);
            (state.generation, first, second)
        };
        info!(generation, cohort = %cohort, block_size = self.core.block_size, "Initializing block queue");

        let mut first_result: Option<FetchResult<Vec<Item>>> = None;
        loop {
            tokio::select! {
                biased;
                result = &mut first, if first_result.is_none() => {
                    first_result = Some(result);
                }
                _ = async {
                    if let Some(task) = second.as_mut() {
                        let _ = task.await;
                    }
                }, if second.is_some() => {
                    second = None;
                }
            }

            let mut state = self.core.lock();
            if state.generation != generation {
                debug!(generation, "Initialization superseded");
                return state.status.clone();
            }

            match first_result.take() {
                Some(Ok(items)) if !items.is_empty() => {
                    info!(generation, item_count = items.len(), "Active block loaded");
                    self.core.preload(&items);
                    state.active = items;
                    state.cursor = 0;
                    self.core.transition(&mut state, QueueStatus::Ready);
                    return state.status.clone();
                }
                Some(Ok(_)) => {
                    info!(generation, cohort = %cohort, "No items available");
                    self.core.end_lifetime(&mut state);
                    state.last_error = Some(QueueFailure::NoContent);
                    self.core
                        .transition(&mut state, QueueStatus::Errored(QueueFailure::NoContent));
                    return state.status.clone();
                }
                Some(Err(error)) if second.is_some() => {
                    warn!(generation, error = %error, "First block fetch failed, waiting for second");
                    first_result = Some(Err(error));
                }
                Some(Err(error)) => {
                    return self.settle_after_first_failed(&mut state, error);
                }
                None if second.is_none() && state.buffer.len() >= 2 => {
                    info!(generation, "Second block arrived first, serving it");
                    state.promote_buffer();
                    self.core.transition(&mut state, QueueStatus::Ready);
                    self.core.adopt_refill(&mut state, first);
                    return state.status.clone();
                }
                None => {}
            }
        }
    }

    /// Promote the second block, or fail, once the first fetch has failed
    fn settle_after_first_failed(&self, state: &mut QueueState, first_error: FetchError) -> QueueStatus {
        let generation = state.generation;
        if state.buffer.len() >= 2 {
            info!(generation, "Promoting buffer block after first fetch failed");
            state.promote_buffer();
            self.core.transition(state, QueueStatus::Ready);
            self.core.dispatch_refill(state);
        } else {
            let failure = match state.last_refill {
                Some(RefillOutcome::Empty) => QueueFailure::NoContent,
                _ => QueueFailure::Fetch(first_error),
            };
            warn!(generation, failure = %failure, "Block queue initialization failed");
            self.core.end_lifetime(state);
            state.last_error = Some(failure.clone());
            self.core.transition(state, QueueStatus::Errored(failure));
        }
        state.status.clone()
    }

    /// Initialize again with the last requested cohort
    ///
    /// Used after `Depleted` or `Errored`. Returns the current status unchanged
    /// if no cohort was ever requested.
    pub async fn reinitialize(&self) -> QueueStatus {
        let cohort = self.cohort();
        match cohort {
            Some(cohort) => self.initialize(cohort).await,
            None => self.status(),
        }
    }

    /// The pair at the cursor, without side effects
    pub fn current_pair(&self) -> Option<Pair> {
        let state = self.core.lock();
        if !state.status.is_ready() {
            return None;
        }
        pair_at(&state.active, state.cursor)
    }

    /// The pair `advance` would move to, without moving
    ///
    /// Comes from the rest of the active block, else the head of the buffer.
    pub fn peek_next_pair(&self) -> Option<Pair> {
        let state = self.core.lock();
        if !state.status.is_ready() {
            return None;
        }
        pair_at(&state.active, state.cursor + 2).or_else(|| pair_at(&state.buffer, 0))
    }

    /// Move past the current pair and return the new current pair
    ///
    /// Swaps in the buffer block when the active one is used up and dispatches
    /// a background refill. Returns `None` and enters `Depleted` when the
    /// buffer had no pair to offer. Never waits on the network.
    pub fn advance(&self) -> Option<Pair> {
        let mut state = self.core.lock();
        if !state.status.is_ready() {
            return None;
        }

        state.cursor += 2;
        state.stats.pairs_consumed += 1;

        if state.cursor + 1 >= state.active.len() {
            if state.buffer.len() < 2 {
                info!(
                    generation = state.generation,
                    refill_pending = state.refill.is_some(),
                    "Both blocks exhausted"
                );
                self.core.end_lifetime(&mut state);
                self.core.transition(&mut state, QueueStatus::Depleted);
                return None;
            }

            state.promote_buffer();
            state.stats.swaps += 1;
            debug!(
                generation = state.generation,
                active_len = state.active.len(),
                "Swapped buffer block in"
            );
            self.core.events.emit_lossy(RaterEvent::BlockSwapped {
                generation: state.generation,
                active_len: state.active.len(),
                timestamp: chrono::Utc::now(),
            });
            self.core.dispatch_refill(&mut state);
        } else if state.buffer.is_empty() {
            // Earlier refill failed or came back empty: try again
            self.core.dispatch_refill(&mut state);
        }

        pair_at(&state.active, state.cursor)
    }

    /// Start a buffer fetch if the buffer is empty and none is pending
    ///
    /// Returns `true` when a fetch was dispatched.
    pub fn request_refill(&self) -> bool {
        let mut state = self.core.lock();
        if !state.status.is_ready() || !state.buffer.is_empty() {
            return false;
        }
        self.core.dispatch_refill(&mut state).is_some()
    }

    /// Cancel background work and clear both blocks
    ///
    /// The queue waits in `Resetting` until the next `initialize`.
    pub fn reset(&self) {
        let mut state = self.core.lock();
        self.core.end_lifetime(&mut state);
        state.last_error = None;
        state.last_refill = None;
        info!(generation = state.generation, "Block queue reset");
        self.core.transition(&mut state, QueueStatus::Resetting);
    }

    /// Wait until no buffer fetch is in flight
    pub async fn refill_idle(&self) {
        loop {
            let notified = self.core.refill_done.notified();
            if !self.is_refill_pending() {
                return;
            }
            notified.await;
        }
    }
}
