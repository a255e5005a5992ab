//! Leaderboard reader with a time-to-live cache
//!
//! Boards change only when the backend republishes them, so a fetched board
//! is served from memory until its TTL runs out. `refresh` bypasses the TTL.
//! A failed fetch leaves the previously cached board in place.

use hotlympics_common::config::LeaderboardConfig;
use hotlympics_common::{BoardKind, Leaderboard};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::api::LeaderboardSource;
use crate::error::FetchResult;
use crate::item_cache::ItemCache;

/// Entries whose media is preloaded after a fetch
const PRELOAD_ENTRIES: usize = 10;

struct CachedBoard {
    board: Arc<Leaderboard>,
    fetched_at: Instant,
}

pub struct LeaderboardCache {
    source: Arc<dyn LeaderboardSource>,
    ttl: Duration,
    media: Option<Arc<ItemCache>>,
    boards: Mutex<HashMap<BoardKind, CachedBoard>>,
}

impl LeaderboardCache {
    pub fn new(source: Arc<dyn LeaderboardSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            media: None,
            boards: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(source: Arc<dyn LeaderboardSource>, config: &LeaderboardConfig) -> Self {
        Self::new(source, Duration::from_secs(config.ttl_secs))
    }

    /// Preload the media of the leading entries of every fetched board
    pub fn with_media(mut self, cache: Arc<ItemCache>) -> Self {
        self.media = Some(cache);
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<BoardKind, CachedBoard>> {
        self.boards.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cached board if still fresh, otherwise a new fetch
    pub async fn get(&self, kind: BoardKind) -> FetchResult<Arc<Leaderboard>> {
        if let Some(board) = self.fresh(kind) {
            debug!(board = %kind, "Leaderboard served from cache");
            return Ok(board);
        }
        self.refresh(kind).await
    }

    /// Fetch `kind` regardless of the cached copy's age
    pub async fn refresh(&self, kind: BoardKind) -> FetchResult<Arc<Leaderboard>> {
        let board = match self.source.fetch_leaderboard(kind).await {
            Ok(board) => Arc::new(board),
            Err(error) => {
                warn!(board = %kind, error = %error, "Leaderboard fetch failed");
                return Err(error);
            }
        };

        if let Some(media) = &self.media {
            for entry in board.entries.iter().take(PRELOAD_ENTRIES) {
                let _ = media.request(&entry.media_ref);
            }
        }

        self.lock().insert(
            kind,
            CachedBoard {
                board: Arc::clone(&board),
                fetched_at: Instant::now(),
            },
        );
        debug!(board = %kind, entries = board.entries.len(), "Leaderboard cached");
        Ok(board)
    }

    /// Cached board within its TTL, without fetching
    pub fn fresh(&self, kind: BoardKind) -> Option<Arc<Leaderboard>> {
        self.lock()
            .get(&kind)
            .filter(|cached| cached.fetched_at.elapsed() < self.ttl)
            .map(|cached| Arc::clone(&cached.board))
    }

    /// Drop one cached board; returns whether it was cached
    pub fn invalidate(&self, kind: BoardKind) -> bool {
        self.lock().remove(&kind).is_some()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
