//! Test Helper Utilities
//!
//! Scripted doubles for the remote collaborators plus item factories.
//! Doubles count their calls and can hold chosen calls open until released,
//! which lets tests observe the queue while a fetch is in flight.

#![allow(dead_code)]

use async_trait::async_trait;
use hotlympics_common::leaderboard::LeaderboardEntry;
use hotlympics_common::models::{ComparisonStats, RatingSnapshot};
use hotlympics_common::{BoardKind, Cohort, ComparisonOutcome, Item, Leaderboard};
use hotlympics_rater::api::{LeaderboardSource, MediaFetcher, PairSource, RatingService};
use hotlympics_rater::{FetchError, FetchResult};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

pub const PNG_BYTES: &[u8] = &[
    0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D, b'I', b'H', b'D', b'R',
];

/// Route test logs through the test harness writer
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("hotlympics_rater=debug")
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Item factories
// ============================================================================

pub fn item_in(id: &str, cohort: Cohort) -> Item {
    Item {
        id: id.to_string(),
        media_ref: format!("https://cdn.example/{}.png", id),
        owner_id: format!("owner-{}", id),
        cohort,
        stats: ComparisonStats::default(),
        rating: RatingSnapshot {
            rating: 1500.0,
            deviation: 350.0,
            volatility: 0.06,
            mu: 0.0,
            phi: 2.0148,
            version: 1,
            updated_at: chrono::Utc::now(),
        },
        in_pool: true,
        status: None,
    }
}

pub fn item(id: &str) -> Item {
    item_in(id, Cohort::Female)
}

/// Items named `{prefix}{n}` for each n in `range`
pub fn items(prefix: &str, range: std::ops::Range<usize>) -> Vec<Item> {
    range.map(|n| item(&format!("{}{}", prefix, n))).collect()
}

pub fn ids(items: &[Item]) -> Vec<String> {
    items.iter().map(|item| item.id.clone()).collect()
}

/// Let spawned tasks run until `done` holds, failing after one second
pub async fn settle<F: Fn() -> bool>(done: F) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while !done() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition not reached within 1s");
}

// ============================================================================
// ScriptedSource
// ============================================================================

/// One scripted block response
#[derive(Debug, Clone)]
pub enum Scripted {
    Items(Vec<Item>),
    Empty,
    Fail(FetchError),
}

/// PairSource answering calls in order from a script
///
/// Responses are taken when the call starts. Once the script runs out every
/// call returns an empty block.
pub struct ScriptedSource {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<(Cohort, usize)>>,
    held: Mutex<HashSet<usize>>,
    gate: Semaphore,
    calls: AtomicUsize,
    completed: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(script: Vec<Scripted>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
            held: Mutex::new(HashSet::new()),
            gate: Semaphore::new(0),
            calls: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        })
    }

    /// Blocks of `block_size` items named `b{block}-{n}`
    pub fn blocks(count: usize, block_size: usize) -> Arc<Self> {
        Self::new(
            (0..count)
                .map(|b| Scripted::Items(items(&format!("b{}-", b), 0..block_size)))
                .collect(),
        )
    }

    /// Hold the calls with these zero-based indices until `release`
    pub fn hold(&self, indices: &[usize]) {
        self.held.lock().unwrap().extend(indices.iter().copied());
    }

    /// Let `n` held calls complete
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn push(&self, response: Scripted) {
        self.script.lock().unwrap().push_back(response);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<(Cohort, usize)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PairSource for ScriptedSource {
    async fn fetch_block(&self, cohort: Cohort, count: usize) -> FetchResult<Vec<Item>> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push((cohort, count));
        let response = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Scripted::Empty);
        let held = self.held.lock().unwrap().contains(&index);

        if held {
            self.gate.acquire().await.unwrap().forget();
        }
        self.completed.fetch_add(1, Ordering::SeqCst);

        match response {
            Scripted::Items(items) => Ok(items),
            Scripted::Empty => Ok(Vec::new()),
            Scripted::Fail(error) => Err(error),
        }
    }
}

// ============================================================================
// CountingFetcher
// ============================================================================

/// MediaFetcher returning a tiny PNG, counting calls per reference
pub struct CountingFetcher {
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    gate: Option<Semaphore>,
    payload: Vec<u8>,
}

impl CountingFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::base())
    }

    /// Every fetch waits for `release`
    pub fn gated() -> Arc<Self> {
        Arc::new(Self {
            gate: Some(Semaphore::new(0)),
            ..Self::base()
        })
    }

    /// Serve `payload` instead of PNG bytes
    pub fn serving(payload: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            payload: payload.to_vec(),
            ..Self::base()
        })
    }

    fn base() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            gate: None,
            payload: PNG_BYTES.to_vec(),
        }
    }

    pub fn fail(&self, reference: &str) {
        self.failing.lock().unwrap().insert(reference.to_string());
    }

    pub fn recover(&self, reference: &str) {
        self.failing.lock().unwrap().remove(reference);
    }

    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, reference: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.as_str() == reference)
            .count()
    }
}

#[async_trait]
impl MediaFetcher for CountingFetcher {
    async fn fetch_media(&self, reference: &str) -> FetchResult<Vec<u8>> {
        self.calls.lock().unwrap().push(reference.to_string());
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if self.failing.lock().unwrap().contains(reference) {
            return Err(FetchError::Status(404, "not found".to_string()));
        }
        Ok(self.payload.clone())
    }
}

// ============================================================================
// RecordingService
// ============================================================================

/// RatingService recording every outcome; rejects outcomes whose winner is
/// in the failing set
pub struct RecordingService {
    received: Mutex<Vec<ComparisonOutcome>>,
    reject_winners: Mutex<HashSet<String>>,
}

impl RecordingService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            received: Mutex::new(Vec::new()),
            reject_winners: Mutex::new(HashSet::new()),
        })
    }

    pub fn reject_winner(&self, id: &str) {
        self.reject_winners.lock().unwrap().insert(id.to_string());
    }

    pub fn received(&self) -> Vec<ComparisonOutcome> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl RatingService for RecordingService {
    async fn submit_comparison(&self, outcome: &ComparisonOutcome) -> FetchResult<()> {
        self.received.lock().unwrap().push(outcome.clone());
        if self.reject_winners.lock().unwrap().contains(&outcome.winner_id) {
            Err(FetchError::Rejected("duplicate vote".to_string()))
        } else {
            Ok(())
        }
    }
}

// ============================================================================
// ScriptedBoards
// ============================================================================

/// Board of `kind` holding one entry per id, in rank order
pub fn board(kind: BoardKind, ids: &[&str]) -> Leaderboard {
    let entries: Vec<LeaderboardEntry> = ids
        .iter()
        .enumerate()
        .map(|(index, id)| LeaderboardEntry {
            rank: index + 1,
            id: id.to_string(),
            media_ref: format!("https://cdn.example/{}.png", id),
            owner_id: format!("owner-{}", id),
            rating: 1800.0 - index as f64 * 10.0,
            deviation: 60.0,
            battles: 10,
            wins: 6,
            losses: 4,
            draws: 0,
        })
        .collect();
    Leaderboard {
        kind,
        total_count: entries.len(),
        entries,
        generated_at: Some(chrono::Utc::now()),
    }
}

/// LeaderboardSource serving whatever board is currently scripted per kind
///
/// Unscripted kinds come back empty, like an unpublished board.
pub struct ScriptedBoards {
    replies: Mutex<HashMap<BoardKind, FetchResult<Leaderboard>>>,
    fetches: Mutex<Vec<BoardKind>>,
}

impl ScriptedBoards {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(HashMap::new()),
            fetches: Mutex::new(Vec::new()),
        })
    }

    pub fn serve(&self, board: Leaderboard) {
        self.replies.lock().unwrap().insert(board.kind, Ok(board));
    }

    pub fn fail(&self, kind: BoardKind, error: FetchError) {
        self.replies.lock().unwrap().insert(kind, Err(error));
    }

    pub fn fetches(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }

    pub fn fetches_for(&self, kind: BoardKind) -> usize {
        self.fetches.lock().unwrap().iter().filter(|k| **k == kind).count()
    }
}

#[async_trait]
impl LeaderboardSource for ScriptedBoards {
    async fn fetch_leaderboard(&self, kind: BoardKind) -> FetchResult<Leaderboard> {
        self.fetches.lock().unwrap().push(kind);
        self.replies
            .lock()
            .unwrap()
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| Ok(Leaderboard::empty(kind)))
    }
}
