//! Remote collaborator seams
//!
//! The queue, cache and submitter depend on these traits rather than on HTTP
//! directly; [`ApiClient`] is the production implementation and tests supply
//! scripted doubles.

pub mod client;

use async_trait::async_trait;
use hotlympics_common::{BoardKind, Cohort, ComparisonOutcome, Item, Leaderboard};

use crate::error::FetchResult;

pub use client::ApiClient;

/// Remote pool that hands out blocks of comparison items
#[async_trait]
pub trait PairSource: Send + Sync {
    /// Fetch up to `count` items for `cohort`, in backend order
    ///
    /// `Ok(vec![])` means the backend had nothing to offer, which callers
    /// treat differently from `Err`.
    async fn fetch_block(&self, cohort: Cohort, count: usize) -> FetchResult<Vec<Item>>;
}

/// Remote rating service accepting comparison outcomes
#[async_trait]
pub trait RatingService: Send + Sync {
    async fn submit_comparison(&self, outcome: &ComparisonOutcome) -> FetchResult<()>;
}

/// Byte source for media references
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch_media(&self, reference: &str) -> FetchResult<Vec<u8>>;
}

/// Read access to the boards the backend publishes
#[async_trait]
pub trait LeaderboardSource: Send + Sync {
    /// A board with no data yet comes back empty rather than as an error
    async fn fetch_leaderboard(&self, kind: BoardKind) -> FetchResult<Leaderboard>;
}
