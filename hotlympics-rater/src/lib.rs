//! # Hotlympics Rater Library (hotlympics-rater)
//!
//! Client core for pairwise photo rating.
//!
//! **Purpose:** Serve comparison pairs from a double-buffered prefetch queue,
//! cache item media, deliver outcomes without blocking the viewer, and keep
//! the queue on the cohort derived from the viewer's identity. Published
//! leaderboards are read through a TTL cache.
//!
//! **Architecture:** `BlockQueue` owns the blocks and is driven by one
//! consumer; background fetches run as tokio tasks guarded by a generation
//! id. Remote collaborators sit behind the traits in [`api`].

pub mod api;
pub mod error;
pub mod identity;
pub mod item_cache;
pub mod leaderboard;
pub mod queue;
pub mod rating;
pub mod session;
pub mod submitter;

pub use error::{FetchError, FetchResult};
pub use identity::{Identity, IdentityProvider, SharedIdentity};
pub use item_cache::{CacheLimits, CachedMedia, ItemCache, MediaHandle};
pub use leaderboard::LeaderboardCache;
pub use queue::{BlockQueue, QueueFailure, QueueStatus};
pub use rating::{Decision, RatingSession};
pub use session::{derive_cohort, GateOutcome, SessionGate};
pub use submitter::{ComparisonSubmitter, SubmitStats};
