//! Queue status and diagnostics types

use hotlympics_common::events::QueuePhase;
use hotlympics_common::Cohort;
use thiserror::Error;

use crate::error::FetchError;

/// Why initialization did not produce a servable block
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueFailure {
    /// Backend answered correctly but had no items ("nothing available")
    #[error("No items available")]
    NoContent,

    /// Network, status or decode failure ("try again")
    #[error(transparent)]
    Fetch(FetchError),
}

/// Block queue lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueStatus {
    /// No blocks loaded yet
    Uninitialized,
    /// Initial block fetches in flight
    Initializing,
    /// Pairs can be served
    Ready,
    /// Both blocks exhausted; call `initialize` again
    Depleted,
    /// Initialization failed; retriable
    Errored(QueueFailure),
    /// Cleared by `reset`; waiting for `initialize`
    Resetting,
}

impl QueueStatus {
    pub fn phase(&self) -> QueuePhase {
        match self {
            QueueStatus::Uninitialized => QueuePhase::Uninitialized,
            QueueStatus::Initializing => QueuePhase::Initializing,
            QueueStatus::Ready => QueuePhase::Ready,
            QueueStatus::Depleted => QueuePhase::Depleted,
            QueueStatus::Errored(_) => QueuePhase::Errored,
            QueueStatus::Resetting => QueuePhase::Resetting,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, QueueStatus::Ready)
    }

    /// States from which only `initialize` makes progress
    pub fn needs_initialize(&self) -> bool {
        matches!(
            self,
            QueueStatus::Uninitialized
                | QueueStatus::Depleted
                | QueueStatus::Errored(_)
                | QueueStatus::Resetting
        )
    }
}

/// Result of the most recent background buffer fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefillOutcome {
    Filled(usize),
    Empty,
    Failed(FetchError),
}

/// Monotonic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub generation: u64,
    pub refills_dispatched: u64,
    pub refills_discarded: u64,
    pub swaps: u64,
    /// Pairs moved past with `advance`
    pub pairs_consumed: u64,
}

/// Point-in-time view of queue internals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub status: QueueStatus,
    pub cohort: Option<Cohort>,
    pub generation: u64,
    pub cursor: usize,
    pub active_ids: Vec<String>,
    pub buffer_ids: Vec<String>,
    pub refill_pending: bool,
}
