//! Viewer-facing rating flow
//!
//! Choosing on a pair advances the queue first and submits second, so the next
//! pair is on screen before the rating service has answered. A rejected
//! submission does not bring the old pair back.

use hotlympics_common::models::Choice;
use hotlympics_common::{ComparisonOutcome, Pair};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::queue::BlockQueue;
use crate::submitter::ComparisonSubmitter;

/// Result of one choice
#[derive(Debug)]
pub struct Decision {
    /// Outcome sent to the rating service
    pub outcome: ComparisonOutcome,
    /// Pair now showing; `None` if the queue is depleted
    pub next: Option<Pair>,
    /// Background delivery; resolves to `true` when acknowledged
    pub delivery: JoinHandle<bool>,
}

pub struct RatingSession {
    queue: Arc<BlockQueue>,
    submitter: ComparisonSubmitter,
}

impl RatingSession {
    pub fn new(queue: Arc<BlockQueue>, submitter: ComparisonSubmitter) -> Self {
        Self { queue, submitter }
    }

    pub fn queue(&self) -> &Arc<BlockQueue> {
        &self.queue
    }

    pub fn submitter(&self) -> &ComparisonSubmitter {
        &self.submitter
    }

    pub fn current_pair(&self) -> Option<Pair> {
        self.queue.current_pair()
    }

    /// Record `choice` on the current pair
    ///
    /// Returns `None` when there is no pair to choose on.
    pub fn choose(&self, choice: Choice) -> Option<Decision> {
        let pair = self.queue.current_pair()?;
        let outcome = ComparisonOutcome::from_choice(&pair, choice);
        debug!(left = %pair.left.id, right = %pair.right.id, choice = ?choice, "Pair decided");

        let next = self.queue.advance();
        let delivery = self.submitter.submit(outcome.clone());

        Some(Decision {
            outcome,
            next,
            delivery,
        })
    }

    /// Move past the current pair without rating it
    pub fn skip(&self) -> Option<Pair> {
        self.queue.advance()
    }
}
