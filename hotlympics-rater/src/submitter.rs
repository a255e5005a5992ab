//! Fire-and-forget comparison delivery
//!
//! Outcomes are sent after the queue has already advanced, so the viewer
//! never waits on the rating service. A failed delivery is logged and
//! counted; it is not retried and never touches the queue.

use hotlympics_common::events::{EventBus, RaterEvent};
use hotlympics_common::ComparisonOutcome;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api::RatingService;

#[derive(Default)]
struct SubmitCounters {
    attempted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

/// Delivery counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitStats {
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
}

impl SubmitStats {
    /// Deliveries started but not yet finished
    pub fn pending(&self) -> u64 {
        self.attempted
            .saturating_sub(self.succeeded)
            .saturating_sub(self.failed)
    }
}

/// Sends comparison outcomes to the rating service
#[derive(Clone)]
pub struct ComparisonSubmitter {
    service: Arc<dyn RatingService>,
    events: EventBus,
    counters: Arc<SubmitCounters>,
}

impl ComparisonSubmitter {
    pub fn new(service: Arc<dyn RatingService>, events: EventBus) -> Self {
        Self {
            service,
            events,
            counters: Arc::new(SubmitCounters::default()),
        }
    }

    /// Deliver in the background
    ///
    /// The handle resolves to the delivery result and may be dropped.
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, outcome: ComparisonOutcome) -> JoinHandle<bool> {
        let submitter = self.clone();
        tokio::spawn(async move { submitter.deliver(outcome).await })
    }

    /// Deliver and wait; `true` when the service acknowledged the outcome
    pub async fn deliver(&self, outcome: ComparisonOutcome) -> bool {
        self.counters.attempted.fetch_add(1, Ordering::Relaxed);

        let success = match self.service.submit_comparison(&outcome).await {
            Ok(()) => {
                self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
                debug!(
                    winner = %outcome.winner_id,
                    loser = %outcome.loser_id,
                    is_draw = outcome.is_draw,
                    "Comparison recorded"
                );
                true
            }
            Err(error) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    winner = %outcome.winner_id,
                    loser = %outcome.loser_id,
                    decided_at = %outcome.decided_at,
                    error = %error,
                    "Comparison submission failed"
                );
                false
            }
        };

        self.events.emit_lossy(RaterEvent::ComparisonSubmitted {
            winner_id: outcome.winner_id,
            loser_id: outcome.loser_id,
            is_draw: outcome.is_draw,
            success,
            timestamp: chrono::Utc::now(),
        });
        success
    }

    pub fn stats(&self) -> SubmitStats {
        SubmitStats {
            attempted: self.counters.attempted.load(Ordering::Relaxed),
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FetchError, FetchResult};
    use async_trait::async_trait;

    struct RejectDraws;

    #[async_trait]
    impl RatingService for RejectDraws {
        async fn submit_comparison(&self, outcome: &ComparisonOutcome) -> FetchResult<()> {
            if outcome.is_draw {
                Err(FetchError::Rejected("draws disabled".into()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_deliver_counts_results() {
        let events = EventBus::new(8);
        let mut rx = events.subscribe();
        let submitter = ComparisonSubmitter::new(Arc::new(RejectDraws), events);

        assert!(submitter.deliver(ComparisonOutcome::new("a", "b")).await);

        let mut draw = ComparisonOutcome::new("c", "d");
        draw.is_draw = true;
        assert!(!submitter.deliver(draw).await);

        let stats = submitter.stats();
        assert_eq!(stats.attempted, 2);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.pending(), 0);

        match rx.recv().await.unwrap() {
            RaterEvent::ComparisonSubmitted { winner_id, success, .. } => {
                assert_eq!(winner_id, "a");
                assert!(success);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_submit_handle_resolves() {
        let submitter = ComparisonSubmitter::new(Arc::new(RejectDraws), EventBus::new(8));
        let handle = submitter.submit(ComparisonOutcome::new("x", "y"));
        assert!(handle.await.unwrap());
    }
}
