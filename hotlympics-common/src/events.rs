//! Event types for the rating client
//!
//! Provides the shared event enum and the EventBus that the queue, cache,
//! submitter and session gate publish to. A front-end (or the CLI driver)
//! subscribes to refresh its view instead of polling queue state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::models::Cohort;

/// Coarse lifecycle phase of a block queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuePhase {
    Uninitialized,
    Initializing,
    Ready,
    Depleted,
    Errored,
    Resetting,
}

/// Rating client event types
///
/// Events are broadcast via EventBus and serialize with a `type` tag so they
/// can be forwarded to a UI layer as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RaterEvent {
    /// Queue moved between lifecycle phases
    QueuePhaseChanged {
        /// Generation the transition belongs to
        generation: u64,
        /// Cohort the queue serves, if one was requested yet
        cohort: Option<Cohort>,
        old_phase: QueuePhase,
        new_phase: QueuePhase,
        /// Failure description for `Errored`
        detail: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Buffer block became the active block
    BlockSwapped {
        generation: u64,
        /// Number of items in the new active block
        active_len: usize,
        timestamp: DateTime<Utc>,
    },

    /// Background buffer fetch stored a new block
    RefillCompleted {
        generation: u64,
        item_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// Background buffer fetch failed
    RefillFailed {
        generation: u64,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Background buffer fetch succeeded but the backend had no items
    RefillEmpty {
        generation: u64,
        timestamp: DateTime<Utc>,
    },

    /// Background fetch finished after a reset and was dropped
    RefillDiscarded {
        stale_generation: u64,
        current_generation: u64,
        timestamp: DateTime<Utc>,
    },

    /// Comparison outcome delivery finished
    ComparisonSubmitted {
        winner_id: String,
        loser_id: String,
        is_draw: bool,
        success: bool,
        timestamp: DateTime<Utc>,
    },

    /// Session gate switched the requested cohort
    CohortChanged {
        old_cohort: Option<Cohort>,
        new_cohort: Cohort,
        timestamp: DateTime<Utc>,
    },
}

impl RaterEvent {
    /// Event type name (matches the serde `type` tag)
    pub fn event_type(&self) -> &'static str {
        match self {
            RaterEvent::QueuePhaseChanged { .. } => "QueuePhaseChanged",
            RaterEvent::BlockSwapped { .. } => "BlockSwapped",
            RaterEvent::RefillCompleted { .. } => "RefillCompleted",
            RaterEvent::RefillFailed { .. } => "RefillFailed",
            RaterEvent::RefillEmpty { .. } => "RefillEmpty",
            RaterEvent::RefillDiscarded { .. } => "RefillDiscarded",
            RaterEvent::ComparisonSubmitted { .. } => "ComparisonSubmitted",
            RaterEvent::CohortChanged { .. } => "CohortChanged",
        }
    }
}

/// Central event distribution bus
///
/// Wraps `tokio::sync::broadcast`:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use hotlympics_common::events::{EventBus, RaterEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(RaterEvent::BlockSwapped {
///     generation: 1,
///     active_len: 10,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert_eq!(rx.try_recv().unwrap().event_type(), "BlockSwapped");
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RaterEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<RaterEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: RaterEvent,
    ) -> Result<usize, broadcast::error::SendError<RaterEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: RaterEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers_errors() {
        let bus = EventBus::new(8);
        let result = bus.emit(RaterEvent::RefillCompleted {
            generation: 1,
            item_count: 10,
            timestamp: Utc::now(),
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_subscribers_receive_events_in_order() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.emit_lossy(RaterEvent::BlockSwapped {
            generation: 3,
            active_len: 10,
            timestamp: Utc::now(),
        });
        bus.emit_lossy(RaterEvent::RefillFailed {
            generation: 3,
            message: "timeout".to_string(),
            timestamp: Utc::now(),
        });

        assert_eq!(rx.recv().await.unwrap().event_type(), "BlockSwapped");
        assert_eq!(rx.recv().await.unwrap().event_type(), "RefillFailed");
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = RaterEvent::CohortChanged {
            old_cohort: None,
            new_cohort: Cohort::Male,
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "CohortChanged");
        assert_eq!(value["new_cohort"], "male");
        assert!(value["old_cohort"].is_null());
    }

    #[test]
    fn test_phase_serializes_snake_case() {
        let value = serde_json::to_value(QueuePhase::Uninitialized).unwrap();
        assert_eq!(value, "uninitialized");
    }
}
