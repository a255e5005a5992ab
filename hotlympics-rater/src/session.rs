//! Identity-driven cohort selection
//!
//! Viewers rate the opposite cohort to their own; anonymous viewers and
//! viewers with no recorded cohort get the configured default. A change of
//! derived cohort resets the queue so no pair from the previous cohort is
//! served afterwards.

use hotlympics_common::events::{EventBus, RaterEvent};
use hotlympics_common::Cohort;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::identity::{Identity, IdentityProvider};
use crate::queue::{BlockQueue, QueueStatus};

/// Cohort a viewer should be shown
pub fn derive_cohort(identity: &Identity, default: Cohort) -> Cohort {
    identity.cohort.map(Cohort::opposite).unwrap_or(default)
}

/// What `SessionGate::sync` did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// Same cohort and the queue was still serviceable
    Unchanged { cohort: Cohort, status: QueueStatus },
    /// Cohort changed; the queue was reset and initialized for `to`
    Switched {
        from: Option<Cohort>,
        to: Cohort,
        status: QueueStatus,
    },
    /// Same cohort, but the queue was depleted or failed and was initialized again
    Reinitialized { cohort: Cohort, status: QueueStatus },
}

impl GateOutcome {
    pub fn status(&self) -> &QueueStatus {
        match self {
            GateOutcome::Unchanged { status, .. }
            | GateOutcome::Switched { status, .. }
            | GateOutcome::Reinitialized { status, .. } => status,
        }
    }
}

/// Watches identity and keeps the queue on the right cohort
pub struct SessionGate {
    queue: Arc<BlockQueue>,
    default_cohort: Cohort,
    events: EventBus,
    last: Mutex<Option<Cohort>>,
}

impl SessionGate {
    pub fn new(queue: Arc<BlockQueue>, default_cohort: Cohort, events: EventBus) -> Self {
        Self {
            queue,
            default_cohort,
            events,
            last: Mutex::new(None),
        }
    }

    pub fn queue(&self) -> &Arc<BlockQueue> {
        &self.queue
    }

    /// Cohort from the most recent `observe`
    pub fn current_cohort(&self) -> Option<Cohort> {
        *self.lock_last()
    }

    fn lock_last(&self) -> MutexGuard<'_, Option<Cohort>> {
        self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Recompute the cohort for `identity`
    ///
    /// Returns the new cohort and resets the queue when it differs from the
    /// last one computed; returns `None` and leaves the queue alone otherwise.
    pub fn observe(&self, identity: &Identity) -> Option<Cohort> {
        self.switch(identity).map(|(_, to)| to)
    }

    fn switch(&self, identity: &Identity) -> Option<(Option<Cohort>, Cohort)> {
        let cohort = derive_cohort(identity, self.default_cohort);
        let previous = {
            let mut last = self.lock_last();
            if *last == Some(cohort) {
                debug!(cohort = %cohort, "Cohort unchanged");
                return None;
            }
            last.replace(cohort)
        };

        info!(
            from = ?previous,
            to = %cohort,
            anonymous = identity.is_anonymous(),
            "Cohort changed, resetting queue"
        );
        self.queue.reset();
        self.events.emit_lossy(RaterEvent::CohortChanged {
            old_cohort: previous,
            new_cohort: cohort,
            timestamp: chrono::Utc::now(),
        });
        Some((previous, cohort))
    }

    /// `observe`, then initialize the queue if the cohort changed or the
    /// queue cannot serve pairs
    pub async fn sync(&self, identity: &Identity) -> GateOutcome {
        if let Some((from, to)) = self.switch(identity) {
            let status = self.queue.initialize(to).await;
            return GateOutcome::Switched { from, to, status };
        }

        let cohort = self
            .current_cohort()
            .unwrap_or_else(|| derive_cohort(identity, self.default_cohort));
        let status = self.queue.status();
        if status.needs_initialize() {
            info!(cohort = %cohort, status = ?status, "Reinitializing queue");
            let status = self.queue.initialize(cohort).await;
            GateOutcome::Reinitialized { cohort, status }
        } else {
            GateOutcome::Unchanged { cohort, status }
        }
    }

    /// Follow `provider` and `sync` on every identity change
    ///
    /// Only changes after this call are seen; call `sync` with the current
    /// identity first. The task ends when the provider drops its sender;
    /// abort the handle to stop it sooner.
    pub fn watch(self: Arc<Self>, provider: &dyn IdentityProvider) -> JoinHandle<()> {
        let mut changes = provider.changes();
        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let identity = changes.borrow_and_update().clone();
                let outcome = self.sync(&identity).await;
                debug!(outcome = ?outcome, "Identity change handled");
            }
            debug!("Identity provider closed, session watch ending");
        })
    }
}
