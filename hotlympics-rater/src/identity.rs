//! Identity provider seam
//!
//! The rating core only needs two things from authentication: the viewer's
//! own cohort (to derive which cohort to show) and an optional bearer token.
//! Sign-in flows and token refresh live behind this trait.

use async_trait::async_trait;
use hotlympics_common::Cohort;
use tokio::sync::{watch, RwLock};

/// Cohort-relevant view of the signed-in user
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    /// `None` for anonymous viewers
    pub user_id: Option<String>,
    /// Viewer's own cohort, if known
    pub cohort: Option<Cohort>,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn signed_in(user_id: impl Into<String>, cohort: Option<Cohort>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            cohort,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.user_id.is_none()
    }
}

/// Source of identity state and authentication tokens
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Identity as of now
    fn current(&self) -> Identity;

    /// Receiver notified on every identity change
    fn changes(&self) -> watch::Receiver<Identity>;

    /// Bearer token for authenticated requests, `None` when anonymous
    async fn bearer_token(&self) -> Option<String>;
}

/// In-memory identity provider backed by a watch channel
///
/// Used by the CLI driver (identity comes from flags) and by tests.
pub struct SharedIdentity {
    tx: watch::Sender<Identity>,
    token: RwLock<Option<String>>,
}

impl SharedIdentity {
    pub fn new(identity: Identity) -> Self {
        let (tx, _) = watch::channel(identity);
        Self {
            tx,
            token: RwLock::new(None),
        }
    }

    /// Replace the identity and notify watchers
    pub fn set_identity(&self, identity: Identity) {
        self.tx.send_replace(identity);
    }

    pub async fn set_token(&self, token: Option<String>) {
        *self.token.write().await = token;
    }
}

impl Default for SharedIdentity {
    fn default() -> Self {
        Self::new(Identity::anonymous())
    }
}

#[async_trait]
impl IdentityProvider for SharedIdentity {
    fn current(&self) -> Identity {
        self.tx.borrow().clone()
    }

    fn changes(&self) -> watch::Receiver<Identity> {
        self.tx.subscribe()
    }

    async fn bearer_token(&self) -> Option<String> {
        self.token.read().await.clone()
    }
}
