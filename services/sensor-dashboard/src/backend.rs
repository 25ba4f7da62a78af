//! Collaborator seams for the external managed backend
//!
//! The session talks to the backend exclusively through these traits, so
//! tests can substitute scripted implementations without any network. Both
//! registration methods deliver their notifications into the session's
//! event channel and hand back a [`SubscriptionHandle`] that detaches the
//! registration when cancelled or dropped.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::events::{Identity, SessionEvent};
use crate::readings::ReadingQuery;

/// Authentication collaborator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Request issuance of an anonymous identity
    async fn sign_in_anonymously(&self) -> Result<Identity>;

    /// Sign in with a pre-issued credential token
    async fn sign_in_with_token(&self, token: &str) -> Result<Identity>;

    /// Register for identity-state change notifications
    ///
    /// The current identity state is delivered immediately if known, then
    /// on every change, as [`SessionEvent::IdentityChanged`].
    async fn watch_identity(&self, events: mpsc::Sender<SessionEvent>) -> SubscriptionHandle;
}

/// Live-data collaborator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DataBackend: Send + Sync {
    /// Open a live subscription over the query's result set
    ///
    /// The backend pushes a full [`SessionEvent::Snapshot`] on every change
    /// to the result set; feed failures arrive as
    /// [`SessionEvent::SubscriptionError`].
    async fn subscribe(
        &self,
        query: &ReadingQuery,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<SubscriptionHandle>;
}

/// Scoped registration guard
///
/// Holds the detach action for one listener or subscription registration.
/// Cancelling, or dropping the handle, releases the registration; both are
/// safe to do more than once.
pub struct SubscriptionHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl SubscriptionHandle {
    /// Create a handle that runs `cancel` when released
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Handle with no detach action, for registrations that need none
    pub fn no_op() -> Self {
        Self { cancel: None }
    }

    /// Release the registration now
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("armed", &self.cancel.is_some())
            .finish()
    }
}
