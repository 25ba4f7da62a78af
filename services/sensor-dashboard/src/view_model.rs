//! Live reading view-model
//!
//! [`ViewState`] is the render-ready aggregate the dashboard displays. It
//! is immutable per update: every event produces a whole new value through
//! [`ViewState::apply`], so a renderer can never observe a torn write.
//! [`LiveReadingViewModel`] owns the current state and the lifecycle of the
//! live subscription backing it.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::backend::{DataBackend, SubscriptionHandle};
use crate::error::Result;
use crate::events::{Identity, SessionEvent};
use crate::readings::{Reading, ReadingDocument, ReadingQuery};

/// Which of the three mutually exclusive render modes applies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Waiting for the first snapshot (or for identity resolution)
    Loading,
    /// A terminal error occurred before anything was displayed
    Error,
    /// Displaying data; `ViewState::error` may carry a degraded-feed banner
    Dashboard,
}

/// Render-ready session state
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ViewState {
    /// Resolved session principal, if any
    pub identity: Option<Identity>,
    /// Most recent readings, newest first, wholly replaced per snapshot
    pub window: Vec<Reading>,
    /// First element of the last non-empty window.
    ///
    /// Deliberately retained when an empty snapshot follows prior data;
    /// once something was shown there is no reset to "no data".
    pub latest: Option<Reading>,
    /// Most recent error message, if any
    pub error: Option<String>,
    /// True until the first snapshot or error arrives
    pub is_loading: bool,
}

/// One state transition input for the reducer
#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    /// Bootstrap resolved the session identity
    IdentityResolved(Identity),
    /// The identity was revoked (session ending)
    IdentityCleared,
    /// Full replacement snapshot from the live subscription
    Snapshot(Vec<ReadingDocument>),
    /// The live feed failed; previously displayed data stays
    SubscriptionFailed(String),
    /// Terminal failure before or during bootstrap
    Fatal(String),
}

impl ViewState {
    /// Initial state shown before any event has been processed
    pub fn loading() -> Self {
        Self {
            is_loading: true,
            ..Self::default()
        }
    }

    /// Produce the successor state for `event`.
    ///
    /// Pure function of `(self, event)`; applying the same event twice
    /// yields the same state twice.
    pub fn apply(&self, event: &ViewEvent) -> ViewState {
        let mut next = self.clone();
        match event {
            ViewEvent::IdentityResolved(identity) => {
                next.identity = Some(identity.clone());
            }
            ViewEvent::IdentityCleared => {
                next.identity = None;
            }
            ViewEvent::Snapshot(docs) => {
                next.window = docs.iter().map(ReadingDocument::materialize).collect();
                if let Some(first) = next.window.first() {
                    next.latest = Some(first.clone());
                }
                next.error = None;
                next.is_loading = false;
            }
            ViewEvent::SubscriptionFailed(message) => {
                next.error = Some(message.clone());
                next.is_loading = false;
            }
            ViewEvent::Fatal(message) => {
                next.error = Some(message.clone());
                next.is_loading = false;
            }
        }
        next
    }

    /// Derive the render mode; exactly one applies at any time
    pub fn render_mode(&self) -> RenderMode {
        if self.is_loading {
            RenderMode::Loading
        } else if self.error.is_some() && self.window.is_empty() && self.latest.is_none() {
            RenderMode::Error
        } else {
            RenderMode::Dashboard
        }
    }
}

/// Maintains view state in sync with the live subscription
pub struct LiveReadingViewModel {
    data: Arc<dyn DataBackend>,
    query: ReadingQuery,
    state: ViewState,
    subscription: Option<SubscriptionHandle>,
}

impl LiveReadingViewModel {
    pub fn new(data: Arc<dyn DataBackend>, query: ReadingQuery) -> Self {
        Self {
            data,
            query,
            state: ViewState::loading(),
            subscription: None,
        }
    }

    /// Current state snapshot
    pub fn state(&self) -> &ViewState {
        &self.state
    }

    /// Whether a live subscription is currently open
    pub fn is_active(&self) -> bool {
        self.subscription.is_some()
    }

    /// Open the live subscription for `identity`.
    ///
    /// Requires a resolved identity by construction; the session only calls
    /// this after bootstrap completes. Re-activating with the same identity
    /// is a no-op, re-activating with a different one cancels the old
    /// subscription before opening the new one. A subscribe failure is
    /// folded into view state rather than propagated.
    pub async fn activate(
        &mut self,
        identity: Identity,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<()> {
        if self.subscription.is_some() && self.state.identity.as_ref() == Some(&identity) {
            debug!("view-model already active for {}", identity);
            return Ok(());
        }
        if let Some(previous) = self.subscription.take() {
            debug!("cancelling previous subscription before re-activation");
            previous.cancel();
        }

        self.state = self.state.apply(&ViewEvent::IdentityResolved(identity));
        match self.data.subscribe(&self.query, events).await {
            Ok(handle) => {
                debug!(
                    "live subscription opened: {} (limit {})",
                    self.query.collection, self.query.limit
                );
                self.subscription = Some(handle);
                Ok(())
            }
            Err(e) => {
                warn!("failed to open live subscription: {}", e);
                self.state = self
                    .state
                    .apply(&ViewEvent::SubscriptionFailed(e.to_string()));
                Err(e)
            }
        }
    }

    /// Cancel the subscription and clear the identity
    pub fn deactivate(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            debug!("cancelling live subscription");
            subscription.cancel();
        }
        self.state = self.state.apply(&ViewEvent::IdentityCleared);
    }

    /// Process a full replacement snapshot
    pub fn handle_snapshot(&mut self, docs: Vec<ReadingDocument>) {
        debug!("snapshot received with {} readings", docs.len());
        self.state = self.state.apply(&ViewEvent::Snapshot(docs));
    }

    /// Process a feed failure
    pub fn handle_subscription_error(&mut self, message: String) {
        warn!("live subscription error: {}", message);
        self.state = self.state.apply(&ViewEvent::SubscriptionFailed(message));
    }

    /// Record a terminal session failure
    pub fn handle_fatal(&mut self, message: String) {
        self.state = self.state.apply(&ViewEvent::Fatal(message));
    }
}
