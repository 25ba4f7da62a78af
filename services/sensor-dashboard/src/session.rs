//! Dashboard session loop
//!
//! Composition root for one browser-session equivalent: validates the
//! configuration, registers the identity watcher, and consumes the
//! serialized event stream, pushing each resulting [`ViewState`] through a
//! watch channel. Renderers observe whole state snapshots and nothing else.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::backend::{AuthBackend, DataBackend};
use crate::bootstrap::IdentityBootstrapper;
use crate::config::Config;
use crate::error::Result;
use crate::events::SessionEvent;
use crate::readings::ReadingQuery;
use crate::view_model::{LiveReadingViewModel, ViewState};

/// Capacity of the serialized session event channel
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// One authenticated dashboard session
pub struct DashboardSession {
    config: Config,
    auth: Arc<dyn AuthBackend>,
    data: Arc<dyn DataBackend>,
    state_tx: watch::Sender<ViewState>,
}

impl DashboardSession {
    pub fn new(config: Config, auth: Arc<dyn AuthBackend>, data: Arc<dyn DataBackend>) -> Self {
        let (state_tx, _) = watch::channel(ViewState::loading());
        Self {
            config,
            auth,
            data,
            state_tx,
        }
    }

    /// Receiver of view-state snapshots for a renderer
    pub fn state_receiver(&self) -> watch::Receiver<ViewState> {
        self.state_tx.subscribe()
    }

    /// Run the session until the event stream ends or a terminal error
    /// occurs.
    ///
    /// All registrations are scoped to this call: dropping the returned
    /// future, or returning from it, releases the identity watcher and any
    /// open subscription.
    pub async fn run(self) -> Result<()> {
        let query = ReadingQuery::latest_readings(
            self.config.query.collection.clone(),
            self.config.query.limit,
        );
        let mut view_model = LiveReadingViewModel::new(Arc::clone(&self.data), query);

        if let Err(e) = self.config.validate() {
            view_model.handle_fatal(e.to_string());
            self.publish(view_model.state());
            return Err(e);
        }

        let (events_tx, mut events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let mut bootstrapper = IdentityBootstrapper::new(
            Arc::clone(&self.auth),
            self.config.auth.credential_token.clone(),
        );

        // Held for the lifetime of the session; dropped on every exit path.
        let _identity_watch = self.auth.watch_identity(events_tx.clone()).await;
        info!(
            "session started for project {}",
            self.config.backend.project_id
        );
        self.publish(view_model.state());

        while let Some(event) = events_rx.recv().await {
            match event {
                SessionEvent::IdentityChanged(observed) => {
                    match bootstrapper.handle_identity_change(observed).await {
                        Ok(Some(identity)) => {
                            // A subscribe failure is already folded into
                            // view state; the session keeps running.
                            let _ = view_model.activate(identity, events_tx.clone()).await;
                            self.publish(view_model.state());
                        }
                        Ok(None) => {
                            if view_model.is_active() {
                                view_model.deactivate();
                                self.publish(view_model.state());
                            }
                        }
                        Err(e) => {
                            view_model.handle_fatal(e.to_string());
                            self.publish(view_model.state());
                            return Err(e);
                        }
                    }
                }
                SessionEvent::Snapshot(docs) => {
                    view_model.handle_snapshot(docs);
                    self.publish(view_model.state());
                }
                SessionEvent::SubscriptionError(message) => {
                    view_model.handle_subscription_error(message);
                    self.publish(view_model.state());
                }
            }
        }

        debug!("session event stream ended");
        Ok(())
    }

    fn publish(&self, state: &ViewState) {
        // Send fails only when no renderer is attached, which is fine.
        let _ = self.state_tx.send(state.clone());
    }
}
