//! Integration tests for the dashboard session loop
//!
//! Scripted auth and data backends drive the session end to end; tests
//! observe only what a renderer observes, whole view-state snapshots on the
//! watch channel.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use sensor_dashboard::backend::{AuthBackend, DataBackend, SubscriptionHandle};
use sensor_dashboard::error::{DashboardError, Result};
use sensor_dashboard::events::{Identity, SessionEvent};
use sensor_dashboard::readings::{BackendTimestamp, ReadingDocument, ReadingQuery};
use sensor_dashboard::view_model::{RenderMode, ViewState};
use sensor_dashboard::{Config, DashboardSession};

/// Auth backend that signs in on demand and lets the test inject events
/// into the session channel it captured from `watch_identity`.
struct StubAuthBackend {
    anonymous_calls: AtomicU32,
    token_calls: Mutex<Vec<String>>,
    events: Mutex<Option<mpsc::Sender<SessionEvent>>>,
    fail_sign_in: bool,
}

impl StubAuthBackend {
    fn new() -> Self {
        Self {
            anonymous_calls: AtomicU32::new(0),
            token_calls: Mutex::new(Vec::new()),
            events: Mutex::new(None),
            fail_sign_in: false,
        }
    }

    fn failing() -> Self {
        Self {
            fail_sign_in: true,
            ..Self::new()
        }
    }

    async fn push(&self, event: SessionEvent) {
        let sender = self
            .events
            .lock()
            .unwrap()
            .clone()
            .expect("watch_identity not called yet");
        sender.send(event).await.expect("session loop gone");
    }
}

#[async_trait]
impl AuthBackend for StubAuthBackend {
    async fn sign_in_anonymously(&self) -> Result<Identity> {
        self.anonymous_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_sign_in {
            return Err(DashboardError::Authentication("rejected".to_string()));
        }
        Ok(Identity::new("anon-1"))
    }

    async fn sign_in_with_token(&self, token: &str) -> Result<Identity> {
        self.token_calls.lock().unwrap().push(token.to_string());
        if self.fail_sign_in {
            return Err(DashboardError::Authentication("token rejected".to_string()));
        }
        Ok(Identity::new(format!("user-{}", token)))
    }

    async fn watch_identity(&self, events: mpsc::Sender<SessionEvent>) -> SubscriptionHandle {
        *self.events.lock().unwrap() = Some(events.clone());
        // No principal is signed in when a fresh session connects.
        let _ = events.send(SessionEvent::IdentityChanged(None)).await;
        SubscriptionHandle::no_op()
    }
}

/// Data backend that records queries, pushes scripted snapshots on
/// subscribe, and counts handle cancellations.
struct StubDataBackend {
    queries: Mutex<Vec<ReadingQuery>>,
    snapshots: Vec<Vec<ReadingDocument>>,
    cancelled: Arc<AtomicU32>,
    fail_subscribe: bool,
}

impl StubDataBackend {
    fn new() -> Self {
        Self::with_snapshots(Vec::new())
    }

    fn with_snapshots(snapshots: Vec<Vec<ReadingDocument>>) -> Self {
        Self {
            queries: Mutex::new(Vec::new()),
            snapshots,
            cancelled: Arc::new(AtomicU32::new(0)),
            fail_subscribe: false,
        }
    }

    fn failing() -> Self {
        Self {
            fail_subscribe: true,
            ..Self::new()
        }
    }

    fn subscribe_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    fn cancel_count(&self) -> u32 {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataBackend for StubDataBackend {
    async fn subscribe(
        &self,
        query: &ReadingQuery,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<SubscriptionHandle> {
        self.queries.lock().unwrap().push(query.clone());
        if self.fail_subscribe {
            return Err(DashboardError::Subscription("permission denied".to_string()));
        }
        for docs in self.snapshots.clone() {
            let _ = events.send(SessionEvent::Snapshot(docs)).await;
        }
        let cancelled = Arc::clone(&self.cancelled);
        Ok(SubscriptionHandle::new(move || {
            cancelled.fetch_add(1, Ordering::SeqCst);
        }))
    }
}

fn valid_config() -> Config {
    let mut config = Config::default();
    config.backend.project_id = "plants".to_string();
    config
}

fn doc(id: &str, temperature: f64, seconds: i64) -> ReadingDocument {
    ReadingDocument {
        id: id.to_string(),
        temperature,
        humidity: 45.0,
        timestamp: Some(BackendTimestamp { seconds, nanos: 0 }),
    }
}

async fn wait_for(
    state_rx: &mut watch::Receiver<ViewState>,
    predicate: impl FnMut(&ViewState) -> bool,
) -> ViewState {
    tokio::time::timeout(Duration::from_secs(2), state_rx.wait_for(predicate))
        .await
        .expect("timed out waiting for view state")
        .expect("state channel closed")
        .clone()
}

#[tokio::test]
async fn test_missing_configuration_is_terminal() {
    let auth = Arc::new(StubAuthBackend::new());
    let data = Arc::new(StubDataBackend::new());
    let session = DashboardSession::new(
        Config::default(),
        Arc::clone(&auth) as Arc<dyn AuthBackend>,
        Arc::clone(&data) as Arc<dyn DataBackend>,
    );
    let state_rx = session.state_receiver();

    let result = session.run().await;

    assert!(matches!(result, Err(DashboardError::MissingConfiguration)));
    let state = state_rx.borrow().clone();
    assert!(!state.is_loading);
    assert!(state.window.is_empty());
    assert_eq!(
        state.error.as_deref(),
        Some("Backend configuration not found or empty")
    );
    assert_eq!(state.render_mode(), RenderMode::Error);
    // Nothing was attempted against either collaborator.
    assert_eq!(auth.anonymous_calls.load(Ordering::SeqCst), 0);
    assert_eq!(data.subscribe_count(), 0);
}

#[tokio::test]
async fn test_anonymous_sign_in_then_live_data() {
    let auth = Arc::new(StubAuthBackend::new());
    let data = Arc::new(StubDataBackend::with_snapshots(vec![vec![
        doc("r2", 23.1, 200),
        doc("r1", 22.5, 100),
    ]]));
    let session = DashboardSession::new(
        valid_config(),
        Arc::clone(&auth) as Arc<dyn AuthBackend>,
        Arc::clone(&data) as Arc<dyn DataBackend>,
    );
    let mut state_rx = session.state_receiver();
    let run = tokio::spawn(session.run());

    let state = wait_for(&mut state_rx, |s| !s.window.is_empty()).await;

    assert_eq!(state.identity, Some(Identity::new("anon-1")));
    assert_eq!(state.window.len(), 2);
    assert_eq!(state.latest.as_ref().map(|r| r.id.as_str()), Some("r2"));
    assert!(!state.is_loading);
    assert_eq!(state.render_mode(), RenderMode::Dashboard);

    assert_eq!(auth.anonymous_calls.load(Ordering::SeqCst), 1);
    assert!(auth.token_calls.lock().unwrap().is_empty());
    let queries = data.queries.lock().unwrap().clone();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].collection, "sensorReadings");
    assert_eq!(queries[0].order_by, "timestamp");
    assert!(queries[0].descending);
    assert_eq!(queries[0].limit, 10);

    run.abort();
}

#[tokio::test]
async fn test_token_sign_in_is_preferred() {
    let auth = Arc::new(StubAuthBackend::new());
    let data = Arc::new(StubDataBackend::with_snapshots(vec![vec![doc(
        "r1", 22.5, 100,
    )]]));
    let mut config = valid_config();
    config.auth.credential_token = Some("tok-123".to_string());
    let session = DashboardSession::new(
        config,
        Arc::clone(&auth) as Arc<dyn AuthBackend>,
        Arc::clone(&data) as Arc<dyn DataBackend>,
    );
    let mut state_rx = session.state_receiver();
    let run = tokio::spawn(session.run());

    let state = wait_for(&mut state_rx, |s| !s.window.is_empty()).await;

    assert_eq!(state.identity, Some(Identity::new("user-tok-123")));
    assert_eq!(auth.anonymous_calls.load(Ordering::SeqCst), 0);
    assert_eq!(auth.token_calls.lock().unwrap().as_slice(), ["tok-123"]);

    run.abort();
}

#[tokio::test]
async fn test_sign_in_failure_is_terminal() {
    let auth = Arc::new(StubAuthBackend::failing());
    let data = Arc::new(StubDataBackend::new());
    let session = DashboardSession::new(
        valid_config(),
        Arc::clone(&auth) as Arc<dyn AuthBackend>,
        Arc::clone(&data) as Arc<dyn DataBackend>,
    );
    let state_rx = session.state_receiver();

    let result = tokio::time::timeout(Duration::from_secs(2), session.run())
        .await
        .expect("session should terminate");

    assert!(matches!(result, Err(DashboardError::Authentication(_))));
    let state = state_rx.borrow().clone();
    assert!(state.error.as_deref().is_some_and(|e| e.contains("rejected")));
    assert_eq!(state.render_mode(), RenderMode::Error);
    assert_eq!(data.subscribe_count(), 0);
}

#[tokio::test]
async fn test_subscribe_failure_keeps_session_alive() {
    let auth = Arc::new(StubAuthBackend::new());
    let data = Arc::new(StubDataBackend::failing());
    let session = DashboardSession::new(
        valid_config(),
        Arc::clone(&auth) as Arc<dyn AuthBackend>,
        Arc::clone(&data) as Arc<dyn DataBackend>,
    );
    let mut state_rx = session.state_receiver();
    let run = tokio::spawn(session.run());

    let state = wait_for(&mut state_rx, |s| s.error.is_some()).await;

    assert!(state
        .error
        .as_deref()
        .is_some_and(|e| e.contains("permission denied")));
    assert_eq!(state.render_mode(), RenderMode::Error);
    // The loop is still consuming events, not terminated.
    assert!(!run.is_finished());

    run.abort();
}

#[tokio::test]
async fn test_identity_change_resubscribes() {
    let auth = Arc::new(StubAuthBackend::new());
    let data = Arc::new(StubDataBackend::with_snapshots(vec![vec![doc(
        "r1", 22.5, 100,
    )]]));
    let session = DashboardSession::new(
        valid_config(),
        Arc::clone(&auth) as Arc<dyn AuthBackend>,
        Arc::clone(&data) as Arc<dyn DataBackend>,
    );
    let mut state_rx = session.state_receiver();
    let run = tokio::spawn(session.run());

    wait_for(&mut state_rx, |s| !s.window.is_empty()).await;

    // The auth collaborator reports a new principal mid-session.
    auth.push(SessionEvent::IdentityChanged(Some(Identity::new("user-2"))))
        .await;
    let state = wait_for(&mut state_rx, |s| {
        s.identity == Some(Identity::new("user-2"))
    })
    .await;

    assert_eq!(state.identity, Some(Identity::new("user-2")));
    assert_eq!(data.subscribe_count(), 2);
    assert_eq!(data.cancel_count(), 1);

    run.abort();
}

#[tokio::test]
async fn test_identity_revocation_deactivates() {
    let auth = Arc::new(StubAuthBackend::new());
    let data = Arc::new(StubDataBackend::with_snapshots(vec![vec![doc(
        "r1", 22.5, 100,
    )]]));
    let session = DashboardSession::new(
        valid_config(),
        Arc::clone(&auth) as Arc<dyn AuthBackend>,
        Arc::clone(&data) as Arc<dyn DataBackend>,
    );
    let mut state_rx = session.state_receiver();
    let run = tokio::spawn(session.run());

    wait_for(&mut state_rx, |s| s.identity.is_some()).await;

    auth.push(SessionEvent::IdentityChanged(None)).await;
    let state = wait_for(&mut state_rx, |s| s.identity.is_none()).await;

    assert!(state.identity.is_none());
    assert_eq!(data.cancel_count(), 1);
    // One sign-in happened at bootstrap; revocation does not retry it.
    assert_eq!(auth.anonymous_calls.load(Ordering::SeqCst), 1);

    run.abort();
}

#[tokio::test]
async fn test_empty_snapshot_keeps_latest_reading() {
    let auth = Arc::new(StubAuthBackend::new());
    let data = Arc::new(StubDataBackend::with_snapshots(vec![
        vec![doc("r1", 22.5, 100)],
        vec![],
    ]));
    let session = DashboardSession::new(
        valid_config(),
        Arc::clone(&auth) as Arc<dyn AuthBackend>,
        Arc::clone(&data) as Arc<dyn DataBackend>,
    );
    let mut state_rx = session.state_receiver();
    let run = tokio::spawn(session.run());

    let state = wait_for(&mut state_rx, |s| {
        !s.is_loading && s.window.is_empty() && s.latest.is_some()
    })
    .await;

    assert_eq!(state.latest.as_ref().map(|r| r.id.as_str()), Some("r1"));
    assert_eq!(state.render_mode(), RenderMode::Dashboard);

    run.abort();
}

#[tokio::test]
async fn test_feed_failure_keeps_displayed_data() {
    let auth = Arc::new(StubAuthBackend::new());
    let data = Arc::new(StubDataBackend::with_snapshots(vec![vec![doc(
        "r1", 22.5, 100,
    )]]));
    let session = DashboardSession::new(
        valid_config(),
        Arc::clone(&auth) as Arc<dyn AuthBackend>,
        Arc::clone(&data) as Arc<dyn DataBackend>,
    );
    let mut state_rx = session.state_receiver();
    let run = tokio::spawn(session.run());

    wait_for(&mut state_rx, |s| !s.window.is_empty()).await;

    auth.push(SessionEvent::SubscriptionError(
        "backend connection lost".to_string(),
    ))
    .await;
    let state = wait_for(&mut state_rx, |s| s.error.is_some()).await;

    assert_eq!(state.window.len(), 1);
    assert_eq!(state.error.as_deref(), Some("backend connection lost"));
    assert_eq!(state.render_mode(), RenderMode::Dashboard);
    assert!(!run.is_finished());

    run.abort();
}
