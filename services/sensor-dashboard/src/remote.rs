//! Backend gateway adapter
//!
//! Implements the [`AuthBackend`] and [`DataBackend`] seams against a
//! backend gateway speaking line-delimited JSON. Requests carry a u64 id
//! and are correlated to responses through a pending map; unsolicited
//! events (identity state, snapshots, feed failures) are routed to the
//! session channels registered for them. Registration teardown goes through
//! an unbounded control channel so a [`SubscriptionHandle`] can detach from
//! any context, including drop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{AuthBackend, DataBackend, SubscriptionHandle};
use crate::config::BackendConfig;
use crate::error::{DashboardError, Result};
use crate::events::{Identity, SessionEvent};
use crate::io::{GatewayConnector, LineReader, TcpGatewayConnector};
use crate::readings::{ReadingDocument, ReadingQuery};

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
enum GatewayRequest {
    SignInAnonymously {
        id: u64,
    },
    SignInWithToken {
        id: u64,
        token: String,
    },
    #[serde(rename_all = "camelCase")]
    Subscribe {
        id: u64,
        collection: String,
        order_by: String,
        descending: bool,
        limit: usize,
    },
    Unsubscribe {
        id: u64,
        subscription: u64,
    },
}

#[derive(Debug, Deserialize)]
struct GatewayResponse {
    id: u64,
    #[serde(default)]
    identity: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
enum GatewayEvent {
    Identity {
        identity: Option<Identity>,
    },
    Snapshot {
        subscription: u64,
        docs: Vec<ReadingDocument>,
    },
    #[serde(rename_all = "camelCase")]
    SubscriptionError {
        subscription: u64,
        message: String,
    },
}

// ============================================================================
// Shared connection state
// ============================================================================

#[derive(Default)]
struct GatewayRoutes {
    identity_watchers: HashMap<u64, mpsc::Sender<SessionEvent>>,
    subscriptions: HashMap<u64, mpsc::Sender<SessionEvent>>,
    /// Whether any identity event has arrived yet; used to replay the
    /// current state to late watchers.
    identity_seen: bool,
    last_identity: Option<Identity>,
}

#[derive(Clone)]
struct SharedGatewayState {
    writer: Arc<Mutex<Option<Box<dyn crate::io::MessageWriter>>>>,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<GatewayResponse>>>>,
    routes: Arc<Mutex<GatewayRoutes>>,
    connected: Arc<RwLock<bool>>,
}

impl SharedGatewayState {
    fn new() -> Self {
        Self {
            writer: Arc::new(Mutex::new(None)),
            pending: Arc::new(Mutex::new(HashMap::new())),
            routes: Arc::new(Mutex::new(GatewayRoutes::default())),
            connected: Arc::new(RwLock::new(false)),
        }
    }
}

enum ControlMessage {
    DropIdentityWatcher { watcher: u64 },
    Unsubscribe { subscription: u64 },
}

// ============================================================================
// Gateway client
// ============================================================================

/// Client for one backend gateway connection
pub struct RemoteGateway {
    config: BackendConfig,
    connector: Arc<dyn GatewayConnector>,
    shared: SharedGatewayState,
    request_id: Arc<AtomicU64>,
    control_tx: mpsc::UnboundedSender<ControlMessage>,
    control_rx: Mutex<Option<mpsc::UnboundedReceiver<ControlMessage>>>,
    reader_handle: Mutex<Option<JoinHandle<()>>>,
    control_handle: Mutex<Option<JoinHandle<()>>>,
}

impl RemoteGateway {
    /// Create a gateway client using TCP transport
    pub fn new(config: BackendConfig) -> Self {
        Self::with_connector(config, Arc::new(TcpGatewayConnector::new()))
    }

    /// Create a gateway client with a custom connector (used by tests)
    pub fn with_connector(config: BackendConfig, connector: Arc<dyn GatewayConnector>) -> Self {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        Self {
            config,
            connector,
            shared: SharedGatewayState::new(),
            request_id: Arc::new(AtomicU64::new(1)),
            control_tx,
            control_rx: Mutex::new(Some(control_rx)),
            reader_handle: Mutex::new(None),
            control_handle: Mutex::new(None),
        }
    }

    /// Establish the gateway connection and start the reader task.
    ///
    /// Connecting twice is a no-op; one connection per session.
    pub async fn connect(&self) -> Result<()> {
        if *self.shared.connected.read().await {
            debug!("gateway already connected");
            return Ok(());
        }

        let addr = format!("{}:{}", self.config.host, self.config.port);
        let timeout = Duration::from_secs(self.config.connection_timeout_seconds);
        let connection = self.connector.connect(&addr, timeout).await?;

        {
            let mut writer = self.shared.writer.lock().await;
            *writer = Some(connection.writer);
        }
        *self.shared.connected.write().await = true;

        let reader_task = spawn_reader_task(connection.reader, self.shared.clone());
        *self.reader_handle.lock().await = Some(reader_task);

        if let Some(control_rx) = self.control_rx.lock().await.take() {
            let control_task = spawn_control_task(
                control_rx,
                self.shared.clone(),
                Arc::clone(&self.request_id),
            );
            *self.control_handle.lock().await = Some(control_task);
        }

        info!("connected to backend gateway at {}", addr);
        Ok(())
    }

    /// Tear down the connection and release every registration
    pub async fn disconnect(&self) -> Result<()> {
        debug!("disconnecting from backend gateway");

        if let Some(handle) = self.reader_handle.lock().await.take() {
            handle.abort();
        }
        if let Some(handle) = self.control_handle.lock().await.take() {
            handle.abort();
        }
        if let Some(mut writer) = self.shared.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        *self.shared.connected.write().await = false;
        self.shared.pending.lock().await.clear();

        let mut routes = self.shared.routes.lock().await;
        routes.identity_watchers.clear();
        routes.subscriptions.clear();
        Ok(())
    }

    pub async fn is_connected(&self) -> bool {
        *self.shared.connected.read().await
    }

    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::SeqCst)
    }

    async fn request(&self, request: &GatewayRequest, id: u64) -> Result<GatewayResponse> {
        if !*self.shared.connected.read().await {
            return Err(DashboardError::NotConnected);
        }

        let json = serde_json::to_string(request)?;
        debug!("sending gateway request: {}", json);

        let (sender, receiver) = oneshot::channel();
        self.shared.pending.lock().await.insert(id, sender);

        let write_result = {
            let mut writer = self.shared.writer.lock().await;
            match writer.as_mut() {
                Some(writer) => writer.write_message(&json).await,
                None => Err(DashboardError::NotConnected),
            }
        };
        if let Err(e) = write_result {
            self.shared.pending.lock().await.remove(&id);
            return Err(e);
        }

        let timeout = Duration::from_secs(self.config.request_timeout_seconds);
        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(DashboardError::ReceiveError),
            Err(_) => {
                self.shared.pending.lock().await.remove(&id);
                Err(DashboardError::Timeout(format!(
                    "gateway request {} timed out",
                    id
                )))
            }
        }
    }
}

#[async_trait]
impl AuthBackend for RemoteGateway {
    async fn sign_in_anonymously(&self) -> Result<Identity> {
        let id = self.next_id();
        let response = self
            .request(&GatewayRequest::SignInAnonymously { id }, id)
            .await?;
        if let Some(message) = response.error {
            return Err(DashboardError::Authentication(message));
        }
        response
            .identity
            .map(Identity::new)
            .ok_or(DashboardError::ReceiveError)
    }

    async fn sign_in_with_token(&self, token: &str) -> Result<Identity> {
        let id = self.next_id();
        let response = self
            .request(
                &GatewayRequest::SignInWithToken {
                    id,
                    token: token.to_string(),
                },
                id,
            )
            .await?;
        if let Some(message) = response.error {
            return Err(DashboardError::Authentication(message));
        }
        response
            .identity
            .map(Identity::new)
            .ok_or(DashboardError::ReceiveError)
    }

    async fn watch_identity(&self, events: mpsc::Sender<SessionEvent>) -> SubscriptionHandle {
        let watcher = self.next_id();
        let (seen, last_identity) = {
            let mut routes = self.shared.routes.lock().await;
            routes.identity_watchers.insert(watcher, events.clone());
            (routes.identity_seen, routes.last_identity.clone())
        };

        // Late watchers get the current identity state replayed so none of
        // them can miss the initial notification.
        if seen {
            let _ = events
                .send(SessionEvent::IdentityChanged(last_identity))
                .await;
        }

        let control = self.control_tx.clone();
        SubscriptionHandle::new(move || {
            let _ = control.send(ControlMessage::DropIdentityWatcher { watcher });
        })
    }
}

#[async_trait]
impl DataBackend for RemoteGateway {
    async fn subscribe(
        &self,
        query: &ReadingQuery,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<SubscriptionHandle> {
        let id = self.next_id();

        // Register the route before the request goes out so the initial
        // snapshot cannot race past it.
        self.shared
            .routes
            .lock()
            .await
            .subscriptions
            .insert(id, events);

        let request = GatewayRequest::Subscribe {
            id,
            collection: query.collection.clone(),
            order_by: query.order_by.clone(),
            descending: query.descending,
            limit: query.limit,
        };

        match self.request(&request, id).await {
            Ok(response) => {
                if let Some(message) = response.error {
                    self.shared.routes.lock().await.subscriptions.remove(&id);
                    return Err(DashboardError::Subscription(message));
                }
                info!(
                    "live subscription {} opened on {} (limit {})",
                    id, query.collection, query.limit
                );
                let control = self.control_tx.clone();
                Ok(SubscriptionHandle::new(move || {
                    let _ = control.send(ControlMessage::Unsubscribe { subscription: id });
                }))
            }
            Err(e) => {
                self.shared.routes.lock().await.subscriptions.remove(&id);
                Err(e)
            }
        }
    }
}

// ============================================================================
// Background tasks
// ============================================================================

fn spawn_reader_task(
    mut reader: Box<dyn LineReader>,
    shared: SharedGatewayState,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let disconnect_reason;

        loop {
            match reader.read_line().await {
                Ok(None) => {
                    disconnect_reason = "connection closed by gateway".to_string();
                    break;
                }
                Ok(Some(line)) => {
                    if line.is_empty() {
                        continue;
                    }
                    debug!("received from gateway: {}", line);

                    // Responses carry an id; everything else is an event.
                    if let Ok(response) = serde_json::from_str::<GatewayResponse>(&line) {
                        let mut pending = shared.pending.lock().await;
                        if let Some(sender) = pending.remove(&response.id) {
                            let _ = sender.send(response);
                        }
                    } else if let Ok(event) = serde_json::from_str::<GatewayEvent>(&line) {
                        dispatch_event(event, &shared).await;
                    } else {
                        debug!("unrecognized gateway message: {}", line);
                    }
                }
                Err(e) => {
                    disconnect_reason = format!("read error: {}", e);
                    break;
                }
            }
        }

        *shared.connected.write().await = false;
        warn!("gateway connection lost: {}", disconnect_reason);

        // Surface the loss on every live feed; displayed data stays put on
        // the session side.
        let targets: Vec<_> = {
            let routes = shared.routes.lock().await;
            routes.subscriptions.values().cloned().collect()
        };
        for sender in targets {
            let _ = sender
                .send(SessionEvent::SubscriptionError(format!(
                    "backend connection lost: {}",
                    disconnect_reason
                )))
                .await;
        }

        shared.pending.lock().await.clear();
        if let Some(mut writer) = shared.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
    })
}

async fn dispatch_event(event: GatewayEvent, shared: &SharedGatewayState) {
    match event {
        GatewayEvent::Identity { identity } => {
            let watchers: Vec<_> = {
                let mut routes = shared.routes.lock().await;
                routes.identity_seen = true;
                routes.last_identity = identity.clone();
                routes.identity_watchers.values().cloned().collect()
            };
            for sender in watchers {
                let _ = sender
                    .send(SessionEvent::IdentityChanged(identity.clone()))
                    .await;
            }
        }
        GatewayEvent::Snapshot { subscription, docs } => {
            let target = {
                let routes = shared.routes.lock().await;
                routes.subscriptions.get(&subscription).cloned()
            };
            match target {
                Some(sender) => {
                    let _ = sender.send(SessionEvent::Snapshot(docs)).await;
                }
                None => debug!("snapshot for unknown subscription {}", subscription),
            }
        }
        GatewayEvent::SubscriptionError {
            subscription,
            message,
        } => {
            let target = {
                let routes = shared.routes.lock().await;
                routes.subscriptions.get(&subscription).cloned()
            };
            if let Some(sender) = target {
                let _ = sender.send(SessionEvent::SubscriptionError(message)).await;
            }
        }
    }
}

fn spawn_control_task(
    mut control_rx: mpsc::UnboundedReceiver<ControlMessage>,
    shared: SharedGatewayState,
    request_id: Arc<AtomicU64>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = control_rx.recv().await {
            match message {
                ControlMessage::DropIdentityWatcher { watcher } => {
                    shared.routes.lock().await.identity_watchers.remove(&watcher);
                    debug!("identity watcher {} detached", watcher);
                }
                ControlMessage::Unsubscribe { subscription } => {
                    shared.routes.lock().await.subscriptions.remove(&subscription);
                    debug!("subscription {} detached", subscription);

                    let id = request_id.fetch_add(1, Ordering::SeqCst);
                    let request = GatewayRequest::Unsubscribe { id, subscription };
                    if let Ok(json) = serde_json::to_string(&request) {
                        let mut writer = shared.writer.lock().await;
                        if let Some(writer) = writer.as_mut() {
                            if let Err(e) = writer.write_message(&json).await {
                                debug!("failed to send unsubscribe: {}", e);
                            }
                        }
                    }
                }
            }
        }
    })
}
