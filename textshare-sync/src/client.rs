//! WebSocket client for a remote [`StoreServer`](crate::server::StoreServer).
//!
//! Provides:
//! - Connection lifecycle (connect, disconnect)
//! - Request/reply correlation by `request_id`, with a timeout
//! - Live queries whose snapshots are pushed by the server
//!
//! Every failure to reach the server surfaces as
//! [`StoreError::Unavailable`], which callers may retry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot, watch, RwLock};
use tokio_tungstenite::tungstenite::Message;

use textshare_core::{Document, DocumentId, Fields, Query};

use crate::protocol::{MessageType, SyncMessage};
use crate::storage::StoreError;
use crate::store::DocumentStore;
use crate::subscription::{Snapshot, Subscription};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<SyncMessage>>>>;
type Watches = Arc<Mutex<HashMap<u64, watch::Sender<Snapshot>>>>;
type Outgoing = Arc<Mutex<Option<mpsc::Sender<Vec<u8>>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Document store reached over the network.
pub struct RemoteStore {
    server_url: String,
    state: Arc<RwLock<ConnectionState>>,
    /// Channel to the WebSocket writer task; `None` while disconnected
    outgoing: Outgoing,
    /// Requests awaiting an `Ack`, `Failure` or `Pong`
    pending: Pending,
    /// Live queries by subscription id
    watches: Watches,
    next_request: AtomicU64,
    active_subscriptions: Arc<AtomicUsize>,
    request_timeout: Duration,
}

impl RemoteStore {
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

    /// Create a client. Nothing is sent until [`connect`](Self::connect).
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            outgoing: Arc::new(Mutex::new(None)),
            pending: Arc::new(Mutex::new(HashMap::new())),
            watches: Arc::new(Mutex::new(HashMap::new())),
            next_request: AtomicU64::new(1),
            active_subscriptions: Arc::new(AtomicUsize::new(0)),
            request_timeout: Self::DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// How long to wait for a reply before giving up.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Connect to the server.
    ///
    /// Spawns background tasks for reading/writing WebSocket messages.
    pub async fn connect(&self) -> Result<(), StoreError> {
        *self.state.write().await = ConnectionState::Connecting;

        let ws_stream = match tokio_tungstenite::connect_async(&self.server_url).await {
            Ok((ws_stream, _)) => ws_stream,
            Err(e) => {
                *self.state.write().await = ConnectionState::Disconnected;
                return Err(StoreError::Unavailable(format!(
                    "cannot reach {}: {e}",
                    self.server_url
                )));
            }
        };
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        // Writer task: forward outgoing channel to WebSocket
        let (out_tx, mut out_rx) = mpsc::channel::<Vec<u8>>(256);
        tokio::spawn(async move {
            while let Some(data) = out_rx.recv().await {
                if ws_writer.send(Message::Binary(data.into())).await.is_err() {
                    break;
                }
            }
            let _ = ws_writer.close().await;
        });
        *lock(&self.outgoing) = Some(out_tx);

        // Reader task: route replies and snapshots
        let state = self.state.clone();
        let outgoing = self.outgoing.clone();
        let pending = self.pending.clone();
        let watches = self.watches.clone();
        let url = self.server_url.clone();
        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Binary(data)) => match SyncMessage::decode(&data) {
                        Ok(sync_msg) => route(sync_msg, &pending, &watches),
                        Err(e) => log::warn!("Failed to decode message from {url}: {e}"),
                    },
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }

            // Connection lost: waiters see a closed channel, live queries end
            *state.write().await = ConnectionState::Disconnected;
            lock(&outgoing).take();
            lock(&pending).clear();
            lock(&watches).clear();
            log::info!("Disconnected from {url}");
        });

        *self.state.write().await = ConnectionState::Connected;
        log::info!("Connected to {}", self.server_url);
        Ok(())
    }

    /// Close the connection. Open subscriptions end.
    pub async fn disconnect(&self) {
        lock(&self.outgoing).take();
        *self.state.write().await = ConnectionState::Disconnected;
    }

    /// Round-trip a heartbeat.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let reply = self.round_trip(SyncMessage::ping(self.next_request_id())).await?;
        match reply.msg_type {
            MessageType::Pong => Ok(()),
            other => Err(StoreError::Backend(format!("unexpected reply {other:?}"))),
        }
    }

    /// Get the current connection state.
    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Get the server URL.
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Number of live subscriptions not yet released.
    pub fn active_subscriptions(&self) -> usize {
        self.active_subscriptions.load(Ordering::SeqCst)
    }

    fn next_request_id(&self) -> u64 {
        self.next_request.fetch_add(1, Ordering::SeqCst)
    }

    fn sender(&self) -> Result<mpsc::Sender<Vec<u8>>, StoreError> {
        lock(&self.outgoing)
            .clone()
            .ok_or_else(|| StoreError::Unavailable("not connected".into()))
    }

    /// Send a request and wait for the reply carrying its `request_id`.
    async fn round_trip(&self, msg: SyncMessage) -> Result<SyncMessage, StoreError> {
        let request_id = msg.request_id;
        let encoded = msg.encode()?;
        let tx = self.sender()?;

        let (reply_tx, reply_rx) = oneshot::channel();
        lock(&self.pending).insert(request_id, reply_tx);

        if tx.send(encoded).await.is_err() {
            lock(&self.pending).remove(&request_id);
            return Err(StoreError::Unavailable("connection closed".into()));
        }

        let reply = match tokio::time::timeout(self.request_timeout, reply_rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => {
                return Err(StoreError::Unavailable(
                    "connection lost before reply".into(),
                ))
            }
            Err(_) => {
                lock(&self.pending).remove(&request_id);
                return Err(StoreError::Unavailable(format!(
                    "no reply within {:?}",
                    self.request_timeout
                )));
            }
        };

        if reply.msg_type == MessageType::Failure {
            return Err(reply.failure_payload()?.into());
        }
        Ok(reply)
    }

    async fn write(&self, msg: SyncMessage) -> Result<Option<Document>, StoreError> {
        let reply = self.round_trip(msg).await?;
        Ok(reply.ack_document()?)
    }
}

/// Deliver one incoming message to whoever waits for it.
fn route(msg: SyncMessage, pending: &Pending, watches: &Watches) {
    match msg.msg_type {
        MessageType::Ack | MessageType::Failure | MessageType::Pong => {
            if let Some(waiter) = lock(pending).remove(&msg.request_id) {
                let _ = waiter.send(msg);
            }
        }
        MessageType::Snapshot => match msg.snapshot_payload() {
            Ok(snapshot) => {
                if let Some(tx) = lock(watches).get(&msg.request_id) {
                    tx.send_replace(snapshot);
                }
            }
            Err(e) => log::warn!("Dropping malformed snapshot: {e}"),
        },
        other => log::debug!("Unhandled message type: {other:?}"),
    }
}

/// Ask the server to stop a live query.
///
/// Runs from `Drop`, so it cannot wait; a full queue falls back to a
/// spawned send.
fn send_unsubscribe(outgoing: &Outgoing, id: u64) {
    let Some(tx) = lock(outgoing).clone() else {
        return;
    };
    let encoded = match SyncMessage::unsubscribe(id).encode() {
        Ok(encoded) => encoded,
        Err(e) => {
            log::error!("Failed to encode unsubscribe for {id}: {e}");
            return;
        }
    };
    match tx.try_send(encoded) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(encoded)) => {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        if tx.send(encoded).await.is_err() {
                            log::debug!("Unsubscribe for {id} not sent: connection closed");
                        }
                    });
                }
                Err(_) => log::warn!("Unsubscribe for {id} lost: outgoing queue full"),
            }
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            log::debug!("Unsubscribe for {id} not sent: connection closed");
        }
    }
}

impl DocumentStore for RemoteStore {
    async fn add(&self, collection: &str, fields: Fields) -> Result<Document, StoreError> {
        let msg = SyncMessage::add(self.next_request_id(), collection, fields)?;
        self.write(msg)
            .await?
            .ok_or_else(|| StoreError::Backend("add acknowledged without document".into()))
    }

    async fn update(
        &self,
        collection: &str,
        id: DocumentId,
        fields: Fields,
    ) -> Result<Document, StoreError> {
        let msg = SyncMessage::update(self.next_request_id(), collection, id, fields)?;
        self.write(msg)
            .await?
            .ok_or_else(|| StoreError::Backend("update acknowledged without document".into()))
    }

    async fn delete(&self, collection: &str, id: DocumentId) -> Result<(), StoreError> {
        let msg = SyncMessage::delete(self.next_request_id(), collection, id)?;
        self.write(msg).await.map(|_| ())
    }

    async fn subscribe(&self, query: Query) -> Result<Subscription, StoreError> {
        let id = self.next_request_id();
        let msg = SyncMessage::subscribe(id, &query)?;

        // Register before sending; the first snapshot follows the ack closely
        let (tx, rx) = watch::channel(Snapshot::default());
        lock(&self.watches).insert(id, tx);

        if let Err(e) = self.round_trip(msg).await {
            lock(&self.watches).remove(&id);
            // The server may still open it after a timeout
            if e.is_transient() {
                send_unsubscribe(&self.outgoing, id);
            }
            return Err(e);
        }

        let watches = self.watches.clone();
        let outgoing = self.outgoing.clone();
        let active = self.active_subscriptions.clone();
        active.fetch_add(1, Ordering::SeqCst);
        log::debug!("Subscription {id} opened on '{}'", query.collection);

        Ok(Subscription::new(id, query, rx, move || {
            lock(&watches).remove(&id);
            send_unsubscribe(&outgoing, id);
            active.fetch_sub(1, Ordering::SeqCst);
            log::debug!("Subscription {id} released");
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use textshare_core::TextRecord;
    use tokio::time::timeout;

    #[test]
    fn test_client_creation() {
        let client = RemoteStore::new("ws://localhost:9090");
        assert_eq!(client.server_url(), "ws://localhost:9090");
        assert_eq!(client.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_client_initial_state() {
        let client = RemoteStore::new("ws://localhost:9090");
        assert_eq!(client.connection_state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_requests_while_disconnected_are_transient() {
        let client = RemoteStore::new("ws://localhost:9090");

        let err = client.add("texts", Fields::new()).await.unwrap_err();
        assert!(err.is_transient());

        let err = client.delete("texts", DocumentId::new()).await.unwrap_err();
        assert!(err.is_transient());

        let err = client.subscribe(TextRecord::query(None)).await.unwrap_err();
        assert!(err.is_transient());
        // A failed subscribe leaves nothing registered
        assert!(lock(&client.watches).is_empty());
        assert_eq!(client.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_connect_to_unreachable_server() {
        let client = RemoteStore::new("ws://127.0.0.1:1");
        let err = client.connect().await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(client.connection_state().await, ConnectionState::Disconnected);
    }

    #[test]
    fn test_route_snapshot_to_watch() {
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let watches: Watches = Arc::new(Mutex::new(HashMap::new()));
        let (tx, rx) = watch::channel(Snapshot::default());
        lock(&watches).insert(4, tx);

        let snapshot = Snapshot::new(3, Vec::new());
        route(SyncMessage::snapshot(4, &snapshot).unwrap(), &pending, &watches);
        assert_eq!(rx.borrow().version, 3);

        // Snapshots for unknown subscriptions are ignored
        route(SyncMessage::snapshot(9, &snapshot).unwrap(), &pending, &watches);
    }

    #[tokio::test]
    async fn test_unsubscribe_survives_full_queue() {
        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(1);
        let outgoing: Outgoing = Arc::new(Mutex::new(Some(tx)));
        lock(&outgoing)
            .as_ref()
            .unwrap()
            .try_send(SyncMessage::ping(1).encode().unwrap())
            .unwrap();

        send_unsubscribe(&outgoing, 5);

        let first = SyncMessage::decode(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(first.msg_type, MessageType::Ping);
        let second = timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let second = SyncMessage::decode(&second).unwrap();
        assert_eq!(second.msg_type, MessageType::Unsubscribe);
        assert_eq!(second.request_id, 5);
    }

    #[tokio::test]
    async fn test_timed_out_subscribe_is_withdrawn() {
        // A server that accepts frames and never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            while let Some(Ok(Message::Binary(data))) = ws.next().await {
                let _ = seen_tx.send(SyncMessage::decode(&data).unwrap());
            }
        });

        let client = RemoteStore::new(url).with_request_timeout(Duration::from_millis(100));
        client.connect().await.unwrap();
        let err = client.subscribe(TextRecord::query(None)).await.unwrap_err();
        assert!(err.is_transient());
        assert!(lock(&client.watches).is_empty());

        let subscribe = timeout(Duration::from_secs(2), seen_rx.recv()).await.unwrap().unwrap();
        assert_eq!(subscribe.msg_type, MessageType::Subscribe);
        let withdrawn = timeout(Duration::from_secs(2), seen_rx.recv()).await.unwrap().unwrap();
        assert_eq!(withdrawn.msg_type, MessageType::Unsubscribe);
        assert_eq!(withdrawn.request_id, subscribe.request_id);
    }

    #[test]
    fn test_route_reply_to_waiter() {
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let watches: Watches = Arc::new(Mutex::new(HashMap::new()));
        let (tx, mut rx) = oneshot::channel();
        lock(&pending).insert(7, tx);

        route(SyncMessage::pong(7), &pending, &watches);
        assert_eq!(rx.try_recv().unwrap().msg_type, MessageType::Pong);
        assert!(lock(&pending).is_empty());
    }
}
