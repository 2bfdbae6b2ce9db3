//! WebSocket store server exposing a [`LocalStore`] to remote clients.
//!
//! Architecture:
//! ```text
//! Client A ──┐                     ┌── Backend (memory | RocksDB)
//!             ├── Connection ──────┤
//! Client B ──┘   (request loop)    └── LocalStore ── ChangeFeed(collection)
//!                     ▲                                   │
//!                     │ outgoing queue                    ▼
//!                     └──────────── forwarder task ◄── Subscription
//! ```
//!
//! Each connection owns:
//! - An outgoing queue that serializes acks and snapshots onto the socket
//! - One forwarder task per live query, keyed by subscription id
//!
//! A subscription is acknowledged before its forwarder starts, so the
//! client always sees the `Ack` before the first `Snapshot`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use textshare_core::Document;

use crate::protocol::{FailurePayload, MessageType, SyncMessage};
use crate::storage::{Backend, MemoryBackend, StoreError};
use crate::store::{DocumentStore, LocalStore};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Change-feed capacity per collection
    pub broadcast_capacity: usize,
    /// Maximum live queries a single connection may hold
    pub max_subscriptions_per_connection: usize,
    /// Persistence storage path (None = in-memory only)
    pub storage_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9090".to_string(),
            broadcast_capacity: 256,
            max_subscriptions_per_connection: 64,
            storage_path: None,
        }
    }
}

/// Server statistics.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_messages: u64,
    pub total_bytes: u64,
    pub failed_requests: u64,
}

/// The store server.
pub struct StoreServer {
    config: ServerConfig,
    store: Arc<LocalStore>,
    stats: Arc<RwLock<ServerStats>>,
}

impl StoreServer {
    /// Create a server, opening the configured backend.
    pub fn new(config: ServerConfig) -> Result<Self, StoreError> {
        let backend = open_backend(&config)?;
        let store = Arc::new(LocalStore::new(backend, config.broadcast_capacity));
        Ok(Self::with_store(config, store))
    }

    /// Serve an existing store.
    pub fn with_store(config: ServerConfig, store: Arc<LocalStore>) -> Self {
        Self {
            config,
            store,
            stats: Arc::new(RwLock::new(ServerStats::default())),
        }
    }

    /// Create with default configuration (in-memory, no persistence).
    pub fn with_defaults() -> Self {
        let config = ServerConfig::default();
        let store = Arc::new(LocalStore::new(
            Arc::new(MemoryBackend::new()),
            config.broadcast_capacity,
        ));
        Self::with_store(config, store)
    }

    /// Bind the configured address and serve until the listener fails.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), Box<dyn std::error::Error>> {
        log::info!("Store server listening on {}", listener.local_addr()?);

        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("New TCP connection from {addr}");

            let store = self.store.clone();
            let stats = self.stats.clone();
            let max_subscriptions = self.config.max_subscriptions_per_connection;

            tokio::spawn(async move {
                if let Err(e) =
                    Self::handle_connection(stream, addr, store, stats, max_subscriptions).await
                {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        }
    }

    /// Handle a single WebSocket connection.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        store: Arc<LocalStore>,
        stats: Arc<RwLock<ServerStats>>,
        max_subscriptions: usize,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        log::info!("WebSocket connection established from {addr}");

        {
            let mut s = stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<SyncMessage>();
        let mut connection = Connection {
            addr,
            store,
            out: out_tx,
            forwarders: HashMap::new(),
            max_subscriptions,
        };

        let result = async {
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Binary(data))) => {
                                {
                                    let mut s = stats.write().await;
                                    s.total_messages += 1;
                                    s.total_bytes += data.len() as u64;
                                }
                                match SyncMessage::decode(&data) {
                                    Ok(request) => {
                                        if !connection.handle(request).await {
                                            stats.write().await.failed_requests += 1;
                                        }
                                    }
                                    Err(e) => {
                                        log::warn!("Failed to decode message from {addr}: {e}");
                                    }
                                }
                            }

                            Some(Ok(Message::Close(_))) | None => {
                                log::info!("Connection closed from {addr}");
                                break;
                            }

                            Some(Ok(Message::Ping(data))) => {
                                ws_sender.send(Message::Pong(data)).await?;
                            }

                            Some(Err(e)) => {
                                log::error!("WebSocket error from {addr}: {e}");
                                break;
                            }

                            _ => {}
                        }
                    }

                    Some(outgoing) = out_rx.recv() => {
                        let encoded = outgoing.encode()?;
                        ws_sender.send(Message::Binary(encoded.into())).await?;
                    }
                }
            }
            Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
        }
        .await;

        connection.close();
        stats.write().await.active_connections -= 1;
        result
    }

    /// Get server statistics.
    pub async fn stats(&self) -> ServerStats {
        self.stats.read().await.clone()
    }

    /// Get the configured bind address.
    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    /// The store this server exposes.
    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }
}

#[cfg(feature = "rocksdb")]
fn open_backend(config: &ServerConfig) -> Result<Arc<dyn Backend>, StoreError> {
    use crate::storage::{RocksBackend, StoreConfig};

    match &config.storage_path {
        Some(path) => {
            let store_config = StoreConfig {
                path: path.clone(),
                ..StoreConfig::default()
            };
            Ok(Arc::new(RocksBackend::open(store_config)?))
        }
        None => Ok(Arc::new(MemoryBackend::new())),
    }
}

#[cfg(not(feature = "rocksdb"))]
fn open_backend(config: &ServerConfig) -> Result<Arc<dyn Backend>, StoreError> {
    if let Some(path) = &config.storage_path {
        log::warn!(
            "Storage path {} ignored: built without the rocksdb feature",
            path.display()
        );
    }
    Ok(Arc::new(MemoryBackend::new()))
}

/// Per-connection request state.
struct Connection {
    addr: SocketAddr,
    store: Arc<LocalStore>,
    out: mpsc::UnboundedSender<SyncMessage>,
    forwarders: HashMap<u64, JoinHandle<()>>,
    max_subscriptions: usize,
}

impl Connection {
    /// Handle one request. Returns false if it was answered with a failure.
    async fn handle(&mut self, request: SyncMessage) -> bool {
        let request_id = request.request_id;
        let outcome = match request.msg_type {
            MessageType::Add | MessageType::Update | MessageType::Delete => {
                self.execute(&request).await.map(Some)
            }
            MessageType::Subscribe => self.subscribe(&request).await.map(|_| None),
            MessageType::Unsubscribe => {
                if let Some(handle) = self.forwarders.remove(&request_id) {
                    handle.abort();
                    log::debug!("Subscription {request_id} from {} closed", self.addr);
                }
                return true;
            }
            MessageType::Ping => {
                self.push(SyncMessage::pong(request_id));
                return true;
            }
            other => {
                log::debug!("Unhandled message type from {}: {other:?}", self.addr);
                return true;
            }
        };

        let ok = outcome.is_ok();
        let reply = match outcome {
            // Subscribe acks are sent before the forwarder starts
            Ok(None) => return true,
            Ok(Some(document)) => SyncMessage::ack(request_id, document.as_ref()),
            Err(e) => {
                log::debug!("Request {request_id} from {} failed: {e}", self.addr);
                SyncMessage::failure(request_id, &FailurePayload::from(&e))
            }
        };
        match reply {
            Ok(msg) => self.push(msg),
            Err(e) => log::error!("Failed to encode reply to {}: {e}", self.addr),
        }
        ok
    }

    async fn execute(&self, request: &SyncMessage) -> Result<Option<Document>, StoreError> {
        match request.msg_type {
            MessageType::Add => {
                let p = request.add_payload().map_err(malformed)?;
                self.store.add(&p.collection, p.fields).await.map(Some)
            }
            MessageType::Update => {
                let p = request.update_payload().map_err(malformed)?;
                self.store.update(&p.collection, p.id, p.fields).await.map(Some)
            }
            MessageType::Delete => {
                let p = request.delete_payload().map_err(malformed)?;
                self.store.delete(&p.collection, p.id).await.map(|_| None)
            }
            other => Err(StoreError::Rejected(format!("{other:?} is not a write"))),
        }
    }

    async fn subscribe(&mut self, request: &SyncMessage) -> Result<(), StoreError> {
        let subscription_id = request.request_id;
        self.forwarders.retain(|_, handle| !handle.is_finished());

        if self.forwarders.contains_key(&subscription_id) {
            return Err(StoreError::Rejected(format!(
                "subscription {subscription_id} already open"
            )));
        }
        if self.forwarders.len() >= self.max_subscriptions {
            return Err(StoreError::Rejected(format!(
                "subscription limit of {} reached",
                self.max_subscriptions
            )));
        }

        let query = request.query().map_err(malformed)?;
        let mut subscription = self.store.subscribe(query).await?;

        self.push(SyncMessage::ack(subscription_id, None)?);

        let out = self.out.clone();
        let handle = tokio::spawn(async move {
            while let Some(snapshot) = subscription.next().await {
                match SyncMessage::snapshot(subscription_id, &snapshot) {
                    Ok(msg) => {
                        if out.send(msg).is_err() {
                            break;
                        }
                    }
                    Err(e) => log::error!("Failed to encode snapshot: {e}"),
                }
            }
        });
        self.forwarders.insert(subscription_id, handle);
        log::debug!("Subscription {subscription_id} from {} opened", self.addr);
        Ok(())
    }

    fn push(&self, msg: SyncMessage) {
        // Only fails once the connection loop is gone
        let _ = self.out.send(msg);
    }

    /// Abort every forwarder; each drops its subscription.
    fn close(&mut self) {
        let count = self.forwarders.len();
        for (_, handle) in self.forwarders.drain() {
            handle.abort();
        }
        if count > 0 {
            log::debug!("Released {count} subscriptions of {}", self.addr);
        }
    }
}

fn malformed(e: crate::protocol::ProtocolError) -> StoreError {
    StoreError::Rejected(format!("malformed request: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use textshare_core::{TextRecord, TextStatus};
    use tokio::time::{timeout, Duration};
    use tokio_tungstenite::connect_async;

    async fn spawn_server(config: ServerConfig) -> (Arc<StoreServer>, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let server = Arc::new(StoreServer::with_store(
            config,
            Arc::new(LocalStore::in_memory()),
        ));
        let running = server.clone();
        tokio::spawn(async move {
            let _ = running.serve(listener).await;
        });
        (server, url)
    }

    async fn recv(
        ws: &mut tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<TcpStream>,
        >,
    ) -> SyncMessage {
        loop {
            let msg = timeout(Duration::from_secs(2), ws.next())
                .await
                .expect("reply within timeout")
                .expect("stream open")
                .expect("no socket error");
            if let Message::Binary(data) = msg {
                return SyncMessage::decode(&data).unwrap();
            }
        }
    }

    async fn send(
        ws: &mut tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<TcpStream>,
        >,
        msg: SyncMessage,
    ) {
        ws.send(Message::Binary(msg.encode().unwrap().into()))
            .await
            .unwrap();
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:9090");
        assert_eq!(config.broadcast_capacity, 256);
        assert_eq!(config.max_subscriptions_per_connection, 64);
        assert!(config.storage_path.is_none());
    }

    #[test]
    fn test_server_creation() {
        let server = StoreServer::new(ServerConfig {
            bind_addr: "0.0.0.0:8080".to_string(),
            ..ServerConfig::default()
        })
        .unwrap();
        assert_eq!(server.bind_addr(), "0.0.0.0:8080");
        assert_eq!(server.store().active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_server_stats_initial() {
        let server = StoreServer::with_defaults();
        let stats = server.stats().await;
        assert_eq!(stats.total_connections, 0);
        assert_eq!(stats.active_connections, 0);
        assert_eq!(stats.total_messages, 0);
        assert_eq!(stats.failed_requests, 0);
    }

    #[tokio::test]
    async fn test_ping_pong_and_garbage() {
        let (_server, url) = spawn_server(ServerConfig::default()).await;
        let (mut ws, _) = connect_async(&url).await.unwrap();

        // Undecodable frames are logged and skipped
        ws.send(Message::Binary(vec![0xFF, 0xFE].into())).await.unwrap();
        send(&mut ws, SyncMessage::ping(5)).await;

        let reply = recv(&mut ws).await;
        assert_eq!(reply.msg_type, MessageType::Pong);
        assert_eq!(reply.request_id, 5);
    }

    #[tokio::test]
    async fn test_ack_precedes_first_snapshot() {
        let (_server, url) = spawn_server(ServerConfig::default()).await;
        let (mut ws, _) = connect_async(&url).await.unwrap();

        send(&mut ws, SyncMessage::subscribe(1, &TextRecord::query(None)).unwrap()).await;
        let ack = recv(&mut ws).await;
        assert_eq!(ack.msg_type, MessageType::Ack);
        let snapshot = recv(&mut ws).await;
        assert_eq!(snapshot.msg_type, MessageType::Snapshot);
        assert_eq!(snapshot.request_id, 1);
        assert!(snapshot.snapshot_payload().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_subscription_limit() {
        let config = ServerConfig {
            max_subscriptions_per_connection: 1,
            ..ServerConfig::default()
        };
        let (server, url) = spawn_server(config).await;
        let (mut ws, _) = connect_async(&url).await.unwrap();

        send(&mut ws, SyncMessage::subscribe(1, &TextRecord::query(None)).unwrap()).await;
        assert_eq!(recv(&mut ws).await.msg_type, MessageType::Ack);
        assert_eq!(recv(&mut ws).await.msg_type, MessageType::Snapshot);

        let query = TextRecord::query(Some(TextStatus::Draft));
        send(&mut ws, SyncMessage::subscribe(2, &query).unwrap()).await;
        let reply = recv(&mut ws).await;
        assert_eq!(reply.msg_type, MessageType::Failure);
        assert_eq!(reply.request_id, 2);
        assert!(matches!(
            StoreError::from(reply.failure_payload().unwrap()),
            StoreError::Rejected(_)
        ));
        assert_eq!(server.stats().await.failed_requests, 1);
    }

    #[tokio::test]
    async fn test_close_releases_subscriptions() {
        let (server, url) = spawn_server(ServerConfig::default()).await;
        let (mut ws, _) = connect_async(&url).await.unwrap();

        send(&mut ws, SyncMessage::subscribe(1, &TextRecord::query(None)).unwrap()).await;
        recv(&mut ws).await;
        assert_eq!(server.store().active_subscriptions(), 1);

        ws.close(None).await.unwrap();
        timeout(Duration::from_secs(2), async {
            while server.store().active_subscriptions() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("subscription released after close");
    }
}
