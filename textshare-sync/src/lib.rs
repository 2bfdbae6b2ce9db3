//! # textshare-sync: Document store with live queries
//!
//! Stores schemaless documents in named collections and pushes the full
//! result set of a query to every subscriber whenever a write touches the
//! queried collection.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     WebSocket       ┌─────────────┐
//! │ RemoteStore │ ◄─────────────────► │ StoreServer │
//! │ (per app)   │     Binary Proto    │ (central)   │
//! └─────────────┘                     └──────┬──────┘
//!                                            │
//!                                     ┌──────┴──────┐
//!                                     │ LocalStore  │
//!                                     └──────┬──────┘
//!                                ┌───────────┴───────────┐
//!                                ▼                       ▼
//!                         ┌─────────────┐         ┌─────────────┐
//!                         │ Backend     │         │ ChangeFeed  │
//!                         │ (mem/Rocks) │         │ (fan-out)   │
//!                         └─────────────┘         └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`store`]: The `DocumentStore` trait and the in-process `LocalStore`
//! - [`subscription`]: Live query handles released on drop
//! - [`broadcast`]: Per-collection change fan-out
//! - [`storage`]: Backends (in-memory, RocksDB behind the `rocksdb` feature)
//! - [`protocol`]: Binary wire protocol (bincode-encoded SyncMessage)
//! - [`server`]: WebSocket store server
//! - [`client`]: WebSocket store client

pub mod broadcast;
pub mod client;
pub mod protocol;
pub mod server;
pub mod storage;
pub mod store;
pub mod subscription;

// Re-exports for convenience
pub use broadcast::{ChangeEvent, ChangeFeed, ChangeKind, FeedManager, FeedStats};
pub use client::{ConnectionState, RemoteStore};
pub use protocol::{FailureKind, FailurePayload, MessageType, ProtocolError, SyncMessage};
pub use server::{ServerConfig, ServerStats, StoreServer};
pub use storage::{Backend, MemoryBackend, StoreError};
#[cfg(feature = "rocksdb")]
pub use storage::{RocksBackend, StoreConfig};
pub use store::{DocumentStore, LocalStore, StoreStats};
pub use subscription::{Snapshot, Subscription};
