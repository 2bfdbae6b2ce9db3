//! The document store interface and its in-process implementation.
//!
//! ```text
//!  add/update/delete ──► Backend ──► ChangeFeed(collection) ──┐
//!                                                             │ fan-out
//!        ┌────────────────────────────────────────────────────┤
//!        ▼                        ▼                           ▼
//!  live query task          live query task             live query task
//!  (re-run Query)           (re-run Query)              (re-run Query)
//!        │ watch                  │ watch                     │ watch
//!        ▼                        ▼                           ▼
//!   Subscription             Subscription                Subscription
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, watch};

use textshare_core::{Document, DocumentId, Fields, Query};

use crate::broadcast::{ChangeEvent, ChangeKind, FeedManager};
use crate::storage::{Backend, MemoryBackend, StoreError};
use crate::subscription::{Snapshot, Subscription};

/// A document database with live queries.
///
/// Implemented in-process by [`LocalStore`] and over the network by
/// [`RemoteStore`](crate::client::RemoteStore).
pub trait DocumentStore: Send + Sync {
    /// Insert a new document; the store assigns its id.
    fn add(
        &self,
        collection: &str,
        fields: Fields,
    ) -> impl Future<Output = Result<Document, StoreError>> + Send;

    /// Merge `fields` into an existing document.
    ///
    /// Fails with [`StoreError::NotFound`] if the document does not exist.
    fn update(
        &self,
        collection: &str,
        id: DocumentId,
        fields: Fields,
    ) -> impl Future<Output = Result<Document, StoreError>> + Send;

    /// Remove a document permanently.
    ///
    /// Fails with [`StoreError::NotFound`] if the document does not exist.
    fn delete(
        &self,
        collection: &str,
        id: DocumentId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Open a live query. The first snapshot is the full current result.
    fn subscribe(
        &self,
        query: Query,
    ) -> impl Future<Output = Result<Subscription, StoreError>> + Send;
}

/// Store statistics.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub writes: u64,
    pub active_subscriptions: usize,
    pub total_subscriptions: u64,
}

/// In-process document store over a pluggable backend.
pub struct LocalStore {
    backend: Arc<dyn Backend>,
    feeds: Arc<FeedManager>,
    /// Serializes writes so read-merge-write updates never interleave
    write_lock: Mutex<()>,
    sequence: AtomicU64,
    next_subscription: AtomicU64,
    active_subscriptions: Arc<AtomicUsize>,
}

impl LocalStore {
    /// Default change-feed capacity per collection.
    pub const DEFAULT_FEED_CAPACITY: usize = 256;

    pub fn new(backend: Arc<dyn Backend>, feed_capacity: usize) -> Self {
        Self {
            backend,
            feeds: Arc::new(FeedManager::new(feed_capacity)),
            write_lock: Mutex::new(()),
            sequence: AtomicU64::new(0),
            next_subscription: AtomicU64::new(1),
            active_subscriptions: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Store over a fresh [`MemoryBackend`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()), Self::DEFAULT_FEED_CAPACITY)
    }

    /// Number of live subscriptions not yet released.
    pub fn active_subscriptions(&self) -> usize {
        self.active_subscriptions.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            writes: self.sequence.load(Ordering::SeqCst),
            active_subscriptions: self.active_subscriptions(),
            total_subscriptions: self.next_subscription.load(Ordering::SeqCst) - 1,
        }
    }

    /// Run a query once against current state.
    pub fn query_once(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        Ok(query.apply(self.backend.scan(&query.collection)?))
    }

    /// Number of documents in a collection.
    pub fn count(&self, collection: &str) -> Result<usize, StoreError> {
        self.backend.count(collection)
    }

    fn lock_writes(&self) -> Result<std::sync::MutexGuard<'_, ()>, StoreError> {
        self.write_lock
            .lock()
            .map_err(|_| StoreError::Backend("write lock poisoned".into()))
    }

    async fn notify(&self, collection: &str, id: DocumentId, kind: ChangeKind) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(feed) = self.feeds.get(collection).await {
            let reached = feed.publish(ChangeEvent {
                collection: collection.to_string(),
                id,
                kind,
                sequence,
            });
            log::trace!("{kind:?} {collection}/{id} reached {reached} live queries");
        }
    }

    fn spawn_query_task(
        &self,
        query: Query,
        mut changes: broadcast::Receiver<Arc<ChangeEvent>>,
        tx: watch::Sender<Snapshot>,
        mut version: u64,
    ) -> tokio::task::JoinHandle<()> {
        let backend = self.backend.clone();
        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
                // Coalesce a burst of writes into one re-read
                loop {
                    match changes.try_recv() {
                        Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                        Err(_) => break,
                    }
                }

                let documents = match backend.scan(&query.collection) {
                    Ok(docs) => query.apply(docs),
                    Err(e) => {
                        log::error!("Live query on '{}' failed to read: {e}", query.collection);
                        continue;
                    }
                };

                if tx.borrow().documents == documents {
                    continue;
                }
                version += 1;
                if tx.send(Snapshot::new(version, documents)).is_err() {
                    break;
                }
            }
        })
    }
}

impl DocumentStore for LocalStore {
    async fn add(&self, collection: &str, fields: Fields) -> Result<Document, StoreError> {
        let doc = Document::new(DocumentId::new(), fields);
        {
            let _guard = self.lock_writes()?;
            self.backend.put(collection, &doc)?;
        }
        log::debug!("Added {collection}/{}", doc.id);
        self.notify(collection, doc.id, ChangeKind::Added).await;
        Ok(doc)
    }

    async fn update(
        &self,
        collection: &str,
        id: DocumentId,
        fields: Fields,
    ) -> Result<Document, StoreError> {
        let doc = {
            let _guard = self.lock_writes()?;
            let mut doc = self
                .backend
                .get(collection, id)?
                .ok_or_else(|| StoreError::not_found(collection, id))?;
            doc.merge(fields);
            self.backend.put(collection, &doc)?;
            doc
        };
        log::debug!("Updated {collection}/{id}");
        self.notify(collection, id, ChangeKind::Modified).await;
        Ok(doc)
    }

    async fn delete(&self, collection: &str, id: DocumentId) -> Result<(), StoreError> {
        {
            let _guard = self.lock_writes()?;
            self.backend
                .remove(collection, id)?
                .ok_or_else(|| StoreError::not_found(collection, id))?;
        }
        log::debug!("Deleted {collection}/{id}");
        self.notify(collection, id, ChangeKind::Removed).await;
        Ok(())
    }

    async fn subscribe(&self, query: Query) -> Result<Subscription, StoreError> {
        // Listen before the initial read so no write slips between them
        let changes = self.feeds.listen(&query.collection).await;
        let initial = match self.query_once(&query) {
            Ok(initial) => initial,
            Err(e) => {
                drop(changes);
                self.feeds.remove_if_idle(&query.collection).await;
                return Err(e);
            }
        };

        let (tx, rx) = watch::channel(Snapshot::default());
        tx.send_replace(Snapshot::new(1, initial));

        let task = self.spawn_query_task(query.clone(), changes, tx, 1);

        let id = self.next_subscription.fetch_add(1, Ordering::SeqCst);
        let active = self.active_subscriptions.clone();
        active.fetch_add(1, Ordering::SeqCst);
        let feeds = self.feeds.clone();
        let collection = query.collection.clone();
        log::debug!("Subscription {id} opened on '{collection}'");

        Ok(Subscription::new(id, query, rx, move || {
            task.abort();
            active.fetch_sub(1, Ordering::SeqCst);
            log::debug!("Subscription {id} released");

            let Ok(handle) = tokio::runtime::Handle::try_current() else {
                return;
            };
            handle.spawn(async move {
                // The aborted task holds its receiver until it is dropped
                let _ = task.await;
                if feeds.remove_if_idle(&collection).await {
                    log::debug!("Change feed for '{collection}' dropped");
                }
            });
        }))
    }
}
