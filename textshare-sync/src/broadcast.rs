//! Per-collection change fan-out.
//!
//! Uses tokio broadcast channels for O(1) send to all live queries over a
//! collection. Change events only say *that* something changed; each live
//! query re-reads the authoritative state, so a lagging receiver loses
//! nothing by skipping events.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use textshare_core::DocumentId;

/// What happened to a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// A committed write, published after the backend accepted it.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub collection: String,
    pub id: DocumentId,
    pub kind: ChangeKind,
    /// Store-wide write sequence number
    pub sequence: u64,
}

/// Statistics for monitoring feed health.
#[derive(Debug, Clone, Default)]
pub struct FeedStats {
    pub events_sent: u64,
    pub active_receivers: usize,
}

/// Change feed for a single collection.
pub struct ChangeFeed {
    sender: broadcast::Sender<Arc<ChangeEvent>>,
    capacity: usize,
    events_sent: AtomicU64,
}

impl ChangeFeed {
    /// `capacity` is how many events a receiver may fall behind before it
    /// starts skipping.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            capacity,
            events_sent: AtomicU64::new(0),
        }
    }

    /// Publish an event. Returns the number of receivers it reached.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        let count = self.sender.send(Arc::new(event)).unwrap_or(0);
        self.events_sent.fetch_add(1, Ordering::Relaxed);
        count
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<ChangeEvent>> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> FeedStats {
        FeedStats {
            events_sent: self.events_sent.load(Ordering::Relaxed),
            active_receivers: self.receiver_count(),
        }
    }
}

/// Maps collection names to change feeds.
pub struct FeedManager {
    feeds: Arc<RwLock<HashMap<String, Arc<ChangeFeed>>>>,
    default_capacity: usize,
}

impl FeedManager {
    pub fn new(default_capacity: usize) -> Self {
        Self {
            feeds: Arc::new(RwLock::new(HashMap::new())),
            default_capacity,
        }
    }

    /// Listen to a collection, creating its feed on first use.
    ///
    /// The receiver is taken under the map lock so a concurrent
    /// [`remove_if_idle`](Self::remove_if_idle) never drops a feed that is
    /// about to gain a listener.
    pub async fn listen(&self, collection: &str) -> broadcast::Receiver<Arc<ChangeEvent>> {
        // Fast path: read lock
        {
            let feeds = self.feeds.read().await;
            if let Some(feed) = feeds.get(collection) {
                return feed.subscribe();
            }
        }

        let mut feeds = self.feeds.write().await;
        feeds
            .entry(collection.to_string())
            .or_insert_with(|| Arc::new(ChangeFeed::new(self.default_capacity)))
            .subscribe()
    }

    /// The feed for a collection, if anyone listens to it.
    pub async fn get(&self, collection: &str) -> Option<Arc<ChangeFeed>> {
        self.feeds.read().await.get(collection).cloned()
    }

    /// Drop a collection's feed once its last receiver is gone.
    pub async fn remove_if_idle(&self, collection: &str) -> bool {
        let mut feeds = self.feeds.write().await;
        match feeds.get(collection) {
            Some(feed) if feed.receiver_count() == 0 => {
                feeds.remove(collection);
                true
            }
            _ => false,
        }
    }

    pub async fn feed_count(&self) -> usize {
        self.feeds.read().await.len()
    }
}
