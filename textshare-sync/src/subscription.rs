//! Live query handles.
//!
//! A [`Subscription`] is owned by whoever opened it. Dropping it (or
//! calling [`Subscription::cancel`]) releases the store-side registration
//! immediately, so a view that goes away never leaves a watch behind.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use textshare_core::{Document, Query};

/// Full result set of a live query at one point in time.
///
/// `version` increases by one for every snapshot a subscription delivers;
/// version 0 is the empty placeholder before the first result arrives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u64,
    pub documents: Vec<Document>,
}

impl Snapshot {
    pub fn new(version: u64, documents: Vec<Document>) -> Self {
        Self { version, documents }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

type Release = Box<dyn FnOnce() + Send>;

/// Handle to a live query.
pub struct Subscription {
    id: u64,
    query: Query,
    rx: watch::Receiver<Snapshot>,
    release: Option<Release>,
}

impl Subscription {
    pub(crate) fn new(
        id: u64,
        query: Query,
        rx: watch::Receiver<Snapshot>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            id,
            query,
            rx,
            release: Some(Box::new(release)),
        }
    }

    /// Wait for the next snapshot.
    ///
    /// The first call returns the initial result set. Snapshots that were
    /// superseded before the caller got to them are skipped. Returns
    /// `None` once the store side has gone away.
    pub async fn next(&mut self) -> Option<Snapshot> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// The latest snapshot, without waiting.
    pub fn current(&self) -> Snapshot {
        self.rx.borrow().clone()
    }

    /// Whether a snapshot newer than the last one returned by `next` exists.
    pub fn has_changed(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Release the subscription now. Equivalent to dropping it.
    pub fn cancel(self) {}

    fn release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("query", &self.query)
            .field("version", &self.rx.borrow().version)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn make(released: Arc<AtomicUsize>) -> (watch::Sender<Snapshot>, Subscription) {
        let (tx, rx) = watch::channel(Snapshot::default());
        let sub = Subscription::new(1, Query::collection("texts"), rx, move || {
            released.fetch_add(1, Ordering::SeqCst);
        });
        (tx, sub)
    }

    #[tokio::test]
    async fn test_drop_releases_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let (_tx, sub) = make(released.clone());
        assert_eq!(released.load(Ordering::SeqCst), 0);
        drop(sub);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_releases() {
        let released = Arc::new(AtomicUsize::new(0));
        let (_tx, sub) = make(released.clone());
        sub.cancel();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_next_skips_superseded_snapshots() {
        let released = Arc::new(AtomicUsize::new(0));
        let (tx, mut sub) = make(released);

        tx.send(Snapshot::new(1, Vec::new())).unwrap();
        tx.send(Snapshot::new(2, Vec::new())).unwrap();

        assert!(sub.has_changed());
        let snap = sub.next().await.unwrap();
        assert_eq!(snap.version, 2);
        assert!(!sub.has_changed());
    }

    #[tokio::test]
    async fn test_next_ends_when_sender_gone() {
        let released = Arc::new(AtomicUsize::new(0));
        let (tx, mut sub) = make(released);
        tx.send(Snapshot::new(1, Vec::new())).unwrap();
        drop(tx);

        // The unseen value is still delivered, then the stream ends
        assert_eq!(sub.next().await.map(|s| s.version), Some(1));
        assert!(sub.next().await.is_none());
    }
}
