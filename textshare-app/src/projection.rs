//! Ordered, typed views over a live query.
//!
//! A [`Projection`] owns its [`Subscription`] and rebuilds its whole list
//! from every snapshot. Dropping the projection releases the subscription.

use textshare_core::{DocumentId, Record};
use textshare_sync::{Snapshot, Subscription};

pub struct Projection<T> {
    subscription: Subscription,
    items: Vec<T>,
    version: u64,
}

impl<T: Record> Projection<T> {
    pub fn new(subscription: Subscription) -> Self {
        Self {
            subscription,
            items: Vec::new(),
            version: 0,
        }
    }

    /// Wait for the next snapshot and rebuild the list.
    ///
    /// Returns `None` once the underlying subscription has ended.
    pub async fn next(&mut self) -> Option<&[T]> {
        loop {
            let snapshot = self.subscription.next().await?;
            if self.apply(&snapshot) {
                return Some(&self.items);
            }
        }
    }

    /// Apply the latest snapshot without waiting. Returns true if the list
    /// changed.
    pub fn refresh(&mut self) -> bool {
        let snapshot = self.subscription.current();
        self.apply(&snapshot)
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn find(&self, id: DocumentId) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    /// Version of the snapshot the list was built from; 0 before the first.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_loaded(&self) -> bool {
        self.version > 0
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn apply(&mut self, snapshot: &Snapshot) -> bool {
        if snapshot.version <= self.version {
            return false;
        }
        self.items = project(snapshot);
        self.version = snapshot.version;
        true
    }
}

/// Decode a snapshot newest first, skipping documents that do not decode.
pub fn project<T: Record>(snapshot: &Snapshot) -> Vec<T> {
    let mut items: Vec<T> = snapshot
        .documents
        .iter()
        .filter_map(|doc| match T::from_document(doc) {
            Ok(item) => Some(item),
            Err(e) => {
                log::warn!("Skipping {} document {}: {e}", T::COLLECTION, doc.id);
                None
            }
        })
        .collect();

    items.sort_by(|a, b| {
        b.created_at()
            .cmp(&a.created_at())
            .then_with(|| b.id().cmp(&a.id()))
    });
    items
}
