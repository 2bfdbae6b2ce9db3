//! Storage backends for the document store.
//!
//! Architecture:
//! ```text
//! ┌─────────────┐   put/get/remove/scan   ┌────────────────┐
//! │ LocalStore  │ ──────────────────────► │ dyn Backend    │
//! │ (feeds,     │                         ├────────────────┤
//! │  write lock)│                         │ MemoryBackend  │  default
//! └─────────────┘                         │ RocksBackend   │  feature "rocksdb"
//!                                         └────────────────┘
//! ```
//!
//! Backends are synchronous and know nothing about subscriptions. The
//! store serializes writes so a read-merge-write update never races.

use std::collections::HashMap;
use std::sync::RwLock;

use textshare_core::{Document, DocumentId};

#[cfg(feature = "rocksdb")]
pub mod rocks;

#[cfg(feature = "rocksdb")]
pub use rocks::{RocksBackend, StoreConfig};

/// Storage and transport errors.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Mutation target does not exist
    NotFound { collection: String, id: DocumentId },
    /// Store unreachable (not connected, connection dropped, timed out)
    Unavailable(String),
    /// Request refused by the store (limits, malformed request)
    Rejected(String),
    /// Backend internal error
    Backend(String),
    /// Serialization failed
    SerializationError(String),
    /// Deserialization failed
    DeserializationError(String),
    /// Compression error
    CompressionError(String),
}

impl StoreError {
    pub fn not_found(collection: &str, id: DocumentId) -> Self {
        StoreError::NotFound {
            collection: collection.to_string(),
            id,
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound { collection, id } => {
                write!(f, "Document not found: {collection}/{id}")
            }
            StoreError::Unavailable(e) => write!(f, "Store unavailable: {e}"),
            StoreError::Rejected(e) => write!(f, "Request rejected: {e}"),
            StoreError::Backend(e) => write!(f, "Backend error: {e}"),
            StoreError::SerializationError(e) => write!(f, "Serialization error: {e}"),
            StoreError::DeserializationError(e) => write!(f, "Deserialization error: {e}"),
            StoreError::CompressionError(e) => write!(f, "Compression error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// A synchronous key-document backend, partitioned by collection.
pub trait Backend: Send + Sync {
    /// Insert or overwrite a document.
    fn put(&self, collection: &str, doc: &Document) -> Result<(), StoreError>;

    fn get(&self, collection: &str, id: DocumentId) -> Result<Option<Document>, StoreError>;

    /// Remove a document, returning it if it existed.
    fn remove(&self, collection: &str, id: DocumentId) -> Result<Option<Document>, StoreError>;

    /// Every document in the collection, in no particular order.
    fn scan(&self, collection: &str) -> Result<Vec<Document>, StoreError>;

    fn count(&self, collection: &str) -> Result<usize, StoreError> {
        Ok(self.scan(collection)?.len())
    }
}

/// In-memory backend. Contents are lost when dropped.
#[derive(Default)]
pub struct MemoryBackend {
    collections: RwLock<HashMap<String, HashMap<DocumentId, Document>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Backend("memory backend lock poisoned".into())
}

impl Backend for MemoryBackend {
    fn put(&self, collection: &str, doc: &Document) -> Result<(), StoreError> {
        let mut collections = self.collections.write().map_err(poisoned)?;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(doc.id, doc.clone());
        Ok(())
    }

    fn get(&self, collection: &str, id: DocumentId) -> Result<Option<Document>, StoreError> {
        let collections = self.collections.read().map_err(poisoned)?;
        Ok(collections.get(collection).and_then(|c| c.get(&id)).cloned())
    }

    fn remove(&self, collection: &str, id: DocumentId) -> Result<Option<Document>, StoreError> {
        let mut collections = self.collections.write().map_err(poisoned)?;
        Ok(collections.get_mut(collection).and_then(|c| c.remove(&id)))
    }

    fn scan(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let collections = self.collections.read().map_err(poisoned)?;
        Ok(collections
            .get(collection)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default())
    }

    fn count(&self, collection: &str) -> Result<usize, StoreError> {
        let collections = self.collections.read().map_err(poisoned)?;
        Ok(collections.get(collection).map_or(0, |c| c.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use textshare_core::{FieldValue, Fields};

    fn doc(content: &str) -> Document {
        let mut fields = Fields::new();
        fields.insert("content".into(), FieldValue::from(content));
        Document::new(DocumentId::new(), fields)
    }

    #[test]
    fn test_memory_put_get_remove() {
        let backend = MemoryBackend::new();
        let d = doc("hello");

        backend.put("texts", &d).unwrap();
        assert_eq!(backend.get("texts", d.id).unwrap(), Some(d.clone()));
        assert_eq!(backend.count("texts").unwrap(), 1);

        assert_eq!(backend.remove("texts", d.id).unwrap(), Some(d.clone()));
        assert_eq!(backend.get("texts", d.id).unwrap(), None);
        assert_eq!(backend.remove("texts", d.id).unwrap(), None);
    }

    #[test]
    fn test_memory_collections_are_isolated() {
        let backend = MemoryBackend::new();
        let d = doc("shared id");

        backend.put("texts", &d).unwrap();
        assert_eq!(backend.get("feedbacks", d.id).unwrap(), None);
        assert!(backend.scan("feedbacks").unwrap().is_empty());
        assert_eq!(backend.scan("texts").unwrap().len(), 1);
    }

    #[test]
    fn test_memory_put_overwrites() {
        let backend = MemoryBackend::new();
        let mut d = doc("v1");
        backend.put("texts", &d).unwrap();

        d.fields.insert("content".into(), FieldValue::from("v2"));
        backend.put("texts", &d).unwrap();

        let stored = backend.get("texts", d.id).unwrap().unwrap();
        assert_eq!(stored.get("content"), Some(&FieldValue::from("v2")));
        assert_eq!(backend.count("texts").unwrap(), 1);
    }

    #[test]
    fn test_transient_classification() {
        assert!(StoreError::Unavailable("down".into()).is_transient());
        assert!(!StoreError::not_found("texts", DocumentId::new()).is_transient());
        assert!(!StoreError::Backend("io".into()).is_transient());
    }
}
