//! Text record lifecycle: create as draft or published, publish, delete, list.

use std::sync::Arc;

use textshare_core::{now_millis, DocumentId, Record, TextRecord, TextStatus, TEXTS};
use textshare_sync::DocumentStore;

use crate::error::ServiceError;
use crate::projection::Projection;
use crate::retry::RetryPolicy;

pub struct TextLifecycle<S> {
    store: Arc<S>,
    create_policy: RetryPolicy,
}

impl<S: DocumentStore> TextLifecycle<S> {
    pub fn new(store: Arc<S>, create_policy: RetryPolicy) -> Self {
        Self {
            store,
            create_policy,
        }
    }

    /// Insert a new text. Content is stored as given; it only has to be
    /// non-blank.
    pub async fn create_text(
        &self,
        content: &str,
        status: TextStatus,
    ) -> Result<TextRecord, ServiceError> {
        if content.trim().is_empty() {
            return Err(ServiceError::Validation("content"));
        }

        let store = &*self.store;
        let doc = self
            .create_policy
            .run("create text", move || {
                store.add(TEXTS, TextRecord::new_fields(content, status, now_millis()))
            })
            .await?;

        log::info!("Created {status} text {}", doc.id);
        Ok(TextRecord::from_document(&doc)?)
    }

    /// Mark a text published. Publishing a published text only refreshes
    /// `updatedAt`.
    pub async fn publish_text(&self, id: DocumentId) -> Result<TextRecord, ServiceError> {
        let doc = self
            .store
            .update(TEXTS, id, TextRecord::publish_fields(now_millis()))
            .await?;
        log::info!("Published text {id}");
        Ok(TextRecord::from_document(&doc)?)
    }

    pub async fn delete_text(&self, id: DocumentId) -> Result<(), ServiceError> {
        self.store.delete(TEXTS, id).await?;
        log::info!("Deleted text {id}");
        Ok(())
    }

    /// Live list of texts, newest first, optionally restricted to one status.
    pub async fn list_texts(
        &self,
        filter: Option<TextStatus>,
    ) -> Result<Projection<TextRecord>, ServiceError> {
        let subscription = self.store.subscribe(TextRecord::query(filter)).await?;
        Ok(Projection::new(subscription))
    }
}
