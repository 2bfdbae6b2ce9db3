//! Feedback intake: submit, delete, list.

use std::sync::Arc;

use textshare_core::{now_millis, DocumentId, FeedbackRecord, Record, FEEDBACKS};
use textshare_sync::DocumentStore;

use crate::error::ServiceError;
use crate::projection::Projection;
use crate::retry::RetryPolicy;

pub struct FeedbackIntake<S> {
    store: Arc<S>,
    create_policy: RetryPolicy,
}

impl<S: DocumentStore> FeedbackIntake<S> {
    pub fn new(store: Arc<S>, create_policy: RetryPolicy) -> Self {
        Self {
            store,
            create_policy,
        }
    }

    pub async fn submit_feedback(&self, content: &str) -> Result<FeedbackRecord, ServiceError> {
        if content.trim().is_empty() {
            return Err(ServiceError::Validation("feedback"));
        }

        let store = &*self.store;
        let doc = self
            .create_policy
            .run("submit feedback", move || {
                store.add(FEEDBACKS, FeedbackRecord::new_fields(content, now_millis()))
            })
            .await?;

        log::info!("Received feedback {}", doc.id);
        Ok(FeedbackRecord::from_document(&doc)?)
    }

    pub async fn delete_feedback(&self, id: DocumentId) -> Result<(), ServiceError> {
        self.store.delete(FEEDBACKS, id).await?;
        log::info!("Deleted feedback {id}");
        Ok(())
    }

    /// Live list of feedback, newest first.
    pub async fn list_feedbacks(&self) -> Result<Projection<FeedbackRecord>, ServiceError> {
        let subscription = self.store.subscribe(FeedbackRecord::query()).await?;
        Ok(Projection::new(subscription))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use textshare_sync::LocalStore;

    #[tokio::test]
    async fn test_submit_and_list() {
        let store = Arc::new(LocalStore::in_memory());
        let intake = FeedbackIntake::new(store, RetryPolicy::default());
        let mut list = intake.list_feedbacks().await.unwrap();
        assert!(list.next().await.unwrap().is_empty());

        let before = now_millis();
        let entry = intake.submit_feedback("bug report").await.unwrap();
        assert!(entry.created_at >= before);

        let items = list.next().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].content, "bug report");
    }

    #[tokio::test]
    async fn test_blank_feedback_rejected() {
        let store = Arc::new(LocalStore::in_memory());
        let intake = FeedbackIntake::new(store.clone(), RetryPolicy::default());
        assert!(matches!(
            intake.submit_feedback(" ").await,
            Err(ServiceError::Validation(_))
        ));
        assert_eq!(store.count(FEEDBACKS).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_missing_feedback() {
        let store = Arc::new(LocalStore::in_memory());
        let intake = FeedbackIntake::new(store, RetryPolicy::default());
        assert!(matches!(
            intake.delete_feedback(DocumentId::new()).await,
            Err(ServiceError::NotFound { .. })
        ));
    }
}
