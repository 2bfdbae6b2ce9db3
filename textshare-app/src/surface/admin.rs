//! Admin page: compose, publish and delete texts; review feedback.

use std::sync::Arc;

use textshare_core::{DocumentId, FeedbackRecord, TextRecord, TextStatus};
use textshare_sync::DocumentStore;

use crate::error::ServiceError;
use crate::feedback::FeedbackIntake;
use crate::notice::Notice;
use crate::projection::Projection;
use crate::retry::RetryPolicy;
use crate::texts::TextLifecycle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdminTab {
    #[default]
    Texts,
    Feedback,
}

pub struct AdminSurface<S> {
    texts: TextLifecycle<S>,
    feedback: FeedbackIntake<S>,
    text_view: Projection<TextRecord>,
    feedback_view: Projection<FeedbackRecord>,
    share_url: String,
    tab: AdminTab,
    texts_ended: bool,
    feedback_ended: bool,
}

impl<S: DocumentStore> AdminSurface<S> {
    /// Open both live lists. Fails if the store cannot be subscribed to.
    pub async fn open(
        store: Arc<S>,
        create_policy: RetryPolicy,
        share_url: impl Into<String>,
    ) -> Result<Self, ServiceError> {
        let texts = TextLifecycle::new(store.clone(), create_policy);
        let feedback = FeedbackIntake::new(store, create_policy);
        let text_view = texts.list_texts(None).await?;
        let feedback_view = feedback.list_feedbacks().await?;

        let mut surface = Self {
            texts,
            feedback,
            text_view,
            feedback_view,
            share_url: share_url.into(),
            tab: AdminTab::default(),
            texts_ended: false,
            feedback_ended: false,
        };
        surface.refresh();
        log::debug!("Admin surface opened");
        Ok(surface)
    }

    pub fn tab(&self) -> AdminTab {
        self.tab
    }

    pub fn select_tab(&mut self, tab: AdminTab) {
        self.tab = tab;
    }

    /// Link encoded in the QR code.
    pub fn share_url(&self) -> &str {
        &self.share_url
    }

    /// All texts, newest first.
    pub fn texts(&self) -> &[TextRecord] {
        self.text_view.items()
    }

    pub fn drafts(&self) -> impl Iterator<Item = &TextRecord> {
        self.texts().iter().filter(|t| !t.is_published())
    }

    pub fn published(&self) -> impl Iterator<Item = &TextRecord> {
        self.texts().iter().filter(|t| t.is_published())
    }

    pub fn feedbacks(&self) -> &[FeedbackRecord] {
        self.feedback_view.items()
    }

    pub async fn save_draft(&self, content: &str) -> Notice {
        self.create(content, TextStatus::Draft, "Draft saved").await
    }

    pub async fn publish_now(&self, content: &str) -> Notice {
        self.create(content, TextStatus::Published, "Text published").await
    }

    pub async fn publish(&self, id: DocumentId) -> Notice {
        match self.texts.publish_text(id).await {
            Ok(_) => Notice::success("Text published"),
            Err(e) => self.failed("Publishing", e),
        }
    }

    pub async fn delete_text(&self, id: DocumentId) -> Notice {
        match self.texts.delete_text(id).await {
            Ok(()) => Notice::success("Text deleted"),
            Err(e) => self.failed("Deleting", e),
        }
    }

    pub async fn delete_feedback(&self, id: DocumentId) -> Notice {
        match self.feedback.delete_feedback(id).await {
            Ok(()) => Notice::success("Feedback deleted"),
            Err(e) => self.failed("Deleting feedback", e),
        }
    }

    /// Wait until either list changes. Returns false once both have ended.
    pub async fn sync(&mut self) -> bool {
        while !(self.texts_ended && self.feedback_ended) {
            tokio::select! {
                changed = self.text_view.next(), if !self.texts_ended => {
                    match changed {
                        Some(_) => return true,
                        None => self.texts_ended = true,
                    }
                }
                changed = self.feedback_view.next(), if !self.feedback_ended => {
                    match changed {
                        Some(_) => return true,
                        None => self.feedback_ended = true,
                    }
                }
            }
        }
        false
    }

    /// Apply whatever snapshots have already arrived, without waiting.
    pub fn refresh(&mut self) -> bool {
        let texts = self.text_view.refresh();
        let feedbacks = self.feedback_view.refresh();
        texts || feedbacks
    }

    async fn create(&self, content: &str, status: TextStatus, done: &str) -> Notice {
        match self.texts.create_text(content, status).await {
            Ok(_) => Notice::success(done),
            Err(e) => self.failed("Adding", e),
        }
    }

    fn failed(&self, action: &str, err: ServiceError) -> Notice {
        log::warn!("{action} from admin failed: {err}");
        Notice::failure(action, &err)
    }
}
