//! Viewer page: published texts only, copy to clipboard, send feedback.

use std::sync::Arc;

use textshare_core::{DocumentId, TextRecord, TextStatus};
use textshare_sync::DocumentStore;

use crate::feedback::FeedbackIntake;
use crate::notice::Notice;
use crate::projection::Projection;
use crate::retry::RetryPolicy;
use crate::texts::TextLifecycle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    Loading,
    Ready,
    Failed(String),
}

pub struct ViewerSurface<S> {
    texts: TextLifecycle<S>,
    feedback: FeedbackIntake<S>,
    view: Option<Projection<TextRecord>>,
    status: LoadStatus,
}

impl<S: DocumentStore> ViewerSurface<S> {
    /// Open the published list. A failure is reported through
    /// [`status`](Self::status), not returned.
    pub async fn open(store: Arc<S>, create_policy: RetryPolicy) -> Self {
        let mut surface = Self {
            texts: TextLifecycle::new(store.clone(), create_policy),
            feedback: FeedbackIntake::new(store, create_policy),
            view: None,
            status: LoadStatus::Loading,
        };
        surface.retry().await;
        surface
    }

    /// Subscribe again after a failure.
    pub async fn retry(&mut self) {
        self.view = None;
        self.status = LoadStatus::Loading;
        match self.texts.list_texts(Some(TextStatus::Published)).await {
            Ok(mut view) => {
                if view.refresh() {
                    self.status = LoadStatus::Ready;
                }
                self.view = Some(view);
                log::debug!("Viewer surface opened");
            }
            Err(e) => {
                log::error!("Viewer failed to load texts: {e}");
                self.status = LoadStatus::Failed("Could not load texts".into());
            }
        }
    }

    pub fn status(&self) -> &LoadStatus {
        &self.status
    }

    /// Published texts, newest first. Empty until loaded.
    pub fn texts(&self) -> &[TextRecord] {
        match (&self.status, &self.view) {
            (LoadStatus::Ready, Some(view)) => view.items(),
            _ => &[],
        }
    }

    /// Wait for the next change. Returns false if the list can no longer
    /// update.
    pub async fn sync(&mut self) -> bool {
        let Some(view) = self.view.as_mut() else {
            return false;
        };
        if view.next().await.is_some() {
            self.status = LoadStatus::Ready;
            true
        } else {
            log::warn!("Viewer lost its live query");
            self.status = LoadStatus::Failed("Connection to the store was lost".into());
            false
        }
    }

    /// Content to put on the clipboard.
    pub fn copy_text(&self, id: DocumentId) -> Result<String, Notice> {
        self.texts()
            .iter()
            .find(|t| t.id == id)
            .map(|t| t.content.clone())
            .ok_or_else(|| Notice::error("Copy failed: the text is no longer available"))
    }

    pub async fn submit_feedback(&self, content: &str) -> Notice {
        match self.feedback.submit_feedback(content).await {
            Ok(_) => Notice::success("Thanks for your feedback"),
            Err(e) => {
                log::warn!("Feedback from viewer failed: {e}");
                Notice::failure("Sending feedback", &e)
            }
        }
    }
}
