//! Errors returned by the text and feedback services.

use textshare_core::{DocumentId, RecordError};
use textshare_sync::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Rejected before reaching the store.
    #[error("{0} must not be blank")]
    Validation(&'static str),

    #[error("{collection}/{id} does not exist")]
    NotFound { collection: String, id: DocumentId },

    /// The store could not be reached; the call may succeed later.
    #[error("store unavailable: {0}")]
    TransientStore(String),

    #[error("store error: {0}")]
    Store(#[source] StoreError),

    #[error("malformed record: {0}")]
    Record(#[from] RecordError),
}

impl ServiceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientStore(_))
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { collection, id } => Self::NotFound { collection, id },
            StoreError::Unavailable(reason) => Self::TransientStore(reason),
            other => Self::Store(other),
        }
    }
}
