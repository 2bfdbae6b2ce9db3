//! Transient status messages shown after a user action.

use std::fmt;

use crate::error::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }

    /// Turn a failed action into something a user can act on.
    pub fn failure(action: &str, err: &ServiceError) -> Self {
        let message = match err {
            ServiceError::Validation(what) => format!("Please enter some {what}"),
            ServiceError::NotFound { .. } => format!("{action} failed: it no longer exists"),
            ServiceError::TransientStore(_) => format!("{action} failed, please try again"),
            ServiceError::Store(_) | ServiceError::Record(_) => format!("{action} failed"),
        };
        Self::error(message)
    }

    pub fn is_success(&self) -> bool {
        self.level == NoticeLevel::Success
    }

    pub fn is_error(&self) -> bool {
        self.level == NoticeLevel::Error
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use textshare_core::DocumentId;

    #[test]
    fn test_failure_messages() {
        let n = Notice::failure("Publishing", &ServiceError::Validation("content"));
        assert!(n.is_error());
        assert_eq!(n.message, "Please enter some content");

        let n = Notice::failure(
            "Deleting",
            &ServiceError::NotFound {
                collection: "texts".into(),
                id: DocumentId::new(),
            },
        );
        assert_eq!(n.message, "Deleting failed: it no longer exists");

        let n = Notice::failure("Adding", &ServiceError::TransientStore("down".into()));
        assert_eq!(n.to_string(), "Adding failed, please try again");
    }

    #[test]
    fn test_levels() {
        assert!(Notice::success("ok").is_success());
        assert!(!Notice::success("ok").is_error());
        assert!(!Notice::error("no").is_success());
    }
}
