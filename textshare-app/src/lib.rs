//! # textshare-app: Text sharing on top of a live document store
//!
//! An admin writes texts as drafts or publishes them; viewers see the
//! published ones live, copy them, and send feedback.
//!
//! ## Modules
//!
//! - [`texts`]: Draft/published lifecycle of text records
//! - [`feedback`]: Feedback intake
//! - [`projection`]: Typed, ordered views over live queries
//! - [`share`]: Share URL derivation and origin resolvers
//! - [`surface`]: Landing, admin and viewer pages as state machines
//! - [`retry`]: Retry policy for creates
//! - [`config`]: `TEXTSHARE_*` environment configuration

pub mod config;
pub mod error;
pub mod feedback;
pub mod notice;
pub mod projection;
pub mod retry;
pub mod share;
pub mod surface;
pub mod texts;

pub use config::AppConfig;
pub use error::ServiceError;
pub use feedback::FeedbackIntake;
pub use notice::{Notice, NoticeLevel};
pub use projection::Projection;
pub use retry::RetryPolicy;
pub use share::{derive_share_url, LanSubstitution, Origin, OriginResolver, PassThrough};
pub use surface::{AdminSurface, AdminTab, Landing, LoadStatus, Route, ViewerSurface};
pub use texts::TextLifecycle;
