//! Core domain models and notification persistence.
//!
//! Provides strongly-typed domain primitives, the durable notification
//! record, the on-wire delivery job, and the repository layer backing the
//! orchestration pipeline's audit trail. All other crates depend on these
//! foundational types for type safety and consistency.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod models;
pub mod storage;

pub use error::{CoreError, Result};
pub use models::{
    Channel, DeliveryJob, JsonMap, NotificationId, NotificationRecord, NotificationRequest,
    NotificationResponse, NotificationStatus, RenderResponse, RenderedContent, StatusUpdate,
    Template, TemplateBody, TemplateVariable, UserPreferences,
};
pub use storage::{notifications::NotificationStore, Storage};
