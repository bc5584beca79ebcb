//! Storage seam used by the inbox
//!
//! The inbox only needs to append activities. Keeping this behind a trait
//! lets tests run the full pipeline against in-memory fakes.

use async_trait::async_trait;

use super::models::Activity;
use crate::error::AppError;

/// Durable append-only store for received activities
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// Persist one activity. Must either fully commit or have no effect.
    ///
    /// Backends other than [`super::Database`] report failures as
    /// `AppError::Storage`.
    async fn create_activity(&self, activity: &Activity) -> Result<(), AppError>;
}
