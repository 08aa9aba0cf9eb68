//! # Handler Notifications
//!
//! Fire-and-forget delivery of "you have a new operation" messages.
//!
//! Delivery failures are logged and never affect the assignment that
//! triggered them.

use crate::domain::entities::Operation;
use crate::domain::value_objects::HandlerId;
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// Error returned by a notifier.
#[derive(Debug, Clone, Error)]
#[error("notification failed: {0}")]
pub struct NotificationError(pub String);

/// Port for assignment notifications.
#[async_trait]
pub trait HandlerNotifier: Send + Sync + fmt::Debug {
    /// Tells a handler an operation was assigned to it.
    ///
    /// # Errors
    ///
    /// Returns `NotificationError` if delivery fails.
    async fn notify_handler_assigned(
        &self,
        handler_id: &HandlerId,
        operation: &Operation,
    ) -> Result<(), NotificationError>;
}

/// Notifier that only writes a log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl HandlerNotifier for TracingNotifier {
    async fn notify_handler_assigned(
        &self,
        handler_id: &HandlerId,
        operation: &Operation,
    ) -> Result<(), NotificationError> {
        tracing::info!(
            handler_id = %handler_id,
            operation_id = %operation.id(),
            amount = %operation.amount(),
            direction = %operation.direction(),
            "Operation assigned"
        );
        Ok(())
    }
}
