//! Port for the external notification delivery collaborator.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{EmailAddress, NotificationKind};

use super::define_port_error;

define_port_error! {
    /// Errors raised by notification sender adapters.
    ///
    /// Every variant is treated as transient by the relay.
    pub enum NotificationSenderError for "notification sender" {
        /// The relay answered but could not take the message right now.
        Unavailable { message: String } => "notification sender unavailable: {message}",
    }
}

/// Delivery contract: `emit(recipient, template kind, template data)`.
///
/// `Ok(true)` means delivered, `Ok(false)` means the collaborator refused
/// the message permanently. Errors are transient and worth retrying.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn emit(
        &self,
        recipient: &EmailAddress,
        kind: NotificationKind,
        data: &Value,
    ) -> Result<bool, NotificationSenderError>;
}

/// Fixture sender that reports every message as delivered.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureNotificationSender;

#[async_trait]
impl NotificationSender for FixtureNotificationSender {
    async fn emit(
        &self,
        _recipient: &EmailAddress,
        _kind: NotificationKind,
        _data: &Value,
    ) -> Result<bool, NotificationSenderError> {
        Ok(true)
    }
}
