//! Sender that records notifications in the trace log instead of delivering
//! them. Used when no relay endpoint is configured.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::domain::ports::{NotificationSender, NotificationSenderError};
use crate::domain::{EmailAddress, NotificationKind, without_secrets};

/// Logs each notification at info level and reports success.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotificationSender;

#[async_trait]
impl NotificationSender for LogNotificationSender {
    async fn emit(
        &self,
        recipient: &EmailAddress,
        kind: NotificationKind,
        data: &Value,
    ) -> Result<bool, NotificationSenderError> {
        info!(%recipient, %kind, "notification not sent: no relay configured");
        let data = without_secrets(data);
        debug!(%kind, %data, "undelivered notification data");
        Ok(true)
    }
}
