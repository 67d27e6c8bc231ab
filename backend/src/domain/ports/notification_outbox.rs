//! Port for the notification outbox.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{IntentId, NotificationIntent};

use super::define_port_error;

define_port_error! {
    /// Errors raised by outbox adapters.
    pub enum NotificationOutboxError for "notification outbox" {}
}

/// Port for queuing notification intents and recording delivery outcomes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationOutbox: Send + Sync {
    async fn enqueue(&self, intent: &NotificationIntent) -> Result<(), NotificationOutboxError>;

    /// Pending intents due at or before `now`, oldest due first.
    async fn list_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<NotificationIntent>, NotificationOutboxError>;

    async fn mark_delivered(
        &self,
        id: &IntentId,
        attempts: u32,
    ) -> Result<(), NotificationOutboxError>;

    /// Keep the intent pending and push its next attempt out.
    async fn reschedule(
        &self,
        id: &IntentId,
        attempts: u32,
        next_attempt_at: DateTime<Utc>,
        last_error: &str,
    ) -> Result<(), NotificationOutboxError>;

    /// Stop retrying the intent.
    async fn abandon(
        &self,
        id: &IntentId,
        attempts: u32,
        last_error: &str,
    ) -> Result<(), NotificationOutboxError>;
}

/// Fixture outbox that accepts and forgets every intent.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureNotificationOutbox;

#[async_trait]
impl NotificationOutbox for FixtureNotificationOutbox {
    async fn enqueue(&self, _intent: &NotificationIntent) -> Result<(), NotificationOutboxError> {
        Ok(())
    }

    async fn list_due(
        &self,
        _now: DateTime<Utc>,
        _limit: usize,
    ) -> Result<Vec<NotificationIntent>, NotificationOutboxError> {
        Ok(Vec::new())
    }

    async fn mark_delivered(
        &self,
        _id: &IntentId,
        _attempts: u32,
    ) -> Result<(), NotificationOutboxError> {
        Ok(())
    }

    async fn reschedule(
        &self,
        _id: &IntentId,
        _attempts: u32,
        _next_attempt_at: DateTime<Utc>,
        _last_error: &str,
    ) -> Result<(), NotificationOutboxError> {
        Ok(())
    }

    async fn abandon(
        &self,
        _id: &IntentId,
        _attempts: u32,
        _last_error: &str,
    ) -> Result<(), NotificationOutboxError> {
        Ok(())
    }
}
