//! PostgreSQL-backed `NotificationOutbox` implementation using Diesel ORM.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde_json::Value;

use crate::domain::ports::{NotificationOutbox, NotificationOutboxError};
use crate::domain::{
    DeliveryState, EmailAddress, IntentId, NotificationIntent, NotificationKind, without_secrets,
};

use super::diesel_basic_error_mapping::{map_basic_diesel_error, map_basic_pool_error};
use super::models::{NewOutboxRow, OutboxOutcomeUpdate, OutboxRow};
use super::pool::{DbPool, PoolError};
use super::schema::notification_outbox;

/// Diesel-backed implementation of the outbox port.
#[derive(Clone)]
pub struct DieselNotificationOutbox {
    pool: DbPool,
}

impl DieselNotificationOutbox {
    /// Create a new outbox adapter over the shared pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Write a relay outcome. Terminal outcomes also strip secrets from the
    /// stored template data.
    async fn record_outcome(
        &self,
        id: &IntentId,
        outcome: OutboxOutcomeUpdate<'_>,
        next_attempt_at: Option<DateTime<Utc>>,
    ) -> Result<(), NotificationOutboxError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let intent_id = *id.as_uuid();
        let updated = match next_attempt_at {
            Some(at) => {
                diesel::update(
                    notification_outbox::table.filter(notification_outbox::id.eq(intent_id)),
                )
                .set((&outcome, notification_outbox::next_attempt_at.eq(at)))
                .execute(&mut conn)
                .await
            }
            None => {
                conn.transaction::<_, diesel::result::Error, _>(|conn| {
                    async move {
                        let target = notification_outbox::table
                            .filter(notification_outbox::id.eq(intent_id));
                        let Some(data) = target
                            .select(notification_outbox::data)
                            .for_update()
                            .first::<Value>(conn)
                            .await
                            .optional()?
                        else {
                            return Ok(0);
                        };
                        diesel::update(target)
                            .set((
                                &outcome,
                                notification_outbox::data.eq(without_secrets(&data)),
                            ))
                            .execute(conn)
                            .await
                    }
                    .scope_boxed()
                })
                .await
            }
        }
        .map_err(map_diesel_error)?;

        if updated == 0 {
            return Err(NotificationOutboxError::query(format!(
                "intent {id} is not in the outbox"
            )));
        }
        Ok(())
    }
}

fn map_pool_error(error: PoolError) -> NotificationOutboxError {
    map_basic_pool_error(error, NotificationOutboxError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> NotificationOutboxError {
    map_basic_diesel_error(
        error,
        NotificationOutboxError::query,
        NotificationOutboxError::connection,
    )
}

fn corrupt(err: impl std::fmt::Display) -> NotificationOutboxError {
    NotificationOutboxError::query(format!("stored intent is invalid: {err}"))
}

fn row_to_intent(row: OutboxRow) -> Result<NotificationIntent, NotificationOutboxError> {
    Ok(NotificationIntent {
        id: IntentId::from_uuid(row.id),
        recipient: EmailAddress::new(&row.recipient).map_err(corrupt)?,
        kind: row.kind.parse::<NotificationKind>().map_err(corrupt)?,
        data: row.data,
        state: row.state.parse::<DeliveryState>().map_err(corrupt)?,
        attempts: u32::try_from(row.attempts).map_err(corrupt)?,
        next_attempt_at: row.next_attempt_at,
        last_error: row.last_error,
        created_at: row.created_at,
    })
}

fn attempts_column(attempts: u32) -> i32 {
    i32::try_from(attempts).unwrap_or(i32::MAX)
}

#[async_trait]
impl NotificationOutbox for DieselNotificationOutbox {
    async fn enqueue(&self, intent: &NotificationIntent) -> Result<(), NotificationOutboxError> {
        let row = NewOutboxRow {
            id: *intent.id.as_uuid(),
            recipient: intent.recipient.as_str(),
            kind: intent.kind.as_str(),
            data: &intent.data,
            state: intent.state.as_str(),
            attempts: attempts_column(intent.attempts),
            next_attempt_at: intent.next_attempt_at,
            last_error: intent.last_error.as_deref(),
            created_at: intent.created_at,
        };
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::insert_into(notification_outbox::table)
            .values(&row)
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn list_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<NotificationIntent>, NotificationOutboxError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows = notification_outbox::table
            .filter(notification_outbox::state.eq(DeliveryState::Pending.as_str()))
            .filter(notification_outbox::next_attempt_at.le(now))
            .order((
                notification_outbox::next_attempt_at.asc(),
                notification_outbox::created_at.asc(),
            ))
            .limit(limit)
            .select(OutboxRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter().map(row_to_intent).collect()
    }

    async fn mark_delivered(
        &self,
        id: &IntentId,
        attempts: u32,
    ) -> Result<(), NotificationOutboxError> {
        let outcome = OutboxOutcomeUpdate {
            state: DeliveryState::Delivered.as_str(),
            attempts: attempts_column(attempts),
            last_error: None,
        };
        self.record_outcome(id, outcome, None).await
    }

    async fn reschedule(
        &self,
        id: &IntentId,
        attempts: u32,
        next_attempt_at: DateTime<Utc>,
        last_error: &str,
    ) -> Result<(), NotificationOutboxError> {
        let outcome = OutboxOutcomeUpdate {
            state: DeliveryState::Pending.as_str(),
            attempts: attempts_column(attempts),
            last_error: Some(last_error),
        };
        self.record_outcome(id, outcome, Some(next_attempt_at)).await
    }

    async fn abandon(
        &self,
        id: &IntentId,
        attempts: u32,
        last_error: &str,
    ) -> Result<(), NotificationOutboxError> {
        let outcome = OutboxOutcomeUpdate {
            state: DeliveryState::Abandoned.as_str(),
            attempts: attempts_column(attempts),
            last_error: Some(last_error),
        };
        self.record_outcome(id, outcome, None).await
    }
}
