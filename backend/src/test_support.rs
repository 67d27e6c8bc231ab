//! Test utilities for the backend crate.
//!
//! Shared by unit tests (in `src/`) and integration tests (in `tests/`). Only
//! compiled for tests or with the `test-support` feature.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeDelta, Utc};
use mockable::Clock;
use serde_json::Value;

use crate::domain::ports::{NotificationSender, NotificationSenderError};
use crate::domain::{BackoffJitter, EmailAddress, NotificationKind, RelaySleeper};

/// Clock whose time only moves when a test says so.
pub struct MutableClock(Mutex<DateTime<Utc>>);

impl MutableClock {
    /// Create a new clock frozen at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    /// Move the clock forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let delta = match TimeDelta::from_std(delta) {
            Ok(delta) => delta,
            Err(error) => {
                panic!("failed to convert Duration to TimeDelta: {error}; delta={delta:?}")
            }
        };
        *self.lock_clock() += delta;
    }

    pub fn advance_seconds(&self, seconds: i64) {
        *self.lock_clock() += TimeDelta::seconds(seconds);
    }

    fn lock_clock(&self) -> MutexGuard<'_, DateTime<Utc>> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(_) => panic!("clock mutex"),
        }
    }
}

impl Clock for MutableClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.lock_clock()
    }
}

/// Sleeper that returns at once.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateSleeper;

#[async_trait]
impl RelaySleeper for ImmediateSleeper {
    async fn sleep(&self, _duration: Duration) {}
}

/// Sleeper that returns at once and remembers each requested delay.
#[derive(Default)]
pub struct RecordingSleeper(pub Mutex<Vec<Duration>>);

#[async_trait]
impl RelaySleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        let mut entries = match self.0.lock() {
            Ok(entries) => entries,
            Err(_) => panic!("sleeper mutex"),
        };
        entries.push(duration);
    }
}

/// Jitter strategy that keeps the base delay unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoJitter;

impl BackoffJitter for NoJitter {
    fn jittered_delay(&self, base: Duration, _attempt: u32) -> Duration {
        base
    }
}

/// One message handed to [`RecordingSender`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
    pub recipient: EmailAddress,
    pub kind: NotificationKind,
    pub data: Value,
}

/// Sender that accepts everything and keeps a copy.
#[derive(Default)]
pub struct RecordingSender(Mutex<Vec<SentNotification>>);

impl RecordingSender {
    /// Every notification accepted so far, oldest first.
    pub fn sent(&self) -> Vec<SentNotification> {
        match self.0.lock() {
            Ok(sent) => sent.clone(),
            Err(_) => panic!("sender mutex"),
        }
    }
}

#[async_trait]
impl NotificationSender for RecordingSender {
    async fn emit(
        &self,
        recipient: &EmailAddress,
        kind: NotificationKind,
        data: &Value,
    ) -> Result<bool, NotificationSenderError> {
        let mut sent = match self.0.lock() {
            Ok(sent) => sent,
            Err(_) => panic!("sender mutex"),
        };
        sent.push(SentNotification {
            recipient: recipient.clone(),
            kind,
            data: data.clone(),
        });
        Ok(true)
    }
}
