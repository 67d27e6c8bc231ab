//! Outbox relay: delivers queued notification intents.
//!
//! The relay polls due intents, hands each to the notification sender, and
//! records the outcome on the intent. Transient sender failures are retried
//! with jittered exponential backoff until the attempt limit; a permanent
//! refusal abandons the intent at once. Nothing here touches ride or account
//! state.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::domain::ports::{NotificationOutbox, NotificationOutboxError, NotificationSender};
use crate::domain::{Error, NotificationIntent};

/// Relay tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxRelayConfig {
    /// Intents claimed per poll.
    pub batch_size: usize,
    /// Delivery attempts per intent, including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for OutboxRelayConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_attempts: 5,
            initial_backoff: Duration::from_secs(30),
            max_backoff: Duration::from_secs(30 * 60),
        }
    }
}

/// Async sleeping abstraction so tests need not wait on wall-clock time.
#[async_trait]
pub trait RelaySleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Retry backoff jitter abstraction.
pub trait BackoffJitter: Send + Sync {
    /// Return a jittered delay from the exponential base delay.
    fn jittered_delay(&self, base: Duration, attempt: u32) -> Duration;
}

/// Tokio-based sleeper.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl RelaySleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Adds up to a quarter of the base delay at random.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomJitter;

impl BackoffJitter for RandomJitter {
    fn jittered_delay(&self, base: Duration, _attempt: u32) -> Duration {
        let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
        let max_extra = (base_ms / 4).max(1);
        let extra = rand::thread_rng().gen_range(0..=max_extra);
        Duration::from_millis(base_ms.saturating_add(extra))
    }
}

/// Runtime helpers for polling and retry scheduling.
pub struct OutboxRelayRuntime {
    pub sleeper: Arc<dyn RelaySleeper>,
    pub jitter: Arc<dyn BackoffJitter>,
}

impl Default for OutboxRelayRuntime {
    fn default() -> Self {
        Self {
            sleeper: Arc::new(TokioSleeper),
            jitter: Arc::new(RandomJitter),
        }
    }
}

/// Tally of one relay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayReport {
    pub delivered: usize,
    pub rescheduled: usize,
    pub abandoned: usize,
}

impl RelayReport {
    /// Number of intents the pass touched.
    pub fn processed(&self) -> usize {
        self.delivered + self.rescheduled + self.abandoned
    }
}

enum Outcome {
    Delivered,
    Rescheduled,
    Abandoned,
}

fn map_outbox_error(error: NotificationOutboxError) -> Error {
    match error {
        NotificationOutboxError::Connection { message } => {
            Error::service_unavailable(format!("notification outbox unavailable: {message}"))
        }
        NotificationOutboxError::Query { message } => {
            Error::internal(format!("notification outbox error: {message}"))
        }
    }
}

/// Outbox relay service.
pub struct OutboxRelay {
    outbox: Arc<dyn NotificationOutbox>,
    sender: Arc<dyn NotificationSender>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn RelaySleeper>,
    jitter: Arc<dyn BackoffJitter>,
    config: OutboxRelayConfig,
}

impl OutboxRelay {
    /// Build a relay with the Tokio sleeper and random jitter.
    pub fn new(
        outbox: Arc<dyn NotificationOutbox>,
        sender: Arc<dyn NotificationSender>,
        clock: Arc<dyn Clock>,
        config: OutboxRelayConfig,
    ) -> Self {
        Self::with_runtime(outbox, sender, clock, OutboxRelayRuntime::default(), config)
    }

    /// Create a relay with explicit sleep and jitter strategies.
    ///
    /// Tests use this to drain the outbox without real waits.
    pub fn with_runtime(
        outbox: Arc<dyn NotificationOutbox>,
        sender: Arc<dyn NotificationSender>,
        clock: Arc<dyn Clock>,
        runtime: OutboxRelayRuntime,
        config: OutboxRelayConfig,
    ) -> Self {
        Self {
            outbox,
            sender,
            clock,
            sleeper: runtime.sleeper,
            jitter: runtime.jitter,
            config,
        }
    }

    /// Deliver one batch of due intents.
    ///
    /// Failing to read the outbox is an error; failing to record one
    /// intent's outcome is logged and the pass moves on, so the intent is
    /// simply picked up again later.
    pub async fn relay_batch(&self) -> Result<RelayReport, Error> {
        let due = self
            .outbox
            .list_due(self.clock.utc(), self.config.batch_size.max(1))
            .await
            .map_err(map_outbox_error)?;

        let mut report = RelayReport::default();
        for intent in due {
            match self.deliver(&intent).await {
                Ok(Outcome::Delivered) => report.delivered += 1,
                Ok(Outcome::Rescheduled) => report.rescheduled += 1,
                Ok(Outcome::Abandoned) => report.abandoned += 1,
                Err(error) => {
                    warn!(intent_id = %intent.id, %error, "failed to record delivery outcome");
                }
            }
        }
        if report.processed() > 0 {
            info!(
                delivered = report.delivered,
                rescheduled = report.rescheduled,
                abandoned = report.abandoned,
                "relay pass finished"
            );
        }
        Ok(report)
    }

    /// Poll until `shutdown` resolves, idling for `poll_interval` whenever a
    /// pass finds nothing to do or fails.
    pub async fn run(&self, poll_interval: Duration, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                () = &mut shutdown => break,
                () = self.tick(poll_interval) => {}
            }
        }
        info!("notification relay stopped");
    }

    async fn tick(&self, poll_interval: Duration) {
        match self.relay_batch().await {
            Ok(report) if report.processed() > 0 => {}
            Ok(_) => self.sleeper.sleep(poll_interval).await,
            Err(error) => {
                warn!(%error, "relay pass failed");
                self.sleeper.sleep(poll_interval).await;
            }
        }
    }

    async fn deliver(&self, intent: &NotificationIntent) -> Result<Outcome, Error> {
        let attempts = intent.attempts.saturating_add(1);
        let max_attempts = self.config.max_attempts.max(1);

        match self
            .sender
            .emit(&intent.recipient, intent.kind, &intent.data)
            .await
        {
            Ok(true) => {
                self.outbox
                    .mark_delivered(&intent.id, attempts)
                    .await
                    .map_err(map_outbox_error)?;
                debug!(intent_id = %intent.id, kind = %intent.kind, attempts, "notification delivered");
                Ok(Outcome::Delivered)
            }
            Ok(false) => {
                self.outbox
                    .abandon(&intent.id, attempts, "rejected by notification sender")
                    .await
                    .map_err(map_outbox_error)?;
                warn!(intent_id = %intent.id, kind = %intent.kind, "notification rejected");
                Ok(Outcome::Abandoned)
            }
            Err(error) if attempts >= max_attempts => {
                let message = error.to_string();
                self.outbox
                    .abandon(&intent.id, attempts, &message)
                    .await
                    .map_err(map_outbox_error)?;
                warn!(intent_id = %intent.id, kind = %intent.kind, attempts, %error, "notification abandoned after retries");
                Ok(Outcome::Abandoned)
            }
            Err(error) => {
                let message = error.to_string();
                let next_attempt_at = self.next_attempt_at(attempts);
                self.outbox
                    .reschedule(&intent.id, attempts, next_attempt_at, &message)
                    .await
                    .map_err(map_outbox_error)?;
                debug!(intent_id = %intent.id, attempts, %next_attempt_at, %error, "notification rescheduled");
                Ok(Outcome::Rescheduled)
            }
        }
    }

    fn next_attempt_at(&self, attempt: u32) -> DateTime<Utc> {
        let now = self.clock.utc();
        let delay = self
            .jitter
            .jittered_delay(self.retry_base_delay(attempt), attempt);
        TimeDelta::from_std(delay)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or(now)
    }

    fn retry_base_delay(&self, attempt: u32) -> Duration {
        let exponent = 2_u32.saturating_pow(attempt.saturating_sub(1));
        let base_ms = u64::try_from(self.config.initial_backoff.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.config.max_backoff.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(base_ms.saturating_mul(u64::from(exponent)).min(max_ms))
    }
}

#[cfg(test)]
#[path = "outbox_relay_tests.rs"]
mod tests;
