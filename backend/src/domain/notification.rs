//! Notification intents queued in the outbox.
//!
//! State changes never talk to the mail relay directly. They enqueue an
//! intent after the authoritative write; the relay worker delivers it later
//! and retries on its own schedule.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::IntentId;
use super::account::EmailAddress;

/// Template family a notification renders with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    EmailVerification,
    PasswordReset,
    AccountApproved,
    RideRequested,
    RideAccepted,
    RideStatusChanged,
}

impl NotificationKind {
    /// Stable name used in storage and log fields.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EmailVerification => "email_verification",
            Self::PasswordReset => "password_reset",
            Self::AccountApproved => "account_approved",
            Self::RideRequested => "ride_requested",
            Self::RideAccepted => "ride_accepted",
            Self::RideStatusChanged => "ride_status_changed",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when stored text does not name a known kind or state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown notification {field} `{value}`")]
pub struct NotificationParseError {
    field: &'static str,
    value: String,
}

impl FromStr for NotificationKind {
    type Err = NotificationParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "email_verification" => Ok(Self::EmailVerification),
            "password_reset" => Ok(Self::PasswordReset),
            "account_approved" => Ok(Self::AccountApproved),
            "ride_requested" => Ok(Self::RideRequested),
            "ride_accepted" => Ok(Self::RideAccepted),
            "ride_status_changed" => Ok(Self::RideStatusChanged),
            other => Err(NotificationParseError {
                field: "kind",
                value: other.to_owned(),
            }),
        }
    }
}

/// Delivery state of a queued intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    Pending,
    Delivered,
    Abandoned,
}

impl DeliveryState {
    /// Stable name used in storage.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delivered => "delivered",
            Self::Abandoned => "abandoned",
        }
    }
}

impl FromStr for DeliveryState {
    type Err = NotificationParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "delivered" => Ok(Self::Delivered),
            "abandoned" => Ok(Self::Abandoned),
            other => Err(NotificationParseError {
                field: "state",
                value: other.to_owned(),
            }),
        }
    }
}

/// Message the dispatcher wants delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub recipient: EmailAddress,
    pub kind: NotificationKind,
    pub data: Value,
}

impl NewNotification {
    /// Create a new pending notification for `recipient`.
    pub fn new(recipient: EmailAddress, kind: NotificationKind, data: Value) -> Self {
        Self {
            recipient,
            kind,
            data,
        }
    }
}

/// Outbox row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationIntent {
    pub id: IntentId,
    pub recipient: EmailAddress,
    pub kind: NotificationKind,
    pub data: Value,
    pub state: DeliveryState,
    pub attempts: u32,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NotificationIntent {
    /// Fresh intent, due immediately.
    pub fn pending(id: IntentId, notification: NewNotification, now: DateTime<Utc>) -> Self {
        let NewNotification {
            recipient,
            kind,
            data,
        } = notification;
        Self {
            id,
            recipient,
            kind,
            data,
            state: DeliveryState::Pending,
            attempts: 0,
            next_attempt_at: now,
            last_error: None,
            created_at: now,
        }
    }

    /// Whether the relay should pick this intent up at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.state == DeliveryState::Pending && self.next_attempt_at <= now
    }
}

/// Template fields that carry redeemable secrets.
pub const SECRET_FIELDS: [&str; 1] = ["token"];

/// Copy of `data` with every [`SECRET_FIELDS`] entry removed.
///
/// Outbox adapters store this once an intent stops being pending, so only
/// intents still waiting for delivery hold a plaintext token.
///
/// # Examples
/// ```
/// use campus_rides::domain::without_secrets;
/// use serde_json::json;
///
/// let data = json!({"name": "Ada", "token": "abc"});
/// assert_eq!(without_secrets(&data), json!({"name": "Ada"}));
/// ```
pub fn without_secrets(data: &Value) -> Value {
    let mut data = data.clone();
    if let Value::Object(map) = &mut data {
        for field in SECRET_FIELDS {
            map.remove(field);
        }
    }
    data
}
