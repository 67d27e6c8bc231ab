//! Ride records and the ride status state machine.
//!
//! ```text
//! pending --accept(driver)--> accepted --start--> in_progress --complete--> completed
//! pending --cancel--> cancelled
//! accepted --cancel--> cancelled
//! ```
//!
//! `completed` and `cancelled` are terminal.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::account::AccountContact;
use super::{AccountId, PassengerId, RideId};

/// Maximum length of a pickup or dropoff description.
pub const LOCATION_MAX: usize = 255;

/// Validation errors raised while building ride values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RideValidationError {
    #[error("{field} must not be empty")]
    EmptyLocation { field: &'static str },
    #[error("{field} must be at most {max} characters")]
    LocationTooLong { field: &'static str, max: usize },
    #[error("a pending ride cannot have an assigned driver")]
    DriverOnPending,
    #[error("a {status} ride requires an assigned driver")]
    MissingDriver { status: RideStatus },
    #[error("unknown ride status `{0}`")]
    UnknownStatus(String),
    #[error("unknown passenger status `{0}`")]
    UnknownPassengerStatus(String),
    #[error("`{0}` is not a status a ride can be moved to directly")]
    NotAStatusChange(RideStatus),
}

/// Lifecycle state of a ride.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RideStatus {
    Pending,
    Accepted,
    InProgress,
    Completed,
    Cancelled,
}

impl RideStatus {
    /// Stable name used in storage and notifications.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// No transition leaves a terminal status.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Statuses during which a driver is committed to the ride.
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Accepted | Self::InProgress)
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RideStatus {
    type Err = RideValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(RideValidationError::UnknownStatus(other.to_owned())),
        }
    }
}

/// Status moves available after acceptance.
///
/// Acceptance is not listed here: it also assigns the driver and has its own
/// compare-and-swap path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusChange {
    Start,
    Complete,
    Cancel,
}

impl StatusChange {
    /// Status the ride ends up in.
    pub const fn target(self) -> RideStatus {
        match self {
            Self::Start => RideStatus::InProgress,
            Self::Complete => RideStatus::Completed,
            Self::Cancel => RideStatus::Cancelled,
        }
    }

    /// Statuses from which this change is legal.
    pub const fn allowed_sources(self) -> &'static [RideStatus] {
        match self {
            Self::Start => &[RideStatus::Accepted],
            Self::Complete => &[RideStatus::InProgress],
            Self::Cancel => &[RideStatus::Pending, RideStatus::Accepted],
        }
    }

    /// Whether a ride currently in `from` may take this change.
    ///
    /// # Examples
    /// ```
    /// use campus_rides::domain::{RideStatus, StatusChange};
    ///
    /// assert!(StatusChange::Cancel.permits(RideStatus::Pending));
    /// assert!(!StatusChange::Complete.permits(RideStatus::Completed));
    /// ```
    pub fn permits(self, from: RideStatus) -> bool {
        self.allowed_sources().contains(&from)
    }
}

impl TryFrom<RideStatus> for StatusChange {
    type Error = RideValidationError;

    fn try_from(value: RideStatus) -> Result<Self, Self::Error> {
        match value {
            RideStatus::InProgress => Ok(Self::Start),
            RideStatus::Completed => Ok(Self::Complete),
            RideStatus::Cancelled => Ok(Self::Cancel),
            other => Err(RideValidationError::NotAStatusChange(other)),
        }
    }
}

/// Free-text pickup or dropoff description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Location(String);

impl Location {
    /// Validate a location, naming `field` in any error.
    pub fn new(field: &'static str, raw: impl AsRef<str>) -> Result<Self, RideValidationError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(RideValidationError::EmptyLocation { field });
        }
        if trimmed.chars().count() > LOCATION_MAX {
            return Err(RideValidationError::LocationTooLong {
                field,
                max: LOCATION_MAX,
            });
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Rehydrate a stored value without validation.
    pub(crate) fn from_stored(raw: String) -> Self {
        Self(raw)
    }

    /// Trimmed location text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Location {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A student's request for a new ride.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RideRequest {
    pub pickup: Location,
    pub dropoff: Location,
    /// Not checked against the current time.
    pub pickup_time: DateTime<Utc>,
    pub notes: Option<String>,
}

impl RideRequest {
    /// Validate raw request fields.
    pub fn new(
        pickup: impl AsRef<str>,
        dropoff: impl AsRef<str>,
        pickup_time: DateTime<Utc>,
        notes: Option<String>,
    ) -> Result<Self, RideValidationError> {
        Ok(Self {
            pickup: Location::new("pickup", pickup)?,
            dropoff: Location::new("dropoff", dropoff)?,
            pickup_time,
            notes: notes
                .map(|n| n.trim().to_owned())
                .filter(|n| !n.is_empty()),
        })
    }
}

/// Input used to build a [`Ride`].
#[derive(Debug, Clone)]
pub struct RideDraft {
    pub id: RideId,
    pub student_id: AccountId,
    pub driver_id: Option<AccountId>,
    pub pickup: Location,
    pub dropoff: Location,
    pub pickup_time: DateTime<Utc>,
    pub status: RideStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RideDraft {
    /// Draft of a freshly requested ride.
    pub fn requested(
        id: RideId,
        student_id: AccountId,
        request: RideRequest,
        now: DateTime<Utc>,
    ) -> Self {
        let RideRequest {
            pickup,
            dropoff,
            pickup_time,
            notes,
        } = request;
        Self {
            id,
            student_id,
            driver_id: None,
            pickup,
            dropoff,
            pickup_time,
            status: RideStatus::Pending,
            notes,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A single transportation request.
///
/// ## Invariants
/// - A pending ride has no driver.
/// - Accepted and in-progress rides always have a driver.
/// - Terminal rides may lack a driver: a ride cancelled while pending never
///   had one, and a completed ride loses it when the driver account is
///   deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ride {
    id: RideId,
    student_id: AccountId,
    driver_id: Option<AccountId>,
    pickup: Location,
    dropoff: Location,
    pickup_time: DateTime<Utc>,
    status: RideStatus,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Ride {
    /// Build a ride, enforcing the driver invariant.
    pub fn new(draft: RideDraft) -> Result<Self, RideValidationError> {
        let RideDraft {
            id,
            student_id,
            driver_id,
            pickup,
            dropoff,
            pickup_time,
            status,
            notes,
            created_at,
            updated_at,
        } = draft;

        match (status, driver_id) {
            (RideStatus::Pending, Some(_)) => return Err(RideValidationError::DriverOnPending),
            (status, None) if status.is_active() => {
                return Err(RideValidationError::MissingDriver { status });
            }
            _ => {}
        }

        Ok(Self {
            id,
            student_id,
            driver_id,
            pickup,
            dropoff,
            pickup_time,
            status,
            notes,
            created_at,
            updated_at,
        })
    }

    /// Stable ride identifier.
    pub fn id(&self) -> RideId {
        self.id
    }

    /// Student who requested the ride.
    pub fn student_id(&self) -> AccountId {
        self.student_id
    }

    /// Driver who accepted the ride, if any.
    pub fn driver_id(&self) -> Option<AccountId> {
        self.driver_id
    }

    /// Where the student is collected.
    pub fn pickup(&self) -> &Location {
        &self.pickup
    }

    /// Where the ride ends.
    pub fn dropoff(&self) -> &Location {
        &self.dropoff
    }

    /// Requested pickup time.
    pub fn pickup_time(&self) -> DateTime<Utc> {
        self.pickup_time
    }

    /// Current lifecycle status.
    pub fn status(&self) -> RideStatus {
        self.status
    }

    /// Free-text notes from the student.
    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    /// When the ride was requested.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// When the ride last changed.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Whether `account` is the requesting student or the assigned driver.
    pub fn involves(&self, account: AccountId) -> bool {
        self.student_id == account || self.driver_id == Some(account)
    }

    /// Apply a successful acceptance.
    pub(crate) fn accept(&mut self, driver: AccountId, now: DateTime<Utc>) {
        self.driver_id = Some(driver);
        self.status = RideStatus::Accepted;
        self.updated_at = now;
    }

    /// Apply a successful status change.
    pub(crate) fn apply(&mut self, change: StatusChange, now: DateTime<Utc>) {
        self.status = change.target();
        self.updated_at = now;
    }

    /// Null out the driver reference after the driver account is deleted.
    pub(crate) fn forget_driver(&mut self) {
        self.driver_id = None;
    }
}

/// Status of a secondary passenger on a ride.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassengerStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl PassengerStatus {
    /// Stable name used in storage.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl FromStr for PassengerStatus {
    type Err = RideValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(RideValidationError::UnknownPassengerStatus(other.to_owned())),
        }
    }
}

/// Secondary passenger row. The ride's creator never appears here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RidePassenger {
    pub id: PassengerId,
    pub ride_id: RideId,
    pub student_id: AccountId,
    pub status: PassengerStatus,
}

/// Ride joined with the display fields of both parties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RideView {
    pub ride: Ride,
    pub student: AccountContact,
    pub driver: Option<AccountContact>,
}

/// Position of a rider in a driver's roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterSeat {
    /// The student who created the ride.
    Primary,
    /// A passenger added after creation.
    Secondary(PassengerStatus),
}

/// One rider in a driver's roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub rider: AccountContact,
    pub seat: RosterSeat,
}

/// Ride as shown to its driver, with every rider on board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverRideView {
    pub view: RideView,
    /// Primary rider first, then secondary passengers.
    pub roster: Vec<RosterEntry>,
}

impl DriverRideView {
    /// Assemble a roster from the view's student and the secondary rows.
    ///
    /// Rows naming the primary rider are skipped so the creator is never
    /// listed twice.
    pub fn assemble(view: RideView, secondary: Vec<(RidePassenger, AccountContact)>) -> Self {
        let primary = view.student.account_id;
        let mut roster = Vec::with_capacity(secondary.len() + 1);
        roster.push(RosterEntry {
            rider: view.student.clone(),
            seat: RosterSeat::Primary,
        });
        roster.extend(
            secondary
                .into_iter()
                .filter(|(row, _)| row.student_id != primary)
                .map(|(row, rider)| RosterEntry {
                    rider,
                    seat: RosterSeat::Secondary(row.status),
                }),
        );
        Self { view, roster }
    }
}

#[cfg(test)]
#[path = "ride_tests.rs"]
mod tests;
