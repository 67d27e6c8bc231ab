//! Domain primitives, aggregates, and services.
//!
//! Purpose: define the strongly typed entities of the campus ride-sharing
//! system and the driving services that operate on them. Services depend only
//! on the driven ports in [`ports`]; adapters live under `crate::outbound`.
//!
//! Public surface:
//! - Error (alias to `error::Error`) — transport-agnostic failure payload.
//! - AccountRegistry — identity, verification, approval, roles.
//! - RideLedger — ride requests and their lifecycle.
//! - RatingLedger — post-ride ratings and aggregates.
//! - Dispatcher — caller-facing orchestration and notification intents.
//! - OutboxRelay — delivery of queued notification intents.

pub mod account;
pub mod account_patch;
pub mod account_registry;
pub mod credentials;
pub mod dispatcher;
pub mod error;
pub mod ids;
pub mod notification;
pub mod outbox_relay;
pub mod ports;
pub mod rating;
pub mod rating_ledger;
pub mod ride;
pub mod ride_ledger;
pub mod tokens;

pub use self::account::{
    Account, AccountContact, AccountDraft, AccountValidationError, ApprovalStatus, DisplayName,
    DriverProfile, EmailAddress, Principal, Role, StudentProfile, VehicleCapacity,
};
pub use self::account_patch::AccountPatch;
pub use self::account_registry::{
    AccountRegistry, Approval, IssuedFor, Registration, RegistrationRequest, SeedOutcome,
};
pub use self::credentials::{CredentialDigest, CredentialValidationError, PlainCredential};
pub use self::dispatcher::Dispatcher;
pub use self::ports::RideCreated;
pub use self::error::{Error, ErrorCode, ErrorReason, ErrorValidationError};
pub use self::ids::{AccountId, IdentifierParseError, IntentId, PassengerId, RatingId, RideId};
pub use self::notification::{
    DeliveryState, NewNotification, NotificationIntent, NotificationKind, NotificationParseError,
    SECRET_FIELDS, without_secrets,
};
pub use self::outbox_relay::{
    BackoffJitter, OutboxRelay, OutboxRelayConfig, OutboxRelayRuntime, RandomJitter,
    RelayReport, RelaySleeper, TokioSleeper,
};
pub use self::rating::{
    DriverStanding, Rating, RatingAverage, RatingEligibility, RatingScore, RatingView,
};
pub use self::rating_ledger::RatingLedger;
pub use self::ride::{
    DriverRideView, Location, PassengerStatus, Ride, RideDraft, RideRequest, RidePassenger,
    RideStatus, RideValidationError, RideView, RosterEntry, RosterSeat, StatusChange,
};
pub use self::ride_ledger::RideLedger;
pub use self::tokens::{IssuedToken, OneTimeToken, TokenDigest, TokenPolicy};

/// Convenient service result alias.
///
/// # Examples
/// ```
/// use campus_rides::domain::{DomainResult, Error};
///
/// fn guard() -> DomainResult<()> {
///     Err(Error::forbidden("nope"))
/// }
/// assert!(guard().is_err());
/// ```
pub type DomainResult<T> = Result<T, Error>;
