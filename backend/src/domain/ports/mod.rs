//! Ports for the hexagonal boundary.
//!
//! Driven ports (repositories, outbox, sender, hasher) are what the services
//! in `crate::domain` depend on; adapters under `crate::outbound` implement
//! them. Driving ports (`*Command`, `AdminQuery`) are what the dispatcher
//! offers to inbound adapters.

mod macros;
pub(crate) use macros::define_port_error;

mod account_command;
mod account_repository;
mod admin_query;
mod credential_hasher;
mod notification_outbox;
mod notification_sender;
mod rating_command;
mod rating_repository;
mod ride_command;
mod ride_repository;

#[cfg(test)]
pub use account_command::MockAccountCommand;
pub use account_command::AccountCommand;
#[cfg(test)]
pub use admin_query::MockAdminQuery;
pub use admin_query::AdminQuery;
#[cfg(test)]
pub use rating_command::MockRatingCommand;
pub use rating_command::RatingCommand;
#[cfg(test)]
pub use ride_command::MockRideCommand;
pub use ride_command::{RideCommand, RideCreated};

#[cfg(test)]
pub use account_repository::MockAccountRepository;
pub use account_repository::{
    AccountDeletion, AccountRepository, AccountRepositoryError, FixtureAccountRepository,
};
#[cfg(test)]
pub use credential_hasher::MockCredentialHasher;
pub use credential_hasher::{CredentialHasher, CredentialHasherError, FixtureCredentialHasher};
#[cfg(test)]
pub use notification_outbox::MockNotificationOutbox;
pub use notification_outbox::{
    FixtureNotificationOutbox, NotificationOutbox, NotificationOutboxError,
};
#[cfg(test)]
pub use notification_sender::MockNotificationSender;
pub use notification_sender::{
    FixtureNotificationSender, NotificationSender, NotificationSenderError,
};
#[cfg(test)]
pub use rating_repository::MockRatingRepository;
pub use rating_repository::{
    DriverStatistics, FixtureRatingRepository, RatedRide, RatingRepository, RatingRepositoryError,
    RatingTotals,
};
#[cfg(test)]
pub use ride_repository::MockRideRepository;
pub use ride_repository::{FixtureRideRepository, RideRepository, RideRepositoryError};
