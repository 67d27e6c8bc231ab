//! Port for ride and passenger persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{AccountId, PassengerId, Ride, RideId, RidePassenger, StatusChange};

use super::define_port_error;

define_port_error! {
    /// Errors raised by ride repository adapters.
    pub enum RideRepositoryError for "ride repository" {}
}

/// Port for writing rides and reading ride projections.
///
/// `accept` and `transition` are the only status writers. Both are single
/// conditional writes: the row changes only when its current status is one
/// the move allows, so concurrent callers cannot both win.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RideRepository: Send + Sync {
    async fn insert(&self, ride: &Ride) -> Result<(), RideRepositoryError>;

    /// Move a pending ride to accepted and assign `driver`.
    ///
    /// Returns `false` without side effects when the ride is missing or no
    /// longer pending.
    async fn accept(
        &self,
        id: &RideId,
        driver: &AccountId,
        at: DateTime<Utc>,
    ) -> Result<bool, RideRepositoryError>;

    /// Apply `change` if the ride's current status is an allowed source.
    async fn transition(
        &self,
        id: &RideId,
        change: StatusChange,
        at: DateTime<Utc>,
    ) -> Result<bool, RideRepositoryError>;

    async fn find_by_id(&self, id: &RideId) -> Result<Option<Ride>, RideRepositoryError>;

    /// Rides requested by `student`, newest first.
    async fn list_for_student(&self, student: &AccountId) -> Result<Vec<Ride>, RideRepositoryError>;

    /// Rides assigned to `driver`, newest first.
    async fn list_for_driver(&self, driver: &AccountId) -> Result<Vec<Ride>, RideRepositoryError>;

    /// Pending rides, oldest first.
    async fn list_pending(&self) -> Result<Vec<Ride>, RideRepositoryError>;

    /// Every ride, newest first.
    async fn list_all(&self) -> Result<Vec<Ride>, RideRepositoryError>;

    /// Insert a passenger or reset an existing `(ride, student)` row to
    /// pending. Returns the identifier of the stored row.
    async fn upsert_passenger(
        &self,
        passenger: &RidePassenger,
    ) -> Result<PassengerId, RideRepositoryError>;

    /// Secondary passengers of the given rides.
    async fn list_passengers(
        &self,
        rides: &[RideId],
    ) -> Result<Vec<RidePassenger>, RideRepositoryError>;
}

/// Fixture implementation for tests that do not exercise ride storage.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureRideRepository;

#[async_trait]
impl RideRepository for FixtureRideRepository {
    async fn insert(&self, _ride: &Ride) -> Result<(), RideRepositoryError> {
        Ok(())
    }

    async fn accept(
        &self,
        _id: &RideId,
        _driver: &AccountId,
        _at: DateTime<Utc>,
    ) -> Result<bool, RideRepositoryError> {
        Ok(false)
    }

    async fn transition(
        &self,
        _id: &RideId,
        _change: StatusChange,
        _at: DateTime<Utc>,
    ) -> Result<bool, RideRepositoryError> {
        Ok(false)
    }

    async fn find_by_id(&self, _id: &RideId) -> Result<Option<Ride>, RideRepositoryError> {
        Ok(None)
    }

    async fn list_for_student(
        &self,
        _student: &AccountId,
    ) -> Result<Vec<Ride>, RideRepositoryError> {
        Ok(Vec::new())
    }

    async fn list_for_driver(&self, _driver: &AccountId) -> Result<Vec<Ride>, RideRepositoryError> {
        Ok(Vec::new())
    }

    async fn list_pending(&self) -> Result<Vec<Ride>, RideRepositoryError> {
        Ok(Vec::new())
    }

    async fn list_all(&self) -> Result<Vec<Ride>, RideRepositoryError> {
        Ok(Vec::new())
    }

    async fn upsert_passenger(
        &self,
        passenger: &RidePassenger,
    ) -> Result<PassengerId, RideRepositoryError> {
        Ok(passenger.id)
    }

    async fn list_passengers(
        &self,
        _rides: &[RideId],
    ) -> Result<Vec<RidePassenger>, RideRepositoryError> {
        Ok(Vec::new())
    }
}
