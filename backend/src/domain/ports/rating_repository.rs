//! Port for rating persistence and rating aggregates.

use async_trait::async_trait;

use crate::domain::{
    AccountId, Location, Rating, RatingAverage, RatingEligibility, RideId,
};

use super::define_port_error;

define_port_error! {
    /// Errors raised by rating repository adapters.
    pub enum RatingRepositoryError for "rating repository" {
        /// The ride already has a rating; raised by the uniqueness backstop.
        DuplicateRating { ride_id: String } => "ride {ride_id} has already been rated",
    }
}

/// Score total and count behind an average.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RatingTotals {
    pub sum: i64,
    pub count: u64,
}

impl From<RatingTotals> for RatingAverage {
    fn from(value: RatingTotals) -> Self {
        Self::from_totals(value.sum, value.count)
    }
}

/// Rating joined with the ride's locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatedRide {
    pub rating: Rating,
    pub pickup: Location,
    pub dropoff: Location,
}

/// Per-driver figures used to build standings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverStatistics {
    pub driver_id: AccountId,
    pub completed_rides: u64,
    pub totals: RatingTotals,
}

/// Port for writing ratings and reading rating projections.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RatingRepository: Send + Sync {
    /// Facts needed to decide whether the ride can be rated, or `None` when
    /// the ride does not exist.
    async fn eligibility(
        &self,
        ride: &RideId,
    ) -> Result<Option<RatingEligibility>, RatingRepositoryError>;

    /// Insert a rating. Fails with `DuplicateRating` when the ride already has
    /// one, even if the caller's eligibility check passed.
    async fn insert(&self, rating: &Rating) -> Result<(), RatingRepositoryError>;

    async fn find_for_ride(&self, ride: &RideId) -> Result<Option<Rating>, RatingRepositoryError>;

    /// Totals of ratings received by `driver`.
    async fn totals_for_driver(&self, driver: &AccountId)
    -> Result<RatingTotals, RatingRepositoryError>;

    /// Totals of ratings given by `student`.
    async fn totals_given_by_student(
        &self,
        student: &AccountId,
    ) -> Result<RatingTotals, RatingRepositoryError>;

    /// Ratings received by `driver`, newest first.
    async fn list_for_driver(
        &self,
        driver: &AccountId,
    ) -> Result<Vec<RatedRide>, RatingRepositoryError>;

    /// Ratings given by `student`, newest first.
    async fn list_given_by_student(
        &self,
        student: &AccountId,
    ) -> Result<Vec<RatedRide>, RatingRepositoryError>;

    /// Completed-ride counts and rating totals for each listed driver.
    /// Drivers without rides still get a zeroed row.
    async fn driver_statistics(
        &self,
        drivers: &[AccountId],
    ) -> Result<Vec<DriverStatistics>, RatingRepositoryError>;
}

/// Fixture implementation for tests that do not exercise rating storage.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureRatingRepository;

#[async_trait]
impl RatingRepository for FixtureRatingRepository {
    async fn eligibility(
        &self,
        _ride: &RideId,
    ) -> Result<Option<RatingEligibility>, RatingRepositoryError> {
        Ok(None)
    }

    async fn insert(&self, _rating: &Rating) -> Result<(), RatingRepositoryError> {
        Ok(())
    }

    async fn find_for_ride(&self, _ride: &RideId) -> Result<Option<Rating>, RatingRepositoryError> {
        Ok(None)
    }

    async fn totals_for_driver(
        &self,
        _driver: &AccountId,
    ) -> Result<RatingTotals, RatingRepositoryError> {
        Ok(RatingTotals::default())
    }

    async fn totals_given_by_student(
        &self,
        _student: &AccountId,
    ) -> Result<RatingTotals, RatingRepositoryError> {
        Ok(RatingTotals::default())
    }

    async fn list_for_driver(
        &self,
        _driver: &AccountId,
    ) -> Result<Vec<RatedRide>, RatingRepositoryError> {
        Ok(Vec::new())
    }

    async fn list_given_by_student(
        &self,
        _student: &AccountId,
    ) -> Result<Vec<RatedRide>, RatingRepositoryError> {
        Ok(Vec::new())
    }

    async fn driver_statistics(
        &self,
        drivers: &[AccountId],
    ) -> Result<Vec<DriverStatistics>, RatingRepositoryError> {
        Ok(drivers
            .iter()
            .map(|driver_id| DriverStatistics {
                driver_id: *driver_id,
                completed_rides: 0,
                totals: RatingTotals::default(),
            })
            .collect())
    }
}
