//! Rating Ledger: one rating per completed ride, plus rating aggregates.

use std::collections::HashMap;
use std::sync::Arc;

use mockable::Clock;
use tracing::info;

use crate::domain::account_registry::map_account_error;
use crate::domain::ports::{AccountRepository, RatedRide, RatingRepository, RatingRepositoryError};
use crate::domain::rating::{normalise_comment, rank_standings};
use crate::domain::{
    AccountContact, AccountId, DriverStanding, Error, ErrorReason, Rating, RatingAverage,
    RatingId, RatingScore, RatingView, RideId,
};

fn map_rating_error(error: RatingRepositoryError) -> Error {
    match error {
        RatingRepositoryError::Connection { message } => {
            Error::service_unavailable(format!("rating repository unavailable: {message}"))
        }
        RatingRepositoryError::Query { message } => {
            Error::internal(format!("rating repository error: {message}"))
        }
        RatingRepositoryError::DuplicateRating { ride_id } => {
            Error::conflict(format!("ride {ride_id} has already been rated"))
                .with_reason(ErrorReason::DuplicateRating)
        }
    }
}

/// Whose perspective a rating listing is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Perspective {
    Driver,
    Student,
}

/// Rating Ledger service.
#[derive(Clone)]
pub struct RatingLedger {
    ratings: Arc<dyn RatingRepository>,
    accounts: Arc<dyn AccountRepository>,
    clock: Arc<dyn Clock>,
}

impl RatingLedger {
    /// Create a new ledger over the rating and account stores.
    pub fn new(
        ratings: Arc<dyn RatingRepository>,
        accounts: Arc<dyn AccountRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ratings,
            accounts,
            clock,
        }
    }

    /// Whether `student` owns the ride, the ride is completed, and it has no
    /// rating yet.
    pub async fn can_rate(&self, ride: &RideId, student: &AccountId) -> Result<bool, Error> {
        Ok(self
            .ratings
            .eligibility(ride)
            .await
            .map_err(map_rating_error)?
            .is_some_and(|facts| facts.allows(*student)))
    }

    /// Rate a completed ride.
    ///
    /// The eligibility check is advisory; the store's uniqueness constraint
    /// decides races and surfaces as `Conflict` with `duplicate_rating`.
    pub async fn create_rating(
        &self,
        ride: &RideId,
        student: &AccountId,
        score: i64,
        comment: Option<String>,
    ) -> Result<Rating, Error> {
        let score = RatingScore::new(score)?;
        let comment = normalise_comment(comment)?;

        let facts = self
            .ratings
            .eligibility(ride)
            .await
            .map_err(map_rating_error)?
            .ok_or_else(|| Error::not_found(format!("ride {ride} not found")))?;
        let driver_id = facts.rated_driver(*student)?;

        let rating = Rating {
            id: RatingId::random(),
            ride_id: *ride,
            student_id: *student,
            driver_id,
            score,
            comment,
            created_at: self.clock.utc(),
        };
        self.ratings
            .insert(&rating)
            .await
            .map_err(map_rating_error)?;
        info!(ride_id = %ride, driver_id = %driver_id, score = score.value(), "ride rated");
        Ok(rating)
    }

    /// Average received by `driver`; `{0, 0}` when unrated.
    pub async fn driver_average(&self, driver: &AccountId) -> Result<RatingAverage, Error> {
        self.ratings
            .totals_for_driver(driver)
            .await
            .map(RatingAverage::from)
            .map_err(map_rating_error)
    }

    /// Average of the scores `student` has handed out.
    pub async fn student_average_given(&self, student: &AccountId) -> Result<RatingAverage, Error> {
        self.ratings
            .totals_given_by_student(student)
            .await
            .map(RatingAverage::from)
            .map_err(map_rating_error)
    }

    /// Rating left for `ride`, if the student has rated it yet.
    pub async fn get_for_ride(&self, ride: &RideId) -> Result<Option<Rating>, Error> {
        self.ratings
            .find_for_ride(ride)
            .await
            .map_err(map_rating_error)
    }

    /// Ratings received by `driver`, newest first, naming each rater.
    pub async fn list_for_driver(&self, driver: &AccountId) -> Result<Vec<RatingView>, Error> {
        let rated = self
            .ratings
            .list_for_driver(driver)
            .await
            .map_err(map_rating_error)?;
        self.with_counterparts(rated, Perspective::Driver).await
    }

    /// Ratings given by `student`, newest first, naming each driver.
    pub async fn list_given_by_student(&self, student: &AccountId) -> Result<Vec<RatingView>, Error> {
        let rated = self
            .ratings
            .list_given_by_student(student)
            .await
            .map_err(map_rating_error)?;
        self.with_counterparts(rated, Perspective::Student).await
    }

    /// Active drivers ranked by average, then completed rides.
    pub async fn driver_standings(&self) -> Result<Vec<DriverStanding>, Error> {
        let drivers = self
            .accounts
            .list_active_drivers()
            .await
            .map_err(map_account_error)?;
        let ids: Vec<AccountId> = drivers.iter().map(|driver| driver.id()).collect();
        let mut statistics: HashMap<AccountId, _> = self
            .ratings
            .driver_statistics(&ids)
            .await
            .map_err(map_rating_error)?
            .into_iter()
            .map(|row| (row.driver_id, row))
            .collect();

        let mut standings: Vec<DriverStanding> = drivers
            .into_iter()
            .map(|driver| {
                let row = statistics.remove(&driver.id());
                DriverStanding {
                    driver: driver.contact(),
                    completed_rides: row.map_or(0, |row| row.completed_rides),
                    rating: row.map_or(RatingAverage::EMPTY, |row| row.totals.into()),
                }
            })
            .collect();
        rank_standings(&mut standings);
        Ok(standings)
    }

    async fn with_counterparts(
        &self,
        rated: Vec<RatedRide>,
        perspective: Perspective,
    ) -> Result<Vec<RatingView>, Error> {
        let counterpart_of = |rating: &Rating| match perspective {
            Perspective::Driver => rating.student_id,
            Perspective::Student => rating.driver_id,
        };
        let mut ids: Vec<AccountId> = rated.iter().map(|row| counterpart_of(&row.rating)).collect();
        ids.sort_unstable();
        ids.dedup();
        let contacts: HashMap<AccountId, AccountContact> = if ids.is_empty() {
            HashMap::new()
        } else {
            self.accounts
                .find_many(&ids)
                .await
                .map_err(map_account_error)?
                .into_iter()
                .map(|account| (account.id(), account.contact()))
                .collect()
        };

        Ok(rated
            .into_iter()
            .map(|row| {
                let counterpart = contacts.get(&counterpart_of(&row.rating)).cloned();
                RatingView {
                    rating: row.rating,
                    pickup: row.pickup,
                    dropoff: row.dropoff,
                    counterpart,
                }
            })
            .collect())
    }
}

#[cfg(test)]
#[path = "rating_ledger_tests.rs"]
mod tests;
