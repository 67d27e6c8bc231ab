//! PostgreSQL-backed `RatingRepository` implementation using Diesel ORM.
//!
//! The unique index on `ratings.ride_id` is the final word on duplicates;
//! a violation surfaces as `DuplicateRating` even when the eligibility read
//! raced with another insert.

use std::collections::HashMap;

use async_trait::async_trait;
use diesel::dsl::{count_star, exists, sum};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use crate::domain::ports::{
    DriverStatistics, RatedRide, RatingRepository, RatingRepositoryError, RatingTotals,
};
use crate::domain::{
    AccountId, Location, Rating, RatingEligibility, RatingId, RatingScore, RideId, RideStatus,
};

use super::diesel_basic_error_mapping::{
    is_unique_violation, map_basic_diesel_error, map_basic_pool_error,
};
use super::models::{NewRatingRow, RatingRow};
use super::pool::{DbPool, PoolError};
use super::schema::{ratings, rides};

const RIDE_UNIQUE_INDEX: &str = "ratings_ride_id_key";

/// Diesel-backed implementation of the rating repository port.
#[derive(Clone)]
pub struct DieselRatingRepository {
    pool: DbPool,
}

impl DieselRatingRepository {
    /// Create a new rating repository over the shared pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> RatingRepositoryError {
    map_basic_pool_error(error, RatingRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> RatingRepositoryError {
    map_basic_diesel_error(
        error,
        RatingRepositoryError::query,
        RatingRepositoryError::connection,
    )
}

fn map_insert_error(error: diesel::result::Error, ride: &RideId) -> RatingRepositoryError {
    if is_unique_violation(&error, RIDE_UNIQUE_INDEX) {
        RatingRepositoryError::duplicate_rating(ride.to_string())
    } else {
        map_diesel_error(error)
    }
}

fn row_to_rating(row: RatingRow) -> Result<Rating, RatingRepositoryError> {
    let score = RatingScore::new(i64::from(row.score)).map_err(|err| {
        RatingRepositoryError::query(format!("stored rating is invalid: {}", err.message()))
    })?;
    Ok(Rating {
        id: RatingId::from_uuid(row.id),
        ride_id: RideId::from_uuid(row.ride_id),
        student_id: AccountId::from_uuid(row.student_id),
        driver_id: AccountId::from_uuid(row.driver_id),
        score,
        comment: row.comment,
        created_at: row.created_at,
    })
}

fn rated_ride(
    (row, pickup, dropoff): (RatingRow, String, String),
) -> Result<RatedRide, RatingRepositoryError> {
    Ok(RatedRide {
        rating: row_to_rating(row)?,
        pickup: Location::from_stored(pickup),
        dropoff: Location::from_stored(dropoff),
    })
}

fn totals((sum, count): (Option<i64>, i64)) -> RatingTotals {
    RatingTotals {
        sum: sum.unwrap_or(0),
        count: u64::try_from(count).unwrap_or(0),
    }
}

#[async_trait]
impl RatingRepository for DieselRatingRepository {
    async fn eligibility(
        &self,
        ride: &RideId,
    ) -> Result<Option<RatingEligibility>, RatingRepositoryError> {
        let ride_id = *ride.as_uuid();
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let facts = rides::table
            .filter(rides::id.eq(ride_id))
            .select((
                rides::student_id,
                rides::driver_id,
                rides::status,
                exists(ratings::table.filter(ratings::ride_id.eq(ride_id))),
            ))
            .first::<(Uuid, Option<Uuid>, String, bool)>(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;

        facts
            .map(|(student_id, driver_id, status, already_rated)| {
                let status = status.parse::<RideStatus>().map_err(|err| {
                    RatingRepositoryError::query(format!("stored ride is invalid: {err}"))
                })?;
                Ok(RatingEligibility {
                    student_id: AccountId::from_uuid(student_id),
                    driver_id: driver_id.map(AccountId::from_uuid),
                    status,
                    already_rated,
                })
            })
            .transpose()
    }

    async fn insert(&self, rating: &Rating) -> Result<(), RatingRepositoryError> {
        let row = NewRatingRow {
            id: *rating.id.as_uuid(),
            ride_id: *rating.ride_id.as_uuid(),
            student_id: *rating.student_id.as_uuid(),
            driver_id: *rating.driver_id.as_uuid(),
            score: i16::from(rating.score.value()),
            comment: rating.comment.as_deref(),
            created_at: rating.created_at,
        };
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::insert_into(ratings::table)
            .values(&row)
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(|err| map_insert_error(err, &rating.ride_id))
    }

    async fn find_for_ride(&self, ride: &RideId) -> Result<Option<Rating>, RatingRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        ratings::table
            .filter(ratings::ride_id.eq(ride.as_uuid()))
            .select(RatingRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?
            .map(row_to_rating)
            .transpose()
    }

    async fn totals_for_driver(
        &self,
        driver: &AccountId,
    ) -> Result<RatingTotals, RatingRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        ratings::table
            .filter(ratings::driver_id.eq(driver.as_uuid()))
            .select((sum(ratings::score), count_star()))
            .get_result::<(Option<i64>, i64)>(&mut conn)
            .await
            .map(totals)
            .map_err(map_diesel_error)
    }

    async fn totals_given_by_student(
        &self,
        student: &AccountId,
    ) -> Result<RatingTotals, RatingRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        ratings::table
            .filter(ratings::student_id.eq(student.as_uuid()))
            .select((sum(ratings::score), count_star()))
            .get_result::<(Option<i64>, i64)>(&mut conn)
            .await
            .map(totals)
            .map_err(map_diesel_error)
    }

    async fn list_for_driver(
        &self,
        driver: &AccountId,
    ) -> Result<Vec<RatedRide>, RatingRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows = ratings::table
            .inner_join(rides::table)
            .filter(ratings::driver_id.eq(driver.as_uuid()))
            .order((ratings::created_at.desc(), ratings::id.desc()))
            .select((
                RatingRow::as_select(),
                rides::pickup_location,
                rides::dropoff_location,
            ))
            .load::<(RatingRow, String, String)>(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter().map(rated_ride).collect()
    }

    async fn list_given_by_student(
        &self,
        student: &AccountId,
    ) -> Result<Vec<RatedRide>, RatingRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows = ratings::table
            .inner_join(rides::table)
            .filter(ratings::student_id.eq(student.as_uuid()))
            .order((ratings::created_at.desc(), ratings::id.desc()))
            .select((
                RatingRow::as_select(),
                rides::pickup_location,
                rides::dropoff_location,
            ))
            .load::<(RatingRow, String, String)>(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter().map(rated_ride).collect()
    }

    async fn driver_statistics(
        &self,
        drivers: &[AccountId],
    ) -> Result<Vec<DriverStatistics>, RatingRepositoryError> {
        if drivers.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = drivers.iter().map(|id| *id.as_uuid()).collect();
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let completed: HashMap<Uuid, i64> = rides::table
            .filter(rides::driver_id.eq_any(&ids))
            .filter(rides::status.eq(RideStatus::Completed.as_str()))
            .group_by(rides::driver_id)
            .select((rides::driver_id, count_star()))
            .load::<(Option<Uuid>, i64)>(&mut conn)
            .await
            .map_err(map_diesel_error)?
            .into_iter()
            .filter_map(|(driver, count)| driver.map(|driver| (driver, count)))
            .collect();

        let rated: HashMap<Uuid, RatingTotals> = ratings::table
            .filter(ratings::driver_id.eq_any(&ids))
            .group_by(ratings::driver_id)
            .select((ratings::driver_id, sum(ratings::score), count_star()))
            .load::<(Uuid, Option<i64>, i64)>(&mut conn)
            .await
            .map_err(map_diesel_error)?
            .into_iter()
            .map(|(driver, total, count)| (driver, totals((total, count))))
            .collect();

        Ok(drivers
            .iter()
            .map(|driver| DriverStatistics {
                driver_id: *driver,
                completed_rides: completed
                    .get(driver.as_uuid())
                    .map_or(0, |count| u64::try_from(*count).unwrap_or(0)),
                totals: rated.get(driver.as_uuid()).copied().unwrap_or_default(),
            })
            .collect())
    }
}
