//! PostgreSQL-backed `RideRepository` implementation using Diesel ORM.
//!
//! Status writes are compare-and-swap updates filtered on the current status;
//! the affected row count tells the caller whether it won.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use crate::domain::ports::{RideRepository, RideRepositoryError};
use crate::domain::{
    AccountId, Location, PassengerId, PassengerStatus, Ride, RideDraft, RideId, RidePassenger,
    RideStatus, StatusChange,
};

use super::diesel_basic_error_mapping::{map_basic_diesel_error, map_basic_pool_error};
use super::models::{NewRidePassengerRow, NewRideRow, RidePassengerRow, RideRow};
use super::pool::{DbPool, PoolError};
use super::schema::{ride_passengers, rides};

/// Diesel-backed implementation of the ride repository port.
#[derive(Clone)]
pub struct DieselRideRepository {
    pool: DbPool,
}

impl DieselRideRepository {
    /// Create a new ride repository over the shared pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> RideRepositoryError {
    map_basic_pool_error(error, RideRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> RideRepositoryError {
    map_basic_diesel_error(
        error,
        RideRepositoryError::query,
        RideRepositoryError::connection,
    )
}

fn corrupt(err: impl std::fmt::Display) -> RideRepositoryError {
    RideRepositoryError::query(format!("stored ride is invalid: {err}"))
}

pub(super) fn row_to_ride(row: RideRow) -> Result<Ride, RideRepositoryError> {
    Ride::new(RideDraft {
        id: RideId::from_uuid(row.id),
        student_id: AccountId::from_uuid(row.student_id),
        driver_id: row.driver_id.map(AccountId::from_uuid),
        pickup: Location::from_stored(row.pickup_location),
        dropoff: Location::from_stored(row.dropoff_location),
        pickup_time: row.pickup_time,
        status: row.status.parse::<RideStatus>().map_err(corrupt)?,
        notes: row.notes,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
    .map_err(corrupt)
}

fn rows_to_rides(rows: Vec<RideRow>) -> Result<Vec<Ride>, RideRepositoryError> {
    rows.into_iter().map(row_to_ride).collect()
}

fn row_to_passenger(row: RidePassengerRow) -> Result<RidePassenger, RideRepositoryError> {
    Ok(RidePassenger {
        id: PassengerId::from_uuid(row.id),
        ride_id: RideId::from_uuid(row.ride_id),
        student_id: AccountId::from_uuid(row.student_id),
        status: row.status.parse::<PassengerStatus>().map_err(corrupt)?,
    })
}

fn status_names(statuses: &[RideStatus]) -> Vec<&'static str> {
    statuses.iter().map(|status| status.as_str()).collect()
}

#[async_trait]
impl RideRepository for DieselRideRepository {
    async fn insert(&self, ride: &Ride) -> Result<(), RideRepositoryError> {
        let row = NewRideRow {
            id: *ride.id().as_uuid(),
            student_id: *ride.student_id().as_uuid(),
            driver_id: ride.driver_id().map(|id| *id.as_uuid()),
            pickup_location: ride.pickup().as_str(),
            dropoff_location: ride.dropoff().as_str(),
            pickup_time: ride.pickup_time(),
            status: ride.status().as_str(),
            notes: ride.notes(),
            created_at: ride.created_at(),
            updated_at: ride.updated_at(),
        };
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::insert_into(rides::table)
            .values(&row)
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn accept(
        &self,
        id: &RideId,
        driver: &AccountId,
        at: DateTime<Utc>,
    ) -> Result<bool, RideRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let updated = diesel::update(
            rides::table
                .filter(rides::id.eq(id.as_uuid()))
                .filter(rides::status.eq(RideStatus::Pending.as_str())),
        )
        .set((
            rides::status.eq(RideStatus::Accepted.as_str()),
            rides::driver_id.eq(Some(*driver.as_uuid())),
            rides::updated_at.eq(at),
        ))
        .execute(&mut conn)
        .await
        .map_err(map_diesel_error)?;
        Ok(updated > 0)
    }

    async fn transition(
        &self,
        id: &RideId,
        change: StatusChange,
        at: DateTime<Utc>,
    ) -> Result<bool, RideRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let updated = diesel::update(
            rides::table
                .filter(rides::id.eq(id.as_uuid()))
                .filter(rides::status.eq_any(status_names(change.allowed_sources()))),
        )
        .set((
            rides::status.eq(change.target().as_str()),
            rides::updated_at.eq(at),
        ))
        .execute(&mut conn)
        .await
        .map_err(map_diesel_error)?;
        Ok(updated > 0)
    }

    async fn find_by_id(&self, id: &RideId) -> Result<Option<Ride>, RideRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        rides::table
            .filter(rides::id.eq(id.as_uuid()))
            .select(RideRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?
            .map(row_to_ride)
            .transpose()
    }

    async fn list_for_student(&self, student: &AccountId) -> Result<Vec<Ride>, RideRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows = rides::table
            .filter(rides::student_id.eq(student.as_uuid()))
            .order((rides::created_at.desc(), rides::id.desc()))
            .select(RideRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows_to_rides(rows)
    }

    async fn list_for_driver(&self, driver: &AccountId) -> Result<Vec<Ride>, RideRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows = rides::table
            .filter(rides::driver_id.eq(driver.as_uuid()))
            .order((rides::created_at.desc(), rides::id.desc()))
            .select(RideRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows_to_rides(rows)
    }

    async fn list_pending(&self) -> Result<Vec<Ride>, RideRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows = rides::table
            .filter(rides::status.eq(RideStatus::Pending.as_str()))
            .order((rides::created_at.asc(), rides::id.asc()))
            .select(RideRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows_to_rides(rows)
    }

    async fn list_all(&self) -> Result<Vec<Ride>, RideRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows = rides::table
            .order((rides::created_at.desc(), rides::id.desc()))
            .select(RideRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows_to_rides(rows)
    }

    async fn upsert_passenger(
        &self,
        passenger: &RidePassenger,
    ) -> Result<PassengerId, RideRepositoryError> {
        let row = NewRidePassengerRow {
            id: *passenger.id.as_uuid(),
            ride_id: *passenger.ride_id.as_uuid(),
            student_id: *passenger.student_id.as_uuid(),
            status: passenger.status.as_str(),
        };
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let stored: Uuid = diesel::insert_into(ride_passengers::table)
            .values(&row)
            .on_conflict((ride_passengers::ride_id, ride_passengers::student_id))
            .do_update()
            .set(ride_passengers::status.eq(excluded(ride_passengers::status)))
            .returning(ride_passengers::id)
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(PassengerId::from_uuid(stored))
    }

    async fn list_passengers(
        &self,
        rides: &[RideId],
    ) -> Result<Vec<RidePassenger>, RideRepositoryError> {
        if rides.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = rides.iter().map(|id| *id.as_uuid()).collect();
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows = ride_passengers::table
            .filter(ride_passengers::ride_id.eq_any(ids))
            .order((ride_passengers::created_at.asc(), ride_passengers::id.asc()))
            .select(RidePassengerRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter().map(row_to_passenger).collect()
    }
}
