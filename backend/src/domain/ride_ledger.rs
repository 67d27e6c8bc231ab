//! Ride Ledger: ride records, status transitions, and ride projections.
//!
//! Authorisation is the dispatcher's job. The ledger enforces the state
//! machine and the single-winner acceptance guarantee.

use std::collections::HashMap;
use std::sync::Arc;

use mockable::Clock;
use tracing::{info, warn};

use crate::domain::account_registry::map_account_error;
use crate::domain::ports::{AccountRepository, RideRepository, RideRepositoryError};
use crate::domain::{
    Account, AccountContact, AccountId, DriverRideView, Error, ErrorReason, PassengerId,
    PassengerStatus, Ride, RideDraft, RideId, RidePassenger, RideRequest, RideStatus, RideView,
    StatusChange,
};

pub(crate) fn map_ride_error(error: RideRepositoryError) -> Error {
    match error {
        RideRepositoryError::Connection { message } => {
            Error::service_unavailable(format!("ride repository unavailable: {message}"))
        }
        RideRepositoryError::Query { message } => {
            Error::internal(format!("ride repository error: {message}"))
        }
    }
}

/// Ride Ledger service.
#[derive(Clone)]
pub struct RideLedger {
    rides: Arc<dyn RideRepository>,
    accounts: Arc<dyn AccountRepository>,
    clock: Arc<dyn Clock>,
}

impl RideLedger {
    /// Create a new ledger over the ride and account stores.
    pub fn new(
        rides: Arc<dyn RideRepository>,
        accounts: Arc<dyn AccountRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            rides,
            accounts,
            clock,
        }
    }

    /// Record a new pending ride for `student`.
    ///
    /// The pickup time is not required to be in the future.
    pub async fn create_ride(&self, student: AccountId, request: RideRequest) -> Result<Ride, Error> {
        let draft = RideDraft::requested(RideId::random(), student, request, self.clock.utc());
        let ride = Ride::new(draft).map_err(|err| Error::internal(err.to_string()))?;
        self.rides.insert(&ride).await.map_err(map_ride_error)?;
        info!(ride_id = %ride.id(), student_id = %student, "ride requested");
        Ok(ride)
    }

    /// Verified and approved drivers: the pool offered new rides.
    pub async fn list_eligible_drivers(&self) -> Result<Vec<Account>, Error> {
        self.accounts
            .list_active_drivers()
            .await
            .map_err(map_account_error)
    }

    /// Try to claim a pending ride for `driver`.
    ///
    /// Exactly one of several concurrent callers wins. Every other outcome
    /// (missing ride, already accepted, cancelled) is reported as `false`.
    pub async fn accept_ride(&self, ride: &RideId, driver: &AccountId) -> Result<bool, Error> {
        let accepted = self
            .rides
            .accept(ride, driver, self.clock.utc())
            .await
            .map_err(map_ride_error)?;
        if accepted {
            info!(ride_id = %ride, driver_id = %driver, "ride accepted");
        }
        Ok(accepted)
    }

    /// Move a ride to `new_status`.
    ///
    /// Only `in_progress`, `completed`, and `cancelled` may be requested;
    /// anything else is an invalid request. Moves the transition table does
    /// not allow from the ride's current status report `false`.
    pub async fn update_status(&self, ride: &RideId, new_status: RideStatus) -> Result<bool, Error> {
        let change = StatusChange::try_from(new_status)
            .map_err(|err| Error::invalid_request(err.to_string()))?;
        self.apply_change(ride, change).await
    }

    /// Apply a status change with a conditional write.
    pub async fn apply_change(&self, ride: &RideId, change: StatusChange) -> Result<bool, Error> {
        let applied = self
            .rides
            .transition(ride, change, self.clock.utc())
            .await
            .map_err(map_ride_error)?;
        if applied {
            info!(ride_id = %ride, status = %change.target(), "ride status changed");
        }
        Ok(applied)
    }

    /// Fetch the raw ride record.
    pub async fn find(&self, ride: &RideId) -> Result<Ride, Error> {
        self.rides
            .find_by_id(ride)
            .await
            .map_err(map_ride_error)?
            .ok_or_else(|| Error::not_found(format!("ride {ride} not found")))
    }

    /// Fetch a ride together with its participants' contact details.
    pub async fn get_by_id(&self, ride: &RideId) -> Result<RideView, Error> {
        let ride = self.find(ride).await?;
        let id = ride.id();
        self.attach_parties(vec![ride])
            .await?
            .pop()
            .ok_or_else(|| Error::not_found(format!("ride {id} not found")))
    }

    /// Rides requested by `student`, newest first.
    pub async fn list_for_student(&self, student: &AccountId) -> Result<Vec<RideView>, Error> {
        let rides = self
            .rides
            .list_for_student(student)
            .await
            .map_err(map_ride_error)?;
        self.attach_parties(rides).await
    }

    /// Rides assigned to `driver`, newest first, each with its roster.
    pub async fn list_for_driver(&self, driver: &AccountId) -> Result<Vec<DriverRideView>, Error> {
        let rides = self
            .rides
            .list_for_driver(driver)
            .await
            .map_err(map_ride_error)?;
        let ride_ids: Vec<RideId> = rides.iter().map(Ride::id).collect();
        let views = self.attach_parties(rides).await?;

        let passengers = self
            .rides
            .list_passengers(&ride_ids)
            .await
            .map_err(map_ride_error)?;
        let passenger_ids: Vec<AccountId> = passengers.iter().map(|p| p.student_id).collect();
        let contacts = self.contacts(&passenger_ids).await?;

        let mut by_ride: HashMap<RideId, Vec<(RidePassenger, AccountContact)>> = HashMap::new();
        for passenger in passengers {
            if let Some(contact) = contacts.get(&passenger.student_id) {
                by_ride
                    .entry(passenger.ride_id)
                    .or_default()
                    .push((passenger, contact.clone()));
            }
        }

        Ok(views
            .into_iter()
            .map(|view| {
                let secondary = by_ride.remove(&view.ride.id()).unwrap_or_default();
                DriverRideView::assemble(view, secondary)
            })
            .collect())
    }

    /// Open requests for drivers to browse, oldest first.
    pub async fn list_pending(&self) -> Result<Vec<RideView>, Error> {
        let rides = self.rides.list_pending().await.map_err(map_ride_error)?;
        self.attach_parties(rides).await
    }

    /// Every ride, newest first.
    pub async fn list_all(&self) -> Result<Vec<RideView>, Error> {
        let rides = self.rides.list_all().await.map_err(map_ride_error)?;
        self.attach_parties(rides).await
    }

    /// Add a secondary passenger, or reset an existing one to pending.
    pub async fn add_passenger(&self, ride: &RideId, student: &AccountId) -> Result<PassengerId, Error> {
        let record = self.find(ride).await?;
        if record.student_id() == *student {
            return Err(Error::invalid_request(
                "the ride's requester is already its primary rider",
            ));
        }
        if record.status().is_terminal() {
            return Err(
                Error::conflict(format!("cannot add passengers to a {} ride", record.status()))
                    .with_reason(ErrorReason::RideState),
            );
        }
        if self
            .accounts
            .find_by_id(student)
            .await
            .map_err(map_account_error)?
            .is_none()
        {
            return Err(Error::not_found(format!("account {student} not found")));
        }

        let passenger = RidePassenger {
            id: PassengerId::random(),
            ride_id: *ride,
            student_id: *student,
            status: PassengerStatus::Pending,
        };
        self.rides
            .upsert_passenger(&passenger)
            .await
            .map_err(map_ride_error)
    }

    async fn contacts(&self, ids: &[AccountId]) -> Result<HashMap<AccountId, AccountContact>, Error> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let mut unique = ids.to_vec();
        unique.sort_unstable();
        unique.dedup();
        let accounts = self
            .accounts
            .find_many(&unique)
            .await
            .map_err(map_account_error)?;
        Ok(accounts
            .into_iter()
            .map(|account| (account.id(), account.contact()))
            .collect())
    }

    async fn attach_parties(&self, rides: Vec<Ride>) -> Result<Vec<RideView>, Error> {
        let ids: Vec<AccountId> = rides
            .iter()
            .flat_map(|ride| std::iter::once(ride.student_id()).chain(ride.driver_id()))
            .collect();
        let contacts = self.contacts(&ids).await?;

        Ok(rides
            .into_iter()
            .filter_map(|ride| {
                let Some(student) = contacts.get(&ride.student_id()).cloned() else {
                    warn!(ride_id = %ride.id(), "ride requester is missing; skipping");
                    return None;
                };
                let driver = ride.driver_id().and_then(|id| contacts.get(&id).cloned());
                Some(RideView {
                    ride,
                    student,
                    driver,
                })
            })
            .collect())
    }
}

#[cfg(test)]
#[path = "ride_ledger_tests.rs"]
mod tests;
