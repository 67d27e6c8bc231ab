//! Driving port for ride requests and their lifecycle.

use async_trait::async_trait;

use crate::domain::{AccountId, Error, PassengerId, Principal, Ride, RideId, RideRequest, RideStatus};

/// A newly created ride and how many drivers were told about it.
#[derive(Debug, Clone)]
pub struct RideCreated {
    pub ride: Ride,
    /// Diagnostic only; a low number never rolls back the ride.
    pub drivers_notified: usize,
}

/// Driving port for ride writes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RideCommand: Send + Sync {
    /// Create a ride for a participating student and offer it to every
    /// eligible driver.
    async fn create_ride(
        &self,
        acting: &Principal,
        request: RideRequest,
    ) -> Result<RideCreated, Error>;

    /// Claim a pending ride for the acting driver.
    ///
    /// Returns `false` when another driver got there first or the ride is
    /// gone; the loser sees no side effects.
    async fn accept_ride(&self, acting: &Principal, ride: &RideId) -> Result<bool, Error>;

    /// Move a ride to `new_status` on behalf of a party to the ride.
    ///
    /// Start and complete belong to the assigned driver; cancel to the
    /// requesting student or the assigned driver. Admins may do all three.
    async fn update_ride_status(
        &self,
        acting: &Principal,
        ride: &RideId,
        new_status: RideStatus,
    ) -> Result<bool, Error>;

    /// Add a secondary passenger. Only the requesting student or an admin
    /// may do this.
    async fn add_passenger(
        &self,
        acting: &Principal,
        ride: &RideId,
        student: &AccountId,
    ) -> Result<PassengerId, Error>;
}
