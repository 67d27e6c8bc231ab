//! Driving port for post-ride ratings.

use async_trait::async_trait;

use crate::domain::{Error, Principal, Rating, RideId};

/// Driving port for rating writes and eligibility checks.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RatingCommand: Send + Sync {
    /// Rate a completed ride as its requesting student.
    async fn rate_ride(
        &self,
        acting: &Principal,
        ride: &RideId,
        score: i64,
        comment: Option<String>,
    ) -> Result<Rating, Error>;

    /// Whether the acting student may still rate `ride`.
    async fn can_rate(&self, acting: &Principal, ride: &RideId) -> Result<bool, Error>;
}
