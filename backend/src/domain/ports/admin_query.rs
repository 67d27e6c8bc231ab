//! Driving port for administrator listings.

use async_trait::async_trait;

use crate::domain::{Account, Error, Principal, RideView};

/// Read-only projections reserved for administrators.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AdminQuery: Send + Sync {
    /// Approval queue, oldest first.
    async fn list_pending_accounts(&self, acting: &Principal) -> Result<Vec<Account>, Error>;

    /// Every account, newest first.
    async fn list_accounts(&self, acting: &Principal) -> Result<Vec<Account>, Error>;

    /// Every ride, newest first.
    async fn list_all_rides(&self, acting: &Principal) -> Result<Vec<RideView>, Error>;
}
