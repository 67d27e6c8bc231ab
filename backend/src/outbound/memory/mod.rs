//! In-memory datastore implementing every driven port.
//!
//! All state sits behind one mutex, so each port call is a single atomic
//! step, matching the conditional-write guarantees of the SQL adapters.
//! Expiry checks use the injected clock in place of the datastore's `now()`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockable::Clock;

use crate::domain::ports::{
    AccountDeletion, AccountRepository, AccountRepositoryError, DriverStatistics,
    NotificationOutbox, NotificationOutboxError, RatedRide, RatingRepository,
    RatingRepositoryError, RatingTotals, RideRepository, RideRepositoryError,
};
use crate::domain::{
    Account, AccountId, AccountPatch, CredentialDigest, DeliveryState, EmailAddress, IntentId,
    NotificationIntent, PassengerId, Rating, RatingEligibility, Ride, RideId, RidePassenger,
    RideStatus, Role, StatusChange, TokenDigest, without_secrets,
};

#[derive(Debug, Clone)]
struct PendingToken {
    digest: TokenDigest,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct StoredAccount {
    seq: u64,
    account: Account,
    verification: Option<PendingToken>,
    reset: Option<PendingToken>,
}

#[derive(Debug, Clone)]
struct StoredRide {
    seq: u64,
    ride: Ride,
}

#[derive(Debug, Default)]
struct DatastoreState {
    next_seq: u64,
    accounts: HashMap<AccountId, StoredAccount>,
    rides: HashMap<RideId, StoredRide>,
    passengers: Vec<RidePassenger>,
    ratings: HashMap<RideId, (u64, Rating)>,
    outbox: HashMap<IntentId, (u64, NotificationIntent)>,
}

impl DatastoreState {
    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn email_taken(&self, email: &EmailAddress, except: Option<AccountId>) -> bool {
        self.accounts
            .values()
            .any(|stored| stored.account.email() == email && Some(stored.account.id()) != except)
    }

    fn accounts_sorted(&self, filter: impl Fn(&Account) -> bool) -> Vec<&StoredAccount> {
        let mut rows: Vec<&StoredAccount> = self
            .accounts
            .values()
            .filter(|stored| filter(&stored.account))
            .collect();
        rows.sort_by_key(|stored| (stored.account.created_at(), stored.seq));
        rows
    }

    fn rides_sorted(&self, filter: impl Fn(&Ride) -> bool) -> Vec<&StoredRide> {
        let mut rows: Vec<&StoredRide> = self
            .rides
            .values()
            .filter(|stored| filter(&stored.ride))
            .collect();
        rows.sort_by_key(|stored| (stored.ride.created_at(), stored.seq));
        rows
    }

    fn rated_rides(&self, filter: impl Fn(&Rating) -> bool) -> Vec<RatedRide> {
        let mut rows: Vec<&(u64, Rating)> = self
            .ratings
            .values()
            .filter(|(_, rating)| filter(rating))
            .collect();
        rows.sort_by_key(|(seq, rating)| std::cmp::Reverse((rating.created_at, *seq)));
        rows.into_iter()
            .filter_map(|(_, rating)| {
                let stored = self.rides.get(&rating.ride_id)?;
                Some(RatedRide {
                    rating: rating.clone(),
                    pickup: stored.ride.pickup().clone(),
                    dropoff: stored.ride.dropoff().clone(),
                })
            })
            .collect()
    }

    fn totals(&self, filter: impl Fn(&Rating) -> bool) -> RatingTotals {
        self.ratings
            .values()
            .filter(|(_, rating)| filter(rating))
            .fold(RatingTotals::default(), |totals, (_, rating)| RatingTotals {
                sum: totals.sum + i64::from(rating.score.value()),
                count: totals.count + 1,
            })
    }
}

/// Process-local datastore for tests and local runs.
pub struct InMemoryDatastore {
    state: Mutex<DatastoreState>,
    clock: Arc<dyn Clock>,
}

impl InMemoryDatastore {
    /// Create a new, empty datastore stamping rows with `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(DatastoreState::default()),
            clock,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, DatastoreState>, String> {
        self.state
            .lock()
            .map_err(|_| "in-memory datastore lock poisoned".to_owned())
    }

    /// Snapshot of every intent in the outbox, oldest first.
    pub fn outbox_snapshot(&self) -> Vec<NotificationIntent> {
        let Ok(state) = self.lock() else {
            return Vec::new();
        };
        let mut rows: Vec<&(u64, NotificationIntent)> = state.outbox.values().collect();
        rows.sort_by_key(|(seq, _)| *seq);
        rows.into_iter().map(|(_, intent)| intent.clone()).collect()
    }
}

fn ride_sorted_newest(rows: Vec<&StoredRide>) -> Vec<Ride> {
    rows.into_iter().rev().map(|stored| stored.ride.clone()).collect()
}

#[async_trait]
impl AccountRepository for InMemoryDatastore {
    async fn insert(&self, account: &Account) -> Result<(), AccountRepositoryError> {
        let mut state = self.lock().map_err(AccountRepositoryError::connection)?;
        if state.email_taken(account.email(), None) {
            return Err(AccountRepositoryError::duplicate_email(
                account.email().as_ref(),
            ));
        }
        let seq = state.next_seq();
        state.accounts.insert(
            account.id(),
            StoredAccount {
                seq,
                account: account.clone(),
                verification: None,
                reset: None,
            },
        );
        Ok(())
    }

    async fn find_by_id(&self, id: &AccountId) -> Result<Option<Account>, AccountRepositoryError> {
        let state = self.lock().map_err(AccountRepositoryError::connection)?;
        Ok(state.accounts.get(id).map(|stored| stored.account.clone()))
    }

    async fn find_by_email(
        &self,
        email: &EmailAddress,
    ) -> Result<Option<Account>, AccountRepositoryError> {
        let state = self.lock().map_err(AccountRepositoryError::connection)?;
        Ok(state
            .accounts
            .values()
            .find(|stored| stored.account.email() == email)
            .map(|stored| stored.account.clone()))
    }

    async fn find_many(&self, ids: &[AccountId]) -> Result<Vec<Account>, AccountRepositoryError> {
        let state = self.lock().map_err(AccountRepositoryError::connection)?;
        Ok(ids
            .iter()
            .filter_map(|id| state.accounts.get(id))
            .map(|stored| stored.account.clone())
            .collect())
    }

    async fn list_pending_approval(&self) -> Result<Vec<Account>, AccountRepositoryError> {
        let state = self.lock().map_err(AccountRepositoryError::connection)?;
        Ok(state
            .accounts_sorted(|account| account.is_verified() && !account.is_approved())
            .into_iter()
            .map(|stored| stored.account.clone())
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<Account>, AccountRepositoryError> {
        let state = self.lock().map_err(AccountRepositoryError::connection)?;
        Ok(state
            .accounts_sorted(|_| true)
            .into_iter()
            .rev()
            .map(|stored| stored.account.clone())
            .collect())
    }

    async fn list_active_drivers(&self) -> Result<Vec<Account>, AccountRepositoryError> {
        let state = self.lock().map_err(AccountRepositoryError::connection)?;
        Ok(state
            .accounts_sorted(Account::is_active_driver)
            .into_iter()
            .map(|stored| stored.account.clone())
            .collect())
    }

    async fn store_verification_token(
        &self,
        id: &AccountId,
        digest: &TokenDigest,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AccountRepositoryError> {
        let mut state = self.lock().map_err(AccountRepositoryError::connection)?;
        if let Some(stored) = state.accounts.get_mut(id) {
            stored.verification = Some(PendingToken {
                digest: digest.clone(),
                expires_at,
            });
        }
        Ok(())
    }

    async fn consume_verification_token(
        &self,
        digest: &TokenDigest,
    ) -> Result<Option<AccountId>, AccountRepositoryError> {
        let now = self.clock.utc();
        let mut state = self.lock().map_err(AccountRepositoryError::connection)?;
        let Some(stored) = state.accounts.values_mut().find(|stored| {
            stored
                .verification
                .as_ref()
                .is_some_and(|token| &token.digest == digest && token.expires_at > now)
        }) else {
            return Ok(None);
        };
        stored.verification = None;
        stored.account.mark_verified();
        Ok(Some(stored.account.id()))
    }

    async fn store_reset_token(
        &self,
        id: &AccountId,
        digest: &TokenDigest,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AccountRepositoryError> {
        let mut state = self.lock().map_err(AccountRepositoryError::connection)?;
        if let Some(stored) = state.accounts.get_mut(id) {
            stored.reset = Some(PendingToken {
                digest: digest.clone(),
                expires_at,
            });
        }
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        digest: &TokenDigest,
        credential: &CredentialDigest,
    ) -> Result<bool, AccountRepositoryError> {
        let now = self.clock.utc();
        let mut state = self.lock().map_err(AccountRepositoryError::connection)?;
        let Some(stored) = state.accounts.values_mut().find(|stored| {
            stored
                .reset
                .as_ref()
                .is_some_and(|token| &token.digest == digest && token.expires_at > now)
        }) else {
            return Ok(false);
        };
        stored.reset = None;
        stored.account.replace_credential(credential.clone());
        Ok(true)
    }

    async fn mark_approved(&self, id: &AccountId) -> Result<bool, AccountRepositoryError> {
        let mut state = self.lock().map_err(AccountRepositoryError::connection)?;
        Ok(state
            .accounts
            .get_mut(id)
            .is_some_and(|stored| stored.account.mark_approved()))
    }

    async fn update_role(
        &self,
        id: &AccountId,
        role: Role,
        is_approved: bool,
    ) -> Result<bool, AccountRepositoryError> {
        let mut state = self.lock().map_err(AccountRepositoryError::connection)?;
        let Some(stored) = state.accounts.get_mut(id) else {
            return Ok(false);
        };
        stored.account.change_role(role, is_approved);
        Ok(true)
    }

    async fn update_profile(
        &self,
        id: &AccountId,
        patch: &AccountPatch,
    ) -> Result<bool, AccountRepositoryError> {
        let mut state = self.lock().map_err(AccountRepositoryError::connection)?;
        if let Some(email) = &patch.email {
            if state.email_taken(email, Some(*id)) {
                return Err(AccountRepositoryError::duplicate_email(email.as_ref()));
            }
        }
        let Some(stored) = state.accounts.get_mut(id) else {
            return Ok(false);
        };
        patch.apply_to(&mut stored.account);
        Ok(true)
    }

    async fn delete(&self, id: &AccountId) -> Result<AccountDeletion, AccountRepositoryError> {
        let mut state = self.lock().map_err(AccountRepositoryError::connection)?;
        if !state.accounts.contains_key(id) {
            return Ok(AccountDeletion::Missing);
        }
        let driving = state.rides.values().any(|stored| {
            stored.ride.driver_id() == Some(*id) && stored.ride.status().is_active()
        });
        if driving {
            return Ok(AccountDeletion::ActiveDriver);
        }

        state.accounts.remove(id);
        state.rides.retain(|_, stored| stored.ride.student_id() != *id);
        for stored in state.rides.values_mut() {
            if stored.ride.driver_id() == Some(*id) {
                stored.ride.forget_driver();
            }
        }
        let DatastoreState {
            rides,
            passengers,
            ratings,
            ..
        } = &mut *state;
        passengers.retain(|row| row.student_id != *id && rides.contains_key(&row.ride_id));
        ratings.retain(|ride_id, (_, rating)| {
            rating.student_id != *id && rating.driver_id != *id && rides.contains_key(ride_id)
        });
        Ok(AccountDeletion::Deleted)
    }
}

#[async_trait]
impl RideRepository for InMemoryDatastore {
    async fn insert(&self, ride: &Ride) -> Result<(), RideRepositoryError> {
        let mut state = self.lock().map_err(RideRepositoryError::connection)?;
        if !state.accounts.contains_key(&ride.student_id()) {
            return Err(RideRepositoryError::query(format!(
                "ride references unknown student {}",
                ride.student_id()
            )));
        }
        let seq = state.next_seq();
        state.rides.insert(
            ride.id(),
            StoredRide {
                seq,
                ride: ride.clone(),
            },
        );
        Ok(())
    }

    async fn accept(
        &self,
        id: &RideId,
        driver: &AccountId,
        at: DateTime<Utc>,
    ) -> Result<bool, RideRepositoryError> {
        let mut state = self.lock().map_err(RideRepositoryError::connection)?;
        match state.rides.get_mut(id) {
            Some(stored) if stored.ride.status() == RideStatus::Pending => {
                stored.ride.accept(*driver, at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn transition(
        &self,
        id: &RideId,
        change: StatusChange,
        at: DateTime<Utc>,
    ) -> Result<bool, RideRepositoryError> {
        let mut state = self.lock().map_err(RideRepositoryError::connection)?;
        match state.rides.get_mut(id) {
            Some(stored) if change.permits(stored.ride.status()) => {
                stored.ride.apply(change, at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_by_id(&self, id: &RideId) -> Result<Option<Ride>, RideRepositoryError> {
        let state = self.lock().map_err(RideRepositoryError::connection)?;
        Ok(state.rides.get(id).map(|stored| stored.ride.clone()))
    }

    async fn list_for_student(&self, student: &AccountId) -> Result<Vec<Ride>, RideRepositoryError> {
        let state = self.lock().map_err(RideRepositoryError::connection)?;
        Ok(ride_sorted_newest(
            state.rides_sorted(|ride| ride.student_id() == *student),
        ))
    }

    async fn list_for_driver(&self, driver: &AccountId) -> Result<Vec<Ride>, RideRepositoryError> {
        let state = self.lock().map_err(RideRepositoryError::connection)?;
        Ok(ride_sorted_newest(
            state.rides_sorted(|ride| ride.driver_id() == Some(*driver)),
        ))
    }

    async fn list_pending(&self) -> Result<Vec<Ride>, RideRepositoryError> {
        let state = self.lock().map_err(RideRepositoryError::connection)?;
        Ok(state
            .rides_sorted(|ride| ride.status() == RideStatus::Pending)
            .into_iter()
            .map(|stored| stored.ride.clone())
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<Ride>, RideRepositoryError> {
        let state = self.lock().map_err(RideRepositoryError::connection)?;
        Ok(ride_sorted_newest(state.rides_sorted(|_| true)))
    }

    async fn upsert_passenger(
        &self,
        passenger: &RidePassenger,
    ) -> Result<PassengerId, RideRepositoryError> {
        let mut state = self.lock().map_err(RideRepositoryError::connection)?;
        if !state.rides.contains_key(&passenger.ride_id) {
            return Err(RideRepositoryError::query(format!(
                "passenger references unknown ride {}",
                passenger.ride_id
            )));
        }
        if let Some(existing) = state.passengers.iter_mut().find(|row| {
            row.ride_id == passenger.ride_id && row.student_id == passenger.student_id
        }) {
            existing.status = passenger.status;
            return Ok(existing.id);
        }
        state.passengers.push(passenger.clone());
        Ok(passenger.id)
    }

    async fn list_passengers(
        &self,
        rides: &[RideId],
    ) -> Result<Vec<RidePassenger>, RideRepositoryError> {
        let state = self.lock().map_err(RideRepositoryError::connection)?;
        Ok(state
            .passengers
            .iter()
            .filter(|row| rides.contains(&row.ride_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RatingRepository for InMemoryDatastore {
    async fn eligibility(
        &self,
        ride: &RideId,
    ) -> Result<Option<RatingEligibility>, RatingRepositoryError> {
        let state = self.lock().map_err(RatingRepositoryError::connection)?;
        Ok(state.rides.get(ride).map(|stored| RatingEligibility {
            student_id: stored.ride.student_id(),
            driver_id: stored.ride.driver_id(),
            status: stored.ride.status(),
            already_rated: state.ratings.contains_key(ride),
        }))
    }

    async fn insert(&self, rating: &Rating) -> Result<(), RatingRepositoryError> {
        let mut state = self.lock().map_err(RatingRepositoryError::connection)?;
        if state.ratings.contains_key(&rating.ride_id) {
            return Err(RatingRepositoryError::duplicate_rating(
                rating.ride_id.to_string(),
            ));
        }
        let seq = state.next_seq();
        state.ratings.insert(rating.ride_id, (seq, rating.clone()));
        Ok(())
    }

    async fn find_for_ride(&self, ride: &RideId) -> Result<Option<Rating>, RatingRepositoryError> {
        let state = self.lock().map_err(RatingRepositoryError::connection)?;
        Ok(state.ratings.get(ride).map(|(_, rating)| rating.clone()))
    }

    async fn totals_for_driver(
        &self,
        driver: &AccountId,
    ) -> Result<RatingTotals, RatingRepositoryError> {
        let state = self.lock().map_err(RatingRepositoryError::connection)?;
        Ok(state.totals(|rating| rating.driver_id == *driver))
    }

    async fn totals_given_by_student(
        &self,
        student: &AccountId,
    ) -> Result<RatingTotals, RatingRepositoryError> {
        let state = self.lock().map_err(RatingRepositoryError::connection)?;
        Ok(state.totals(|rating| rating.student_id == *student))
    }

    async fn list_for_driver(
        &self,
        driver: &AccountId,
    ) -> Result<Vec<RatedRide>, RatingRepositoryError> {
        let state = self.lock().map_err(RatingRepositoryError::connection)?;
        Ok(state.rated_rides(|rating| rating.driver_id == *driver))
    }

    async fn list_given_by_student(
        &self,
        student: &AccountId,
    ) -> Result<Vec<RatedRide>, RatingRepositoryError> {
        let state = self.lock().map_err(RatingRepositoryError::connection)?;
        Ok(state.rated_rides(|rating| rating.student_id == *student))
    }

    async fn driver_statistics(
        &self,
        drivers: &[AccountId],
    ) -> Result<Vec<DriverStatistics>, RatingRepositoryError> {
        let state = self.lock().map_err(RatingRepositoryError::connection)?;
        Ok(drivers
            .iter()
            .map(|driver| DriverStatistics {
                driver_id: *driver,
                completed_rides: state
                    .rides
                    .values()
                    .filter(|stored| {
                        stored.ride.driver_id() == Some(*driver)
                            && stored.ride.status() == RideStatus::Completed
                    })
                    .count() as u64,
                totals: state.totals(|rating| rating.driver_id == *driver),
            })
            .collect())
    }
}

#[async_trait]
impl NotificationOutbox for InMemoryDatastore {
    async fn enqueue(&self, intent: &NotificationIntent) -> Result<(), NotificationOutboxError> {
        let mut state = self.lock().map_err(NotificationOutboxError::connection)?;
        let seq = state.next_seq();
        state.outbox.insert(intent.id, (seq, intent.clone()));
        Ok(())
    }

    async fn list_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<NotificationIntent>, NotificationOutboxError> {
        let state = self.lock().map_err(NotificationOutboxError::connection)?;
        let mut due: Vec<&(u64, NotificationIntent)> = state
            .outbox
            .values()
            .filter(|(_, intent)| intent.is_due(now))
            .collect();
        due.sort_by_key(|(seq, intent)| (intent.next_attempt_at, *seq));
        Ok(due
            .into_iter()
            .take(limit)
            .map(|(_, intent)| intent.clone())
            .collect())
    }

    async fn mark_delivered(
        &self,
        id: &IntentId,
        attempts: u32,
    ) -> Result<(), NotificationOutboxError> {
        let mut state = self.lock().map_err(NotificationOutboxError::connection)?;
        if let Some((_, intent)) = state.outbox.get_mut(id) {
            intent.state = DeliveryState::Delivered;
            intent.data = without_secrets(&intent.data);
            intent.attempts = attempts;
            intent.last_error = None;
        }
        Ok(())
    }

    async fn reschedule(
        &self,
        id: &IntentId,
        attempts: u32,
        next_attempt_at: DateTime<Utc>,
        last_error: &str,
    ) -> Result<(), NotificationOutboxError> {
        let mut state = self.lock().map_err(NotificationOutboxError::connection)?;
        if let Some((_, intent)) = state.outbox.get_mut(id) {
            intent.attempts = attempts;
            intent.next_attempt_at = next_attempt_at;
            intent.last_error = Some(last_error.to_owned());
        }
        Ok(())
    }

    async fn abandon(
        &self,
        id: &IntentId,
        attempts: u32,
        last_error: &str,
    ) -> Result<(), NotificationOutboxError> {
        let mut state = self.lock().map_err(NotificationOutboxError::connection)?;
        if let Some((_, intent)) = state.outbox.get_mut(id) {
            intent.state = DeliveryState::Abandoned;
            intent.data = without_secrets(&intent.data);
            intent.attempts = attempts;
            intent.last_error = Some(last_error.to_owned());
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
