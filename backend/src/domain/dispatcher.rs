//! Matching and notification dispatcher.
//!
//! The dispatcher is the caller-facing orchestration layer. It checks the
//! authenticated principal against the ride or account being touched,
//! delegates the authoritative write to a ledger or the registry, and then
//! queues notification intents. Queuing is best effort: a failed enqueue is
//! logged and never undoes or fails the write it follows.

use std::sync::Arc;

use async_trait::async_trait;
use mockable::Clock;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::domain::account_registry::{Approval, IssuedFor, RegistrationRequest};
use crate::domain::ports::{
    AccountCommand, AdminQuery, NotificationOutbox, RatingCommand, RideCommand, RideCreated,
};
use crate::domain::{
    Account, AccountContact, AccountId, AccountRegistry, Error, ErrorReason, IntentId,
    NewNotification, NotificationIntent, NotificationKind, OneTimeToken, PassengerId,
    PlainCredential, Principal, Rating, RatingLedger, Ride, RideId, RideLedger, RideRequest,
    RideStatus, RideView, Role, StatusChange,
};

/// Dispatcher service implementing every driving port.
#[derive(Clone)]
pub struct Dispatcher {
    accounts: AccountRegistry,
    rides: RideLedger,
    ratings: RatingLedger,
    outbox: Arc<dyn NotificationOutbox>,
    clock: Arc<dyn Clock>,
}

impl Dispatcher {
    /// Create a new dispatcher over the three domain services and the
    /// outbox its notifications go to.
    pub fn new(
        accounts: AccountRegistry,
        rides: RideLedger,
        ratings: RatingLedger,
        outbox: Arc<dyn NotificationOutbox>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            accounts,
            rides,
            ratings,
            outbox,
            clock,
        }
    }

    /// Read access to the registry for unrestricted projections.
    pub fn accounts(&self) -> &AccountRegistry {
        &self.accounts
    }

    /// Read access to the ride ledger for unrestricted projections.
    pub fn rides(&self) -> &RideLedger {
        &self.rides
    }

    /// Read access to the rating ledger for aggregates and listings.
    pub fn ratings(&self) -> &RatingLedger {
        &self.ratings
    }

    /// Queue an intent, reporting whether it was stored.
    async fn enqueue(&self, notification: NewNotification) -> bool {
        let intent = NotificationIntent::pending(IntentId::random(), notification, self.clock.utc());
        match self.outbox.enqueue(&intent).await {
            Ok(()) => true,
            Err(error) => {
                warn!(kind = %intent.kind, intent_id = %intent.id, %error, "notification intent dropped");
                false
            }
        }
    }
}

#[async_trait]
impl AccountCommand for Dispatcher {
    async fn register(&self, request: RegistrationRequest) -> Result<AccountId, Error> {
        let registration = self.accounts.register(request).await?;
        let account = registration.account;
        self.enqueue(token_notice(
            &account,
            NotificationKind::EmailVerification,
            &registration.verification.token,
            registration.verification.expires_at,
        ))
        .await;
        Ok(account.id())
    }

    async fn resend_verification(&self, email: &str) -> Result<(), Error> {
        if let Some(IssuedFor { account, token }) =
            self.accounts.resend_verification(email).await?
        {
            self.enqueue(token_notice(
                &account,
                NotificationKind::EmailVerification,
                &token.token,
                token.expires_at,
            ))
            .await;
        }
        Ok(())
    }

    async fn request_password_reset(&self, email: &str) -> Result<(), Error> {
        if let Some(IssuedFor { account, token }) =
            self.accounts.request_password_reset(email).await?
        {
            self.enqueue(token_notice(
                &account,
                NotificationKind::PasswordReset,
                &token.token,
                token.expires_at,
            ))
            .await;
        }
        Ok(())
    }

    async fn verify_email(&self, token: &OneTimeToken) -> Result<bool, Error> {
        self.accounts.verify_email(token).await
    }

    async fn reset_password(
        &self,
        token: &OneTimeToken,
        new_credential: &PlainCredential,
    ) -> Result<bool, Error> {
        self.accounts.reset_password(token, new_credential).await
    }

    async fn approve(&self, acting: &Principal, id: &AccountId) -> Result<Approval, Error> {
        acting.require_admin()?;
        let approval = self.accounts.approve(id).await?;
        if approval.newly_approved {
            let account = &approval.account;
            self.enqueue(NewNotification::new(
                account.email().clone(),
                NotificationKind::AccountApproved,
                json!({
                    "name": account.display_name(),
                    "role": account.role(),
                }),
            ))
            .await;
        }
        Ok(approval)
    }

    async fn update_role(
        &self,
        acting: &Principal,
        id: &AccountId,
        role: Role,
    ) -> Result<Account, Error> {
        self.accounts.update_role(id, role, acting).await
    }

    async fn delete_account(&self, acting: &Principal, id: &AccountId) -> Result<(), Error> {
        self.accounts.delete_account(id, acting).await
    }
}

#[async_trait]
impl AdminQuery for Dispatcher {
    async fn list_pending_accounts(&self, acting: &Principal) -> Result<Vec<Account>, Error> {
        acting.require_admin()?;
        self.accounts.list_pending().await
    }

    async fn list_accounts(&self, acting: &Principal) -> Result<Vec<Account>, Error> {
        acting.require_admin()?;
        self.accounts.list_all().await
    }

    async fn list_all_rides(&self, acting: &Principal) -> Result<Vec<RideView>, Error> {
        acting.require_admin()?;
        self.rides.list_all().await
    }
}

#[async_trait]
impl RideCommand for Dispatcher {
    async fn create_ride(
        &self,
        acting: &Principal,
        request: RideRequest,
    ) -> Result<RideCreated, Error> {
        acting.require_role(Role::Student)?;
        let student = self.accounts.get(&acting.account_id).await?;
        ensure_participating(&student)?;

        let ride = self.rides.create_ride(student.id(), request).await?;

        let drivers = match self.rides.list_eligible_drivers().await {
            Ok(drivers) => drivers,
            Err(error) => {
                warn!(ride_id = %ride.id(), %error, "could not load drivers to notify");
                Vec::new()
            }
        };
        let data = ride_summary(&ride, &student.contact());
        let mut drivers_notified = 0;
        for driver in &drivers {
            let notice = NewNotification::new(
                driver.email().clone(),
                NotificationKind::RideRequested,
                with_field(&data, "driverName", json!(driver.display_name())),
            );
            if self.enqueue(notice).await {
                drivers_notified += 1;
            }
        }
        info!(ride_id = %ride.id(), drivers_notified, "ride offered to drivers");
        Ok(RideCreated {
            ride,
            drivers_notified,
        })
    }

    async fn accept_ride(&self, acting: &Principal, ride: &RideId) -> Result<bool, Error> {
        acting.require_role(Role::Driver)?;
        let driver = self.accounts.get(&acting.account_id).await?;
        if !driver.is_active_driver() {
            return Err(gate_error(&driver));
        }

        if !self.rides.accept_ride(ride, &driver.id()).await? {
            return Ok(false);
        }

        match self.rides.get_by_id(ride).await {
            Ok(view) => {
                let driver_contact = driver.contact();
                let mut data = ride_summary(&view.ride, &view.student);
                if let Value::Object(map) = &mut data {
                    map.insert("driver".to_owned(), contact_json(&driver_contact));
                    map.insert(
                        "vehicle".to_owned(),
                        json!(driver.driver_profile()),
                    );
                }
                self.enqueue(NewNotification::new(
                    view.student.email.clone(),
                    NotificationKind::RideAccepted,
                    data,
                ))
                .await;
            }
            Err(error) => warn!(ride_id = %ride, %error, "accepted ride could not be reloaded"),
        }
        Ok(true)
    }

    async fn update_ride_status(
        &self,
        acting: &Principal,
        ride: &RideId,
        new_status: RideStatus,
    ) -> Result<bool, Error> {
        let change = StatusChange::try_from(new_status)
            .map_err(|err| Error::invalid_request(err.to_string()))?;
        let record = self.rides.find(ride).await?;
        authorise_change(acting, &record, change)?;

        if !self.rides.apply_change(ride, change).await? {
            return Ok(false);
        }

        match self.rides.get_by_id(ride).await {
            Ok(view) => {
                let mut data = ride_summary(&view.ride, &view.student);
                if let Value::Object(map) = &mut data {
                    map.insert("previousStatus".to_owned(), json!(record.status()));
                    if let Some(driver) = &view.driver {
                        map.insert("driver".to_owned(), contact_json(driver));
                    }
                }
                self.enqueue(NewNotification::new(
                    view.student.email.clone(),
                    NotificationKind::RideStatusChanged,
                    data,
                ))
                .await;
            }
            Err(error) => warn!(ride_id = %ride, %error, "updated ride could not be reloaded"),
        }
        Ok(true)
    }

    async fn add_passenger(
        &self,
        acting: &Principal,
        ride: &RideId,
        student: &AccountId,
    ) -> Result<PassengerId, Error> {
        let record = self.rides.find(ride).await?;
        if acting.role != Role::Admin && record.student_id() != acting.account_id {
            return Err(Error::forbidden("only the ride's requester may add passengers"));
        }
        self.rides.add_passenger(ride, student).await
    }
}

#[async_trait]
impl RatingCommand for Dispatcher {
    async fn rate_ride(
        &self,
        acting: &Principal,
        ride: &RideId,
        score: i64,
        comment: Option<String>,
    ) -> Result<Rating, Error> {
        acting.require_role(Role::Student)?;
        self.ratings
            .create_rating(ride, &acting.account_id, score, comment)
            .await
    }

    async fn can_rate(&self, acting: &Principal, ride: &RideId) -> Result<bool, Error> {
        self.ratings.can_rate(ride, &acting.account_id).await
    }
}

fn gate_error(account: &Account) -> Error {
    if !account.is_verified() {
        Error::forbidden("email address has not been verified").with_reason(ErrorReason::NotVerified)
    } else if !account.is_approved() {
        Error::forbidden("account is awaiting administrator approval")
            .with_reason(ErrorReason::NotApproved)
    } else {
        Error::forbidden("account may not take part in rides")
    }
}

fn ensure_participating(account: &Account) -> Result<(), Error> {
    if account.passes_participation_gate() {
        Ok(())
    } else {
        Err(gate_error(account))
    }
}

fn authorise_change(acting: &Principal, ride: &Ride, change: StatusChange) -> Result<(), Error> {
    if acting.role == Role::Admin {
        return Ok(());
    }
    let is_driver = ride.driver_id() == Some(acting.account_id);
    let allowed = match change {
        StatusChange::Start | StatusChange::Complete => is_driver,
        StatusChange::Cancel => is_driver || ride.student_id() == acting.account_id,
    };
    if allowed {
        Ok(())
    } else {
        Err(Error::forbidden(format!(
            "not permitted to move ride {} to {}",
            ride.id(),
            change.target()
        )))
    }
}

fn contact_json(contact: &AccountContact) -> Value {
    json!({
        "name": contact.display_name,
        "email": contact.email,
        "phone": contact.phone,
    })
}

fn ride_summary(ride: &Ride, requester: &AccountContact) -> Value {
    json!({
        "rideId": ride.id(),
        "status": ride.status(),
        "pickup": ride.pickup(),
        "dropoff": ride.dropoff(),
        "pickupTime": ride.pickup_time(),
        "notes": ride.notes(),
        "requester": contact_json(requester),
    })
}

fn token_notice(
    account: &Account,
    kind: NotificationKind,
    token: &OneTimeToken,
    expires_at: chrono::DateTime<chrono::Utc>,
) -> NewNotification {
    NewNotification::new(
        account.email().clone(),
        kind,
        json!({
            "name": account.display_name(),
            "token": token.expose(),
            "expiresAt": expires_at,
        }),
    )
}

fn with_field(data: &Value, key: &str, value: Value) -> Value {
    let mut data = data.clone();
    if let Value::Object(map) = &mut data {
        map.insert(key.to_owned(), value);
    }
    data
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
