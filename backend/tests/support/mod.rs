//! Shared wiring for the integration suites.
//!
//! Every scenario runs against the in-memory datastore through the public
//! dispatcher, so accounts reach their state the same way real users do.

#![allow(dead_code, reason = "each suite uses a different subset")]

use std::sync::Arc;

use campus_rides::domain::ports::{AccountCommand, FixtureCredentialHasher, NotificationOutbox};
use campus_rides::domain::{
    AccountRegistry, CredentialDigest, DisplayName, Dispatcher, DriverProfile, EmailAddress,
    NotificationIntent, NotificationKind, OneTimeToken, OutboxRelay, OutboxRelayConfig,
    OutboxRelayRuntime, PlainCredential, Principal, RatingLedger, RegistrationRequest, RideLedger,
    RideRequest, Role, SeedOutcome, StudentProfile, TokenPolicy,
};
use campus_rides::outbound::memory::InMemoryDatastore;
use campus_rides::test_support::{ImmediateSleeper, MutableClock, NoJitter, RecordingSender};
use chrono::{TimeDelta, Utc};

pub const PASSWORD: &str = "correct horse battery";

pub struct World {
    pub clock: Arc<MutableClock>,
    pub store: Arc<InMemoryDatastore>,
    pub dispatcher: Dispatcher,
}

impl World {
    pub fn new() -> Self {
        let clock = Arc::new(MutableClock::new(Utc::now()));
        let store = Arc::new(InMemoryDatastore::new(clock.clone()));
        let dispatcher = Dispatcher::new(
            AccountRegistry::new(
                store.clone(),
                Arc::new(FixtureCredentialHasher),
                clock.clone(),
                TokenPolicy::default(),
            ),
            RideLedger::new(store.clone(), store.clone(), clock.clone()),
            RatingLedger::new(store.clone(), store.clone(), clock.clone()),
            store.clone() as Arc<dyn NotificationOutbox>,
            clock.clone(),
        );
        Self {
            clock,
            store,
            dispatcher,
        }
    }

    /// Seed an administrator and log in as them.
    pub async fn admin(&self) -> Principal {
        let credential = PlainCredential::new(PASSWORD).expect("valid credential");
        let digest = fixture_digest(&credential).await;
        let outcome = self
            .dispatcher
            .accounts()
            .seed_admin(
                EmailAddress::new("admin@campus.edu").expect("valid email"),
                digest,
                DisplayName::new("Admin").expect("valid name"),
            )
            .await
            .expect("admin seeded");
        assert!(matches!(outcome, SeedOutcome::Created(_)));
        self.login("admin@campus.edu").await
    }

    /// Register, verify, and approve an account, then log in as it.
    pub async fn participant(&self, admin: &Principal, name: &str, role: Role) -> Principal {
        let email = format!("{name}@campus.edu");
        let id = self
            .dispatcher
            .register(registration(&email, role))
            .await
            .expect("registered");

        let token = self.latest_token(&email, NotificationKind::EmailVerification);
        assert!(
            self.dispatcher
                .verify_email(&OneTimeToken::presented(token))
                .await
                .expect("verification runs")
        );
        self.dispatcher.approve(admin, &id).await.expect("approved");
        self.login(&email).await
    }

    pub async fn login(&self, email: &str) -> Principal {
        self.dispatcher
            .accounts()
            .authenticate(email, &PlainCredential::new(PASSWORD).expect("valid credential"))
            .await
            .expect("login succeeds")
    }

    /// Relay draining this world's outbox into `sender` without waiting.
    pub fn relay(&self, sender: Arc<RecordingSender>) -> OutboxRelay {
        OutboxRelay::with_runtime(
            self.store.clone() as Arc<dyn NotificationOutbox>,
            sender,
            self.clock.clone(),
            OutboxRelayRuntime {
                sleeper: Arc::new(ImmediateSleeper),
                jitter: Arc::new(NoJitter),
            },
            OutboxRelayConfig::default(),
        )
    }

    pub fn intents(&self, kind: NotificationKind) -> Vec<NotificationIntent> {
        self.store
            .outbox_snapshot()
            .into_iter()
            .filter(|intent| intent.kind == kind)
            .collect()
    }

    /// Token from the most recent token-bearing notice sent to `email`.
    pub fn latest_token(&self, email: &str, kind: NotificationKind) -> String {
        self.intents(kind)
            .into_iter()
            .rev()
            .find(|intent| intent.recipient.as_str() == email)
            .and_then(|intent| intent.data["token"].as_str().map(str::to_owned))
            .expect("token notice queued")
    }
}

pub fn registration(email: &str, role: Role) -> RegistrationRequest {
    RegistrationRequest {
        email: EmailAddress::new(email).expect("valid email"),
        credential: PlainCredential::new(PASSWORD).expect("valid credential"),
        display_name: DisplayName::new("Campus User").expect("valid name"),
        role: Some(role),
        phone: Some("555-0100".to_owned()),
        student: StudentProfile::default(),
        driver: DriverProfile::default(),
    }
}

pub fn ride_request() -> RideRequest {
    RideRequest::new(
        "North Dorm",
        "Central Station",
        Utc::now() + TimeDelta::hours(3),
        None,
    )
    .expect("valid request")
}

async fn fixture_digest(credential: &PlainCredential) -> CredentialDigest {
    use campus_rides::domain::ports::CredentialHasher;

    FixtureCredentialHasher
        .hash(credential)
        .await
        .expect("fixture hashing succeeds")
}
