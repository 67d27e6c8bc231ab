//! Tests for the in-memory datastore.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use rstest::{fixture, rstest};
use serde_json::json;

use super::*;
use crate::domain::{
    AccountDraft, DisplayName, DriverProfile, NewNotification, NotificationKind, PassengerStatus,
    RatingId, RatingScore, RideDraft, RideRequest, StudentProfile,
};
use crate::test_support::MutableClock;

struct Harness {
    clock: Arc<MutableClock>,
    store: InMemoryDatastore,
}

#[fixture]
fn harness() -> Harness {
    let clock = Arc::new(MutableClock::new(Utc::now()));
    let store = InMemoryDatastore::new(clock.clone());
    Harness { clock, store }
}

fn account(email: &str, role: Role, verified: bool, approved: bool) -> Account {
    account_created_at(email, role, verified, approved, Utc::now())
}

fn account_created_at(
    email: &str,
    role: Role,
    verified: bool,
    approved: bool,
    created_at: DateTime<Utc>,
) -> Account {
    Account::new(AccountDraft {
        id: AccountId::random(),
        email: EmailAddress::new(email).expect("valid email"),
        credential: CredentialDigest::new("digest"),
        display_name: DisplayName::new("Someone").expect("valid name"),
        role,
        phone: None,
        is_verified: verified,
        is_approved: approved,
        student: StudentProfile::default(),
        driver: DriverProfile::default(),
        created_at,
    })
    .expect("valid account")
}

fn ride_for(student: AccountId) -> Ride {
    let request = RideRequest::new("Dorm A", "Library", Utc::now(), None).expect("valid request");
    Ride::new(RideDraft::requested(
        RideId::random(),
        student,
        request,
        Utc::now(),
    ))
    .expect("valid ride")
}

async fn seeded(store: &InMemoryDatastore, account: Account) -> AccountId {
    AccountRepository::insert(store, &account)
        .await
        .expect("account stored");
    account.id()
}

async fn completed_ride(store: &InMemoryDatastore, student: AccountId, driver: AccountId) -> RideId {
    let ride = ride_for(student);
    RideRepository::insert(store, &ride).await.expect("ride stored");
    let now = Utc::now();
    assert!(store.accept(&ride.id(), &driver, now).await.expect("accept"));
    assert!(store.transition(&ride.id(), StatusChange::Start, now).await.expect("start"));
    assert!(store.transition(&ride.id(), StatusChange::Complete, now).await.expect("complete"));
    ride.id()
}

fn rating(ride: RideId, student: AccountId, driver: AccountId, score: i64) -> Rating {
    Rating {
        id: RatingId::random(),
        ride_id: ride,
        student_id: student,
        driver_id: driver,
        score: RatingScore::new(score).expect("valid score"),
        comment: None,
        created_at: Utc::now(),
    }
}

#[rstest]
#[tokio::test]
async fn email_is_unique(harness: Harness) {
    seeded(&harness.store, account("ada@campus.edu", Role::Student, true, true)).await;

    let err = AccountRepository::insert(
        &harness.store,
        &account("ada@campus.edu", Role::Driver, false, false),
    )
    .await
    .expect_err("duplicate email");

    assert!(matches!(err, AccountRepositoryError::DuplicateEmail { .. }));
}

#[rstest]
#[tokio::test]
async fn profile_patch_cannot_steal_an_email(harness: Harness) {
    seeded(&harness.store, account("ada@campus.edu", Role::Student, true, true)).await;
    let other = seeded(&harness.store, account("bo@campus.edu", Role::Student, true, true)).await;
    let patch = AccountPatch::default()
        .with_email(EmailAddress::new("ada@campus.edu").expect("valid email"));

    let err = harness
        .store
        .update_profile(&other, &patch)
        .await
        .expect_err("taken email");

    assert!(matches!(err, AccountRepositoryError::DuplicateEmail { .. }));
}

#[rstest]
#[tokio::test]
async fn only_one_acceptance_wins(harness: Harness) {
    let student = seeded(&harness.store, account("s@campus.edu", Role::Student, true, true)).await;
    let ride = ride_for(student);
    RideRepository::insert(&harness.store, &ride).await.expect("ride stored");

    let first = harness
        .store
        .accept(&ride.id(), &AccountId::random(), Utc::now())
        .await
        .expect("accept");
    let second = harness
        .store
        .accept(&ride.id(), &AccountId::random(), Utc::now())
        .await
        .expect("accept");

    assert!(first);
    assert!(!second);
}

#[rstest]
#[case(StatusChange::Start, false)]
#[case(StatusChange::Complete, false)]
#[case(StatusChange::Cancel, true)]
#[tokio::test]
async fn pending_ride_transitions(
    harness: Harness,
    #[case] change: StatusChange,
    #[case] expected: bool,
) {
    let student = seeded(&harness.store, account("s@campus.edu", Role::Student, true, true)).await;
    let ride = ride_for(student);
    RideRepository::insert(&harness.store, &ride).await.expect("ride stored");

    let applied = harness
        .store
        .transition(&ride.id(), change, Utc::now())
        .await
        .expect("transition");

    assert_eq!(applied, expected);
    let stored = RideRepository::find_by_id(&harness.store, &ride.id())
        .await
        .expect("lookup")
        .expect("ride exists");
    let status = if expected { change.target() } else { RideStatus::Pending };
    assert_eq!(stored.status(), status);
}

#[rstest]
#[tokio::test]
async fn verification_token_expires(harness: Harness) {
    let id = seeded(&harness.store, account("s@campus.edu", Role::Student, false, false)).await;
    let digest = TokenDigest::from_stored("abc");
    harness
        .store
        .store_verification_token(&id, &digest, harness.clock.utc() + TimeDelta::hours(24))
        .await
        .expect("token stored");

    harness.clock.advance_seconds(24 * 60 * 60 + 1);

    let consumed = harness
        .store
        .consume_verification_token(&digest)
        .await
        .expect("consume");
    assert_eq!(consumed, None);
}

#[rstest]
#[tokio::test]
async fn verification_token_is_single_use(harness: Harness) {
    let id = seeded(&harness.store, account("s@campus.edu", Role::Student, false, false)).await;
    let digest = TokenDigest::from_stored("abc");
    harness
        .store
        .store_verification_token(&id, &digest, harness.clock.utc() + TimeDelta::hours(1))
        .await
        .expect("token stored");

    let first = harness.store.consume_verification_token(&digest).await.expect("consume");
    let second = harness.store.consume_verification_token(&digest).await.expect("consume");

    assert_eq!(first, Some(id));
    assert_eq!(second, None);
    let stored = AccountRepository::find_by_id(&harness.store, &id)
        .await
        .expect("lookup")
        .expect("account exists");
    assert!(stored.is_verified());
}

#[rstest]
#[tokio::test]
async fn reset_token_replaces_credential_once(harness: Harness) {
    let id = seeded(&harness.store, account("s@campus.edu", Role::Student, true, true)).await;
    let digest = TokenDigest::from_stored("reset");
    harness
        .store
        .store_reset_token(&id, &digest, harness.clock.utc() + TimeDelta::hours(1))
        .await
        .expect("token stored");
    let fresh = CredentialDigest::new("fresh");

    assert!(harness.store.consume_reset_token(&digest, &fresh).await.expect("consume"));
    assert!(!harness.store.consume_reset_token(&digest, &fresh).await.expect("consume"));
    let stored = AccountRepository::find_by_id(&harness.store, &id)
        .await
        .expect("lookup")
        .expect("account exists");
    assert_eq!(stored.credential(), &fresh);
}

#[rstest]
#[tokio::test]
async fn approval_needs_verification(harness: Harness) {
    let id = seeded(&harness.store, account("d@campus.edu", Role::Driver, false, false)).await;

    assert!(!harness.store.mark_approved(&id).await.expect("approve"));
}

#[rstest]
#[tokio::test]
async fn active_driver_cannot_be_deleted(harness: Harness) {
    let student = seeded(&harness.store, account("s@campus.edu", Role::Student, true, true)).await;
    let driver = seeded(&harness.store, account("d@campus.edu", Role::Driver, true, true)).await;
    let ride = ride_for(student);
    RideRepository::insert(&harness.store, &ride).await.expect("ride stored");
    harness.store.accept(&ride.id(), &driver, Utc::now()).await.expect("accept");

    let outcome = harness.store.delete(&driver).await.expect("delete");

    assert_eq!(outcome, AccountDeletion::ActiveDriver);
}

#[rstest]
#[tokio::test]
async fn deleting_a_driver_keeps_completed_rides(harness: Harness) {
    let student = seeded(&harness.store, account("s@campus.edu", Role::Student, true, true)).await;
    let driver = seeded(&harness.store, account("d@campus.edu", Role::Driver, true, true)).await;
    let ride = completed_ride(&harness.store, student, driver).await;
    RatingRepository::insert(&harness.store, &rating(ride, student, driver, 5))
        .await
        .expect("rating stored");

    let outcome = harness.store.delete(&driver).await.expect("delete");

    assert_eq!(outcome, AccountDeletion::Deleted);
    let stored = RideRepository::find_by_id(&harness.store, &ride)
        .await
        .expect("lookup")
        .expect("ride kept");
    assert_eq!(stored.driver_id(), None);
    assert_eq!(stored.status(), RideStatus::Completed);
    assert_eq!(harness.store.find_for_ride(&ride).await.expect("lookup"), None);
}

#[rstest]
#[tokio::test]
async fn deleting_a_student_cascades_rides_and_passengers(harness: Harness) {
    let student = seeded(&harness.store, account("s@campus.edu", Role::Student, true, true)).await;
    let friend = seeded(&harness.store, account("f@campus.edu", Role::Student, true, true)).await;
    let ride = ride_for(student);
    RideRepository::insert(&harness.store, &ride).await.expect("ride stored");
    harness
        .store
        .upsert_passenger(&RidePassenger {
            id: PassengerId::random(),
            ride_id: ride.id(),
            student_id: friend,
            status: PassengerStatus::Confirmed,
        })
        .await
        .expect("passenger stored");

    assert_eq!(harness.store.delete(&student).await.expect("delete"), AccountDeletion::Deleted);

    assert_eq!(RideRepository::find_by_id(&harness.store, &ride.id()).await.expect("lookup"), None);
    assert!(harness.store.list_passengers(&[ride.id()]).await.expect("list").is_empty());
    assert_eq!(harness.store.delete(&student).await.expect("delete"), AccountDeletion::Missing);
}

#[rstest]
#[tokio::test]
async fn passenger_upsert_keeps_one_row(harness: Harness) {
    let student = seeded(&harness.store, account("s@campus.edu", Role::Student, true, true)).await;
    let friend = seeded(&harness.store, account("f@campus.edu", Role::Student, true, true)).await;
    let ride = ride_for(student);
    RideRepository::insert(&harness.store, &ride).await.expect("ride stored");
    let row = RidePassenger {
        id: PassengerId::random(),
        ride_id: ride.id(),
        student_id: friend,
        status: PassengerStatus::Pending,
    };
    let first = harness.store.upsert_passenger(&row).await.expect("upsert");
    let second = harness
        .store
        .upsert_passenger(&RidePassenger {
            id: PassengerId::random(),
            status: PassengerStatus::Confirmed,
            ..row
        })
        .await
        .expect("upsert");

    assert_eq!(first, second);
    let rows = harness.store.list_passengers(&[ride.id()]).await.expect("list");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, PassengerStatus::Confirmed);
}

#[rstest]
#[tokio::test]
async fn second_rating_hits_the_uniqueness_backstop(harness: Harness) {
    let student = seeded(&harness.store, account("s@campus.edu", Role::Student, true, true)).await;
    let driver = seeded(&harness.store, account("d@campus.edu", Role::Driver, true, true)).await;
    let ride = completed_ride(&harness.store, student, driver).await;
    RatingRepository::insert(&harness.store, &rating(ride, student, driver, 4))
        .await
        .expect("first rating");

    let err = RatingRepository::insert(&harness.store, &rating(ride, student, driver, 2))
        .await
        .expect_err("second rating");

    assert!(matches!(err, RatingRepositoryError::DuplicateRating { .. }));
    let facts = harness
        .store
        .eligibility(&ride)
        .await
        .expect("lookup")
        .expect("ride exists");
    assert!(facts.already_rated);
}

#[rstest]
#[tokio::test]
async fn driver_statistics_count_completed_rides(harness: Harness) {
    let student = seeded(&harness.store, account("s@campus.edu", Role::Student, true, true)).await;
    let driver = seeded(&harness.store, account("d@campus.edu", Role::Driver, true, true)).await;
    let first = completed_ride(&harness.store, student, driver).await;
    completed_ride(&harness.store, student, driver).await;
    RatingRepository::insert(&harness.store, &rating(first, student, driver, 3))
        .await
        .expect("rating stored");

    let stats = harness.store.driver_statistics(&[driver]).await.expect("stats");

    assert_eq!(stats[0].completed_rides, 2);
    assert_eq!(stats[0].totals, RatingTotals { sum: 3, count: 1 });
}

#[rstest]
#[tokio::test]
async fn outbox_lists_due_intents_in_order(harness: Harness) {
    let now = harness.clock.utc();
    let recipient = EmailAddress::new("s@campus.edu").expect("valid email");
    let intent = |offset: i64| {
        NotificationIntent::pending(
            IntentId::random(),
            NewNotification::new(recipient.clone(), NotificationKind::RideAccepted, json!({})),
            now + TimeDelta::seconds(offset),
        )
    };
    let later = intent(60);
    let soon = intent(-30);
    let sooner = intent(-60);
    for row in [&later, &soon, &sooner] {
        harness.store.enqueue(row).await.expect("enqueue");
    }

    let due = harness.store.list_due(now, 10).await.expect("due");
    let ids: Vec<_> = due.iter().map(|row| row.id).collect();
    assert_eq!(ids, [sooner.id, soon.id]);

    harness.store.mark_delivered(&sooner.id, 1).await.expect("mark");
    let due = harness.store.list_due(now, 1).await.expect("due");
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].id, soon.id);
}

#[rstest]
#[tokio::test]
async fn approval_queue_is_oldest_first(harness: Harness) {
    let now = Utc::now();
    let created = |email: &str, hours_ago: i64, verified: bool, approved: bool| {
        account_created_at(
            email,
            Role::Driver,
            verified,
            approved,
            now - TimeDelta::hours(hours_ago),
        )
    };
    let middle = seeded(&harness.store, created("mid@campus.edu", 2, true, false)).await;
    let newest = seeded(&harness.store, created("new@campus.edu", 1, true, false)).await;
    let oldest = seeded(&harness.store, created("old@campus.edu", 3, true, false)).await;
    seeded(&harness.store, created("unverified@campus.edu", 4, false, false)).await;
    seeded(&harness.store, created("done@campus.edu", 5, true, true)).await;

    let queue: Vec<_> = harness
        .store
        .list_pending_approval()
        .await
        .expect("pending list")
        .iter()
        .map(Account::id)
        .collect();
    assert_eq!(queue, [oldest, middle, newest]);
}

#[rstest]
#[case::delivered(true)]
#[case::abandoned(false)]
#[tokio::test]
async fn finished_intents_drop_their_token(harness: Harness, #[case] delivered: bool) {
    let intent = NotificationIntent::pending(
        IntentId::random(),
        NewNotification::new(
            EmailAddress::new("s@campus.edu").expect("valid email"),
            NotificationKind::PasswordReset,
            json!({"name": "Sam", "token": "secret"}),
        ),
        harness.clock.utc(),
    );
    harness.store.enqueue(&intent).await.expect("enqueue");
    harness
        .store
        .reschedule(&intent.id, 1, harness.clock.utc(), "timeout")
        .await
        .expect("reschedule");
    assert_eq!(harness.store.outbox_snapshot()[0].data["token"], "secret");

    if delivered {
        harness.store.mark_delivered(&intent.id, 2).await.expect("mark");
    } else {
        harness.store.abandon(&intent.id, 2, "refused").await.expect("abandon");
    }

    let stored = &harness.store.outbox_snapshot()[0];
    assert_ne!(stored.state, DeliveryState::Pending);
    assert_eq!(stored.data, json!({"name": "Sam"}));
}
