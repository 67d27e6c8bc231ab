//! Tests for the ride state machine and ride values.

use super::*;
use crate::domain::{DisplayName, EmailAddress};
use chrono::TimeZone;
use rstest::{fixture, rstest};

#[fixture]
fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 2, 8, 30, 0)
        .single()
        .expect("valid time")
}

#[fixture]
fn pending(now: DateTime<Utc>) -> RideDraft {
    let request = RideRequest::new("Library", "North dorms", now, None).expect("valid request");
    RideDraft::requested(RideId::random(), AccountId::random(), request, now)
}

fn contact(name: &str) -> AccountContact {
    AccountContact {
        account_id: AccountId::random(),
        display_name: DisplayName::new(name).expect("valid name"),
        email: EmailAddress::new(format!("{}@campus.edu", name.to_lowercase()))
            .expect("valid email"),
        phone: None,
    }
}

#[rstest]
#[case(StatusChange::Start, RideStatus::Accepted, true)]
#[case(StatusChange::Start, RideStatus::Pending, false)]
#[case(StatusChange::Start, RideStatus::InProgress, false)]
#[case(StatusChange::Complete, RideStatus::InProgress, true)]
#[case(StatusChange::Complete, RideStatus::Accepted, false)]
#[case(StatusChange::Complete, RideStatus::Completed, false)]
#[case(StatusChange::Cancel, RideStatus::Pending, true)]
#[case(StatusChange::Cancel, RideStatus::Accepted, true)]
#[case(StatusChange::Cancel, RideStatus::InProgress, false)]
#[case(StatusChange::Cancel, RideStatus::Cancelled, false)]
#[case(StatusChange::Start, RideStatus::Cancelled, false)]
fn transition_table(#[case] change: StatusChange, #[case] from: RideStatus, #[case] allowed: bool) {
    assert_eq!(change.permits(from), allowed);
}

#[rstest]
fn terminal_statuses_have_no_exit() {
    for change in [StatusChange::Start, StatusChange::Complete, StatusChange::Cancel] {
        assert!(!change.permits(RideStatus::Completed));
        assert!(!change.permits(RideStatus::Cancelled));
    }
}

#[rstest]
#[case(RideStatus::InProgress, Ok(StatusChange::Start))]
#[case(RideStatus::Completed, Ok(StatusChange::Complete))]
#[case(RideStatus::Cancelled, Ok(StatusChange::Cancel))]
#[case(
    RideStatus::Pending,
    Err(RideValidationError::NotAStatusChange(RideStatus::Pending))
)]
#[case(
    RideStatus::Accepted,
    Err(RideValidationError::NotAStatusChange(RideStatus::Accepted))
)]
fn status_change_from_target(
    #[case] status: RideStatus,
    #[case] expected: Result<StatusChange, RideValidationError>,
) {
    assert_eq!(StatusChange::try_from(status), expected);
}

#[rstest]
fn status_text_round_trips() {
    for status in [
        RideStatus::Pending,
        RideStatus::Accepted,
        RideStatus::InProgress,
        RideStatus::Completed,
        RideStatus::Cancelled,
    ] {
        assert_eq!(status.as_str().parse::<RideStatus>(), Ok(status));
    }
    assert!("finished".parse::<RideStatus>().is_err());
}

#[rstest]
fn requested_rides_start_pending_without_driver(pending: RideDraft) {
    let ride = Ride::new(pending).expect("valid ride");
    assert_eq!(ride.status(), RideStatus::Pending);
    assert_eq!(ride.driver_id(), None);
}

#[rstest]
fn pending_ride_with_driver_is_rejected(pending: RideDraft) {
    let mut draft = pending;
    draft.driver_id = Some(AccountId::random());
    assert_eq!(Ride::new(draft), Err(RideValidationError::DriverOnPending));
}

#[rstest]
#[case(RideStatus::Accepted)]
#[case(RideStatus::InProgress)]
fn active_ride_without_driver_is_rejected(pending: RideDraft, #[case] status: RideStatus) {
    let mut draft = pending;
    draft.status = status;
    assert_eq!(
        Ride::new(draft),
        Err(RideValidationError::MissingDriver { status })
    );
}

#[rstest]
#[case(RideStatus::Cancelled)]
#[case(RideStatus::Completed)]
fn terminal_ride_may_lack_driver(pending: RideDraft, #[case] status: RideStatus) {
    let mut draft = pending;
    draft.status = status;
    assert!(Ride::new(draft).is_ok());
}

#[rstest]
fn accept_assigns_driver(pending: RideDraft, now: DateTime<Utc>) {
    let mut ride = Ride::new(pending).expect("valid ride");
    let driver = AccountId::random();
    let later = now + chrono::TimeDelta::minutes(5);

    ride.accept(driver, later);

    assert_eq!(ride.status(), RideStatus::Accepted);
    assert_eq!(ride.driver_id(), Some(driver));
    assert_eq!(ride.updated_at(), later);
    assert!(ride.involves(driver));
}

#[rstest]
#[case("", "Gym", RideValidationError::EmptyLocation { field: "pickup" })]
#[case("Gym", "   ", RideValidationError::EmptyLocation { field: "dropoff" })]
fn request_requires_locations(
    now: DateTime<Utc>,
    #[case] pickup: &str,
    #[case] dropoff: &str,
    #[case] expected: RideValidationError,
) {
    assert_eq!(RideRequest::new(pickup, dropoff, now, None), Err(expected));
}

#[rstest]
fn blank_notes_are_dropped(now: DateTime<Utc>) {
    let request =
        RideRequest::new("Gym", "Library", now, Some("  ".to_owned())).expect("valid request");
    assert_eq!(request.notes, None);
}

#[rstest]
fn roster_lists_primary_rider_first_without_duplicates(pending: RideDraft) {
    let ride = Ride::new(pending).expect("valid ride");
    let mut student = contact("Sam");
    student.account_id = ride.student_id();
    let friend = contact("Fran");
    let view = RideView {
        ride: ride.clone(),
        student: student.clone(),
        driver: None,
    };
    let rows = vec![
        (
            RidePassenger {
                id: PassengerId::random(),
                ride_id: ride.id(),
                student_id: student.account_id,
                status: PassengerStatus::Confirmed,
            },
            student.clone(),
        ),
        (
            RidePassenger {
                id: PassengerId::random(),
                ride_id: ride.id(),
                student_id: friend.account_id,
                status: PassengerStatus::Pending,
            },
            friend.clone(),
        ),
    ];

    let assembled = DriverRideView::assemble(view, rows);

    assert_eq!(
        assembled.roster,
        vec![
            RosterEntry {
                rider: student,
                seat: RosterSeat::Primary,
            },
            RosterEntry {
                rider: friend,
                seat: RosterSeat::Secondary(PassengerStatus::Pending),
            },
        ]
    );
}
