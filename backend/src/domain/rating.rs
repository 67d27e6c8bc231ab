//! Post-ride ratings and the aggregates derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::account::AccountContact;
use super::ride::{Location, RideStatus};
use super::{AccountId, Error, ErrorReason, RatingId, RideId};

/// Lowest accepted score.
pub const RATING_MIN: u8 = 1;
/// Highest accepted score.
pub const RATING_MAX: u8 = 5;
/// Longest accepted comment, in characters.
pub const COMMENT_MAX: usize = 1000;

/// Integer score in `1..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct RatingScore(u8);

impl RatingScore {
    /// Validate a caller supplied score.
    ///
    /// # Examples
    /// ```
    /// use campus_rides::domain::{ErrorCode, RatingScore};
    ///
    /// assert_eq!(RatingScore::new(4).expect("in range").value(), 4);
    /// let err = RatingScore::new(6).expect_err("out of range");
    /// assert_eq!(err.code(), ErrorCode::InvalidRequest);
    /// assert_eq!(err.reason(), Some("invalid_range"));
    /// ```
    pub fn new(value: i64) -> Result<Self, Error> {
        u8::try_from(value)
            .ok()
            .filter(|score| (RATING_MIN..=RATING_MAX).contains(score))
            .map(Self)
            .ok_or_else(|| {
                Error::invalid_request(format!(
                    "rating must be between {RATING_MIN} and {RATING_MAX}, got {value}"
                ))
                .with_reason(ErrorReason::InvalidRange)
            })
    }

    /// Score as a plain integer.
    pub const fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for RatingScore {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RatingScore> for u8 {
    fn from(value: RatingScore) -> Self {
        value.0
    }
}

/// Normalise an optional comment: trimmed, blank dropped, length checked.
pub fn normalise_comment(comment: Option<String>) -> Result<Option<String>, Error> {
    let Some(comment) = comment
        .map(|c| c.trim().to_owned())
        .filter(|c| !c.is_empty())
    else {
        return Ok(None);
    };
    if comment.chars().count() > COMMENT_MAX {
        return Err(Error::invalid_request(format!(
            "comment must be at most {COMMENT_MAX} characters"
        )));
    }
    Ok(Some(comment))
}

/// Immutable rating of one completed ride.
///
/// The driver is copied from the ride, never supplied by the rater.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    pub id: RatingId,
    pub ride_id: RideId,
    pub student_id: AccountId,
    pub driver_id: AccountId,
    pub score: RatingScore,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Mean score rounded to one decimal, with the number of ratings behind it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingAverage {
    pub average: f64,
    pub count: u64,
}

impl RatingAverage {
    /// Aggregate for a party nobody has rated yet.
    pub const EMPTY: Self = Self {
        average: 0.0,
        count: 0,
    };

    /// Build an average from a score total and count.
    ///
    /// Rounding is half away from zero, done in integer tenths so results do
    /// not depend on floating point representation.
    ///
    /// # Examples
    /// ```
    /// use campus_rides::domain::RatingAverage;
    ///
    /// assert_eq!(RatingAverage::from_totals(0, 0), RatingAverage::EMPTY);
    /// assert_eq!(RatingAverage::from_totals(9, 2).average, 4.5);
    /// assert_eq!(RatingAverage::from_totals(13, 3).average, 4.3);
    /// ```
    pub fn from_totals(sum: i64, count: u64) -> Self {
        if count == 0 {
            return Self::EMPTY;
        }
        let sum = i128::from(sum);
        let count_wide = i128::from(count);
        let doubled_tenths = sum * 20;
        let tenths = if doubled_tenths >= 0 {
            (doubled_tenths + count_wide) / (2 * count_wide)
        } else {
            (doubled_tenths - count_wide) / (2 * count_wide)
        };
        let average = tenths as f64 / 10.0;
        Self { average, count }
    }
}

/// Facts about a ride needed to decide whether it can be rated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatingEligibility {
    pub student_id: AccountId,
    pub driver_id: Option<AccountId>,
    pub status: RideStatus,
    pub already_rated: bool,
}

impl RatingEligibility {
    /// Whether `student` may rate the ride right now.
    pub fn allows(&self, student: AccountId) -> bool {
        self.rated_driver(student).is_ok()
    }

    /// Driver the rating will name, or the reason rating is refused.
    ///
    /// A ride owned by someone else is reported as missing so its existence
    /// does not leak.
    pub fn rated_driver(&self, student: AccountId) -> Result<AccountId, Error> {
        if self.student_id != student {
            return Err(Error::not_found("ride not found"));
        }
        if self.status != RideStatus::Completed {
            return Err(
                Error::conflict(format!("a {} ride cannot be rated", self.status))
                    .with_reason(ErrorReason::RideState),
            );
        }
        if self.already_rated {
            return Err(Error::conflict("ride has already been rated")
                .with_reason(ErrorReason::DuplicateRating));
        }
        self.driver_id.ok_or_else(|| {
            Error::conflict("ride no longer has a driver to rate")
                .with_reason(ErrorReason::RideState)
        })
    }
}

/// Rating listed with the ride it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatingView {
    pub rating: Rating,
    pub pickup: Location,
    pub dropoff: Location,
    /// Name of the other party: the rater for driver listings, the driver
    /// for student listings. Absent when that account no longer exists.
    pub counterpart: Option<AccountContact>,
}

/// Leaderboard row for an active driver.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverStanding {
    pub driver: AccountContact,
    pub completed_rides: u64,
    pub rating: RatingAverage,
}

/// Order standings by average descending, then completed rides descending.
pub fn rank_standings(standings: &mut [DriverStanding]) {
    standings.sort_by(|a, b| {
        b.rating
            .average
            .total_cmp(&a.rating.average)
            .then_with(|| b.completed_rides.cmp(&a.completed_rides))
    });
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use rstest::rstest;

    use super::*;
    use crate::domain::{DisplayName, EmailAddress, ErrorCode};

    #[rstest]
    #[case(0)]
    #[case(6)]
    #[case(-3)]
    #[case(i64::from(u8::MAX) + 1)]
    fn scores_outside_range_are_invalid(#[case] value: i64) {
        let err = RatingScore::new(value).expect_err("out of range");
        assert_eq!(err.code(), ErrorCode::InvalidRequest);
        assert_eq!(err.reason(), Some("invalid_range"));
    }

    #[rstest]
    #[case(&[], 0.0, 0)]
    #[case(&[4], 4.0, 1)]
    #[case(&[5, 4], 4.5, 2)]
    #[case(&[5, 4, 4], 4.3, 3)]
    #[case(&[5, 5, 4], 4.7, 3)]
    #[case(&[1, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2], 2.0, 20)]
    #[case(&[3, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4], 4.0, 20)]
    #[case(&[4, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5], 5.0, 20)]
    #[case(&[1, 2], 1.5, 2)]
    fn average_rounds_to_one_decimal(
        #[case] scores: &[i64],
        #[case] expected: f64,
        #[case] count: u64,
    ) {
        let sum = scores.iter().sum();
        let average = RatingAverage::from_totals(sum, scores.len() as u64);
        assert_eq!(average.count, count);
        assert!((average.average - expected).abs() < f64::EPSILON);
    }

    #[rstest]
    fn rounding_is_half_away_from_zero() {
        // 89 / 20 = 4.45 exactly.
        assert_eq!(RatingAverage::from_totals(89, 20).average, 4.5);
    }

    fn eligibility(status: RideStatus, already_rated: bool) -> (AccountId, RatingEligibility) {
        let student = AccountId::random();
        (
            student,
            RatingEligibility {
                student_id: student,
                driver_id: Some(AccountId::random()),
                status,
                already_rated,
            },
        )
    }

    #[rstest]
    fn completed_unrated_ride_is_rateable() {
        let (student, facts) = eligibility(RideStatus::Completed, false);
        assert!(facts.allows(student));
        assert_eq!(facts.rated_driver(student).ok(), facts.driver_id);
    }

    #[rstest]
    #[case(RideStatus::Pending)]
    #[case(RideStatus::Accepted)]
    #[case(RideStatus::InProgress)]
    #[case(RideStatus::Cancelled)]
    fn unfinished_ride_is_not_rateable(#[case] status: RideStatus) {
        let (student, facts) = eligibility(status, false);
        let err = facts.rated_driver(student).expect_err("not completed");
        assert_eq!(err.code(), ErrorCode::Conflict);
        assert_eq!(err.reason(), Some("ride_state"));
    }

    #[rstest]
    fn rated_ride_reports_duplicate() {
        let (student, facts) = eligibility(RideStatus::Completed, true);
        let err = facts.rated_driver(student).expect_err("already rated");
        assert_eq!(err.reason(), Some("duplicate_rating"));
    }

    #[rstest]
    fn other_students_see_not_found() {
        let (_, facts) = eligibility(RideStatus::Completed, false);
        let err = facts
            .rated_driver(AccountId::random())
            .expect_err("foreign ride");
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[rstest]
    #[case(None, None)]
    #[case(Some("   ".to_owned()), None)]
    #[case(Some(" good ".to_owned()), Some("good".to_owned()))]
    fn comments_are_normalised(#[case] raw: Option<String>, #[case] expected: Option<String>) {
        assert_eq!(normalise_comment(raw).expect("valid comment"), expected);
    }

    #[rstest]
    fn overlong_comment_is_rejected() {
        let err = normalise_comment(Some("x".repeat(COMMENT_MAX + 1))).expect_err("too long");
        assert_eq!(err.code(), ErrorCode::InvalidRequest);
    }

    #[rstest]
    fn standings_rank_by_average_then_volume() {
        let standing = |name: &str, average: f64, completed: u64| DriverStanding {
            driver: AccountContact {
                account_id: AccountId::random(),
                display_name: DisplayName::new(name).expect("valid name"),
                email: EmailAddress::new(format!("{name}@campus.edu")).expect("valid email"),
                phone: None,
            },
            completed_rides: completed,
            rating: RatingAverage { average, count: 1 },
        };
        let mut rows = vec![
            standing("c", 4.0, 10),
            standing("a", 4.8, 2),
            standing("b", 4.0, 12),
        ];

        rank_standings(&mut rows);

        let names: Vec<_> = rows
            .iter()
            .map(|row| row.driver.display_name.as_ref().to_owned())
            .collect();
        assert_eq!(names, ["a", "b", "c"]);
    }
}
