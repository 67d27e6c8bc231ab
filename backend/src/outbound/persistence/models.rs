//! Internal Diesel row structs for database operations.
//!
//! These types are implementation details of the persistence layer and must
//! never be exposed to the domain. They exist solely to satisfy Diesel's
//! type requirements for queries and mutations.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use super::schema::{accounts, notification_outbox, ratings, ride_passengers, rides};

// ---------------------------------------------------------------------------
// Account models
// ---------------------------------------------------------------------------

/// Row struct for reading from the accounts table.
///
/// Token columns are deliberately not selected; they are only ever matched
/// in `WHERE` clauses.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = accounts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct AccountRow {
    pub id: Uuid,
    pub email: String,
    pub credential_digest: String,
    pub display_name: String,
    pub role: String,
    pub phone: Option<String>,
    pub is_verified: bool,
    pub is_approved: bool,
    pub student_number: Option<String>,
    pub default_pickup: Option<String>,
    pub default_dropoff: Option<String>,
    pub parent_name: Option<String>,
    pub parent_phone: Option<String>,
    pub emergency_contact: Option<String>,
    pub license_number: Option<String>,
    pub vehicle_type: Option<String>,
    pub vehicle_model: Option<String>,
    pub vehicle_plate: Option<String>,
    pub vehicle_color: Option<String>,
    pub capacity: i16,
    pub created_at: DateTime<Utc>,
}

/// Insertable struct for creating account records.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = accounts)]
pub(crate) struct NewAccountRow<'a> {
    pub id: Uuid,
    pub email: &'a str,
    pub credential_digest: &'a str,
    pub display_name: &'a str,
    pub role: &'a str,
    pub phone: Option<&'a str>,
    pub is_verified: bool,
    pub is_approved: bool,
    pub student_number: Option<&'a str>,
    pub default_pickup: Option<&'a str>,
    pub default_dropoff: Option<&'a str>,
    pub parent_name: Option<&'a str>,
    pub parent_phone: Option<&'a str>,
    pub emergency_contact: Option<&'a str>,
    pub license_number: Option<&'a str>,
    pub vehicle_type: Option<&'a str>,
    pub vehicle_model: Option<&'a str>,
    pub vehicle_plate: Option<&'a str>,
    pub vehicle_color: Option<&'a str>,
    pub capacity: i16,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Changeset for partial profile updates; `None` fields are left untouched.
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = accounts)]
pub(crate) struct AccountProfileUpdate<'a> {
    pub email: Option<&'a str>,
    pub display_name: Option<&'a str>,
    pub phone: Option<&'a str>,
    pub student_number: Option<&'a str>,
    pub default_pickup: Option<&'a str>,
    pub default_dropoff: Option<&'a str>,
    pub parent_name: Option<&'a str>,
    pub parent_phone: Option<&'a str>,
    pub emergency_contact: Option<&'a str>,
    pub license_number: Option<&'a str>,
    pub vehicle_type: Option<&'a str>,
    pub vehicle_model: Option<&'a str>,
    pub vehicle_plate: Option<&'a str>,
    pub vehicle_color: Option<&'a str>,
    pub capacity: Option<i16>,
}

// ---------------------------------------------------------------------------
// Ride models
// ---------------------------------------------------------------------------

/// Row struct for reading from the rides table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = rides)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct RideRow {
    pub id: Uuid,
    pub student_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub pickup_location: String,
    pub dropoff_location: String,
    pub pickup_time: DateTime<Utc>,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insertable struct for creating ride records.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = rides)]
pub(crate) struct NewRideRow<'a> {
    pub id: Uuid,
    pub student_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub pickup_location: &'a str,
    pub dropoff_location: &'a str,
    pub pickup_time: DateTime<Utc>,
    pub status: &'a str,
    pub notes: Option<&'a str>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row struct for reading from the ride_passengers table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = ride_passengers)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct RidePassengerRow {
    pub id: Uuid,
    pub ride_id: Uuid,
    pub student_id: Uuid,
    pub status: String,
}

/// Insertable struct for passenger upserts.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = ride_passengers)]
pub(crate) struct NewRidePassengerRow<'a> {
    pub id: Uuid,
    pub ride_id: Uuid,
    pub student_id: Uuid,
    pub status: &'a str,
}

// ---------------------------------------------------------------------------
// Rating models
// ---------------------------------------------------------------------------

/// Row struct for reading from the ratings table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = ratings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct RatingRow {
    pub id: Uuid,
    pub ride_id: Uuid,
    pub student_id: Uuid,
    pub driver_id: Uuid,
    pub score: i16,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Insertable struct for creating rating records.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = ratings)]
pub(crate) struct NewRatingRow<'a> {
    pub id: Uuid,
    pub ride_id: Uuid,
    pub student_id: Uuid,
    pub driver_id: Uuid,
    pub score: i16,
    pub comment: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Outbox models
// ---------------------------------------------------------------------------

/// Row struct for reading from the notification_outbox table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = notification_outbox)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct OutboxRow {
    pub id: Uuid,
    pub recipient: String,
    pub kind: String,
    pub data: serde_json::Value,
    pub state: String,
    pub attempts: i32,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Insertable struct for queuing intents.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = notification_outbox)]
pub(crate) struct NewOutboxRow<'a> {
    pub id: Uuid,
    pub recipient: &'a str,
    pub kind: &'a str,
    pub data: &'a serde_json::Value,
    pub state: &'a str,
    pub attempts: i32,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}

/// Changeset recording a delivery outcome.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = notification_outbox)]
#[diesel(treat_none_as_null = true)]
pub(crate) struct OutboxOutcomeUpdate<'a> {
    pub state: &'a str,
    pub attempts: i32,
    pub last_error: Option<&'a str>,
}
