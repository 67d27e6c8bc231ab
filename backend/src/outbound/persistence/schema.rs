//! Diesel table definitions for the PostgreSQL schema.
//!
//! These definitions must match `backend/migrations` exactly. When the
//! migrations change, regenerate with `diesel print-schema` or edit by hand.

diesel::table! {
    /// Registered identities with role-specific profile columns.
    ///
    /// `email` holds the lower-cased address and carries a unique index.
    accounts (id) {
        id -> Uuid,
        email -> Varchar,
        credential_digest -> Text,
        display_name -> Varchar,
        role -> Varchar,
        phone -> Nullable<Varchar>,
        is_verified -> Bool,
        is_approved -> Bool,
        student_number -> Nullable<Varchar>,
        default_pickup -> Nullable<Varchar>,
        default_dropoff -> Nullable<Varchar>,
        parent_name -> Nullable<Varchar>,
        parent_phone -> Nullable<Varchar>,
        emergency_contact -> Nullable<Varchar>,
        license_number -> Nullable<Varchar>,
        vehicle_type -> Nullable<Varchar>,
        vehicle_model -> Nullable<Varchar>,
        vehicle_plate -> Nullable<Varchar>,
        vehicle_color -> Nullable<Varchar>,
        capacity -> Int2,
        /// SHA-256 digest of the outstanding verification token.
        verification_token_digest -> Nullable<Text>,
        verification_token_expires_at -> Nullable<Timestamptz>,
        /// SHA-256 digest of the outstanding password reset token.
        reset_token_digest -> Nullable<Text>,
        reset_token_expires_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Ride requests. `driver_id` is null while pending.
    rides (id) {
        id -> Uuid,
        student_id -> Uuid,
        driver_id -> Nullable<Uuid>,
        pickup_location -> Varchar,
        dropoff_location -> Varchar,
        pickup_time -> Timestamptz,
        status -> Varchar,
        notes -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Secondary passengers; unique on `(ride_id, student_id)`.
    ride_passengers (id) {
        id -> Uuid,
        ride_id -> Uuid,
        student_id -> Uuid,
        status -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// One rating per ride; `ride_id` carries a unique index.
    ratings (id) {
        id -> Uuid,
        ride_id -> Uuid,
        student_id -> Uuid,
        driver_id -> Uuid,
        score -> Int2,
        comment -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// Notification intents awaiting or past delivery.
    notification_outbox (id) {
        id -> Uuid,
        recipient -> Varchar,
        kind -> Varchar,
        data -> Jsonb,
        state -> Varchar,
        attempts -> Int4,
        next_attempt_at -> Timestamptz,
        last_error -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(ratings -> rides (ride_id));
diesel::joinable!(ride_passengers -> rides (ride_id));

diesel::allow_tables_to_appear_in_same_query!(
    accounts,
    rides,
    ride_passengers,
    ratings,
    notification_outbox,
);
