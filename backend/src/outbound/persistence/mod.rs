//! PostgreSQL persistence adapters using Diesel ORM.
//!
//! Concrete implementations of the domain repository ports backed by
//! PostgreSQL, using `diesel-async` with `bb8` connection pooling.
//!
//! # Architecture
//!
//! - **Thin adapters**: repositories translate between Diesel rows and domain
//!   types. Rules live in the domain services.
//! - **Internal models**: row structs (`models.rs`) and table definitions
//!   (`schema.rs`) never leave this module.
//! - **Conditional writes**: status, approval, and token updates filter on
//!   the state they expect, so races resolve in the database.
//! - **Typed errors**: database failures map onto each port's error enum.
//!
//! # Example
//!
//! ```ignore
//! use campus_rides::outbound::persistence::{DbPool, DieselRideRepository, PoolConfig};
//!
//! let pool = DbPool::new(PoolConfig::new("postgres://localhost/campus_rides")).await?;
//! let rides = DieselRideRepository::new(pool);
//! ```

mod diesel_account_repository;
mod diesel_basic_error_mapping;
mod diesel_notification_outbox;
mod diesel_rating_repository;
mod diesel_ride_repository;
mod models;
mod pool;
mod schema;

pub use diesel_account_repository::DieselAccountRepository;
pub use diesel_notification_outbox::DieselNotificationOutbox;
pub use diesel_rating_repository::DieselRatingRepository;
pub use diesel_ride_repository::DieselRideRepository;
pub use pool::{DbPool, PoolConfig, PoolError};
