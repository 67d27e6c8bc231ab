//! Campus ride coordination backend.
//!
//! Students request rides, approved drivers accept and run them, students
//! rate completed rides, and administrators approve accounts. The
//! [`domain`] module holds the services and driven ports; [`outbound`]
//! holds the PostgreSQL, in-memory, and notification adapters.

pub mod domain;
pub mod outbound;
pub mod settings;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use settings::{AppSettings, SettingsError};
