//! Outbound adapters implementing domain ports for external infrastructure.
//!
//! - **persistence**: PostgreSQL-backed repositories and outbox using Diesel
//! - **memory**: a single-process datastore implementing the same ports
//! - **notification**: senders used by the outbox relay
//!
//! Adapters are thin translators that convert between domain types and
//! infrastructure-specific representations. They contain no business logic.

pub mod memory;
pub mod notification;
pub mod persistence;
