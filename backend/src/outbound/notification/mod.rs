//! Notification delivery adapters.
//!
//! Implementations of the `NotificationSender` port used by the outbox relay:
//! an HTTP client for the production relay and a tracing-only sender for
//! deployments without one.

mod dto;
mod http_sender;
mod log_sender;

pub use http_sender::{HttpNotificationIdentity, HttpNotificationSender};
pub use log_sender::LogNotificationSender;
