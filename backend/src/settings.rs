//! Runtime configuration loaded via OrthoConfig.
//!
//! Values come from `CAMPUS_RIDES_*` environment variables, command-line
//! flags, or a configuration file, in OrthoConfig's usual precedence.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use url::Url;

use crate::domain::{OutboxRelayConfig, TokenPolicy};
use crate::outbound::notification::HttpNotificationIdentity;
use crate::outbound::persistence::PoolConfig;

const DEFAULT_DATABASE_URL: &str = "postgres://localhost/campus_rides";

/// Raised when a configured value cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("notification endpoint `{value}` is not a valid URL: {message}")]
    InvalidEndpoint { value: String, message: String },
}

/// Settings shared by the relay worker and the admin tooling.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "CAMPUS_RIDES")]
pub struct AppSettings {
    /// PostgreSQL connection string.
    pub database_url: Option<String>,
    /// Upper bound on pooled connections.
    #[ortho_config(default = 10)]
    pub pool_max_size: u32,
    /// Seconds to wait for a pooled connection.
    #[ortho_config(default = 30)]
    pub pool_connection_timeout_secs: u64,
    /// HTTP endpoint of the notification relay. Intents are only logged
    /// when unset.
    pub notification_endpoint: Option<String>,
    /// Bearer token presented to the notification relay.
    pub notification_api_token: Option<String>,
    #[ortho_config(default = 10)]
    pub notification_timeout_secs: u64,
    /// Seconds between polls when the outbox has nothing due.
    #[ortho_config(default = 5)]
    pub relay_poll_interval_secs: u64,
    #[ortho_config(default = 50)]
    pub relay_batch_size: usize,
    #[ortho_config(default = 5)]
    pub relay_max_attempts: u32,
    #[ortho_config(default = 30)]
    pub relay_initial_backoff_secs: u64,
    #[ortho_config(default = 1800)]
    pub relay_max_backoff_secs: u64,
    #[ortho_config(default = 24)]
    pub verification_ttl_hours: u64,
    #[ortho_config(default = 1)]
    pub reset_ttl_hours: u64,
}

impl AppSettings {
    /// Database URL, falling back to the local development database.
    pub fn database_url(&self) -> &str {
        self.database_url.as_deref().unwrap_or(DEFAULT_DATABASE_URL)
    }

    /// Pool configuration derived from the database and pool settings.
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::new(self.database_url())
            .with_max_size(self.pool_max_size)
            .with_connection_timeout(Duration::from_secs(self.pool_connection_timeout_secs))
    }

    /// Parsed notification endpoint, or `None` when deliveries should only
    /// be logged.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::InvalidEndpoint`] when the value is not an
    /// absolute URL.
    pub fn notification_endpoint(&self) -> Result<Option<Url>, SettingsError> {
        self.notification_endpoint
            .as_deref()
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| {
                Url::parse(raw).map_err(|err| SettingsError::InvalidEndpoint {
                    value: raw.to_owned(),
                    message: err.to_string(),
                })
            })
            .transpose()
    }

    /// Identity the HTTP sender presents; blank tokens count as unset.
    pub fn notification_identity(&self) -> HttpNotificationIdentity {
        HttpNotificationIdentity {
            api_token: self
                .notification_api_token
                .as_deref()
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(str::to_owned),
            ..HttpNotificationIdentity::default()
        }
    }

    /// Upper bound on a single notification request.
    pub fn notification_timeout(&self) -> Duration {
        Duration::from_secs(self.notification_timeout_secs)
    }

    /// Idle wait between relay passes; never below one second.
    pub fn relay_poll_interval(&self) -> Duration {
        Duration::from_secs(self.relay_poll_interval_secs.max(1))
    }

    /// Relay tuning with batch size and attempts clamped to at least one.
    pub fn relay_config(&self) -> OutboxRelayConfig {
        OutboxRelayConfig {
            batch_size: self.relay_batch_size.max(1),
            max_attempts: self.relay_max_attempts.max(1),
            initial_backoff: Duration::from_secs(self.relay_initial_backoff_secs),
            max_backoff: Duration::from_secs(
                self.relay_max_backoff_secs.max(self.relay_initial_backoff_secs),
            ),
        }
    }

    /// Lifetimes for verification and reset tokens.
    pub fn token_policy(&self) -> TokenPolicy {
        TokenPolicy {
            verification_ttl: hours(self.verification_ttl_hours),
            reset_ttl: hours(self.reset_ttl_hours),
        }
    }
}

fn hours(count: u64) -> Duration {
    Duration::from_secs(count.saturating_mul(3600))
}

#[cfg(test)]
mod tests {
    //! Unit tests for configuration parsing.

    use super::*;
    use std::ffi::OsString;

    use env_lock::lock_env;
    use rstest::rstest;

    const VARS: [&str; 9] = [
        "CAMPUS_RIDES_DATABASE_URL",
        "CAMPUS_RIDES_NOTIFICATION_API_TOKEN",
        "CAMPUS_RIDES_POOL_MAX_SIZE",
        "CAMPUS_RIDES_POOL_CONNECTION_TIMEOUT_SECS",
        "CAMPUS_RIDES_NOTIFICATION_ENDPOINT",
        "CAMPUS_RIDES_RELAY_BATCH_SIZE",
        "CAMPUS_RIDES_RELAY_MAX_ATTEMPTS",
        "CAMPUS_RIDES_RESET_TTL_HOURS",
        "CAMPUS_RIDES_RELAY_POLL_INTERVAL_SECS",
    ];

    fn load_from_empty_args() -> AppSettings {
        AppSettings::load_from_iter([OsString::from("campus-rides")]).expect("config should load")
    }

    #[rstest]
    fn defaults_are_used_when_missing() {
        let _guard = lock_env(VARS.map(|name| (name, None::<String>)));

        let settings = load_from_empty_args();
        assert_eq!(settings.database_url(), DEFAULT_DATABASE_URL);
        assert_eq!(settings.notification_endpoint(), Ok(None));
        assert_eq!(settings.relay_config(), OutboxRelayConfig::default());
        assert_eq!(settings.token_policy(), TokenPolicy::default());
        assert_eq!(settings.relay_poll_interval(), Duration::from_secs(5));
        assert!(settings.notification_identity().api_token.is_none());
        assert_eq!(settings.pool_config().max_size(), 10);
        assert_eq!(
            settings.pool_config().connection_timeout(),
            Duration::from_secs(30)
        );
    }

    #[rstest]
    fn environment_overrides_are_respected() {
        let _guard = lock_env([
            (
                "CAMPUS_RIDES_DATABASE_URL",
                Some("postgres://rides@db/rides".to_owned()),
            ),
            (
                "CAMPUS_RIDES_NOTIFICATION_ENDPOINT",
                Some("https://mail.campus.edu/notify".to_owned()),
            ),
            ("CAMPUS_RIDES_RELAY_BATCH_SIZE", Some("5".to_owned())),
            ("CAMPUS_RIDES_RELAY_MAX_ATTEMPTS", Some("2".to_owned())),
            ("CAMPUS_RIDES_RESET_TTL_HOURS", Some("3".to_owned())),
            ("CAMPUS_RIDES_RELAY_POLL_INTERVAL_SECS", Some("0".to_owned())),
        ]);

        let settings = load_from_empty_args();
        assert_eq!(settings.database_url(), "postgres://rides@db/rides");
        assert_eq!(
            settings
                .notification_endpoint()
                .expect("valid endpoint")
                .map(String::from),
            Some("https://mail.campus.edu/notify".to_owned())
        );
        assert_eq!(settings.relay_config().batch_size, 5);
        assert_eq!(settings.relay_config().max_attempts, 2);
        assert_eq!(settings.token_policy().reset_ttl, Duration::from_secs(3 * 3600));
        assert_eq!(settings.relay_poll_interval(), Duration::from_secs(1));
    }

    #[rstest]
    #[case::set(Some("  relay-secret "), Some("relay-secret"))]
    #[case::blank(Some("   "), None)]
    #[case::unset(None, None)]
    fn api_token_reaches_the_sender_identity(
        #[case] raw: Option<&str>,
        #[case] expected: Option<&str>,
    ) {
        let _guard = lock_env(VARS.map(|name| match name {
            "CAMPUS_RIDES_NOTIFICATION_API_TOKEN" => (name, raw.map(str::to_owned)),
            _ => (name, None),
        }));

        let settings = load_from_empty_args();
        assert_eq!(
            settings.notification_identity().api_token.as_deref(),
            expected
        );
    }

    #[rstest]
    fn malformed_endpoint_is_rejected() {
        let _guard = lock_env(
            VARS.map(|name| match name {
                "CAMPUS_RIDES_NOTIFICATION_ENDPOINT" => (name, Some("not a url".to_owned())),
                _ => (name, None),
            }),
        );

        let settings = load_from_empty_args();
        assert!(matches!(
            settings.notification_endpoint(),
            Err(SettingsError::InvalidEndpoint { .. })
        ));
    }
}
