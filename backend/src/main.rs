//! Notification relay worker: drains the outbox into the configured sender.

use std::sync::Arc;

use color_eyre::eyre::{Context, Result, eyre};
use mockable::DefaultClock;
use ortho_config::OrthoConfig;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use campus_rides::AppSettings;
use campus_rides::domain::OutboxRelay;
use campus_rides::domain::ports::NotificationSender;
use campus_rides::outbound::notification::{HttpNotificationSender, LogNotificationSender};
use campus_rides::outbound::persistence::{DbPool, DieselNotificationOutbox};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let settings =
        AppSettings::load().map_err(|err| eyre!("failed to load configuration: {err}"))?;

    let pool = DbPool::new(settings.pool_config())
        .await
        .wrap_err("failed to build database pool")?;
    let sender = build_sender(&settings)?;
    let relay = OutboxRelay::new(
        Arc::new(DieselNotificationOutbox::new(pool)),
        sender,
        Arc::new(DefaultClock),
        settings.relay_config(),
    );

    info!(
        poll_interval_secs = settings.relay_poll_interval().as_secs(),
        "notification relay started"
    );
    relay
        .run(settings.relay_poll_interval(), shutdown_signal())
        .await;
    Ok(())
}

fn build_sender(settings: &AppSettings) -> Result<Arc<dyn NotificationSender>> {
    match settings.notification_endpoint()? {
        Some(endpoint) => {
            info!(%endpoint, "delivering notifications over HTTP");
            let sender = HttpNotificationSender::with_identity(
                endpoint,
                settings.notification_timeout(),
                settings.notification_identity(),
            )
            .wrap_err("failed to build notification client")?;
            Ok(Arc::new(sender))
        }
        None => {
            warn!("no notification endpoint configured; notifications will only be logged");
            Ok(Arc::new(LogNotificationSender))
        }
    }
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
