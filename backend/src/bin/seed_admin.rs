//! Create the first administrator account.
//!
//! Administrators cannot self-register. This tool inserts a verified and
//! approved admin with a credential digest produced by the deployment's
//! credential hasher. Running it twice for the same email is harmless.

use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{Result, eyre};
use mockable::DefaultClock;
use ortho_config::OrthoConfig;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use campus_rides::AppSettings;
use campus_rides::domain::ports::FixtureCredentialHasher;
use campus_rides::domain::{
    AccountRegistry, CredentialDigest, DisplayName, EmailAddress, SeedOutcome,
};
use campus_rides::outbound::persistence::{DbPool, DieselAccountRepository};

#[derive(Debug, Parser)]
#[command(name = "seed-admin", about = "Create an administrator account")]
struct Cli {
    /// Login email of the administrator.
    #[arg(long)]
    email: String,
    /// Display name shown to other users.
    #[arg(long)]
    name: String,
    /// Credential digest as stored by the credential hasher.
    #[arg(long, env = "CAMPUS_RIDES_ADMIN_CREDENTIAL_DIGEST")]
    credential_digest: String,
    /// Database URL; overrides `CAMPUS_RIDES_DATABASE_URL`.
    #[arg(long)]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let cli = Cli::parse();
    let email = EmailAddress::new(&cli.email).map_err(|err| eyre!("invalid --email: {err}"))?;
    let name = DisplayName::new(cli.name).map_err(|err| eyre!("invalid --name: {err}"))?;
    if cli.credential_digest.trim().is_empty() {
        return Err(eyre!("--credential-digest must not be empty"));
    }

    let mut settings = AppSettings::load_from_iter([std::ffi::OsString::from("seed-admin")])
        .map_err(|err| eyre!("failed to load configuration: {err}"))?;
    if cli.database_url.is_some() {
        settings.database_url = cli.database_url;
    }

    let pool = DbPool::new(settings.pool_config().with_max_size(1)).await?;
    let registry = AccountRegistry::new(
        Arc::new(DieselAccountRepository::new(pool)),
        Arc::new(FixtureCredentialHasher),
        Arc::new(DefaultClock),
        settings.token_policy(),
    );

    match registry
        .seed_admin(email, CredentialDigest::new(cli.credential_digest), name)
        .await?
    {
        SeedOutcome::Created(id) => info!(account_id = %id, "administrator created"),
        SeedOutcome::AlreadyExists(id) => {
            info!(account_id = %id, "an account with that email already exists");
        }
    }
    Ok(())
}
