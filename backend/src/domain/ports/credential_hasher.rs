//! Port for the external credential hashing collaborator.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::domain::{CredentialDigest, PlainCredential};

use super::define_port_error;

define_port_error! {
    /// Errors raised by credential hasher adapters.
    pub enum CredentialHasherError for "credential hasher" {
        /// The stored digest is not in a format the hasher understands.
        MalformedDigest => "stored credential digest is malformed",
    }
}

/// Contract: `hash(plaintext) -> digest` and `verify(digest, plaintext)`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialHasher: Send + Sync {
    async fn hash(
        &self,
        credential: &PlainCredential,
    ) -> Result<CredentialDigest, CredentialHasherError>;

    async fn verify(
        &self,
        digest: &CredentialDigest,
        credential: &PlainCredential,
    ) -> Result<bool, CredentialHasherError>;
}

const FIXTURE_PREFIX: &str = "fixture-sha256$";

/// Unsalted SHA-256 hasher for tests and local runs.
///
/// Not suitable for production credentials.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureCredentialHasher;

impl FixtureCredentialHasher {
    fn digest_of(credential: &PlainCredential) -> String {
        format!(
            "{FIXTURE_PREFIX}{}",
            hex::encode(Sha256::digest(credential.expose().as_bytes()))
        )
    }
}

#[async_trait]
impl CredentialHasher for FixtureCredentialHasher {
    async fn hash(
        &self,
        credential: &PlainCredential,
    ) -> Result<CredentialDigest, CredentialHasherError> {
        Ok(CredentialDigest::new(Self::digest_of(credential)))
    }

    async fn verify(
        &self,
        digest: &CredentialDigest,
        credential: &PlainCredential,
    ) -> Result<bool, CredentialHasherError> {
        if !digest.as_str().starts_with(FIXTURE_PREFIX) {
            return Err(CredentialHasherError::malformed_digest());
        }
        Ok(digest.as_str() == Self::digest_of(credential))
    }
}
