//! Port for account persistence, token bookkeeping, and approval state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    Account, AccountId, AccountPatch, CredentialDigest, EmailAddress, Role, TokenDigest,
};

use super::define_port_error;

define_port_error! {
    /// Errors raised by account repository adapters.
    pub enum AccountRepositoryError for "account repository" {
        /// Another account already uses the email address.
        DuplicateEmail { email: String } => "email {email} is already registered",
    }
}

/// Result of a conditional account deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountDeletion {
    /// The account and everything it owns is gone.
    Deleted,
    /// No account with that identifier exists.
    Missing,
    /// The account is the assigned driver of an accepted or in-progress ride.
    ActiveDriver,
}

/// Port for reading and mutating account rows.
///
/// Adapters own expiry checks for tokens and must compare against their own
/// clock (the datastore's `now()` for SQL adapters).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Insert a new account. Fails with `DuplicateEmail` when the email is
    /// taken.
    async fn insert(&self, account: &Account) -> Result<(), AccountRepositoryError>;

    async fn find_by_id(&self, id: &AccountId) -> Result<Option<Account>, AccountRepositoryError>;

    async fn find_by_email(
        &self,
        email: &EmailAddress,
    ) -> Result<Option<Account>, AccountRepositoryError>;

    /// Fetch every account whose identifier appears in `ids`, in no
    /// particular order. Unknown identifiers are skipped.
    async fn find_many(&self, ids: &[AccountId]) -> Result<Vec<Account>, AccountRepositoryError>;

    /// Verified but unapproved accounts, oldest first.
    async fn list_pending_approval(&self) -> Result<Vec<Account>, AccountRepositoryError>;

    /// Every account, newest first.
    async fn list_all(&self) -> Result<Vec<Account>, AccountRepositoryError>;

    /// Verified and approved drivers, oldest first.
    async fn list_active_drivers(&self) -> Result<Vec<Account>, AccountRepositoryError>;

    /// Replace any outstanding verification token for the account.
    async fn store_verification_token(
        &self,
        id: &AccountId,
        digest: &TokenDigest,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AccountRepositoryError>;

    /// Mark the token's account verified and clear the token in one write.
    ///
    /// Returns `None` when the digest is unknown, already used, or expired.
    async fn consume_verification_token(
        &self,
        digest: &TokenDigest,
    ) -> Result<Option<AccountId>, AccountRepositoryError>;

    /// Replace any outstanding reset token for the account.
    async fn store_reset_token(
        &self,
        id: &AccountId,
        digest: &TokenDigest,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AccountRepositoryError>;

    /// Swap in a new credential and clear the reset token in one write.
    ///
    /// Returns `false` when the digest is unknown, already used, or expired.
    async fn consume_reset_token(
        &self,
        digest: &TokenDigest,
        credential: &CredentialDigest,
    ) -> Result<bool, AccountRepositoryError>;

    /// Set `is_approved` if the account is still unapproved and may be
    /// approved. Returns `true` only when the flag actually flipped.
    async fn mark_approved(&self, id: &AccountId) -> Result<bool, AccountRepositoryError>;

    /// Change role and approval flag together. Returns `false` when the
    /// account does not exist.
    async fn update_role(
        &self,
        id: &AccountId,
        role: Role,
        is_approved: bool,
    ) -> Result<bool, AccountRepositoryError>;

    /// Apply the present fields of `patch`. Returns `false` when the account
    /// does not exist.
    async fn update_profile(
        &self,
        id: &AccountId,
        patch: &AccountPatch,
    ) -> Result<bool, AccountRepositoryError>;

    /// Delete an account unless it is driving an active ride.
    ///
    /// Rides requested by the account, their passengers, and ratings naming
    /// the account are removed with it; terminal rides it drove keep their
    /// row with the driver reference cleared.
    async fn delete(&self, id: &AccountId) -> Result<AccountDeletion, AccountRepositoryError>;
}

/// Fixture implementation for tests that do not exercise account storage.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureAccountRepository;

#[async_trait]
impl AccountRepository for FixtureAccountRepository {
    async fn insert(&self, _account: &Account) -> Result<(), AccountRepositoryError> {
        Ok(())
    }

    async fn find_by_id(&self, _id: &AccountId) -> Result<Option<Account>, AccountRepositoryError> {
        Ok(None)
    }

    async fn find_by_email(
        &self,
        _email: &EmailAddress,
    ) -> Result<Option<Account>, AccountRepositoryError> {
        Ok(None)
    }

    async fn find_many(&self, _ids: &[AccountId]) -> Result<Vec<Account>, AccountRepositoryError> {
        Ok(Vec::new())
    }

    async fn list_pending_approval(&self) -> Result<Vec<Account>, AccountRepositoryError> {
        Ok(Vec::new())
    }

    async fn list_all(&self) -> Result<Vec<Account>, AccountRepositoryError> {
        Ok(Vec::new())
    }

    async fn list_active_drivers(&self) -> Result<Vec<Account>, AccountRepositoryError> {
        Ok(Vec::new())
    }

    async fn store_verification_token(
        &self,
        _id: &AccountId,
        _digest: &TokenDigest,
        _expires_at: DateTime<Utc>,
    ) -> Result<(), AccountRepositoryError> {
        Ok(())
    }

    async fn consume_verification_token(
        &self,
        _digest: &TokenDigest,
    ) -> Result<Option<AccountId>, AccountRepositoryError> {
        Ok(None)
    }

    async fn store_reset_token(
        &self,
        _id: &AccountId,
        _digest: &TokenDigest,
        _expires_at: DateTime<Utc>,
    ) -> Result<(), AccountRepositoryError> {
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        _digest: &TokenDigest,
        _credential: &CredentialDigest,
    ) -> Result<bool, AccountRepositoryError> {
        Ok(false)
    }

    async fn mark_approved(&self, _id: &AccountId) -> Result<bool, AccountRepositoryError> {
        Ok(false)
    }

    async fn update_role(
        &self,
        _id: &AccountId,
        _role: Role,
        _is_approved: bool,
    ) -> Result<bool, AccountRepositoryError> {
        Ok(false)
    }

    async fn update_profile(
        &self,
        _id: &AccountId,
        _patch: &AccountPatch,
    ) -> Result<bool, AccountRepositoryError> {
        Ok(false)
    }

    async fn delete(&self, _id: &AccountId) -> Result<AccountDeletion, AccountRepositoryError> {
        Ok(AccountDeletion::Missing)
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[tokio::test]
    async fn fixture_lookup_returns_none() {
        let repo = FixtureAccountRepository;
        let found = repo
            .find_by_id(&AccountId::random())
            .await
            .expect("fixture lookup succeeds");
        assert!(found.is_none());
    }

    #[rstest]
    #[tokio::test]
    async fn fixture_token_consumption_never_matches() {
        let repo = FixtureAccountRepository;
        let digest = TokenDigest::from_stored("abc");
        assert_eq!(
            repo.consume_verification_token(&digest)
                .await
                .expect("fixture consume succeeds"),
            None
        );
    }

    #[rstest]
    fn duplicate_email_formats_message() {
        let err = AccountRepositoryError::duplicate_email("ada@campus.edu");
        assert_eq!(err.to_string(), "email ada@campus.edu is already registered");
        assert!(!err.is_connection());
    }
}
