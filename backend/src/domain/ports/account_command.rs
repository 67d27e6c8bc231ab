//! Driving port for account lifecycle commands.
//!
//! Registration, token redemption, approval, and administration as seen by
//! an inbound adapter. Implementations queue the notifications each command
//! implies; callers only see the authoritative outcome.

use async_trait::async_trait;

use crate::domain::{
    Account, AccountId, Approval, Error, OneTimeToken, PlainCredential, Principal,
    RegistrationRequest, Role,
};

/// Driving port for account writes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountCommand: Send + Sync {
    /// Register an account and queue its verification email.
    async fn register(&self, request: RegistrationRequest) -> Result<AccountId, Error>;

    /// Re-send a verification email. The outcome is the same whether or not
    /// the email belongs to an unverified account.
    async fn resend_verification(&self, email: &str) -> Result<(), Error>;

    /// Start a password reset. The outcome is the same whether or not the
    /// email belongs to an account.
    async fn request_password_reset(&self, email: &str) -> Result<(), Error>;

    /// Redeem a verification token; `false` for unknown, used, or expired
    /// tokens alike.
    async fn verify_email(&self, token: &OneTimeToken) -> Result<bool, Error>;

    /// Redeem a reset token and replace the credential.
    async fn reset_password(
        &self,
        token: &OneTimeToken,
        new_credential: &PlainCredential,
    ) -> Result<bool, Error>;

    /// Approve an account and tell its holder. Repeat approvals succeed
    /// without a second notification. Admin only.
    async fn approve(&self, acting: &Principal, id: &AccountId) -> Result<Approval, Error>;

    /// Change an account's role. Admin only; admins cannot demote
    /// themselves.
    async fn update_role(
        &self,
        acting: &Principal,
        id: &AccountId,
        role: Role,
    ) -> Result<Account, Error>;

    /// Delete an account and everything that cascades from it. Admin only.
    async fn delete_account(&self, acting: &Principal, id: &AccountId) -> Result<(), Error>;
}
