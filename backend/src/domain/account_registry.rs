//! Account Registry: identity, credentials, verification, and approval.
//!
//! The registry owns every write to account rows. It never emits
//! notifications itself; callers that need one (the dispatcher) receive the
//! issued token or the approved account and enqueue the intent.

use std::sync::Arc;

use mockable::Clock;
use tracing::{debug, info};

use crate::domain::ports::{
    AccountDeletion, AccountRepository, AccountRepositoryError, CredentialHasher,
    CredentialHasherError,
};
use crate::domain::{
    Account, AccountDraft, AccountId, AccountPatch, ApprovalStatus, CredentialDigest,
    DisplayName, DriverProfile, EmailAddress, Error, ErrorReason, IssuedToken, OneTimeToken,
    PlainCredential, Principal, Role, StudentProfile, TokenPolicy,
};

const INVALID_CREDENTIALS: &str = "invalid credentials";

pub(crate) fn map_account_error(error: AccountRepositoryError) -> Error {
    match error {
        AccountRepositoryError::Connection { message } => {
            Error::service_unavailable(format!("account repository unavailable: {message}"))
        }
        AccountRepositoryError::Query { message } => {
            Error::internal(format!("account repository error: {message}"))
        }
        AccountRepositoryError::DuplicateEmail { email } => {
            Error::conflict(format!("email {email} is already registered"))
                .with_reason(ErrorReason::DuplicateEmail)
        }
    }
}

fn map_hasher_error(error: CredentialHasherError) -> Error {
    match error {
        CredentialHasherError::Connection { message } => {
            Error::service_unavailable(format!("credential hasher unavailable: {message}"))
        }
        other => Error::internal(format!("credential hasher error: {other}")),
    }
}

/// Input for a self-service registration.
#[derive(Debug, Clone)]
pub struct RegistrationRequest {
    pub email: EmailAddress,
    pub credential: PlainCredential,
    pub display_name: DisplayName,
    /// Defaults to [`Role::Student`].
    pub role: Option<Role>,
    pub phone: Option<String>,
    pub student: StudentProfile,
    pub driver: DriverProfile,
}

/// Newly registered account with the verification token to deliver.
#[derive(Debug, Clone)]
pub struct Registration {
    pub account: Account,
    pub verification: IssuedToken,
}

/// Token issued for an existing account, to be delivered to it.
#[derive(Debug, Clone)]
pub struct IssuedFor {
    pub account: Account,
    pub token: IssuedToken,
}

/// Outcome of an approval request.
#[derive(Debug, Clone)]
pub struct Approval {
    pub account: Account,
    /// `false` when the account was already approved.
    pub newly_approved: bool,
}

/// Outcome of seeding an administrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    Created(AccountId),
    AlreadyExists(AccountId),
}

/// Account Registry service.
#[derive(Clone)]
pub struct AccountRegistry {
    accounts: Arc<dyn AccountRepository>,
    hasher: Arc<dyn CredentialHasher>,
    clock: Arc<dyn Clock>,
    tokens: TokenPolicy,
}

impl AccountRegistry {
    /// Create a new registry over the account store, hasher, and clock.
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        hasher: Arc<dyn CredentialHasher>,
        clock: Arc<dyn Clock>,
        tokens: TokenPolicy,
    ) -> Self {
        Self {
            accounts,
            hasher,
            clock,
            tokens,
        }
    }

    /// Register a new unverified, unapproved account.
    ///
    /// Self-registration cannot create administrators; those are seeded out
    /// of band with [`AccountRegistry::seed_admin`].
    pub async fn register(&self, request: RegistrationRequest) -> Result<Registration, Error> {
        let role = request.role.unwrap_or_default();
        if role == Role::Admin {
            return Err(Error::forbidden(
                "administrator accounts cannot be self-registered",
            ));
        }

        let credential = self
            .hasher
            .hash(&request.credential)
            .await
            .map_err(map_hasher_error)?;
        let now = self.clock.utc();
        let account = Account::new(AccountDraft {
            id: AccountId::random(),
            email: request.email,
            credential,
            display_name: request.display_name,
            role,
            phone: request.phone,
            is_verified: false,
            is_approved: false,
            student: request.student,
            driver: request.driver,
            created_at: now,
        })
        .map_err(|err| Error::invalid_request(err.to_string()))?;

        self.accounts
            .insert(&account)
            .await
            .map_err(map_account_error)?;

        let verification = self.tokens.issue_verification(now);
        self.accounts
            .store_verification_token(&account.id(), &verification.digest, verification.expires_at)
            .await
            .map_err(map_account_error)?;

        info!(account_id = %account.id(), role = %role, "account registered");
        Ok(Registration {
            account,
            verification,
        })
    }

    /// Check a credential and return the caller's principal.
    ///
    /// Unknown email, wrong credential, and unverified account all produce
    /// the same `Unauthorized` error.
    pub async fn authenticate(
        &self,
        email: &str,
        credential: &PlainCredential,
    ) -> Result<Principal, Error> {
        let account = match EmailAddress::new(email) {
            Ok(email) => self
                .accounts
                .find_by_email(&email)
                .await
                .map_err(map_account_error)?,
            Err(_) => None,
        };
        let Some(account) = account else {
            self.spend_decoy_hash(credential).await;
            return Err(Error::unauthorized(INVALID_CREDENTIALS));
        };

        let matches = self
            .hasher
            .verify(account.credential(), credential)
            .await
            .map_err(map_hasher_error)?;
        if !matches || !(account.is_verified() || account.role().bypasses_account_gates()) {
            debug!(account_id = %account.id(), "authentication refused");
            return Err(Error::unauthorized(INVALID_CREDENTIALS));
        }
        Ok(Principal::new(account.id(), account.role()))
    }

    /// Consume a verification token. Unknown, used, and expired tokens all
    /// report `false`.
    pub async fn verify_email(&self, token: &OneTimeToken) -> Result<bool, Error> {
        let verified = self
            .accounts
            .consume_verification_token(&token.digest())
            .await
            .map_err(map_account_error)?;
        match verified {
            Some(account_id) => {
                info!(%account_id, "email verified");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Issue a fresh verification token if the account exists and is still
    /// unverified. Callers must not reveal which case applied.
    pub async fn resend_verification(&self, email: &str) -> Result<Option<IssuedFor>, Error> {
        let Some(account) = self.find_by_raw_email(email).await? else {
            return Ok(None);
        };
        if account.is_verified() {
            return Ok(None);
        }
        let token = self.tokens.issue_verification(self.clock.utc());
        self.accounts
            .store_verification_token(&account.id(), &token.digest, token.expires_at)
            .await
            .map_err(map_account_error)?;
        Ok(Some(IssuedFor { account, token }))
    }

    /// Approve an account. Approving twice succeeds; only the first call
    /// reports `newly_approved`.
    pub async fn approve(&self, id: &AccountId) -> Result<Approval, Error> {
        let account = self.get(id).await?;
        account.ensure_approvable()?;
        if account.is_approved() {
            return Ok(Approval {
                account,
                newly_approved: false,
            });
        }

        let newly_approved = self
            .accounts
            .mark_approved(id)
            .await
            .map_err(map_account_error)?;
        if !newly_approved {
            return Ok(Approval {
                account,
                newly_approved,
            });
        }
        info!(account_id = %id, "account approved");
        Ok(Approval {
            account: self.get(id).await?,
            newly_approved,
        })
    }

    /// Issue a reset token when the email belongs to an account.
    ///
    /// `None` and `Some` must look identical to the end user.
    pub async fn request_password_reset(&self, email: &str) -> Result<Option<IssuedFor>, Error> {
        let Some(account) = self.find_by_raw_email(email).await? else {
            debug!("password reset requested for unknown email");
            return Ok(None);
        };
        let token = self.tokens.issue_reset(self.clock.utc());
        self.accounts
            .store_reset_token(&account.id(), &token.digest, token.expires_at)
            .await
            .map_err(map_account_error)?;
        Ok(Some(IssuedFor { account, token }))
    }

    /// Replace the credential of the account owning `token`.
    ///
    /// Returns `false` for unknown, used, and expired tokens.
    pub async fn reset_password(
        &self,
        token: &OneTimeToken,
        new_credential: &PlainCredential,
    ) -> Result<bool, Error> {
        let credential = self
            .hasher
            .hash(new_credential)
            .await
            .map_err(map_hasher_error)?;
        let reset = self
            .accounts
            .consume_reset_token(&token.digest(), &credential)
            .await
            .map_err(map_account_error)?;
        if reset {
            info!("credential reset");
        }
        Ok(reset)
    }

    /// Change an account's role.
    ///
    /// The acting principal must be an admin, and an admin cannot move
    /// themselves out of the admin role. Re-affirming one's own admin role is
    /// a successful no-op.
    pub async fn update_role(
        &self,
        id: &AccountId,
        new_role: Role,
        acting: &Principal,
    ) -> Result<Account, Error> {
        acting.require_admin()?;
        if acting.account_id == *id {
            if new_role != Role::Admin {
                return Err(Error::forbidden(
                    "administrators cannot remove their own admin role",
                ));
            }
            return self.get(id).await;
        }

        let account = self.get(id).await?;
        let approved = account.approval_after_role_change(new_role);
        let updated = self
            .accounts
            .update_role(id, new_role, approved)
            .await
            .map_err(map_account_error)?;
        if !updated {
            return Err(Error::not_found(format!("account {id} not found")));
        }
        info!(account_id = %id, from = %account.role(), to = %new_role, "role changed");
        self.get(id).await
    }

    /// Apply a partial profile update. An empty patch reports `false`
    /// without touching storage.
    pub async fn update_profile(&self, id: &AccountId, patch: &AccountPatch) -> Result<bool, Error> {
        if patch.is_empty() {
            return Ok(false);
        }
        let updated = self
            .accounts
            .update_profile(id, patch)
            .await
            .map_err(map_account_error)?;
        if !updated {
            return Err(Error::not_found(format!("account {id} not found")));
        }
        Ok(true)
    }

    /// Delete an account on behalf of an administrator.
    pub async fn delete_account(&self, id: &AccountId, acting: &Principal) -> Result<(), Error> {
        acting.require_admin()?;
        if acting.account_id == *id {
            return Err(Error::forbidden("administrators cannot delete themselves"));
        }
        match self.accounts.delete(id).await.map_err(map_account_error)? {
            AccountDeletion::Deleted => {
                info!(account_id = %id, "account deleted");
                Ok(())
            }
            AccountDeletion::Missing => Err(Error::not_found(format!("account {id} not found"))),
            AccountDeletion::ActiveDriver => Err(Error::conflict(format!(
                "account {id} is driving an active ride"
            ))
            .with_reason(ErrorReason::RideState)),
        }
    }

    /// Fetch an account by id.
    ///
    /// # Errors
    ///
    /// Returns a not-found error when no such account exists.
    pub async fn get(&self, id: &AccountId) -> Result<Account, Error> {
        self.accounts
            .find_by_id(id)
            .await
            .map_err(map_account_error)?
            .ok_or_else(|| Error::not_found(format!("account {id} not found")))
    }

    /// Where the account stands in the approval workflow.
    pub async fn approval_status(&self, id: &AccountId) -> Result<ApprovalStatus, Error> {
        Ok(self.get(id).await?.approval_status())
    }

    /// Verified accounts awaiting approval, oldest first.
    pub async fn list_pending(&self) -> Result<Vec<Account>, Error> {
        self.accounts
            .list_pending_approval()
            .await
            .map_err(map_account_error)
    }

    /// Every account, newest first.
    pub async fn list_all(&self) -> Result<Vec<Account>, Error> {
        self.accounts.list_all().await.map_err(map_account_error)
    }

    /// Create a pre-verified, pre-approved administrator unless the email is
    /// already registered.
    pub async fn seed_admin(
        &self,
        email: EmailAddress,
        credential: CredentialDigest,
        display_name: DisplayName,
    ) -> Result<SeedOutcome, Error> {
        if let Some(existing) = self
            .accounts
            .find_by_email(&email)
            .await
            .map_err(map_account_error)?
        {
            return Ok(SeedOutcome::AlreadyExists(existing.id()));
        }

        let account = Account::new(AccountDraft {
            id: AccountId::random(),
            email,
            credential,
            display_name,
            role: Role::Admin,
            phone: None,
            is_verified: true,
            is_approved: true,
            student: StudentProfile::default(),
            driver: DriverProfile::default(),
            created_at: self.clock.utc(),
        })
        .map_err(|err| Error::invalid_request(err.to_string()))?;

        match self.accounts.insert(&account).await {
            Ok(()) => {
                info!(account_id = %account.id(), "administrator seeded");
                Ok(SeedOutcome::Created(account.id()))
            }
            Err(AccountRepositoryError::DuplicateEmail { .. }) => {
                let existing = self
                    .accounts
                    .find_by_email(account.email())
                    .await
                    .map_err(map_account_error)?
                    .ok_or_else(|| Error::internal("seeded account vanished"))?;
                Ok(SeedOutcome::AlreadyExists(existing.id()))
            }
            Err(err) => Err(map_account_error(err)),
        }
    }

    /// Do the hashing work a real check would, so refusing an unknown email
    /// takes as long as refusing a wrong credential.
    async fn spend_decoy_hash(&self, credential: &PlainCredential) {
        if let Err(error) = self.hasher.hash(credential).await {
            debug!(%error, "decoy credential hash failed");
        }
    }

    async fn find_by_raw_email(&self, email: &str) -> Result<Option<Account>, Error> {
        let Ok(email) = EmailAddress::new(email) else {
            return Ok(None);
        };
        self.accounts
            .find_by_email(&email)
            .await
            .map_err(map_account_error)
    }
}

#[cfg(test)]
#[path = "account_registry_tests.rs"]
mod tests;
