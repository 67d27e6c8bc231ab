//! Account data model and participation gates.
//!
//! Accounts carry two independent gates: email verification and
//! administrator approval. The admin role bypasses both, and that exception
//! lives in exactly one place: [`Role::bypasses_account_gates`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::account_patch::AccountPatch;
use super::credentials::CredentialDigest;
use super::{AccountId, Error, ErrorReason};

/// Maximum allowed length for a display name.
pub const DISPLAY_NAME_MAX: usize = 255;
/// Seats assumed for a driver who never declared a capacity.
pub const DEFAULT_VEHICLE_CAPACITY: u8 = 4;

/// Validation errors returned by account value constructors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountValidationError {
    #[error("email address must not be empty")]
    EmptyEmail,
    #[error("email address must contain a single @ between a local part and a domain")]
    MalformedEmail,
    #[error("display name must not be empty")]
    EmptyDisplayName,
    #[error("display name must be at most {max} characters")]
    DisplayNameTooLong { max: usize },
    #[error("vehicle capacity must be at least one seat")]
    ZeroCapacity,
    #[error("unknown role `{0}`")]
    UnknownRole(String),
    #[error("a {role} account cannot be approved before it is verified")]
    ApprovedWithoutVerification { role: Role },
}

/// Normalised, syntactically valid email address.
///
/// Addresses are stored lower-cased so uniqueness is case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Validate and normalise an email address.
    ///
    /// # Examples
    /// ```
    /// use campus_rides::domain::EmailAddress;
    ///
    /// let email = EmailAddress::new("Ada@Example.edu").expect("valid email");
    /// assert_eq!(email.as_ref(), "ada@example.edu");
    /// ```
    pub fn new(raw: impl AsRef<str>) -> Result<Self, AccountValidationError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(AccountValidationError::EmptyEmail);
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(AccountValidationError::MalformedEmail);
        }
        let mut parts = trimmed.split('@');
        let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(AccountValidationError::MalformedEmail);
        };
        if local.is_empty() || domain.is_empty() {
            return Err(AccountValidationError::MalformedEmail);
        }
        Ok(Self(trimmed.to_lowercase()))
    }

    /// Normalized, lower-case address.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for EmailAddress {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<EmailAddress> for String {
    fn from(value: EmailAddress) -> Self {
        value.0
    }
}

impl TryFrom<String> for EmailAddress {
    type Error = AccountValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Human readable display name for the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DisplayName(String);

impl DisplayName {
    /// Validate and construct a [`DisplayName`].
    pub fn new(raw: impl Into<String>) -> Result<Self, AccountValidationError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AccountValidationError::EmptyDisplayName);
        }
        if trimmed.chars().count() > DISPLAY_NAME_MAX {
            return Err(AccountValidationError::DisplayNameTooLong {
                max: DISPLAY_NAME_MAX,
            });
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Trimmed display name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for DisplayName {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for DisplayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<DisplayName> for String {
    fn from(value: DisplayName) -> Self {
        value.0
    }
}

impl TryFrom<String> for DisplayName {
    type Error = AccountValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Requests rides.
    #[default]
    Student,
    /// Accepts and performs rides.
    Driver,
    /// Approves and manages accounts.
    Admin,
}

impl Role {
    /// Whether accounts with this role skip the verification and approval
    /// gates.
    ///
    /// Admins are trusted unconditionally. Every gate in the crate consults
    /// this method instead of matching on the role directly.
    pub const fn bypasses_account_gates(self) -> bool {
        matches!(self, Self::Admin)
    }

    /// Storage and wire representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Driver => "driver",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AccountValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "student" => Ok(Self::Student),
            "driver" => Ok(Self::Driver),
            "admin" => Ok(Self::Admin),
            other => Err(AccountValidationError::UnknownRole(other.to_owned())),
        }
    }
}

/// Number of passenger seats a driver offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct VehicleCapacity(u8);

impl VehicleCapacity {
    /// Validate a seat count.
    pub fn new(seats: u8) -> Result<Self, AccountValidationError> {
        if seats == 0 {
            return Err(AccountValidationError::ZeroCapacity);
        }
        Ok(Self(seats))
    }

    /// Seat count.
    pub const fn seats(self) -> u8 {
        self.0
    }
}

impl Default for VehicleCapacity {
    fn default() -> Self {
        Self(DEFAULT_VEHICLE_CAPACITY)
    }
}

impl From<VehicleCapacity> for u8 {
    fn from(value: VehicleCapacity) -> Self {
        value.0
    }
}

impl TryFrom<u8> for VehicleCapacity {
    type Error = AccountValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Student-specific profile fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentProfile {
    pub student_number: Option<String>,
    pub default_pickup: Option<String>,
    pub default_dropoff: Option<String>,
    pub parent_name: Option<String>,
    pub parent_phone: Option<String>,
    pub emergency_contact: Option<String>,
}

/// Driver-specific profile fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverProfile {
    pub license_number: Option<String>,
    pub vehicle_type: Option<String>,
    pub vehicle_model: Option<String>,
    pub vehicle_plate: Option<String>,
    pub vehicle_color: Option<String>,
    pub capacity: VehicleCapacity,
}

/// Input used to build an [`Account`].
#[derive(Debug, Clone)]
pub struct AccountDraft {
    pub id: AccountId,
    pub email: EmailAddress,
    pub credential: CredentialDigest,
    pub display_name: DisplayName,
    pub role: Role,
    pub phone: Option<String>,
    pub is_verified: bool,
    pub is_approved: bool,
    pub student: StudentProfile,
    pub driver: DriverProfile,
    pub created_at: DateTime<Utc>,
}

/// Registered identity.
///
/// ## Invariants
/// - `is_approved` implies `is_verified`, unless the role bypasses the
///   account gates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    id: AccountId,
    email: EmailAddress,
    credential: CredentialDigest,
    display_name: DisplayName,
    role: Role,
    phone: Option<String>,
    is_verified: bool,
    is_approved: bool,
    student: StudentProfile,
    driver: DriverProfile,
    created_at: DateTime<Utc>,
}

impl Account {
    /// Build an account, enforcing the approval invariant.
    pub fn new(draft: AccountDraft) -> Result<Self, AccountValidationError> {
        let AccountDraft {
            id,
            email,
            credential,
            display_name,
            role,
            phone,
            is_verified,
            is_approved,
            student,
            driver,
            created_at,
        } = draft;

        if is_approved && !is_verified && !role.bypasses_account_gates() {
            return Err(AccountValidationError::ApprovedWithoutVerification { role });
        }

        Ok(Self {
            id,
            email,
            credential,
            display_name,
            role,
            phone,
            is_verified,
            is_approved,
            student,
            driver,
            created_at,
        })
    }

    /// Stable account identifier.
    pub fn id(&self) -> AccountId {
        self.id
    }

    /// Normalized email address used for login.
    pub fn email(&self) -> &EmailAddress {
        &self.email
    }

    /// Stored credential digest.
    pub fn credential(&self) -> &CredentialDigest {
        &self.credential
    }

    /// Name shown to other participants.
    pub fn display_name(&self) -> &DisplayName {
        &self.display_name
    }

    /// Role granted at registration or by an administrator.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Optional contact number.
    pub fn phone(&self) -> Option<&str> {
        self.phone.as_deref()
    }

    /// Whether the email address has been confirmed.
    pub fn is_verified(&self) -> bool {
        self.is_verified
    }

    /// Whether an administrator has approved the account.
    pub fn is_approved(&self) -> bool {
        self.is_approved
    }

    /// Student-only fields; empty for other roles.
    pub fn student_profile(&self) -> &StudentProfile {
        &self.student
    }

    /// Driver-only fields; empty for other roles.
    pub fn driver_profile(&self) -> &DriverProfile {
        &self.driver
    }

    /// When the account was registered.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Whether the account may request or perform rides.
    pub fn passes_participation_gate(&self) -> bool {
        self.role.bypasses_account_gates() || (self.is_verified && self.is_approved)
    }

    /// Whether the account is eligible to receive ride offers.
    pub fn is_active_driver(&self) -> bool {
        self.role == Role::Driver && self.is_verified && self.is_approved
    }

    /// Check that an administrator may approve this account.
    pub fn ensure_approvable(&self) -> Result<(), Error> {
        if self.is_verified || self.role.bypasses_account_gates() {
            Ok(())
        } else {
            Err(Error::conflict(format!("account {} has not verified its email", self.id))
                .with_reason(ErrorReason::NotVerified))
        }
    }

    /// Approval flag to persist after switching to `new_role`.
    ///
    /// Moving an approved but unverified account out of a gate-bypassing role
    /// revokes the approval so the invariant keeps holding.
    pub fn approval_after_role_change(&self, new_role: Role) -> bool {
        self.is_approved && (self.is_verified || new_role.bypasses_account_gates())
    }

    /// Counterpart-facing contact projection.
    pub fn contact(&self) -> AccountContact {
        AccountContact {
            account_id: self.id,
            display_name: self.display_name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
        }
    }

    pub(crate) fn mark_verified(&mut self) {
        self.is_verified = true;
    }

    /// Set the approval flag if the invariant allows it.
    pub(crate) fn mark_approved(&mut self) -> bool {
        if self.is_approved || !(self.is_verified || self.role.bypasses_account_gates()) {
            return false;
        }
        self.is_approved = true;
        true
    }

    pub(crate) fn change_role(&mut self, role: Role, is_approved: bool) {
        self.role = role;
        self.is_approved = is_approved && (self.is_verified || role.bypasses_account_gates());
    }

    pub(crate) fn replace_credential(&mut self, credential: CredentialDigest) {
        self.credential = credential;
    }

    pub(crate) fn apply_patch(&mut self, patch: &AccountPatch) {
        fn set<T: Clone>(slot: &mut T, value: Option<&T>) {
            if let Some(value) = value {
                slot.clone_from(value);
            }
        }
        fn set_text(slot: &mut Option<String>, value: Option<&String>) {
            if let Some(value) = value {
                *slot = Some(value.clone());
            }
        }

        set(&mut self.display_name, patch.display_name.as_ref());
        set(&mut self.email, patch.email.as_ref());
        set_text(&mut self.phone, patch.phone.as_ref());

        let student = &mut self.student;
        set_text(&mut student.student_number, patch.student_number.as_ref());
        set_text(&mut student.default_pickup, patch.default_pickup.as_ref());
        set_text(&mut student.default_dropoff, patch.default_dropoff.as_ref());
        set_text(&mut student.parent_name, patch.parent_name.as_ref());
        set_text(&mut student.parent_phone, patch.parent_phone.as_ref());
        set_text(&mut student.emergency_contact, patch.emergency_contact.as_ref());

        let driver = &mut self.driver;
        set_text(&mut driver.license_number, patch.license_number.as_ref());
        set_text(&mut driver.vehicle_type, patch.vehicle_type.as_ref());
        set_text(&mut driver.vehicle_model, patch.vehicle_model.as_ref());
        set_text(&mut driver.vehicle_plate, patch.vehicle_plate.as_ref());
        set_text(&mut driver.vehicle_color, patch.vehicle_color.as_ref());
        set(&mut driver.capacity, patch.capacity.as_ref());
    }

    /// Approval queue projection.
    pub fn approval_status(&self) -> ApprovalStatus {
        ApprovalStatus {
            is_verified: self.is_verified,
            is_approved: self.is_approved,
        }
    }
}

/// Display fields of the counterpart party on a ride.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountContact {
    pub account_id: AccountId,
    pub display_name: DisplayName,
    pub email: EmailAddress,
    pub phone: Option<String>,
}

/// Verification and approval flags of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalStatus {
    pub is_verified: bool,
    pub is_approved: bool,
}

/// Authenticated caller identity handed to the core by the API layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub account_id: AccountId,
    pub role: Role,
}

impl Principal {
    /// Create a new principal for an authenticated account.
    pub const fn new(account_id: AccountId, role: Role) -> Self {
        Self { account_id, role }
    }

    /// Fail with `Forbidden` unless the caller holds the admin role.
    pub fn require_admin(&self) -> Result<(), Error> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(Error::forbidden("administrator role required"))
        }
    }

    /// Fail with `Forbidden` unless the caller holds `role`.
    pub fn require_role(&self, role: Role) -> Result<(), Error> {
        if self.role == role {
            Ok(())
        } else {
            Err(Error::forbidden(format!("{role} role required")))
        }
    }
}

#[cfg(test)]
#[path = "account_tests.rs"]
mod tests;
