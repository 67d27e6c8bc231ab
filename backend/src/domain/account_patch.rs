//! Partial profile updates.
//!
//! Only fields that are present in an [`AccountPatch`] are written. Absent
//! fields keep their stored value; there is no way to clear a field through a
//! patch, matching how profile edits behave for callers.

use super::account::{Account, DisplayName, EmailAddress, VehicleCapacity};

/// Partial update of an account's profile.
///
/// # Examples
/// ```
/// use campus_rides::domain::{AccountPatch, DisplayName};
///
/// let patch = AccountPatch::default()
///     .with_display_name(DisplayName::new("Ada").expect("valid name"))
///     .with_phone("555-0100");
/// assert!(!patch.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountPatch {
    pub display_name: Option<DisplayName>,
    pub email: Option<EmailAddress>,
    pub phone: Option<String>,
    pub student_number: Option<String>,
    pub default_pickup: Option<String>,
    pub default_dropoff: Option<String>,
    pub parent_name: Option<String>,
    pub parent_phone: Option<String>,
    pub emergency_contact: Option<String>,
    pub license_number: Option<String>,
    pub vehicle_type: Option<String>,
    pub vehicle_model: Option<String>,
    pub vehicle_plate: Option<String>,
    pub vehicle_color: Option<String>,
    pub capacity: Option<VehicleCapacity>,
}

macro_rules! patch_setter {
    ($(#[$meta:meta])* $method:ident, $field:ident: String) => {
        $(#[$meta])*
        #[must_use]
        pub fn $method(mut self, value: impl Into<String>) -> Self {
            self.$field = Some(value.into());
            self
        }
    };
    ($(#[$meta:meta])* $method:ident, $field:ident: $ty:ty) => {
        $(#[$meta])*
        #[must_use]
        pub fn $method(mut self, value: $ty) -> Self {
            self.$field = Some(value);
            self
        }
    };
}

impl AccountPatch {
    patch_setter!(with_display_name, display_name: DisplayName);
    patch_setter!(
        /// Change the login email; uniqueness is checked by the store.
        with_email,
        email: EmailAddress
    );
    patch_setter!(with_phone, phone: String);
    patch_setter!(with_student_number, student_number: String);
    patch_setter!(with_default_pickup, default_pickup: String);
    patch_setter!(with_default_dropoff, default_dropoff: String);
    patch_setter!(with_parent_name, parent_name: String);
    patch_setter!(with_parent_phone, parent_phone: String);
    patch_setter!(with_emergency_contact, emergency_contact: String);
    patch_setter!(with_license_number, license_number: String);
    patch_setter!(with_vehicle_type, vehicle_type: String);
    patch_setter!(with_vehicle_model, vehicle_model: String);
    patch_setter!(with_vehicle_plate, vehicle_plate: String);
    patch_setter!(with_vehicle_color, vehicle_color: String);
    patch_setter!(with_capacity, capacity: VehicleCapacity);

    /// Whether the patch carries no changes at all.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Apply the present fields to an in-memory account.
    pub fn apply_to(&self, account: &mut Account) {
        account.apply_patch(self);
    }
}
