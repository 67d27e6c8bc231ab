//! PostgreSQL-backed `AccountRepository` implementation using Diesel ORM.
//!
//! Token consumption, approval, and role changes are single conditional
//! `UPDATE` statements, so concurrent callers cannot both win. Token expiry is
//! compared against the database clock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::dsl::now;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use uuid::Uuid;

use crate::domain::ports::{AccountDeletion, AccountRepository, AccountRepositoryError};
use crate::domain::{
    Account, AccountDraft, AccountId, AccountPatch, CredentialDigest, DisplayName, DriverProfile,
    EmailAddress, Role, StudentProfile, TokenDigest, VehicleCapacity,
};

use super::diesel_basic_error_mapping::{
    is_unique_violation, map_basic_diesel_error, map_basic_pool_error,
};
use super::models::{AccountProfileUpdate, AccountRow, NewAccountRow};
use super::pool::{DbPool, PoolError};
use super::schema::{accounts, rides};

const EMAIL_UNIQUE_INDEX: &str = "accounts_email_key";
const ACTIVE_RIDE_STATUSES: [&str; 2] = ["accepted", "in_progress"];

/// Diesel-backed implementation of the account repository port.
#[derive(Clone)]
pub struct DieselAccountRepository {
    pool: DbPool,
}

impl DieselAccountRepository {
    /// Create a new account repository over the shared pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> AccountRepositoryError {
    map_basic_pool_error(error, AccountRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> AccountRepositoryError {
    map_basic_diesel_error(
        error,
        AccountRepositoryError::query,
        AccountRepositoryError::connection,
    )
}

/// Like [`map_diesel_error`], but reports the email index as a duplicate.
fn map_write_error(error: diesel::result::Error, email: &str) -> AccountRepositoryError {
    if is_unique_violation(&error, EMAIL_UNIQUE_INDEX) {
        AccountRepositoryError::duplicate_email(email)
    } else {
        map_diesel_error(error)
    }
}

fn corrupt(field: &str, err: impl std::fmt::Display) -> AccountRepositoryError {
    AccountRepositoryError::query(format!("stored account has invalid {field}: {err}"))
}

fn row_to_account(row: AccountRow) -> Result<Account, AccountRepositoryError> {
    let capacity = u8::try_from(row.capacity)
        .map_err(|err| corrupt("capacity", err))
        .and_then(|seats| VehicleCapacity::new(seats).map_err(|err| corrupt("capacity", err)))?;

    Account::new(AccountDraft {
        id: AccountId::from_uuid(row.id),
        email: EmailAddress::new(&row.email).map_err(|err| corrupt("email", err))?,
        credential: CredentialDigest::new(row.credential_digest),
        display_name: DisplayName::new(row.display_name)
            .map_err(|err| corrupt("display name", err))?,
        role: row.role.parse::<Role>().map_err(|err| corrupt("role", err))?,
        phone: row.phone,
        is_verified: row.is_verified,
        is_approved: row.is_approved,
        student: StudentProfile {
            student_number: row.student_number,
            default_pickup: row.default_pickup,
            default_dropoff: row.default_dropoff,
            parent_name: row.parent_name,
            parent_phone: row.parent_phone,
            emergency_contact: row.emergency_contact,
        },
        driver: DriverProfile {
            license_number: row.license_number,
            vehicle_type: row.vehicle_type,
            vehicle_model: row.vehicle_model,
            vehicle_plate: row.vehicle_plate,
            vehicle_color: row.vehicle_color,
            capacity,
        },
        created_at: row.created_at,
    })
    .map_err(|err| corrupt("flags", err))
}

fn rows_to_accounts(rows: Vec<AccountRow>) -> Result<Vec<Account>, AccountRepositoryError> {
    rows.into_iter().map(row_to_account).collect()
}

fn new_account_row(account: &Account) -> NewAccountRow<'_> {
    let student = account.student_profile();
    let driver = account.driver_profile();
    NewAccountRow {
        id: *account.id().as_uuid(),
        email: account.email().as_str(),
        credential_digest: account.credential().as_str(),
        display_name: account.display_name().as_str(),
        role: account.role().as_str(),
        phone: account.phone(),
        is_verified: account.is_verified(),
        is_approved: account.is_approved(),
        student_number: student.student_number.as_deref(),
        default_pickup: student.default_pickup.as_deref(),
        default_dropoff: student.default_dropoff.as_deref(),
        parent_name: student.parent_name.as_deref(),
        parent_phone: student.parent_phone.as_deref(),
        emergency_contact: student.emergency_contact.as_deref(),
        license_number: driver.license_number.as_deref(),
        vehicle_type: driver.vehicle_type.as_deref(),
        vehicle_model: driver.vehicle_model.as_deref(),
        vehicle_plate: driver.vehicle_plate.as_deref(),
        vehicle_color: driver.vehicle_color.as_deref(),
        capacity: i16::from(driver.capacity.seats()),
        created_at: account.created_at(),
        updated_at: account.created_at(),
    }
}

/// Profile columns from `patch`, stamped with the database clock.
type ProfileChanges<'a> = (
    AccountProfileUpdate<'a>,
    diesel::dsl::Eq<accounts::updated_at, now>,
);

fn profile_changes(patch: &AccountPatch) -> ProfileChanges<'_> {
    (profile_update(patch), accounts::updated_at.eq(now))
}

fn profile_update(patch: &AccountPatch) -> AccountProfileUpdate<'_> {
    AccountProfileUpdate {
        email: patch.email.as_ref().map(EmailAddress::as_str),
        display_name: patch.display_name.as_ref().map(DisplayName::as_str),
        phone: patch.phone.as_deref(),
        student_number: patch.student_number.as_deref(),
        default_pickup: patch.default_pickup.as_deref(),
        default_dropoff: patch.default_dropoff.as_deref(),
        parent_name: patch.parent_name.as_deref(),
        parent_phone: patch.parent_phone.as_deref(),
        emergency_contact: patch.emergency_contact.as_deref(),
        license_number: patch.license_number.as_deref(),
        vehicle_type: patch.vehicle_type.as_deref(),
        vehicle_model: patch.vehicle_model.as_deref(),
        vehicle_plate: patch.vehicle_plate.as_deref(),
        vehicle_color: patch.vehicle_color.as_deref(),
        capacity: patch.capacity.map(|capacity| i16::from(capacity.seats())),
    }
}

#[async_trait]
impl AccountRepository for DieselAccountRepository {
    async fn insert(&self, account: &Account) -> Result<(), AccountRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::insert_into(accounts::table)
            .values(&new_account_row(account))
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(|err| map_write_error(err, account.email().as_str()))
    }

    async fn find_by_id(&self, id: &AccountId) -> Result<Option<Account>, AccountRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        accounts::table
            .filter(accounts::id.eq(id.as_uuid()))
            .select(AccountRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?
            .map(row_to_account)
            .transpose()
    }

    async fn find_by_email(
        &self,
        email: &EmailAddress,
    ) -> Result<Option<Account>, AccountRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        accounts::table
            .filter(accounts::email.eq(email.as_str()))
            .select(AccountRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?
            .map(row_to_account)
            .transpose()
    }

    async fn find_many(&self, ids: &[AccountId]) -> Result<Vec<Account>, AccountRepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows = accounts::table
            .filter(accounts::id.eq_any(ids))
            .select(AccountRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows_to_accounts(rows)
    }

    async fn list_pending_approval(&self) -> Result<Vec<Account>, AccountRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows = accounts::table
            .filter(accounts::is_verified.eq(true))
            .filter(accounts::is_approved.eq(false))
            .order((accounts::created_at.asc(), accounts::id.asc()))
            .select(AccountRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows_to_accounts(rows)
    }

    async fn list_all(&self) -> Result<Vec<Account>, AccountRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows = accounts::table
            .order((accounts::created_at.desc(), accounts::id.desc()))
            .select(AccountRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows_to_accounts(rows)
    }

    async fn list_active_drivers(&self) -> Result<Vec<Account>, AccountRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows = accounts::table
            .filter(accounts::role.eq(Role::Driver.as_str()))
            .filter(accounts::is_verified.eq(true))
            .filter(accounts::is_approved.eq(true))
            .order((accounts::created_at.asc(), accounts::id.asc()))
            .select(AccountRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows_to_accounts(rows)
    }

    async fn store_verification_token(
        &self,
        id: &AccountId,
        digest: &TokenDigest,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AccountRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::update(accounts::table.filter(accounts::id.eq(id.as_uuid())))
            .set((
                accounts::verification_token_digest.eq(digest.as_str()),
                accounts::verification_token_expires_at.eq(expires_at),
            ))
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn consume_verification_token(
        &self,
        digest: &TokenDigest,
    ) -> Result<Option<AccountId>, AccountRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let consumed = diesel::update(
            accounts::table
                .filter(accounts::verification_token_digest.eq(digest.as_str()))
                .filter(accounts::verification_token_expires_at.gt(now)),
        )
        .set((
            accounts::is_verified.eq(true),
            accounts::verification_token_digest.eq(None::<String>),
            accounts::verification_token_expires_at.eq(None::<DateTime<Utc>>),
            accounts::updated_at.eq(now),
        ))
        .returning(accounts::id)
        .get_result::<Uuid>(&mut conn)
        .await
        .optional()
        .map_err(map_diesel_error)?;
        Ok(consumed.map(AccountId::from_uuid))
    }

    async fn store_reset_token(
        &self,
        id: &AccountId,
        digest: &TokenDigest,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AccountRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::update(accounts::table.filter(accounts::id.eq(id.as_uuid())))
            .set((
                accounts::reset_token_digest.eq(digest.as_str()),
                accounts::reset_token_expires_at.eq(expires_at),
            ))
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn consume_reset_token(
        &self,
        digest: &TokenDigest,
        credential: &CredentialDigest,
    ) -> Result<bool, AccountRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let updated = diesel::update(
            accounts::table
                .filter(accounts::reset_token_digest.eq(digest.as_str()))
                .filter(accounts::reset_token_expires_at.gt(now)),
        )
        .set((
            accounts::credential_digest.eq(credential.as_str()),
            accounts::reset_token_digest.eq(None::<String>),
            accounts::reset_token_expires_at.eq(None::<DateTime<Utc>>),
            accounts::updated_at.eq(now),
        ))
        .execute(&mut conn)
        .await
        .map_err(map_diesel_error)?;
        Ok(updated > 0)
    }

    async fn mark_approved(&self, id: &AccountId) -> Result<bool, AccountRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let updated = diesel::update(
            accounts::table
                .filter(accounts::id.eq(id.as_uuid()))
                .filter(accounts::is_approved.eq(false))
                .filter(
                    accounts::is_verified
                        .eq(true)
                        .or(accounts::role.eq(Role::Admin.as_str())),
                ),
        )
        .set((accounts::is_approved.eq(true), accounts::updated_at.eq(now)))
        .execute(&mut conn)
        .await
        .map_err(map_diesel_error)?;
        Ok(updated > 0)
    }

    async fn update_role(
        &self,
        id: &AccountId,
        role: Role,
        is_approved: bool,
    ) -> Result<bool, AccountRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let updated = diesel::update(accounts::table.filter(accounts::id.eq(id.as_uuid())))
            .set((
                accounts::role.eq(role.as_str()),
                accounts::is_approved.eq(is_approved),
                accounts::updated_at.eq(now),
            ))
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(updated > 0)
    }

    async fn update_profile(
        &self,
        id: &AccountId,
        patch: &AccountPatch,
    ) -> Result<bool, AccountRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let email = patch.email.as_ref().map_or("", EmailAddress::as_str);
        let updated = diesel::update(accounts::table.filter(accounts::id.eq(id.as_uuid())))
            .set(profile_changes(patch))
            .execute(&mut conn)
            .await
            .map_err(|err| map_write_error(err, email))?;
        Ok(updated > 0)
    }

    async fn delete(&self, id: &AccountId) -> Result<AccountDeletion, AccountRepositoryError> {
        let id = *id.as_uuid();
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            async move {
                let locked = accounts::table
                    .filter(accounts::id.eq(id))
                    .select(accounts::id)
                    .for_update()
                    .first::<Uuid>(conn)
                    .await
                    .optional()?;
                if locked.is_none() {
                    return Ok(AccountDeletion::Missing);
                }

                let driving: i64 = rides::table
                    .filter(rides::driver_id.eq(id))
                    .filter(rides::status.eq_any(ACTIVE_RIDE_STATUSES))
                    .count()
                    .get_result(conn)
                    .await?;
                if driving > 0 {
                    return Ok(AccountDeletion::ActiveDriver);
                }

                // Foreign keys cascade the student's rides, passengers and
                // ratings, and null the driver on finished rides.
                diesel::delete(accounts::table.filter(accounts::id.eq(id)))
                    .execute(conn)
                    .await?;
                Ok(AccountDeletion::Deleted)
            }
            .scope_boxed()
        })
        .await
        .map_err(map_diesel_error)
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for row decoding and error mapping.
    use chrono::Utc;
    use diesel::result::{DatabaseErrorKind, Error as DieselError};
    use rstest::rstest;

    use super::*;

    fn row() -> AccountRow {
        AccountRow {
            id: Uuid::new_v4(),
            email: "ada@campus.edu".to_owned(),
            credential_digest: "digest".to_owned(),
            display_name: "Ada".to_owned(),
            role: "driver".to_owned(),
            phone: None,
            is_verified: true,
            is_approved: true,
            student_number: None,
            default_pickup: None,
            default_dropoff: None,
            parent_name: None,
            parent_phone: None,
            emergency_contact: None,
            license_number: Some("L-1".to_owned()),
            vehicle_type: Some("sedan".to_owned()),
            vehicle_model: None,
            vehicle_plate: None,
            vehicle_color: None,
            capacity: 3,
            created_at: Utc::now(),
        }
    }

    #[rstest]
    fn rows_decode_into_accounts() {
        let account = row_to_account(row()).expect("valid row");

        assert_eq!(account.role(), Role::Driver);
        assert_eq!(account.driver_profile().capacity.seats(), 3);
        assert!(account.is_active_driver());
    }

    #[rstest]
    #[case(AccountRow { role: "pilot".to_owned(), ..row() })]
    #[case(AccountRow { capacity: 0, ..row() })]
    #[case(AccountRow { capacity: -1, ..row() })]
    #[case(AccountRow { is_verified: false, ..row() })]
    fn corrupt_rows_are_query_errors(#[case] row: AccountRow) {
        let err = row_to_account(row).expect_err("corrupt row");
        assert!(matches!(err, AccountRepositoryError::Query { .. }));
    }

    #[rstest]
    fn email_index_violation_is_a_duplicate() {
        let error = DieselError::DatabaseError(
            DatabaseErrorKind::UniqueViolation,
            Box::new("duplicate key value violates unique constraint \"accounts_email_key\"".to_owned()),
        );

        let mapped = map_write_error(error, "ada@campus.edu");

        assert_eq!(mapped, AccountRepositoryError::duplicate_email("ada@campus.edu"));
    }

    #[rstest]
    fn profile_updates_use_the_database_clock() {
        let patch = AccountPatch::default().with_phone("555-0199");
        let query = diesel::update(accounts::table.filter(accounts::id.eq(Uuid::nil())))
            .set(profile_changes(&patch));

        let sql = diesel::debug_query::<diesel::pg::Pg, _>(&query).to_string();

        assert!(sql.contains("\"phone\" = $1"), "{sql}");
        assert!(sql.contains("\"updated_at\" = CURRENT_TIMESTAMP"), "{sql}");
        assert!(!sql.contains("\"email\""), "{sql}");
    }

    #[rstest]
    fn pool_error_maps_to_connection_error() {
        let mapped = map_pool_error(PoolError::checkout("connection refused"));
        assert!(mapped.is_connection());
        assert!(mapped.to_string().contains("connection refused"));
    }
}
