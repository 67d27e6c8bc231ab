//! Tests for the Account Registry service.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use mockall::predicate::eq;
use rstest::{fixture, rstest};

use super::*;
use crate::domain::ErrorCode;
use crate::domain::ports::{
    FixtureCredentialHasher, MockAccountRepository, MockCredentialHasher,
};
use crate::test_support::MutableClock;

fn clock() -> Arc<dyn Clock> {
    Arc::new(MutableClock::new(
        Utc.with_ymd_and_hms(2026, 2, 10, 9, 0, 0)
            .single()
            .expect("valid time"),
    ))
}

fn registry(repo: MockAccountRepository) -> AccountRegistry {
    AccountRegistry::new(
        Arc::new(repo),
        Arc::new(FixtureCredentialHasher),
        clock(),
        TokenPolicy::default(),
    )
}

fn credential() -> PlainCredential {
    PlainCredential::new("correct horse").expect("valid credential")
}

fn account(role: Role, verified: bool, approved: bool) -> Account {
    Account::new(AccountDraft {
        id: AccountId::random(),
        email: EmailAddress::new(format!("{role}@campus.edu")).expect("valid email"),
        credential: CredentialDigest::new("fixture-sha256$00"),
        display_name: DisplayName::new("Casey").expect("valid name"),
        role,
        phone: None,
        is_verified: verified,
        is_approved: approved,
        student: StudentProfile::default(),
        driver: DriverProfile::default(),
        created_at: Utc::now(),
    })
    .expect("valid account")
}

#[fixture]
fn request() -> RegistrationRequest {
    RegistrationRequest {
        email: EmailAddress::new("a@x.com").expect("valid email"),
        credential: credential(),
        display_name: DisplayName::new("Ada").expect("valid name"),
        role: None,
        phone: None,
        student: StudentProfile::default(),
        driver: DriverProfile::default(),
    }
}

#[rstest]
#[tokio::test]
async fn register_defaults_to_unverified_student(request: RegistrationRequest) {
    let mut repo = MockAccountRepository::new();
    repo.expect_insert()
        .withf(|account| {
            account.role() == Role::Student && !account.is_verified() && !account.is_approved()
        })
        .times(1)
        .return_once(|_| Ok(()));
    repo.expect_store_verification_token()
        .times(1)
        .return_once(|_, _, _| Ok(()));

    let registration = registry(repo)
        .register(request)
        .await
        .expect("registration succeeds");

    assert_eq!(registration.account.role(), Role::Student);
    assert_eq!(
        registration.verification.digest,
        registration.verification.token.digest()
    );
}

#[rstest]
#[tokio::test]
async fn register_duplicate_email_is_conflict(request: RegistrationRequest) {
    let mut repo = MockAccountRepository::new();
    repo.expect_insert()
        .return_once(|_| Err(AccountRepositoryError::duplicate_email("a@x.com")));
    repo.expect_store_verification_token().times(0);

    let err = registry(repo)
        .register(request)
        .await
        .expect_err("duplicate email");

    assert_eq!(err.code(), ErrorCode::Conflict);
    assert_eq!(err.reason(), Some("duplicate_email"));
}

#[rstest]
#[tokio::test]
async fn register_refuses_admin_role(request: RegistrationRequest) {
    let mut repo = MockAccountRepository::new();
    repo.expect_insert().times(0);
    let mut request = request;
    request.role = Some(Role::Admin);

    let err = registry(repo)
        .register(request)
        .await
        .expect_err("admin self-registration");

    assert_eq!(err.code(), ErrorCode::Forbidden);
}

#[rstest]
#[case(Ok(Some(AccountId::random())), true)]
#[case(Ok(None), false)]
#[tokio::test]
async fn verify_email_reports_consumption(
    #[case] consumed: Result<Option<AccountId>, AccountRepositoryError>,
    #[case] expected: bool,
) {
    let token = OneTimeToken::generate();
    let digest = token.digest();
    let mut repo = MockAccountRepository::new();
    repo.expect_consume_verification_token()
        .with(eq(digest))
        .return_once(move |_| consumed);

    let verified = registry(repo)
        .verify_email(&token)
        .await
        .expect("verification call succeeds");

    assert_eq!(verified, expected);
}

#[rstest]
#[tokio::test]
async fn approve_unverified_student_fails_with_not_verified() {
    let target = account(Role::Student, false, false);
    let id = target.id();
    let mut repo = MockAccountRepository::new();
    repo.expect_find_by_id()
        .return_once(move |_| Ok(Some(target)));
    repo.expect_mark_approved().times(0);

    let err = registry(repo).approve(&id).await.expect_err("not verified");

    assert_eq!(err.code(), ErrorCode::Conflict);
    assert_eq!(err.reason(), Some("not_verified"));
}

#[rstest]
#[tokio::test]
async fn approve_missing_account_is_not_found() {
    let mut repo = MockAccountRepository::new();
    repo.expect_find_by_id().return_once(|_| Ok(None));

    let err = registry(repo)
        .approve(&AccountId::random())
        .await
        .expect_err("missing account");

    assert_eq!(err.code(), ErrorCode::NotFound);
}

#[rstest]
#[tokio::test]
async fn approve_already_approved_is_idempotent() {
    let target = account(Role::Driver, true, true);
    let id = target.id();
    let mut repo = MockAccountRepository::new();
    repo.expect_find_by_id()
        .return_once(move |_| Ok(Some(target)));
    repo.expect_mark_approved().times(0);

    let approval = registry(repo).approve(&id).await.expect("approve succeeds");

    assert!(!approval.newly_approved);
}

#[rstest]
#[tokio::test]
async fn approve_verified_account_flips_flag() {
    let before = account(Role::Driver, true, false);
    let after = account(Role::Driver, true, true);
    let id = before.id();
    let mut repo = MockAccountRepository::new();
    let mut lookups = vec![after, before];
    repo.expect_find_by_id()
        .times(2)
        .returning(move |_| Ok(lookups.pop()));
    repo.expect_mark_approved()
        .with(eq(id))
        .times(1)
        .return_once(|_| Ok(true));

    let approval = registry(repo).approve(&id).await.expect("approve succeeds");

    assert!(approval.newly_approved);
    assert!(approval.account.is_approved());
}

#[rstest]
#[tokio::test]
async fn password_reset_for_unknown_email_issues_nothing() {
    let mut repo = MockAccountRepository::new();
    repo.expect_find_by_email().return_once(|_| Ok(None));
    repo.expect_store_reset_token().times(0);

    let issued = registry(repo)
        .request_password_reset("nobody@campus.edu")
        .await
        .expect("request succeeds");

    assert!(issued.is_none());
}

#[rstest]
#[tokio::test]
async fn password_reset_for_malformed_email_issues_nothing() {
    let mut repo = MockAccountRepository::new();
    repo.expect_find_by_email().times(0);

    let issued = registry(repo)
        .request_password_reset("not an email")
        .await
        .expect("request succeeds");

    assert!(issued.is_none());
}

#[rstest]
#[tokio::test]
async fn password_reset_token_expires_after_an_hour() {
    let target = account(Role::Student, true, true);
    let mut repo = MockAccountRepository::new();
    repo.expect_find_by_email()
        .return_once(move |_| Ok(Some(target)));
    repo.expect_store_reset_token()
        .times(1)
        .return_once(|_, _, _| Ok(()));

    let registry = registry(repo);
    let issued = registry
        .request_password_reset("student@campus.edu")
        .await
        .expect("request succeeds")
        .expect("token issued");

    assert_eq!(
        issued.token.expires_at - registry.clock.utc(),
        chrono::TimeDelta::hours(1)
    );
}

#[rstest]
#[tokio::test]
async fn update_role_self_demotion_is_forbidden() {
    let admin = Principal::new(AccountId::random(), Role::Admin);
    let mut repo = MockAccountRepository::new();
    repo.expect_update_role().times(0);

    let err = registry(repo)
        .update_role(&admin.account_id, Role::Driver, &admin)
        .await
        .expect_err("self demotion");

    assert_eq!(err.code(), ErrorCode::Forbidden);
}

#[rstest]
#[tokio::test]
async fn update_role_self_reaffirmation_is_a_no_op() {
    let me = account(Role::Admin, true, true);
    let admin = Principal::new(me.id(), Role::Admin);
    let mut repo = MockAccountRepository::new();
    repo.expect_find_by_id().return_once(move |_| Ok(Some(me)));
    repo.expect_update_role().times(0);

    let account = registry(repo)
        .update_role(&admin.account_id, Role::Admin, &admin)
        .await
        .expect("reaffirmation succeeds");

    assert_eq!(account.role(), Role::Admin);
}

#[rstest]
#[tokio::test]
async fn update_role_requires_admin() {
    let driver = Principal::new(AccountId::random(), Role::Driver);
    let repo = MockAccountRepository::new();

    let err = registry(repo)
        .update_role(&AccountId::random(), Role::Admin, &driver)
        .await
        .expect_err("not admin");

    assert_eq!(err.code(), ErrorCode::Forbidden);
}

#[rstest]
#[tokio::test]
async fn update_role_demoting_unverified_admin_clears_approval() {
    let target = account(Role::Admin, false, true);
    let id = target.id();
    let admin = Principal::new(AccountId::random(), Role::Admin);
    let demoted = account(Role::Driver, false, false);
    let mut lookups = vec![demoted, target];
    let mut repo = MockAccountRepository::new();
    repo.expect_find_by_id()
        .times(2)
        .returning(move |_| Ok(lookups.pop()));
    repo.expect_update_role()
        .with(eq(id), eq(Role::Driver), eq(false))
        .times(1)
        .return_once(|_, _, _| Ok(true));

    let account = registry(repo)
        .update_role(&id, Role::Driver, &admin)
        .await
        .expect("role change succeeds");

    assert!(!account.is_approved());
}

#[rstest]
#[tokio::test]
async fn empty_patch_skips_storage() {
    let mut repo = MockAccountRepository::new();
    repo.expect_update_profile().times(0);

    let updated = registry(repo)
        .update_profile(&AccountId::random(), &AccountPatch::default())
        .await
        .expect("update succeeds");

    assert!(!updated);
}

#[rstest]
#[tokio::test]
async fn patch_to_taken_email_is_conflict() {
    let mut repo = MockAccountRepository::new();
    repo.expect_update_profile()
        .return_once(|_, _| Err(AccountRepositoryError::duplicate_email("b@x.com")));
    let patch =
        AccountPatch::default().with_email(EmailAddress::new("b@x.com").expect("valid email"));

    let err = registry(repo)
        .update_profile(&AccountId::random(), &patch)
        .await
        .expect_err("duplicate email");

    assert_eq!(err.reason(), Some("duplicate_email"));
}

#[rstest]
#[case(AccountDeletion::Deleted, None)]
#[case(AccountDeletion::Missing, Some(ErrorCode::NotFound))]
#[case(AccountDeletion::ActiveDriver, Some(ErrorCode::Conflict))]
#[tokio::test]
async fn delete_account_maps_outcomes(
    #[case] outcome: AccountDeletion,
    #[case] expected: Option<ErrorCode>,
) {
    let admin = Principal::new(AccountId::random(), Role::Admin);
    let mut repo = MockAccountRepository::new();
    repo.expect_delete().return_once(move |_| Ok(outcome));

    let result = registry(repo)
        .delete_account(&AccountId::random(), &admin)
        .await;

    assert_eq!(result.err().map(|err| err.code()), expected);
}

#[rstest]
#[tokio::test]
async fn delete_account_refuses_self_deletion() {
    let admin = Principal::new(AccountId::random(), Role::Admin);
    let mut repo = MockAccountRepository::new();
    repo.expect_delete().times(0);

    let err = registry(repo)
        .delete_account(&admin.account_id, &admin)
        .await
        .expect_err("self deletion");

    assert_eq!(err.code(), ErrorCode::Forbidden);
}

#[rstest]
#[case(AccountRepositoryError::connection("refused"), ErrorCode::ServiceUnavailable)]
#[case(AccountRepositoryError::query("bad sql"), ErrorCode::InternalError)]
#[tokio::test]
async fn repository_failures_are_mapped(
    #[case] failure: AccountRepositoryError,
    #[case] expected: ErrorCode,
) {
    let mut repo = MockAccountRepository::new();
    repo.expect_list_pending_approval()
        .return_once(move || Err(failure));

    let err = registry(repo).list_pending().await.expect_err("failure");

    assert_eq!(err.code(), expected);
}

mod authentication {
    //! Login must not reveal which check failed.
    use super::*;

    async fn stored_account(verified: bool, role: Role) -> Account {
        let digest = FixtureCredentialHasher
            .hash(&credential())
            .await
            .expect("hash succeeds");
        Account::new(AccountDraft {
            id: AccountId::random(),
            email: EmailAddress::new("ada@campus.edu").expect("valid email"),
            credential: digest,
            display_name: DisplayName::new("Ada").expect("valid name"),
            role,
            phone: None,
            is_verified: verified,
            is_approved: false,
            student: StudentProfile::default(),
            driver: DriverProfile::default(),
            created_at: Utc::now(),
        })
        .expect("valid account")
    }

    fn with_account(account: Option<Account>) -> AccountRegistry {
        let mut repo = MockAccountRepository::new();
        repo.expect_find_by_email()
            .return_once(move |_| Ok(account));
        registry(repo)
    }

    #[rstest]
    #[tokio::test]
    async fn verified_account_gets_principal() {
        let account = stored_account(true, Role::Student).await;
        let id = account.id();

        let principal = with_account(Some(account))
            .authenticate("ada@campus.edu", &credential())
            .await
            .expect("login succeeds");

        assert_eq!(principal, Principal::new(id, Role::Student));
    }

    #[rstest]
    #[tokio::test]
    async fn unverified_admin_bypasses_the_gate() {
        let account = stored_account(false, Role::Admin).await;

        let principal = with_account(Some(account))
            .authenticate("ada@campus.edu", &credential())
            .await
            .expect("login succeeds");

        assert_eq!(principal.role, Role::Admin);
    }

    #[rstest]
    #[tokio::test]
    async fn failures_are_indistinguishable() {
        let unknown = with_account(None)
            .authenticate("ada@campus.edu", &credential())
            .await
            .expect_err("unknown account");
        let unverified = with_account(Some(stored_account(false, Role::Student).await))
            .authenticate("ada@campus.edu", &credential())
            .await
            .expect_err("unverified account");
        let wrong = with_account(Some(stored_account(true, Role::Student).await))
            .authenticate(
                "ada@campus.edu",
                &PlainCredential::new("battery staple").expect("valid credential"),
            )
            .await
            .expect_err("wrong credential");

        assert_eq!(unknown, unverified);
        assert_eq!(unknown, wrong);
        assert_eq!(unknown.code(), ErrorCode::Unauthorized);
    }

    #[rstest]
    #[case::unknown_email("ghost@campus.edu", 1)]
    #[case::malformed_email("not an email", 0)]
    #[tokio::test]
    async fn refusing_a_missing_account_still_hashes(
        #[case] email: &str,
        #[case] lookups: usize,
    ) {
        let mut repo = MockAccountRepository::new();
        repo.expect_find_by_email()
            .times(lookups)
            .returning(|_| Ok(None));
        let mut hasher = MockCredentialHasher::new();
        hasher
            .expect_hash()
            .times(1)
            .returning(|_| Ok(CredentialDigest::new("decoy")));
        hasher.expect_verify().times(0);
        let registry = AccountRegistry::new(
            Arc::new(repo),
            Arc::new(hasher),
            clock(),
            TokenPolicy::default(),
        );

        let err = registry
            .authenticate(email, &credential())
            .await
            .expect_err("no such account");

        assert_eq!(err.code(), ErrorCode::Unauthorized);
    }

    #[rstest]
    #[tokio::test]
    async fn decoy_hash_failure_keeps_the_same_refusal() {
        let mut repo = MockAccountRepository::new();
        repo.expect_find_by_email().returning(|_| Ok(None));
        let mut hasher = MockCredentialHasher::new();
        hasher
            .expect_hash()
            .returning(|_| Err(CredentialHasherError::connection("timeout")));
        let registry = AccountRegistry::new(
            Arc::new(repo),
            Arc::new(hasher),
            clock(),
            TokenPolicy::default(),
        );

        let err = registry
            .authenticate("ghost@campus.edu", &credential())
            .await
            .expect_err("no such account");

        assert_eq!(err.code(), ErrorCode::Unauthorized);
    }

    #[rstest]
    #[tokio::test]
    async fn hasher_outage_is_unavailable() {
        let account = stored_account(true, Role::Student).await;
        let mut repo = MockAccountRepository::new();
        repo.expect_find_by_email()
            .return_once(move |_| Ok(Some(account)));
        let mut hasher = MockCredentialHasher::new();
        hasher
            .expect_verify()
            .return_once(|_, _| Err(CredentialHasherError::connection("timeout")));
        let registry = AccountRegistry::new(
            Arc::new(repo),
            Arc::new(hasher),
            clock(),
            TokenPolicy::default(),
        );

        let err = registry
            .authenticate("ada@campus.edu", &credential())
            .await
            .expect_err("hasher down");

        assert_eq!(err.code(), ErrorCode::ServiceUnavailable);
    }
}

#[rstest]
#[tokio::test]
async fn seed_admin_is_idempotent_on_existing_email() {
    let existing = account(Role::Admin, true, true);
    let existing_id = existing.id();
    let mut repo = MockAccountRepository::new();
    repo.expect_find_by_email()
        .return_once(move |_| Ok(Some(existing)));
    repo.expect_insert().times(0);

    let outcome = registry(repo)
        .seed_admin(
            EmailAddress::new("admin@campus.edu").expect("valid email"),
            CredentialDigest::new("digest"),
            DisplayName::new("Admin").expect("valid name"),
        )
        .await
        .expect("seed succeeds");

    assert_eq!(outcome, SeedOutcome::AlreadyExists(existing_id));
}

#[rstest]
#[tokio::test]
async fn seed_admin_creates_verified_approved_admin() {
    let mut repo = MockAccountRepository::new();
    repo.expect_find_by_email().return_once(|_| Ok(None));
    repo.expect_insert()
        .withf(|account| {
            account.role() == Role::Admin && account.is_verified() && account.is_approved()
        })
        .times(1)
        .return_once(|_| Ok(()));

    let outcome = registry(repo)
        .seed_admin(
            EmailAddress::new("admin@campus.edu").expect("valid email"),
            CredentialDigest::new("digest"),
            DisplayName::new("Admin").expect("valid name"),
        )
        .await
        .expect("seed succeeds");

    assert!(matches!(outcome, SeedOutcome::Created(_)));
}
