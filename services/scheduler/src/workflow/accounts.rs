use crate::auth::credentials::{generate_salt, hash_password, verify_password};
use crate::auth::password::check_strength;
use crate::error::{SchedulerError, SchedulerResult};
use crate::model::{Identity, Principal, Role};
use crate::store::{SchedulerStore, StoreError};

/// Create an account after the strength check and the username check.
///
/// Patients are checked for password strength first; caregivers are checked
/// for a taken username first. A concurrent creation of the same username surfaces as `UsernameTaken`
/// through the store's uniqueness conflict.
pub async fn create_account(
    store: &dyn SchedulerStore,
    role: Role,
    username: &str,
    password: &str,
) -> SchedulerResult<Principal> {
    match role {
        Role::Patient => {
            check_strength(password)?;
            ensure_username_free(store, role, username).await?;
        }
        Role::Caregiver => {
            ensure_username_free(store, role, username).await?;
            check_strength(password)?;
        }
    }

    let salt = generate_salt();
    let password_hash = hash_password(password, &salt).map_err(SchedulerError::Credential)?;
    let identity = Identity {
        role,
        username: username.to_string(),
        salt,
        password_hash,
    };
    let principal = identity.principal();
    match store.create_identity(identity).await {
        Ok(()) => {
            tracing::info!(%role, username, "account created");
            Ok(principal)
        }
        Err(StoreError::Conflict(_)) => Err(SchedulerError::UsernameTaken),
        Err(err) => Err(err.into()),
    }
}

async fn ensure_username_free(
    store: &dyn SchedulerStore,
    role: Role,
    username: &str,
) -> SchedulerResult<()> {
    if store.username_exists(role, username).await? {
        return Err(SchedulerError::UsernameTaken);
    }
    Ok(())
}

/// Verify `password` for `username` under `role`.
///
/// Unknown usernames and wrong passwords both yield `LoginFailed`.
pub async fn authenticate(
    store: &dyn SchedulerStore,
    role: Role,
    username: &str,
    password: &str,
) -> SchedulerResult<Principal> {
    let identity = store
        .get_identity(role, username)
        .await?
        .ok_or(SchedulerError::LoginFailed)?;
    if !verify_password(password, &identity.salt, &identity.password_hash) {
        return Err(SchedulerError::LoginFailed);
    }
    Ok(identity.principal())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::WeakPassword;
    use crate::store::memory::InMemoryStore;

    #[tokio::test]
    async fn weak_password_is_rejected_for_both_roles() {
        let store = InMemoryStore::new();
        for role in [Role::Patient, Role::Caregiver] {
            let err = create_account(&store, role, "sam", "abc123")
                .await
                .expect_err("weak");
            assert!(matches!(
                err,
                SchedulerError::WeakPassword(WeakPassword::TooShort)
            ));
            assert!(!store.username_exists(role, "sam").await.unwrap());
        }
    }

    #[tokio::test]
    async fn usernames_are_unique_per_role() {
        let store = InMemoryStore::new();
        create_account(&store, Role::Patient, "sam", "Str0ng!Pwd")
            .await
            .expect("patient");
        let err = create_account(&store, Role::Patient, "sam", "Str0ng!Pwd")
            .await
            .expect_err("taken");
        assert!(matches!(err, SchedulerError::UsernameTaken));
        create_account(&store, Role::Caregiver, "sam", "Str0ng!Pwd")
            .await
            .expect("same name, other role");
    }

    #[tokio::test]
    async fn taken_name_with_weak_password_reports_per_role() {
        let store = InMemoryStore::new();
        for role in [Role::Patient, Role::Caregiver] {
            create_account(&store, role, "sam", "Str0ng!Pwd")
                .await
                .expect("first account");
        }

        let err = create_account(&store, Role::Patient, "sam", "abc123")
            .await
            .expect_err("patient");
        assert!(matches!(err, SchedulerError::WeakPassword(_)));

        let err = create_account(&store, Role::Caregiver, "sam", "abc123")
            .await
            .expect_err("caregiver");
        assert!(matches!(err, SchedulerError::UsernameTaken));
    }

    #[tokio::test]
    async fn authenticate_checks_role_username_and_password() {
        let store = InMemoryStore::new();
        create_account(&store, Role::Caregiver, "carol", "Str0ng!Pwd")
            .await
            .expect("caregiver");

        let principal = authenticate(&store, Role::Caregiver, "carol", "Str0ng!Pwd")
            .await
            .expect("login");
        assert_eq!(principal, Principal::caregiver("carol"));

        for (role, username, password) in [
            (Role::Caregiver, "carol", "Wr0ng!Pwd"),
            (Role::Caregiver, "Carol", "Str0ng!Pwd"),
            (Role::Patient, "carol", "Str0ng!Pwd"),
        ] {
            let err = authenticate(&store, role, username, password)
                .await
                .expect_err("rejected");
            assert!(matches!(err, SchedulerError::LoginFailed));
        }
    }
}
